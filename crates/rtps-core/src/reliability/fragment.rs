// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reassembly of DATA_FRAG submessages.
//!
//! Fragments are buffered per sequence number until every fragment of the
//! sample arrived. The number of incomplete samples is bounded by an LRU:
//! when it is full the least recently touched sample is dropped (a reliable
//! writer resends it after the next ACKNACK).

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::protocol::{DataFragSubmessage, SequenceNumber};

struct PartialSample {
    data: Vec<u8>,
    received: Vec<bool>,
    remaining: u32,
    fragment_size: usize,
}

impl PartialSample {
    fn new(sample_size: usize, fragment_size: usize) -> Self {
        let total = sample_size.div_ceil(fragment_size).max(1);
        Self {
            data: vec![0; sample_size],
            received: vec![false; total],
            remaining: total as u32,
            fragment_size,
        }
    }

    /// Copy fragments `[start, start + count)`; returns false on mismatch.
    fn insert(&mut self, start: u32, count: u16, payload: &[u8]) -> bool {
        let mut offset_in_payload = 0usize;
        for n in 0..u32::from(count) {
            let index = (start - 1 + n) as usize;
            if index >= self.received.len() {
                return false;
            }
            let begin = index * self.fragment_size;
            let end = (begin + self.fragment_size).min(self.data.len());
            let len = end - begin;
            let Some(chunk) = payload.get(offset_in_payload..offset_in_payload + len) else {
                return false;
            };
            if !self.received[index] {
                self.data[begin..end].copy_from_slice(chunk);
                self.received[index] = true;
                self.remaining -= 1;
            }
            offset_in_payload += len;
        }
        true
    }
}

/// Bounded per-writer fragment buffer.
pub struct FragmentAssembler {
    pending: LruCache<SequenceNumber, PartialSample>,
}

impl FragmentAssembler {
    pub fn new(max_pending: usize) -> Self {
        let cap = NonZeroUsize::new(max_pending).unwrap_or(NonZeroUsize::MIN);
        Self {
            pending: LruCache::new(cap),
        }
    }

    /// Add fragments; returns the complete payload once all are present.
    pub fn insert(&mut self, frag: &DataFragSubmessage) -> Option<Vec<u8>> {
        let fragment_size = usize::from(frag.fragment_size);
        let sample_size = frag.sample_size as usize;
        if fragment_size == 0 || frag.fragment_start == 0 {
            log::warn!("[reader] dropping DATA_FRAG with invalid numbering");
            return None;
        }

        if !self.pending.contains(&frag.seq) {
            if let Some((evicted, _)) = self.pending.push(
                frag.seq,
                PartialSample::new(sample_size, fragment_size),
            ) {
                if evicted != frag.seq {
                    log::debug!("[reader] fragment buffer full, dropped seq {}", evicted);
                }
            }
        }

        let partial = self.pending.get_mut(&frag.seq)?;
        if partial.data.len() != sample_size || partial.fragment_size != fragment_size {
            log::warn!("[reader] DATA_FRAG geometry changed for seq {}", frag.seq);
            self.pending.pop(&frag.seq);
            return None;
        }
        if !partial.insert(frag.fragment_start, frag.fragments_in_submessage, &frag.payload) {
            log::warn!("[reader] malformed DATA_FRAG for seq {}", frag.seq);
            return None;
        }
        if partial.remaining == 0 {
            return self.pending.pop(&frag.seq).map(|p| p.data);
        }
        None
    }

    /// Drop partial samples below `seq` (declared irrelevant).
    pub fn discard_below(&mut self, seq: SequenceNumber) {
        let stale: Vec<SequenceNumber> = self
            .pending
            .iter()
            .map(|(s, _)| *s)
            .filter(|s| *s < seq)
            .collect();
        for s in stale {
            self.pending.pop(&s);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
