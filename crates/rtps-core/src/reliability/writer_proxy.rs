// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reader-side state for one matched writer.
//!
//! Reliable proxies deliver strictly in sequence order: changes arriving
//! ahead of a hole wait in `pending` until the hole is filled or declared
//! irrelevant. Best-effort proxies deliver anything newer than the last
//! delivered sequence number and drop the rest.

use std::collections::BTreeMap;
use std::ops::Range;

use super::fragment::FragmentAssembler;
use super::gap_tracker::GapTracker;
use super::history::CacheChange;
use crate::config::FRAGMENT_BUFFER_SIZE;
use crate::core::guid::GUID;
use crate::core::locator::Locator;
use crate::protocol::{DataFragSubmessage, SequenceNumber, SequenceNumberSet};

/// What a reader knows about a remote writer when matching it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteWriterInfo {
    pub guid: GUID,
    pub unicast_locators: Vec<Locator>,
    pub multicast_locators: Vec<Locator>,
    pub reliable: bool,
}

/// Per matched writer bookkeeping.
pub struct WriterProxy {
    pub info: RemoteWriterInfo,
    tracker: GapTracker,
    pending: BTreeMap<SequenceNumber, CacheChange>,
    /// Everything at or below was delivered or skipped.
    delivered_up_to: SequenceNumber,
    fragments: FragmentAssembler,
    last_heartbeat_count: Option<u32>,
    acknack_count: u32,
}

impl WriterProxy {
    pub fn new(info: RemoteWriterInfo) -> Self {
        Self {
            info,
            tracker: GapTracker::new(),
            pending: BTreeMap::new(),
            delivered_up_to: 0,
            fragments: FragmentAssembler::new(FRAGMENT_BUFFER_SIZE),
            last_heartbeat_count: None,
            acknack_count: 0,
        }
    }

    pub fn guid(&self) -> GUID {
        self.info.guid
    }

    pub fn is_reliable(&self) -> bool {
        self.info.reliable
    }

    pub fn delivered_up_to(&self) -> SequenceNumber {
        self.delivered_up_to
    }

    pub fn destinations(&self) -> &[Locator] {
        if self.info.unicast_locators.is_empty() {
            &self.info.multicast_locators
        } else {
            &self.info.unicast_locators
        }
    }

    /// Feed a fragment; returns the reassembled payload when complete.
    pub fn on_fragment(&mut self, frag: &DataFragSubmessage) -> Option<Vec<u8>> {
        if frag.seq <= self.delivered_up_to || self.pending.contains_key(&frag.seq) {
            return None;
        }
        self.fragments.insert(frag)
    }

    /// Accept a received change. Returns the changes now deliverable, in
    /// order.
    pub fn on_change(&mut self, change: CacheChange) -> Vec<CacheChange> {
        let seq = change.sequence_number;
        if !self.info.reliable {
            if seq <= self.delivered_up_to {
                return Vec::new();
            }
            self.delivered_up_to = seq;
            return vec![change];
        }

        if seq <= self.delivered_up_to || self.tracker.is_accounted(seq) {
            log::trace!("[reader] duplicate seq {} from {}", seq, self.info.guid);
            return Vec::new();
        }
        if !self.tracker.accepts(seq) {
            // Not buffered: left unacknowledged so the writer resends it
            log::debug!(
                "[reader] missing window full, refusing seq {} from {}",
                seq,
                self.info.guid
            );
            return Vec::new();
        }
        self.tracker.on_receive(seq);
        self.pending.insert(seq, change);
        self.drain()
    }

    /// `range` and every member of `list` will never be sent.
    pub fn on_gap(
        &mut self,
        range: Range<SequenceNumber>,
        list: impl Iterator<Item = SequenceNumber>,
    ) -> Vec<CacheChange> {
        if !self.info.reliable {
            return Vec::new();
        }
        let start = range.start.max(self.delivered_up_to + 1);
        self.tracker.mark_irrelevant(start..range.end);
        for seq in list {
            if seq > self.delivered_up_to {
                self.tracker.mark_irrelevant(seq..seq + 1);
            }
        }
        self.drain()
    }

    /// Process a heartbeat. Returns the deliverable changes, plus the
    /// ACKNACK state to answer with (`None` when no answer is needed).
    pub fn on_heartbeat(
        &mut self,
        first: SequenceNumber,
        last: SequenceNumber,
        count: u32,
        final_flag: bool,
    ) -> (Vec<CacheChange>, Option<(SequenceNumberSet, u32)>) {
        if !self.info.reliable {
            return (Vec::new(), None);
        }
        if let Some(prev) = self.last_heartbeat_count {
            if count <= prev {
                return (Vec::new(), None);
            }
        }
        self.last_heartbeat_count = Some(count);

        // Below `first` the writer no longer holds anything
        if first > self.delivered_up_to + 1 {
            self.tracker.mark_irrelevant(self.delivered_up_to + 1..first);
            self.fragments.discard_below(first);
        }
        self.tracker.announce_up_to(last);
        let delivered = self.drain();

        let missing = self.tracker.missing_set();
        if final_flag && missing.is_empty() {
            return (delivered, None);
        }
        self.acknack_count += 1;
        (delivered, Some((missing, self.acknack_count)))
    }

    /// Current ACKNACK state without a heartbeat trigger.
    pub fn acknack_state(&mut self) -> (SequenceNumberSet, u32) {
        self.acknack_count += 1;
        (self.tracker.missing_set(), self.acknack_count)
    }

    pub fn has_missing(&self) -> bool {
        self.tracker.has_missing()
    }

    fn drain(&mut self) -> Vec<CacheChange> {
        let mut out = Vec::new();
        loop {
            let next = self.delivered_up_to + 1;
            if let Some(change) = self.pending.remove(&next) {
                out.push(change);
                self.delivered_up_to = next;
            } else if self.tracker.is_accounted(next) {
                // Declared irrelevant: skip the whole run up to the next
                // buffered change or hole
                let run_end = self.tracker.accounted_run_end(next);
                let stop = self
                    .pending
                    .range(next..)
                    .next()
                    .map_or(run_end, |(&seq, _)| seq.min(run_end));
                self.delivered_up_to = stop - 1;
            } else {
                break;
            }
        }
        out
    }
}

impl std::fmt::Debug for WriterProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterProxy")
            .field("guid", &self.info.guid)
            .field("delivered_up_to", &self.delivered_up_to)
            .field("pending", &self.pending.len())
            .finish()
    }
}
