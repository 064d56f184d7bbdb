// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Writer-side state for one matched reader.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::guid::GUID;
use crate::core::locator::Locator;
use crate::protocol::{SequenceNumber, SequenceNumberSet};

/// What a writer knows about a remote reader when matching it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteReaderInfo {
    pub guid: GUID,
    pub unicast_locators: Vec<Locator>,
    pub multicast_locators: Vec<Locator>,
    pub reliable: bool,
    /// Volatile readers ignore history written before they matched.
    pub volatile: bool,
    pub expects_inline_qos: bool,
}

impl RemoteReaderInfo {
    /// Locators to send to: unicast when known, multicast otherwise.
    pub fn destinations(&self) -> &[Locator] {
        if self.unicast_locators.is_empty() {
            &self.multicast_locators
        } else {
            &self.unicast_locators
        }
    }
}

/// Per matched reader bookkeeping.
///
/// `unsent` maps a sequence number to the next fragment number (1-based)
/// still to be sent, so flow control can pause in the middle of a
/// fragmented sample.
#[derive(Debug)]
pub struct ReaderProxy {
    pub info: RemoteReaderInfo,
    /// Highest sequence number with everything at or below acknowledged.
    acked_up_to: SequenceNumber,
    /// Sent but not acknowledged.
    outstanding: BTreeSet<SequenceNumber>,
    /// Negatively acknowledged, to be resent.
    requested: BTreeSet<SequenceNumber>,
    /// Waiting for (flow-controlled) transmission.
    unsent: BTreeMap<SequenceNumber, u32>,
    /// First sequence number this reader cares about.
    first_relevant: SequenceNumber,
    last_acknack_count: Option<u32>,
}

impl ReaderProxy {
    pub fn new(info: RemoteReaderInfo, first_relevant: SequenceNumber) -> Self {
        Self {
            info,
            acked_up_to: first_relevant.saturating_sub(1),
            outstanding: BTreeSet::new(),
            requested: BTreeSet::new(),
            unsent: BTreeMap::new(),
            first_relevant,
            last_acknack_count: None,
        }
    }

    pub fn guid(&self) -> GUID {
        self.info.guid
    }

    pub fn is_reliable(&self) -> bool {
        self.info.reliable
    }

    pub fn first_relevant(&self) -> SequenceNumber {
        self.first_relevant
    }

    pub fn acked_up_to(&self) -> SequenceNumber {
        self.acked_up_to
    }

    pub fn is_relevant(&self, seq: SequenceNumber) -> bool {
        seq >= self.first_relevant
    }

    /// Acknowledged, or irrelevant to this reader.
    pub fn is_acked(&self, seq: SequenceNumber) -> bool {
        seq <= self.acked_up_to || seq < self.first_relevant
    }

    /// Queue `seq` for first transmission.
    pub fn add_unsent(&mut self, seq: SequenceNumber) {
        if self.is_relevant(seq) {
            self.unsent.entry(seq).or_insert(1);
        }
    }

    pub fn has_unsent(&self) -> bool {
        !self.unsent.is_empty()
    }

    pub fn unsent(&self) -> impl Iterator<Item = (SequenceNumber, u32)> + '_ {
        self.unsent.iter().map(|(s, f)| (*s, *f))
    }

    /// Record progress through a fragmented sample.
    pub fn set_next_fragment(&mut self, seq: SequenceNumber, fragment: u32) {
        if let Some(next) = self.unsent.get_mut(&seq) {
            *next = fragment;
        }
    }

    /// `seq` has been fully transmitted.
    pub fn mark_sent(&mut self, seq: SequenceNumber) {
        self.unsent.remove(&seq);
        self.requested.remove(&seq);
        if self.info.reliable {
            if !self.is_acked(seq) {
                self.outstanding.insert(seq);
            }
        } else {
            // Best effort: sent means done
            self.acked_up_to = self.acked_up_to.max(seq);
        }
    }

    /// Change is gone from the history: nothing more to send for it.
    pub fn forget(&mut self, seq: SequenceNumber) {
        self.unsent.remove(&seq);
        self.requested.remove(&seq);
        self.outstanding.remove(&seq);
    }

    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    /// Apply an ACKNACK. Returns the newly requested sequence numbers, or
    /// `None` for a stale (already processed) ACKNACK.
    pub fn on_acknack(
        &mut self,
        state: &SequenceNumberSet,
        count: u32,
        last_seq: SequenceNumber,
    ) -> Option<Vec<SequenceNumber>> {
        if let Some(last) = self.last_acknack_count {
            if count <= last {
                return None;
            }
        }
        self.last_acknack_count = Some(count);

        let base = state.base();
        if base > 0 {
            // Readers may ack ahead of us after a writer restart; clamp
            self.acked_up_to = self.acked_up_to.max((base - 1).min(last_seq));
        }
        let acked = self.acked_up_to;
        self.outstanding.retain(|s| *s > acked);
        self.unsent.retain(|s, _| *s > acked);

        let mut requested = Vec::new();
        for seq in state.iter() {
            if seq <= last_seq && self.is_relevant(seq) {
                self.outstanding.remove(&seq);
                self.requested.insert(seq);
                requested.push(seq);
            }
        }
        Some(requested)
    }

    /// Take the pending retransmission requests.
    pub fn take_requested(&mut self) -> Vec<SequenceNumber> {
        std::mem::take(&mut self.requested).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::guid::{EntityId, GuidPrefix};

    fn info(reliable: bool) -> RemoteReaderInfo {
        RemoteReaderInfo {
            guid: GUID::new(GuidPrefix([2; 12]), EntityId::user_reader(1, false)),
            unicast_locators: vec![Locator::udpv4(std::net::Ipv4Addr::LOCALHOST, 7411)],
            multicast_locators: Vec::new(),
            reliable,
            volatile: true,
            expects_inline_qos: false,
        }
    }

    #[test]
    fn test_ack_progress() {
        let mut p = ReaderProxy::new(info(true), 1);
        for seq in 1..=3 {
            p.add_unsent(seq);
            p.mark_sent(seq);
        }
        assert_eq!(p.outstanding_count(), 3);
        let requested = p
            .on_acknack(&SequenceNumberSet::from_sequences(2, &[2]), 1, 3)
            .expect("fresh");
        assert_eq!(requested, vec![2]);
        assert!(p.is_acked(1));
        assert!(!p.is_acked(2));
        assert_eq!(p.take_requested(), vec![2]);
    }

    #[test]
    fn test_stale_acknack_ignored() {
        let mut p = ReaderProxy::new(info(true), 1);
        assert!(p
            .on_acknack(&SequenceNumberSet::empty(1), 5, 0)
            .is_some());
        assert!(p
            .on_acknack(&SequenceNumberSet::empty(1), 5, 0)
            .is_none());
    }

    #[test]
    fn test_best_effort_sent_is_acked() {
        let mut p = ReaderProxy::new(info(false), 1);
        p.add_unsent(1);
        p.mark_sent(1);
        assert!(p.is_acked(1));
        assert_eq!(p.outstanding_count(), 0);
    }

    #[test]
    fn test_late_joiner_ignores_older() {
        let mut p = ReaderProxy::new(info(true), 10);
        p.add_unsent(3);
        assert!(!p.has_unsent());
        assert!(p.is_acked(3));
        let requested = p
            .on_acknack(&SequenceNumberSet::from_sequences(5, &[5, 11]), 1, 12)
            .expect("fresh");
        assert_eq!(requested, vec![11]);
    }
}
