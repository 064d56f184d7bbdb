// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reader-side accounting of sequence numbers from one writer.
//!
//! A sequence number is *accounted* once it has been received or declared
//! irrelevant (GAP, or below the writer's heartbeat `first`). Everything at
//! or below `last_seen` that is not accounted is listed in `gaps`.
//!
//! ```text
//! accounted: 1 2 3 . . 6 7 . 9        last_seen = 9
//! gaps:            [4..6)   [8..9)
//! ack base = 4, missing = {4, 5, 8}
//! ```

use std::ops::Range;

use crate::protocol::{SequenceNumber, SequenceNumberSet};

/// Maximum number of gap ranges to track.
///
/// A change that would open one more range is refused (see
/// [`GapTracker::accepts`]); the writer resends it once the window drains.
pub const MAX_GAP_RANGES: usize = 128;

/// Missing-sequence tracker for one matched writer.
#[derive(Debug, Clone, Default)]
pub struct GapTracker {
    /// Highest sequence number known to exist (received or announced).
    last_seen: SequenceNumber,
    /// Sorted, disjoint, non-adjacent missing ranges, all `<= last_seen`.
    gaps: Vec<Range<SequenceNumber>>,
}

impl GapTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record reception of `seq`.
    pub fn on_receive(&mut self, seq: SequenceNumber) {
        if seq == 0 {
            return;
        }
        if seq > self.last_seen {
            if seq > self.last_seen + 1 {
                self.gaps.push(self.last_seen + 1..seq);
            }
            self.last_seen = seq;
        } else {
            self.fill(seq..seq + 1);
        }
    }

    /// Writer announced it holds up to `last`: everything not yet seen
    /// becomes missing.
    pub fn announce_up_to(&mut self, last: SequenceNumber) {
        if last > self.last_seen {
            self.gaps.push(self.last_seen + 1..last + 1);
            self.last_seen = last;
            self.merge();
        }
    }

    /// Declare `range` irrelevant (GAP, or below heartbeat `first`).
    pub fn mark_irrelevant(&mut self, range: Range<SequenceNumber>) {
        if range.start >= range.end {
            return;
        }
        if range.start > self.last_seen + 1 {
            self.gaps.push(self.last_seen + 1..range.start);
        }
        self.fill(range.clone());
        if range.end - 1 > self.last_seen {
            self.last_seen = range.end - 1;
        }
    }

    /// True once `seq` was received or declared irrelevant.
    pub fn is_accounted(&self, seq: SequenceNumber) -> bool {
        seq != 0 && seq <= self.last_seen && !self.gaps.iter().any(|g| g.contains(&seq))
    }

    /// False when recording `seq` would open a new missing range while
    /// [`MAX_GAP_RANGES`] are already tracked.
    pub fn accepts(&self, seq: SequenceNumber) -> bool {
        if self.gaps.len() < MAX_GAP_RANGES {
            return true;
        }
        if seq > self.last_seen {
            return seq == self.last_seen + 1;
        }
        // Filling strictly inside a range splits it in two
        !self
            .gaps
            .iter()
            .any(|g| g.start < seq && seq + 1 < g.end)
    }

    /// First sequence number at or after `seq` that is not accounted.
    /// `seq` itself must be accounted.
    pub fn accounted_run_end(&self, seq: SequenceNumber) -> SequenceNumber {
        self.gaps
            .iter()
            .map(|g| g.start)
            .find(|&start| start > seq)
            .unwrap_or(self.last_seen + 1)
    }

    /// Every sequence number below the returned base is accounted.
    pub fn ack_base(&self) -> SequenceNumber {
        self.gaps
            .first()
            .map(|g| g.start)
            .unwrap_or(self.last_seen + 1)
    }

    /// Missing sequence numbers as an ACKNACK state.
    pub fn missing_set(&self) -> SequenceNumberSet {
        let base = self.ack_base();
        let mut set = SequenceNumberSet::empty(base);
        'outer: for gap in &self.gaps {
            for seq in gap.clone() {
                if !set.insert(seq) {
                    break 'outer;
                }
            }
        }
        set
    }

    pub fn has_missing(&self) -> bool {
        !self.gaps.is_empty()
    }

    pub fn last_seen(&self) -> SequenceNumber {
        self.last_seen
    }

    pub fn pending_gaps(&self) -> &[Range<SequenceNumber>] {
        &self.gaps
    }

    pub fn total_missing(&self) -> u64 {
        self.gaps.iter().map(|r| r.end - r.start).sum()
    }

    /// Forget everything (the writer restarted).
    pub fn reset(&mut self) {
        self.last_seen = 0;
        self.gaps.clear();
    }

    fn fill(&mut self, filled: Range<SequenceNumber>) {
        let mut updated = Vec::with_capacity(self.gaps.len() + 1);
        for gap in self.gaps.drain(..) {
            if filled.end <= gap.start || filled.start >= gap.end {
                updated.push(gap);
                continue;
            }
            if gap.start < filled.start {
                updated.push(gap.start..filled.start);
            }
            if filled.end < gap.end {
                updated.push(filled.end..gap.end);
            }
        }
        self.gaps = updated;
    }

    fn merge(&mut self) {
        self.gaps.sort_by_key(|r| r.start);
        let mut merged: Vec<Range<SequenceNumber>> = Vec::with_capacity(self.gaps.len());
        for gap in self.gaps.drain(..) {
            match merged.last_mut() {
                Some(last) if gap.start <= last.end => last.end = last.end.max(gap.end),
                _ => merged.push(gap),
            }
        }
        self.gaps = merged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_no_gap() {
        let mut t = GapTracker::new();
        t.on_receive(1);
        t.on_receive(2);
        assert!(!t.has_missing());
        assert_eq!(t.ack_base(), 3);
    }

    #[test]
    fn test_forward_jump_and_fill() {
        let mut t = GapTracker::new();
        t.on_receive(1);
        t.on_receive(5);
        assert_eq!(t.pending_gaps(), &[2..5]);
        t.on_receive(3);
        assert_eq!(t.pending_gaps(), &[2..3, 4..5]);
        assert_eq!(t.missing_set().iter().collect::<Vec<_>>(), vec![2, 4]);
        assert_eq!(t.ack_base(), 2);
        assert!(t.is_accounted(3));
        assert!(!t.is_accounted(4));
    }

    #[test]
    fn test_heartbeat_announces_missing() {
        let mut t = GapTracker::new();
        t.on_receive(1);
        t.announce_up_to(4);
        assert_eq!(t.total_missing(), 3);
        assert_eq!(t.missing_set().iter().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn test_irrelevant_ranges() {
        let mut t = GapTracker::new();
        t.announce_up_to(6);
        t.mark_irrelevant(1..4);
        assert_eq!(t.ack_base(), 4);
        t.mark_irrelevant(4..10);
        assert!(!t.has_missing());
        assert_eq!(t.last_seen(), 9);
        assert_eq!(t.ack_base(), 10);
    }

    #[test]
    fn test_window_full_refuses_new_ranges() {
        let mut t = GapTracker::new();
        for i in 0..MAX_GAP_RANGES as u64 {
            t.on_receive(2 * i + 1);
        }
        // 1, 3, 5 ... leaves a hole before every odd number but the first
        assert_eq!(t.pending_gaps().len(), MAX_GAP_RANGES - 1);
        t.on_receive(2 * MAX_GAP_RANGES as u64 + 1);
        assert_eq!(t.pending_gaps().len(), MAX_GAP_RANGES);

        let next_odd = 2 * MAX_GAP_RANGES as u64 + 3;
        assert!(!t.accepts(next_odd));
        assert!(t.accepts(2 * MAX_GAP_RANGES as u64 + 2));
        assert!(t.accepts(2));
        // Nothing was given up on
        assert_eq!(t.ack_base(), 2);
        assert!(!t.is_accounted(2));
    }

    #[test]
    fn test_accounted_run_end() {
        let mut t = GapTracker::new();
        t.on_receive(1);
        t.on_receive(2);
        t.on_receive(6);
        assert_eq!(t.accounted_run_end(1), 3);
        assert_eq!(t.accounted_run_end(6), 7);
        t.mark_irrelevant(3..1_000_000);
        assert_eq!(t.accounted_run_end(1), 1_000_000);
    }

    #[test]
    fn test_reset() {
        let mut t = GapTracker::new();
        t.on_receive(7);
        t.reset();
        assert_eq!(t.last_seen(), 0);
        assert!(!t.has_missing());
    }
}
