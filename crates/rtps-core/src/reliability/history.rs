// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Endpoint history: ordered, bounded collection of cache changes.
//!
//! Changes are indexed by sequence number and by instance handle. Unkeyed
//! endpoints keep every change under the `NIL` instance, so the per-instance
//! depth of KEEP_LAST applies to them as well.
//!
//! The history is a plain data structure; the owning writer or reader
//! guards it with its own mutex so that sequence number assignment and
//! insertion happen atomically. Blocking on a full KEEP_ALL history is the
//! owner's job: [`History::admission`] only tells which change stands in
//! the way.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Instant;

use crate::core::guid::{InstanceHandle, GUID};
use crate::dds::{Error, Result};
use crate::protocol::SequenceNumber;

/// Special value meaning "no limit" (DDS LENGTH_UNLIMITED).
pub const LENGTH_UNLIMITED: usize = usize::MAX;

/// Kind of a cache change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Alive,
    NotAliveDisposed,
    NotAliveUnregistered,
    NotAliveDisposedUnregistered,
}

impl ChangeKind {
    pub fn as_u8(self) -> u8 {
        match self {
            ChangeKind::Alive => 0,
            ChangeKind::NotAliveDisposed => 1,
            ChangeKind::NotAliveUnregistered => 2,
            ChangeKind::NotAliveDisposedUnregistered => 3,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(ChangeKind::Alive),
            1 => Some(ChangeKind::NotAliveDisposed),
            2 => Some(ChangeKind::NotAliveUnregistered),
            3 => Some(ChangeKind::NotAliveDisposedUnregistered),
            _ => None,
        }
    }

    pub fn is_alive(self) -> bool {
        self == ChangeKind::Alive
    }

    pub fn is_unregistered(self) -> bool {
        matches!(
            self,
            ChangeKind::NotAliveUnregistered | ChangeKind::NotAliveDisposedUnregistered
        )
    }
}

/// History QoS kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    /// Keep the last N samples per instance.
    KeepLast(u32),
    /// Keep everything, bounded by resource limits.
    KeepAll,
}

impl Default for HistoryKind {
    fn default() -> Self {
        HistoryKind::KeepLast(1)
    }
}

/// Resource limits QoS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_samples: usize,
    pub max_instances: usize,
    pub max_samples_per_instance: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_samples: 5000,
            max_instances: 10,
            max_samples_per_instance: 400,
        }
    }
}

impl ResourceLimits {
    pub fn unlimited() -> Self {
        Self {
            max_samples: LENGTH_UNLIMITED,
            max_instances: LENGTH_UNLIMITED,
            max_samples_per_instance: LENGTH_UNLIMITED,
        }
    }
}

/// Identity of a sample: writer GUID plus sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleIdentity {
    pub writer_guid: GUID,
    pub sequence_number: SequenceNumber,
}

/// Optional parameters of a write.
#[derive(Debug, Clone, Default)]
pub struct WriteParams {
    /// Sample this one answers (request/reply correlation).
    pub related_sample_identity: Option<SampleIdentity>,
    /// Source timestamp in nanoseconds since the UNIX epoch; `None` uses now.
    pub source_timestamp: Option<u64>,
}

/// One sample held in a history.
#[derive(Debug, Clone)]
pub struct CacheChange {
    pub kind: ChangeKind,
    pub writer_guid: GUID,
    pub sequence_number: SequenceNumber,
    pub instance_handle: InstanceHandle,
    pub payload: Vec<u8>,
    /// Nanoseconds since the UNIX epoch.
    pub source_timestamp: u64,
    /// Local monotonic insertion time, base of lifespan expiry.
    pub written_at: Instant,
    /// Fragment size when the payload is sent in fragments.
    pub fragment_size: Option<u16>,
    pub related_sample_identity: Option<SampleIdentity>,
}

impl CacheChange {
    pub fn new(
        kind: ChangeKind,
        writer_guid: GUID,
        sequence_number: SequenceNumber,
        instance_handle: InstanceHandle,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            kind,
            writer_guid,
            sequence_number,
            instance_handle,
            payload,
            source_timestamp: crate::core::rt::current_time_ns(),
            written_at: Instant::now(),
            fragment_size: None,
            related_sample_identity: None,
        }
    }

    /// Number of fragments the payload is split into (1 when unfragmented).
    pub fn fragment_count(&self) -> u32 {
        match self.fragment_size {
            Some(size) if size > 0 => {
                let size = usize::from(size);
                self.payload.len().div_ceil(size).max(1) as u32
            }
            _ => 1,
        }
    }
}

/// What stands in the way of inserting one more change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Room available.
    Accept,
    /// KEEP_LAST: remove this change first.
    Evict(SequenceNumber),
    /// KEEP_ALL: this change must be acknowledged and removed first.
    Blocked(SequenceNumber),
}

#[derive(Debug, Default)]
struct InstanceEntry {
    changes: VecDeque<SequenceNumber>,
    next_deadline: Option<Instant>,
    /// Cleared by an unregistration, survives removal of the changes.
    registered: bool,
}

impl InstanceEntry {
    /// Unregistered and without samples: the slot can go to a new key.
    fn is_reclaimable(&self) -> bool {
        !self.registered && self.changes.is_empty()
    }
}

/// Ordered change storage with per-instance index.
#[derive(Debug)]
pub struct History {
    kind: HistoryKind,
    limits: ResourceLimits,
    keyed: bool,
    changes: BTreeMap<SequenceNumber, CacheChange>,
    instances: HashMap<InstanceHandle, InstanceEntry>,
    last_added: SequenceNumber,
    unacked_removed: u64,
}

impl History {
    pub fn new(kind: HistoryKind, limits: ResourceLimits, keyed: bool) -> Self {
        Self {
            kind,
            limits,
            keyed,
            changes: BTreeMap::new(),
            instances: HashMap::new(),
            last_added: 0,
            unacked_removed: 0,
        }
    }

    pub fn kind(&self) -> HistoryKind {
        self.kind
    }

    pub fn limits(&self) -> ResourceLimits {
        self.limits
    }

    pub fn is_keyed(&self) -> bool {
        self.keyed
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// True when the global sample limit is reached.
    pub fn is_full(&self) -> bool {
        self.changes.len() >= self.max_samples()
    }

    fn max_samples(&self) -> usize {
        match self.kind {
            // Unkeyed KEEP_LAST depth bounds the whole history
            HistoryKind::KeepLast(depth) if !self.keyed => {
                (depth as usize).min(self.limits.max_samples)
            }
            _ => self.limits.max_samples,
        }
    }

    fn instance_key(&self, handle: InstanceHandle) -> InstanceHandle {
        if self.keyed {
            handle
        } else {
            InstanceHandle::NIL
        }
    }

    /// Decide whether a change for `instance` fits.
    ///
    /// # Errors
    ///
    /// `ResourceLimitExceeded` when `instance` is new and `max_instances`
    /// instances are registered or still hold samples.
    pub fn admission(&self, instance: InstanceHandle) -> Result<Admission> {
        let key = self.instance_key(instance);

        if self.keyed
            && !self.instances.contains_key(&key)
            && self.instances.len() >= self.limits.max_instances
            && !self.instances.values().any(InstanceEntry::is_reclaimable)
        {
            return Err(Error::ResourceLimitExceeded(format!(
                "max_instances ({}) reached",
                self.limits.max_instances
            )));
        }

        if let Some(entry) = self.instances.get(&key) {
            if let Some(&oldest) = entry.changes.front() {
                match self.kind {
                    HistoryKind::KeepLast(depth) if entry.changes.len() >= depth as usize => {
                        return Ok(Admission::Evict(oldest));
                    }
                    HistoryKind::KeepAll
                        if entry.changes.len() >= self.limits.max_samples_per_instance =>
                    {
                        return Ok(Admission::Blocked(oldest));
                    }
                    _ => {}
                }
            }
        }

        if self.is_full() {
            if let Some(&min) = self.changes.keys().next() {
                return Ok(match self.kind {
                    HistoryKind::KeepLast(_) => Admission::Evict(min),
                    HistoryKind::KeepAll => Admission::Blocked(min),
                });
            }
        }

        Ok(Admission::Accept)
    }

    /// Insert `change`; the caller has obtained `Admission::Accept`.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the sequence number does not exceed every sequence
    /// number added before, `ResourceLimitExceeded` if there is no room.
    pub fn add_change(&mut self, change: CacheChange) -> Result<()> {
        if change.sequence_number <= self.last_added {
            return Err(Error::InvalidState(format!(
                "sequence number {} not above {}",
                change.sequence_number, self.last_added
            )));
        }
        if self.admission(change.instance_handle)? != Admission::Accept {
            return Err(Error::ResourceLimitExceeded("history full".into()));
        }
        self.insert_unchecked(change);
        Ok(())
    }

    /// Insert `change`, evicting under KEEP_LAST. Returns evicted changes.
    ///
    /// # Errors
    ///
    /// `ResourceLimitExceeded` when a KEEP_ALL limit is reached.
    pub fn add_change_evicting(&mut self, change: CacheChange) -> Result<Vec<CacheChange>> {
        let mut evicted = Vec::new();
        loop {
            match self.admission(change.instance_handle)? {
                Admission::Accept => break,
                Admission::Evict(seq) => {
                    if let Some(old) = self.remove_change(seq) {
                        evicted.push(old);
                    }
                }
                Admission::Blocked(_) => {
                    return Err(Error::ResourceLimitExceeded("history full".into()));
                }
            }
        }
        self.add_change(change)?;
        Ok(evicted)
    }

    /// Insert without limit checks (still keeps the ordering invariant).
    pub(crate) fn insert_unchecked(&mut self, change: CacheChange) {
        let key = self.instance_key(change.instance_handle);
        let seq = change.sequence_number;
        self.last_added = self.last_added.max(seq);
        if self.keyed && !self.instances.contains_key(&key) {
            self.reclaim_instance_slot();
        }
        let entry = self.instances.entry(key).or_default();
        entry.changes.push_back(seq);
        entry.registered = !change.kind.is_unregistered();
        self.changes.insert(seq, change);
    }

    fn reclaim_instance_slot(&mut self) {
        if self.instances.len() < self.limits.max_instances {
            return;
        }
        let reclaimable = self
            .instances
            .iter()
            .find(|(_, e)| e.is_reclaimable())
            .map(|(h, _)| *h);
        if let Some(handle) = reclaimable {
            self.instances.remove(&handle);
        }
    }

    /// Remove the change with sequence number `seq`.
    pub fn remove_change(&mut self, seq: SequenceNumber) -> Option<CacheChange> {
        let change = self.changes.remove(&seq)?;
        let key = self.instance_key(change.instance_handle);
        if let Some(entry) = self.instances.get_mut(&key) {
            entry.changes.retain(|s| *s != seq);
        }
        Some(change)
    }

    pub fn get_change(&self, seq: SequenceNumber) -> Option<&CacheChange> {
        self.changes.get(&seq)
    }

    /// Change with the lowest sequence number.
    pub fn get_min_change(&self) -> Option<&CacheChange> {
        self.changes.values().next()
    }

    /// Change with the highest sequence number.
    pub fn get_max_change(&self) -> Option<&CacheChange> {
        self.changes.values().next_back()
    }

    /// Change written first (lowest insertion instant).
    pub fn get_earliest_change(&self) -> Option<&CacheChange> {
        self.changes.values().min_by_key(|c| c.written_at)
    }

    pub fn min_seq(&self) -> Option<SequenceNumber> {
        self.changes.keys().next().copied()
    }

    pub fn max_seq(&self) -> Option<SequenceNumber> {
        self.changes.keys().next_back().copied()
    }

    /// Highest sequence number ever added, even if since removed.
    pub fn last_added_seq(&self) -> SequenceNumber {
        self.last_added
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &CacheChange> {
        self.changes.values()
    }

    /// Changes with sequence number `>= seq`, in order.
    pub fn changes_from(&self, seq: SequenceNumber) -> impl Iterator<Item = &CacheChange> {
        self.changes.range(seq..).map(|(_, c)| c)
    }

    pub fn contains(&self, seq: SequenceNumber) -> bool {
        self.changes.contains_key(&seq)
    }

    pub fn clear(&mut self) -> Vec<CacheChange> {
        for entry in self.instances.values_mut() {
            entry.changes.clear();
        }
        std::mem::take(&mut self.changes).into_values().collect()
    }

    // ========================================================================
    // Instances
    // ========================================================================

    /// Make `handle` known without adding a change.
    ///
    /// # Errors
    ///
    /// `ResourceLimitExceeded` when `max_instances` instances are registered
    /// or hold samples.
    pub fn register_instance(&mut self, handle: InstanceHandle) -> Result<()> {
        let key = self.instance_key(handle);
        if let Some(entry) = self.instances.get_mut(&key) {
            entry.registered = true;
            return Ok(());
        }
        if self.keyed && self.instances.len() >= self.limits.max_instances {
            self.reclaim_instance_slot();
            if self.instances.len() >= self.limits.max_instances {
                return Err(Error::ResourceLimitExceeded(format!(
                    "max_instances ({}) reached",
                    self.limits.max_instances
                )));
            }
        }
        self.instances.insert(
            key,
            InstanceEntry {
                registered: true,
                ..InstanceEntry::default()
            },
        );
        Ok(())
    }

    /// Registered: known, and not unregistered since.
    pub fn is_key_registered(&self, handle: InstanceHandle) -> bool {
        self.instances
            .get(&self.instance_key(handle))
            .map(|e| e.registered)
            .unwrap_or(false)
    }

    /// Remove every change of `handle` with sequence number `<= up_to`.
    pub fn remove_instance_changes(
        &mut self,
        handle: InstanceHandle,
        up_to: SequenceNumber,
    ) -> Vec<CacheChange> {
        let key = self.instance_key(handle);
        let seqs: Vec<SequenceNumber> = match self.instances.get(&key) {
            Some(entry) => entry.changes.iter().copied().filter(|s| *s <= up_to).collect(),
            None => return Vec::new(),
        };
        seqs.into_iter()
            .filter_map(|s| self.remove_change(s))
            .collect()
    }

    /// Forget an instance and all its changes.
    pub fn remove_instance(&mut self, handle: InstanceHandle) -> Vec<CacheChange> {
        let removed = self.remove_instance_changes(handle, SequenceNumber::MAX);
        self.instances.remove(&self.instance_key(handle));
        removed
    }

    /// Drop the entry of `handle` when it holds no samples, whatever its
    /// registration. Readers use this once the application took everything.
    pub fn release_instance_if_empty(&mut self, handle: InstanceHandle) -> bool {
        let key = self.instance_key(handle);
        let empty = self
            .instances
            .get(&key)
            .is_some_and(|e| e.changes.is_empty());
        if empty {
            self.instances.remove(&key);
        }
        empty
    }

    /// [`release_instance_if_empty`](Self::release_instance_if_empty) for
    /// every instance.
    pub fn release_empty_instances(&mut self) {
        self.instances.retain(|_, e| !e.changes.is_empty());
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn instance_changes(&self, handle: InstanceHandle) -> usize {
        self.instances
            .get(&self.instance_key(handle))
            .map(|e| e.changes.len())
            .unwrap_or(0)
    }

    pub fn instances(&self) -> impl Iterator<Item = &InstanceHandle> {
        self.instances.keys()
    }

    // ========================================================================
    // Deadlines
    // ========================================================================

    pub fn set_next_deadline(&mut self, handle: InstanceHandle, at: Instant) {
        let key = self.instance_key(handle);
        self.instances.entry(key).or_default().next_deadline = Some(at);
    }

    pub fn clear_deadline(&mut self, handle: InstanceHandle) {
        let key = self.instance_key(handle);
        if let Some(entry) = self.instances.get_mut(&key) {
            entry.next_deadline = None;
        }
    }

    pub fn clear_deadlines(&mut self) {
        for entry in self.instances.values_mut() {
            entry.next_deadline = None;
        }
    }

    /// Instance with the nearest deadline.
    pub fn get_next_deadline(&self) -> Option<(InstanceHandle, Instant)> {
        self.instances
            .iter()
            .filter_map(|(h, e)| e.next_deadline.map(|d| (*h, d)))
            .min_by_key(|(_, d)| *d)
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Record that a change was removed before every reader acknowledged it.
    pub fn note_unacked_removed(&mut self) {
        self.unacked_removed += 1;
    }

    pub fn unacked_removed_count(&self) -> u64 {
        self.unacked_removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::guid::{EntityId, GuidPrefix};

    fn writer() -> GUID {
        GUID::new(GuidPrefix([1; 12]), EntityId::user_writer(1, true))
    }

    fn key(b: u8) -> InstanceHandle {
        InstanceHandle([b; 16])
    }

    fn change(seq: SequenceNumber, instance: InstanceHandle) -> CacheChange {
        CacheChange::new(ChangeKind::Alive, writer(), seq, instance, vec![seq as u8])
    }

    #[test]
    fn test_keep_last_evicts_oldest_of_instance() {
        let mut h = History::new(HistoryKind::KeepLast(3), ResourceLimits::default(), true);
        for seq in 1..=4 {
            h.add_change_evicting(change(seq, key(1))).expect("add");
        }
        let seqs: Vec<_> = h.iter().map(|c| c.sequence_number).collect();
        assert_eq!(seqs, vec![2, 3, 4]);
    }

    #[test]
    fn test_keep_last_per_instance_isolated() {
        let mut h = History::new(HistoryKind::KeepLast(1), ResourceLimits::default(), true);
        h.add_change_evicting(change(1, key(1))).expect("add");
        h.add_change_evicting(change(2, key(2))).expect("add");
        h.add_change_evicting(change(3, key(1))).expect("add");
        let seqs: Vec<_> = h.iter().map(|c| c.sequence_number).collect();
        assert_eq!(seqs, vec![2, 3]);
    }

    #[test]
    fn test_unkeyed_depth_bounds_history() {
        let mut h = History::new(HistoryKind::KeepLast(2), ResourceLimits::default(), false);
        for seq in 1..=5 {
            h.add_change_evicting(change(seq, InstanceHandle::NIL)).expect("add");
        }
        assert_eq!(h.len(), 2);
        assert_eq!(h.get_min_change().map(|c| c.sequence_number), Some(4));
    }

    #[test]
    fn test_keep_all_reports_blocker() {
        let limits = ResourceLimits {
            max_samples: 2,
            max_instances: 4,
            max_samples_per_instance: 2,
        };
        let mut h = History::new(HistoryKind::KeepAll, limits, true);
        h.add_change(change(1, key(1))).expect("add");
        h.add_change(change(2, key(2))).expect("add");
        assert_eq!(h.admission(key(3)).expect("admission"), Admission::Blocked(1));
        assert!(h.add_change_evicting(change(3, key(3))).is_err());
    }

    #[test]
    fn test_max_instances_rejects_new_key() {
        let limits = ResourceLimits {
            max_samples: 10,
            max_instances: 1,
            max_samples_per_instance: 10,
        };
        let mut h = History::new(HistoryKind::KeepAll, limits, true);
        h.add_change(change(1, key(1))).expect("add");
        assert!(matches!(
            h.admission(key(2)),
            Err(Error::ResourceLimitExceeded(_))
        ));
        // Still registered: the slot stays taken after its samples go
        h.remove_change(1);
        assert!(h.admission(key(2)).is_err());

        let mut unreg = change(2, key(1));
        unreg.kind = ChangeKind::NotAliveUnregistered;
        h.add_change(unreg).expect("unregister");
        h.remove_change(2);
        h.add_change(change(3, key(2))).expect("reuse slot");
        assert_eq!(h.instance_count(), 1);
        assert!(!h.is_key_registered(key(1)));
    }

    #[test]
    fn test_registered_instance_keeps_its_slot() {
        let limits = ResourceLimits {
            max_samples: 10,
            max_instances: 2,
            max_samples_per_instance: 10,
        };
        let mut h = History::new(HistoryKind::KeepLast(1), limits, true);
        h.register_instance(key(1)).expect("register A");
        h.add_change(change(1, key(2))).expect("write B");

        assert!(matches!(
            h.add_change_evicting(change(2, key(3))),
            Err(Error::ResourceLimitExceeded(_))
        ));
        assert!(matches!(
            h.register_instance(key(3)),
            Err(Error::ResourceLimitExceeded(_))
        ));
        assert!(h.is_key_registered(key(1)));
        assert_eq!(h.instance_count(), 2);
    }

    #[test]
    fn test_release_empty_instances() {
        let mut h = History::new(HistoryKind::KeepAll, ResourceLimits::unlimited(), true);
        h.add_change(change(1, key(1))).expect("add");
        h.add_change(change(2, key(2))).expect("add");
        h.remove_change(1);
        assert!(h.release_instance_if_empty(key(1)));
        assert!(!h.release_instance_if_empty(key(2)));
        h.clear();
        h.release_empty_instances();
        assert_eq!(h.instance_count(), 0);
    }

    #[test]
    fn test_sequence_must_increase() {
        let mut h = History::new(HistoryKind::KeepAll, ResourceLimits::unlimited(), false);
        h.add_change(change(5, InstanceHandle::NIL)).expect("add");
        assert!(matches!(
            h.add_change(change(5, InstanceHandle::NIL)),
            Err(Error::InvalidState(_))
        ));
        assert!(h.add_change(change(3, InstanceHandle::NIL)).is_err());
    }

    #[test]
    fn test_remove_updates_instance_index() {
        let mut h = History::new(HistoryKind::KeepAll, ResourceLimits::unlimited(), true);
        h.add_change(change(1, key(1))).expect("add");
        h.add_change(change(2, key(1))).expect("add");
        assert_eq!(h.instance_changes(key(1)), 2);
        h.remove_change(1);
        assert_eq!(h.instance_changes(key(1)), 1);
        let removed = h.remove_instance_changes(key(1), 10);
        assert_eq!(removed.len(), 1);
        assert!(h.is_empty());
    }

    #[test]
    fn test_registration_tracks_unregister() {
        let mut h = History::new(HistoryKind::KeepAll, ResourceLimits::unlimited(), true);
        assert!(!h.is_key_registered(key(1)));
        h.register_instance(key(1)).expect("register");
        assert!(h.is_key_registered(key(1)));
        let mut unreg = change(1, key(1));
        unreg.kind = ChangeKind::NotAliveUnregistered;
        h.add_change(unreg).expect("add");
        assert!(!h.is_key_registered(key(1)));
    }

    #[test]
    fn test_next_deadline_is_nearest() {
        let mut h = History::new(HistoryKind::KeepAll, ResourceLimits::unlimited(), true);
        let now = Instant::now();
        h.set_next_deadline(key(1), now + std::time::Duration::from_secs(5));
        h.set_next_deadline(key(2), now + std::time::Duration::from_secs(1));
        assert_eq!(h.get_next_deadline().map(|(k, _)| k), Some(key(2)));
    }

    #[test]
    fn test_earliest_and_range() {
        let mut h = History::new(HistoryKind::KeepAll, ResourceLimits::unlimited(), false);
        for seq in 1..=4 {
            h.add_change(change(seq, InstanceHandle::NIL)).expect("add");
        }
        assert_eq!(h.get_earliest_change().map(|c| c.sequence_number), Some(1));
        let tail: Vec<_> = h.changes_from(3).map(|c| c.sequence_number).collect();
        assert_eq!(tail, vec![3, 4]);
        assert_eq!(h.max_seq(), Some(4));
    }

    #[test]
    fn test_fragment_count() {
        let mut c = change(1, InstanceHandle::NIL);
        c.payload = vec![0; 1000];
        assert_eq!(c.fragment_count(), 1);
        c.fragment_size = Some(256);
        assert_eq!(c.fragment_count(), 4);
    }
}
