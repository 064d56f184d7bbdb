// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Status structures and closure-based listeners.
//!
//! A listener is a set of optional callbacks plus a [`StatusMask`]. A
//! callback only runs when it is set and its status bit is enabled in the
//! mask; when it runs, the `*_change` fields of the status are reset, as if
//! the application had read the status.
//!
//! ```
//! use rtps_core::dds::{StatusMask, WriterListener};
//!
//! let listener = WriterListener::new()
//!     .on_publication_matched(|_writer, status| {
//!         println!("matched readers: {}", status.current_count);
//!     })
//!     .with_mask(StatusMask::PUBLICATION_MATCHED);
//! # let _ = listener;
//! ```
//!
//! # Thread Safety
//!
//! Callbacks run on the scheduler thread or on a receive thread. They must
//! be `Send + Sync` and should not block.

use std::time::Duration;

use crate::core::discovery::ParticipantProxyData;
use crate::core::guid::{InstanceHandle, GUID};
use crate::dds::qos::QosPolicyId;

// ============================================================================
// StatusMask
// ============================================================================

/// Communication status bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMask(u32);

impl StatusMask {
    pub const NONE: StatusMask = StatusMask(0);
    pub const ALL: StatusMask = StatusMask(0xFFFF_FFFF);

    /// Data available to read (DataReader)
    pub const DATA_AVAILABLE: StatusMask = StatusMask(1 << 0);
    /// Liveliness changed (DataReader)
    pub const LIVELINESS_CHANGED: StatusMask = StatusMask(1 << 3);
    /// Requested incompatible QoS (DataReader)
    pub const REQUESTED_INCOMPATIBLE_QOS: StatusMask = StatusMask(1 << 5);
    /// Subscription matched (DataReader)
    pub const SUBSCRIPTION_MATCHED: StatusMask = StatusMask(1 << 6);
    /// Liveliness lost (DataWriter)
    pub const LIVELINESS_LOST: StatusMask = StatusMask(1 << 7);
    /// Offered deadline missed (DataWriter)
    pub const OFFERED_DEADLINE_MISSED: StatusMask = StatusMask(1 << 8);
    /// Offered incompatible QoS (DataWriter)
    pub const OFFERED_INCOMPATIBLE_QOS: StatusMask = StatusMask(1 << 9);
    /// Publication matched (DataWriter)
    pub const PUBLICATION_MATCHED: StatusMask = StatusMask(1 << 10);
    /// Participant discovery events (DomainParticipant)
    pub const PARTICIPANT_DISCOVERY: StatusMask = StatusMask(1 << 16);

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        StatusMask(bits)
    }

    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(&self, other: StatusMask) -> bool {
        (self.0 & other.0) == other.0
    }

    #[must_use]
    pub const fn or(self, other: StatusMask) -> Self {
        StatusMask(self.0 | other.0)
    }

    #[must_use]
    pub const fn without(self, other: StatusMask) -> Self {
        StatusMask(self.0 & !other.0)
    }
}

impl Default for StatusMask {
    fn default() -> Self {
        StatusMask::ALL
    }
}

impl std::ops::BitOr for StatusMask {
    type Output = StatusMask;

    fn bitor(self, rhs: StatusMask) -> StatusMask {
        self.or(rhs)
    }
}

// ============================================================================
// Statuses
// ============================================================================

/// Publication matching events (DataWriter).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublicationMatchedStatus {
    pub total_count: u32,
    pub total_count_change: i32,
    pub current_count: u32,
    pub current_count_change: i32,
    /// Reader of the last match or unmatch.
    pub last_subscription_handle: Option<GUID>,
}

impl PublicationMatchedStatus {
    pub(crate) fn matched(&mut self, reader: GUID) {
        self.total_count += 1;
        self.total_count_change += 1;
        self.current_count += 1;
        self.current_count_change += 1;
        self.last_subscription_handle = Some(reader);
    }

    pub(crate) fn unmatched(&mut self, reader: GUID) {
        self.current_count = self.current_count.saturating_sub(1);
        self.current_count_change -= 1;
        self.last_subscription_handle = Some(reader);
    }

    pub(crate) fn reset_changes(&mut self) {
        self.total_count_change = 0;
        self.current_count_change = 0;
    }
}

/// Subscription matching events (DataReader).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionMatchedStatus {
    pub total_count: u32,
    pub total_count_change: i32,
    pub current_count: u32,
    pub current_count_change: i32,
    /// Writer of the last match or unmatch.
    pub last_publication_handle: Option<GUID>,
}

impl SubscriptionMatchedStatus {
    pub(crate) fn matched(&mut self, writer: GUID) {
        self.total_count += 1;
        self.total_count_change += 1;
        self.current_count += 1;
        self.current_count_change += 1;
        self.last_publication_handle = Some(writer);
    }

    pub(crate) fn unmatched(&mut self, writer: GUID) {
        self.current_count = self.current_count.saturating_sub(1);
        self.current_count_change -= 1;
        self.last_publication_handle = Some(writer);
    }

    pub(crate) fn reset_changes(&mut self) {
        self.total_count_change = 0;
        self.current_count_change = 0;
    }
}

/// Missed offered deadlines (DataWriter).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferedDeadlineMissedStatus {
    pub total_count: u32,
    pub total_count_change: i32,
    pub last_instance_handle: InstanceHandle,
}

impl OfferedDeadlineMissedStatus {
    pub(crate) fn missed(&mut self, instance: InstanceHandle) {
        self.total_count += 1;
        self.total_count_change += 1;
        self.last_instance_handle = instance;
    }

    pub(crate) fn reset_changes(&mut self) {
        self.total_count_change = 0;
    }
}

/// Times the writer failed to assert its liveliness (DataWriter).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LivelinessLostStatus {
    pub total_count: u32,
    pub total_count_change: i32,
}

impl LivelinessLostStatus {
    pub(crate) fn lost(&mut self) {
        self.total_count += 1;
        self.total_count_change += 1;
    }

    pub(crate) fn reset_changes(&mut self) {
        self.total_count_change = 0;
    }
}

/// Liveliness of the matched writers (DataReader).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LivelinessChangedStatus {
    pub alive_count: u32,
    pub alive_count_change: i32,
    pub not_alive_count: u32,
    pub not_alive_count_change: i32,
    pub last_publication_handle: Option<GUID>,
}

impl LivelinessChangedStatus {
    /// A writer became alive; `was_not_alive` when it recovers.
    pub(crate) fn became_alive(&mut self, writer: GUID, was_not_alive: bool) {
        self.alive_count += 1;
        self.alive_count_change += 1;
        if was_not_alive {
            self.not_alive_count = self.not_alive_count.saturating_sub(1);
            self.not_alive_count_change -= 1;
        }
        self.last_publication_handle = Some(writer);
    }

    pub(crate) fn became_not_alive(&mut self, writer: GUID) {
        self.alive_count = self.alive_count.saturating_sub(1);
        self.alive_count_change -= 1;
        self.not_alive_count += 1;
        self.not_alive_count_change += 1;
        self.last_publication_handle = Some(writer);
    }

    /// An unmatched writer leaves the counts.
    pub(crate) fn removed(&mut self, writer: GUID, was_alive: bool) {
        if was_alive {
            self.alive_count = self.alive_count.saturating_sub(1);
            self.alive_count_change -= 1;
        } else {
            self.not_alive_count = self.not_alive_count.saturating_sub(1);
            self.not_alive_count_change -= 1;
        }
        self.last_publication_handle = Some(writer);
    }

    pub(crate) fn reset_changes(&mut self) {
        self.alive_count_change = 0;
        self.not_alive_count_change = 0;
    }
}

/// Incompatible QoS counters shared by both sides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncompatibleQosStatus {
    pub total_count: u32,
    pub total_count_change: i32,
    /// Numeric id of the policy reported last.
    pub last_policy_id: u32,
    /// Per-policy counts.
    pub policies: Vec<(QosPolicyId, u32)>,
}

impl IncompatibleQosStatus {
    pub(crate) fn record(&mut self, failed: &[QosPolicyId]) {
        let Some(last) = failed.last() else {
            return;
        };
        self.total_count += 1;
        self.total_count_change += 1;
        self.last_policy_id = last.id();
        for id in failed {
            match self.policies.iter_mut().find(|(p, _)| p == id) {
                Some((_, count)) => *count += 1,
                None => self.policies.push((*id, 1)),
            }
        }
    }

    /// How many times `policy` was reported.
    pub fn count_for(&self, policy: QosPolicyId) -> u32 {
        self.policies
            .iter()
            .find(|(p, _)| *p == policy)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    }

    pub(crate) fn reset_changes(&mut self) {
        self.total_count_change = 0;
    }
}

/// Writer-side incompatible QoS status.
pub type OfferedIncompatibleQosStatus = IncompatibleQosStatus;
/// Reader-side incompatible QoS status.
pub type RequestedIncompatibleQosStatus = IncompatibleQosStatus;

/// Participant discovery event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantDiscoveryStatus {
    Discovered,
    Changed,
    /// Removed by a dispose announcement.
    Removed,
    /// Lease expired.
    Dropped,
}

/// Participant discovery event.
#[derive(Debug, Clone)]
pub struct ParticipantDiscoveryInfo {
    pub status: ParticipantDiscoveryStatus,
    pub data: ParticipantProxyData,
}

// ============================================================================
// Listeners
// ============================================================================

type Callback<A, S> = Box<dyn Fn(A, &S) + Send + Sync>;

/// DataWriter callbacks.
pub struct WriterListener {
    mask: StatusMask,
    publication_matched: Option<Callback<GUID, PublicationMatchedStatus>>,
    offered_deadline_missed: Option<Callback<GUID, OfferedDeadlineMissedStatus>>,
    offered_incompatible_qos: Option<Callback<GUID, OfferedIncompatibleQosStatus>>,
    liveliness_lost: Option<Callback<GUID, LivelinessLostStatus>>,
}

impl Default for WriterListener {
    fn default() -> Self {
        Self::new()
    }
}

impl WriterListener {
    pub fn new() -> Self {
        Self {
            mask: StatusMask::ALL,
            publication_matched: None,
            offered_deadline_missed: None,
            offered_incompatible_qos: None,
            liveliness_lost: None,
        }
    }

    pub fn with_mask(mut self, mask: StatusMask) -> Self {
        self.mask = mask;
        self
    }

    pub fn mask(&self) -> StatusMask {
        self.mask
    }

    pub fn on_publication_matched<F>(mut self, f: F) -> Self
    where
        F: Fn(GUID, &PublicationMatchedStatus) + Send + Sync + 'static,
    {
        self.publication_matched = Some(Box::new(f));
        self
    }

    pub fn on_offered_deadline_missed<F>(mut self, f: F) -> Self
    where
        F: Fn(GUID, &OfferedDeadlineMissedStatus) + Send + Sync + 'static,
    {
        self.offered_deadline_missed = Some(Box::new(f));
        self
    }

    pub fn on_offered_incompatible_qos<F>(mut self, f: F) -> Self
    where
        F: Fn(GUID, &OfferedIncompatibleQosStatus) + Send + Sync + 'static,
    {
        self.offered_incompatible_qos = Some(Box::new(f));
        self
    }

    pub fn on_liveliness_lost<F>(mut self, f: F) -> Self
    where
        F: Fn(GUID, &LivelinessLostStatus) + Send + Sync + 'static,
    {
        self.liveliness_lost = Some(Box::new(f));
        self
    }

    /// Returns true when the callback consumed the status.
    pub(crate) fn publication_matched(&self, writer: GUID, status: &PublicationMatchedStatus) -> bool {
        fire(self.mask, StatusMask::PUBLICATION_MATCHED, &self.publication_matched, writer, status)
    }

    pub(crate) fn offered_deadline_missed(
        &self,
        writer: GUID,
        status: &OfferedDeadlineMissedStatus,
    ) -> bool {
        fire(
            self.mask,
            StatusMask::OFFERED_DEADLINE_MISSED,
            &self.offered_deadline_missed,
            writer,
            status,
        )
    }

    pub(crate) fn offered_incompatible_qos(
        &self,
        writer: GUID,
        status: &OfferedIncompatibleQosStatus,
    ) -> bool {
        fire(
            self.mask,
            StatusMask::OFFERED_INCOMPATIBLE_QOS,
            &self.offered_incompatible_qos,
            writer,
            status,
        )
    }

    pub(crate) fn liveliness_lost(&self, writer: GUID, status: &LivelinessLostStatus) -> bool {
        fire(self.mask, StatusMask::LIVELINESS_LOST, &self.liveliness_lost, writer, status)
    }
}

impl std::fmt::Debug for WriterListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterListener").field("mask", &self.mask).finish()
    }
}

/// DataReader callbacks.
pub struct ReaderListener {
    mask: StatusMask,
    data_available: Option<Box<dyn Fn(GUID) + Send + Sync>>,
    subscription_matched: Option<Callback<GUID, SubscriptionMatchedStatus>>,
    requested_incompatible_qos: Option<Callback<GUID, RequestedIncompatibleQosStatus>>,
    liveliness_changed: Option<Callback<GUID, LivelinessChangedStatus>>,
}

impl Default for ReaderListener {
    fn default() -> Self {
        Self::new()
    }
}

impl ReaderListener {
    pub fn new() -> Self {
        Self {
            mask: StatusMask::ALL,
            data_available: None,
            subscription_matched: None,
            requested_incompatible_qos: None,
            liveliness_changed: None,
        }
    }

    pub fn with_mask(mut self, mask: StatusMask) -> Self {
        self.mask = mask;
        self
    }

    pub fn mask(&self) -> StatusMask {
        self.mask
    }

    pub fn on_data_available<F>(mut self, f: F) -> Self
    where
        F: Fn(GUID) + Send + Sync + 'static,
    {
        self.data_available = Some(Box::new(f));
        self
    }

    pub fn on_subscription_matched<F>(mut self, f: F) -> Self
    where
        F: Fn(GUID, &SubscriptionMatchedStatus) + Send + Sync + 'static,
    {
        self.subscription_matched = Some(Box::new(f));
        self
    }

    pub fn on_requested_incompatible_qos<F>(mut self, f: F) -> Self
    where
        F: Fn(GUID, &RequestedIncompatibleQosStatus) + Send + Sync + 'static,
    {
        self.requested_incompatible_qos = Some(Box::new(f));
        self
    }

    pub fn on_liveliness_changed<F>(mut self, f: F) -> Self
    where
        F: Fn(GUID, &LivelinessChangedStatus) + Send + Sync + 'static,
    {
        self.liveliness_changed = Some(Box::new(f));
        self
    }

    pub(crate) fn data_available(&self, reader: GUID) -> bool {
        match &self.data_available {
            Some(cb) if self.mask.contains(StatusMask::DATA_AVAILABLE) => {
                cb(reader);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn subscription_matched(
        &self,
        reader: GUID,
        status: &SubscriptionMatchedStatus,
    ) -> bool {
        fire(
            self.mask,
            StatusMask::SUBSCRIPTION_MATCHED,
            &self.subscription_matched,
            reader,
            status,
        )
    }

    pub(crate) fn requested_incompatible_qos(
        &self,
        reader: GUID,
        status: &RequestedIncompatibleQosStatus,
    ) -> bool {
        fire(
            self.mask,
            StatusMask::REQUESTED_INCOMPATIBLE_QOS,
            &self.requested_incompatible_qos,
            reader,
            status,
        )
    }

    pub(crate) fn liveliness_changed(&self, reader: GUID, status: &LivelinessChangedStatus) -> bool {
        fire(
            self.mask,
            StatusMask::LIVELINESS_CHANGED,
            &self.liveliness_changed,
            reader,
            status,
        )
    }
}

impl std::fmt::Debug for ReaderListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderListener").field("mask", &self.mask).finish()
    }
}

/// DomainParticipant callbacks.
pub struct ParticipantListener {
    mask: StatusMask,
    participant_discovery: Option<Box<dyn Fn(&ParticipantDiscoveryInfo) + Send + Sync>>,
}

impl Default for ParticipantListener {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticipantListener {
    pub fn new() -> Self {
        Self {
            mask: StatusMask::ALL,
            participant_discovery: None,
        }
    }

    pub fn with_mask(mut self, mask: StatusMask) -> Self {
        self.mask = mask;
        self
    }

    pub fn on_participant_discovery<F>(mut self, f: F) -> Self
    where
        F: Fn(&ParticipantDiscoveryInfo) + Send + Sync + 'static,
    {
        self.participant_discovery = Some(Box::new(f));
        self
    }

    pub(crate) fn participant_discovery(&self, info: &ParticipantDiscoveryInfo) {
        if let Some(cb) = &self.participant_discovery {
            if self.mask.contains(StatusMask::PARTICIPANT_DISCOVERY) {
                cb(info);
            }
        }
    }
}

impl std::fmt::Debug for ParticipantListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticipantListener")
            .field("mask", &self.mask)
            .finish()
    }
}

fn fire<S>(
    mask: StatusMask,
    bit: StatusMask,
    callback: &Option<Callback<GUID, S>>,
    entity: GUID,
    status: &S,
) -> bool {
    match callback {
        Some(cb) if mask.contains(bit) => {
            cb(entity, status);
            true
        }
        _ => false,
    }
}

/// Convert a policy period to milliseconds for log lines.
pub(crate) fn millis(d: Duration) -> u128 {
    if d == Duration::MAX {
        u128::MAX
    } else {
        d.as_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::guid::{EntityId, GuidPrefix};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn writer_guid() -> GUID {
        GUID::new(GuidPrefix([1; 12]), EntityId::user_writer(1, false))
    }

    #[test]
    fn test_mask_gates_callbacks() {
        let hits = Arc::new(AtomicU32::new(0));
        let h = Arc::clone(&hits);
        let listener = WriterListener::new()
            .on_publication_matched(move |_, _| {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .with_mask(StatusMask::OFFERED_DEADLINE_MISSED);
        let status = PublicationMatchedStatus::default();
        assert!(!listener.publication_matched(writer_guid(), &status));

        let listener = WriterListener::new().on_publication_matched({
            let h = Arc::clone(&hits);
            move |_, s| {
                assert_eq!(s.current_count_change, 1);
                h.fetch_add(1, Ordering::SeqCst);
            }
        });
        let mut status = PublicationMatchedStatus::default();
        status.matched(writer_guid());
        assert!(listener.publication_matched(writer_guid(), &status));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_incompatible_qos_counts_per_policy() {
        let mut status = IncompatibleQosStatus::default();
        status.record(&[QosPolicyId::Reliability, QosPolicyId::Durability]);
        status.record(&[QosPolicyId::Durability]);
        status.record(&[]);
        assert_eq!(status.total_count, 2);
        assert_eq!(status.last_policy_id, QosPolicyId::Durability.id());
        assert_eq!(status.count_for(QosPolicyId::Durability), 2);
        assert_eq!(status.count_for(QosPolicyId::Reliability), 1);
        assert_eq!(status.count_for(QosPolicyId::Partition), 0);
    }

    #[test]
    fn test_liveliness_changed_transitions() {
        let mut status = LivelinessChangedStatus::default();
        status.became_alive(writer_guid(), false);
        status.became_not_alive(writer_guid());
        status.became_alive(writer_guid(), true);
        assert_eq!(status.alive_count, 1);
        assert_eq!(status.not_alive_count, 0);
        status.removed(writer_guid(), true);
        assert_eq!(status.alive_count, 0);
        status.reset_changes();
        assert_eq!(status.alive_count_change, 0);
    }
}
