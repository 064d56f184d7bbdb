// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DDS Quality of Service policies.
//!
//! [`DataWriterQos`] and [`DataReaderQos`] aggregate the policies relevant
//! to this core. Both are plain values built with chained methods:
//!
//! ```
//! use rtps_core::dds::DataWriterQos;
//! use std::time::Duration;
//!
//! let qos = DataWriterQos::default()
//!     .reliable()
//!     .keep_last(10)
//!     .deadline(Duration::from_millis(100));
//! assert!(qos.check().is_ok());
//! ```
//!
//! Durations equal to [`INFINITE`] disable the corresponding timer.

mod check;

pub use check::{check_reader_qos, check_writer_qos, immutable_changes};

use std::time::Duration;

use crate::config::{HEARTBEAT_PERIOD, MAX_BLOCKING_TIME};
use crate::congestion::ThroughputController;
use crate::dds::Result;
use crate::reliability::{HistoryKind, ResourceLimits};

/// Infinite duration (no deadline, no lifespan, no lease).
pub const INFINITE: Duration = Duration::MAX;

// ============================================================================
// Policies
// ============================================================================

/// RELIABILITY kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Reliability {
    BestEffort,
    Reliable,
}

/// DURABILITY kind, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Durability {
    Volatile,
    TransientLocal,
    Transient,
    Persistent,
}

impl Durability {
    /// Late joiners receive the writer history.
    pub fn is_durable(self) -> bool {
        self != Durability::Volatile
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Durability::Volatile => 0,
            Durability::TransientLocal => 1,
            Durability::Transient => 2,
            Durability::Persistent => 3,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Durability::Volatile),
            1 => Some(Durability::TransientLocal),
            2 => Some(Durability::Transient),
            3 => Some(Durability::Persistent),
            _ => None,
        }
    }
}

/// LIVELINESS kind, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LivelinessKind {
    Automatic,
    ManualByParticipant,
    ManualByTopic,
}

impl LivelinessKind {
    pub fn as_u8(self) -> u8 {
        match self {
            LivelinessKind::Automatic => 0,
            LivelinessKind::ManualByParticipant => 1,
            LivelinessKind::ManualByTopic => 2,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(LivelinessKind::Automatic),
            1 => Some(LivelinessKind::ManualByParticipant),
            2 => Some(LivelinessKind::ManualByTopic),
            _ => None,
        }
    }
}

/// LIVELINESS policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Liveliness {
    pub kind: LivelinessKind,
    pub lease_duration: Duration,
    /// How often an AUTOMATIC / MANUAL_BY_PARTICIPANT writer's participant
    /// asserts it.
    pub announcement_period: Duration,
}

impl Default for Liveliness {
    fn default() -> Self {
        Self {
            kind: LivelinessKind::Automatic,
            lease_duration: INFINITE,
            announcement_period: INFINITE,
        }
    }
}

impl Liveliness {
    /// Lease with an announcement period of a third of it.
    pub fn new(kind: LivelinessKind, lease_duration: Duration) -> Self {
        let announcement_period = if lease_duration == INFINITE {
            INFINITE
        } else {
            lease_duration / 3
        };
        Self {
            kind,
            lease_duration,
            announcement_period,
        }
    }
}

/// OWNERSHIP kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OwnershipKind {
    #[default]
    Shared,
    Exclusive,
}

/// DESTINATION_ORDER kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum DestinationOrderKind {
    #[default]
    ByReceptionTimestamp,
    BySourceTimestamp,
}

/// PARTITION policy. Empty means the default partition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Partition {
    pub names: Vec<String>,
}

impl Partition {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.names.is_empty()
    }

    /// Both default, or at least one pair of names matching.
    ///
    /// An empty name stands for the default partition, and names match as
    /// fnmatch patterns (`*`, `?`, `[...]`) tried in both directions.
    pub fn intersects(&self, other: &Partition) -> bool {
        match (self.is_default(), other.is_default()) {
            (true, true) => true,
            (true, false) => other.names.iter().any(String::is_empty),
            (false, true) => self.names.iter().any(String::is_empty),
            (false, false) => self
                .names
                .iter()
                .any(|a| other.names.iter().any(|b| names_match(a, b))),
        }
    }
}

fn names_match(a: &str, b: &str) -> bool {
    glob_match(a.as_bytes(), b.as_bytes()) || glob_match(b.as_bytes(), a.as_bytes())
}

/// Backtracking fnmatch over bytes. An unterminated `[` is a literal.
fn glob_match(pattern: &[u8], name: &[u8]) -> bool {
    let (mut p, mut n) = (0usize, 0usize);
    // Position after the last `*` and the name index it was resumed at
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        let step = match pattern.get(p) {
            Some(b'*') => {
                star = Some((p + 1, n));
                p += 1;
                continue;
            }
            Some(b'?') => Some(p + 1),
            Some(b'[') => match class_match(&pattern[p..], name[n]) {
                Some((true, len)) => Some(p + len),
                Some((false, _)) => None,
                None => (name[n] == b'[').then_some(p + 1),
            },
            Some(&c) => (c == name[n]).then_some(p + 1),
            None => None,
        };
        match (step, star) {
            (Some(next), _) => {
                p = next;
                n += 1;
            }
            (None, Some((after, resumed))) => {
                star = Some((after, resumed + 1));
                p = after;
                n = resumed + 1;
            }
            (None, None) => return false,
        }
    }
    pattern[p..].iter().all(|&c| c == b'*')
}

/// Match `c` against the bracket class at the start of `class`.
/// Returns (matched, class length), or None when the class is unterminated.
fn class_match(class: &[u8], c: u8) -> Option<(bool, usize)> {
    let mut i = 1;
    let negated = matches!(class.get(i), Some(b'!') | Some(b'^'));
    if negated {
        i += 1;
    }
    let mut hit = false;
    let mut first = true;
    loop {
        let lo = *class.get(i)?;
        if lo == b']' && !first {
            return Some((hit != negated, i + 1));
        }
        first = false;
        match (class.get(i + 1), class.get(i + 2)) {
            (Some(b'-'), Some(&hi)) if hi != b']' => {
                hit |= (lo..=hi).contains(&c);
                i += 3;
            }
            _ => {
                hit |= lo == c;
                i += 1;
            }
        }
    }
}

/// WRITER_DATA_LIFECYCLE policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterDataLifecycle {
    /// Unregistering an instance also disposes it.
    pub autodispose_unregistered_instances: bool,
}

impl Default for WriterDataLifecycle {
    fn default() -> Self {
        Self {
            autodispose_unregistered_instances: true,
        }
    }
}

/// Policy identifiers reported by incompatible-QoS statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QosPolicyId {
    Durability,
    Deadline,
    Ownership,
    Liveliness,
    Partition,
    Reliability,
    DestinationOrder,
}

impl QosPolicyId {
    /// Numeric id as assigned by the OMG DDS standard.
    pub fn id(self) -> u32 {
        match self {
            QosPolicyId::Durability => 2,
            QosPolicyId::Deadline => 4,
            QosPolicyId::Ownership => 6,
            QosPolicyId::Liveliness => 8,
            QosPolicyId::Partition => 10,
            QosPolicyId::Reliability => 11,
            QosPolicyId::DestinationOrder => 12,
        }
    }
}

/// Matching-relevant QoS of one endpoint, as announced through discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointQos {
    pub reliability: Reliability,
    pub durability: Durability,
    pub ownership: OwnershipKind,
    pub ownership_strength: i32,
    pub liveliness: Liveliness,
    pub deadline: Duration,
    pub destination_order: DestinationOrderKind,
    pub partition: Partition,
}

impl Default for EndpointQos {
    fn default() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            durability: Durability::Volatile,
            ownership: OwnershipKind::Shared,
            ownership_strength: 0,
            liveliness: Liveliness::default(),
            deadline: INFINITE,
            destination_order: DestinationOrderKind::ByReceptionTimestamp,
            partition: Partition::default(),
        }
    }
}

// ============================================================================
// DataWriterQos
// ============================================================================

/// QoS of a DataWriter.
#[derive(Debug, Clone, PartialEq)]
pub struct DataWriterQos {
    pub reliability: Reliability,
    /// Longest a write may block on the writer lock or a full history.
    pub max_blocking_time: Duration,
    pub durability: Durability,
    pub deadline: Duration,
    pub lifespan: Duration,
    pub liveliness: Liveliness,
    pub ownership: OwnershipKind,
    pub ownership_strength: i32,
    pub destination_order: DestinationOrderKind,
    pub history: HistoryKind,
    pub resource_limits: ResourceLimits,
    pub partition: Partition,
    pub writer_data_lifecycle: WriterDataLifecycle,
    /// Per-writer send budget, `None` for unlimited.
    pub throughput_controller: Option<ThroughputController>,
    pub heartbeat_period: Duration,
}

impl Default for DataWriterQos {
    fn default() -> Self {
        Self {
            reliability: Reliability::Reliable,
            max_blocking_time: MAX_BLOCKING_TIME,
            durability: Durability::TransientLocal,
            deadline: INFINITE,
            lifespan: INFINITE,
            liveliness: Liveliness::default(),
            ownership: OwnershipKind::Shared,
            ownership_strength: 0,
            destination_order: DestinationOrderKind::ByReceptionTimestamp,
            history: HistoryKind::KeepLast(1),
            resource_limits: ResourceLimits::default(),
            partition: Partition::default(),
            writer_data_lifecycle: WriterDataLifecycle::default(),
            throughput_controller: None,
            heartbeat_period: HEARTBEAT_PERIOD,
        }
    }
}

impl DataWriterQos {
    pub fn reliable(mut self) -> Self {
        self.reliability = Reliability::Reliable;
        self
    }

    pub fn best_effort(mut self) -> Self {
        self.reliability = Reliability::BestEffort;
        self
    }

    pub fn max_blocking_time(mut self, timeout: Duration) -> Self {
        self.max_blocking_time = timeout;
        self
    }

    pub fn volatile(mut self) -> Self {
        self.durability = Durability::Volatile;
        self
    }

    pub fn transient_local(mut self) -> Self {
        self.durability = Durability::TransientLocal;
        self
    }

    pub fn durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn keep_last(mut self, depth: u32) -> Self {
        self.history = HistoryKind::KeepLast(depth);
        self
    }

    pub fn keep_all(mut self) -> Self {
        self.history = HistoryKind::KeepAll;
        self
    }

    pub fn resource_limits(mut self, limits: ResourceLimits) -> Self {
        self.resource_limits = limits;
        self
    }

    pub fn deadline(mut self, period: Duration) -> Self {
        self.deadline = period;
        self
    }

    pub fn lifespan(mut self, duration: Duration) -> Self {
        self.lifespan = duration;
        self
    }

    pub fn liveliness(mut self, liveliness: Liveliness) -> Self {
        self.liveliness = liveliness;
        self
    }

    pub fn exclusive_ownership(mut self, strength: i32) -> Self {
        self.ownership = OwnershipKind::Exclusive;
        self.ownership_strength = strength;
        self
    }

    pub fn shared_ownership(mut self) -> Self {
        self.ownership = OwnershipKind::Shared;
        self
    }

    pub fn destination_order(mut self, kind: DestinationOrderKind) -> Self {
        self.destination_order = kind;
        self
    }

    pub fn partition(mut self, partition: Partition) -> Self {
        self.partition = partition;
        self
    }

    pub fn autodispose_unregistered_instances(mut self, autodispose: bool) -> Self {
        self.writer_data_lifecycle.autodispose_unregistered_instances = autodispose;
        self
    }

    pub fn throughput_controller(mut self, controller: ThroughputController) -> Self {
        self.throughput_controller = Some(controller);
        self
    }

    pub fn heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    /// Consistency check, see [`check_writer_qos`].
    pub fn check(&self) -> Result<()> {
        check_writer_qos(self)
    }

    /// Matching view of this QoS.
    pub fn endpoint_qos(&self) -> EndpointQos {
        EndpointQos {
            reliability: self.reliability,
            durability: self.durability,
            ownership: self.ownership,
            ownership_strength: self.ownership_strength,
            liveliness: self.liveliness,
            deadline: self.deadline,
            destination_order: self.destination_order,
            partition: self.partition.clone(),
        }
    }
}

// ============================================================================
// DataReaderQos
// ============================================================================

/// QoS of a DataReader.
#[derive(Debug, Clone, PartialEq)]
pub struct DataReaderQos {
    pub reliability: Reliability,
    pub durability: Durability,
    pub deadline: Duration,
    pub liveliness: Liveliness,
    pub ownership: OwnershipKind,
    pub destination_order: DestinationOrderKind,
    pub history: HistoryKind,
    pub resource_limits: ResourceLimits,
    pub partition: Partition,
}

impl Default for DataReaderQos {
    fn default() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            durability: Durability::Volatile,
            deadline: INFINITE,
            liveliness: Liveliness::default(),
            ownership: OwnershipKind::Shared,
            destination_order: DestinationOrderKind::ByReceptionTimestamp,
            history: HistoryKind::KeepLast(1),
            resource_limits: ResourceLimits::default(),
            partition: Partition::default(),
        }
    }
}

impl DataReaderQos {
    pub fn reliable(mut self) -> Self {
        self.reliability = Reliability::Reliable;
        self
    }

    pub fn best_effort(mut self) -> Self {
        self.reliability = Reliability::BestEffort;
        self
    }

    pub fn volatile(mut self) -> Self {
        self.durability = Durability::Volatile;
        self
    }

    pub fn transient_local(mut self) -> Self {
        self.durability = Durability::TransientLocal;
        self
    }

    pub fn durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn keep_last(mut self, depth: u32) -> Self {
        self.history = HistoryKind::KeepLast(depth);
        self
    }

    pub fn keep_all(mut self) -> Self {
        self.history = HistoryKind::KeepAll;
        self
    }

    pub fn resource_limits(mut self, limits: ResourceLimits) -> Self {
        self.resource_limits = limits;
        self
    }

    pub fn deadline(mut self, period: Duration) -> Self {
        self.deadline = period;
        self
    }

    pub fn liveliness(mut self, liveliness: Liveliness) -> Self {
        self.liveliness = liveliness;
        self
    }

    pub fn exclusive_ownership(mut self) -> Self {
        self.ownership = OwnershipKind::Exclusive;
        self
    }

    pub fn destination_order(mut self, kind: DestinationOrderKind) -> Self {
        self.destination_order = kind;
        self
    }

    pub fn partition(mut self, partition: Partition) -> Self {
        self.partition = partition;
        self
    }

    /// Consistency check, see [`check_reader_qos`].
    pub fn check(&self) -> Result<()> {
        check_reader_qos(self)
    }

    pub fn endpoint_qos(&self) -> EndpointQos {
        EndpointQos {
            reliability: self.reliability,
            durability: self.durability,
            ownership: self.ownership,
            ownership_strength: 0,
            liveliness: self.liveliness,
            deadline: self.deadline,
            destination_order: self.destination_order,
            partition: self.partition.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_defaults() {
        let qos = DataWriterQos::default();
        assert_eq!(qos.reliability, Reliability::Reliable);
        assert_eq!(qos.durability, Durability::TransientLocal);
        assert_eq!(qos.history, HistoryKind::KeepLast(1));
        assert!(qos.writer_data_lifecycle.autodispose_unregistered_instances);
        assert!(qos.check().is_ok());
    }

    #[test]
    fn test_reader_defaults() {
        let qos = DataReaderQos::default();
        assert_eq!(qos.reliability, Reliability::BestEffort);
        assert_eq!(qos.durability, Durability::Volatile);
        assert!(qos.check().is_ok());
    }

    #[test]
    fn test_partition_intersection() {
        let empty = Partition::default();
        let a = Partition::new(["a", "b"]);
        let b = Partition::new(["b"]);
        let c = Partition::new(["c"]);
        assert!(empty.intersects(&Partition::default()));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(!a.intersects(&empty));
    }

    #[test]
    fn test_empty_name_is_default_partition() {
        let default = Partition::default();
        let explicit = Partition::new([""]);
        let mixed = Partition::new(["a", ""]);
        assert!(explicit.intersects(&default));
        assert!(default.intersects(&explicit));
        assert!(default.intersects(&mixed));
        assert!(!default.intersects(&Partition::new(["a"])));
    }

    #[test]
    fn test_partition_wildcards() {
        let pattern = Partition::new(["sensor*"]);
        let name = Partition::new(["sensor1"]);
        assert!(pattern.intersects(&name));
        assert!(name.intersects(&pattern));
        assert!(!pattern.intersects(&Partition::new(["actuator1"])));
        assert!(Partition::new(["room?"]).intersects(&Partition::new(["room7"])));
        assert!(!Partition::new(["room?"]).intersects(&Partition::new(["room42"])));
        assert!(Partition::new(["*"]).intersects(&Partition::new(["anything"])));
        // "*" does not reach the default partition
        assert!(!Partition::new(["*"]).intersects(&Partition::default()));
    }

    #[test]
    fn test_glob_classes() {
        assert!(glob_match(b"zone[0-3]", b"zone2"));
        assert!(!glob_match(b"zone[0-3]", b"zone7"));
        assert!(glob_match(b"zone[!0-3]", b"zone7"));
        assert!(glob_match(b"zone[^ab]", b"zonec"));
        assert!(glob_match(b"[]x]", b"]"));
        assert!(glob_match(b"a[b", b"a[b"));
        assert!(glob_match(b"*a*b", b"xxaxxb"));
        assert!(!glob_match(b"*a*b", b"xxaxxc"));
        assert!(glob_match(b"a**", b"a"));
    }

    #[test]
    fn test_liveliness_announcement_period() {
        let l = Liveliness::new(LivelinessKind::ManualByTopic, Duration::from_secs(3));
        assert_eq!(l.announcement_period, Duration::from_secs(1));
        assert_eq!(Liveliness::new(LivelinessKind::Automatic, INFINITE).announcement_period, INFINITE);
    }

    #[test]
    fn test_kind_ordering() {
        assert!(Durability::TransientLocal > Durability::Volatile);
        assert!(LivelinessKind::ManualByTopic > LivelinessKind::Automatic);
        assert_eq!(Durability::from_u8(Durability::Transient.as_u8()), Some(Durability::Transient));
        assert_eq!(QosPolicyId::Reliability.id(), 11);
    }
}
