// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! QoS consistency and mutability rules.
//!
//! | Check | Result |
//! |-------|--------|
//! | PERSISTENT durability | `Unsupported` |
//! | BY_SOURCE_TIMESTAMP destination order | `Unsupported` |
//! | BEST_EFFORT + EXCLUSIVE ownership | `InconsistentPolicy` |
//! | AUTOMATIC / MANUAL_BY_PARTICIPANT, finite lease <= announcement period | `InconsistentPolicy` |
//! | KEEP_LAST depth > max_samples_per_instance | `InconsistentPolicy` |

use super::{
    DataReaderQos, DataWriterQos, DestinationOrderKind, Durability, Liveliness, LivelinessKind,
    OwnershipKind, Reliability, INFINITE,
};
use crate::dds::{Error, Result};
use crate::reliability::{HistoryKind, ResourceLimits};

/// Validate a writer QoS on its own.
pub fn check_writer_qos(qos: &DataWriterQos) -> Result<()> {
    check_common(
        qos.durability,
        qos.destination_order,
        qos.reliability,
        qos.ownership,
        qos.history,
        &qos.resource_limits,
    )?;
    check_liveliness(&qos.liveliness)?;
    if qos.heartbeat_period.is_zero() {
        return Err(Error::InvalidQos("heartbeat period must be non-zero".into()));
    }
    if let Some(tc) = &qos.throughput_controller {
        tc.validate()?;
    }
    Ok(())
}

/// Validate a reader QoS on its own.
pub fn check_reader_qos(qos: &DataReaderQos) -> Result<()> {
    check_common(
        qos.durability,
        qos.destination_order,
        qos.reliability,
        qos.ownership,
        qos.history,
        &qos.resource_limits,
    )
}

fn check_common(
    durability: Durability,
    destination_order: DestinationOrderKind,
    reliability: Reliability,
    ownership: OwnershipKind,
    history: HistoryKind,
    limits: &ResourceLimits,
) -> Result<()> {
    if durability == Durability::Persistent {
        log::error!("[QOS-CHECK] PERSISTENT durability not supported");
        return Err(Error::Unsupported("PERSISTENT durability".into()));
    }
    if destination_order == DestinationOrderKind::BySourceTimestamp {
        log::error!("[QOS-CHECK] BY_SOURCE_TIMESTAMP destination order not supported");
        return Err(Error::Unsupported("BY_SOURCE_TIMESTAMP destination order".into()));
    }
    if reliability == Reliability::BestEffort && ownership == OwnershipKind::Exclusive {
        log::error!("[QOS-CHECK] BEST_EFFORT incompatible with EXCLUSIVE ownership");
        return Err(Error::InconsistentPolicy(
            "BEST_EFFORT reliability with EXCLUSIVE ownership".into(),
        ));
    }
    if let HistoryKind::KeepLast(depth) = history {
        if depth == 0 {
            return Err(Error::InvalidQos("KEEP_LAST depth must be at least 1".into()));
        }
        if depth as usize > limits.max_samples_per_instance {
            log::error!(
                "[QOS-CHECK] KEEP_LAST depth {} above max_samples_per_instance {}",
                depth,
                limits.max_samples_per_instance
            );
            return Err(Error::InconsistentPolicy(format!(
                "KEEP_LAST depth {} exceeds max_samples_per_instance {}",
                depth, limits.max_samples_per_instance
            )));
        }
    }
    if limits.max_samples_per_instance > limits.max_samples {
        return Err(Error::InconsistentPolicy(
            "max_samples_per_instance exceeds max_samples".into(),
        ));
    }
    Ok(())
}

fn check_liveliness(liveliness: &Liveliness) -> Result<()> {
    let participant_asserted = matches!(
        liveliness.kind,
        LivelinessKind::Automatic | LivelinessKind::ManualByParticipant
    );
    if participant_asserted
        && liveliness.lease_duration != INFINITE
        && liveliness.lease_duration <= liveliness.announcement_period
    {
        log::error!("[QOS-CHECK] liveliness lease duration <= announcement period");
        return Err(Error::InconsistentPolicy(
            "liveliness lease duration must exceed the announcement period".into(),
        ));
    }
    Ok(())
}

/// Names of the policies that differ between `current` and `requested`
/// but cannot change once the writer exists.
pub fn immutable_changes(current: &DataWriterQos, requested: &DataWriterQos) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if current.durability != requested.durability {
        changed.push("durability kind");
    }
    if current.liveliness.kind != requested.liveliness.kind {
        changed.push("liveliness kind");
    }
    if current.liveliness.lease_duration != requested.liveliness.lease_duration {
        changed.push("liveliness lease duration");
    }
    if current.liveliness.announcement_period != requested.liveliness.announcement_period {
        changed.push("liveliness announcement period");
    }
    if current.reliability != requested.reliability {
        changed.push("reliability kind");
    }
    if current.ownership != requested.ownership {
        changed.push("ownership kind");
    }
    if current.destination_order != requested.destination_order {
        changed.push("destination order kind");
    }
    if current.history != requested.history {
        changed.push("history");
    }
    if current.resource_limits != requested.resource_limits {
        changed.push("resource limits");
    }
    if current.throughput_controller != requested.throughput_controller {
        changed.push("throughput controller");
    }
    for name in &changed {
        log::warn!("[QOS-CHECK] {} cannot be changed after creation", name);
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_best_effort_exclusive_inconsistent() {
        let qos = DataWriterQos::default().best_effort().exclusive_ownership(3);
        assert!(matches!(check_writer_qos(&qos), Err(Error::InconsistentPolicy(_))));
        let qos = DataReaderQos::default().best_effort().exclusive_ownership();
        assert!(matches!(check_reader_qos(&qos), Err(Error::InconsistentPolicy(_))));
    }

    #[test]
    fn test_unsupported_policies() {
        let qos = DataWriterQos::default().durability(Durability::Persistent);
        assert!(matches!(check_writer_qos(&qos), Err(Error::Unsupported(_))));
        let qos = DataWriterQos::default().destination_order(DestinationOrderKind::BySourceTimestamp);
        assert!(matches!(check_writer_qos(&qos), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_liveliness_lease_vs_announcement() {
        let mut liveliness = Liveliness::new(LivelinessKind::Automatic, Duration::from_secs(1));
        liveliness.announcement_period = Duration::from_secs(1);
        let qos = DataWriterQos::default().liveliness(liveliness);
        assert!(matches!(check_writer_qos(&qos), Err(Error::InconsistentPolicy(_))));

        // MANUAL_BY_TOPIC is asserted by the writer itself
        liveliness.kind = LivelinessKind::ManualByTopic;
        let qos = DataWriterQos::default().liveliness(liveliness);
        assert!(check_writer_qos(&qos).is_ok());
    }

    #[test]
    fn test_depth_above_per_instance_limit() {
        let limits = ResourceLimits {
            max_samples: 100,
            max_instances: 10,
            max_samples_per_instance: 5,
        };
        let qos = DataWriterQos::default().keep_last(6).resource_limits(limits);
        assert!(matches!(check_writer_qos(&qos), Err(Error::InconsistentPolicy(_))));
    }

    #[test]
    fn test_immutable_changes() {
        let current = DataWriterQos::default();
        assert!(immutable_changes(&current, &current.clone().deadline(Duration::from_secs(1))).is_empty());
        let changed = immutable_changes(&current, &current.clone().best_effort());
        assert_eq!(changed, vec!["reliability kind"]);
    }
}
