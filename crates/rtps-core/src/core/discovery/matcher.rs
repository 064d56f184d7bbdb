// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Endpoint matching (RxO - Requested vs Offered).
//!
//! | Policy           | Rule                                               |
//! |------------------|----------------------------------------------------|
//! | Reliability      | Reader RELIABLE needs writer RELIABLE              |
//! | Durability       | Writer rank >= reader rank                         |
//! | Ownership        | Kinds equal                                        |
//! | Deadline         | Writer period <= reader period                     |
//! | Liveliness       | Writer kind >= reader kind, writer lease <= reader |
//! | Destination order| Writer kind >= reader kind                         |
//! | Partition        | A name pair matches (fnmatch), "" is default       |
//!
//! Every failing policy is reported, so both sides can update their
//! incompatible-QoS status with the offending policy ids.

use super::proxy_data::{ReaderProxyData, WriterProxyData};
use crate::dds::qos::{EndpointQos, QosPolicyId, Reliability};

/// Result of matching one writer with one reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Compatible,
    /// Different topic or type: not a candidate, nothing is reported.
    NotCandidate,
    /// Same topic and type, failing policies listed.
    Incompatible(Vec<QosPolicyId>),
}

impl MatchOutcome {
    pub fn is_compatible(&self) -> bool {
        matches!(self, MatchOutcome::Compatible)
    }
}

/// Policies on which `writer` (offered) fails `reader` (requested).
pub fn incompatible_policies(writer: &EndpointQos, reader: &EndpointQos) -> Vec<QosPolicyId> {
    let mut failed = Vec::new();

    if reader.reliability == Reliability::Reliable && writer.reliability != Reliability::Reliable {
        log::debug!(
            "[MATCH-QOS] Reliability mismatch (writer={:?}, reader={:?})",
            writer.reliability,
            reader.reliability
        );
        failed.push(QosPolicyId::Reliability);
    }

    if writer.durability < reader.durability {
        log::debug!(
            "[MATCH-QOS] Durability mismatch (writer={:?}, reader={:?})",
            writer.durability,
            reader.durability
        );
        failed.push(QosPolicyId::Durability);
    }

    if writer.ownership != reader.ownership {
        log::debug!(
            "[MATCH-QOS] Ownership mismatch (writer={:?}, reader={:?})",
            writer.ownership,
            reader.ownership
        );
        failed.push(QosPolicyId::Ownership);
    }

    if writer.deadline > reader.deadline {
        log::debug!(
            "[MATCH-QOS] Deadline mismatch (writer={:?}, reader={:?})",
            writer.deadline,
            reader.deadline
        );
        failed.push(QosPolicyId::Deadline);
    }

    if writer.liveliness.kind < reader.liveliness.kind
        || writer.liveliness.lease_duration > reader.liveliness.lease_duration
    {
        log::debug!(
            "[MATCH-QOS] Liveliness mismatch (writer={:?}, reader={:?})",
            writer.liveliness,
            reader.liveliness
        );
        failed.push(QosPolicyId::Liveliness);
    }

    if writer.destination_order < reader.destination_order {
        log::debug!(
            "[MATCH-QOS] Destination order mismatch (writer={:?}, reader={:?})",
            writer.destination_order,
            reader.destination_order
        );
        failed.push(QosPolicyId::DestinationOrder);
    }

    if !writer.partition.intersects(&reader.partition) {
        log::debug!(
            "[MATCH-QOS] Partition mismatch (writer={:?}, reader={:?})",
            writer.partition.names,
            reader.partition.names
        );
        failed.push(QosPolicyId::Partition);
    }

    failed
}

/// Match a writer with a reader: same topic, same type, compatible QoS.
pub fn match_endpoints(writer: &WriterProxyData, reader: &ReaderProxyData) -> MatchOutcome {
    if writer.topic_name != reader.topic_name || writer.type_name != reader.type_name {
        return MatchOutcome::NotCandidate;
    }
    let failed = incompatible_policies(&writer.qos, &reader.qos);
    if failed.is_empty() {
        MatchOutcome::Compatible
    } else {
        MatchOutcome::Incompatible(failed)
    }
}
