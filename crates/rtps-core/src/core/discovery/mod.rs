// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Discovery
//!
//! - **PDP** ([`pdp`]): participants announce themselves and track each
//!   other's leases (simple multicast, or through discovery servers).
//! - **EDP** ([`edp`]): participants exchange writer and reader proxy data
//!   over reliable builtin endpoints and match them by topic, type and QoS.
//! - **WLP** ([`liveliness`]): participant-level liveliness assertions.
//!
//! ## Participant lifecycle
//!
//! ```text
//! Unknown --SPDP data--> Discovered --lease expiry / dispose--> Removed
//!                          |    ^
//!                          +----+ refresh (Changed when data differs)
//! ```
//!
//! All proxies live in the [`DiscoveryDatabase`], keyed by GUID prefix.

pub mod database;
pub mod edp;
pub mod liveliness;
pub mod matcher;
pub mod pdp;
pub mod proxy_data;

pub use database::{DiscoveryDatabase, EndpointUpdate, ParticipantEntry, ParticipantUpdate};
pub use edp::{Edp, LocalReader, LocalWriter};
pub use liveliness::{LivelinessObserver, LivelinessTracker, Wlp, WriterLease};
pub use matcher::{incompatible_policies, match_endpoints, MatchOutcome};
pub use pdp::{Pdp, PdpRole};
pub use proxy_data::{
    ParticipantMessageData, ParticipantMessageKind, ParticipantProxyData, ReaderProxyData,
    WriterProxyData, DEFAULT_BUILTIN_ENDPOINTS,
};

use std::sync::Arc;

use crate::config::MAX_BLOCKING_TIME;
use crate::congestion::FlowController;
use crate::core::guid::{EntityId, GuidPrefix, InstanceHandle, GUID};
use crate::core::locator::Locator;
use crate::core::rt::deadline_after;
use crate::dds::ParticipantContext;
use crate::reliability::{
    ChangeKind, DeliverFn, HistoryKind, ReaderAttributes, RemoteReaderInfo, RemoteWriterInfo,
    ResourceLimits, RtpsReader, RtpsWriter, WriteParams, WriterAttributes,
};

/// Create a builtin writer (one keyed instance per announced entity) and
/// route incoming ACKNACKs to it.
pub(crate) fn builtin_writer(
    ctx: &ParticipantContext,
    entity: EntityId,
    reliable: bool,
    durable: bool,
) -> Arc<RtpsWriter> {
    let attrs = WriterAttributes::new(GUID::new(ctx.prefix(), entity))
        .with_reliable(reliable)
        .with_durable(durable)
        .with_history(HistoryKind::KeepLast(1), ResourceLimits::unlimited())
        .with_keyed(true);
    let writer = RtpsWriter::new(
        attrs,
        ctx.sender().clone(),
        FlowController::unlimited(),
        ctx.scheduler(),
    );
    ctx.add_writer(Arc::clone(&writer));
    writer
}

/// Create a builtin reader and route incoming data to it.
pub(crate) fn builtin_reader(
    ctx: &ParticipantContext,
    entity: EntityId,
    reliable: bool,
    accept_unmatched: bool,
    deliver: DeliverFn,
) -> Arc<RtpsReader> {
    let attrs = ReaderAttributes::new(GUID::new(ctx.prefix(), entity), reliable)
        .with_accept_unmatched(accept_unmatched);
    let reader = Arc::new(RtpsReader::new(attrs, ctx.sender().clone(), deliver));
    ctx.add_reader(Arc::clone(&reader));
    reader
}

pub(crate) fn remote_builtin_reader(
    prefix: GuidPrefix,
    entity: EntityId,
    locators: &[Locator],
    reliable: bool,
) -> RemoteReaderInfo {
    RemoteReaderInfo {
        guid: GUID::new(prefix, entity),
        unicast_locators: locators.to_vec(),
        multicast_locators: Vec::new(),
        reliable,
        volatile: false,
        expects_inline_qos: false,
    }
}

pub(crate) fn remote_builtin_writer(
    prefix: GuidPrefix,
    entity: EntityId,
    locators: &[Locator],
    reliable: bool,
) -> RemoteWriterInfo {
    RemoteWriterInfo {
        guid: GUID::new(prefix, entity),
        unicast_locators: locators.to_vec(),
        multicast_locators: Vec::new(),
        reliable,
    }
}

/// Add an announcement to a builtin writer. Failures are logged: discovery
/// traffic is retried by the next announcement, never by the caller.
pub(crate) fn publish(
    writer: &RtpsWriter,
    kind: ChangeKind,
    instance: InstanceHandle,
    payload: Vec<u8>,
) -> bool {
    match writer.add_change(
        kind,
        instance,
        payload,
        &WriteParams::default(),
        None,
        deadline_after(MAX_BLOCKING_TIME),
    ) {
        Ok(_) => true,
        Err(e) => {
            log::warn!("[discovery] {} announcement failed: {}", writer.guid(), e);
            false
        }
    }
}
