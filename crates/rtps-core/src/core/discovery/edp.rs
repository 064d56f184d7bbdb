// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Endpoint Discovery Protocol (SEDP).
//!
//! Local writers and readers are announced on the reliable, transient-local
//! publications / subscriptions builtin writers, one keyed instance per
//! endpoint GUID. Remote announcements land in the [`DiscoveryDatabase`]
//! and are matched against local endpoints:
//!
//! ```text
//! remote SEDP DATA --> decode --> database.add_* --> New/Changed --> match local endpoints
//!                                     |
//!                                     +--> UnknownParticipant --> pending until SPDP
//! ```
//!
//! Callbacks into local endpoints always run with every EDP lock released.
//!
//! [`DiscoveryDatabase`]: super::DiscoveryDatabase

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::database::{EndpointUpdate, ParticipantEntry};
use super::matcher::{match_endpoints, MatchOutcome};
use super::proxy_data::{
    ParticipantProxyData, ReaderProxyData, WriterProxyData, BUILTIN_PUBLICATIONS_ANNOUNCER,
    BUILTIN_PUBLICATIONS_DETECTOR, BUILTIN_SUBSCRIPTIONS_ANNOUNCER, BUILTIN_SUBSCRIPTIONS_DETECTOR,
};
use super::{builtin_reader, builtin_writer, publish, remote_builtin_reader, remote_builtin_writer};
use crate::core::guid::{EntityId, GuidPrefix, GUID};
use crate::dds::qos::QosPolicyId;
use crate::dds::ParticipantContext;
use crate::discovery_server::Relay;
use crate::reliability::{CacheChange, ChangeKind, RtpsReader, RtpsWriter};

/// A local writer as seen by endpoint discovery.
pub trait LocalWriter: Send + Sync {
    /// Current proxy data (re-read on every announcement).
    fn writer_data(&self) -> WriterProxyData;
    fn is_matched(&self, reader: GUID) -> bool;
    /// Compatible reader found. Called again on every update of the reader,
    /// so implementations must be idempotent.
    fn reader_matched(&self, reader: &ReaderProxyData);
    fn reader_unmatched(&self, reader: GUID);
    fn incompatible_qos(&self, reader: GUID, policies: &[QosPolicyId]);
}

/// A local reader as seen by endpoint discovery.
pub trait LocalReader: Send + Sync {
    fn reader_data(&self) -> ReaderProxyData;
    fn is_matched(&self, writer: GUID) -> bool;
    /// Compatible writer found. Must be idempotent.
    fn writer_matched(&self, writer: &WriterProxyData);
    fn writer_unmatched(&self, writer: GUID);
    fn incompatible_qos(&self, writer: GUID, policies: &[QosPolicyId]);
}

#[derive(Debug)]
enum Pending {
    Writer(WriterProxyData),
    Reader(ReaderProxyData),
}

impl Pending {
    fn prefix(&self) -> GuidPrefix {
        match self {
            Pending::Writer(w) => w.guid.prefix,
            Pending::Reader(r) => r.guid.prefix,
        }
    }

    fn guid(&self) -> GUID {
        match self {
            Pending::Writer(w) => w.guid,
            Pending::Reader(r) => r.guid,
        }
    }
}

struct EdpRelay {
    publications: Relay,
    subscriptions: Relay,
}

/// Simple endpoint discovery for one participant.
pub struct Edp {
    ctx: Arc<ParticipantContext>,
    pub_writer: Arc<RtpsWriter>,
    pub_reader: Arc<RtpsReader>,
    sub_writer: Arc<RtpsWriter>,
    sub_reader: Arc<RtpsReader>,
    local_writers: RwLock<HashMap<GUID, Arc<dyn LocalWriter>>>,
    local_readers: RwLock<HashMap<GUID, Arc<dyn LocalReader>>>,
    /// Endpoints announced before their participant was discovered.
    pending: Mutex<Vec<Pending>>,
    relay: Option<EdpRelay>,
}

impl Edp {
    /// Create the SEDP builtin endpoints. A server relays every remote
    /// announcement to its clients through the same builtin writers.
    pub fn new(ctx: Arc<ParticipantContext>, server: bool) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Edp>| {
            let pub_writer = builtin_writer(&ctx, EntityId::SEDP_PUBLICATIONS_WRITER, true, true);
            let sub_writer = builtin_writer(&ctx, EntityId::SEDP_SUBSCRIPTIONS_WRITER, true, true);

            let on_pub = weak.clone();
            let pub_reader = builtin_reader(
                &ctx,
                EntityId::SEDP_PUBLICATIONS_READER,
                true,
                false,
                Box::new(move |change| {
                    if let Some(edp) = on_pub.upgrade() {
                        edp.on_publication(change);
                    }
                }),
            );
            let on_sub = weak.clone();
            let sub_reader = builtin_reader(
                &ctx,
                EntityId::SEDP_SUBSCRIPTIONS_READER,
                true,
                false,
                Box::new(move |change| {
                    if let Some(edp) = on_sub.upgrade() {
                        edp.on_subscription(change);
                    }
                }),
            );

            let relay = server.then(|| EdpRelay {
                publications: Relay::new(Arc::clone(&pub_writer)),
                subscriptions: Relay::new(Arc::clone(&sub_writer)),
            });

            Self {
                ctx,
                pub_writer,
                pub_reader,
                sub_writer,
                sub_reader,
                local_writers: RwLock::new(HashMap::new()),
                local_readers: RwLock::new(HashMap::new()),
                pending: Mutex::new(Vec::new()),
                relay,
            }
        })
    }

    // ========================================================================
    // Builtin endpoint matching
    // ========================================================================

    /// Match the SEDP builtin endpoints of a discovered participant.
    pub fn match_builtin(&self, data: &ParticipantProxyData) {
        let prefix = data.prefix();
        let locators = data.metatraffic_destinations();
        if data.has_endpoint(BUILTIN_PUBLICATIONS_DETECTOR) {
            self.pub_writer.matched_reader_add(remote_builtin_reader(
                prefix,
                EntityId::SEDP_PUBLICATIONS_READER,
                locators,
                true,
            ));
        }
        if data.has_endpoint(BUILTIN_PUBLICATIONS_ANNOUNCER) {
            self.pub_reader.matched_writer_add(remote_builtin_writer(
                prefix,
                EntityId::SEDP_PUBLICATIONS_WRITER,
                locators,
                true,
            ));
        }
        if data.has_endpoint(BUILTIN_SUBSCRIPTIONS_DETECTOR) {
            self.sub_writer.matched_reader_add(remote_builtin_reader(
                prefix,
                EntityId::SEDP_SUBSCRIPTIONS_READER,
                locators,
                true,
            ));
        }
        if data.has_endpoint(BUILTIN_SUBSCRIPTIONS_ANNOUNCER) {
            self.sub_reader.matched_writer_add(remote_builtin_writer(
                prefix,
                EntityId::SEDP_SUBSCRIPTIONS_WRITER,
                locators,
                true,
            ));
        }
    }

    pub fn unmatch_builtin(&self, prefix: GuidPrefix) {
        self.pub_writer
            .matched_reader_remove(GUID::new(prefix, EntityId::SEDP_PUBLICATIONS_READER));
        self.pub_reader
            .matched_writer_remove(GUID::new(prefix, EntityId::SEDP_PUBLICATIONS_WRITER));
        self.sub_writer
            .matched_reader_remove(GUID::new(prefix, EntityId::SEDP_SUBSCRIPTIONS_READER));
        self.sub_reader
            .matched_writer_remove(GUID::new(prefix, EntityId::SEDP_SUBSCRIPTIONS_WRITER));
    }

    /// True when both SEDP writers of `prefix` are matched.
    pub fn is_builtin_matched(&self, prefix: GuidPrefix) -> bool {
        self.pub_reader
            .is_matched(GUID::new(prefix, EntityId::SEDP_PUBLICATIONS_WRITER))
            && self
                .sub_reader
                .is_matched(GUID::new(prefix, EntityId::SEDP_SUBSCRIPTIONS_WRITER))
    }

    // ========================================================================
    // Local endpoints
    // ========================================================================

    /// Announce a local writer and match it.
    pub fn register_writer(&self, writer: Arc<dyn LocalWriter>) {
        let data = writer.writer_data();
        self.local_writers
            .write()
            .insert(data.guid, Arc::clone(&writer));
        publish(&self.pub_writer, ChangeKind::Alive, data.guid.into(), data.encode());
        log::debug!("[EDP] announced writer {} on '{}'", data.guid, data.topic_name);
        self.match_local_writer(&writer, &data);
    }

    /// Announce a local reader and match it.
    pub fn register_reader(&self, reader: Arc<dyn LocalReader>) {
        let data = reader.reader_data();
        self.local_readers
            .write()
            .insert(data.guid, Arc::clone(&reader));
        publish(&self.sub_writer, ChangeKind::Alive, data.guid.into(), data.encode());
        log::debug!("[EDP] announced reader {} on '{}'", data.guid, data.topic_name);
        self.match_local_reader(&reader, &data);
    }

    /// Re-announce a local writer after a QoS change and re-evaluate its
    /// matches.
    pub fn update_writer(&self, guid: GUID) {
        let Some(writer) = self.local_writers.read().get(&guid).cloned() else {
            return;
        };
        let data = writer.writer_data();
        publish(&self.pub_writer, ChangeKind::Alive, guid.into(), data.encode());
        log::debug!("[EDP] re-announced writer {}", guid);
        self.match_local_writer(&writer, &data);
    }

    pub fn update_reader(&self, guid: GUID) {
        let Some(reader) = self.local_readers.read().get(&guid).cloned() else {
            return;
        };
        let data = reader.reader_data();
        publish(&self.sub_writer, ChangeKind::Alive, guid.into(), data.encode());
        log::debug!("[EDP] re-announced reader {}", guid);
        self.match_local_reader(&reader, &data);
    }

    /// Dispose a local writer and unmatch the local readers using it.
    pub fn unregister_writer(&self, guid: GUID) {
        if self.local_writers.write().remove(&guid).is_none() {
            return;
        }
        publish(
            &self.pub_writer,
            ChangeKind::NotAliveDisposedUnregistered,
            guid.into(),
            Vec::new(),
        );
        log::debug!("[EDP] disposed writer {}", guid);
        for reader in self.local_readers_snapshot() {
            if reader.is_matched(guid) {
                reader.writer_unmatched(guid);
            }
        }
    }

    pub fn unregister_reader(&self, guid: GUID) {
        if self.local_readers.write().remove(&guid).is_none() {
            return;
        }
        publish(
            &self.sub_writer,
            ChangeKind::NotAliveDisposedUnregistered,
            guid.into(),
            Vec::new(),
        );
        log::debug!("[EDP] disposed reader {}", guid);
        for writer in self.local_writers_snapshot() {
            if writer.is_matched(guid) {
                writer.reader_unmatched(guid);
            }
        }
    }

    pub fn local_writer_count(&self) -> usize {
        self.local_writers.read().len()
    }

    pub fn local_reader_count(&self) -> usize {
        self.local_readers.read().len()
    }

    fn local_writers_snapshot(&self) -> Vec<Arc<dyn LocalWriter>> {
        self.local_writers.read().values().cloned().collect()
    }

    fn local_readers_snapshot(&self) -> Vec<Arc<dyn LocalReader>> {
        self.local_readers.read().values().cloned().collect()
    }

    fn match_local_writer(&self, writer: &Arc<dyn LocalWriter>, data: &WriterProxyData) {
        for remote in self.ctx.database().readers_for_topic(&data.topic_name) {
            self.pair(data, &remote, Some(writer), None);
        }
        for reader in self.local_readers_snapshot() {
            let local = reader.reader_data();
            if local.topic_name == data.topic_name {
                self.pair(data, &local, Some(writer), Some(&reader));
            }
        }
    }

    fn match_local_reader(&self, reader: &Arc<dyn LocalReader>, data: &ReaderProxyData) {
        for remote in self.ctx.database().writers_for_topic(&data.topic_name) {
            self.pair(&remote, data, None, Some(reader));
        }
        for writer in self.local_writers_snapshot() {
            let local = writer.writer_data();
            if local.topic_name == data.topic_name {
                self.pair(&local, data, Some(&writer), Some(reader));
            }
        }
    }

    /// Evaluate one writer/reader pair and update whichever sides are local.
    fn pair(
        &self,
        wdata: &WriterProxyData,
        rdata: &ReaderProxyData,
        writer: Option<&Arc<dyn LocalWriter>>,
        reader: Option<&Arc<dyn LocalReader>>,
    ) {
        match match_endpoints(wdata, rdata) {
            MatchOutcome::Compatible => {
                if let Some(w) = writer {
                    w.reader_matched(rdata);
                }
                if let Some(r) = reader {
                    r.writer_matched(wdata);
                }
            }
            MatchOutcome::Incompatible(policies) => {
                log::info!(
                    "[EDP] writer {} and reader {} on '{}' incompatible: {:?}",
                    wdata.guid,
                    rdata.guid,
                    wdata.topic_name,
                    policies
                );
                self.unpair(wdata.guid, rdata.guid, writer, reader);
                if let Some(w) = writer {
                    w.incompatible_qos(rdata.guid, &policies);
                }
                if let Some(r) = reader {
                    r.incompatible_qos(wdata.guid, &policies);
                }
            }
            MatchOutcome::NotCandidate => self.unpair(wdata.guid, rdata.guid, writer, reader),
        }
    }

    fn unpair(
        &self,
        writer_guid: GUID,
        reader_guid: GUID,
        writer: Option<&Arc<dyn LocalWriter>>,
        reader: Option<&Arc<dyn LocalReader>>,
    ) {
        if let Some(w) = writer {
            if w.is_matched(reader_guid) {
                w.reader_unmatched(reader_guid);
            }
        }
        if let Some(r) = reader {
            if r.is_matched(writer_guid) {
                r.writer_unmatched(writer_guid);
            }
        }
    }

    // ========================================================================
    // Remote announcements
    // ========================================================================

    fn on_publication(&self, change: CacheChange) {
        if change.kind.is_alive() {
            match WriterProxyData::decode(&change.payload) {
                Ok(data) if data.guid.prefix == self.ctx.prefix() => {}
                Ok(data) => self.add_remote_writer(data),
                Err(e) => log::warn!(
                    "[EDP] malformed publication from {}: {}",
                    change.writer_guid,
                    e
                ),
            }
        } else {
            let guid = GUID::from(change.instance_handle);
            if guid.prefix != self.ctx.prefix() {
                self.remove_remote_writer(guid);
            }
        }
    }

    fn on_subscription(&self, change: CacheChange) {
        if change.kind.is_alive() {
            match ReaderProxyData::decode(&change.payload) {
                Ok(data) if data.guid.prefix == self.ctx.prefix() => {}
                Ok(data) => self.add_remote_reader(data),
                Err(e) => log::warn!(
                    "[EDP] malformed subscription from {}: {}",
                    change.writer_guid,
                    e
                ),
            }
        } else {
            let guid = GUID::from(change.instance_handle);
            if guid.prefix != self.ctx.prefix() {
                self.remove_remote_reader(guid);
            }
        }
    }

    fn add_remote_writer(&self, data: WriterProxyData) {
        match self.ctx.database().add_writer(data.clone()) {
            EndpointUpdate::UnknownParticipant => {
                log::debug!("[EDP] writer {} waits for its participant", data.guid);
                let mut pending = self.pending.lock();
                pending.retain(|p| p.guid() != data.guid);
                pending.push(Pending::Writer(data));
            }
            EndpointUpdate::Unchanged => {}
            update => {
                log::debug!(
                    "[EDP] remote writer {} on '{}' ({:?})",
                    data.guid,
                    data.topic_name,
                    update
                );
                for reader in self.local_readers_snapshot() {
                    let local = reader.reader_data();
                    self.pair(&data, &local, None, Some(&reader));
                }
                if let Some(relay) = &self.relay {
                    relay.publications.forward(data.guid, data.encode());
                }
            }
        }
    }

    fn add_remote_reader(&self, data: ReaderProxyData) {
        match self.ctx.database().add_reader(data.clone()) {
            EndpointUpdate::UnknownParticipant => {
                log::debug!("[EDP] reader {} waits for its participant", data.guid);
                let mut pending = self.pending.lock();
                pending.retain(|p| p.guid() != data.guid);
                pending.push(Pending::Reader(data));
            }
            EndpointUpdate::Unchanged => {}
            update => {
                log::debug!(
                    "[EDP] remote reader {} on '{}' ({:?})",
                    data.guid,
                    data.topic_name,
                    update
                );
                for writer in self.local_writers_snapshot() {
                    let local = writer.writer_data();
                    self.pair(&local, &data, Some(&writer), None);
                }
                if let Some(relay) = &self.relay {
                    relay.subscriptions.forward(data.guid, data.encode());
                }
            }
        }
    }

    fn remove_remote_writer(&self, guid: GUID) {
        self.pending.lock().retain(|p| p.guid() != guid);
        if self.ctx.database().remove_writer(guid).is_none() {
            return;
        }
        log::debug!("[EDP] remote writer {} disposed", guid);
        self.unmatch_remote_writer(guid);
    }

    fn remove_remote_reader(&self, guid: GUID) {
        self.pending.lock().retain(|p| p.guid() != guid);
        if self.ctx.database().remove_reader(guid).is_none() {
            return;
        }
        log::debug!("[EDP] remote reader {} disposed", guid);
        self.unmatch_remote_reader(guid);
    }

    fn unmatch_remote_writer(&self, guid: GUID) {
        for reader in self.local_readers_snapshot() {
            if reader.is_matched(guid) {
                reader.writer_unmatched(guid);
            }
        }
        if let Some(relay) = &self.relay {
            relay.publications.retract(guid);
        }
    }

    fn unmatch_remote_reader(&self, guid: GUID) {
        for writer in self.local_writers_snapshot() {
            if writer.is_matched(guid) {
                writer.reader_unmatched(guid);
            }
        }
        if let Some(relay) = &self.relay {
            relay.subscriptions.retract(guid);
        }
    }

    // ========================================================================
    // Participant events
    // ========================================================================

    /// Replay endpoints that arrived before their participant.
    pub fn on_participant_discovered(&self, prefix: GuidPrefix) {
        let ready: Vec<Pending> = {
            let mut pending = self.pending.lock();
            let (ready, waiting): (Vec<Pending>, Vec<Pending>) = std::mem::take(&mut *pending)
                .into_iter()
                .partition(|p| p.prefix() == prefix);
            *pending = waiting;
            ready
        };
        for endpoint in ready {
            match endpoint {
                Pending::Writer(data) => self.add_remote_writer(data),
                Pending::Reader(data) => self.add_remote_reader(data),
            }
        }
    }

    /// Unmatch every endpoint of a removed participant.
    pub fn remove_participant_endpoints(&self, entry: &ParticipantEntry) {
        let prefix = entry.data.prefix();
        self.pending.lock().retain(|p| p.prefix() != prefix);
        for guid in entry.writers.keys() {
            self.unmatch_remote_writer(*guid);
        }
        for guid in entry.readers.keys() {
            self.unmatch_remote_reader(*guid);
        }
        log::debug!(
            "[EDP] dropped {} writers and {} readers of {}",
            entry.writers.len(),
            entry.readers.len(),
            prefix
        );
    }

    /// Stop the builtin writers. Local endpoints are forgotten.
    pub fn close(&self) {
        self.local_writers.write().clear();
        self.local_readers.write().clear();
        self.pending.lock().clear();
        self.pub_writer.close();
        self.sub_writer.close();
    }
}

impl std::fmt::Debug for Edp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Edp")
            .field("prefix", &self.ctx.prefix())
            .field("local_writers", &self.local_writer_count())
            .field("local_readers", &self.local_reader_count())
            .field("server", &self.relay.is_some())
            .finish()
    }
}
