// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Participant Discovery Protocol (SPDP).
//!
//! Each participant publishes its [`ParticipantProxyData`] on the builtin
//! participant writer, one keyed instance per participant GUID:
//!
//! - **Simple**: best-effort announcements to the SPDP multicast group and
//!   initial peers, a burst of [`INITIAL_ANNOUNCEMENTS`] at start-up then
//!   every announcement period. A newcomer gets an extra unicast
//!   announcement so it does not wait for the next period.
//! - **Client**: reliable, transient-local exchange with the configured
//!   servers only (see [`DiscoveryServerClient`]).
//! - **Server**: reliable exchange with every client; announcements from
//!   clients are relayed to all other clients.
//!
//! Participants whose lease expires are dropped along with all their
//! endpoints.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use super::edp::Edp;
use super::liveliness::Wlp;
use super::proxy_data::{ParticipantProxyData, DEFAULT_BUILTIN_ENDPOINTS, PROTOCOL_VERSION};
use super::{builtin_reader, builtin_writer, publish, remote_builtin_reader, remote_builtin_writer};
use super::database::ParticipantUpdate;
use crate::config::{
    DiscoveryMode, INITIAL_ANNOUNCEMENTS, INITIAL_ANNOUNCEMENT_PERIOD, VENDOR_ID,
};
use crate::core::guid::{EntityId, GuidPrefix, GUID};
use crate::core::locator::Locator;
use crate::core::rt::timer::{TimerAction, TimerHandle};
use crate::dds::{ParticipantContext, ParticipantDiscoveryInfo, ParticipantDiscoveryStatus};
use crate::discovery_server::{DiscoveryServerClient, Relay};
use crate::reliability::{CacheChange, ChangeKind, RtpsReader, RtpsWriter};
use crate::security::{CryptoHandle, KeyService};

/// How this participant takes part in participant discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdpRole {
    Simple,
    Client,
    Server,
}

impl PdpRole {
    fn of(mode: &DiscoveryMode) -> Self {
        match mode {
            DiscoveryMode::Simple => PdpRole::Simple,
            DiscoveryMode::Client(_) => PdpRole::Client,
            DiscoveryMode::Server => PdpRole::Server,
        }
    }
}

/// Participant discovery for one participant. Owns the endpoint and
/// liveliness protocols so every discovery event flows through one place.
pub struct Pdp {
    ctx: Arc<ParticipantContext>,
    role: PdpRole,
    writer: Arc<RtpsWriter>,
    reader: Arc<RtpsReader>,
    edp: Arc<Edp>,
    wlp: Arc<Wlp>,
    client: Option<Arc<DiscoveryServerClient>>,
    relay: Option<Relay>,
    announce_timer: TimerHandle,
    lease_timer: TimerHandle,
    initial_left: AtomicU32,
    closed: AtomicBool,
}

impl Pdp {
    pub fn new(ctx: Arc<ParticipantContext>) -> Arc<Self> {
        let role = PdpRole::of(&ctx.config().discovery);
        let edp = Edp::new(Arc::clone(&ctx), role == PdpRole::Server);
        let wlp = Wlp::new(Arc::clone(&ctx));

        Arc::new_cyclic(|weak: &Weak<Pdp>| {
            let reliable = role != PdpRole::Simple;
            let writer = builtin_writer(&ctx, EntityId::SPDP_WRITER, reliable, reliable);
            let on_data = weak.clone();
            let reader = builtin_reader(
                &ctx,
                EntityId::SPDP_READER,
                reliable,
                role != PdpRole::Client,
                Box::new(move |change| {
                    if let Some(pdp) = on_data.upgrade() {
                        pdp.on_participant_data(change);
                    }
                }),
            );

            let client = match &ctx.config().discovery {
                DiscoveryMode::Client(servers) => Some(DiscoveryServerClient::new(
                    Arc::clone(&ctx),
                    servers.clone(),
                    Arc::clone(&writer),
                    Arc::clone(&reader),
                    Arc::clone(&edp),
                )),
                _ => None,
            };
            let relay = (role == PdpRole::Server).then(|| Relay::new(Arc::clone(&writer)));

            let on_announce = weak.clone();
            let announce_timer = ctx.scheduler().create_timer(
                ctx.config().announcement_period,
                move || match on_announce.upgrade() {
                    Some(pdp) => pdp.on_announce_timer(),
                    None => TimerAction::Stop,
                },
            );
            let on_lease = weak.clone();
            let lease_timer = ctx.scheduler().create_timer(
                ctx.config().lease_check_period,
                move || match on_lease.upgrade() {
                    Some(pdp) => {
                        pdp.check_leases(Instant::now());
                        TimerAction::Restart
                    }
                    None => TimerAction::Stop,
                },
            );

            Self {
                ctx,
                role,
                writer,
                reader,
                edp,
                wlp,
                client,
                relay,
                announce_timer,
                lease_timer,
                initial_left: AtomicU32::new(INITIAL_ANNOUNCEMENTS),
                closed: AtomicBool::new(false),
            }
        })
    }

    pub fn role(&self) -> PdpRole {
        self.role
    }

    pub fn edp(&self) -> &Arc<Edp> {
        &self.edp
    }

    pub fn wlp(&self) -> &Arc<Wlp> {
        &self.wlp
    }

    pub fn client(&self) -> Option<&Arc<DiscoveryServerClient>> {
        self.client.as_ref()
    }

    /// What this participant announces about itself.
    pub fn local_data(&self) -> ParticipantProxyData {
        let config = self.ctx.config();
        ParticipantProxyData {
            guid: self.ctx.guid(),
            domain_id: config.domain_id,
            name: config.name.clone(),
            protocol_version: PROTOCOL_VERSION,
            vendor_id: VENDOR_ID,
            default_unicast_locators: self.ctx.default_unicast_locators().to_vec(),
            default_multicast_locators: Vec::new(),
            metatraffic_unicast_locators: self.ctx.metatraffic_unicast_locators().to_vec(),
            metatraffic_multicast_locators: self.ctx.metatraffic_multicast_locators().to_vec(),
            available_builtin_endpoints: DEFAULT_BUILTIN_ENDPOINTS,
            lease_duration: config.lease_duration,
            is_server: self.role == PdpRole::Server,
        }
    }

    /// Publish our data and start announcing.
    pub fn enable(&self) {
        let data = self.local_data();
        publish(
            &self.writer,
            ChangeKind::Alive,
            self.ctx.guid().into(),
            data.encode(),
        );
        log::info!(
            "[PDP] participant {} ('{}') enabled, role {:?}",
            data.guid,
            data.name,
            self.role
        );
        self.announce_timer.restart_in(Duration::ZERO);
        self.lease_timer.restart();
        if let Some(client) = &self.client {
            client.start();
        }
    }

    // ========================================================================
    // Announcements
    // ========================================================================

    fn on_announce_timer(&self) -> TimerAction {
        if self.closed.load(Ordering::Acquire) {
            return TimerAction::Stop;
        }
        self.announce();
        let burst = self
            .initial_left
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if burst {
            TimerAction::RestartIn(INITIAL_ANNOUNCEMENT_PERIOD)
        } else {
            TimerAction::Restart
        }
    }

    fn announce_destinations(&self) -> Vec<Locator> {
        let config = self.ctx.config();
        let mut destinations = Vec::new();
        match self.role {
            PdpRole::Simple => {
                destinations.extend_from_slice(self.ctx.metatraffic_multicast_locators());
                destinations.extend_from_slice(&config.initial_peers);
            }
            PdpRole::Client => {
                if let DiscoveryMode::Client(servers) = &config.discovery {
                    for server in &servers.servers {
                        destinations.extend_from_slice(&server.locators);
                    }
                }
            }
            PdpRole::Server => {
                for participant in self.ctx.database().participants() {
                    destinations.extend_from_slice(participant.metatraffic_destinations());
                }
                destinations.extend_from_slice(&config.initial_peers);
            }
        }
        destinations.dedup();
        destinations
    }

    /// Send our latest participant data once to every announcement
    /// destination.
    pub fn announce(&self) {
        let destinations = self.announce_destinations();
        if destinations.is_empty() {
            return;
        }
        if !self
            .writer
            .send_latest_of(self.ctx.guid().into(), &destinations)
        {
            log::debug!("[PDP] announcement not sent");
        }
    }

    // ========================================================================
    // Remote participants
    // ========================================================================

    fn on_participant_data(&self, change: CacheChange) {
        if !change.kind.is_alive() {
            let guid = GUID::from(change.instance_handle);
            if guid.prefix != self.ctx.prefix() {
                self.remove_participant(guid.prefix, ParticipantDiscoveryStatus::Removed);
            }
            return;
        }

        let mut data = match ParticipantProxyData::decode(&change.payload) {
            Ok(data) => data,
            Err(e) => {
                log::warn!(
                    "[PDP] malformed participant data from {}: {}",
                    change.writer_guid,
                    e
                );
                return;
            }
        };
        if data.prefix() == self.ctx.prefix() {
            return;
        }
        if data.domain_id != self.ctx.config().domain_id {
            log::trace!(
                "[PDP] ignoring {} from domain {}",
                data.guid,
                data.domain_id
            );
            return;
        }
        // Relayed participants are kept alive by the server, not by their
        // own announcements.
        if self.role == PdpRole::Client && !self.is_configured_server(data.prefix()) {
            data.lease_duration = Duration::MAX;
        }

        match self.ctx.database().update_participant(data.clone()) {
            ParticipantUpdate::New => self.on_new_participant(&data),
            ParticipantUpdate::Changed => {
                log::debug!("[PDP] participant {} changed", data.guid);
                self.match_builtin(&data);
                if let Some(relay) = &self.relay {
                    relay.forward(data.guid, data.encode());
                }
                self.ctx.notify_discovery(&ParticipantDiscoveryInfo {
                    status: ParticipantDiscoveryStatus::Changed,
                    data,
                });
            }
            ParticipantUpdate::Unchanged => {}
        }
    }

    fn on_new_participant(&self, data: &ParticipantProxyData) {
        let prefix = data.prefix();
        log::info!(
            "[PDP] discovered participant {} ('{}'){}",
            data.guid,
            data.name,
            if data.is_server { " [server]" } else { "" }
        );
        if let Err(e) = self
            .ctx
            .keys()
            .register_matched_remote_participant(self.ctx.crypto_handle(), data.guid)
        {
            log::warn!("[PDP] no key material for {}: {}", data.guid, e);
        }

        self.match_builtin(data);
        self.edp.on_participant_discovered(prefix);

        match self.role {
            PdpRole::Simple => {
                self.writer
                    .send_latest_of(self.ctx.guid().into(), data.metatraffic_destinations());
            }
            PdpRole::Client => {
                if let Some(client) = &self.client {
                    if client.is_server(prefix) {
                        client.on_server_discovered(prefix);
                    }
                }
            }
            PdpRole::Server => {
                if let Some(relay) = &self.relay {
                    relay.forward(data.guid, data.encode());
                }
            }
        }

        self.ctx.notify_discovery(&ParticipantDiscoveryInfo {
            status: ParticipantDiscoveryStatus::Discovered,
            data: data.clone(),
        });
    }

    fn is_configured_server(&self, prefix: GuidPrefix) -> bool {
        self.client.as_ref().is_some_and(|c| c.is_server(prefix))
    }

    fn match_builtin(&self, data: &ParticipantProxyData) {
        match self.role {
            PdpRole::Simple => {
                self.edp.match_builtin(data);
            }
            PdpRole::Client => {
                if self.is_configured_server(data.prefix()) {
                    self.edp.match_builtin(data);
                }
            }
            PdpRole::Server => {
                self.match_spdp(data);
                self.edp.match_builtin(data);
            }
        }
        self.wlp.match_builtin(data);
    }

    fn match_spdp(&self, data: &ParticipantProxyData) {
        let locators = data.metatraffic_destinations();
        self.writer.matched_reader_add(remote_builtin_reader(
            data.prefix(),
            EntityId::SPDP_READER,
            locators,
            true,
        ));
        self.reader.matched_writer_add(remote_builtin_writer(
            data.prefix(),
            EntityId::SPDP_WRITER,
            locators,
            true,
        ));
    }

    /// Forget a participant and everything it announced.
    pub fn remove_participant(&self, prefix: GuidPrefix, status: ParticipantDiscoveryStatus) {
        let Some(entry) = self.ctx.database().remove_participant(prefix) else {
            return;
        };
        log::info!("[PDP] participant {} {:?}", entry.data.guid, status);

        self.edp.remove_participant_endpoints(&entry);
        self.edp.unmatch_builtin(prefix);
        self.wlp.unmatch_builtin(prefix);
        if self.role == PdpRole::Server {
            self.writer
                .matched_reader_remove(GUID::new(prefix, EntityId::SPDP_READER));
            self.reader
                .matched_writer_remove(GUID::new(prefix, EntityId::SPDP_WRITER));
        }
        self.ctx.keys().unregister(CryptoHandle(entry.data.guid));

        if let Some(relay) = &self.relay {
            relay.retract(entry.data.guid);
        }
        if let Some(client) = &self.client {
            client.on_server_lost(prefix);
        }

        self.ctx.notify_discovery(&ParticipantDiscoveryInfo {
            status,
            data: entry.data,
        });
    }

    /// Drop every participant whose lease expired before `now`.
    pub fn check_leases(&self, now: Instant) {
        for prefix in self.ctx.database().expired(now) {
            log::warn!("[PDP] lease expired for participant {}", prefix);
            self.remove_participant(prefix, ParticipantDiscoveryStatus::Dropped);
        }
    }

    /// Stop announcing and tell everyone we are leaving.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.announce_timer.cancel();
        self.lease_timer.cancel();
        if let Some(client) = &self.client {
            client.stop();
        }
        publish(
            &self.writer,
            ChangeKind::NotAliveDisposedUnregistered,
            self.ctx.guid().into(),
            Vec::new(),
        );
        self.announce();
        self.edp.close();
        self.wlp.close();
        self.writer.close();
        log::info!("[PDP] participant {} closed", self.ctx.guid());
    }
}

impl std::fmt::Debug for Pdp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pdp")
            .field("guid", &self.ctx.guid())
            .field("role", &self.role)
            .field("participants", &self.ctx.database().participant_count())
            .finish()
    }
}
