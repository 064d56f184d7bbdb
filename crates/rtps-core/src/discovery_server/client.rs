// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery Server client.
//!
//! The participant's PDP writer and reader are reliable and transient-local
//! and pre-matched with every configured server. A sync timer then drives
//! the connection:
//!
//! ```text
//!   sync tick, for each server:
//!     proxy unknown          -> ping (re-announce own PDP data)
//!     a server was just lost -> ping every server once
//!     proxy known            -> match EDP builtin endpoints
//!     PDP data not acked yet -> keep syncing
//!   all servers known + acked -> stop timer
//! ```
//!
//! Losing a server (lease expiry or dispose) re-creates its PDP proxies with
//! a clean slate, flags a full re-announcement and restarts the sync timer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use super::config::{DiscoveryServerConfig, RemoteServer};
use crate::core::discovery::{remote_builtin_reader, remote_builtin_writer, Edp};
use crate::core::guid::{EntityId, GuidPrefix, GUID};
use crate::core::rt::timer::{TimerAction, TimerHandle};
use crate::dds::ParticipantContext;
use crate::reliability::{RtpsReader, RtpsWriter};

/// Client side of the discovery-server topology.
pub struct DiscoveryServerClient {
    ctx: Arc<ParticipantContext>,
    config: DiscoveryServerConfig,
    pdp_writer: Arc<RtpsWriter>,
    pdp_reader: Arc<RtpsReader>,
    edp: Arc<Edp>,
    sync_timer: TimerHandle,
    syncing: AtomicBool,
    /// Set when a server is lost; the next tick pings every server.
    resync_all: AtomicBool,
    stopped: AtomicBool,
}

impl DiscoveryServerClient {
    pub fn new(
        ctx: Arc<ParticipantContext>,
        config: DiscoveryServerConfig,
        pdp_writer: Arc<RtpsWriter>,
        pdp_reader: Arc<RtpsReader>,
        edp: Arc<Edp>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<DiscoveryServerClient>| {
            let on_sync = weak.clone();
            let sync_timer = ctx
                .scheduler()
                .create_timer(config.sync_period, move || match on_sync.upgrade() {
                    Some(client) => client.sync(),
                    None => TimerAction::Stop,
                });
            Self {
                ctx,
                config,
                pdp_writer,
                pdp_reader,
                edp,
                sync_timer,
                syncing: AtomicBool::new(false),
                resync_all: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }
        })
    }

    /// Pre-match every server and start syncing.
    pub fn start(&self) {
        for server in &self.config.servers {
            self.prematch(server);
        }
        log::info!(
            "[DS-CLIENT] {} connecting to {} server(s)",
            self.ctx.prefix(),
            self.config.servers.len()
        );
        self.kick();
    }

    fn prematch(&self, server: &RemoteServer) {
        self.pdp_writer.matched_reader_add(remote_builtin_reader(
            server.prefix,
            EntityId::SPDP_READER,
            &server.locators,
            true,
        ));
        self.pdp_reader.matched_writer_add(remote_builtin_writer(
            server.prefix,
            EntityId::SPDP_WRITER,
            &server.locators,
            true,
        ));
    }

    fn server(&self, prefix: GuidPrefix) -> Option<&RemoteServer> {
        self.config.servers.iter().find(|s| s.prefix == prefix)
    }

    pub fn is_server(&self, prefix: GuidPrefix) -> bool {
        self.server(prefix).is_some()
    }

    /// Configured servers.
    pub fn servers(&self) -> Vec<GuidPrefix> {
        self.config.servers.iter().map(|s| s.prefix).collect()
    }

    /// Configured servers currently discovered.
    pub fn connected_servers(&self) -> Vec<GuidPrefix> {
        let db = self.ctx.database();
        self.config
            .servers
            .iter()
            .map(|s| s.prefix)
            .filter(|p| db.contains(*p))
            .collect()
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    fn kick(&self) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        self.syncing.store(true, Ordering::Release);
        self.sync_timer.restart_in(Duration::ZERO);
    }

    fn sync(&self) -> TimerAction {
        if self.stopped.load(Ordering::Acquire) {
            return TimerAction::Stop;
        }
        let own = self.ctx.guid().into();
        let announce_all = self.resync_all.swap(false, Ordering::AcqRel);
        let mut done = true;
        for server in &self.config.servers {
            match self.ctx.database().participant(server.prefix) {
                None => {
                    log::trace!("[DS-CLIENT] pinging server {}", server.prefix);
                    self.pdp_writer.send_latest_of(own, &server.locators);
                    done = false;
                }
                Some(data) => {
                    if announce_all {
                        log::trace!("[DS-CLIENT] re-announcing to server {}", server.prefix);
                        self.pdp_writer.send_latest_of(own, &server.locators);
                    }
                    self.edp.match_builtin(&data);
                    let reader = GUID::new(server.prefix, EntityId::SPDP_READER);
                    if !self.pdp_writer.is_acked_by(reader) {
                        done = false;
                    }
                }
            }
        }

        if done {
            self.syncing.store(false, Ordering::Release);
            log::info!(
                "[DS-CLIENT] {} synchronized with {} server(s)",
                self.ctx.prefix(),
                self.config.servers.len()
            );
            TimerAction::Stop
        } else {
            TimerAction::Restart
        }
    }

    pub fn on_server_discovered(&self, prefix: GuidPrefix) {
        log::info!("[DS-CLIENT] server {} discovered", prefix);
        self.kick();
    }

    /// Drop every trace of the server's PDP endpoints and start over.
    pub fn on_server_lost(&self, prefix: GuidPrefix) {
        let Some(server) = self.server(prefix) else {
            return;
        };
        log::warn!("[DS-CLIENT] lost server {}, resyncing", prefix);
        self.pdp_writer
            .matched_reader_remove(GUID::new(prefix, EntityId::SPDP_READER));
        self.pdp_reader
            .matched_writer_remove(GUID::new(prefix, EntityId::SPDP_WRITER));
        self.prematch(server);
        self.resync_all.store(true, Ordering::Release);
        self.kick();
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.syncing.store(false, Ordering::Release);
        self.sync_timer.cancel();
    }
}

impl std::fmt::Debug for DiscoveryServerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryServerClient")
            .field("servers", &self.servers())
            .field("syncing", &self.is_syncing())
            .finish()
    }
}
