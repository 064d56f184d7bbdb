// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # DDS Participant
//!
//! The [`DomainParticipant`] joins a domain, runs discovery and creates
//! typed writers and readers.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rtps_core::config::ParticipantConfig;
//! use rtps_core::dds::{DataWriterQos, DomainParticipant};
//! use rtps_core::transport::LoopbackHub;
//! # use rtps_core::{Result, TypeSupport};
//! # struct Temperature(f32);
//! # impl TypeSupport for Temperature {
//! #     fn type_name() -> &'static str { "Temperature" }
//! #     fn serialized_size(&self) -> usize { 4 }
//! #     fn serialize(&self, buf: &mut Vec<u8>) -> Result<()> {
//! #         buf.extend_from_slice(&self.0.to_le_bytes()); Ok(())
//! #     }
//! #     fn deserialize(buf: &[u8]) -> Result<Self> {
//! #         let raw = buf.get(..4).ok_or(rtps_core::Error::SerializationError)?;
//! #         Ok(Self(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])))
//! #     }
//! # }
//!
//! # fn main() -> Result<()> {
//! let hub = LoopbackHub::new();
//! let participant = DomainParticipant::new(ParticipantConfig::new(0), hub.transport())?;
//! let writer = participant.create_writer::<Temperature>("sensors/temp", DataWriterQos::default())?;
//! writer.write(&Temperature(21.5))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------+
//! |                    DomainParticipant                    |
//! |   DataWriter<T> ... DataReader<T> ...                   |
//! +---------------------------------------------------------+
//! |  Pdp (SPDP) -> Edp (SEDP) + Wlp  |  DS client / relay   |
//! +---------------------------------------------------------+
//! |  ParticipantContext: scheduler, sender, database, keys, |
//! |  entity routing tables                                  |
//! +---------------------------------------------------------+
//! |  Transport (receive inputs -> dispatch)                 |
//! +---------------------------------------------------------+
//! ```

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::listener::{
    ParticipantDiscoveryInfo, ParticipantListener, ReaderListener, WriterListener,
};
use super::qos::{DataReaderQos, DataWriterQos};
use super::reader::DataReader;
use super::writer::DataWriter;
use super::{Error, Result, TypeSupport};
use crate::config::{
    metatraffic_unicast_port, user_unicast_port, DiscoveryMode, ParticipantConfig, VENDOR_ID,
};
use crate::congestion::{shared_bucket, SharedBucket};
use crate::core::discovery::{DiscoveryDatabase, ParticipantProxyData, Pdp};
use crate::core::guid::{EntityId, GuidPrefix, GUID};
use crate::core::locator::{select_external, Locator};
use crate::core::rt::current_time_ns;
use crate::core::rt::timer::TimerScheduler;
use crate::protocol::{decode_message, Submessage};
use crate::reliability::{RtpsReader, RtpsWriter};
use crate::security::{CryptoHandle, KeyMaterialTable, KeyService};
use crate::transport::{MessageSender, ReceiveCallback, ReceiverGuard, Transport};

static PREFIX_COUNTER: AtomicU16 = AtomicU16::new(0);

fn generate_prefix(local: Ipv4Addr) -> GuidPrefix {
    let host = u32::from(local) ^ (current_time_ns() as u32);
    let counter = PREFIX_COUNTER.fetch_add(1, Ordering::Relaxed);
    GuidPrefix::generate(VENDOR_ID, host, std::process::id(), counter)
}

/// Builtin reader receiving what a builtin writer sends to `UNKNOWN`.
fn builtin_counterpart(writer: EntityId) -> Option<EntityId> {
    match writer {
        EntityId::SPDP_WRITER => Some(EntityId::SPDP_READER),
        EntityId::SEDP_PUBLICATIONS_WRITER => Some(EntityId::SEDP_PUBLICATIONS_READER),
        EntityId::SEDP_SUBSCRIPTIONS_WRITER => Some(EntityId::SEDP_SUBSCRIPTIONS_READER),
        EntityId::WLP_WRITER => Some(EntityId::WLP_READER),
        _ => None,
    }
}

// ============================================================================
// ParticipantContext
// ============================================================================

/// State shared by every entity of one participant.
pub struct ParticipantContext {
    prefix: GuidPrefix,
    config: ParticipantConfig,
    scheduler: TimerScheduler,
    sender: MessageSender,
    database: DiscoveryDatabase,
    keys: KeyMaterialTable,
    crypto_handle: CryptoHandle,
    participant_bucket: Option<SharedBucket>,
    metatraffic_unicast: Vec<Locator>,
    metatraffic_multicast: Vec<Locator>,
    default_unicast: Vec<Locator>,
    writers: DashMap<EntityId, Arc<RtpsWriter>>,
    readers: DashMap<EntityId, Arc<RtpsReader>>,
    next_key: AtomicU32,
    listener: ArcSwapOption<ParticipantListener>,
    closed: AtomicBool,
}

impl ParticipantContext {
    fn new(config: ParticipantConfig, transport: Arc<dyn Transport>) -> Result<Arc<Self>> {
        config.validate()?;

        let local = transport.local_address();
        let prefix = config
            .guid_prefix
            .unwrap_or_else(|| generate_prefix(local));
        let scheduler = TimerScheduler::start("rtps-timer")?;

        let local_meta = Locator::udpv4(
            local,
            metatraffic_unicast_port(config.domain_id, config.participant_id),
        );
        let local_user = Locator::udpv4(
            local,
            user_unicast_port(config.domain_id, config.participant_id),
        );
        let mut metatraffic_unicast = vec![local_meta];
        let mut default_unicast = vec![local_user];
        // Advertise the best NAT'd address next to the local one.
        if let Some(external) = select_external(&config.external_locators, &[local_meta]) {
            if !metatraffic_unicast.contains(external) {
                metatraffic_unicast.push(*external);
            }
            let mut user = *external;
            user.set_physical_port(local_user.physical_port());
            if !default_unicast.contains(&user) {
                default_unicast.push(user);
            }
        }
        let metatraffic_multicast = match config.discovery {
            DiscoveryMode::Simple => vec![Locator::spdp_multicast(config.domain_id)],
            _ => Vec::new(),
        };

        let keys = KeyMaterialTable::default();
        let crypto_handle = keys.register_local_participant(GUID::new(prefix, EntityId::PARTICIPANT))?;
        let participant_bucket = config.throughput_controller.as_ref().map(shared_bucket);

        Ok(Arc::new(Self {
            prefix,
            sender: MessageSender::new(prefix, transport),
            config,
            scheduler,
            database: DiscoveryDatabase::new(),
            keys,
            crypto_handle,
            participant_bucket,
            metatraffic_unicast,
            metatraffic_multicast,
            default_unicast,
            writers: DashMap::new(),
            readers: DashMap::new(),
            next_key: AtomicU32::new(1),
            listener: ArcSwapOption::empty(),
            closed: AtomicBool::new(false),
        }))
    }

    pub fn prefix(&self) -> GuidPrefix {
        self.prefix
    }

    pub fn guid(&self) -> GUID {
        GUID::new(self.prefix, EntityId::PARTICIPANT)
    }

    pub fn config(&self) -> &ParticipantConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &TimerScheduler {
        &self.scheduler
    }

    pub fn sender(&self) -> &MessageSender {
        &self.sender
    }

    pub fn database(&self) -> &DiscoveryDatabase {
        &self.database
    }

    pub fn keys(&self) -> &KeyMaterialTable {
        &self.keys
    }

    pub fn crypto_handle(&self) -> CryptoHandle {
        self.crypto_handle
    }

    /// Token bucket shared by every writer when the participant has a
    /// throughput controller.
    pub fn participant_bucket(&self) -> Option<&SharedBucket> {
        self.participant_bucket.as_ref()
    }

    pub fn metatraffic_unicast_locators(&self) -> &[Locator] {
        &self.metatraffic_unicast
    }

    pub fn metatraffic_multicast_locators(&self) -> &[Locator] {
        &self.metatraffic_multicast
    }

    pub fn default_unicast_locators(&self) -> &[Locator] {
        &self.default_unicast
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // ========================================================================
    // Entity routing
    // ========================================================================

    pub fn add_writer(&self, writer: Arc<RtpsWriter>) {
        self.writers.insert(writer.guid().entity_id, writer);
    }

    pub fn add_reader(&self, reader: Arc<RtpsReader>) {
        self.readers.insert(reader.guid().entity_id, reader);
    }

    pub fn remove_writer(&self, entity: EntityId) -> Option<Arc<RtpsWriter>> {
        self.writers.remove(&entity).map(|(_, w)| w)
    }

    pub fn remove_reader(&self, entity: EntityId) -> Option<Arc<RtpsReader>> {
        self.readers.remove(&entity).map(|(_, r)| r)
    }

    /// Next user entity key, unique within the participant.
    pub fn next_entity_key(&self) -> u32 {
        self.next_key.fetch_add(1, Ordering::Relaxed)
    }

    fn writer(&self, entity: EntityId) -> Option<Arc<RtpsWriter>> {
        self.writers.get(&entity).map(|w| Arc::clone(w.value()))
    }

    /// Readers addressed by a submessage from `writer` to `reader`.
    fn target_readers(&self, writer: EntityId, reader: EntityId) -> Vec<Arc<RtpsReader>> {
        if reader != EntityId::UNKNOWN {
            return self
                .readers
                .get(&reader)
                .map(|r| vec![Arc::clone(r.value())])
                .unwrap_or_default();
        }
        if writer.is_builtin() {
            return builtin_counterpart(writer)
                .and_then(|id| self.readers.get(&id).map(|r| Arc::clone(r.value())))
                .into_iter()
                .collect();
        }
        self.readers
            .iter()
            .filter(|r| !r.key().is_builtin())
            .map(|r| Arc::clone(r.value()))
            .collect()
    }

    /// Decode one datagram and route its submessages.
    pub(crate) fn dispatch(&self, bytes: &[u8]) {
        if self.is_closed() {
            return;
        }
        let msg = match decode_message(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("[discovery] dropping malformed message: {}", e);
                return;
            }
        };
        if msg.destination.is_some_and(|d| d != self.prefix) {
            return;
        }
        let own = msg.sender == self.prefix;
        if !own {
            self.database.touch(msg.sender);
        }

        for sub in msg.submessages {
            if own && sub.writer_id().is_builtin() {
                continue;
            }
            let writer_guid = GUID::new(msg.sender, sub.writer_id());
            match sub {
                Submessage::AckNack(ack) => {
                    if let Some(writer) = self.writer(ack.writer_id) {
                        writer.on_acknack(GUID::new(msg.sender, ack.reader_id), &ack);
                    }
                }
                Submessage::Data(data) => {
                    for reader in self.target_readers(data.writer_id, data.reader_id) {
                        reader.on_data(writer_guid, data.clone());
                    }
                }
                Submessage::DataFrag(frag) => {
                    for reader in self.target_readers(frag.writer_id, frag.reader_id) {
                        reader.on_data_frag(writer_guid, &frag);
                    }
                }
                Submessage::Heartbeat(hb) => {
                    for reader in self.target_readers(hb.writer_id, hb.reader_id) {
                        reader.on_heartbeat(writer_guid, &hb);
                    }
                }
                Submessage::Gap(gap) => {
                    for reader in self.target_readers(gap.writer_id, gap.reader_id) {
                        reader.on_gap(writer_guid, &gap);
                    }
                }
            }
        }
    }

    // ========================================================================
    // Listener
    // ========================================================================

    pub fn set_listener(&self, listener: Option<ParticipantListener>) {
        self.listener.store(listener.map(Arc::new));
    }

    pub(crate) fn notify_discovery(&self, info: &ParticipantDiscoveryInfo) {
        if let Some(listener) = self.listener.load_full() {
            listener.participant_discovery(info);
        }
    }
}

impl std::fmt::Debug for ParticipantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticipantContext")
            .field("prefix", &self.prefix)
            .field("domain_id", &self.config.domain_id)
            .field("writers", &self.writers.len())
            .field("readers", &self.readers.len())
            .finish()
    }
}

// ============================================================================
// DomainParticipant
// ============================================================================

/// Entry point: joins a domain and creates writers and readers.
pub struct DomainParticipant {
    ctx: Arc<ParticipantContext>,
    pdp: Arc<Pdp>,
    inputs: Mutex<Vec<ReceiverGuard>>,
}

impl DomainParticipant {
    /// Create and enable a participant on `transport`.
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the configuration is invalid
    /// - `Error::IoError` if the scheduler thread or a transport input
    ///   cannot be started
    pub fn new(config: ParticipantConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let ctx = ParticipantContext::new(config, Arc::clone(&transport))?;
        let pdp = Pdp::new(Arc::clone(&ctx));

        let mut locators: Vec<Locator> = Vec::new();
        locators.extend_from_slice(&ctx.metatraffic_unicast[..1]);
        locators.extend_from_slice(ctx.metatraffic_multicast_locators());
        locators.extend_from_slice(&ctx.default_unicast[..1]);

        let mut inputs = Vec::with_capacity(locators.len());
        for locator in locators {
            let weak: Weak<ParticipantContext> = Arc::downgrade(&ctx);
            let callback: ReceiveCallback = Arc::new(move |bytes: &[u8]| {
                if let Some(ctx) = weak.upgrade() {
                    ctx.dispatch(bytes);
                }
            });
            match transport.on_receive(locator, callback) {
                Ok(guard) => inputs.push(guard),
                Err(e) => {
                    pdp.close();
                    ctx.scheduler.stop();
                    return Err(Error::Transport(format!(
                        "cannot open input on {}: {}",
                        locator, e
                    )));
                }
            }
        }

        pdp.enable();
        log::info!(
            "[discovery] participant {} joined domain {}",
            ctx.guid(),
            ctx.config.domain_id
        );
        Ok(Self {
            ctx,
            pdp,
            inputs: Mutex::new(inputs),
        })
    }

    pub fn guid(&self) -> GUID {
        self.ctx.guid()
    }

    pub fn domain_id(&self) -> u32 {
        self.ctx.config.domain_id
    }

    pub fn context(&self) -> &Arc<ParticipantContext> {
        &self.ctx
    }

    pub fn metatraffic_unicast_locators(&self) -> &[Locator] {
        self.ctx.metatraffic_unicast_locators()
    }

    /// Create a typed writer on `topic`.
    ///
    /// # Errors
    ///
    /// QoS errors from `DataWriterQos::check`; `Error::AlreadyDeleted`
    /// after [`DomainParticipant::close`].
    pub fn create_writer<T: TypeSupport>(
        &self,
        topic: &str,
        qos: DataWriterQos,
    ) -> Result<DataWriter<T>> {
        self.create_writer_with_listener(topic, qos, None)
    }

    /// Create a writer whose listener is installed before matching starts,
    /// so no match event can be missed.
    pub fn create_writer_with_listener<T: TypeSupport>(
        &self,
        topic: &str,
        qos: DataWriterQos,
        listener: Option<WriterListener>,
    ) -> Result<DataWriter<T>> {
        if self.ctx.is_closed() {
            return Err(Error::AlreadyDeleted);
        }
        DataWriter::new(
            Arc::clone(&self.ctx),
            Arc::clone(&self.pdp),
            topic,
            qos,
            listener,
        )
    }

    /// Create a typed reader on `topic`.
    pub fn create_reader<T: TypeSupport>(
        &self,
        topic: &str,
        qos: DataReaderQos,
    ) -> Result<DataReader<T>> {
        self.create_reader_with_listener(topic, qos, None)
    }

    pub fn create_reader_with_listener<T: TypeSupport>(
        &self,
        topic: &str,
        qos: DataReaderQos,
        listener: Option<ReaderListener>,
    ) -> Result<DataReader<T>> {
        if self.ctx.is_closed() {
            return Err(Error::AlreadyDeleted);
        }
        DataReader::new(
            Arc::clone(&self.ctx),
            Arc::clone(&self.pdp),
            topic,
            qos,
            listener,
        )
    }

    /// Assert every MANUAL_BY_PARTICIPANT writer of this participant.
    pub fn assert_liveliness(&self) -> Result<()> {
        if self.ctx.is_closed() {
            return Err(Error::AlreadyDeleted);
        }
        self.pdp.wlp().assert_participant();
        Ok(())
    }

    pub fn set_listener(&self, listener: Option<ParticipantListener>) {
        self.ctx.set_listener(listener);
    }

    /// Remote participants currently known.
    pub fn discovered_participants(&self) -> Vec<ParticipantProxyData> {
        self.ctx.database.participants()
    }

    /// Configured discovery servers currently discovered (client mode).
    pub fn connected_servers(&self) -> Vec<GuidPrefix> {
        self.pdp
            .client()
            .map(|c| c.connected_servers())
            .unwrap_or_default()
    }

    /// Re-send our participant announcement now.
    pub fn announce(&self) {
        self.pdp.announce();
    }

    /// Leave the domain: dispose our announcement and stop every protocol.
    /// Writers and readers still alive stop working.
    pub fn close(&self) {
        if self.ctx.closed.load(Ordering::Acquire) {
            return;
        }
        self.pdp.close();
        self.ctx.closed.store(true, Ordering::Release);
        for guard in self.inputs.lock().drain(..) {
            guard.close();
        }
        let writers: Vec<Arc<RtpsWriter>> =
            self.ctx.writers.iter().map(|w| Arc::clone(w.value())).collect();
        for writer in writers {
            writer.close();
        }
        self.ctx.writers.clear();
        self.ctx.readers.clear();
        self.ctx.scheduler.stop();
        log::info!("[discovery] participant {} closed", self.ctx.guid());
    }
}

impl Drop for DomainParticipant {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DomainParticipant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainParticipant")
            .field("guid", &self.ctx.guid())
            .field("pdp", &self.pdp)
            .finish()
    }
}
