// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed DataWriter.
//!
//! Wraps an [`RtpsWriter`] with the QoS-driven lifecycle:
//!
//! - instance registration, unregistration and disposal (keyed topics)
//! - fragmentation above the fragment high-mark
//! - offered deadline (one scheduler timer for the nearest instance deadline)
//! - lifespan purge (one scheduler timer for the earliest change)
//! - liveliness lease and `set_qos` with immutability checks

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::Mutex;

use super::listener::{
    LivelinessLostStatus, OfferedDeadlineMissedStatus, OfferedIncompatibleQosStatus,
    PublicationMatchedStatus, WriterListener,
};
use super::participant::ParticipantContext;
use super::qos::{
    immutable_changes, DataWriterQos, Durability, LivelinessKind, QosPolicyId, Reliability,
    INFINITE,
};
use super::{Error, Result, TypeSupport};
use crate::config::MESSAGE_OVERHEAD;
use crate::congestion::FlowController;
use crate::core::discovery::{
    LocalWriter, Pdp, ReaderProxyData, WriterLease, WriterProxyData,
};
use crate::core::guid::{EntityId, InstanceHandle, GUID};
use crate::core::rt::deadline_after;
use crate::core::rt::timer::{TimerAction, TimerHandle};
use crate::protocol::SequenceNumber;
use crate::reliability::{
    ChangeKind, RemoteReaderInfo, RtpsWriter, WriteParams, WriterAttributes,
};
use crate::security::{CryptoHandle, KeyService};

/// Bytes reserved for the related sample identity inline QoS.
const RELATED_IDENTITY_OVERHEAD: usize = 32;

/// Largest fragment size expressible on the wire, multiple of 4.
const MAX_FRAGMENT_SIZE: usize = (u16::MAX as usize) & !3;

#[derive(Debug, Default)]
struct WriterStatuses {
    matched: PublicationMatchedStatus,
    deadline_missed: OfferedDeadlineMissedStatus,
    incompatible_qos: OfferedIncompatibleQosStatus,
    liveliness_lost: LivelinessLostStatus,
}

// ============================================================================
// WriterInner
// ============================================================================

/// Untyped part of a DataWriter, shared with discovery and timers.
pub(crate) struct WriterInner {
    ctx: Arc<ParticipantContext>,
    pdp: Arc<Pdp>,
    rtps: Arc<RtpsWriter>,
    topic: String,
    type_name: &'static str,
    keyed: bool,
    qos: ArcSwap<DataWriterQos>,
    listener: ArcSwapOption<WriterListener>,
    statuses: Mutex<WriterStatuses>,
    deadline_timer: TimerHandle,
    lifespan_timer: TimerHandle,
    lease: Arc<WriterLease>,
    enabled: AtomicBool,
    closed: AtomicBool,
}

impl WriterInner {
    fn guid(&self) -> GUID {
        self.rtps.guid()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) || self.ctx.is_closed() {
            return Err(Error::AlreadyDeleted);
        }
        Ok(())
    }

    fn ensure_enabled(&self) -> Result<()> {
        self.ensure_open()?;
        if !self.enabled.load(Ordering::Acquire) {
            return Err(Error::NotEnabled);
        }
        Ok(())
    }

    /// Attach to the participant and announce through discovery.
    fn enable(self: &Arc<Self>) -> Result<()> {
        self.ensure_open()?;
        if self.enabled.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.ctx.add_writer(Arc::clone(&self.rtps));
        self.pdp.wlp().register_writer(Arc::clone(&self.lease));
        self.pdp
            .edp()
            .register_writer(Arc::clone(self) as Arc<dyn LocalWriter>);
        log::debug!("[writer] {} enabled on '{}'", self.guid(), self.topic);
        Ok(())
    }

    /// Largest payload sent in one DATA; larger payloads are fragmented.
    fn fragment_high_mark(&self, related_identity: bool) -> usize {
        let transport = self
            .ctx
            .sender()
            .max_message_size()
            .saturating_sub(MESSAGE_OVERHEAD);
        let mut mark = match self.rtps.flow_controller().max_payload() {
            Some(flow) => flow.min(transport),
            None => transport,
        };
        mark = mark.min(MAX_FRAGMENT_SIZE) & !3;
        if related_identity {
            mark = mark.saturating_sub(RELATED_IDENTITY_OVERHEAD);
        }
        mark
    }

    fn write_change(
        &self,
        kind: ChangeKind,
        instance: InstanceHandle,
        payload: Vec<u8>,
        params: &WriteParams,
    ) -> Result<SequenceNumber> {
        self.ensure_enabled()?;
        let qos = self.qos.load_full();
        let blocking_deadline = deadline_after(qos.max_blocking_time);

        let mark = self.fragment_high_mark(params.related_sample_identity.is_some());
        let fragment_size = if payload.len() > mark && mark > 0 {
            u16::try_from(mark).ok()
        } else {
            None
        };

        let seq = self
            .rtps
            .add_change(kind, instance, payload, params, fragment_size, blocking_deadline)?;

        if kind.is_alive() {
            if qos.deadline != INFINITE {
                if let Some(next) = Instant::now().checked_add(qos.deadline) {
                    self.rtps
                        .with_history(|h| h.set_next_deadline(instance, next));
                    self.rearm_deadline();
                }
            }
        } else if kind.is_unregistered() {
            self.rtps.with_history(|h| h.clear_deadline(instance));
            self.rearm_deadline();
        }
        if qos.lifespan != INFINITE && !self.lifespan_timer.is_armed() {
            self.lifespan_timer.restart_in(qos.lifespan);
        }
        self.pdp.wlp().writer_wrote(&self.lease);
        Ok(seq)
    }

    // ========================================================================
    // Deadline / lifespan
    // ========================================================================

    fn rearm_deadline(&self) {
        match self.rtps.with_history(|h| h.get_next_deadline()) {
            Some((_, at)) => self
                .deadline_timer
                .restart_in(at.saturating_duration_since(Instant::now())),
            None => self.deadline_timer.cancel(),
        }
    }

    fn on_deadline_timer(&self) -> TimerAction {
        let period = self.qos.load().deadline;
        if period == INFINITE || self.closed.load(Ordering::Acquire) {
            return TimerAction::Stop;
        }
        let now = Instant::now();
        let (missed, next) = self.rtps.with_history(|h| {
            let mut missed = Vec::new();
            while let Some((instance, at)) = h.get_next_deadline() {
                if at > now {
                    break;
                }
                missed.push(instance);
                match now.checked_add(period) {
                    Some(next) => h.set_next_deadline(instance, next),
                    None => h.clear_deadline(instance),
                }
            }
            (missed, h.get_next_deadline())
        });

        for instance in missed {
            log::debug!(
                "[writer] {} offered deadline missed on '{}'",
                self.guid(),
                self.topic
            );
            let status = {
                let mut statuses = self.statuses.lock();
                statuses.deadline_missed.missed(instance);
                statuses.deadline_missed.clone()
            };
            if let Some(listener) = self.listener.load_full() {
                if listener.offered_deadline_missed(self.guid(), &status) {
                    self.statuses.lock().deadline_missed.reset_changes();
                }
            }
        }

        match next {
            Some((_, at)) => TimerAction::RestartIn(at.saturating_duration_since(Instant::now())),
            None => TimerAction::Stop,
        }
    }

    fn on_lifespan_timer(&self) -> TimerAction {
        let lifespan = self.qos.load().lifespan;
        if lifespan == INFINITE || self.closed.load(Ordering::Acquire) {
            return TimerAction::Stop;
        }
        match self.rtps.remove_expired(lifespan, Instant::now()) {
            Some(at) => TimerAction::RestartIn(at.saturating_duration_since(Instant::now())),
            None => TimerAction::Stop,
        }
    }

    fn on_liveliness_lost(&self) {
        log::warn!("[writer] {} liveliness lost on '{}'", self.guid(), self.topic);
        let status = {
            let mut statuses = self.statuses.lock();
            statuses.liveliness_lost.lost();
            statuses.liveliness_lost.clone()
        };
        if let Some(listener) = self.listener.load_full() {
            if listener.liveliness_lost(self.guid(), &status) {
                self.statuses.lock().liveliness_lost.reset_changes();
            }
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.listener.store(None);
        self.deadline_timer.cancel();
        self.lifespan_timer.cancel();

        let guid = self.guid();
        self.pdp.edp().unregister_writer(guid);
        self.pdp.wlp().unregister_writer(guid);
        for reader in self.rtps.matched_readers() {
            self.ctx.keys().unregister(CryptoHandle(reader));
        }
        self.rtps.close();
        self.ctx.remove_writer(guid.entity_id);
        log::debug!("[writer] {} on '{}' deleted", guid, self.topic);
    }
}

impl LocalWriter for WriterInner {
    fn writer_data(&self) -> WriterProxyData {
        let qos = self.qos.load();
        WriterProxyData {
            guid: self.guid(),
            participant_guid: self.ctx.guid(),
            topic_name: self.topic.clone(),
            type_name: self.type_name.to_string(),
            unicast_locators: self.ctx.default_unicast_locators().to_vec(),
            multicast_locators: Vec::new(),
            qos: qos.endpoint_qos(),
            max_fragment_payload: u32::try_from(self.fragment_high_mark(false)).unwrap_or(0),
        }
    }

    fn is_matched(&self, reader: GUID) -> bool {
        self.rtps.is_matched(reader)
    }

    fn reader_matched(&self, reader: &ReaderProxyData) {
        let info = RemoteReaderInfo {
            guid: reader.guid,
            unicast_locators: reader.unicast_locators.clone(),
            multicast_locators: reader.multicast_locators.clone(),
            reliable: reader.qos.reliability == Reliability::Reliable,
            volatile: reader.qos.durability == Durability::Volatile,
            expects_inline_qos: reader.expects_inline_qos,
        };
        if !self.rtps.matched_reader_add(info) {
            return;
        }
        if let Err(e) = self
            .ctx
            .keys()
            .register_matched_remote_reader(CryptoHandle(reader.participant_guid), reader.guid)
        {
            log::debug!("[writer] no key material for reader {}: {}", reader.guid, e);
        }
        log::info!(
            "[writer] {} matched reader {} on '{}'",
            self.guid(),
            reader.guid,
            self.topic
        );
        let status = {
            let mut statuses = self.statuses.lock();
            statuses.matched.matched(reader.guid);
            statuses.matched.clone()
        };
        if let Some(listener) = self.listener.load_full() {
            if listener.publication_matched(self.guid(), &status) {
                self.statuses.lock().matched.reset_changes();
            }
        }
    }

    fn reader_unmatched(&self, reader: GUID) {
        if !self.rtps.matched_reader_remove(reader) {
            return;
        }
        self.ctx.keys().unregister(CryptoHandle(reader));
        log::info!(
            "[writer] {} unmatched reader {} on '{}'",
            self.guid(),
            reader,
            self.topic
        );
        let status = {
            let mut statuses = self.statuses.lock();
            statuses.matched.unmatched(reader);
            statuses.matched.clone()
        };
        if let Some(listener) = self.listener.load_full() {
            if listener.publication_matched(self.guid(), &status) {
                self.statuses.lock().matched.reset_changes();
            }
        }
    }

    fn incompatible_qos(&self, reader: GUID, policies: &[QosPolicyId]) {
        log::warn!(
            "[MATCH-QOS] writer {} offered QoS incompatible with reader {}: {:?}",
            self.guid(),
            reader,
            policies
        );
        let status = {
            let mut statuses = self.statuses.lock();
            statuses.incompatible_qos.record(policies);
            statuses.incompatible_qos.clone()
        };
        if let Some(listener) = self.listener.load_full() {
            if listener.offered_incompatible_qos(self.guid(), &status) {
                self.statuses.lock().incompatible_qos.reset_changes();
            }
        }
    }
}

// ============================================================================
// DataWriter
// ============================================================================

/// Typed writer bound to one topic.
///
/// Dropping the writer deletes it: remote readers see it disappear and
/// its history is released.
pub struct DataWriter<T: TypeSupport> {
    inner: Arc<WriterInner>,
    _type: PhantomData<fn(T)>,
}

impl<T: TypeSupport> DataWriter<T> {
    pub(crate) fn new(
        ctx: Arc<ParticipantContext>,
        pdp: Arc<Pdp>,
        topic: &str,
        qos: DataWriterQos,
        listener: Option<WriterListener>,
    ) -> Result<Self> {
        qos.check()?;
        if topic.is_empty() {
            return Err(Error::BadParameter("topic name is empty".into()));
        }

        let keyed = T::is_keyed();
        let guid = GUID::new(
            ctx.prefix(),
            EntityId::user_writer(ctx.next_entity_key(), keyed),
        );
        let attrs = WriterAttributes::new(guid)
            .with_reliable(qos.reliability == Reliability::Reliable)
            .with_durable(qos.durability.is_durable())
            .with_heartbeat_period(qos.heartbeat_period)
            .with_history(qos.history, qos.resource_limits)
            .with_keyed(keyed);
        let flow = FlowController::new(
            qos.throughput_controller,
            ctx.participant_bucket().cloned(),
        );
        let rtps = RtpsWriter::new(attrs, ctx.sender().clone(), flow, ctx.scheduler());

        let inner = Arc::new_cyclic(|weak: &Weak<WriterInner>| {
            let on_deadline = weak.clone();
            let deadline_timer = ctx.scheduler().create_timer(qos.deadline, move || {
                match on_deadline.upgrade() {
                    Some(inner) => inner.on_deadline_timer(),
                    None => TimerAction::Stop,
                }
            });
            let on_lifespan = weak.clone();
            let lifespan_timer = ctx.scheduler().create_timer(qos.lifespan, move || {
                match on_lifespan.upgrade() {
                    Some(inner) => inner.on_lifespan_timer(),
                    None => TimerAction::Stop,
                }
            });
            let on_lost = weak.clone();
            let lease = WriterLease::new(guid, qos.liveliness, move || {
                if let Some(inner) = on_lost.upgrade() {
                    inner.on_liveliness_lost();
                }
            });

            WriterInner {
                ctx: Arc::clone(&ctx),
                pdp: Arc::clone(&pdp),
                rtps: Arc::clone(&rtps),
                topic: topic.to_string(),
                type_name: T::type_name(),
                keyed,
                qos: ArcSwap::from_pointee(qos),
                listener: ArcSwapOption::from(listener.map(Arc::new)),
                statuses: Mutex::new(WriterStatuses::default()),
                deadline_timer,
                lifespan_timer,
                lease,
                enabled: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }
        });

        if ctx.config().autoenable_created_entities {
            inner.enable()?;
        }
        log::info!(
            "[writer] created {} on '{}' ({})",
            guid,
            topic,
            T::type_name()
        );

        Ok(Self {
            inner,
            _type: PhantomData,
        })
    }

    pub fn guid(&self) -> GUID {
        self.inner.guid()
    }

    pub fn topic_name(&self) -> &str {
        &self.inner.topic
    }

    /// Make the writer visible to discovery and able to publish. Writers
    /// are enabled at creation unless the participant was configured
    /// otherwise; enabling twice is a no-op.
    pub fn enable(&self) -> Result<()> {
        self.inner.enable()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    pub fn get_qos(&self) -> DataWriterQos {
        self.inner.qos.load().as_ref().clone()
    }

    // ========================================================================
    // Writing
    // ========================================================================

    fn instance_of(&self, data: &T) -> InstanceHandle {
        if self.inner.keyed {
            data.get_key()
        } else {
            InstanceHandle::NIL
        }
    }

    fn serialize(data: &T) -> Result<Vec<u8>> {
        let mut payload = Vec::with_capacity(data.serialized_size());
        data.serialize(&mut payload)?;
        Ok(payload)
    }

    /// Publish a sample.
    ///
    /// # Errors
    ///
    /// - `Error::AlreadyDeleted` after the writer or participant was closed
    /// - `Error::NotEnabled` before [`DataWriter::enable`]
    /// - serialization errors from `T`
    /// - `Error::Timeout` when `max_blocking_time` elapses (KEEP_ALL history
    ///   full of unacknowledged samples, or writer busy)
    /// - `Error::ResourceLimitExceeded` for an instance beyond `max_instances`
    pub fn write(&self, data: &T) -> Result<()> {
        self.write_w_params(data, &WriteParams::default())
    }

    /// Publish with explicit source timestamp or related sample identity.
    pub fn write_w_params(&self, data: &T, params: &WriteParams) -> Result<()> {
        let payload = Self::serialize(data)?;
        self.inner
            .write_change(ChangeKind::Alive, self.instance_of(data), payload, params)?;
        Ok(())
    }

    /// Publish on a known instance handle.
    pub fn write_w_handle(&self, data: &T, handle: InstanceHandle) -> Result<()> {
        if !handle.is_defined() {
            return Err(Error::BadParameter("instance handle is not defined".into()));
        }
        if self.inner.keyed && handle != data.get_key() {
            return Err(Error::PreconditionNotMet(
                "instance handle does not match the sample key".into(),
            ));
        }
        let payload = Self::serialize(data)?;
        self.inner
            .write_change(ChangeKind::Alive, handle, payload, &WriteParams::default())?;
        Ok(())
    }

    // ========================================================================
    // Instances
    // ========================================================================

    fn require_keyed(&self, op: &str) -> Result<()> {
        if self.inner.keyed {
            Ok(())
        } else {
            Err(Error::PreconditionNotMet(format!(
                "{} requires a keyed topic",
                op
            )))
        }
    }

    fn require_registered(&self, handle: InstanceHandle) -> Result<()> {
        if self.inner.rtps.with_history(|h| h.is_key_registered(handle)) {
            Ok(())
        } else {
            Err(Error::PreconditionNotMet("instance is not registered".into()))
        }
    }

    /// Make the instance of `data` known without publishing a sample.
    pub fn register_instance(&self, data: &T) -> Result<InstanceHandle> {
        self.inner.ensure_enabled()?;
        self.require_keyed("register_instance")?;
        let handle = data.get_key();
        self.inner
            .rtps
            .with_history(|h| h.register_instance(handle))?;
        Ok(handle)
    }

    /// Stop updating the instance of `data`. With `dispose` (or when
    /// `autodispose_unregistered_instances` is set) readers also see it
    /// disposed.
    pub fn unregister_instance(&self, data: &T, dispose: bool) -> Result<()> {
        self.inner.ensure_enabled()?;
        self.require_keyed("unregister_instance")?;
        let handle = data.get_key();
        self.require_registered(handle)?;
        let autodispose = self
            .inner
            .qos
            .load()
            .writer_data_lifecycle
            .autodispose_unregistered_instances;
        let kind = if dispose || autodispose {
            ChangeKind::NotAliveDisposedUnregistered
        } else {
            ChangeKind::NotAliveUnregistered
        };
        let payload = Self::serialize(data)?;
        self.inner
            .write_change(kind, handle, payload, &WriteParams::default())?;
        Ok(())
    }

    /// Mark the instance of `data` disposed; it stays registered.
    pub fn dispose(&self, data: &T) -> Result<()> {
        self.inner.ensure_enabled()?;
        self.require_keyed("dispose")?;
        let handle = data.get_key();
        self.require_registered(handle)?;
        let payload = Self::serialize(data)?;
        self.inner.write_change(
            ChangeKind::NotAliveDisposed,
            handle,
            payload,
            &WriteParams::default(),
        )?;
        Ok(())
    }

    /// Handle of the instance of `data`, `NIL` when not registered.
    pub fn lookup_instance(&self, data: &T) -> InstanceHandle {
        if !self.inner.keyed {
            return InstanceHandle::NIL;
        }
        let handle = data.get_key();
        if self.inner.rtps.with_history(|h| h.is_key_registered(handle)) {
            handle
        } else {
            InstanceHandle::NIL
        }
    }

    /// Latest sample written on `handle`, whose key fields identify it.
    pub fn get_key_value(&self, handle: InstanceHandle) -> Result<T> {
        self.require_keyed("get_key_value")?;
        if !handle.is_defined() {
            return Err(Error::BadParameter("instance handle is not defined".into()));
        }
        let payload = self.inner.rtps.with_history(|h| {
            h.iter()
                .rev()
                .find(|c| c.instance_handle == handle)
                .map(|c| c.payload.clone())
        });
        match payload {
            Some(payload) => T::deserialize(&payload),
            None => Err(Error::BadParameter(
                "no sample held for this instance".into(),
            )),
        }
    }

    // ========================================================================
    // QoS
    // ========================================================================

    /// Change mutable policies.
    ///
    /// # Errors
    ///
    /// - any error of [`DataWriterQos::check`]
    /// - `Error::ImmutablePolicy` when a fixed policy differs; nothing is
    ///   applied
    pub fn set_qos(&self, qos: DataWriterQos) -> Result<()> {
        self.inner.ensure_open()?;
        qos.check()?;
        let current = self.inner.qos.load_full();
        let fixed = immutable_changes(&current, &qos);
        if !fixed.is_empty() {
            return Err(Error::ImmutablePolicy(fixed.join(", ")));
        }

        let deadline_changed = current.deadline != qos.deadline;
        let lifespan_changed = current.lifespan != qos.lifespan;
        let heartbeat_changed = current.heartbeat_period != qos.heartbeat_period;
        self.inner.qos.store(Arc::new(qos.clone()));

        if heartbeat_changed {
            self.inner.rtps.set_heartbeat_period(qos.heartbeat_period);
        }
        if deadline_changed {
            if qos.deadline == INFINITE {
                self.inner.rtps.with_history(|h| h.clear_deadlines());
                self.inner.deadline_timer.cancel();
            } else {
                let next = Instant::now().checked_add(qos.deadline);
                self.inner.rtps.with_history(|h| {
                    let instances: Vec<InstanceHandle> = h.instances().copied().collect();
                    for instance in instances {
                        match next {
                            Some(at) => h.set_next_deadline(instance, at),
                            None => h.clear_deadline(instance),
                        }
                    }
                });
                self.inner.rearm_deadline();
            }
        }
        if lifespan_changed {
            if qos.lifespan == INFINITE {
                self.inner.lifespan_timer.cancel();
            } else {
                self.inner.lifespan_timer.restart_in(Duration::ZERO);
            }
        }

        log::debug!("[writer] {} QoS updated", self.guid());
        self.inner.pdp.edp().update_writer(self.guid());
        Ok(())
    }

    pub fn set_listener(&self, listener: Option<WriterListener>) {
        self.inner.listener.store(listener.map(Arc::new));
    }

    // ========================================================================
    // Statuses
    // ========================================================================

    pub fn get_publication_matched_status(&self) -> PublicationMatchedStatus {
        let mut statuses = self.inner.statuses.lock();
        let status = statuses.matched.clone();
        statuses.matched.reset_changes();
        status
    }

    pub fn get_offered_deadline_missed_status(&self) -> OfferedDeadlineMissedStatus {
        let mut statuses = self.inner.statuses.lock();
        let status = statuses.deadline_missed.clone();
        statuses.deadline_missed.reset_changes();
        status
    }

    pub fn get_offered_incompatible_qos_status(&self) -> OfferedIncompatibleQosStatus {
        let mut statuses = self.inner.statuses.lock();
        let status = statuses.incompatible_qos.clone();
        statuses.incompatible_qos.reset_changes();
        status
    }

    pub fn get_liveliness_lost_status(&self) -> LivelinessLostStatus {
        let mut statuses = self.inner.statuses.lock();
        let status = statuses.liveliness_lost.clone();
        statuses.liveliness_lost.reset_changes();
        status
    }

    /// Readers currently matched.
    pub fn matched_subscriptions(&self) -> Vec<GUID> {
        self.inner.rtps.matched_readers()
    }

    // ========================================================================
    // Misc
    // ========================================================================

    /// Manually assert the liveliness of this writer.
    pub fn assert_liveliness(&self) -> Result<()> {
        self.inner.ensure_enabled()?;
        let kind = self.inner.qos.load().liveliness.kind;
        match kind {
            LivelinessKind::ManualByTopic => {
                self.inner.lease.assert_now();
                self.inner.rtps.send_liveliness_heartbeat();
            }
            LivelinessKind::ManualByParticipant => {
                self.inner.pdp.wlp().writer_wrote(&self.inner.lease);
            }
            LivelinessKind::Automatic => self.inner.lease.assert_now(),
        }
        Ok(())
    }

    /// Block until every matched reliable reader acknowledged all samples.
    ///
    /// # Errors
    ///
    /// `Error::Timeout` after `max_wait`.
    pub fn wait_for_acknowledgments(&self, max_wait: Duration) -> Result<()> {
        self.inner.ensure_enabled()?;
        self.inner.rtps.wait_for_all_acked(max_wait)
    }

    /// Drop every sample from the history. Returns how many were removed.
    pub fn clear_history(&self) -> usize {
        self.inner.rtps.clear_history()
    }

    /// Samples currently held.
    pub fn history_len(&self) -> usize {
        self.inner.rtps.with_history(|h| h.len())
    }

    /// Samples removed before every reader acknowledged them.
    pub fn unacked_removed_count(&self) -> u64 {
        self.inner.rtps.with_history(|h| h.unacked_removed_count())
    }

    /// Sequence number of the last sample written.
    pub fn last_sequence_number(&self) -> SequenceNumber {
        self.inner.rtps.last_seq()
    }

    /// Delete the writer now.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl<T: TypeSupport> Drop for DataWriter<T> {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl<T: TypeSupport> std::fmt::Debug for DataWriter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataWriter")
            .field("guid", &self.inner.guid())
            .field("topic", &self.inner.topic)
            .field("type", &self.inner.type_name)
            .finish()
    }
}
