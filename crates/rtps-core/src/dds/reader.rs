// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed DataReader.
//!
//! Changes delivered in order by the [`RtpsReader`] land in a local
//! [`History`] shaped by the reader QoS (KEEP_LAST evicts, KEEP_ALL and
//! `max_instances` reject). The application takes or reads them as typed
//! samples.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::{Condvar, Mutex};

use super::listener::{
    millis, LivelinessChangedStatus, ReaderListener, RequestedIncompatibleQosStatus,
    SubscriptionMatchedStatus,
};
use super::participant::ParticipantContext;
use super::qos::{DataReaderQos, QosPolicyId, Reliability};
use super::{Error, Result, TypeSupport};
use crate::core::discovery::{
    LivelinessObserver, LivelinessTracker, LocalReader, ParticipantMessageKind, Pdp,
    ReaderProxyData, WriterProxyData,
};
use crate::core::guid::{EntityId, GuidPrefix, InstanceHandle, GUID};
use crate::core::rt::deadline_after;
use crate::core::rt::timer::{TimerAction, TimerHandle};
use crate::protocol::SequenceNumber;
use crate::reliability::{
    CacheChange, ChangeKind, History, ReaderAttributes, RemoteWriterInfo, RtpsReader,
};
use crate::security::{CryptoHandle, KeyService};

/// Metadata of a received sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleInfo {
    pub kind: ChangeKind,
    pub instance_handle: InstanceHandle,
    /// Writer that published the sample.
    pub publication_handle: GUID,
    /// Nanoseconds since the UNIX epoch.
    pub source_timestamp: u64,
    /// Writer-assigned sequence number.
    pub sequence_number: SequenceNumber,
}

impl SampleInfo {
    /// The sample carries data (not an unregistration or disposal).
    pub fn valid_data(&self) -> bool {
        self.kind.is_alive()
    }
}

/// A received sample. `data` is `None` for instance state changes.
#[derive(Debug, Clone)]
pub struct Sample<T> {
    pub data: Option<T>,
    pub info: SampleInfo,
}

// ============================================================================
// Cache
// ============================================================================

/// Local history; changes are re-numbered locally so samples from several
/// writers share one ordered store.
struct ReaderCache {
    history: History,
    next_local: SequenceNumber,
    writer_seqs: HashMap<SequenceNumber, SequenceNumber>,
    rejected: u64,
}

impl ReaderCache {
    fn new(qos: &DataReaderQos, keyed: bool) -> Self {
        Self {
            history: History::new(qos.history, qos.resource_limits, keyed),
            next_local: 1,
            writer_seqs: HashMap::new(),
            rejected: 0,
        }
    }

    fn push(&mut self, mut change: CacheChange) -> Result<()> {
        let local = self.next_local;
        let writer_seq = change.sequence_number;
        change.sequence_number = local;
        let evicted = self.history.add_change_evicting(change)?;
        for old in evicted {
            self.writer_seqs.remove(&old.sequence_number);
        }
        self.writer_seqs.insert(local, writer_seq);
        self.next_local += 1;
        Ok(())
    }

    fn info(&self, change: &CacheChange) -> SampleInfo {
        SampleInfo {
            kind: change.kind,
            instance_handle: change.instance_handle,
            publication_handle: change.writer_guid,
            source_timestamp: change.source_timestamp,
            sequence_number: self
                .writer_seqs
                .get(&change.sequence_number)
                .copied()
                .unwrap_or_default(),
        }
    }

    fn take(&mut self) -> Vec<(CacheChange, SampleInfo)> {
        let infos: Vec<SampleInfo> = self.history.iter().map(|c| self.info(c)).collect();
        self.writer_seqs.clear();
        let taken = self.history.clear();
        // Reader instances hold no registration; taken ones free their slot
        self.history.release_empty_instances();
        taken.into_iter().zip(infos).collect()
    }

    fn take_next(&mut self) -> Option<(CacheChange, SampleInfo)> {
        let seq = self.history.min_seq()?;
        let change = self.history.remove_change(seq)?;
        self.history.release_instance_if_empty(change.instance_handle);
        let info = self.info(&change);
        self.writer_seqs.remove(&seq);
        Some((change, info))
    }

    fn read(&self) -> Vec<(CacheChange, SampleInfo)> {
        self.history
            .iter()
            .map(|c| (c.clone(), self.info(c)))
            .collect()
    }
}

#[derive(Debug, Default)]
struct ReaderStatuses {
    matched: SubscriptionMatchedStatus,
    incompatible_qos: RequestedIncompatibleQosStatus,
    liveliness: LivelinessChangedStatus,
}

// ============================================================================
// ReaderInner
// ============================================================================

pub(crate) struct ReaderInner {
    ctx: Arc<ParticipantContext>,
    pdp: Arc<Pdp>,
    rtps: Arc<RtpsReader>,
    topic: String,
    type_name: &'static str,
    qos: ArcSwap<DataReaderQos>,
    listener: ArcSwapOption<ReaderListener>,
    statuses: Mutex<ReaderStatuses>,
    cache: Mutex<ReaderCache>,
    available: Condvar,
    tracker: LivelinessTracker,
    liveliness_timer: TimerHandle,
    closed: AtomicBool,
}

impl ReaderInner {
    fn guid(&self) -> GUID {
        self.rtps.guid()
    }

    fn on_change(&self, change: CacheChange) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let writer = change.writer_guid;
        let seq = change.sequence_number;
        let pushed = {
            let mut cache = self.cache.lock();
            let pushed = cache.push(change);
            if pushed.is_err() {
                cache.rejected += 1;
            }
            pushed
        };
        match pushed {
            Ok(()) => {
                self.available.notify_all();
                if let Some(listener) = self.listener.load_full() {
                    listener.data_available(self.guid());
                }
            }
            Err(e) => {
                log::warn!(
                    "[reader] {} rejected seq {} from {}: {}",
                    self.guid(),
                    seq,
                    writer,
                    e
                );
            }
        }
    }

    // ========================================================================
    // Liveliness
    // ========================================================================

    fn writer_active(&self, writer: GUID) {
        if self.tracker.assert_writer(writer) {
            self.liveliness_recovered(&[writer]);
        }
    }

    fn liveliness_recovered(&self, writers: &[GUID]) {
        if writers.is_empty() {
            return;
        }
        for writer in writers {
            log::debug!("[reader] {} writer {} alive again", self.guid(), writer);
            let status = {
                let mut statuses = self.statuses.lock();
                statuses.liveliness.became_alive(*writer, true);
                statuses.liveliness.clone()
            };
            self.fire_liveliness(&status);
        }
        self.liveliness_timer.restart_in(Duration::ZERO);
    }

    fn fire_liveliness(&self, status: &LivelinessChangedStatus) {
        if let Some(listener) = self.listener.load_full() {
            if listener.liveliness_changed(self.guid(), status) {
                self.statuses.lock().liveliness.reset_changes();
            }
        }
    }

    fn on_liveliness_timer(&self) -> TimerAction {
        if self.closed.load(Ordering::Acquire) {
            return TimerAction::Stop;
        }
        let (lost, next) = self.tracker.check(Instant::now());
        for writer in lost {
            log::info!(
                "[reader] {} lost liveliness of writer {}",
                self.guid(),
                writer
            );
            let status = {
                let mut statuses = self.statuses.lock();
                statuses.liveliness.became_not_alive(writer);
                statuses.liveliness.clone()
            };
            self.fire_liveliness(&status);
        }
        match next {
            Some(at) => TimerAction::RestartIn(at.saturating_duration_since(Instant::now())),
            None => TimerAction::Stop,
        }
    }

    fn fire_matched(&self, status: &SubscriptionMatchedStatus) {
        if let Some(listener) = self.listener.load_full() {
            if listener.subscription_matched(self.guid(), status) {
                self.statuses.lock().matched.reset_changes();
            }
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.listener.store(None);
        self.liveliness_timer.cancel();
        let guid = self.guid();
        self.pdp.wlp().remove_observer(guid);
        self.pdp.edp().unregister_reader(guid);
        for writer in self.rtps.matched_writers() {
            self.rtps.matched_writer_remove(writer);
            self.ctx.keys().unregister(CryptoHandle(writer));
        }
        self.ctx.remove_reader(guid.entity_id);
        self.available.notify_all();
        log::debug!("[reader] {} on '{}' deleted", guid, self.topic);
    }
}

impl LocalReader for ReaderInner {
    fn reader_data(&self) -> ReaderProxyData {
        ReaderProxyData {
            guid: self.guid(),
            participant_guid: self.ctx.guid(),
            topic_name: self.topic.clone(),
            type_name: self.type_name.to_string(),
            unicast_locators: self.ctx.default_unicast_locators().to_vec(),
            multicast_locators: Vec::new(),
            qos: self.qos.load().endpoint_qos(),
            expects_inline_qos: false,
        }
    }

    fn is_matched(&self, writer: GUID) -> bool {
        self.rtps.is_matched(writer)
    }

    fn writer_matched(&self, writer: &WriterProxyData) {
        let info = RemoteWriterInfo {
            guid: writer.guid,
            unicast_locators: writer.unicast_locators.clone(),
            multicast_locators: writer.multicast_locators.clone(),
            reliable: writer.qos.reliability == Reliability::Reliable,
        };
        if !self.rtps.matched_writer_add(info) {
            return;
        }
        if let Err(e) = self
            .ctx
            .keys()
            .register_matched_remote_writer(CryptoHandle(writer.participant_guid), writer.guid)
        {
            log::debug!("[reader] no key material for writer {}: {}", writer.guid, e);
        }
        log::info!(
            "[reader] {} matched writer {} on '{}'",
            self.guid(),
            writer.guid,
            self.topic
        );

        self.tracker.add_writer(writer.guid, &writer.qos.liveliness);
        log::debug!(
            "[reader] tracking liveliness of {} ({:?}, lease {} ms)",
            writer.guid,
            writer.qos.liveliness.kind,
            millis(writer.qos.liveliness.lease_duration)
        );
        let liveliness = {
            let mut statuses = self.statuses.lock();
            statuses.liveliness.became_alive(writer.guid, false);
            statuses.liveliness.clone()
        };
        self.fire_liveliness(&liveliness);
        self.liveliness_timer.restart_in(Duration::ZERO);

        let status = {
            let mut statuses = self.statuses.lock();
            statuses.matched.matched(writer.guid);
            statuses.matched.clone()
        };
        self.fire_matched(&status);
    }

    fn writer_unmatched(&self, writer: GUID) {
        if !self.rtps.matched_writer_remove(writer) {
            return;
        }
        self.ctx.keys().unregister(CryptoHandle(writer));
        log::info!(
            "[reader] {} unmatched writer {} on '{}'",
            self.guid(),
            writer,
            self.topic
        );
        if let Some(was_alive) = self.tracker.remove_writer(writer) {
            let status = {
                let mut statuses = self.statuses.lock();
                statuses.liveliness.removed(writer, was_alive);
                statuses.liveliness.clone()
            };
            self.fire_liveliness(&status);
        }
        let status = {
            let mut statuses = self.statuses.lock();
            statuses.matched.unmatched(writer);
            statuses.matched.clone()
        };
        self.fire_matched(&status);
    }

    fn incompatible_qos(&self, writer: GUID, policies: &[QosPolicyId]) {
        log::warn!(
            "[MATCH-QOS] reader {} requested QoS incompatible with writer {}: {:?}",
            self.guid(),
            writer,
            policies
        );
        let status = {
            let mut statuses = self.statuses.lock();
            statuses.incompatible_qos.record(policies);
            statuses.incompatible_qos.clone()
        };
        if let Some(listener) = self.listener.load_full() {
            if listener.requested_incompatible_qos(self.guid(), &status) {
                self.statuses.lock().incompatible_qos.reset_changes();
            }
        }
    }
}

impl LivelinessObserver for ReaderInner {
    fn participant_asserted(&self, participant: GuidPrefix, kind: ParticipantMessageKind) {
        let recovered = self.tracker.assert_participant(participant, kind);
        self.liveliness_recovered(&recovered);
    }
}

// ============================================================================
// DataReader
// ============================================================================

/// Typed reader bound to one topic.
pub struct DataReader<T: TypeSupport> {
    inner: Arc<ReaderInner>,
    _type: PhantomData<fn() -> T>,
}

impl<T: TypeSupport> DataReader<T> {
    pub(crate) fn new(
        ctx: Arc<ParticipantContext>,
        pdp: Arc<Pdp>,
        topic: &str,
        qos: DataReaderQos,
        listener: Option<ReaderListener>,
    ) -> Result<Self> {
        qos.check()?;
        if topic.is_empty() {
            return Err(Error::BadParameter("topic name is empty".into()));
        }

        let keyed = T::is_keyed();
        let guid = GUID::new(
            ctx.prefix(),
            EntityId::user_reader(ctx.next_entity_key(), keyed),
        );

        let inner = Arc::new_cyclic(|weak: &Weak<ReaderInner>| {
            let on_data = weak.clone();
            let on_activity = weak.clone();
            let rtps = RtpsReader::new(
                ReaderAttributes::new(guid, qos.reliability == Reliability::Reliable),
                ctx.sender().clone(),
                Box::new(move |change| {
                    if let Some(inner) = on_data.upgrade() {
                        inner.on_change(change);
                    }
                }),
            )
            .with_activity_callback(Box::new(move |writer| {
                if let Some(inner) = on_activity.upgrade() {
                    inner.writer_active(writer);
                }
            }));

            let on_tick = weak.clone();
            let liveliness_timer = ctx.scheduler().create_timer(Duration::ZERO, move || {
                match on_tick.upgrade() {
                    Some(inner) => inner.on_liveliness_timer(),
                    None => TimerAction::Stop,
                }
            });

            ReaderInner {
                ctx: Arc::clone(&ctx),
                pdp: Arc::clone(&pdp),
                rtps: Arc::new(rtps),
                topic: topic.to_string(),
                type_name: T::type_name(),
                cache: Mutex::new(ReaderCache::new(&qos, keyed)),
                qos: ArcSwap::from_pointee(qos),
                listener: ArcSwapOption::from(listener.map(Arc::new)),
                statuses: Mutex::new(ReaderStatuses::default()),
                available: Condvar::new(),
                tracker: LivelinessTracker::new(),
                liveliness_timer,
                closed: AtomicBool::new(false),
            }
        });

        ctx.add_reader(Arc::clone(&inner.rtps));
        let observer: Arc<dyn LivelinessObserver> = inner.clone();
        pdp.wlp().add_observer(guid, Arc::downgrade(&observer));
        pdp.edp().register_reader(Arc::clone(&inner) as Arc<dyn LocalReader>);
        log::info!(
            "[reader] created {} on '{}' ({})",
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

    pub fn get_qos(&self) -> DataReaderQos {
        self.inner.qos.load().as_ref().clone()
    }

    pub fn set_listener(&self, listener: Option<ReaderListener>) {
        self.inner.listener.store(listener.map(Arc::new));
    }

    fn to_sample(&self, change: &CacheChange, info: SampleInfo) -> Option<Sample<T>> {
        if !change.kind.is_alive() {
            return Some(Sample { data: None, info });
        }
        match T::deserialize(&change.payload) {
            Ok(data) => Some(Sample {
                data: Some(data),
                info,
            }),
            Err(e) => {
                log::warn!(
                    "[reader] {} cannot decode seq {} from {}: {}",
                    self.inner.guid(),
                    info.sequence_number,
                    info.publication_handle,
                    e
                );
                None
            }
        }
    }

    /// Remove and return every sample held, in reception order.
    pub fn take(&self) -> Vec<Sample<T>> {
        let taken = self.inner.cache.lock().take();
        taken
            .iter()
            .filter_map(|(change, info)| self.to_sample(change, info.clone()))
            .collect()
    }

    /// Remove and return the oldest sample.
    pub fn take_next_sample(&self) -> Option<Sample<T>> {
        loop {
            let (change, info) = self.inner.cache.lock().take_next()?;
            if let Some(sample) = self.to_sample(&change, info) {
                return Some(sample);
            }
        }
    }

    /// Return every sample held without removing it.
    pub fn read(&self) -> Vec<Sample<T>> {
        let held = self.inner.cache.lock().read();
        held.iter()
            .filter_map(|(change, info)| self.to_sample(change, info.clone()))
            .collect()
    }

    /// Samples currently held.
    pub fn available(&self) -> usize {
        self.inner.cache.lock().history.len()
    }

    /// Samples rejected by resource limits.
    pub fn rejected_count(&self) -> u64 {
        self.inner.cache.lock().rejected
    }

    /// Block until a sample is available. Returns false on timeout.
    pub fn wait_for_data(&self, max_wait: Duration) -> bool {
        let deadline = deadline_after(max_wait);
        let mut cache = self.inner.cache.lock();
        while cache.history.is_empty() {
            if self.inner.closed.load(Ordering::Acquire) {
                return false;
            }
            if self
                .inner
                .available
                .wait_until(&mut cache, deadline)
                .timed_out()
            {
                return !cache.history.is_empty();
            }
        }
        true
    }

    // ========================================================================
    // Statuses
    // ========================================================================

    pub fn get_subscription_matched_status(&self) -> SubscriptionMatchedStatus {
        let mut statuses = self.inner.statuses.lock();
        let status = statuses.matched.clone();
        statuses.matched.reset_changes();
        status
    }

    pub fn get_requested_incompatible_qos_status(&self) -> RequestedIncompatibleQosStatus {
        let mut statuses = self.inner.statuses.lock();
        let status = statuses.incompatible_qos.clone();
        statuses.incompatible_qos.reset_changes();
        status
    }

    pub fn get_liveliness_changed_status(&self) -> LivelinessChangedStatus {
        let mut statuses = self.inner.statuses.lock();
        let status = statuses.liveliness.clone();
        statuses.liveliness.reset_changes();
        status
    }

    /// Writers currently matched.
    pub fn matched_publications(&self) -> Vec<GUID> {
        self.inner.rtps.matched_writers()
    }

    /// Delete the reader now.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl<T: TypeSupport> Drop for DataReader<T> {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl<T: TypeSupport> std::fmt::Debug for DataReader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataReader")
            .field("guid", &self.inner.guid())
            .field("topic", &self.inner.topic)
            .field("type", &self.inner.type_name)
            .finish()
    }
}
