// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Stateful RTPS writer.
//!
//! Owns the writer history and one [`ReaderProxy`] per matched reader.
//! Sequence number assignment, history insertion and proxy bookkeeping all
//! happen under a single mutex, so sequence numbers reach the history in
//! strictly increasing order.
//!
//! # Protocol
//!
//! ```text
//!   add_change --> history --> unsent(per reader) --flow control--> DATA / DATA_FRAG
//!                                   ^                                   |
//!                                   |            HEARTBEAT(first,last)  v
//!                 resend requested  +------ ACKNACK(base, missing) -- reader
//!                 GAP for removed
//! ```
//!
//! Blocking: a KEEP_ALL history that is full waits on the `acked` condvar
//! (releasing the mutex) until the oldest change is acknowledged by every
//! reliable reader, bounded by the caller's deadline.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::history::{
    Admission, CacheChange, ChangeKind, History, HistoryKind, ResourceLimits, WriteParams,
};
use super::reader_proxy::{ReaderProxy, RemoteReaderInfo};
use crate::config::HEARTBEAT_PERIOD;
use crate::congestion::FlowController;
use crate::core::guid::{EntityId, InstanceHandle, GUID};
use crate::core::locator::Locator;
use crate::core::rt::timer::{TimerAction, TimerHandle, TimerScheduler};
use crate::dds::{Error, Result};
use crate::protocol::{
    AckNackSubmessage, DataFragSubmessage, DataSubmessage, GapSubmessage, HeartbeatSubmessage,
    SequenceNumber, SequenceNumberSet, Submessage,
};
use crate::transport::MessageSender;

/// Delay before retrying a send the flow controller can never admit.
const OVERSIZED_RETRY: Duration = Duration::from_secs(1);

/// Static attributes of an RTPS writer.
#[derive(Debug, Clone)]
pub struct WriterAttributes {
    pub guid: GUID,
    pub reliable: bool,
    /// TRANSIENT_LOCAL or stronger: history is replayed to late joiners
    /// and kept after acknowledgment.
    pub durable: bool,
    pub heartbeat_period: Duration,
    pub history_kind: HistoryKind,
    pub limits: ResourceLimits,
    pub keyed: bool,
}

impl WriterAttributes {
    pub fn new(guid: GUID) -> Self {
        Self {
            guid,
            reliable: true,
            durable: false,
            heartbeat_period: HEARTBEAT_PERIOD,
            history_kind: HistoryKind::KeepLast(1),
            limits: ResourceLimits::default(),
            keyed: guid.entity_id.is_keyed(),
        }
    }

    pub fn with_reliable(mut self, reliable: bool) -> Self {
        self.reliable = reliable;
        self
    }

    pub fn with_durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    pub fn with_history(mut self, kind: HistoryKind, limits: ResourceLimits) -> Self {
        self.history_kind = kind;
        self.limits = limits;
        self
    }

    pub fn with_keyed(mut self, keyed: bool) -> Self {
        self.keyed = keyed;
        self
    }
}

struct WriterCore {
    history: History,
    next_seq: SequenceNumber,
    readers: BTreeMap<GUID, ReaderProxy>,
}

impl WriterCore {
    fn last_seq(&self) -> SequenceNumber {
        self.next_seq - 1
    }

    /// Only reliable readers acknowledge; best-effort ones never hold a change.
    fn is_acked_by_all(&self, seq: SequenceNumber) -> bool {
        self.readers
            .values()
            .filter(|r| r.is_reliable())
            .all(|r| r.is_acked(seq))
    }

    fn has_unacked(&self) -> bool {
        let last = self.last_seq();
        self.readers
            .values()
            .any(|r| r.is_reliable() && (r.acked_up_to() < last || r.has_unsent()))
    }

    fn remove(&mut self, seq: SequenceNumber) -> Option<CacheChange> {
        let acked = self.is_acked_by_all(seq);
        let change = self.history.remove_change(seq)?;
        if !acked {
            self.history.note_unacked_removed();
            log::debug!("[writer] seq {} removed before acknowledgment", seq);
        }
        for reader in self.readers.values_mut() {
            reader.forget(seq);
        }
        Some(change)
    }

    fn remove_acked_by_all(&mut self) -> usize {
        let acked: Vec<SequenceNumber> = self
            .history
            .iter()
            .map(|c| c.sequence_number)
            .take_while(|seq| self.is_acked_by_all(*seq))
            .collect();
        for seq in &acked {
            self.history.remove_change(*seq);
        }
        acked.len()
    }

    /// `(first, last)` announced to `reader`. `first > last` means empty.
    fn heartbeat_range(&self, reader: &ReaderProxy) -> (SequenceNumber, SequenceNumber) {
        let last = self.last_seq();
        let first = self
            .history
            .min_seq()
            .unwrap_or(self.next_seq)
            .max(reader.first_relevant());
        (first.min(last + 1), last)
    }
}

/// Reliable or best-effort writer endpoint of the RTPS protocol.
pub struct RtpsWriter {
    attrs: WriterAttributes,
    core: Mutex<WriterCore>,
    acked: Condvar,
    sender: MessageSender,
    flow: FlowController,
    heartbeat_count: AtomicU32,
    heartbeat_timer: TimerHandle,
    retry_timer: TimerHandle,
}

impl RtpsWriter {
    pub fn new(
        attrs: WriterAttributes,
        sender: MessageSender,
        flow: FlowController,
        scheduler: &TimerScheduler,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<RtpsWriter>| {
            let hb_weak = weak.clone();
            let heartbeat_timer =
                scheduler.create_timer(attrs.heartbeat_period, move || match hb_weak.upgrade() {
                    Some(writer) => writer.on_heartbeat_timer(),
                    None => TimerAction::Stop,
                });
            let retry_weak = weak.clone();
            let retry_timer = scheduler.create_timer(attrs.heartbeat_period, move || {
                if let Some(writer) = retry_weak.upgrade() {
                    writer.flush();
                }
                TimerAction::Stop
            });

            let history = History::new(attrs.history_kind, attrs.limits, attrs.keyed);
            Self {
                attrs,
                core: Mutex::new(WriterCore {
                    history,
                    next_seq: 1,
                    readers: BTreeMap::new(),
                }),
                acked: Condvar::new(),
                sender,
                flow,
                heartbeat_count: AtomicU32::new(0),
                heartbeat_timer,
                retry_timer,
            }
        })
    }

    pub fn guid(&self) -> GUID {
        self.attrs.guid
    }

    pub fn attributes(&self) -> &WriterAttributes {
        &self.attrs
    }

    pub fn is_reliable(&self) -> bool {
        self.attrs.reliable
    }

    pub fn flow_controller(&self) -> &FlowController {
        &self.flow
    }

    /// Highest sequence number assigned so far (0 before the first change).
    pub fn last_seq(&self) -> SequenceNumber {
        self.core.lock().last_seq()
    }

    // ========================================================================
    // Changes
    // ========================================================================

    /// Create a change, add it to the history and send it.
    ///
    /// KEEP_LAST evicts the oldest change in the way. KEEP_ALL waits until
    /// the blocking change is acknowledged by all readers.
    ///
    /// # Errors
    ///
    /// `Timeout` when the writer lock or history space is not obtained
    /// before `deadline`, `ResourceLimitExceeded` for an instance beyond
    /// `max_instances`.
    pub fn add_change(
        &self,
        kind: ChangeKind,
        instance: InstanceHandle,
        payload: Vec<u8>,
        params: &WriteParams,
        fragment_size: Option<u16>,
        deadline: Instant,
    ) -> Result<SequenceNumber> {
        let mut core = self
            .core
            .try_lock_until(deadline)
            .ok_or_else(|| Error::Timeout("writer busy".into()))?;

        self.make_room(&mut core, instance, deadline)?;

        let seq = core.next_seq;
        let mut change = CacheChange::new(kind, self.attrs.guid, seq, instance, payload);
        if let Some(ts) = params.source_timestamp {
            change.source_timestamp = ts;
        }
        change.related_sample_identity = params.related_sample_identity;
        change.fragment_size = fragment_size.filter(|s| usize::from(*s) < change.payload.len());
        core.history.add_change(change)?;
        core.next_seq += 1;

        for reader in core.readers.values_mut() {
            reader.add_unsent(seq);
        }
        self.send_unsent(&mut core);
        if self.attrs.reliable && core.has_unacked() {
            self.send_heartbeats(&core, true, false, false);
            self.arm_heartbeat();
        }
        log::trace!("[writer] {} added seq {}", self.attrs.guid, seq);
        Ok(seq)
    }

    fn make_room(
        &self,
        core: &mut MutexGuard<'_, WriterCore>,
        instance: InstanceHandle,
        deadline: Instant,
    ) -> Result<()> {
        loop {
            match core.history.admission(instance)? {
                Admission::Accept => return Ok(()),
                Admission::Evict(seq) => {
                    core.remove(seq);
                }
                Admission::Blocked(seq) => {
                    if core.is_acked_by_all(seq) {
                        core.remove(seq);
                        continue;
                    }
                    log::trace!("[writer] history full, waiting for seq {}", seq);
                    if self.acked.wait_until(core, deadline).timed_out()
                        && !core.is_acked_by_all(seq)
                    {
                        return Err(Error::Timeout(format!(
                            "history full, seq {} not acknowledged by all readers",
                            seq
                        )));
                    }
                }
            }
        }
    }

    /// Remove a change. Returns false if it was not in the history.
    pub fn remove_change(&self, seq: SequenceNumber) -> bool {
        let removed = self.core.lock().remove(seq).is_some();
        if removed {
            self.acked.notify_all();
        }
        removed
    }

    /// Remove every change older than `lifespan`. Returns when the next
    /// remaining change expires.
    pub fn remove_expired(&self, lifespan: Duration, now: Instant) -> Option<Instant> {
        let mut core = self.core.lock();
        let mut removed = 0usize;
        let next = loop {
            let Some(earliest) = core.history.get_earliest_change() else {
                break None;
            };
            let expiry = earliest.written_at.checked_add(lifespan)?;
            if expiry > now {
                break Some(expiry);
            }
            let seq = earliest.sequence_number;
            core.remove(seq);
            removed += 1;
        };
        drop(core);
        if removed > 0 {
            log::debug!("[writer] {} lifespan purged {} changes", self.attrs.guid, removed);
            self.acked.notify_all();
        }
        next
    }

    /// Drop every change from the history.
    pub fn clear_history(&self) -> usize {
        let mut core = self.core.lock();
        let seqs: Vec<SequenceNumber> = core.history.iter().map(|c| c.sequence_number).collect();
        for seq in &seqs {
            core.remove(*seq);
        }
        drop(core);
        self.acked.notify_all();
        seqs.len()
    }

    /// Run `f` with the history locked (instance and deadline bookkeeping).
    pub fn with_history<R>(&self, f: impl FnOnce(&mut History) -> R) -> R {
        f(&mut self.core.lock().history)
    }

    // ========================================================================
    // Matched readers
    // ========================================================================

    /// Start sending to `info`. Returns false if it was already matched
    /// (its locators are refreshed).
    pub fn matched_reader_add(&self, info: RemoteReaderInfo) -> bool {
        let mut core = self.core.lock();
        if let Some(existing) = core.readers.get_mut(&info.guid) {
            existing.info.unicast_locators = info.unicast_locators;
            existing.info.multicast_locators = info.multicast_locators;
            return false;
        }

        let first_relevant = if self.attrs.durable && !info.volatile {
            core.history.min_seq().unwrap_or(core.next_seq)
        } else {
            core.next_seq
        };
        let guid = info.guid;
        let reliable = info.reliable;
        let mut proxy = ReaderProxy::new(info, first_relevant);
        for change in core.history.changes_from(first_relevant) {
            proxy.add_unsent(change.sequence_number);
        }
        core.readers.insert(guid, proxy);
        log::debug!(
            "[writer] {} matched reader {} (first relevant {})",
            self.attrs.guid,
            guid,
            first_relevant
        );

        self.send_unsent(&mut core);
        if self.attrs.reliable && reliable {
            if let Some(proxy) = core.readers.get(&guid) {
                self.send_heartbeat_to(&core, proxy, false, false);
            }
            self.arm_heartbeat();
        }
        true
    }

    /// Stop sending to `guid`. Nothing already sent to it is retried.
    pub fn matched_reader_remove(&self, guid: GUID) -> bool {
        let mut core = self.core.lock();
        let removed = core.readers.remove(&guid).is_some();
        if removed {
            log::debug!("[writer] {} unmatched reader {}", self.attrs.guid, guid);
            if !self.attrs.durable {
                core.remove_acked_by_all();
            }
        }
        drop(core);
        if removed {
            self.acked.notify_all();
        }
        removed
    }

    pub fn is_matched(&self, guid: GUID) -> bool {
        self.core.lock().readers.contains_key(&guid)
    }

    pub fn matched_readers(&self) -> Vec<GUID> {
        self.core.lock().readers.keys().copied().collect()
    }

    pub fn matched_reader_count(&self) -> usize {
        self.core.lock().readers.len()
    }

    /// True when every reliable reader acknowledged `seq`.
    pub fn is_acked_by_all(&self, seq: SequenceNumber) -> bool {
        self.core.lock().is_acked_by_all(seq)
    }

    /// True when `guid` is matched and acknowledged everything written.
    pub fn is_acked_by(&self, guid: GUID) -> bool {
        let core = self.core.lock();
        let last = core.last_seq();
        core.readers
            .get(&guid)
            .map(|r| r.is_acked(last) && !r.has_unsent())
            .unwrap_or(false)
    }

    /// Block until every reliable reader acknowledged the last change in
    /// the history.
    ///
    /// # Errors
    ///
    /// `Timeout` when `max_wait` elapses first.
    pub fn wait_for_all_acked(&self, max_wait: Duration) -> Result<()> {
        let deadline = crate::core::rt::deadline_after(max_wait);
        let mut core = self.core.lock();
        loop {
            let target = core.history.max_seq();
            match target {
                None => return Ok(()),
                Some(seq) if core.is_acked_by_all(seq) => return Ok(()),
                Some(seq) => {
                    if self.acked.wait_until(&mut core, deadline).timed_out()
                        && !core.is_acked_by_all(seq)
                    {
                        return Err(Error::Timeout(format!(
                            "seq {} not acknowledged within {:?}",
                            seq, max_wait
                        )));
                    }
                }
            }
        }
    }

    // ========================================================================
    // Incoming
    // ========================================================================

    /// Process an ACKNACK from `reader`.
    pub fn on_acknack(&self, reader: GUID, ack: &AckNackSubmessage) {
        let mut guard = self.core.lock();
        let core = &mut *guard;
        let last = core.last_seq();
        let Some(proxy) = core.readers.get_mut(&reader) else {
            log::trace!("[writer] ACKNACK from unmatched reader {}", reader);
            return;
        };
        if proxy.on_acknack(&ack.state, ack.count, last).is_none() {
            return;
        }

        let mut gaps = Vec::new();
        for seq in proxy.take_requested() {
            if core.history.contains(seq) {
                proxy.add_unsent(seq);
            } else {
                gaps.push(seq);
            }
        }
        if let Some(&start) = gaps.first() {
            log::trace!("[writer] GAP {:?} to {}", gaps, reader);
            let gap = GapSubmessage {
                reader_id: reader.entity_id,
                writer_id: self.attrs.guid.entity_id,
                gap_start: start,
                gap_list: SequenceNumberSet::from_sequences(start, &gaps),
            };
            self.sender.send(
                Some(reader.prefix),
                vec![Submessage::Gap(gap)],
                proxy.info.destinations(),
            );
        }

        self.send_unsent(core);
        if !self.attrs.durable {
            core.remove_acked_by_all();
        }
        drop(guard);
        self.acked.notify_all();
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Send whatever flow control now admits.
    pub fn flush(&self) {
        let mut core = self.core.lock();
        self.send_unsent(&mut core);
    }

    /// Send the newest change of `instance` to `locators`, outside of any
    /// reader bookkeeping (participant announcements and pings).
    pub fn send_latest_of(&self, instance: InstanceHandle, locators: &[Locator]) -> bool {
        let core = self.core.lock();
        let Some(change) = core
            .history
            .iter()
            .rev()
            .find(|c| c.instance_handle == instance)
        else {
            return false;
        };
        let sub = Submessage::Data(self.data_submessage(change, EntityId::UNKNOWN));
        self.sender.send(None, vec![sub], locators)
    }

    /// Assert liveliness with a heartbeat to every matched reader.
    pub fn send_liveliness_heartbeat(&self) {
        let core = self.core.lock();
        self.send_heartbeats(&core, false, true, true);
    }

    fn send_unsent(&self, core: &mut WriterCore) {
        let WriterCore { history, readers, .. } = core;
        for proxy in readers.values_mut() {
            let pending: Vec<(SequenceNumber, u32)> = proxy.unsent().collect();
            for (seq, next_fragment) in pending {
                let Some(change) = history.get_change(seq) else {
                    proxy.forget(seq);
                    continue;
                };
                match self.send_change(change, proxy, next_fragment) {
                    Ok(()) => proxy.mark_sent(seq),
                    Err(wait) if wait == Duration::MAX => {
                        log::error!(
                            "[writer] seq {} ({} bytes) exceeds the flow controller budget",
                            seq,
                            change.payload.len()
                        );
                        self.retry_timer.restart_in(OVERSIZED_RETRY);
                        return;
                    }
                    Err(wait) => {
                        self.retry_timer.restart_in(wait);
                        return;
                    }
                }
            }
        }
    }

    /// Send one change (or its remaining fragments) to one reader.
    fn send_change(
        &self,
        change: &CacheChange,
        proxy: &mut ReaderProxy,
        next_fragment: u32,
    ) -> std::result::Result<(), Duration> {
        let reader = proxy.guid();
        let Some(fragment_size) = change.fragment_size else {
            self.flow.try_acquire(change.payload.len())?;
            let sub = Submessage::Data(self.data_submessage(change, reader.entity_id));
            self.sender
                .send(Some(reader.prefix), vec![sub], proxy.info.destinations());
            return Ok(());
        };

        let size = usize::from(fragment_size);
        let total = change.fragment_count();
        for fragment in next_fragment.max(1)..=total {
            let begin = (fragment as usize - 1) * size;
            let end = (begin + size).min(change.payload.len());
            if let Err(wait) = self.flow.try_acquire(end - begin) {
                proxy.set_next_fragment(change.sequence_number, fragment);
                return Err(wait);
            }
            let sub = Submessage::DataFrag(DataFragSubmessage {
                reader_id: reader.entity_id,
                writer_id: self.attrs.guid.entity_id,
                seq: change.sequence_number,
                kind: change.kind,
                instance: change.instance_handle,
                source_timestamp: change.source_timestamp,
                fragment_start: fragment,
                fragments_in_submessage: 1,
                fragment_size,
                sample_size: change.payload.len() as u32,
                payload: change.payload[begin..end].to_vec(),
            });
            self.sender
                .send(Some(reader.prefix), vec![sub], proxy.info.destinations());
        }
        Ok(())
    }

    fn data_submessage(
        &self,
        change: &CacheChange,
        reader_id: EntityId,
    ) -> DataSubmessage {
        DataSubmessage {
            reader_id,
            writer_id: self.attrs.guid.entity_id,
            seq: change.sequence_number,
            kind: change.kind,
            instance: change.instance_handle,
            source_timestamp: change.source_timestamp,
            payload: change.payload.clone(),
        }
    }

    fn send_heartbeats(&self, core: &WriterCore, only_unacked: bool, final_flag: bool, liveliness: bool) {
        let last = core.last_seq();
        for proxy in core.readers.values() {
            if !liveliness && !proxy.is_reliable() {
                continue;
            }
            if only_unacked && proxy.acked_up_to() >= last && !proxy.has_unsent() {
                continue;
            }
            self.send_heartbeat_to(core, proxy, final_flag, liveliness);
        }
    }

    fn send_heartbeat_to(&self, core: &WriterCore, proxy: &ReaderProxy, final_flag: bool, liveliness: bool) {
        let (first, last) = core.heartbeat_range(proxy);
        let count = self.heartbeat_count.fetch_add(1, Ordering::Relaxed) + 1;
        let reader = proxy.guid();
        let hb = HeartbeatSubmessage {
            reader_id: reader.entity_id,
            writer_id: self.attrs.guid.entity_id,
            first_seq: first,
            last_seq: last,
            count,
            final_flag,
            liveliness_flag: liveliness,
        };
        self.sender.send(
            Some(reader.prefix),
            vec![Submessage::Heartbeat(hb)],
            proxy.info.destinations(),
        );
    }

    fn arm_heartbeat(&self) {
        if !self.heartbeat_timer.is_armed() {
            self.heartbeat_timer.restart();
        }
    }

    fn on_heartbeat_timer(&self) -> TimerAction {
        let core = self.core.lock();
        if !core.has_unacked() {
            return TimerAction::Stop;
        }
        self.send_heartbeats(&core, true, false, false);
        TimerAction::Restart
    }

    /// Change the periodic heartbeat interval.
    pub fn set_heartbeat_period(&self, period: Duration) {
        self.heartbeat_timer.update_interval(period);
    }

    /// Stop timers and drop every matched reader. The history is kept.
    pub fn close(&self) {
        self.heartbeat_timer.cancel();
        self.retry_timer.cancel();
        self.core.lock().readers.clear();
        self.acked.notify_all();
    }
}

impl std::fmt::Debug for RtpsWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtpsWriter")
            .field("guid", &self.attrs.guid)
            .field("reliable", &self.attrs.reliable)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::guid::GuidPrefix;
    use crate::protocol::{decode_message, Message};
    use crate::transport::{LoopbackHub, ReceiverGuard, Transport};
    use std::net::Ipv4Addr;

    struct Fixture {
        _hub: Arc<LoopbackHub>,
        scheduler: TimerScheduler,
        sender: MessageSender,
        inbox: Arc<Mutex<Vec<Message>>>,
        reader_locator: Locator,
        _guard: ReceiverGuard,
    }

    fn fixture() -> Fixture {
        let hub = LoopbackHub::new();
        let transport = hub.transport();
        let reader_locator = Locator::udpv4(Ipv4Addr::new(127, 0, 9, 9), 7411);
        let inbox = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&inbox);
        let guard = transport
            .on_receive(
                reader_locator,
                Arc::new(move |bytes: &[u8]| {
                    if let Ok(msg) = decode_message(bytes) {
                        sink.lock().push(msg);
                    }
                }),
            )
            .expect("input");
        let sender = MessageSender::new(GuidPrefix([1; 12]), transport as Arc<dyn Transport>);
        Fixture {
            _hub: hub,
            scheduler: TimerScheduler::start("test-timer").expect("scheduler"),
            sender,
            inbox,
            reader_locator,
            _guard: guard,
        }
    }

    fn writer(fx: &Fixture, kind: HistoryKind, durable: bool) -> Arc<RtpsWriter> {
        let guid = GUID::new(GuidPrefix([1; 12]), EntityId::user_writer(1, false));
        let attrs = WriterAttributes::new(guid)
            .with_durable(durable)
            .with_history(kind, ResourceLimits::default());
        RtpsWriter::new(attrs, fx.sender.clone(), FlowController::unlimited(), &fx.scheduler)
    }

    fn reader_info(fx: &Fixture, volatile: bool) -> RemoteReaderInfo {
        RemoteReaderInfo {
            guid: GUID::new(GuidPrefix([2; 12]), EntityId::user_reader(1, false)),
            unicast_locators: vec![fx.reader_locator],
            multicast_locators: Vec::new(),
            reliable: true,
            volatile,
            expects_inline_qos: false,
        }
    }

    fn far() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    fn write(w: &RtpsWriter, byte: u8) -> Result<SequenceNumber> {
        w.add_change(
            ChangeKind::Alive,
            InstanceHandle::NIL,
            vec![byte],
            &WriteParams::default(),
            None,
            far(),
        )
    }

    fn ack(w: &RtpsWriter, fx: &Fixture, base: SequenceNumber, count: u32) {
        let reader = reader_info(fx, true).guid;
        w.on_acknack(
            reader,
            &AckNackSubmessage {
                reader_id: reader.entity_id,
                writer_id: w.guid().entity_id,
                state: SequenceNumberSet::empty(base),
                count,
                final_flag: false,
            },
        );
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let fx = fixture();
        let w = writer(&fx, HistoryKind::KeepLast(10), false);
        let seqs: Vec<_> = (0..5).map(|i| write(&w, i).expect("write")).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
        assert_eq!(w.last_seq(), 5);
    }

    #[test]
    fn test_keep_last_evicts() {
        let fx = fixture();
        let w = writer(&fx, HistoryKind::KeepLast(2), false);
        for i in 0..5 {
            write(&w, i).expect("write");
        }
        let seqs: Vec<_> = w.with_history(|h| h.iter().map(|c| c.sequence_number).collect());
        assert_eq!(seqs, vec![4, 5]);
    }

    #[test]
    fn test_keep_all_blocks_until_timeout() {
        let fx = fixture();
        let guid = GUID::new(GuidPrefix([1; 12]), EntityId::user_writer(2, false));
        let limits = ResourceLimits {
            max_samples: 2,
            max_instances: 1,
            max_samples_per_instance: 2,
        };
        let attrs = WriterAttributes::new(guid).with_history(HistoryKind::KeepAll, limits);
        let w = RtpsWriter::new(attrs, fx.sender.clone(), FlowController::unlimited(), &fx.scheduler);
        w.matched_reader_add(reader_info(&fx, true));
        write(&w, 1).expect("write");
        write(&w, 2).expect("write");
        let started = Instant::now();
        let err = w
            .add_change(
                ChangeKind::Alive,
                InstanceHandle::NIL,
                vec![3],
                &WriteParams::default(),
                None,
                Instant::now() + Duration::from_millis(50),
            )
            .expect_err("history full");
        assert!(matches!(err, Error::Timeout(_)));
        assert!(started.elapsed() >= Duration::from_millis(40));

        // Acknowledging seq 1 frees room
        ack(&w, &fx, 2, 1);
        assert_eq!(write(&w, 3).expect("write"), 3);
    }

    #[test]
    fn test_volatile_removes_acked() {
        let fx = fixture();
        let w = writer(&fx, HistoryKind::KeepLast(10), false);
        w.matched_reader_add(reader_info(&fx, true));
        for i in 0..3 {
            write(&w, i).expect("write");
        }
        ack(&w, &fx, 3, 1);
        assert_eq!(w.with_history(|h| h.min_seq()), Some(3));
        assert!(w.is_acked_by_all(2));
        assert!(!w.is_acked_by_all(3));
        assert!(w.wait_for_all_acked(Duration::from_millis(20)).is_err());
        ack(&w, &fx, 4, 2);
        assert!(w.wait_for_all_acked(Duration::from_millis(20)).is_ok());
    }

    #[test]
    fn test_durable_replays_history_to_late_joiner() {
        let fx = fixture();
        let w = writer(&fx, HistoryKind::KeepLast(10), true);
        for i in 0..3 {
            write(&w, i).expect("write");
        }
        w.matched_reader_add(reader_info(&fx, false));
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let data = fx
                .inbox
                .lock()
                .iter()
                .flat_map(|m| m.submessages.iter())
                .filter(|s| matches!(s, Submessage::Data(_)))
                .count();
            if data >= 3 {
                break;
            }
            assert!(Instant::now() < deadline, "replay not received");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_acknack_for_removed_change_sends_gap() {
        let fx = fixture();
        let w = writer(&fx, HistoryKind::KeepLast(1), true);
        w.matched_reader_add(reader_info(&fx, true));
        write(&w, 1).expect("write");
        write(&w, 2).expect("write");
        let reader = reader_info(&fx, true).guid;
        w.on_acknack(
            reader,
            &AckNackSubmessage {
                reader_id: reader.entity_id,
                writer_id: w.guid().entity_id,
                state: SequenceNumberSet::from_sequences(1, &[1]),
                count: 1,
                final_flag: false,
            },
        );
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let gap = fx.inbox.lock().iter().flat_map(|m| m.submessages.clone()).find_map(|s| match s {
                Submessage::Gap(g) => Some(g),
                _ => None,
            });
            if let Some(gap) = gap {
                assert_eq!(gap.sequences().collect::<Vec<_>>(), vec![1]);
                break;
            }
            assert!(Instant::now() < deadline, "GAP not received");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_lifespan_purge() {
        let fx = fixture();
        let w = writer(&fx, HistoryKind::KeepLast(10), true);
        write(&w, 1).expect("write");
        let later = Instant::now() + Duration::from_millis(100);
        write(&w, 2).expect("write");
        assert!(w.remove_expired(Duration::from_secs(10), Instant::now()).is_some());
        assert_eq!(w.remove_expired(Duration::from_millis(1), later), None);
        assert!(w.with_history(|h| h.is_empty()));
    }

    #[test]
    fn test_send_latest_of_picks_instance() {
        let fx = fixture();
        let guid = GUID::new(GuidPrefix([1; 12]), EntityId::user_writer(3, true));
        let attrs = WriterAttributes::new(guid)
            .with_history(HistoryKind::KeepLast(1), ResourceLimits::unlimited());
        let w = RtpsWriter::new(attrs, fx.sender.clone(), FlowController::unlimited(), &fx.scheduler);
        let a = InstanceHandle([1; 16]);
        let b = InstanceHandle([2; 16]);
        for (instance, byte) in [(a, 1u8), (b, 2), (a, 3)] {
            w.add_change(ChangeKind::Alive, instance, vec![byte], &WriteParams::default(), None, far())
                .expect("write");
        }
        assert!(w.send_latest_of(a, &[fx.reader_locator]));
        assert!(!w.send_latest_of(InstanceHandle([9; 16]), &[fx.reader_locator]));
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let data = fx.inbox.lock().iter().flat_map(|m| m.submessages.clone()).find_map(|s| match s {
                Submessage::Data(d) => Some(d),
                _ => None,
            });
            if let Some(data) = data {
                assert_eq!(data.payload, vec![3]);
                assert_eq!(data.reader_id, EntityId::UNKNOWN);
                break;
            }
            assert!(Instant::now() < deadline, "DATA not received");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_unmatch_releases_blocked_writer() {
        let fx = fixture();
        let w = writer(&fx, HistoryKind::KeepLast(10), false);
        let reader = reader_info(&fx, true);
        let guid = reader.guid;
        w.matched_reader_add(reader);
        write(&w, 1).expect("write");
        assert!(!w.is_acked_by_all(1));
        assert!(w.matched_reader_remove(guid));
        assert!(w.is_acked_by_all(1));
        assert!(!w.matched_reader_remove(guid));
    }
}
