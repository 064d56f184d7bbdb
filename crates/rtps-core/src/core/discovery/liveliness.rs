// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Writer Liveliness Protocol (WLP).
//!
//! | Kind                    | Asserted by                                             |
//! |-------------------------|---------------------------------------------------------|
//! | `AUTOMATIC`             | participant timer (participant message, kind Automatic) |
//! | `MANUAL_BY_PARTICIPANT` | `assert_liveliness()` on the participant, or any write  |
//! | `MANUAL_BY_TOPIC`       | `assert_liveliness()` on the writer, or a write         |
//!
//! Participant messages travel on the reliable WLP builtin endpoints, one
//! keyed instance per (participant, kind). The writer side keeps a
//! [`WriterLease`] per local writer and reports LivelinessLost once per
//! expiry; the reader side keeps a [`LivelinessTracker`] per local reader.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use super::proxy_data::{
    ParticipantMessageData, ParticipantMessageKind, ParticipantProxyData,
    BUILTIN_PARTICIPANT_MESSAGE_READER, BUILTIN_PARTICIPANT_MESSAGE_WRITER,
};
use super::{builtin_reader, builtin_writer, publish, remote_builtin_reader, remote_builtin_writer};
use crate::core::guid::{EntityId, GuidPrefix, InstanceHandle, GUID};
use crate::core::rt::timer::{TimerAction, TimerHandle};
use crate::dds::qos::{Liveliness, LivelinessKind, INFINITE};
use crate::dds::ParticipantContext;
use crate::reliability::{CacheChange, ChangeKind, RtpsReader, RtpsWriter};

/// Shortest interval the participant timer runs at.
const MIN_TICK: Duration = Duration::from_millis(1);

/// Receives remote (and local) participant assertions.
pub trait LivelinessObserver: Send + Sync {
    fn participant_asserted(&self, participant: GuidPrefix, kind: ParticipantMessageKind);
}

// ============================================================================
// WriterLease
// ============================================================================

/// Liveliness lease of one local writer.
pub struct WriterLease {
    guid: GUID,
    liveliness: Liveliness,
    last_asserted: Mutex<Instant>,
    lost: AtomicBool,
    on_lost: Box<dyn Fn() + Send + Sync>,
}

impl WriterLease {
    pub fn new<F>(guid: GUID, liveliness: Liveliness, on_lost: F) -> Arc<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Arc::new(Self {
            guid,
            liveliness,
            last_asserted: Mutex::new(Instant::now()),
            lost: AtomicBool::new(false),
            on_lost: Box::new(on_lost),
        })
    }

    pub fn guid(&self) -> GUID {
        self.guid
    }

    pub fn kind(&self) -> LivelinessKind {
        self.liveliness.kind
    }

    pub fn is_finite(&self) -> bool {
        self.liveliness.lease_duration != INFINITE
    }

    pub fn assert_now(&self) {
        *self.last_asserted.lock() = Instant::now();
        self.lost.store(false, Ordering::Release);
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// True the first time the lease is found expired at `now`.
    pub fn check(&self, now: Instant) -> bool {
        if !self.is_finite() || self.is_lost() {
            return false;
        }
        let last = *self.last_asserted.lock();
        if now.saturating_duration_since(last) < self.liveliness.lease_duration {
            return false;
        }
        !self.lost.swap(true, Ordering::AcqRel)
    }

    /// How often this lease needs the participant timer.
    fn tick_period(&self) -> Duration {
        let lease = self.liveliness.lease_duration;
        let period = match self.liveliness.kind {
            LivelinessKind::ManualByTopic => lease / 3,
            _ => self.liveliness.announcement_period.min(lease / 3),
        };
        period.max(MIN_TICK)
    }
}

impl std::fmt::Debug for WriterLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterLease")
            .field("guid", &self.guid)
            .field("liveliness", &self.liveliness)
            .field("lost", &self.is_lost())
            .finish()
    }
}

// ============================================================================
// Wlp
// ============================================================================

/// Participant-level liveliness endpoints and local writer leases.
pub struct Wlp {
    ctx: Arc<ParticipantContext>,
    writer: Arc<RtpsWriter>,
    reader: Arc<RtpsReader>,
    leases: Mutex<Vec<Arc<WriterLease>>>,
    observers: RwLock<HashMap<GUID, Weak<dyn LivelinessObserver>>>,
    /// A MANUAL_BY_PARTICIPANT writer wrote since the last tick.
    manual_pending: AtomicBool,
    timer: TimerHandle,
}

impl Wlp {
    pub fn new(ctx: Arc<ParticipantContext>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Wlp>| {
            let writer = builtin_writer(&ctx, EntityId::WLP_WRITER, true, true);
            let on_message = weak.clone();
            let reader = builtin_reader(
                &ctx,
                EntityId::WLP_READER,
                true,
                false,
                Box::new(move |change| {
                    if let Some(wlp) = on_message.upgrade() {
                        wlp.on_message(change);
                    }
                }),
            );
            let on_tick = weak.clone();
            let timer = ctx.scheduler().create_timer(INFINITE, move || {
                match on_tick.upgrade() {
                    Some(wlp) => wlp.on_timer(),
                    None => TimerAction::Stop,
                }
            });
            Self {
                ctx,
                writer,
                reader,
                leases: Mutex::new(Vec::new()),
                observers: RwLock::new(HashMap::new()),
                manual_pending: AtomicBool::new(false),
                timer,
            }
        })
    }

    pub fn match_builtin(&self, data: &ParticipantProxyData) {
        let prefix = data.prefix();
        let locators = data.metatraffic_destinations();
        if data.has_endpoint(BUILTIN_PARTICIPANT_MESSAGE_READER) {
            self.writer.matched_reader_add(remote_builtin_reader(
                prefix,
                EntityId::WLP_READER,
                locators,
                true,
            ));
        }
        if data.has_endpoint(BUILTIN_PARTICIPANT_MESSAGE_WRITER) {
            self.reader.matched_writer_add(remote_builtin_writer(
                prefix,
                EntityId::WLP_WRITER,
                locators,
                true,
            ));
        }
    }

    pub fn unmatch_builtin(&self, prefix: GuidPrefix) {
        self.writer
            .matched_reader_remove(GUID::new(prefix, EntityId::WLP_READER));
        self.reader
            .matched_writer_remove(GUID::new(prefix, EntityId::WLP_WRITER));
    }

    // ========================================================================
    // Local writers
    // ========================================================================

    pub fn register_writer(&self, lease: Arc<WriterLease>) {
        self.leases.lock().push(lease);
        self.reschedule();
    }

    pub fn unregister_writer(&self, guid: GUID) {
        self.leases.lock().retain(|l| l.guid() != guid);
        self.reschedule();
    }

    /// A write by the lease's writer.
    pub fn writer_wrote(&self, lease: &WriterLease) {
        match lease.kind() {
            LivelinessKind::ManualByParticipant => {
                self.manual_pending.store(true, Ordering::Release);
                self.assert_local(LivelinessKind::ManualByParticipant);
            }
            _ => lease.assert_now(),
        }
    }

    /// Assert every MANUAL_BY_PARTICIPANT writer of this participant.
    pub fn assert_participant(&self) {
        self.assert_local(LivelinessKind::ManualByParticipant);
        self.manual_pending.store(false, Ordering::Release);
        self.send(ParticipantMessageKind::ManualByParticipant);
    }

    fn assert_local(&self, kind: LivelinessKind) {
        for lease in self.leases.lock().iter().filter(|l| l.kind() == kind) {
            lease.assert_now();
        }
    }

    fn reschedule(&self) {
        let period = self
            .leases
            .lock()
            .iter()
            .filter(|l| l.is_finite())
            .map(|l| l.tick_period())
            .min();
        match period {
            Some(period) => {
                if period < self.timer.interval() || !self.timer.is_armed() {
                    self.timer.update_interval(period);
                    self.timer.restart();
                }
                log::debug!("[WLP] liveliness tick every {:?}", period);
            }
            None => self.timer.update_interval(INFINITE),
        }
    }

    fn on_timer(&self) -> TimerAction {
        let now = Instant::now();
        let leases: Vec<Arc<WriterLease>> = self.leases.lock().clone();
        if leases.is_empty() {
            return TimerAction::Stop;
        }

        let automatic: Vec<&Arc<WriterLease>> = leases
            .iter()
            .filter(|l| l.kind() == LivelinessKind::Automatic && l.is_finite())
            .collect();
        if !automatic.is_empty() {
            self.send(ParticipantMessageKind::Automatic);
            for lease in automatic {
                lease.assert_now();
            }
        }
        if self.manual_pending.swap(false, Ordering::AcqRel) {
            self.send(ParticipantMessageKind::ManualByParticipant);
        }

        for lease in &leases {
            if lease.check(now) {
                log::warn!("[WLP] writer {} lost its liveliness", lease.guid());
                (lease.on_lost)();
            }
        }
        TimerAction::Restart
    }

    fn send(&self, kind: ParticipantMessageKind) {
        let prefix = self.ctx.prefix();
        let message = ParticipantMessageData {
            participant: prefix,
            kind,
            data: Vec::new(),
        };
        publish(
            &self.writer,
            ChangeKind::Alive,
            message_instance(prefix, kind),
            message.encode(),
        );
        log::trace!("[WLP] asserted {:?}", kind);
        // Local readers do not receive our own builtin traffic
        self.notify(prefix, kind);
    }

    // ========================================================================
    // Observers
    // ========================================================================

    pub fn add_observer(&self, reader: GUID, observer: Weak<dyn LivelinessObserver>) {
        self.observers.write().insert(reader, observer);
    }

    pub fn remove_observer(&self, reader: GUID) {
        self.observers.write().remove(&reader);
    }

    fn on_message(&self, change: CacheChange) {
        if !change.kind.is_alive() {
            return;
        }
        match ParticipantMessageData::decode(&change.payload) {
            Ok(message) if message.participant == self.ctx.prefix() => {}
            Ok(message) => {
                log::trace!(
                    "[WLP] {:?} assertion from {}",
                    message.kind,
                    message.participant
                );
                self.notify(message.participant, message.kind);
            }
            Err(e) => log::warn!(
                "[WLP] malformed participant message from {}: {}",
                change.writer_guid,
                e
            ),
        }
    }

    fn notify(&self, participant: GuidPrefix, kind: ParticipantMessageKind) {
        let observers: Vec<Arc<dyn LivelinessObserver>> = self
            .observers
            .read()
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        for observer in observers {
            observer.participant_asserted(participant, kind);
        }
    }

    pub fn close(&self) {
        self.timer.cancel();
        self.leases.lock().clear();
        self.observers.write().clear();
        self.writer.close();
    }
}

impl std::fmt::Debug for Wlp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wlp")
            .field("prefix", &self.ctx.prefix())
            .field("leases", &self.leases.lock().len())
            .finish()
    }
}

fn message_instance(prefix: GuidPrefix, kind: ParticipantMessageKind) -> InstanceHandle {
    let mut bytes = [0u8; 16];
    bytes[..12].copy_from_slice(&prefix.0);
    bytes[15] = match kind {
        ParticipantMessageKind::Automatic => 1,
        ParticipantMessageKind::ManualByParticipant => 2,
    };
    InstanceHandle(bytes)
}

// ============================================================================
// LivelinessTracker
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct TrackedWriter {
    kind: LivelinessKind,
    lease: Duration,
    last: Instant,
    alive: bool,
}

impl TrackedWriter {
    fn expiry(&self) -> Option<Instant> {
        if self.lease == INFINITE {
            None
        } else {
            self.last.checked_add(self.lease)
        }
    }
}

/// Reader-side liveliness of matched writers.
#[derive(Debug, Default)]
pub struct LivelinessTracker {
    writers: Mutex<HashMap<GUID, TrackedWriter>>,
}

impl LivelinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly matched writer; it starts alive.
    pub fn add_writer(&self, writer: GUID, liveliness: &Liveliness) {
        self.writers.lock().insert(
            writer,
            TrackedWriter {
                kind: liveliness.kind,
                lease: liveliness.lease_duration,
                last: Instant::now(),
                alive: true,
            },
        );
    }

    /// Stop tracking. Returns whether the writer was alive.
    pub fn remove_writer(&self, writer: GUID) -> Option<bool> {
        self.writers.lock().remove(&writer).map(|w| w.alive)
    }

    /// Activity from `writer`. Returns true when it recovers from not alive.
    pub fn assert_writer(&self, writer: GUID) -> bool {
        match self.writers.lock().get_mut(&writer) {
            Some(tracked) => {
                tracked.last = Instant::now();
                !std::mem::replace(&mut tracked.alive, true)
            }
            None => false,
        }
    }

    /// Participant message. Returns the writers that recovered.
    pub fn assert_participant(
        &self,
        participant: GuidPrefix,
        kind: ParticipantMessageKind,
    ) -> Vec<GUID> {
        let now = Instant::now();
        let mut recovered = Vec::new();
        for (guid, tracked) in self.writers.lock().iter_mut() {
            if guid.prefix == participant && kind.asserts(tracked.kind) {
                tracked.last = now;
                if !std::mem::replace(&mut tracked.alive, true) {
                    recovered.push(*guid);
                }
            }
        }
        recovered
    }

    /// Writers whose lease expired at `now`, and the next expiry to check.
    pub fn check(&self, now: Instant) -> (Vec<GUID>, Option<Instant>) {
        let mut lost = Vec::new();
        let mut next: Option<Instant> = None;
        for (guid, tracked) in self.writers.lock().iter_mut() {
            let Some(expiry) = tracked.expiry() else {
                continue;
            };
            if !tracked.alive {
                continue;
            }
            if expiry <= now {
                tracked.alive = false;
                lost.push(*guid);
            } else {
                next = Some(next.map_or(expiry, |n| n.min(expiry)));
            }
        }
        (lost, next)
    }

    pub fn is_alive(&self, writer: GUID) -> Option<bool> {
        self.writers.lock().get(&writer).map(|w| w.alive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn writer_guid(n: u8) -> GUID {
        GUID::new(GuidPrefix([n; 12]), EntityId::user_writer(1, false))
    }

    #[test]
    fn test_writer_lease_reports_loss_once() {
        let lost = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&lost);
        let lease = WriterLease::new(
            writer_guid(1),
            Liveliness::new(LivelinessKind::ManualByTopic, Duration::from_millis(20)),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        let later = Instant::now() + Duration::from_millis(50);
        assert!(!lease.check(Instant::now()));
        assert!(lease.check(later));
        assert!(!lease.check(later));
        assert!(lease.is_lost());
        lease.assert_now();
        assert!(!lease.is_lost());
        assert_eq!(lease.tick_period(), Duration::from_millis(20) / 3);
    }

    #[test]
    fn test_infinite_lease_never_lost() {
        let lease = WriterLease::new(writer_guid(1), Liveliness::default(), || {});
        assert!(!lease.check(Instant::now() + Duration::from_secs(3600)));
    }

    #[test]
    fn test_tracker_loss_and_recovery() {
        let tracker = LivelinessTracker::new();
        let a = writer_guid(1);
        let b = writer_guid(2);
        tracker.add_writer(a, &Liveliness::new(LivelinessKind::Automatic, Duration::from_millis(30)));
        tracker.add_writer(b, &Liveliness::default());

        let (lost, next) = tracker.check(Instant::now());
        assert!(lost.is_empty());
        assert!(next.is_some());

        let (lost, next) = tracker.check(Instant::now() + Duration::from_millis(60));
        assert_eq!(lost, vec![a]);
        assert_eq!(next, None);
        assert_eq!(tracker.is_alive(a), Some(false));

        // A manual assertion does not cover an AUTOMATIC writer
        let recovered =
            tracker.assert_participant(a.prefix, ParticipantMessageKind::ManualByParticipant);
        assert!(recovered.is_empty());
        let recovered = tracker.assert_participant(a.prefix, ParticipantMessageKind::Automatic);
        assert_eq!(recovered, vec![a]);
        assert!(!tracker.assert_writer(a));
        assert_eq!(tracker.remove_writer(a), Some(true));
        assert_eq!(tracker.remove_writer(a), None);
    }

    #[test]
    fn test_message_instances_differ_by_kind() {
        let prefix = GuidPrefix([5; 12]);
        assert_ne!(
            message_instance(prefix, ParticipantMessageKind::Automatic),
            message_instance(prefix, ParticipantMessageKind::ManualByParticipant)
        );
    }
}
