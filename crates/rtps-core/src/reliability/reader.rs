// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Stateful RTPS reader.
//!
//! Holds one [`WriterProxy`] per matched writer and hands changes to the
//! owner in sequence order per writer. Changes are delivered outside the
//! proxy lock, under a separate delivery lock, so the callback may call
//! back into discovery or writers without deadlocking while concurrent
//! receive threads still deliver in order.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use super::history::CacheChange;
use super::writer_proxy::{RemoteWriterInfo, WriterProxy};
use crate::core::guid::GUID;
use crate::protocol::{
    AckNackSubmessage, DataFragSubmessage, DataSubmessage, GapSubmessage, HeartbeatSubmessage,
    Submessage,
};
use crate::transport::MessageSender;

/// Receives every change, in order per writer.
pub type DeliverFn = Box<dyn Fn(CacheChange) + Send + Sync>;
/// Called when a matched writer shows a sign of life.
pub type WriterActivityFn = Box<dyn Fn(GUID) + Send + Sync>;

/// Static attributes of an RTPS reader.
#[derive(Debug, Clone)]
pub struct ReaderAttributes {
    pub guid: GUID,
    pub reliable: bool,
    /// Deliver data from writers that are not matched (participant
    /// announcements from not yet discovered participants).
    pub accept_unmatched: bool,
}

impl ReaderAttributes {
    pub fn new(guid: GUID, reliable: bool) -> Self {
        Self {
            guid,
            reliable,
            accept_unmatched: false,
        }
    }

    pub fn with_accept_unmatched(mut self, accept: bool) -> Self {
        self.accept_unmatched = accept;
        self
    }
}

/// Reliable or best-effort reader endpoint of the RTPS protocol.
pub struct RtpsReader {
    attrs: ReaderAttributes,
    writers: Mutex<BTreeMap<GUID, WriterProxy>>,
    delivery: Mutex<()>,
    sender: MessageSender,
    deliver: DeliverFn,
    on_activity: Option<WriterActivityFn>,
}

impl RtpsReader {
    pub fn new(attrs: ReaderAttributes, sender: MessageSender, deliver: DeliverFn) -> Self {
        Self {
            attrs,
            writers: Mutex::new(BTreeMap::new()),
            delivery: Mutex::new(()),
            sender,
            deliver,
            on_activity: None,
        }
    }

    pub fn with_activity_callback(mut self, callback: WriterActivityFn) -> Self {
        self.on_activity = Some(callback);
        self
    }

    pub fn guid(&self) -> GUID {
        self.attrs.guid
    }

    pub fn is_reliable(&self) -> bool {
        self.attrs.reliable
    }

    // ========================================================================
    // Matched writers
    // ========================================================================

    /// Start accepting changes from `info`. A reliable reader only tracks a
    /// writer reliably when the writer is reliable too. Returns false if it
    /// was already matched (its locators are refreshed).
    pub fn matched_writer_add(&self, mut info: RemoteWriterInfo) -> bool {
        let mut writers = self.writers.lock();
        if let Some(existing) = writers.get_mut(&info.guid) {
            existing.info.unicast_locators = info.unicast_locators;
            existing.info.multicast_locators = info.multicast_locators;
            return false;
        }
        info.reliable = info.reliable && self.attrs.reliable;
        log::debug!(
            "[reader] {} matched writer {} (reliable={})",
            self.attrs.guid,
            info.guid,
            info.reliable
        );
        writers.insert(info.guid, WriterProxy::new(info));
        true
    }

    /// Forget `guid` and everything received from it.
    pub fn matched_writer_remove(&self, guid: GUID) -> bool {
        let removed = self.writers.lock().remove(&guid).is_some();
        if removed {
            log::debug!("[reader] {} unmatched writer {}", self.attrs.guid, guid);
        }
        removed
    }

    pub fn is_matched(&self, guid: GUID) -> bool {
        self.writers.lock().contains_key(&guid)
    }

    pub fn matched_writers(&self) -> Vec<GUID> {
        self.writers.lock().keys().copied().collect()
    }

    pub fn matched_writer_count(&self) -> usize {
        self.writers.lock().len()
    }

    // ========================================================================
    // Incoming
    // ========================================================================

    pub fn on_data(&self, writer: GUID, data: DataSubmessage) {
        let mut change = CacheChange::new(data.kind, writer, data.seq, data.instance, data.payload);
        change.source_timestamp = data.source_timestamp;
        self.accept(writer, change);
    }

    pub fn on_data_frag(&self, writer: GUID, frag: &DataFragSubmessage) {
        let payload = {
            let mut writers = self.writers.lock();
            let Some(proxy) = writers.get_mut(&writer) else {
                log::trace!("[reader] DATA_FRAG from unmatched writer {}", writer);
                return;
            };
            proxy.on_fragment(frag)
        };
        if let Some(payload) = payload {
            let mut change = CacheChange::new(frag.kind, writer, frag.seq, frag.instance, payload);
            change.source_timestamp = frag.source_timestamp;
            self.accept(writer, change);
        }
    }

    fn accept(&self, writer: GUID, change: CacheChange) {
        let _delivery = self.delivery.lock();
        let deliverable = {
            let mut writers = self.writers.lock();
            match writers.get_mut(&writer) {
                Some(proxy) => proxy.on_change(change),
                None if self.attrs.accept_unmatched => vec![change],
                None => {
                    log::trace!(
                        "[reader] {} dropping seq {} from unmatched writer {}",
                        self.attrs.guid,
                        change.sequence_number,
                        writer
                    );
                    return;
                }
            }
        };
        self.note_activity(writer);
        for change in deliverable {
            (self.deliver)(change);
        }
    }

    pub fn on_heartbeat(&self, writer: GUID, hb: &HeartbeatSubmessage) {
        let _delivery = self.delivery.lock();
        let (deliverable, answer) = {
            let mut writers = self.writers.lock();
            let Some(proxy) = writers.get_mut(&writer) else {
                return;
            };
            let (deliverable, state) =
                proxy.on_heartbeat(hb.first_seq, hb.last_seq, hb.count, hb.final_flag);
            let answer = state.map(|(state, count)| {
                let ack = AckNackSubmessage {
                    reader_id: self.attrs.guid.entity_id,
                    writer_id: writer.entity_id,
                    state,
                    count,
                    final_flag: true,
                };
                (ack, proxy.destinations().to_vec())
            });
            (deliverable, answer)
        };

        if let Some((ack, locators)) = answer {
            log::trace!(
                "[reader] ACKNACK base {} missing {} to {}",
                ack.state.base(),
                ack.state.iter().count(),
                writer
            );
            self.sender
                .send(Some(writer.prefix), vec![Submessage::AckNack(ack)], &locators);
        }
        if hb.liveliness_flag || !deliverable.is_empty() {
            self.note_activity(writer);
        }
        for change in deliverable {
            (self.deliver)(change);
        }
    }

    pub fn on_gap(&self, writer: GUID, gap: &GapSubmessage) {
        let _delivery = self.delivery.lock();
        let deliverable = {
            let mut writers = self.writers.lock();
            let Some(proxy) = writers.get_mut(&writer) else {
                return;
            };
            proxy.on_gap(gap.gap_start..gap.gap_list.base(), gap.gap_list.iter())
        };
        for change in deliverable {
            (self.deliver)(change);
        }
    }

    fn note_activity(&self, writer: GUID) {
        if let Some(callback) = &self.on_activity {
            callback(writer);
        }
    }
}

impl std::fmt::Debug for RtpsReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtpsReader")
            .field("guid", &self.attrs.guid)
            .field("reliable", &self.attrs.reliable)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::guid::{EntityId, GuidPrefix, InstanceHandle};
    use crate::protocol::SequenceNumberSet;
    use crate::reliability::ChangeKind;
    use crate::transport::{LoopbackHub, Transport};
    use std::sync::Arc;

    fn writer_guid() -> GUID {
        GUID::new(GuidPrefix([1; 12]), EntityId::user_writer(1, false))
    }

    fn reader(reliable: bool, accept_unmatched: bool) -> (RtpsReader, Arc<Mutex<Vec<u64>>>) {
        let hub = LoopbackHub::new();
        let transport: Arc<dyn Transport> = hub.transport();
        let sender = MessageSender::new(GuidPrefix([2; 12]), transport);
        let got = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&got);
        let attrs = ReaderAttributes::new(
            GUID::new(GuidPrefix([2; 12]), EntityId::user_reader(1, false)),
            reliable,
        )
        .with_accept_unmatched(accept_unmatched);
        let reader = RtpsReader::new(
            attrs,
            sender,
            Box::new(move |c: CacheChange| sink.lock().push(c.sequence_number)),
        );
        (reader, got)
    }

    fn data(seq: u64) -> DataSubmessage {
        DataSubmessage {
            reader_id: EntityId::UNKNOWN,
            writer_id: writer_guid().entity_id,
            seq,
            kind: ChangeKind::Alive,
            instance: InstanceHandle::NIL,
            source_timestamp: 7,
            payload: vec![seq as u8],
        }
    }

    fn match_writer(r: &RtpsReader) {
        assert!(r.matched_writer_add(RemoteWriterInfo {
            guid: writer_guid(),
            unicast_locators: Vec::new(),
            multicast_locators: Vec::new(),
            reliable: true,
        }));
    }

    #[test]
    fn test_unmatched_dropped_unless_accepted() {
        let (r, got) = reader(true, false);
        r.on_data(writer_guid(), data(1));
        assert!(got.lock().is_empty());

        let (r, got) = reader(false, true);
        r.on_data(writer_guid(), data(1));
        r.on_data(writer_guid(), data(1));
        assert_eq!(*got.lock(), vec![1, 1]);
    }

    #[test]
    fn test_reliable_reorders_and_gap() {
        let (r, got) = reader(true, false);
        match_writer(&r);
        r.on_data(writer_guid(), data(1));
        r.on_data(writer_guid(), data(3));
        assert_eq!(*got.lock(), vec![1]);
        r.on_gap(
            writer_guid(),
            &GapSubmessage {
                reader_id: EntityId::UNKNOWN,
                writer_id: writer_guid().entity_id,
                gap_start: 2,
                gap_list: SequenceNumberSet::empty(3),
            },
        );
        assert_eq!(*got.lock(), vec![1, 3]);
    }

    #[test]
    fn test_best_effort_reader_downgrades_writer() {
        let (r, got) = reader(false, false);
        match_writer(&r);
        r.on_data(writer_guid(), data(2));
        r.on_data(writer_guid(), data(1));
        r.on_data(writer_guid(), data(4));
        assert_eq!(*got.lock(), vec![2, 4]);
    }

    #[test]
    fn test_unmatch_forgets_state() {
        let (r, got) = reader(true, false);
        match_writer(&r);
        r.on_data(writer_guid(), data(1));
        assert!(r.matched_writer_remove(writer_guid()));
        match_writer(&r);
        r.on_data(writer_guid(), data(1));
        assert_eq!(*got.lock(), vec![1, 1]);
    }
}
