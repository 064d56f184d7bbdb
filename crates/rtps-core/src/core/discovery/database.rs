// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery database.
//!
//! Arena of remote participants keyed by [`GuidPrefix`]. Each entry owns the
//! writer and reader proxy data announced by that participant, so removing
//! a participant removes its endpoints in the same write-locked step.
//! Endpoints refer back to their participant by GUID only.
//!
//! Lookups take the read lock; inserts and removals take the write lock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use super::proxy_data::{ParticipantProxyData, ReaderProxyData, WriterProxyData};
use crate::core::guid::{GuidPrefix, GUID};

/// One remote participant and everything it announced.
#[derive(Debug, Clone)]
pub struct ParticipantEntry {
    pub data: ParticipantProxyData,
    /// Last time anything was received from the participant.
    pub last_seen: Instant,
    pub writers: HashMap<GUID, WriterProxyData>,
    pub readers: HashMap<GUID, ReaderProxyData>,
}

impl ParticipantEntry {
    fn new(data: ParticipantProxyData, now: Instant) -> Self {
        Self {
            data,
            last_seen: now,
            writers: HashMap::new(),
            readers: HashMap::new(),
        }
    }

    /// Lease expired at `now`. Infinite leases never expire.
    pub fn is_expired(&self, now: Instant) -> bool {
        if self.data.lease_duration == Duration::MAX {
            return false;
        }
        match self.last_seen.checked_add(self.data.lease_duration) {
            Some(expiry) => expiry <= now,
            None => false,
        }
    }
}

/// Outcome of [`DiscoveryDatabase::update_participant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantUpdate {
    /// First announcement from this participant.
    New,
    /// Known participant announced different data.
    Changed,
    /// Repeated announcement.
    Unchanged,
}

/// Outcome of adding an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointUpdate {
    New,
    Changed,
    Unchanged,
    /// The owning participant is not known.
    UnknownParticipant,
}

/// Remote participants and their endpoints.
#[derive(Debug, Default)]
pub struct DiscoveryDatabase {
    participants: RwLock<HashMap<GuidPrefix, ParticipantEntry>>,
}

impl DiscoveryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Participants
    // ========================================================================

    /// Insert or refresh a participant; refreshes `last_seen`.
    pub fn update_participant(&self, data: ParticipantProxyData) -> ParticipantUpdate {
        let now = Instant::now();
        let mut participants = self.participants.write();
        match participants.get_mut(&data.guid.prefix) {
            Some(entry) => {
                entry.last_seen = now;
                if entry.data == data {
                    ParticipantUpdate::Unchanged
                } else {
                    entry.data = data;
                    ParticipantUpdate::Changed
                }
            }
            None => {
                participants.insert(data.guid.prefix, ParticipantEntry::new(data, now));
                ParticipantUpdate::New
            }
        }
    }

    /// Refresh the lease of `prefix`. Returns false if it is unknown.
    pub fn touch(&self, prefix: GuidPrefix) -> bool {
        // Read lock first: the common case is a known participant
        if !self.participants.read().contains_key(&prefix) {
            return false;
        }
        match self.participants.write().get_mut(&prefix) {
            Some(entry) => {
                entry.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Remove a participant together with its endpoints.
    pub fn remove_participant(&self, prefix: GuidPrefix) -> Option<ParticipantEntry> {
        self.participants.write().remove(&prefix)
    }

    pub fn contains(&self, prefix: GuidPrefix) -> bool {
        self.participants.read().contains_key(&prefix)
    }

    pub fn participant(&self, prefix: GuidPrefix) -> Option<ParticipantProxyData> {
        self.participants.read().get(&prefix).map(|e| e.data.clone())
    }

    pub fn last_seen(&self, prefix: GuidPrefix) -> Option<Instant> {
        self.participants.read().get(&prefix).map(|e| e.last_seen)
    }

    pub fn participants(&self) -> Vec<ParticipantProxyData> {
        self.participants
            .read()
            .values()
            .map(|e| e.data.clone())
            .collect()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.read().len()
    }

    /// Participants whose lease expired at `now`.
    pub fn expired(&self, now: Instant) -> Vec<GuidPrefix> {
        self.participants
            .read()
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(prefix, _)| *prefix)
            .collect()
    }

    // ========================================================================
    // Endpoints
    // ========================================================================

    pub fn add_writer(&self, data: WriterProxyData) -> EndpointUpdate {
        let mut participants = self.participants.write();
        let Some(entry) = participants.get_mut(&data.guid.prefix) else {
            return EndpointUpdate::UnknownParticipant;
        };
        match entry.writers.insert(data.guid, data.clone()) {
            None => EndpointUpdate::New,
            Some(previous) if previous == data => EndpointUpdate::Unchanged,
            Some(_) => EndpointUpdate::Changed,
        }
    }

    pub fn add_reader(&self, data: ReaderProxyData) -> EndpointUpdate {
        let mut participants = self.participants.write();
        let Some(entry) = participants.get_mut(&data.guid.prefix) else {
            return EndpointUpdate::UnknownParticipant;
        };
        match entry.readers.insert(data.guid, data.clone()) {
            None => EndpointUpdate::New,
            Some(previous) if previous == data => EndpointUpdate::Unchanged,
            Some(_) => EndpointUpdate::Changed,
        }
    }

    pub fn remove_writer(&self, guid: GUID) -> Option<WriterProxyData> {
        self.participants
            .write()
            .get_mut(&guid.prefix)
            .and_then(|e| e.writers.remove(&guid))
    }

    pub fn remove_reader(&self, guid: GUID) -> Option<ReaderProxyData> {
        self.participants
            .write()
            .get_mut(&guid.prefix)
            .and_then(|e| e.readers.remove(&guid))
    }

    pub fn writer(&self, guid: GUID) -> Option<WriterProxyData> {
        self.participants
            .read()
            .get(&guid.prefix)
            .and_then(|e| e.writers.get(&guid).cloned())
    }

    pub fn reader(&self, guid: GUID) -> Option<ReaderProxyData> {
        self.participants
            .read()
            .get(&guid.prefix)
            .and_then(|e| e.readers.get(&guid).cloned())
    }

    /// Every remote writer on `topic`.
    pub fn writers_for_topic(&self, topic: &str) -> Vec<WriterProxyData> {
        self.participants
            .read()
            .values()
            .flat_map(|e| e.writers.values())
            .filter(|w| w.topic_name == topic)
            .cloned()
            .collect()
    }

    /// Every remote reader on `topic`.
    pub fn readers_for_topic(&self, topic: &str) -> Vec<ReaderProxyData> {
        self.participants
            .read()
            .values()
            .flat_map(|e| e.readers.values())
            .filter(|r| r.topic_name == topic)
            .cloned()
            .collect()
    }

    pub fn endpoint_count(&self) -> (usize, usize) {
        let participants = self.participants.read();
        participants.values().fold((0, 0), |(w, r), e| {
            (w + e.writers.len(), r + e.readers.len())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::discovery::proxy_data::PROTOCOL_VERSION;
    use crate::core::guid::EntityId;
    use crate::dds::qos::EndpointQos;
    use std::thread;

    fn participant(n: u8, lease: Duration) -> ParticipantProxyData {
        ParticipantProxyData {
            guid: GUID::new(GuidPrefix([n; 12]), EntityId::PARTICIPANT),
            domain_id: 0,
            name: format!("p{}", n),
            protocol_version: PROTOCOL_VERSION,
            vendor_id: [0, 0],
            default_unicast_locators: Vec::new(),
            default_multicast_locators: Vec::new(),
            metatraffic_unicast_locators: Vec::new(),
            metatraffic_multicast_locators: Vec::new(),
            available_builtin_endpoints: 0,
            lease_duration: lease,
            is_server: false,
        }
    }

    fn writer(n: u8, key: u32, topic: &str) -> WriterProxyData {
        let prefix = GuidPrefix([n; 12]);
        WriterProxyData {
            guid: GUID::new(prefix, EntityId::user_writer(key, false)),
            participant_guid: GUID::new(prefix, EntityId::PARTICIPANT),
            topic_name: topic.into(),
            type_name: "T".into(),
            unicast_locators: Vec::new(),
            multicast_locators: Vec::new(),
            qos: EndpointQos::default(),
            max_fragment_payload: 0,
        }
    }

    #[test]
    fn test_update_classifies_announcements() {
        let db = DiscoveryDatabase::new();
        let p = participant(1, Duration::from_secs(10));
        assert_eq!(db.update_participant(p.clone()), ParticipantUpdate::New);
        assert_eq!(db.update_participant(p.clone()), ParticipantUpdate::Unchanged);
        let mut renamed = p;
        renamed.name = "renamed".into();
        assert_eq!(db.update_participant(renamed), ParticipantUpdate::Changed);
        assert_eq!(db.participant_count(), 1);
    }

    #[test]
    fn test_endpoints_need_their_participant() {
        let db = DiscoveryDatabase::new();
        assert_eq!(db.add_writer(writer(1, 1, "a")), EndpointUpdate::UnknownParticipant);
        db.update_participant(participant(1, Duration::from_secs(10)));
        assert_eq!(db.add_writer(writer(1, 1, "a")), EndpointUpdate::New);
        assert_eq!(db.add_writer(writer(1, 1, "a")), EndpointUpdate::Unchanged);
        assert_eq!(db.add_writer(writer(1, 2, "b")), EndpointUpdate::New);
        assert_eq!(db.writers_for_topic("a").len(), 1);

        let removed = db.remove_participant(GuidPrefix([1; 12])).expect("entry");
        assert_eq!(removed.writers.len(), 2);
        assert_eq!(db.endpoint_count(), (0, 0));
    }

    #[test]
    fn test_lease_expiry_and_touch() {
        let db = DiscoveryDatabase::new();
        db.update_participant(participant(1, Duration::from_millis(50)));
        db.update_participant(participant(2, Duration::MAX));
        thread::sleep(Duration::from_millis(80));
        assert_eq!(db.expired(Instant::now()), vec![GuidPrefix([1; 12])]);
        assert!(db.touch(GuidPrefix([1; 12])));
        assert!(db.expired(Instant::now()).is_empty());
        assert!(!db.touch(GuidPrefix([3; 12])));
    }
}
