// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery payloads: participant, writer and reader proxy data plus the
//! participant liveliness message.
//!
//! Each payload starts with a one-byte tag and is encoded little-endian
//! with [`ByteWriter`]; decoding validates every field and fails with a
//! [`DecodeError`] instead of producing partial data.

use std::time::Duration;

use crate::core::guid::{GuidPrefix, GUID};
use crate::core::locator::Locator;
use crate::dds::qos::{
    DestinationOrderKind, Durability, EndpointQos, Liveliness, LivelinessKind, OwnershipKind,
    Partition, Reliability,
};
use crate::protocol::{ByteReader, ByteWriter, DecodeError};

// ============================================================================
// Builtin endpoint bitmask
// ============================================================================

pub const BUILTIN_PARTICIPANT_ANNOUNCER: u32 = 1 << 0;
pub const BUILTIN_PARTICIPANT_DETECTOR: u32 = 1 << 1;
pub const BUILTIN_PUBLICATIONS_ANNOUNCER: u32 = 1 << 2;
pub const BUILTIN_PUBLICATIONS_DETECTOR: u32 = 1 << 3;
pub const BUILTIN_SUBSCRIPTIONS_ANNOUNCER: u32 = 1 << 4;
pub const BUILTIN_SUBSCRIPTIONS_DETECTOR: u32 = 1 << 5;
pub const BUILTIN_PARTICIPANT_MESSAGE_WRITER: u32 = 1 << 10;
pub const BUILTIN_PARTICIPANT_MESSAGE_READER: u32 = 1 << 11;

/// Every builtin endpoint this implementation provides.
pub const DEFAULT_BUILTIN_ENDPOINTS: u32 = BUILTIN_PARTICIPANT_ANNOUNCER
    | BUILTIN_PARTICIPANT_DETECTOR
    | BUILTIN_PUBLICATIONS_ANNOUNCER
    | BUILTIN_PUBLICATIONS_DETECTOR
    | BUILTIN_SUBSCRIPTIONS_ANNOUNCER
    | BUILTIN_SUBSCRIPTIONS_DETECTOR
    | BUILTIN_PARTICIPANT_MESSAGE_WRITER
    | BUILTIN_PARTICIPANT_MESSAGE_READER;

pub const PROTOCOL_VERSION: (u8, u8) = (2, 4);

const TAG_PARTICIPANT: u8 = 0x50;
const TAG_WRITER: u8 = 0x57;
const TAG_READER: u8 = 0x52;
const TAG_PARTICIPANT_MESSAGE: u8 = 0x4D;

fn expect_tag(r: &mut ByteReader<'_>, tag: u8, what: &'static str) -> Result<(), DecodeError> {
    if r.u8()? != tag {
        return Err(DecodeError::InvalidValue(what));
    }
    Ok(())
}

// ============================================================================
// ParticipantProxyData
// ============================================================================

/// What a participant announces about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantProxyData {
    pub guid: GUID,
    pub domain_id: u32,
    pub name: String,
    pub protocol_version: (u8, u8),
    pub vendor_id: [u8; 2],
    pub default_unicast_locators: Vec<Locator>,
    pub default_multicast_locators: Vec<Locator>,
    pub metatraffic_unicast_locators: Vec<Locator>,
    pub metatraffic_multicast_locators: Vec<Locator>,
    pub available_builtin_endpoints: u32,
    pub lease_duration: Duration,
    /// Announced by a discovery server.
    pub is_server: bool,
}

impl ParticipantProxyData {
    pub fn prefix(&self) -> GuidPrefix {
        self.guid.prefix
    }

    pub fn has_endpoint(&self, flag: u32) -> bool {
        self.available_builtin_endpoints & flag == flag
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(256);
        w.put_u8(TAG_PARTICIPANT);
        w.put_guid(&self.guid);
        w.put_u32(self.domain_id);
        w.put_str(&self.name);
        w.put_u8(self.protocol_version.0);
        w.put_u8(self.protocol_version.1);
        w.put_raw(&self.vendor_id);
        w.put_locators(&self.default_unicast_locators);
        w.put_locators(&self.default_multicast_locators);
        w.put_locators(&self.metatraffic_unicast_locators);
        w.put_locators(&self.metatraffic_multicast_locators);
        w.put_u32(self.available_builtin_endpoints);
        w.put_duration(self.lease_duration);
        w.put_bool(self.is_server);
        w.into_inner()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = ByteReader::new(buf);
        expect_tag(&mut r, TAG_PARTICIPANT, "participant data tag")?;
        let guid = r.guid()?;
        let domain_id = r.u32()?;
        let name = r.string()?;
        let protocol_version = (r.u8()?, r.u8()?);
        let vendor = r.take(2)?;
        let vendor_id = [vendor[0], vendor[1]];
        Ok(Self {
            guid,
            domain_id,
            name,
            protocol_version,
            vendor_id,
            default_unicast_locators: r.locators()?,
            default_multicast_locators: r.locators()?,
            metatraffic_unicast_locators: r.locators()?,
            metatraffic_multicast_locators: r.locators()?,
            available_builtin_endpoints: r.u32()?,
            lease_duration: r.duration()?,
            is_server: r.bool()?,
        })
    }

    /// Metatraffic destinations: unicast when known, multicast otherwise.
    pub fn metatraffic_destinations(&self) -> &[Locator] {
        if self.metatraffic_unicast_locators.is_empty() {
            &self.metatraffic_multicast_locators
        } else {
            &self.metatraffic_unicast_locators
        }
    }
}

// ============================================================================
// Endpoint QoS encoding
// ============================================================================

fn put_endpoint_qos(w: &mut ByteWriter, qos: &EndpointQos) {
    w.put_u8(match qos.reliability {
        Reliability::BestEffort => 0,
        Reliability::Reliable => 1,
    });
    w.put_u8(qos.durability.as_u8());
    w.put_u8(match qos.ownership {
        OwnershipKind::Shared => 0,
        OwnershipKind::Exclusive => 1,
    });
    w.put_i32(qos.ownership_strength);
    w.put_u8(qos.liveliness.kind.as_u8());
    w.put_duration(qos.liveliness.lease_duration);
    w.put_duration(qos.liveliness.announcement_period);
    w.put_duration(qos.deadline);
    w.put_u8(match qos.destination_order {
        DestinationOrderKind::ByReceptionTimestamp => 0,
        DestinationOrderKind::BySourceTimestamp => 1,
    });
    w.put_u32(qos.partition.names.len() as u32);
    for name in &qos.partition.names {
        w.put_str(name);
    }
}

fn get_endpoint_qos(r: &mut ByteReader<'_>) -> Result<EndpointQos, DecodeError> {
    let reliability = match r.u8()? {
        0 => Reliability::BestEffort,
        1 => Reliability::Reliable,
        _ => return Err(DecodeError::InvalidValue("reliability kind")),
    };
    let durability =
        Durability::from_u8(r.u8()?).ok_or(DecodeError::InvalidValue("durability kind"))?;
    let ownership = match r.u8()? {
        0 => OwnershipKind::Shared,
        1 => OwnershipKind::Exclusive,
        _ => return Err(DecodeError::InvalidValue("ownership kind")),
    };
    let ownership_strength = r.i32()?;
    let kind =
        LivelinessKind::from_u8(r.u8()?).ok_or(DecodeError::InvalidValue("liveliness kind"))?;
    let liveliness = Liveliness {
        kind,
        lease_duration: r.duration()?,
        announcement_period: r.duration()?,
    };
    let deadline = r.duration()?;
    let destination_order = match r.u8()? {
        0 => DestinationOrderKind::ByReceptionTimestamp,
        1 => DestinationOrderKind::BySourceTimestamp,
        _ => return Err(DecodeError::InvalidValue("destination order kind")),
    };
    let count = r.u32()? as usize;
    if count > r.remaining() {
        return Err(DecodeError::InvalidValue("partition count"));
    }
    let mut names = Vec::with_capacity(count);
    for _ in 0..count {
        names.push(r.string()?);
    }
    Ok(EndpointQos {
        reliability,
        durability,
        ownership,
        ownership_strength,
        liveliness,
        deadline,
        destination_order,
        partition: Partition { names },
    })
}

// ============================================================================
// WriterProxyData / ReaderProxyData
// ============================================================================

/// What a participant announces about one of its writers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterProxyData {
    pub guid: GUID,
    pub participant_guid: GUID,
    pub topic_name: String,
    pub type_name: String,
    pub unicast_locators: Vec<Locator>,
    pub multicast_locators: Vec<Locator>,
    pub qos: EndpointQos,
    /// Largest payload the writer puts in one DATA (0 when unknown).
    pub max_fragment_payload: u32,
}

impl WriterProxyData {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(192);
        w.put_u8(TAG_WRITER);
        w.put_guid(&self.guid);
        w.put_guid(&self.participant_guid);
        w.put_str(&self.topic_name);
        w.put_str(&self.type_name);
        w.put_locators(&self.unicast_locators);
        w.put_locators(&self.multicast_locators);
        put_endpoint_qos(&mut w, &self.qos);
        w.put_u32(self.max_fragment_payload);
        w.into_inner()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = ByteReader::new(buf);
        expect_tag(&mut r, TAG_WRITER, "writer data tag")?;
        let guid = r.guid()?;
        if !guid.entity_id.is_writer() {
            return Err(DecodeError::InvalidValue("writer entity kind"));
        }
        Ok(Self {
            guid,
            participant_guid: r.guid()?,
            topic_name: r.string()?,
            type_name: r.string()?,
            unicast_locators: r.locators()?,
            multicast_locators: r.locators()?,
            qos: get_endpoint_qos(&mut r)?,
            max_fragment_payload: r.u32()?,
        })
    }
}

/// What a participant announces about one of its readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderProxyData {
    pub guid: GUID,
    pub participant_guid: GUID,
    pub topic_name: String,
    pub type_name: String,
    pub unicast_locators: Vec<Locator>,
    pub multicast_locators: Vec<Locator>,
    pub qos: EndpointQos,
    pub expects_inline_qos: bool,
}

impl ReaderProxyData {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(192);
        w.put_u8(TAG_READER);
        w.put_guid(&self.guid);
        w.put_guid(&self.participant_guid);
        w.put_str(&self.topic_name);
        w.put_str(&self.type_name);
        w.put_locators(&self.unicast_locators);
        w.put_locators(&self.multicast_locators);
        put_endpoint_qos(&mut w, &self.qos);
        w.put_bool(self.expects_inline_qos);
        w.into_inner()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = ByteReader::new(buf);
        expect_tag(&mut r, TAG_READER, "reader data tag")?;
        let guid = r.guid()?;
        if !guid.entity_id.is_reader() {
            return Err(DecodeError::InvalidValue("reader entity kind"));
        }
        Ok(Self {
            guid,
            participant_guid: r.guid()?,
            topic_name: r.string()?,
            type_name: r.string()?,
            unicast_locators: r.locators()?,
            multicast_locators: r.locators()?,
            qos: get_endpoint_qos(&mut r)?,
            expects_inline_qos: r.bool()?,
        })
    }
}

// ============================================================================
// ParticipantMessageData (WLP)
// ============================================================================

/// Liveliness assertion kind carried by a participant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParticipantMessageKind {
    /// Asserts every AUTOMATIC writer of the participant.
    Automatic,
    /// Asserts every MANUAL_BY_PARTICIPANT writer of the participant.
    ManualByParticipant,
}

impl ParticipantMessageKind {
    fn code(self) -> u32 {
        match self {
            ParticipantMessageKind::Automatic => 1,
            ParticipantMessageKind::ManualByParticipant => 2,
        }
    }

    pub fn asserts(self, kind: LivelinessKind) -> bool {
        matches!(
            (self, kind),
            (ParticipantMessageKind::Automatic, LivelinessKind::Automatic)
                | (
                    ParticipantMessageKind::ManualByParticipant,
                    LivelinessKind::ManualByParticipant
                )
        )
    }
}

/// Participant liveliness assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantMessageData {
    pub participant: GuidPrefix,
    pub kind: ParticipantMessageKind,
    pub data: Vec<u8>,
}

impl ParticipantMessageData {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(32 + self.data.len());
        w.put_u8(TAG_PARTICIPANT_MESSAGE);
        w.put_prefix(&self.participant);
        w.put_u32(self.kind.code());
        w.put_bytes(&self.data);
        w.into_inner()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = ByteReader::new(buf);
        expect_tag(&mut r, TAG_PARTICIPANT_MESSAGE, "participant message tag")?;
        let participant = r.prefix()?;
        let kind = match r.u32()? {
            1 => ParticipantMessageKind::Automatic,
            2 => ParticipantMessageKind::ManualByParticipant,
            _ => return Err(DecodeError::InvalidValue("participant message kind")),
        };
        Ok(Self {
            participant,
            kind,
            data: r.bytes()?.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::guid::EntityId;
    use std::net::Ipv4Addr;

    fn participant() -> ParticipantProxyData {
        let prefix = GuidPrefix([4; 12]);
        ParticipantProxyData {
            guid: GUID::new(prefix, EntityId::PARTICIPANT),
            domain_id: 3,
            name: "sensor".into(),
            protocol_version: PROTOCOL_VERSION,
            vendor_id: [0x01, 0xAA],
            default_unicast_locators: vec![Locator::udpv4(Ipv4Addr::new(10, 0, 0, 1), 7411)],
            default_multicast_locators: Vec::new(),
            metatraffic_unicast_locators: vec![Locator::udpv4(Ipv4Addr::new(10, 0, 0, 1), 7410)],
            metatraffic_multicast_locators: vec![Locator::spdp_multicast(3)],
            available_builtin_endpoints: DEFAULT_BUILTIN_ENDPOINTS,
            lease_duration: Duration::from_secs(20),
            is_server: false,
        }
    }

    #[test]
    fn test_participant_data_survives_encoding() {
        let data = participant();
        let decoded = ParticipantProxyData::decode(&data.encode()).expect("decode");
        assert_eq!(decoded, data);
        assert!(decoded.has_endpoint(BUILTIN_PUBLICATIONS_DETECTOR));
    }

    #[test]
    fn test_writer_data_keeps_qos() {
        let prefix = GuidPrefix([4; 12]);
        let data = WriterProxyData {
            guid: GUID::new(prefix, EntityId::user_writer(7, true)),
            participant_guid: GUID::new(prefix, EntityId::PARTICIPANT),
            topic_name: "Temperature".into(),
            type_name: "Reading".into(),
            unicast_locators: Vec::new(),
            multicast_locators: Vec::new(),
            qos: EndpointQos {
                reliability: Reliability::Reliable,
                durability: Durability::TransientLocal,
                ownership: OwnershipKind::Exclusive,
                ownership_strength: 12,
                liveliness: Liveliness::new(LivelinessKind::ManualByTopic, Duration::from_secs(2)),
                deadline: Duration::from_millis(250),
                destination_order: DestinationOrderKind::ByReceptionTimestamp,
                partition: Partition::new(["a", "b"]),
            },
            max_fragment_payload: 1024,
        };
        assert_eq!(WriterProxyData::decode(&data.encode()).expect("decode"), data);
    }

    #[test]
    fn test_truncated_and_mistagged_rejected() {
        let bytes = participant().encode();
        assert!(matches!(
            ParticipantProxyData::decode(&bytes[..bytes.len() - 3]),
            Err(DecodeError::Truncated { .. })
        ));
        assert!(ReaderProxyData::decode(&bytes).is_err());
    }

    #[test]
    fn test_reader_guid_must_be_reader() {
        let prefix = GuidPrefix([4; 12]);
        let data = ReaderProxyData {
            guid: GUID::new(prefix, EntityId::user_writer(1, false)),
            participant_guid: GUID::new(prefix, EntityId::PARTICIPANT),
            topic_name: "t".into(),
            type_name: "T".into(),
            unicast_locators: Vec::new(),
            multicast_locators: Vec::new(),
            qos: EndpointQos::default(),
            expects_inline_qos: false,
        };
        assert_eq!(
            ReaderProxyData::decode(&data.encode()),
            Err(DecodeError::InvalidValue("reader entity kind"))
        );
    }

    #[test]
    fn test_participant_message_kinds() {
        let msg = ParticipantMessageData {
            participant: GuidPrefix([9; 12]),
            kind: ParticipantMessageKind::ManualByParticipant,
            data: vec![1, 2],
        };
        assert_eq!(ParticipantMessageData::decode(&msg.encode()).expect("decode"), msg);
        assert!(msg.kind.asserts(LivelinessKind::ManualByParticipant));
        assert!(!msg.kind.asserts(LivelinessKind::Automatic));
    }
}
