// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RTPS GUID (Globally Unique Identifier) and instance handles.
//!
//! A GUID is the identity of a participant or one of its endpoints. It is
//! assigned by the owning participant at creation time and never changes;
//! every discovery and matching map in this crate is keyed by it.

use std::fmt;

/// Length of a GUID prefix in bytes.
pub const GUID_PREFIX_LEN: usize = 12;

/// 12-byte participant prefix shared by all entities of one participant.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct GuidPrefix(pub [u8; GUID_PREFIX_LEN]);

impl GuidPrefix {
    /// Unknown / unset prefix.
    pub const UNKNOWN: GuidPrefix = GuidPrefix([0; GUID_PREFIX_LEN]);

    /// Build a prefix from a vendor id, a host id and a per-process counter.
    ///
    /// Layout: `[vendor(2) | host(4) | pid(4) | counter(2)]`.
    pub fn generate(vendor: [u8; 2], host_id: u32, process_id: u32, counter: u16) -> Self {
        let mut bytes = [0u8; GUID_PREFIX_LEN];
        bytes[0..2].copy_from_slice(&vendor);
        bytes[2..6].copy_from_slice(&host_id.to_be_bytes());
        bytes[6..10].copy_from_slice(&process_id.to_be_bytes());
        bytes[10..12].copy_from_slice(&counter.to_be_bytes());
        Self(bytes)
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == [0; GUID_PREFIX_LEN]
    }
}

impl fmt::Debug for GuidPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for GuidPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// 4-byte entity identifier: 3-byte key plus 1-byte kind.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct EntityId(pub [u8; 4]);

// Entity kind octet (RTPS v2.3 Sec.9.3.1.2)
const KIND_USER_WRITER_WITH_KEY: u8 = 0x02;
const KIND_USER_WRITER_NO_KEY: u8 = 0x03;
const KIND_USER_READER_NO_KEY: u8 = 0x04;
const KIND_USER_READER_WITH_KEY: u8 = 0x07;
const KIND_BUILTIN_FLAG: u8 = 0xC0;

impl EntityId {
    pub const UNKNOWN: EntityId = EntityId([0x00, 0x00, 0x00, 0x00]);
    pub const PARTICIPANT: EntityId = EntityId([0x00, 0x00, 0x01, 0xC1]);
    pub const SPDP_WRITER: EntityId = EntityId([0x00, 0x01, 0x00, 0xC2]);
    pub const SPDP_READER: EntityId = EntityId([0x00, 0x01, 0x00, 0xC7]);
    pub const SEDP_PUBLICATIONS_WRITER: EntityId = EntityId([0x00, 0x00, 0x03, 0xC2]);
    pub const SEDP_PUBLICATIONS_READER: EntityId = EntityId([0x00, 0x00, 0x03, 0xC7]);
    pub const SEDP_SUBSCRIPTIONS_WRITER: EntityId = EntityId([0x00, 0x00, 0x04, 0xC2]);
    pub const SEDP_SUBSCRIPTIONS_READER: EntityId = EntityId([0x00, 0x00, 0x04, 0xC7]);
    pub const WLP_WRITER: EntityId = EntityId([0x00, 0x02, 0x00, 0xC2]);
    pub const WLP_READER: EntityId = EntityId([0x00, 0x02, 0x00, 0xC7]);

    /// User-defined writer entity id from a 24-bit key.
    pub fn user_writer(key: u32, keyed: bool) -> Self {
        let kind = if keyed {
            KIND_USER_WRITER_WITH_KEY
        } else {
            KIND_USER_WRITER_NO_KEY
        };
        Self::from_key(key, kind)
    }

    /// User-defined reader entity id from a 24-bit key.
    pub fn user_reader(key: u32, keyed: bool) -> Self {
        let kind = if keyed {
            KIND_USER_READER_WITH_KEY
        } else {
            KIND_USER_READER_NO_KEY
        };
        Self::from_key(key, kind)
    }

    fn from_key(key: u32, kind: u8) -> Self {
        let k = key.to_be_bytes();
        Self([k[1], k[2], k[3], kind])
    }

    pub fn kind(&self) -> u8 {
        self.0[3]
    }

    pub fn is_builtin(&self) -> bool {
        self.kind() & KIND_BUILTIN_FLAG == KIND_BUILTIN_FLAG
    }

    /// True for writer entities (builtin or user).
    pub fn is_writer(&self) -> bool {
        matches!(self.kind() & 0x0F, 0x02 | 0x03)
    }

    /// True for reader entities (builtin or user).
    pub fn is_reader(&self) -> bool {
        matches!(self.kind() & 0x0F, 0x04 | 0x07)
    }

    pub fn is_keyed(&self) -> bool {
        matches!(self.kind() & 0x0F, 0x02 | 0x07)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// RTPS GUID (Globally Unique Identifier)
///
/// 16-byte identifier following DDS-RTPS v2.3.
///
/// # Display Format
/// Hex with dots, entity id appended after a pipe:
/// "01.0f.ac.10.00.00.00.00.00.00.00.01|000001c1"
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct GUID {
    pub prefix: GuidPrefix,
    pub entity_id: EntityId,
}

impl GUID {
    pub const UNKNOWN: GUID = GUID {
        prefix: GuidPrefix::UNKNOWN,
        entity_id: EntityId::UNKNOWN,
    };

    pub fn new(prefix: GuidPrefix, entity_id: EntityId) -> Self {
        Self { prefix, entity_id }
    }

    /// Create GUID from raw bytes (16 bytes total)
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let mut prefix = [0u8; GUID_PREFIX_LEN];
        let mut entity_id = [0u8; 4];
        prefix.copy_from_slice(&bytes[0..12]);
        entity_id.copy_from_slice(&bytes[12..16]);
        Self {
            prefix: GuidPrefix(prefix),
            entity_id: EntityId(entity_id),
        }
    }

    /// Convert GUID to 16-byte array
    pub fn as_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0..12].copy_from_slice(&self.prefix.0);
        bytes[12..16].copy_from_slice(&self.entity_id.0);
        bytes
    }

    /// GUID of the participant owning this entity.
    pub fn participant(&self) -> GUID {
        GUID::new(self.prefix, EntityId::PARTICIPANT)
    }

    pub fn is_unknown(&self) -> bool {
        *self == GUID::UNKNOWN
    }
}

impl fmt::Debug for GUID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for GUID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{:?}", self.prefix, self.entity_id)
    }
}

/// 16-byte instance handle (key hash for keyed topics).
///
/// The all-zero value is `NIL`: unkeyed topics use it for every sample.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct InstanceHandle(pub [u8; 16]);

impl InstanceHandle {
    pub const NIL: InstanceHandle = InstanceHandle([0; 16]);

    /// A handle is defined when it is not `NIL`.
    pub fn is_defined(&self) -> bool {
        self.0 != [0; 16]
    }
}

impl From<GUID> for InstanceHandle {
    fn from(guid: GUID) -> Self {
        InstanceHandle(guid.as_bytes())
    }
}

impl From<InstanceHandle> for GUID {
    fn from(handle: InstanceHandle) -> Self {
        GUID::from_bytes(handle.0)
    }
}

impl fmt::Debug for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceHandle(")?;
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}
