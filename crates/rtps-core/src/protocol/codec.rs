// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Little-endian message framing.
//!
//! ```text
//! "RTPX" | version:u8 | sender:[u8;12] | has_dst:u8 [dst:[u8;12]] | count:u16
//! then `count` times:  tag:u8 | len:u32 | body[len]
//! ```
//!
//! Unknown submessage tags are skipped by length so newer peers can add
//! submessages without breaking older decoders.

use std::fmt;
use std::time::Duration;

use super::{
    AckNackSubmessage, DataFragSubmessage, DataSubmessage, GapSubmessage, HeartbeatSubmessage,
    Message, SequenceNumberSet, Submessage,
};
use crate::core::guid::{EntityId, GuidPrefix, InstanceHandle, GUID, GUID_PREFIX_LEN};
use crate::core::locator::{Locator, LOCATOR_SIZE};
use crate::reliability::ChangeKind;

pub const MAGIC: &[u8; 4] = b"RTPX";
pub const VERSION: u8 = 1;

const TAG_DATA: u8 = 0x15;
const TAG_DATA_FRAG: u8 = 0x16;
const TAG_HEARTBEAT: u8 = 0x07;
const TAG_ACKNACK: u8 = 0x06;
const TAG_GAP: u8 = 0x08;

const FLAG_FINAL: u8 = 0x01;
const FLAG_LIVELINESS: u8 = 0x02;

/// Decoding failure of a message or discovery payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer ended before the announced content.
    Truncated { needed: usize, available: usize },
    /// Frame does not start with the expected magic.
    BadMagic,
    /// Frame version not understood.
    UnsupportedVersion(u8),
    /// Field holds a value outside its domain.
    InvalidValue(&'static str),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated { needed, available } => {
                write!(f, "truncated: need {} bytes, {} available", needed, available)
            }
            DecodeError::BadMagic => write!(f, "bad magic"),
            DecodeError::UnsupportedVersion(v) => write!(f, "unsupported version {}", v),
            DecodeError::InvalidValue(what) => write!(f, "invalid value for {}", what),
        }
    }
}

impl std::error::Error for DecodeError {}

// ============================================================================
// Cursor helpers
// ============================================================================

/// Append-only little-endian writer.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Length-prefixed (u32) byte string.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_str(&mut self, s: &str) {
        self.put_bytes(s.as_bytes());
    }

    /// Durations travel as seconds + nanoseconds; `Duration::MAX` maps to
    /// all-ones seconds (infinite).
    pub fn put_duration(&mut self, d: Duration) {
        if d == Duration::MAX {
            self.put_u64(u64::MAX);
            self.put_u32(0);
        } else {
            self.put_u64(d.as_secs());
            self.put_u32(d.subsec_nanos());
        }
    }

    pub fn put_prefix(&mut self, prefix: &GuidPrefix) {
        self.put_raw(&prefix.0);
    }

    pub fn put_entity(&mut self, id: &EntityId) {
        self.put_raw(&id.0);
    }

    pub fn put_guid(&mut self, guid: &GUID) {
        self.put_raw(&guid.as_bytes());
    }

    pub fn put_locators<'a, I>(&mut self, locators: I)
    where
        I: IntoIterator<Item = &'a Locator>,
        I::IntoIter: ExactSizeIterator,
    {
        let iter = locators.into_iter();
        self.put_u32(iter.len() as u32);
        for loc in iter {
            loc.encode(&mut self.buf);
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked little-endian reader.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn bool(&mut self) -> Result<bool, DecodeError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(DecodeError::InvalidValue("bool")),
        }
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    pub fn string(&mut self) -> Result<String, DecodeError> {
        let raw = self.bytes()?;
        String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidValue("utf-8 string"))
    }

    pub fn duration(&mut self) -> Result<Duration, DecodeError> {
        let secs = self.u64()?;
        let nanos = self.u32()?;
        if secs == u64::MAX {
            return Ok(Duration::MAX);
        }
        if nanos >= 1_000_000_000 {
            return Err(DecodeError::InvalidValue("duration nanoseconds"));
        }
        Ok(Duration::new(secs, nanos))
    }

    pub fn prefix(&mut self) -> Result<GuidPrefix, DecodeError> {
        Ok(GuidPrefix(self.array::<GUID_PREFIX_LEN>()?))
    }

    pub fn entity(&mut self) -> Result<EntityId, DecodeError> {
        Ok(EntityId(self.array()?))
    }

    pub fn guid(&mut self) -> Result<GUID, DecodeError> {
        Ok(GUID::from_bytes(self.array()?))
    }

    pub fn instance(&mut self) -> Result<InstanceHandle, DecodeError> {
        Ok(InstanceHandle(self.array()?))
    }

    pub fn locators(&mut self) -> Result<Vec<Locator>, DecodeError> {
        let count = self.u32()? as usize;
        if count.saturating_mul(LOCATOR_SIZE) > self.remaining() {
            return Err(DecodeError::Truncated {
                needed: count.saturating_mul(LOCATOR_SIZE),
                available: self.remaining(),
            });
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let raw = self.take(LOCATOR_SIZE)?;
            out.push(Locator::decode(raw).ok_or(DecodeError::InvalidValue("locator kind"))?);
        }
        Ok(out)
    }
}

// ============================================================================
// Message encode / decode
// ============================================================================

fn put_seqset(w: &mut ByteWriter, set: &SequenceNumberSet) {
    w.put_u64(set.base());
    w.put_u32(set.num_bits());
    for word in set.words() {
        w.put_u32(*word);
    }
}

fn read_seqset(r: &mut ByteReader<'_>) -> Result<SequenceNumberSet, DecodeError> {
    let base = r.u64()?;
    let num_bits = r.u32()?;
    if num_bits > SequenceNumberSet::MAX_BITS {
        return Err(DecodeError::InvalidValue("sequence set bits"));
    }
    let words = (0..num_bits.div_ceil(32))
        .map(|_| r.u32())
        .collect::<Result<Vec<_>, _>>()?;
    SequenceNumberSet::from_words(base, num_bits, &words)
        .ok_or(DecodeError::InvalidValue("sequence set"))
}

fn read_kind(r: &mut ByteReader<'_>) -> Result<ChangeKind, DecodeError> {
    ChangeKind::from_u8(r.u8()?).ok_or(DecodeError::InvalidValue("change kind"))
}

fn encode_submessage(w: &mut ByteWriter, sub: &Submessage) {
    let mut body = ByteWriter::new();
    let tag = match sub {
        Submessage::Data(d) => {
            body.put_entity(&d.reader_id);
            body.put_entity(&d.writer_id);
            body.put_u64(d.seq);
            body.put_u8(d.kind.as_u8());
            body.put_raw(&d.instance.0);
            body.put_u64(d.source_timestamp);
            body.put_bytes(&d.payload);
            TAG_DATA
        }
        Submessage::DataFrag(d) => {
            body.put_entity(&d.reader_id);
            body.put_entity(&d.writer_id);
            body.put_u64(d.seq);
            body.put_u8(d.kind.as_u8());
            body.put_raw(&d.instance.0);
            body.put_u64(d.source_timestamp);
            body.put_u32(d.fragment_start);
            body.put_u16(d.fragments_in_submessage);
            body.put_u16(d.fragment_size);
            body.put_u32(d.sample_size);
            body.put_bytes(&d.payload);
            TAG_DATA_FRAG
        }
        Submessage::Heartbeat(h) => {
            body.put_entity(&h.reader_id);
            body.put_entity(&h.writer_id);
            body.put_u64(h.first_seq);
            body.put_u64(h.last_seq);
            body.put_u32(h.count);
            let mut flags = 0;
            if h.final_flag {
                flags |= FLAG_FINAL;
            }
            if h.liveliness_flag {
                flags |= FLAG_LIVELINESS;
            }
            body.put_u8(flags);
            TAG_HEARTBEAT
        }
        Submessage::AckNack(a) => {
            body.put_entity(&a.reader_id);
            body.put_entity(&a.writer_id);
            put_seqset(&mut body, &a.state);
            body.put_u32(a.count);
            body.put_bool(a.final_flag);
            TAG_ACKNACK
        }
        Submessage::Gap(g) => {
            body.put_entity(&g.reader_id);
            body.put_entity(&g.writer_id);
            body.put_u64(g.gap_start);
            put_seqset(&mut body, &g.gap_list);
            TAG_GAP
        }
    };
    let body = body.into_inner();
    w.put_u8(tag);
    w.put_bytes(&body);
}

fn decode_submessage(tag: u8, body: &[u8]) -> Result<Option<Submessage>, DecodeError> {
    let mut r = ByteReader::new(body);
    let sub = match tag {
        TAG_DATA => Submessage::Data(DataSubmessage {
            reader_id: r.entity()?,
            writer_id: r.entity()?,
            seq: r.u64()?,
            kind: read_kind(&mut r)?,
            instance: r.instance()?,
            source_timestamp: r.u64()?,
            payload: r.bytes()?.to_vec(),
        }),
        TAG_DATA_FRAG => {
            let frag = DataFragSubmessage {
                reader_id: r.entity()?,
                writer_id: r.entity()?,
                seq: r.u64()?,
                kind: read_kind(&mut r)?,
                instance: r.instance()?,
                source_timestamp: r.u64()?,
                fragment_start: r.u32()?,
                fragments_in_submessage: r.u16()?,
                fragment_size: r.u16()?,
                sample_size: r.u32()?,
                payload: r.bytes()?.to_vec(),
            };
            if frag.fragment_start == 0 || frag.fragment_size == 0 {
                return Err(DecodeError::InvalidValue("fragment numbering"));
            }
            Submessage::DataFrag(frag)
        }
        TAG_HEARTBEAT => {
            let reader_id = r.entity()?;
            let writer_id = r.entity()?;
            let first_seq = r.u64()?;
            let last_seq = r.u64()?;
            let count = r.u32()?;
            let flags = r.u8()?;
            Submessage::Heartbeat(HeartbeatSubmessage {
                reader_id,
                writer_id,
                first_seq,
                last_seq,
                count,
                final_flag: flags & FLAG_FINAL != 0,
                liveliness_flag: flags & FLAG_LIVELINESS != 0,
            })
        }
        TAG_ACKNACK => Submessage::AckNack(AckNackSubmessage {
            reader_id: r.entity()?,
            writer_id: r.entity()?,
            state: read_seqset(&mut r)?,
            count: r.u32()?,
            final_flag: r.bool()?,
        }),
        TAG_GAP => Submessage::Gap(GapSubmessage {
            reader_id: r.entity()?,
            writer_id: r.entity()?,
            gap_start: r.u64()?,
            gap_list: read_seqset(&mut r)?,
        }),
        other => {
            log::trace!("[codec] skipping unknown submessage tag 0x{:02x}", other);
            return Ok(None);
        }
    };
    Ok(Some(sub))
}

/// Serialize a message into a fresh buffer.
pub fn encode_message(msg: &Message) -> Vec<u8> {
    let mut w = ByteWriter::with_capacity(64);
    w.put_raw(MAGIC);
    w.put_u8(VERSION);
    w.put_prefix(&msg.sender);
    match &msg.destination {
        Some(dst) => {
            w.put_u8(1);
            w.put_prefix(dst);
        }
        None => w.put_u8(0),
    }
    w.put_u16(msg.submessages.len() as u16);
    for sub in &msg.submessages {
        encode_submessage(&mut w, sub);
    }
    w.into_inner()
}

/// Parse a message produced by [`encode_message`].
pub fn decode_message(buf: &[u8]) -> Result<Message, DecodeError> {
    let mut r = ByteReader::new(buf);
    if r.take(MAGIC.len())? != MAGIC {
        return Err(DecodeError::BadMagic);
    }
    let version = r.u8()?;
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let sender = r.prefix()?;
    let destination = match r.u8()? {
        0 => None,
        1 => Some(r.prefix()?),
        _ => return Err(DecodeError::InvalidValue("destination flag")),
    };
    let count = r.u16()?;
    let mut submessages = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let tag = r.u8()?;
        let body = r.bytes()?;
        if let Some(sub) = decode_submessage(tag, body)? {
            submessages.push(sub);
        }
    }
    Ok(Message {
        sender,
        destination,
        submessages,
    })
}

/// Encoded size of a DATA submessage header (without payload), used to
/// size fragments.
pub const DATA_HEADER_SIZE: usize = 1 + 4 + 4 + 4 + 8 + 1 + 16 + 8 + 4;
