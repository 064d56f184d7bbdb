// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Protocol messages exchanged between participants.
//!
//! The message intents follow RTPS (DATA, DATA_FRAG, HEARTBEAT, ACKNACK,
//! GAP) but the byte layout is this crate's own compact little-endian
//! framing, see [`codec`].
//!
//! ```text
//! Message
//! +-- sender: GuidPrefix
//! +-- destination: Option<GuidPrefix>
//! +-- submessages: [Data | DataFrag | Heartbeat | AckNack | Gap]*
//! ```

/// Binary encoding of messages and cursor helpers.
pub mod codec;

pub use codec::{decode_message, encode_message, ByteReader, ByteWriter, DecodeError};

use crate::core::guid::{EntityId, GuidPrefix, InstanceHandle};
use crate::reliability::ChangeKind;

/// Sequence number type. Valid sequence numbers start at 1.
pub type SequenceNumber = u64;

pub const MAX_BITMAP_BITS: u32 = 256;
const WORD_BITS: u32 = 32;
const BITMAP_WORDS: usize = 8;

/// SequenceNumberSet representation used by GAP/ACKNACK submessages.
///
/// Holds up to 256 sequence numbers in `[base, base + 256)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceNumberSet {
    base: SequenceNumber,
    num_bits: u32,
    bitmap: [u32; BITMAP_WORDS],
}

impl SequenceNumberSet {
    /// Maximum number of bitmap bits (RTPS limit).
    pub const MAX_BITS: u32 = MAX_BITMAP_BITS;

    /// Create an empty set with the provided base sequence number.
    pub fn empty(base: SequenceNumber) -> Self {
        Self {
            base,
            num_bits: 0,
            bitmap: [0; BITMAP_WORDS],
        }
    }

    /// Create from explicit sequence numbers; values outside
    /// `[base, base + 256)` are ignored.
    pub fn from_sequences(base: SequenceNumber, sequences: &[SequenceNumber]) -> Self {
        let mut set = Self::empty(base);
        for &seq in sequences {
            set.insert(seq);
        }
        set
    }

    /// Insert `seq`; returns false if it does not fit the window.
    pub fn insert(&mut self, seq: SequenceNumber) -> bool {
        if seq < self.base {
            return false;
        }
        let offset = seq - self.base;
        if offset >= u64::from(MAX_BITMAP_BITS) {
            return false;
        }
        let offset = offset as u32;
        let word = (offset / WORD_BITS) as usize;
        let bit = offset % WORD_BITS;
        self.bitmap[word] |= 1 << (31 - bit);
        self.num_bits = self.num_bits.max(offset + 1);
        true
    }

    pub fn base(&self) -> SequenceNumber {
        self.base
    }

    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn contains(&self, seq: SequenceNumber) -> bool {
        self.iter().any(|s| s == seq)
    }

    pub fn iter(&self) -> SequenceNumberIter {
        SequenceNumberIter {
            base: self.base,
            num_bits: self.num_bits,
            bitmap: self.bitmap,
            index: 0,
        }
    }

    pub(crate) fn words(&self) -> &[u32] {
        let used = self.num_bits.div_ceil(WORD_BITS) as usize;
        &self.bitmap[..used]
    }

    pub(crate) fn from_words(base: SequenceNumber, num_bits: u32, words: &[u32]) -> Option<Self> {
        if num_bits > MAX_BITMAP_BITS || words.len() != num_bits.div_ceil(WORD_BITS) as usize {
            return None;
        }
        let mut bitmap = [0u32; BITMAP_WORDS];
        bitmap[..words.len()].copy_from_slice(words);
        Some(Self {
            base,
            num_bits,
            bitmap,
        })
    }
}

/// Iterator over sequences contained in a `SequenceNumberSet`.
#[derive(Clone)]
pub struct SequenceNumberIter {
    base: SequenceNumber,
    num_bits: u32,
    bitmap: [u32; BITMAP_WORDS],
    index: u32,
}

impl Iterator for SequenceNumberIter {
    type Item = SequenceNumber;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.num_bits {
            let offset = self.index;
            let word = (offset / WORD_BITS) as usize;
            let bit = offset % WORD_BITS;
            let mask = 1u32 << (31 - bit);
            self.index += 1;
            if self.bitmap[word] & mask != 0 {
                return Some(self.base + u64::from(offset));
            }
        }
        None
    }
}

impl IntoIterator for &SequenceNumberSet {
    type Item = SequenceNumber;
    type IntoIter = SequenceNumberIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One complete serialized sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSubmessage {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    pub seq: SequenceNumber,
    pub kind: ChangeKind,
    pub instance: InstanceHandle,
    /// Nanoseconds since the UNIX epoch.
    pub source_timestamp: u64,
    pub payload: Vec<u8>,
}

/// One or more fragments of a sample too large for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFragSubmessage {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    pub seq: SequenceNumber,
    pub kind: ChangeKind,
    pub instance: InstanceHandle,
    pub source_timestamp: u64,
    /// 1-based number of the first fragment carried.
    pub fragment_start: u32,
    pub fragments_in_submessage: u16,
    pub fragment_size: u16,
    pub sample_size: u32,
    pub payload: Vec<u8>,
}

/// Writer announcement of the available sequence range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatSubmessage {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    pub first_seq: SequenceNumber,
    pub last_seq: SequenceNumber,
    pub count: u32,
    /// Reader need not answer when it misses nothing.
    pub final_flag: bool,
    /// Carries a MANUAL_BY_TOPIC liveliness assertion.
    pub liveliness_flag: bool,
}

/// Reader acknowledgment: everything below `state.base()` is acknowledged,
/// sequence numbers in `state` are requested again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckNackSubmessage {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    pub state: SequenceNumberSet,
    pub count: u32,
    pub final_flag: bool,
}

/// Writer notice that `[gap_start, gap_list.base())` and every member of
/// `gap_list` are irrelevant to the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapSubmessage {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    pub gap_start: SequenceNumber,
    pub gap_list: SequenceNumberSet,
}

impl GapSubmessage {
    /// All sequence numbers declared irrelevant.
    pub fn sequences(&self) -> impl Iterator<Item = SequenceNumber> + '_ {
        (self.gap_start..self.gap_list.base()).chain(self.gap_list.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submessage {
    Data(DataSubmessage),
    DataFrag(DataFragSubmessage),
    Heartbeat(HeartbeatSubmessage),
    AckNack(AckNackSubmessage),
    Gap(GapSubmessage),
}

impl Submessage {
    /// Entity id of the writer the submessage is about.
    pub fn writer_id(&self) -> EntityId {
        match self {
            Submessage::Data(d) => d.writer_id,
            Submessage::DataFrag(d) => d.writer_id,
            Submessage::Heartbeat(h) => h.writer_id,
            Submessage::AckNack(a) => a.writer_id,
            Submessage::Gap(g) => g.writer_id,
        }
    }

    /// Entity id of the reader the submessage is about.
    pub fn reader_id(&self) -> EntityId {
        match self {
            Submessage::Data(d) => d.reader_id,
            Submessage::DataFrag(d) => d.reader_id,
            Submessage::Heartbeat(h) => h.reader_id,
            Submessage::AckNack(a) => a.reader_id,
            Submessage::Gap(g) => g.reader_id,
        }
    }
}

/// A message: sender prefix, optional destination, submessages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: GuidPrefix,
    pub destination: Option<GuidPrefix>,
    pub submessages: Vec<Submessage>,
}

impl Message {
    pub fn new(sender: GuidPrefix, destination: Option<GuidPrefix>) -> Self {
        Self {
            sender,
            destination,
            submessages: Vec::new(),
        }
    }

    pub fn with(mut self, sub: Submessage) -> Self {
        self.submessages.push(sub);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seqset_window() {
        let mut set = SequenceNumberSet::empty(10);
        assert!(set.is_empty());
        assert!(set.insert(10));
        assert!(set.insert(42));
        assert!(!set.insert(9));
        assert!(!set.insert(10 + 256));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![10, 42]);
        assert_eq!(set.num_bits(), 33);
        assert!(set.contains(42));
    }

    #[test]
    fn test_seqset_words_roundtrip() {
        let set = SequenceNumberSet::from_sequences(100, &[100, 131, 200]);
        let rebuilt =
            SequenceNumberSet::from_words(set.base(), set.num_bits(), set.words()).expect("valid");
        assert_eq!(rebuilt, set);
        assert!(SequenceNumberSet::from_words(1, 300, &[0; 10]).is_none());
    }

    #[test]
    fn test_gap_sequences() {
        let gap = GapSubmessage {
            reader_id: EntityId::UNKNOWN,
            writer_id: EntityId::UNKNOWN,
            gap_start: 3,
            gap_list: SequenceNumberSet::from_sequences(6, &[8]),
        };
        assert_eq!(gap.sequences().collect::<Vec<_>>(), vec![3, 4, 5, 8]);
    }
}
