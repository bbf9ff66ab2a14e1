//! Bucket storage back-ends.
//!
//! Both back-ends pack fingerprints into one flat byte region with explicit
//! offset math and share a common operation set; the filter core dispatches
//! on a closed enum instead of a trait object.

mod packed;
mod single;

pub(crate) use self::packed::PackedTable;
pub(crate) use self::single::SingleTable;

use rand::Rng;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

pub(crate) const TABLE_TYPE_SINGLE: u8 = 0;
pub(crate) const TABLE_TYPE_PACKED: u8 = 1;

/// The bucket layout backing a [`CuckooFilter`](crate::CuckooFilter).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub enum TableKind {
    /// Fingerprints stored side by side, `b * f` bits per bucket.
    Single,
    /// Four-way buckets whose low nibbles are permutation-encoded, saving one
    /// bit per fingerprint. Requires four entries per bucket and fingerprints
    /// of at least five bits.
    Packed,
}

/// The error returned when a filter cannot be reconstructed from bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecodeError {
    /// The byte slice is shorter than the filter metadata.
    UnexpectedLength,
    /// The table body disagrees with the geometry recorded next to it.
    BucketsLengthMismatch,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnexpectedLength => write!(f, "unexpected bytes length"),
            DecodeError::BucketsLengthMismatch => {
                write!(f, "buckets length or size hint mismatch")
            }
        }
    }
}

impl Error for DecodeError {}

/// Outcome of offering a tag to a bucket.
pub(crate) enum InsertOutcome {
    /// The tag was written into a free slot.
    Stored,
    /// The bucket was full; the tag replaced a randomly chosen occupant,
    /// which now needs a new home.
    Displaced(u32),
    /// The bucket was full and displacement was not requested.
    Rejected,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub(crate) enum Table {
    Single(SingleTable),
    Packed(PackedTable),
}

impl Table {
    pub(crate) fn kind(&self) -> TableKind {
        match self {
            Table::Single(_) => TableKind::Single,
            Table::Packed(_) => TableKind::Packed,
        }
    }

    pub(crate) fn num_buckets(&self) -> u64 {
        match self {
            Table::Single(table) => table.num_buckets(),
            Table::Packed(table) => table.num_buckets(),
        }
    }

    pub(crate) fn size_in_tags(&self) -> u64 {
        match self {
            Table::Single(table) => table.size_in_tags(),
            Table::Packed(table) => table.size_in_tags(),
        }
    }

    pub(crate) fn size_in_bytes(&self) -> usize {
        match self {
            Table::Single(table) => table.size_in_bytes(),
            Table::Packed(table) => table.size_in_bytes(),
        }
    }

    pub(crate) fn fingerprint_bit_count(&self) -> usize {
        match self {
            Table::Single(table) => table.fingerprint_bit_count(),
            Table::Packed(table) => table.fingerprint_bit_count(),
        }
    }

    pub(crate) fn entries_per_bucket(&self) -> usize {
        match self {
            Table::Single(table) => table.entries_per_bucket(),
            Table::Packed(_) => crate::perm_encoding::TAGS_PER_BUCKET,
        }
    }

    pub(crate) fn find_tag(&self, i1: u64, i2: u64, tag: u32) -> bool {
        match self {
            Table::Single(table) => table.find_tag_in_buckets(i1, i2, tag),
            Table::Packed(table) => table.find_tag_in_buckets(i1, i2, tag),
        }
    }

    pub(crate) fn delete_tag(&mut self, i: u64, tag: u32) -> bool {
        match self {
            Table::Single(table) => table.delete_tag_from_bucket(i, tag),
            Table::Packed(table) => table.delete_tag_from_bucket(i, tag),
        }
    }

    pub(crate) fn insert_tag<R: Rng>(
        &mut self,
        i: u64,
        tag: u32,
        kick_out: bool,
        rng: &mut R,
    ) -> InsertOutcome {
        match self {
            Table::Single(table) => table.insert_tag_to_bucket(i, tag, kick_out, rng),
            Table::Packed(table) => table.insert_tag_to_bucket(i, tag, kick_out, rng),
        }
    }

    pub(crate) fn clear(&mut self) {
        match self {
            Table::Single(table) => table.clear(),
            Table::Packed(table) => table.clear(),
        }
    }

    /// The raw bucket region, trailing slack included. This is the table body
    /// of the wire format.
    pub(crate) fn raw_bytes(&self) -> &[u8] {
        match self {
            Table::Single(table) => table.raw_bytes(),
            Table::Packed(table) => table.raw_bytes(),
        }
    }

    pub(crate) fn metadata_len(&self, legacy: bool) -> usize {
        match self {
            Table::Single(_) => SingleTable::metadata_len(legacy),
            Table::Packed(_) => PackedTable::metadata_len(),
        }
    }

    pub(crate) fn encode_metadata(&self, buf: &mut Vec<u8>, legacy: bool) {
        match self {
            Table::Single(table) => table.encode_metadata(buf, legacy),
            Table::Packed(table) => table.encode_metadata(buf),
        }
    }

    /// Rebuilds a table from a serialized body: one type byte, the geometry
    /// metadata, then the raw bucket region. Any type byte other than the
    /// packed marker selects the single table.
    pub(crate) fn decode(bytes: Vec<u8>, legacy: bool) -> Result<Self, DecodeError> {
        match bytes.first() {
            None => Err(DecodeError::UnexpectedLength),
            Some(&TABLE_TYPE_PACKED) => PackedTable::decode(bytes).map(Table::Packed),
            Some(_) => SingleTable::decode(bytes, legacy).map(Table::Single),
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Table::Single(table) => table.fmt(f),
            Table::Packed(table) => table.fmt(f),
        }
    }
}

pub(crate) fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

pub(crate) fn read_u64_le(bytes: &[u8]) -> u64 {
    u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}
