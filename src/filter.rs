//! The cuckoo filter core.

use crate::hash::HashKind;
use crate::table::{
    read_u32_le, read_u64_le, DecodeError, InsertOutcome, PackedTable, SingleTable, Table,
    TableKind,
};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};

/// Maximum number of displacements before an insertion parks the carried
/// fingerprint in the victim cache.
const MAX_CUCKOO_KICKS: usize = 500;

/// Marker opening the 64-bit-addressed layout. Byte 12 is `!`, which can
/// never collide with a legacy `victim.used` flag of 0 or 1.
const VERSION_MARK: &[u8; 13] = b"IMNOTLEGACY!!";

const LEGACY_METADATA_LEN: usize = 3 * 4 + 1;
const METADATA_LEN: usize = VERSION_MARK.len() + 8 + 8 + 4 + 1;

/// Overflow cell for the last fingerprint that exceeded the displacement
/// budget. At most one victim is ever live, and insertions refuse new work
/// while it is.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
struct VictimCache {
    index: u64,
    tag: u32,
    used: bool,
}

/// A space-efficient probabilistic data structure to test for membership in a
/// set, with support for removing items.
///
/// A cuckoo filter is a cuckoo hash table storing each item's fingerprint.
/// Every fingerprint has two candidate buckets; a full bucket is resolved by
/// displacing an incumbent to its other candidate. Lookups can return false
/// positives but never false negatives for items currently stored.
///
/// Fingerprints live in one of two bucket layouts selected at construction:
/// [`TableKind::Single`] packs them side by side, while [`TableKind::Packed`]
/// additionally permutation-encodes each bucket to save one bit per item.
///
/// # Examples
///
/// ```
/// use cuckoo_filter::{CuckooFilter, TableKind};
///
/// let mut filter = CuckooFilter::new(4, 8, 1000, TableKind::Single);
///
/// assert!(!filter.contains(b"foo"));
/// filter.insert(b"foo");
/// assert!(filter.contains(b"foo"));
///
/// filter.remove(b"foo");
/// assert!(!filter.contains(b"foo"));
///
/// assert_eq!(filter.len(), 0);
/// assert_eq!(filter.capacity(), 2048);
/// assert_eq!(filter.bucket_len(), 512);
/// assert_eq!(filter.fingerprint_bit_count(), 8);
/// ```
#[derive(Clone, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub struct CuckooFilter {
    victim: VictimCache,
    num_items: u64,
    table: Table,
    hash_kind: HashKind,
    #[cfg_attr(
        feature = "serde",
        serde(skip, default = "XorShiftRng::from_entropy")
    )]
    rng: XorShiftRng,
}

impl CuckooFilter {
    /// Constructs a new, empty `CuckooFilter` holding up to `item_count`
    /// items, with `entries_per_bucket` fingerprints of
    /// `fingerprint_bit_count` bits per bucket, stored in a `table_kind`
    /// table.
    ///
    /// The number of buckets is `item_count / entries_per_bucket` rounded up
    /// to the next power of two, doubled once more when the implied load
    /// factor would exceed what the bucket width can sustain (85% for two
    /// entries per bucket, 96% for four, 99% for eight).
    ///
    /// # Panics
    ///
    /// Panics if `item_count` is 0, if `entries_per_bucket` is not 2, 4, or 8,
    /// or if `fingerprint_bit_count` is outside `[2, 32]`. The packed table
    /// additionally requires exactly 4 entries per bucket and at least 5 bits
    /// per fingerprint.
    ///
    /// # Examples
    ///
    /// ```
    /// use cuckoo_filter::{CuckooFilter, TableKind};
    ///
    /// let filter = CuckooFilter::new(4, 9, 1000, TableKind::Packed);
    /// ```
    pub fn new(
        entries_per_bucket: usize,
        fingerprint_bit_count: usize,
        item_count: usize,
        table_kind: TableKind,
    ) -> Self {
        Self::with_hash_kind(
            entries_per_bucket,
            fingerprint_bit_count,
            item_count,
            table_kind,
            HashKind::Current,
        )
    }

    /// Constructs a new, empty `CuckooFilter` using an explicit index and
    /// fingerprint derivation. [`CuckooFilter::new`] uses
    /// [`HashKind::Current`]; build with [`HashKind::Legacy`] to produce
    /// filters interchangeable with readers of the 32-bit-addressed layout.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`CuckooFilter::new`].
    ///
    /// # Examples
    ///
    /// ```
    /// use cuckoo_filter::{CuckooFilter, HashKind, TableKind};
    ///
    /// let filter =
    ///     CuckooFilter::with_hash_kind(4, 8, 1000, TableKind::Single, HashKind::Legacy);
    /// assert_eq!(filter.hash_kind(), HashKind::Legacy);
    /// ```
    pub fn with_hash_kind(
        entries_per_bucket: usize,
        fingerprint_bit_count: usize,
        item_count: usize,
        table_kind: TableKind,
        hash_kind: HashKind,
    ) -> Self {
        Self::with_parts(
            entries_per_bucket,
            fingerprint_bit_count,
            item_count,
            table_kind,
            hash_kind,
            XorShiftRng::from_entropy(),
        )
    }

    /// Constructs a new, empty `CuckooFilter` whose displacement choices are
    /// driven by a generator seeded with `seed`, making insertion order
    /// reproducible across runs.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`CuckooFilter::new`].
    pub fn with_seed(
        entries_per_bucket: usize,
        fingerprint_bit_count: usize,
        item_count: usize,
        table_kind: TableKind,
        seed: u64,
    ) -> Self {
        Self::with_parts(
            entries_per_bucket,
            fingerprint_bit_count,
            item_count,
            table_kind,
            HashKind::Current,
            XorShiftRng::seed_from_u64(seed),
        )
    }

    fn with_parts(
        entries_per_bucket: usize,
        fingerprint_bit_count: usize,
        item_count: usize,
        table_kind: TableKind,
        hash_kind: HashKind,
        rng: XorShiftRng,
    ) -> Self {
        assert!(item_count > 0, "item_count must be at least 1");
        match table_kind {
            TableKind::Single => {
                assert!(
                    entries_per_bucket == 2 || entries_per_bucket == 4 || entries_per_bucket == 8,
                    "entries_per_bucket ({}) must be 2, 4, or 8",
                    entries_per_bucket
                );
                assert!(
                    fingerprint_bit_count >= 2 && fingerprint_bit_count <= 32,
                    "fingerprint_bit_count ({}) must be in [2, 32]",
                    fingerprint_bit_count
                );
            }
            TableKind::Packed => {
                assert!(
                    entries_per_bucket == 4,
                    "the packed table requires 4 entries per bucket"
                );
                assert!(
                    fingerprint_bit_count >= 5 && fingerprint_bit_count <= 32,
                    "fingerprint_bit_count ({}) must be in [5, 32]",
                    fingerprint_bit_count
                );
            }
        }

        let mut num_buckets = ((item_count / entries_per_bucket) as u64).next_power_of_two();
        let load = item_count as f64 / (num_buckets * entries_per_bucket as u64) as f64;
        if load > max_load_factor(entries_per_bucket) {
            num_buckets <<= 1;
        }

        let table = match table_kind {
            TableKind::Single => Table::Single(SingleTable::new(
                entries_per_bucket,
                fingerprint_bit_count,
                num_buckets,
            )),
            TableKind::Packed => {
                Table::Packed(PackedTable::new(fingerprint_bit_count, num_buckets))
            }
        };

        CuckooFilter {
            victim: VictimCache::default(),
            num_items: 0,
            table,
            hash_kind,
            rng,
        }
    }

    fn index_and_tag(&self, item: &[u8]) -> (u64, u32) {
        self.hash_kind.index_and_tag(
            item,
            self.table.num_buckets(),
            self.table.fingerprint_bit_count(),
        )
    }

    fn alt_index(&self, index: u64, tag: u32) -> u64 {
        self.hash_kind.alt_index(index, tag, self.table.num_buckets())
    }

    /// Inserts an item into the filter. Returns `false` when the filter is
    /// full, which happens once a previous insertion has exhausted its
    /// displacement budget and parked its fingerprint in the victim cache.
    ///
    /// An insertion that itself fills the victim cache still returns `true`;
    /// the item is represented and fullness surfaces on the next call.
    ///
    /// # Examples
    ///
    /// ```
    /// use cuckoo_filter::{CuckooFilter, TableKind};
    ///
    /// let mut filter = CuckooFilter::new(4, 8, 1000, TableKind::Single);
    /// assert!(filter.insert(b"foo"));
    /// assert!(filter.contains(b"foo"));
    /// ```
    pub fn insert(&mut self, item: &[u8]) -> bool {
        if self.victim.used {
            return false;
        }
        let (index, tag) = self.index_and_tag(item);
        self.add_impl(index, tag);
        true
    }

    /// Inserts an item unless it is already present. Returns `false` when the
    /// item was found or the filter is full.
    ///
    /// A false positive in the membership probe makes this skip an absent
    /// item, so the filter may under-represent duplicated input streams.
    ///
    /// # Examples
    ///
    /// ```
    /// use cuckoo_filter::{CuckooFilter, TableKind};
    ///
    /// let mut filter = CuckooFilter::new(4, 8, 1000, TableKind::Single);
    /// assert!(filter.insert_unique(b"foo"));
    /// assert!(!filter.insert_unique(b"foo"));
    /// assert_eq!(filter.len(), 1);
    /// ```
    pub fn insert_unique(&mut self, item: &[u8]) -> bool {
        if self.contains(item) {
            return false;
        }
        self.insert(item)
    }

    fn add_impl(&mut self, index: u64, tag: u32) {
        let mut cur_index = index;
        let mut cur_tag = tag;
        for count in 0..MAX_CUCKOO_KICKS {
            let kick_out = count > 0;
            match self
                .table
                .insert_tag(cur_index, cur_tag, kick_out, &mut self.rng)
            {
                InsertOutcome::Stored => {
                    self.num_items += 1;
                    return;
                }
                InsertOutcome::Displaced(old_tag) => cur_tag = old_tag,
                InsertOutcome::Rejected => {}
            }
            cur_index = self.alt_index(cur_index, cur_tag);
        }

        self.victim = VictimCache {
            index: cur_index,
            tag: cur_tag,
            used: true,
        };
    }

    /// Checks whether an item is possibly in the filter. False positives are
    /// possible; false negatives are not, for items currently stored.
    ///
    /// # Examples
    ///
    /// ```
    /// use cuckoo_filter::{CuckooFilter, TableKind};
    ///
    /// let mut filter = CuckooFilter::new(4, 8, 1000, TableKind::Single);
    /// filter.insert(b"foo");
    /// assert!(filter.contains(b"foo"));
    /// ```
    pub fn contains(&self, item: &[u8]) -> bool {
        let (i1, tag) = self.index_and_tag(item);
        let i2 = self.alt_index(i1, tag);
        debug_assert_eq!(self.alt_index(i2, tag), i1);

        let victim_hit = self.victim.used
            && tag == self.victim.tag
            && (i1 == self.victim.index || i2 == self.victim.index);
        victim_hit || self.table.find_tag(i1, i2, tag)
    }

    /// Removes an item from the filter. Returns `false` when the item is not
    /// present.
    ///
    /// Removing an item may free the slot a previously stuck fingerprint was
    /// waiting for, so a successful removal re-inserts the victim cache
    /// entry.
    ///
    /// Only remove items that were actually inserted: removing an item that
    /// merely collides with a stored fingerprint erases someone else's entry.
    ///
    /// # Examples
    ///
    /// ```
    /// use cuckoo_filter::{CuckooFilter, TableKind};
    ///
    /// let mut filter = CuckooFilter::new(4, 8, 1000, TableKind::Single);
    /// filter.insert(b"foo");
    /// assert!(filter.remove(b"foo"));
    /// assert!(!filter.remove(b"foo"));
    /// ```
    pub fn remove(&mut self, item: &[u8]) -> bool {
        let (i1, tag) = self.index_and_tag(item);
        let i2 = self.alt_index(i1, tag);

        if self.table.delete_tag(i1, tag) || self.table.delete_tag(i2, tag) {
            self.num_items -= 1;
            if self.victim.used {
                self.victim.used = false;
                let index = self.victim.index;
                let tag = self.victim.tag;
                self.add_impl(index, tag);
            }
            true
        } else if self.victim.used
            && tag == self.victim.tag
            && (i1 == self.victim.index || i2 == self.victim.index)
        {
            self.victim.used = false;
            true
        } else {
            false
        }
    }

    /// Clears the filter, removing all items.
    ///
    /// # Examples
    ///
    /// ```
    /// use cuckoo_filter::{CuckooFilter, TableKind};
    ///
    /// let mut filter = CuckooFilter::new(4, 8, 1000, TableKind::Single);
    /// filter.insert(b"foo");
    /// filter.clear();
    /// assert!(!filter.contains(b"foo"));
    /// ```
    pub fn clear(&mut self) {
        self.table.clear();
        self.num_items = 0;
        self.victim = VictimCache::default();
    }

    /// Returns the number of items in the filter, the victim cache included.
    pub fn len(&self) -> u64 {
        self.num_items + u64::from(self.victim.used)
    }

    /// Returns `true` if the filter holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the total number of fingerprint slots.
    pub fn capacity(&self) -> u64 {
        self.table.size_in_tags()
    }

    /// Returns the number of buckets.
    pub fn bucket_len(&self) -> u64 {
        self.table.num_buckets()
    }

    /// Returns the number of fingerprint slots per bucket.
    pub fn entries_per_bucket(&self) -> usize {
        self.table.entries_per_bucket()
    }

    /// Returns the configured bits per fingerprint.
    pub fn fingerprint_bit_count(&self) -> usize {
        self.table.fingerprint_bit_count()
    }

    /// Returns the fraction of slots currently occupied.
    pub fn load_factor(&self) -> f64 {
        self.len() as f64 / self.capacity() as f64
    }

    /// Returns the byte size of the bucket region.
    pub fn size_in_bytes(&self) -> usize {
        self.table.size_in_bytes()
    }

    /// Returns the storage cost per stored item in bits. Infinite for an
    /// empty filter.
    pub fn bits_per_item(&self) -> f64 {
        8.0 * self.size_in_bytes() as f64 / self.len() as f64
    }

    /// Returns which bucket layout backs this filter.
    pub fn table_kind(&self) -> TableKind {
        self.table.kind()
    }

    /// Returns which index and fingerprint derivation this filter uses.
    pub fn hash_kind(&self) -> HashKind {
        self.hash_kind
    }

    /// Measures the observed false-positive rate by filling the filter with
    /// sequentially numbered items and probing a disjoint sequence.
    ///
    /// This resets the filter: all previously stored items are lost, and the
    /// filter is empty when the measurement returns.
    pub fn false_positive_rate(&mut self) -> f64 {
        self.clear();
        let n = self.capacity() as u32;
        for i in 0..n {
            self.insert(&i.to_be_bytes());
        }

        let rounds = 100_000u32;
        let mut false_positives = 0u32;
        for i in 0..rounds {
            if self.contains(&(i + n + 1).to_be_bytes()) {
                false_positives += 1;
            }
        }
        self.clear();
        f64::from(false_positives) / f64::from(rounds)
    }

    /// Returns the number of bytes [`encode`](CuckooFilter::encode) will
    /// produce.
    pub fn encoded_len(&self, legacy: bool) -> usize {
        let metadata_len = if legacy {
            LEGACY_METADATA_LEN
        } else {
            METADATA_LEN
        };
        metadata_len + self.table.metadata_len(legacy) + self.table.raw_bytes().len()
    }

    fn header_bytes(&self, legacy: bool) -> Vec<u8> {
        let mut buf = Vec::with_capacity(METADATA_LEN + self.table.metadata_len(legacy));
        if legacy {
            buf.extend_from_slice(&(self.num_items as u32).to_le_bytes());
            buf.extend_from_slice(&(self.victim.index as u32).to_le_bytes());
            buf.extend_from_slice(&self.victim.tag.to_le_bytes());
        } else {
            buf.extend_from_slice(VERSION_MARK);
            buf.extend_from_slice(&self.num_items.to_le_bytes());
            buf.extend_from_slice(&self.victim.index.to_le_bytes());
            buf.extend_from_slice(&self.victim.tag.to_le_bytes());
        }
        buf.push(u8::from(self.victim.used));
        self.table.encode_metadata(&mut buf, legacy);
        buf
    }

    /// Serializes the filter into a byte vector. With `legacy` set the
    /// 32-bit-addressed layout is written, readable by older decoders as long
    /// as the filter's counters fit in 32 bits.
    ///
    /// The legacy layout carries no hash-variant marker, so decoders derive
    /// [`HashKind::Legacy`] from it; write it from filters built with that
    /// kind for the round trip to preserve membership answers.
    ///
    /// The output is deterministic for identical filter state.
    ///
    /// # Examples
    ///
    /// ```
    /// use cuckoo_filter::{CuckooFilter, TableKind};
    ///
    /// let mut filter = CuckooFilter::new(4, 8, 1000, TableKind::Single);
    /// filter.insert(b"foo");
    ///
    /// let bytes = filter.encode(false);
    /// let restored = CuckooFilter::decode(&bytes).unwrap();
    /// assert!(restored.contains(b"foo"));
    /// assert_eq!(restored.encode(false), bytes);
    /// ```
    pub fn encode(&self, legacy: bool) -> Vec<u8> {
        let mut buf = self.header_bytes(legacy);
        buf.reserve_exact(self.table.raw_bytes().len());
        buf.extend_from_slice(self.table.raw_bytes());
        buf
    }

    /// Serializes the filter into `writer` without materializing the blob.
    /// Errors from the sink propagate unchanged.
    pub fn encode_into<W: Write>(&self, writer: &mut W, legacy: bool) -> io::Result<()> {
        writer.write_all(&self.header_bytes(legacy))?;
        writer.write_all(self.table.raw_bytes())
    }

    /// Reconstructs a filter from a copy of `bytes`.
    ///
    /// The layout is detected from byte 12: a value of 0 or 1 can only be a
    /// legacy `victim.used` flag, anything else is the version marker of the
    /// 64-bit-addressed layout. The returned filter hashes with the variant
    /// matching the detected layout.
    ///
    /// # Examples
    ///
    /// ```
    /// use cuckoo_filter::{CuckooFilter, DecodeError};
    ///
    /// assert_eq!(CuckooFilter::decode(&[0; 4]), Err(DecodeError::UnexpectedLength));
    /// ```
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        Self::decode_from(bytes.to_vec())
    }

    /// Reconstructs a filter from `bytes`, taking ownership of the buffer and
    /// reusing its allocation for the bucket region instead of copying it.
    pub fn decode_from(mut bytes: Vec<u8>) -> Result<Self, DecodeError> {
        if bytes.len() < 20 {
            return Err(DecodeError::UnexpectedLength);
        }

        let legacy = bytes[12] <= 1;
        let (num_items, victim, metadata_len) = if legacy {
            let victim = VictimCache {
                index: u64::from(read_u32_le(&bytes[4..])),
                tag: read_u32_le(&bytes[8..]),
                used: bytes[12] == 1,
            };
            (
                u64::from(read_u32_le(&bytes[0..])),
                victim,
                LEGACY_METADATA_LEN,
            )
        } else {
            if bytes.len() < METADATA_LEN {
                return Err(DecodeError::UnexpectedLength);
            }
            let victim = VictimCache {
                index: read_u64_le(&bytes[21..]),
                tag: read_u32_le(&bytes[29..]),
                used: bytes[33] == 1,
            };
            (read_u64_le(&bytes[13..]), victim, METADATA_LEN)
        };

        bytes.drain(..metadata_len);
        let table = Table::decode(bytes, legacy)?;

        Ok(CuckooFilter {
            victim,
            num_items,
            table,
            hash_kind: if legacy {
                HashKind::Legacy
            } else {
                HashKind::Current
            },
            rng: XorShiftRng::from_entropy(),
        })
    }
}

impl PartialEq for CuckooFilter {
    fn eq(&self, other: &CuckooFilter) -> bool {
        self.hash_kind == other.hash_kind
            && self.num_items == other.num_items
            && self.victim == other.victim
            && self.table == other.table
    }
}

impl fmt::Display for CuckooFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CuckooFilter Status:\n\
             \t\t{}\n\
             \t\tKeys stored: {}\n\
             \t\tLoad factor: {}\n\
             \t\tHashtable size: {} KB\n\
             \t\tbit/key:   {}",
            self.table,
            self.len(),
            self.load_factor(),
            self.size_in_bytes() >> 10,
            self.bits_per_item(),
        )
    }
}

fn max_load_factor(entries_per_bucket: usize) -> f64 {
    match entries_per_bucket {
        2 => 0.85,
        4 => 0.96,
        _ => 0.99,
    }
}

#[cfg(test)]
mod tests {
    use super::CuckooFilter;
    use crate::hash::HashKind;
    use crate::table::{DecodeError, TableKind};
    use rand::{RngCore, SeedableRng};
    use rand_xorshift::XorShiftRng;

    fn random_keys(count: usize, seed: u64) -> Vec<[u8; 32]> {
        let mut rng = XorShiftRng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                let mut key = [0; 32];
                rng.fill_bytes(&mut key);
                key
            })
            .collect()
    }

    fn insert_contains_remove(table_kind: TableKind, fingerprint_bit_count: usize) {
        let mut filter = CuckooFilter::with_seed(4, fingerprint_bit_count, 8190, table_kind, 1);
        let mut accepted = Vec::new();
        for key in random_keys(50_000, 42) {
            if filter.insert_unique(&key) {
                accepted.push(key);
            }
        }

        assert_eq!(filter.len(), accepted.len() as u64);
        for key in &accepted {
            assert!(filter.contains(key));
        }

        for key in &accepted {
            assert!(filter.remove(key));
        }
        assert_eq!(filter.len(), 0);
        assert!(filter.is_empty());
    }

    #[test]
    fn test_insert_contains_remove_single() {
        insert_contains_remove(TableKind::Single, 8);
    }

    #[test]
    fn test_insert_contains_remove_packed() {
        insert_contains_remove(TableKind::Packed, 9);
    }

    #[test]
    fn test_new() {
        let filter = CuckooFilter::new(4, 8, 8190, TableKind::Single);
        assert_eq!(filter.len(), 0);
        assert!(filter.is_empty());
        assert_eq!(filter.bucket_len(), 4096);
        assert_eq!(filter.capacity(), 16384);
        assert_eq!(filter.entries_per_bucket(), 4);
        assert_eq!(filter.fingerprint_bit_count(), 8);
        assert_eq!(filter.table_kind(), TableKind::Single);
        assert_eq!(filter.hash_kind(), HashKind::Current);
    }

    #[test]
    fn test_insert_full() {
        let mut filter = CuckooFilter::with_seed(4, 9, 8190, TableKind::Packed, 2);
        let mut accepted = 0u64;
        let mut keys = random_keys(40_000, 7).into_iter();
        loop {
            let key = keys.next().expect("filter never filled up");
            if !filter.insert(&key) {
                break;
            }
            accepted += 1;
        }

        // once the victim cache is occupied every insertion is refused
        assert!(filter.victim.used);
        assert_eq!(filter.len(), accepted);
        assert_eq!(filter.len(), filter.num_items + 1);
        assert!(!filter.insert(b"straggler"));
        assert!(filter.load_factor() > 0.5);
    }

    #[test]
    fn test_remove_rehouses_victim() {
        let mut filter = CuckooFilter::with_seed(4, 9, 8190, TableKind::Packed, 3);
        let keys = random_keys(40_000, 8);
        let mut accepted = Vec::new();
        for key in &keys {
            if !filter.insert(key) {
                break;
            }
            accepted.push(*key);
        }
        assert!(filter.victim.used);

        // freed slots let the stuck fingerprint back into the table
        for key in accepted.drain(..500) {
            assert!(filter.remove(&key));
        }
        assert!(!filter.victim.used);

        let len = filter.len();
        assert!(filter.insert(b"resumed"));
        assert_eq!(filter.len(), len + 1);
        assert!(filter.remove(b"resumed"));

        for key in &accepted {
            assert!(filter.remove(key));
        }
        assert_eq!(filter.len(), 0);
    }

    #[test]
    fn test_remove_absent() {
        let mut filter = CuckooFilter::new(4, 8, 1000, TableKind::Single);
        assert!(!filter.remove(b"foo"));
        filter.insert(b"foo");
        assert!(filter.remove(b"foo"));
        assert_eq!(filter.len(), 0);
    }

    #[test]
    fn test_clear() {
        let mut filter = CuckooFilter::new(4, 8, 1000, TableKind::Single);
        filter.insert(b"foo");
        filter.insert(b"bar");
        filter.clear();
        assert!(filter.is_empty());
        assert!(!filter.contains(b"foo"));
        assert!(!filter.contains(b"bar"));
    }

    #[test]
    fn test_false_positive_rate() {
        let mut filter = CuckooFilter::with_seed(2, 2, 100, TableKind::Single, 4);
        let rate = filter.false_positive_rate();
        assert!(rate >= 0.0 && rate <= 1.0);
        assert_eq!(filter.len(), 0);

        let mut filter = CuckooFilter::with_seed(4, 16, 8190, TableKind::Single, 5);
        assert!(filter.false_positive_rate() < 0.01);
    }

    fn round_trip(filter: &CuckooFilter, legacy: bool) {
        let bytes = filter.encode(legacy);
        assert_eq!(bytes.len(), filter.encoded_len(legacy));

        let decoded = CuckooFilter::decode(&bytes).expect("decode failed");
        assert_eq!(decoded, *filter);
        assert_eq!(decoded.encode(legacy), bytes);

        let from_owned = CuckooFilter::decode_from(bytes.clone()).expect("decode_from failed");
        assert_eq!(from_owned, *filter);

        // decoded filters answer probes exactly like the original
        for key in random_keys(1000, 21) {
            assert_eq!(decoded.contains(&key), filter.contains(&key));
        }
    }

    #[test]
    fn test_round_trip() {
        for &table_kind in &[TableKind::Single, TableKind::Packed] {
            let mut filter = CuckooFilter::with_seed(4, 9, 500, table_kind, 6);
            for key in random_keys(400, 20) {
                filter.insert(&key);
            }
            round_trip(&filter, false);
        }
    }

    #[test]
    fn test_round_trip_legacy() {
        for &table_kind in &[TableKind::Single, TableKind::Packed] {
            let mut filter =
                CuckooFilter::with_hash_kind(4, 9, 500, table_kind, HashKind::Legacy);
            for key in random_keys(400, 22) {
                filter.insert(&key);
            }
            let bytes = filter.encode(true);
            assert_ne!(&bytes[..13], &b"IMNOTLEGACY!!"[..]);
            round_trip(&filter, true);
        }
    }

    #[test]
    fn test_encode_into_matches_encode() {
        let mut filter = CuckooFilter::with_seed(4, 8, 500, TableKind::Single, 9);
        for key in random_keys(300, 23) {
            filter.insert(&key);
        }
        for &legacy in &[false, true] {
            let mut streamed = Vec::new();
            filter
                .encode_into(&mut streamed, legacy)
                .expect("writing to a vec cannot fail");
            assert_eq!(streamed, filter.encode(legacy));
        }
    }

    #[test]
    fn test_round_trip_with_victim() {
        let mut filter = CuckooFilter::with_seed(4, 9, 8190, TableKind::Packed, 10);
        for key in random_keys(40_000, 24) {
            if !filter.insert(&key) {
                break;
            }
        }
        assert!(filter.victim.used);
        round_trip(&filter, false);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            CuckooFilter::decode(&[0; 19]),
            Err(DecodeError::UnexpectedLength)
        );

        let filter = CuckooFilter::new(4, 8, 100, TableKind::Single);
        let bytes = filter.encode(false);

        let mut truncated = bytes.clone();
        truncated.truncate(bytes.len() - 1);
        assert_eq!(
            CuckooFilter::decode(&truncated),
            Err(DecodeError::BucketsLengthMismatch)
        );

        let mut padded = bytes;
        padded.push(0);
        assert_eq!(
            CuckooFilter::decode(&padded),
            Err(DecodeError::BucketsLengthMismatch)
        );
    }

    #[test]
    fn test_display() {
        let mut filter = CuckooFilter::new(4, 8, 1000, TableKind::Single);
        filter.insert(b"foo");
        let info = filter.to_string();
        assert!(info.contains("CuckooFilter Status:"));
        assert!(info.contains("Keys stored: 1"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_ser_de() {
        let mut filter = CuckooFilter::with_seed(4, 8, 500, TableKind::Single, 11);
        filter.insert(b"foo");

        let serialized_filter = bincode::serialize(&filter).unwrap();
        let de_filter: CuckooFilter = bincode::deserialize(&serialized_filter).unwrap();

        assert!(de_filter.contains(b"foo"));
        assert_eq!(de_filter, filter);
    }
}
