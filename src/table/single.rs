//! The naive bucket layout: fingerprints packed side by side.

use crate::table::{read_u32_le, read_u64_le, DecodeError, InsertOutcome, TABLE_TYPE_SINGLE};
use rand::Rng;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use std::fmt;

/// Bit-packed bucket storage where slot `(i, j)` occupies `f` bits starting
/// at bit offset `(i * b + j) * f`.
///
/// The hot fingerprint widths have closed-form byte accesses; every other
/// width in `[2, 32]` goes through a generic path that shifts and masks a
/// little-endian word. Seven slack bytes are kept past the last bucket so
/// word-sized reads near the end stay in bounds.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub(crate) struct SingleTable {
    tags_per_bucket: usize,
    fingerprint_bit_count: usize,
    num_buckets: u64,
    tag_mask: u32,
    buckets: Vec<u8>,
}

impl SingleTable {
    pub(crate) fn new(
        tags_per_bucket: usize,
        fingerprint_bit_count: usize,
        num_buckets: u64,
    ) -> Self {
        let len = Self::storage_len(tags_per_bucket, fingerprint_bit_count, num_buckets);
        SingleTable {
            tags_per_bucket,
            fingerprint_bit_count,
            num_buckets,
            tag_mask: ((1u64 << fingerprint_bit_count) - 1) as u32,
            buckets: vec![0; len],
        }
    }

    fn from_parts(
        tags_per_bucket: usize,
        fingerprint_bit_count: usize,
        num_buckets: u64,
        buckets: Vec<u8>,
    ) -> Result<Self, DecodeError> {
        if tags_per_bucket == 0 || fingerprint_bit_count < 2 || fingerprint_bit_count > 32 {
            return Err(DecodeError::BucketsLengthMismatch);
        }
        if buckets.len() != Self::storage_len(tags_per_bucket, fingerprint_bit_count, num_buckets)
        {
            return Err(DecodeError::BucketsLengthMismatch);
        }
        Ok(SingleTable {
            tags_per_bucket,
            fingerprint_bit_count,
            num_buckets,
            tag_mask: ((1u64 << fingerprint_bit_count) - 1) as u32,
            buckets,
        })
    }

    fn storage_len(
        tags_per_bucket: usize,
        fingerprint_bit_count: usize,
        num_buckets: u64,
    ) -> usize {
        let bits = (fingerprint_bit_count * tags_per_bucket) as u64 * num_buckets;
        // seven slack bytes so reads past the last bucket stay in bounds
        ((bits + 7) >> 3) as usize + 7
    }

    pub(crate) fn num_buckets(&self) -> u64 {
        self.num_buckets
    }

    pub(crate) fn size_in_tags(&self) -> u64 {
        self.tags_per_bucket as u64 * self.num_buckets
    }

    pub(crate) fn size_in_bytes(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn fingerprint_bit_count(&self) -> usize {
        self.fingerprint_bit_count
    }

    pub(crate) fn entries_per_bucket(&self) -> usize {
        self.tags_per_bucket
    }

    pub(crate) fn raw_bytes(&self) -> &[u8] {
        &self.buckets
    }

    fn bit_pos(&self, i: u64, j: usize) -> u64 {
        i * (self.fingerprint_bit_count * self.tags_per_bucket) as u64
            + (self.fingerprint_bit_count * j) as u64
    }

    pub(crate) fn read_tag(&self, i: u64, j: usize) -> u32 {
        let bit_pos = self.bit_pos(i, j);
        let pos = (bit_pos / 8) as usize;
        let tag = match self.fingerprint_bit_count {
            2 => {
                let shift = ((i * self.tags_per_bucket as u64 + j as u64) & 3) * 2;
                u32::from(self.buckets[pos]) >> shift
            }
            4 => u32::from(self.buckets[pos]) >> ((j & 1) << 2),
            8 => u32::from(self.buckets[pos]),
            12 => {
                (u32::from(self.buckets[pos]) | u32::from(self.buckets[pos + 1]) << 8)
                    >> ((j & 1) << 2)
            }
            16 => u32::from(self.buckets[pos]) | u32::from(self.buckets[pos + 1]) << 8,
            32 => {
                u32::from(self.buckets[pos])
                    | u32::from(self.buckets[pos + 1]) << 8
                    | u32::from(self.buckets[pos + 2]) << 16
                    | u32::from(self.buckets[pos + 3]) << 24
            }
            _ => self.read_out_bytes(bit_pos, pos),
        };
        tag & self.tag_mask
    }

    fn read_out_bytes(&self, bit_pos: u64, pos: usize) -> u32 {
        let r_shift = (bit_pos & 7) as usize;
        // a tag is at most 32 bits, so it spans at most five bytes
        let k_bytes = (r_shift + self.fingerprint_bit_count + 7) / 8;
        let mut bits = 0u64;
        for k in 0..k_bytes {
            bits |= u64::from(self.buckets[pos + k]) << (8 * k);
        }
        (bits >> r_shift) as u32
    }

    pub(crate) fn write_tag(&mut self, i: u64, j: usize, tag: u32) {
        let bit_pos = self.bit_pos(i, j);
        let pos = (bit_pos / 8) as usize;
        let tag = tag & self.tag_mask;
        match self.fingerprint_bit_count {
            2 => {
                let shift = ((i * self.tags_per_bucket as u64 + j as u64) & 3) * 2;
                self.buckets[pos] &= !(0x03 << shift);
                self.buckets[pos] |= (tag as u8) << shift;
            }
            4 => {
                if j & 1 == 0 {
                    self.buckets[pos] &= 0xf0;
                    self.buckets[pos] |= tag as u8;
                } else {
                    self.buckets[pos] &= 0x0f;
                    self.buckets[pos] |= (tag as u8) << 4;
                }
            }
            8 => self.buckets[pos] = tag as u8,
            12 => {
                let mut bits = u16::from(self.buckets[pos]) | u16::from(self.buckets[pos + 1]) << 8;
                if j & 1 == 0 {
                    bits &= 0xf000;
                    bits |= tag as u16;
                } else {
                    bits &= 0x000f;
                    bits |= (tag as u16) << 4;
                }
                self.buckets[pos] = bits as u8;
                self.buckets[pos + 1] = (bits >> 8) as u8;
            }
            16 => {
                self.buckets[pos] = tag as u8;
                self.buckets[pos + 1] = (tag >> 8) as u8;
            }
            32 => {
                self.buckets[pos] = tag as u8;
                self.buckets[pos + 1] = (tag >> 8) as u8;
                self.buckets[pos + 2] = (tag >> 16) as u8;
                self.buckets[pos + 3] = (tag >> 24) as u8;
            }
            _ => self.write_in_bytes(bit_pos, pos, tag),
        }
    }

    fn write_in_bytes(&mut self, bit_pos: u64, pos: usize, tag: u32) {
        let r_shift = (bit_pos & 7) as usize;
        let l_shift = (r_shift + self.fingerprint_bit_count) & 7;
        let k_bytes = (r_shift + self.fingerprint_bit_count + 7) / 8;

        let r_mask = if r_shift == 0 {
            0
        } else {
            0xffu8 >> (8 - r_shift)
        };
        let l_mask = if l_shift == 0 { 0 } else { 0xffu8 << l_shift };

        let end = k_bytes - 1;
        let mut bits = u64::from(self.buckets[pos] & r_mask);
        bits |= u64::from(self.buckets[pos + end] & l_mask) << (8 * end);
        bits |= u64::from(tag) << r_shift;

        for k in 0..k_bytes {
            self.buckets[pos + k] = (bits >> (8 * k)) as u8;
        }
    }

    pub(crate) fn find_tag_in_buckets(&self, i1: u64, i2: u64, tag: u32) -> bool {
        (0..self.tags_per_bucket)
            .any(|j| self.read_tag(i1, j) == tag || self.read_tag(i2, j) == tag)
    }

    pub(crate) fn delete_tag_from_bucket(&mut self, i: u64, tag: u32) -> bool {
        for j in 0..self.tags_per_bucket {
            if self.read_tag(i, j) == tag {
                self.write_tag(i, j, 0);
                return true;
            }
        }
        false
    }

    pub(crate) fn insert_tag_to_bucket<R: Rng>(
        &mut self,
        i: u64,
        tag: u32,
        kick_out: bool,
        rng: &mut R,
    ) -> InsertOutcome {
        for j in 0..self.tags_per_bucket {
            if self.read_tag(i, j) == 0 {
                self.write_tag(i, j, tag);
                return InsertOutcome::Stored;
            }
        }
        if kick_out {
            let j = rng.gen_range(0, self.tags_per_bucket);
            let old_tag = self.read_tag(i, j);
            self.write_tag(i, j, tag);
            InsertOutcome::Displaced(old_tag)
        } else {
            InsertOutcome::Rejected
        }
    }

    pub(crate) fn clear(&mut self) {
        for byte in &mut self.buckets {
            *byte = 0;
        }
    }

    pub(crate) fn metadata_len(legacy: bool) -> usize {
        if legacy {
            3 + 4
        } else {
            3 + 8
        }
    }

    pub(crate) fn encode_metadata(&self, buf: &mut Vec<u8>, legacy: bool) {
        buf.push(TABLE_TYPE_SINGLE);
        buf.push(self.tags_per_bucket as u8);
        buf.push(self.fingerprint_bit_count as u8);
        if legacy {
            buf.extend_from_slice(&(self.num_buckets as u32).to_le_bytes());
        } else {
            buf.extend_from_slice(&self.num_buckets.to_le_bytes());
        }
    }

    pub(crate) fn decode(mut bytes: Vec<u8>, legacy: bool) -> Result<Self, DecodeError> {
        let metadata_len = Self::metadata_len(legacy);
        if bytes.len() < metadata_len {
            return Err(DecodeError::UnexpectedLength);
        }
        let tags_per_bucket = usize::from(bytes[1]);
        let fingerprint_bit_count = usize::from(bytes[2]);
        let num_buckets = if legacy {
            u64::from(read_u32_le(&bytes[3..]))
        } else {
            read_u64_le(&bytes[3..])
        };
        bytes.drain(..metadata_len);
        Self::from_parts(tags_per_bucket, fingerprint_bit_count, num_buckets, bytes)
    }
}

impl fmt::Display for SingleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SingleHashtable with tag size: {} bits \n\
             \t\tAssociativity: {} \n\
             \t\tTotal # of rows: {}\n\
             \t\tTotal # slots: {}",
            self.fingerprint_bit_count,
            self.tags_per_bucket,
            self.num_buckets,
            self.size_in_tags(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::SingleTable;
    use crate::table::InsertOutcome;
    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;

    fn gen_tag(rng: &mut XorShiftRng, fingerprint_bit_count: usize) -> u32 {
        let mask = ((1u64 << fingerprint_bit_count) - 1) as u32;
        loop {
            let tag = rng.gen::<u32>() & mask;
            if tag != 0 {
                return tag;
            }
        }
    }

    fn test_read_write(tags_per_bucket: usize, fingerprint_bit_count: usize) {
        let num_buckets = 64;
        let mut rng = XorShiftRng::seed_from_u64(0xbeef);
        let mut table = SingleTable::new(tags_per_bucket, fingerprint_bit_count, num_buckets);
        let mut expected = vec![vec![0u32; tags_per_bucket]; num_buckets as usize];

        for i in 0..num_buckets {
            for j in 0..tags_per_bucket {
                let tag = gen_tag(&mut rng, fingerprint_bit_count);
                table.write_tag(i, j, tag);
                expected[i as usize][j] = tag;
            }
        }

        for i in 0..num_buckets {
            for j in 0..tags_per_bucket {
                assert_eq!(
                    table.read_tag(i, j),
                    expected[i as usize][j],
                    "bucket {} slot {} with {} tags of {} bits",
                    i,
                    j,
                    tags_per_bucket,
                    fingerprint_bit_count,
                );
            }
        }
    }

    #[test]
    fn test_read_write_all_widths() {
        for &tags_per_bucket in &[2, 4, 8] {
            for &fingerprint_bit_count in &[2, 3, 4, 5, 7, 8, 12, 13, 16, 17, 23, 31, 32] {
                test_read_write(tags_per_bucket, fingerprint_bit_count);
            }
        }
    }

    #[test]
    fn test_write_preserves_neighbors() {
        let mut table = SingleTable::new(4, 13, 8);
        table.write_tag(2, 1, 0x1abc);
        table.write_tag(2, 2, 0x0555);
        table.write_tag(2, 0, 0x1fff);
        table.write_tag(2, 3, 0x0001);
        assert_eq!(table.read_tag(2, 0), 0x1fff);
        assert_eq!(table.read_tag(2, 1), 0x1abc);
        assert_eq!(table.read_tag(2, 2), 0x0555);
        assert_eq!(table.read_tag(2, 3), 0x0001);
        assert_eq!(table.read_tag(1, 3), 0);
        assert_eq!(table.read_tag(3, 0), 0);
    }

    #[test]
    fn test_find_and_delete() {
        let mut rng = XorShiftRng::seed_from_u64(7);
        let mut table = SingleTable::new(4, 8, 16);
        table.write_tag(3, 2, 0xaa);
        assert!(table.find_tag_in_buckets(3, 5, 0xaa));
        assert!(table.find_tag_in_buckets(5, 3, 0xaa));
        assert!(!table.find_tag_in_buckets(5, 6, 0xaa));
        assert!(!table.find_tag_in_buckets(3, 5, 0xab));

        assert!(!table.delete_tag_from_bucket(5, 0xaa));
        assert!(table.delete_tag_from_bucket(3, 0xaa));
        assert!(!table.find_tag_in_buckets(3, 5, 0xaa));

        // a full bucket rejects without kick-out and displaces with it
        for j in 0..4 {
            table.write_tag(7, j, j as u32 + 1);
        }
        match table.insert_tag_to_bucket(7, 0x55, false, &mut rng) {
            InsertOutcome::Rejected => {}
            _ => panic!("expected rejection"),
        }
        match table.insert_tag_to_bucket(7, 0x55, true, &mut rng) {
            InsertOutcome::Displaced(old_tag) => {
                assert!(old_tag >= 1 && old_tag <= 4);
                assert!(table.find_tag_in_buckets(7, 7, 0x55));
            }
            _ => panic!("expected displacement"),
        }
    }

    #[test]
    fn test_clear() {
        let mut table = SingleTable::new(4, 8, 16);
        table.write_tag(1, 1, 0x42);
        table.clear();
        assert_eq!(table.read_tag(1, 1), 0);
    }
}
