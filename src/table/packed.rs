//! The semi-sorted bucket layout.
//!
//! Each four-way bucket stores the sorted low nibbles of its fingerprints as
//! a 12-bit permutation codeword followed by the remaining high bits of each
//! fingerprint, `(f - 1) * 4` bits per bucket in total. Because writes always
//! sort by low nibble and reads decode into that same order, slot positions
//! are not stable across writes but tag-by-value operations stay correct.

use crate::perm_encoding::{perm_encoding, TAGS_PER_BUCKET};
use crate::table::{read_u32_le, DecodeError, InsertOutcome, TABLE_TYPE_PACKED};
use rand::Rng;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use std::fmt;

/// Bits of a fingerprint that take part in permutation encoding.
const LOW_BITS: usize = 4;

/// Bits of a codeword.
const CODEWORD_BITS: usize = 12;

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub(crate) struct PackedTable {
    fingerprint_bit_count: usize,
    dir_bits_per_tag: usize,
    bits_per_bucket: usize,
    dir_bits_mask: u32,
    num_buckets: u64,
    buckets: Vec<u8>,
}

impl PackedTable {
    pub(crate) fn new(fingerprint_bit_count: usize, num_buckets: u64) -> Self {
        let len = Self::storage_len(fingerprint_bit_count, num_buckets);
        PackedTable {
            fingerprint_bit_count,
            dir_bits_per_tag: fingerprint_bit_count - LOW_BITS,
            bits_per_bucket: (fingerprint_bit_count - 1) * TAGS_PER_BUCKET,
            dir_bits_mask: (((1u64 << (fingerprint_bit_count - LOW_BITS)) - 1) as u32) << LOW_BITS,
            num_buckets,
            buckets: vec![0; len],
        }
    }

    fn from_parts(
        fingerprint_bit_count: usize,
        num_buckets: u64,
        buckets: Vec<u8>,
    ) -> Result<Self, DecodeError> {
        if fingerprint_bit_count <= LOW_BITS || fingerprint_bit_count > 32 {
            return Err(DecodeError::BucketsLengthMismatch);
        }
        if buckets.len() != Self::storage_len(fingerprint_bit_count, num_buckets) {
            return Err(DecodeError::BucketsLengthMismatch);
        }
        Ok(PackedTable {
            fingerprint_bit_count,
            dir_bits_per_tag: fingerprint_bit_count - LOW_BITS,
            bits_per_bucket: (fingerprint_bit_count - 1) * TAGS_PER_BUCKET,
            dir_bits_mask: (((1u64 << (fingerprint_bit_count - LOW_BITS)) - 1) as u32) << LOW_BITS,
            num_buckets,
            buckets,
        })
    }

    fn storage_len(fingerprint_bit_count: usize, num_buckets: u64) -> usize {
        let bits = ((fingerprint_bit_count - 1) * TAGS_PER_BUCKET) as u64 * num_buckets;
        // seven slack bytes so word-sized bucket reads stay in bounds
        ((bits + 7) >> 3) as usize + 7
    }

    pub(crate) fn num_buckets(&self) -> u64 {
        self.num_buckets
    }

    pub(crate) fn size_in_tags(&self) -> u64 {
        TAGS_PER_BUCKET as u64 * self.num_buckets
    }

    pub(crate) fn size_in_bytes(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn fingerprint_bit_count(&self) -> usize {
        self.fingerprint_bit_count
    }

    pub(crate) fn raw_bytes(&self) -> &[u8] {
        &self.buckets
    }

    fn load_u32(&self, pos: usize) -> u32 {
        u32::from(self.buckets[pos])
            | u32::from(self.buckets[pos + 1]) << 8
            | u32::from(self.buckets[pos + 2]) << 16
            | u32::from(self.buckets[pos + 3]) << 24
    }

    fn load_u64(&self, pos: usize) -> u64 {
        let mut bits = 0;
        for k in 0..8 {
            bits |= u64::from(self.buckets[pos + k]) << (8 * k);
        }
        bits
    }

    fn store_u32(&mut self, pos: usize, bits: u32) {
        for k in 0..4 {
            self.buckets[pos + k] = (bits >> (8 * k)) as u8;
        }
    }

    fn store_u64(&mut self, pos: usize, bits: u64) {
        for k in 0..8 {
            self.buckets[pos + k] = (bits >> (8 * k)) as u8;
        }
    }

    /// Decodes bucket `i` into its four fingerprints, low nibbles ascending.
    pub(crate) fn read_bucket(&self, i: u64) -> [u32; TAGS_PER_BUCKET] {
        let pos = (i * self.bits_per_bucket as u64 / 8) as usize;
        let mut tags = [0u32; TAGS_PER_BUCKET];
        let codeword;
        match self.fingerprint_bit_count {
            5 => {
                // 1 dir bit per tag, 16 bits per bucket
                let bucket_bits =
                    u16::from(self.buckets[pos]) | u16::from(self.buckets[pos + 1]) << 8;
                codeword = bucket_bits & 0x0fff;
                tags[0] = u32::from(bucket_bits >> 8) & self.dir_bits_mask;
                tags[1] = u32::from(bucket_bits >> 9) & self.dir_bits_mask;
                tags[2] = u32::from(bucket_bits >> 10) & self.dir_bits_mask;
                tags[3] = u32::from(bucket_bits >> 11) & self.dir_bits_mask;
            }
            6 => {
                // 2 dir bits per tag, 20 bits per bucket
                let bucket_bits = self.load_u32(pos);
                let half = (i & 1) as usize * 4;
                codeword = (bucket_bits as u16 >> half) & 0x0fff;
                tags[0] = bucket_bits >> (8 + half) & self.dir_bits_mask;
                tags[1] = bucket_bits >> (10 + half) & self.dir_bits_mask;
                tags[2] = bucket_bits >> (12 + half) & self.dir_bits_mask;
                tags[3] = bucket_bits >> (14 + half) & self.dir_bits_mask;
            }
            7 => {
                // 3 dir bits per tag, 24 bits per bucket
                let bucket_bits = self.load_u32(pos);
                codeword = bucket_bits as u16 & 0x0fff;
                tags[0] = bucket_bits >> 8 & self.dir_bits_mask;
                tags[1] = bucket_bits >> 11 & self.dir_bits_mask;
                tags[2] = bucket_bits >> 14 & self.dir_bits_mask;
                tags[3] = bucket_bits >> 17 & self.dir_bits_mask;
            }
            8 => {
                // 4 dir bits per tag, 28 bits per bucket
                let bucket_bits = self.load_u32(pos);
                let half = (i & 1) as usize * 4;
                codeword = (bucket_bits as u16 >> half) & 0x0fff;
                tags[0] = bucket_bits >> (8 + half) & self.dir_bits_mask;
                tags[1] = bucket_bits >> (12 + half) & self.dir_bits_mask;
                tags[2] = bucket_bits >> (16 + half) & self.dir_bits_mask;
                tags[3] = bucket_bits >> (20 + half) & self.dir_bits_mask;
            }
            9 => {
                // 5 dir bits per tag, 32 bits per bucket
                let bucket_bits = self.load_u32(pos);
                codeword = bucket_bits as u16 & 0x0fff;
                tags[0] = bucket_bits >> 8 & self.dir_bits_mask;
                tags[1] = bucket_bits >> 13 & self.dir_bits_mask;
                tags[2] = bucket_bits >> 18 & self.dir_bits_mask;
                tags[3] = bucket_bits >> 23 & self.dir_bits_mask;
            }
            13 => {
                // 9 dir bits per tag, 48 bits per bucket
                let bucket_bits = self.load_u64(pos);
                codeword = bucket_bits as u16 & 0x0fff;
                tags[0] = (bucket_bits >> 8) as u32 & self.dir_bits_mask;
                tags[1] = (bucket_bits >> 17) as u32 & self.dir_bits_mask;
                tags[2] = (bucket_bits >> 26) as u32 & self.dir_bits_mask;
                tags[3] = (bucket_bits >> 35) as u32 & self.dir_bits_mask;
            }
            17 => {
                // 13 dir bits per tag, 64 bits per bucket
                let bucket_bits = self.load_u64(pos);
                codeword = bucket_bits as u16 & 0x0fff;
                tags[0] = (bucket_bits >> 8) as u32 & self.dir_bits_mask;
                tags[1] = (bucket_bits >> 21) as u32 & self.dir_bits_mask;
                tags[2] = (bucket_bits >> 34) as u32 & self.dir_bits_mask;
                tags[3] = (bucket_bits >> 47) as u32 & self.dir_bits_mask;
            }
            _ => {
                let (u1, u2, r_shift) = self.read_out_bytes(i, pos);
                let aligned = u1 >> r_shift;
                codeword = aligned as u16 & 0x0fff;
                for (k, tag) in tags.iter_mut().enumerate() {
                    let dir_shift = CODEWORD_BITS - LOW_BITS + k * self.dir_bits_per_tag;
                    *tag = aligned.checked_shr(dir_shift as u32).unwrap_or(0) as u32;
                    let shift = dir_shift as i32 - 64 + r_shift as i32;
                    if shift < 0 {
                        *tag |= (u2 << -shift) as u32;
                    } else {
                        *tag |= (u2 >> shift) as u32;
                    }
                    *tag &= self.dir_bits_mask;
                }
            }
        }

        // the codeword is the lowest 12 bits in the bucket
        let low_bits = perm_encoding().decode(codeword);
        for (tag, low) in tags.iter_mut().zip(low_bits.iter()) {
            *tag |= u32::from(*low);
        }
        tags
    }

    fn read_out_bytes(&self, i: u64, pos: usize) -> (u64, u64, usize) {
        let r_shift = ((self.bits_per_bucket as u64 * i) & 7) as usize;
        // a bucket stores at most 31 bits per tag, spanning at most 16 bytes
        let k_bytes = (r_shift + self.bits_per_bucket + 7) / 8;

        let mut u1 = 0u64;
        let mut u2 = 0u64;
        for k in 0..k_bytes {
            if k < 8 {
                u1 |= u64::from(self.buckets[pos + k]) << (8 * k);
            } else {
                u2 |= u64::from(self.buckets[pos + k]) << (8 * (k - 8));
            }
        }
        (u1, u2, r_shift)
    }

    /// Encodes `tags` into bucket `i`, sorting them by low nibble first.
    pub(crate) fn write_bucket(&mut self, i: u64, mut tags: [u32; TAGS_PER_BUCKET]) {
        sort_tags(&mut tags);

        let mut low_bits = [0u8; TAGS_PER_BUCKET];
        let mut high_bits = [0u32; TAGS_PER_BUCKET];
        for k in 0..TAGS_PER_BUCKET {
            low_bits[k] = (tags[k] & 0x0f) as u8;
            high_bits[k] = tags[k] & 0xffff_fff0;
        }

        let codeword = perm_encoding().encode(low_bits);
        let pos = (i * self.bits_per_bucket as u64 / 8) as usize;
        match self.bits_per_bucket {
            16 => {
                // 1 dir bit per tag
                let bits = codeword
                    | (high_bits[0] << 8) as u16
                    | (high_bits[1] << 9) as u16
                    | (high_bits[2] << 10) as u16
                    | (high_bits[3] << 11) as u16;
                self.buckets[pos] = bits as u8;
                self.buckets[pos + 1] = (bits >> 8) as u8;
            }
            20 => {
                // 2 dir bits per tag
                let mut bits = self.load_u32(pos);
                if i & 1 == 0 {
                    bits &= 0xfff0_0000;
                    bits |= u32::from(codeword)
                        | high_bits[0] << 8
                        | high_bits[1] << 10
                        | high_bits[2] << 12
                        | high_bits[3] << 14;
                } else {
                    bits &= 0xff00_000f;
                    bits |= u32::from(codeword) << 4
                        | high_bits[0] << 12
                        | high_bits[1] << 14
                        | high_bits[2] << 16
                        | high_bits[3] << 18;
                }
                self.store_u32(pos, bits);
            }
            24 => {
                // 3 dir bits per tag
                let mut bits = self.load_u32(pos);
                bits &= 0xff00_0000;
                bits |= u32::from(codeword)
                    | high_bits[0] << 8
                    | high_bits[1] << 11
                    | high_bits[2] << 14
                    | high_bits[3] << 17;
                self.store_u32(pos, bits);
            }
            28 => {
                // 4 dir bits per tag
                let mut bits = self.load_u32(pos);
                if i & 1 == 0 {
                    bits &= 0xf000_0000;
                    bits |= u32::from(codeword)
                        | high_bits[0] << 8
                        | high_bits[1] << 12
                        | high_bits[2] << 16
                        | high_bits[3] << 20;
                } else {
                    bits &= 0x0000_000f;
                    bits |= u32::from(codeword) << 4
                        | high_bits[0] << 12
                        | high_bits[1] << 16
                        | high_bits[2] << 20
                        | high_bits[3] << 24;
                }
                self.store_u32(pos, bits);
            }
            32 => {
                // 5 dir bits per tag
                let bits = u32::from(codeword)
                    | high_bits[0] << 8
                    | high_bits[1] << 13
                    | high_bits[2] << 18
                    | high_bits[3] << 23;
                self.store_u32(pos, bits);
            }
            48 => {
                // 9 dir bits per tag
                let mut bits = self.load_u64(pos);
                bits &= 0xffff_0000_0000_0000;
                bits |= u64::from(codeword)
                    | u64::from(high_bits[0]) << 8
                    | u64::from(high_bits[1]) << 17
                    | u64::from(high_bits[2]) << 26
                    | u64::from(high_bits[3]) << 35;
                self.store_u64(pos, bits);
            }
            64 => {
                // 13 dir bits per tag
                let bits = u64::from(codeword)
                    | u64::from(high_bits[0]) << 8
                    | u64::from(high_bits[1]) << 21
                    | u64::from(high_bits[2]) << 34
                    | u64::from(high_bits[3]) << 47;
                self.store_u64(pos, bits);
            }
            _ => self.write_in_bytes(i, pos, codeword, high_bits),
        }
    }

    fn write_in_bytes(
        &mut self,
        i: u64,
        pos: usize,
        codeword: u16,
        high_bits: [u32; TAGS_PER_BUCKET],
    ) {
        let r_shift = ((self.bits_per_bucket as u64 * i) & 7) as usize;
        let l_shift = (r_shift + self.bits_per_bucket) & 7;
        let k_bytes = (r_shift + self.bits_per_bucket + 7) / 8;

        let r_mask = if r_shift == 0 {
            0
        } else {
            0xffu8 >> (8 - r_shift)
        };
        let l_mask = if l_shift == 0 { 0 } else { 0xffu8 << l_shift };

        let mut u1 = u64::from(self.buckets[pos] & r_mask);
        let mut u2 = 0u64;
        let end = k_bytes - 1;
        if k_bytes > 8 {
            u2 |= u64::from(self.buckets[pos + end] & l_mask) << (8 * (end - 8));
        } else {
            u1 |= u64::from(self.buckets[pos + end] & l_mask) << (8 * end);
        }

        u1 |= u64::from(codeword) << r_shift;
        for (k, &high) in high_bits.iter().enumerate() {
            let dir_shift = CODEWORD_BITS - LOW_BITS + k * self.dir_bits_per_tag;
            u1 |= u64::from(high)
                .checked_shl((dir_shift + r_shift) as u32)
                .unwrap_or(0);
            let shift = dir_shift as i32 - 64 + r_shift as i32;
            if shift < 0 {
                u2 |= u64::from(high) >> -shift;
            } else {
                u2 |= u64::from(high) << shift;
            }
        }

        for k in 0..k_bytes {
            if k < 8 {
                self.buckets[pos + k] = (u1 >> (8 * k)) as u8;
            } else {
                self.buckets[pos + k] = (u2 >> (8 * (k - 8))) as u8;
            }
        }
    }

    pub(crate) fn find_tag_in_buckets(&self, i1: u64, i2: u64, tag: u32) -> bool {
        let tags1 = self.read_bucket(i1);
        let tags2 = self.read_bucket(i2);
        tags1.iter().chain(tags2.iter()).any(|&t| t == tag)
    }

    pub(crate) fn delete_tag_from_bucket(&mut self, i: u64, tag: u32) -> bool {
        let mut tags = self.read_bucket(i);
        for j in 0..TAGS_PER_BUCKET {
            if tags[j] == tag {
                tags[j] = 0;
                self.write_bucket(i, tags);
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
        let mut tags = self.read_bucket(i);
        for j in 0..TAGS_PER_BUCKET {
            if tags[j] == 0 {
                tags[j] = tag;
                self.write_bucket(i, tags);
                return InsertOutcome::Stored;
            }
        }
        if kick_out {
            let j = rng.gen_range(0, TAGS_PER_BUCKET);
            let old_tag = tags[j];
            tags[j] = tag;
            self.write_bucket(i, tags);
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

    pub(crate) fn metadata_len() -> usize {
        2 + 4
    }

    pub(crate) fn encode_metadata(&self, buf: &mut Vec<u8>) {
        buf.push(TABLE_TYPE_PACKED);
        buf.push(self.fingerprint_bit_count as u8);
        buf.extend_from_slice(&(self.num_buckets as u32).to_le_bytes());
    }

    pub(crate) fn decode(mut bytes: Vec<u8>) -> Result<Self, DecodeError> {
        let metadata_len = Self::metadata_len();
        if bytes.len() < metadata_len {
            return Err(DecodeError::UnexpectedLength);
        }
        let fingerprint_bit_count = usize::from(bytes[1]);
        let num_buckets = u64::from(read_u32_le(&bytes[2..]));
        bytes.drain(..metadata_len);
        Self::from_parts(fingerprint_bit_count, num_buckets, bytes)
    }
}

/// Orders tags ascending by their low nibble with a fixed three-pass network.
fn sort_tags(tags: &mut [u32; TAGS_PER_BUCKET]) {
    sort_pair(tags, 0, 2);
    sort_pair(tags, 1, 3);
    sort_pair(tags, 0, 1);
    sort_pair(tags, 2, 3);
    sort_pair(tags, 1, 2);
}

fn sort_pair(tags: &mut [u32; TAGS_PER_BUCKET], a: usize, b: usize) {
    if tags[a] & 0x0f > tags[b] & 0x0f {
        tags.swap(a, b);
    }
}

impl fmt::Display for PackedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PackedHashtable with tag size: {} bits \n\
             \t\t4 packed bits(3 bits after compression) and {} direct bits\n\
             \t\tAssociativity: 4 \n\
             \t\tTotal # of rows: {}\n\
             \t\tTotal # slots: {}",
            self.fingerprint_bit_count,
            self.dir_bits_per_tag,
            self.num_buckets,
            self.size_in_tags(),
        )
    }
}
