//! Derivation of bucket indexes and fingerprints from raw bytes.

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use siphasher::sip::SipHasher24;
use siphasher::sip128::{Hasher128, SipHasher24 as SipHasher128};
use std::hash::Hasher;

/// Fixed key for the fingerprinting hash so that an encoded filter keeps
/// answering queries after a round trip through another process.
const HASH_SEED: u64 = 1337;

/// Multiplicative constant from MurmurHash2, used to spread the fingerprint
/// over the index space before the alternate-index XOR.
const ALT_CONSTANT_LEGACY: u32 = 0x5bd1_e995;

/// Multiplicative constant from MurmurHash64A.
const ALT_CONSTANT: u64 = 0xc6a4_a793_5bd1_e995;

/// The two index/fingerprint derivations understood by the wire format.
///
/// `Legacy` mirrors filters written in the 32-bit-addressed layout: a 64-bit
/// hash is split into an index half and a fingerprint half, and alternate
/// indexes are computed in 32-bit arithmetic. `Current` derives both halves
/// from a 128-bit hash and can address tables with more than `2^32` buckets.
///
/// Decoding a serialized filter picks the variant matching the detected
/// layout, so old filters keep answering probes the way the library that
/// wrote them did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub enum HashKind {
    /// 64-bit item hash, 32-bit bucket indexes.
    Legacy,
    /// 128-bit item hash, 64-bit bucket indexes.
    Current,
}

impl HashKind {
    /// Hashes `item` into a home bucket index and a non-zero fingerprint.
    ///
    /// `num_buckets` must be a power of two.
    pub(crate) fn index_and_tag(
        self,
        item: &[u8],
        num_buckets: u64,
        fingerprint_bit_count: usize,
    ) -> (u64, u32) {
        match self {
            HashKind::Legacy => {
                let mut hasher = SipHasher24::new_with_keys(HASH_SEED, HASH_SEED);
                hasher.write(item);
                let hash = hasher.finish();
                let index = u64::from((hash >> 32) as u32) & (num_buckets - 1);
                (index, tag_hash(u64::from(hash as u32), fingerprint_bit_count))
            }
            HashKind::Current => {
                let mut hasher = SipHasher128::new_with_keys(HASH_SEED, HASH_SEED);
                hasher.write(item);
                let hash = hasher.finish128();
                let index = hash.h1 & (num_buckets - 1);
                (index, tag_hash(hash.h2, fingerprint_bit_count))
            }
        }
    }

    /// Returns the other bucket a fingerprint may live in.
    ///
    /// The derivation is an XOR with a multiplied fingerprint, so applying it
    /// twice returns the starting index whenever `num_buckets` is a power of
    /// two.
    pub(crate) fn alt_index(self, index: u64, tag: u32, num_buckets: u64) -> u64 {
        match self {
            HashKind::Legacy => {
                u64::from(index as u32 ^ tag.wrapping_mul(ALT_CONSTANT_LEGACY)) & (num_buckets - 1)
            }
            HashKind::Current => {
                (index ^ u64::from(tag).wrapping_mul(ALT_CONSTANT)) & (num_buckets - 1)
            }
        }
    }
}

/// Maps a hash half onto `[1, 2^f - 1]`. Zero is reserved for empty slots, so
/// the modulus is one short of the fingerprint range and the result is shifted
/// up by one.
fn tag_hash(hash: u64, fingerprint_bit_count: usize) -> u32 {
    (hash % ((1u64 << fingerprint_bit_count) - 1) + 1) as u32
}

#[cfg(test)]
mod tests {
    use super::HashKind;
    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;

    #[test]
    fn test_tag_never_zero() {
        for kind in &[HashKind::Legacy, HashKind::Current] {
            for fingerprint_bit_count in &[2, 4, 8, 13, 32] {
                for i in 0u32..1000 {
                    let (_, tag) =
                        kind.index_and_tag(&i.to_le_bytes(), 1 << 16, *fingerprint_bit_count);
                    assert_ne!(tag, 0);
                    assert!(u64::from(tag) < 1 << fingerprint_bit_count);
                }
            }
        }
    }

    #[test]
    fn test_alt_index_involution() {
        let mut rng = XorShiftRng::seed_from_u64(0xcafe);
        for kind in &[HashKind::Legacy, HashKind::Current] {
            for _ in 0..10_000 {
                let num_buckets = 1u64 << rng.gen_range(0, 20);
                let index = rng.gen::<u64>() & (num_buckets - 1);
                let tag = rng.gen_range(1, u32::max_value());
                let alt = kind.alt_index(index, tag, num_buckets);
                assert_eq!(kind.alt_index(alt, tag, num_buckets), index);
            }
        }
    }

    #[test]
    fn test_index_within_table() {
        for kind in &[HashKind::Legacy, HashKind::Current] {
            for i in 0u32..1000 {
                let (index, _) = kind.index_and_tag(&i.to_le_bytes(), 64, 8);
                assert!(index < 64);
            }
        }
    }

    #[test]
    fn test_kinds_disagree() {
        // The two variants are distinct derivations; a blob written by one
        // cannot be probed with the other.
        let disagreements = (0u32..100)
            .filter(|i| {
                HashKind::Legacy.index_and_tag(&i.to_le_bytes(), 1 << 16, 16)
                    != HashKind::Current.index_and_tag(&i.to_le_bytes(), 1 << 16, 16)
            })
            .count();
        assert!(disagreements > 90);
    }
}
