//! # cuckoo-filter
//!
//! `cuckoo-filter` is a cuckoo filter over raw byte keys: a space-efficient
//! probabilistic data structure for testing set membership that, unlike a
//! Bloom filter, also supports removing items. Lookups can return false
//! positives at a tunable rate, but never false negatives for items currently
//! stored.
//!
//! Fingerprints are bit-packed into one of two bucket layouts: a naive table
//! that stores them side by side, and a packed table that keeps each
//! four-way bucket semi-sorted and permutation-encodes the low nibbles to
//! save one bit per item. Filters serialize to a deterministic little-endian
//! wire format that round-trips both the current 64-bit-addressed layout and
//! the legacy 32-bit-addressed one.
//!
//! ## Usage
//!
//! ```
//! use cuckoo_filter::{CuckooFilter, TableKind};
//!
//! let mut filter = CuckooFilter::new(4, 8, 1000, TableKind::Single);
//!
//! filter.insert(b"foo");
//! assert!(filter.contains(b"foo"));
//!
//! let bytes = filter.encode(false);
//! let restored = CuckooFilter::decode(&bytes).unwrap();
//! assert!(restored.contains(b"foo"));
//!
//! filter.remove(b"foo");
//! assert!(!filter.contains(b"foo"));
//! ```
//!
//! ## References
//!
//!  - [Cuckoo Filter: Practically Better Than Bloom](https://dl.acm.org/citation.cfm?id=2674994)
//!  > Fan, Bin, Dave G. Andersen, Michael Kaminsky, and Michael D. Mitzenmacher. 2014. “Cuckoo Filter: Practically Better Than Bloom.” In *Proceedings of the 10th Acm International on Conference on Emerging Networking Experiments and Technologies*, 75–88. CoNEXT ’14. New York, NY, USA: ACM. doi:[10.1145/2674005.2674994](https://doi.org/10.1145/2674005.2674994).

#![warn(missing_docs)]

mod filter;
mod hash;
mod perm_encoding;
mod table;

pub use crate::filter::CuckooFilter;
pub use crate::hash::HashKind;
pub use crate::table::{DecodeError, TableKind};
