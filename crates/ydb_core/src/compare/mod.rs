//! Key comparison.
//!
//! Everything here is pure: collations order strings, the text functions
//! reconcile pad and prefix semantics on top of a collation, and
//! [`KeyDef`] orders multi-segment index keys. The tree only ever sees the
//! resulting [`CompareFn`].

mod bits;
mod collation;
mod key_length;
mod segment;
mod text;

pub use bits::{clr_rec_bits, get_rec_bits, set_rec_bits};
pub use collation::{AsciiCaseInsensitive, BinaryCollation, Collation, PadAttribute, Utf8Binary};
pub use key_length::{
    get_key_length, get_key_length_rdonly, get_key_pack_length, size_to_store_key_length,
    store_key_length, MAX_KEY_LENGTH, MAX_KEY_SEGMENTS,
};
pub use segment::{KeyCompareMode, KeyDef, KeySegment, KeyType, SegmentFlags};
pub use text::{
    compare_fixed, compare_varying, compare_word, compare_word_or_prefix, compare_word_prefix,
};

use std::cmp::Ordering;
use std::sync::Arc;

/// A three-way ordering over keys or values, installed on a tree.
pub type CompareFn = Arc<dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync>;

/// Bytewise order; a proper prefix sorts first.
#[must_use]
pub fn default_compare() -> CompareFn {
    Arc::new(|a: &[u8], b: &[u8]| a.cmp(b))
}
