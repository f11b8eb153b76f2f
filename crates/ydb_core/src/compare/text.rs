//! Pad- and prefix-aware string comparison for index keys.
//!
//! `b_is_prefix` means `b` is a prefix key of the column `a` came from, as
//! for an index on the first N characters of a column. Prefix comparisons
//! always use no-pad rules: the prefix has to match the value's leading
//! bytes exactly, embedded trailing spaces included.

use super::collation::Collation;
use std::cmp::Ordering;

/// Compares two variable-length strings.
#[must_use]
pub fn compare_varying(cs: &dyn Collation, a: &[u8], b: &[u8], b_is_prefix: bool) -> Ordering {
    if b_is_prefix {
        cs.strnncoll(a, b, true)
    } else {
        cs.strnncollsp(a, b)
    }
}

/// Compares two fixed-length strings declared as `nchars` characters.
///
/// Storage may have stripped some or all trailing spaces; they are
/// reconstructed up to `nchars`. Characters past `nchars` are ignored.
#[must_use]
pub fn compare_fixed(
    cs: &dyn Collation,
    a: &[u8],
    b: &[u8],
    nchars: usize,
    b_is_prefix: bool,
) -> Ordering {
    if b_is_prefix {
        cs.strnncoll(a, b, true)
    } else {
        cs.strnncollsp_nchars(a, b, nchars)
    }
}

/// Compares two full-text words.
#[must_use]
pub fn compare_word(cs: &dyn Collation, a: &[u8], b: &[u8]) -> Ordering {
    cs.strnncollsp(a, b)
}

/// Compares a full-text word against a word prefix (`wor*`).
#[must_use]
pub fn compare_word_prefix(cs: &dyn Collation, a: &[u8], b: &[u8]) -> Ordering {
    cs.strnncoll(a, b, true)
}

/// Exact word match or prefix match depending on `b_is_prefix`.
#[must_use]
pub fn compare_word_or_prefix(
    cs: &dyn Collation,
    a: &[u8],
    b: &[u8],
    b_is_prefix: bool,
) -> Ordering {
    if b_is_prefix {
        compare_word_prefix(cs, a, b)
    } else {
        compare_word(cs, a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::collation::{AsciiCaseInsensitive, BinaryCollation, Utf8Binary};

    #[test]
    fn varying_pad_space_vs_prefix() {
        let cs = BinaryCollation::pad_space();
        assert_eq!(compare_varying(&cs, b"ab", b"ab ", false), Ordering::Equal);
        assert_eq!(compare_varying(&cs, b"ab", b"ab ", true), Ordering::Less);
    }

    #[test]
    fn varying_prefix_matches_leading_bytes() {
        let cs = BinaryCollation::pad_space();
        assert_eq!(compare_varying(&cs, b"ab cd", b"ab ", true), Ordering::Equal);
        assert_eq!(compare_varying(&cs, b"abcd", b"ab ", true), Ordering::Greater);
    }

    #[test]
    fn fixed_reconstructs_stripped_spaces() {
        let cs = BinaryCollation::pad_space();
        let stripped = compare_fixed(&cs, b"ab", b"ab", 4, false);
        let padded = compare_fixed(&cs, b"ab  ", b"ab  ", 4, false);
        assert_eq!(stripped, Ordering::Equal);
        assert_eq!(stripped, padded);
        assert_eq!(compare_fixed(&cs, b"ab", b"ab  ", 4, false), Ordering::Equal);
        assert_eq!(compare_fixed(&cs, b"ab ", b"ab", 4, false), Ordering::Equal);
    }

    #[test]
    fn fixed_reconstruction_applies_to_no_pad_collations() {
        let cs = BinaryCollation::no_pad();
        assert_eq!(compare_fixed(&cs, b"ab", b"ab  ", 4, false), Ordering::Equal);
        assert_eq!(compare_varying(&cs, b"ab", b"ab  ", false), Ordering::Less);
    }

    #[test]
    fn fixed_ignores_characters_past_nchars() {
        let cs = Utf8Binary;
        assert_eq!(
            compare_fixed(&cs, "abcé".as_bytes(), b"abcd", 3, false),
            Ordering::Equal
        );
        assert_eq!(compare_fixed(&cs, b"abd", b"abc", 3, false), Ordering::Greater);
    }

    #[test]
    fn fixed_prefix_uses_no_pad() {
        let cs = BinaryCollation::pad_space();
        assert_eq!(compare_fixed(&cs, b"ab", b"ab ", 4, true), Ordering::Less);
    }

    #[test]
    fn words_and_prefixes() {
        let cs = AsciiCaseInsensitive;
        assert_eq!(compare_word(&cs, b"Word", b"word"), Ordering::Equal);
        assert_eq!(compare_word(&cs, b"words", b"word"), Ordering::Greater);
        assert_eq!(compare_word_prefix(&cs, b"words", b"WOR"), Ordering::Equal);
        assert_eq!(
            compare_word_or_prefix(&cs, b"words", b"wor", true),
            Ordering::Equal
        );
        assert_eq!(
            compare_word_or_prefix(&cs, b"words", b"wor", false),
            Ordering::Greater
        );
    }
}
