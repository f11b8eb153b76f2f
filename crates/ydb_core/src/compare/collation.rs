//! Collations: the three-way string comparators keys are ordered by.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

/// Whether trailing spaces are significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadAttribute {
    /// The shorter string is compared as if padded with spaces.
    PadSpace,
    /// Trailing spaces are compared like any other character.
    NoPad,
}

/// A character set plus ordering rules.
///
/// Implementations provide [`strnncoll`](Self::strnncoll); the pad-aware
/// comparisons are derived from it.
pub trait Collation: Send + Sync + fmt::Debug {
    /// Collation name.
    fn name(&self) -> &str;

    /// Pad attribute used by [`strnncollsp`](Self::strnncollsp).
    fn pad_attribute(&self) -> PadAttribute;

    /// Compares without padding.
    ///
    /// With `b_is_prefix`, `a` is first cut to the length of `b`, so a value
    /// equals any prefix of itself.
    fn strnncoll(&self, a: &[u8], b: &[u8], b_is_prefix: bool) -> Ordering;

    /// Longest encoding of one character, in bytes.
    fn max_char_len(&self) -> usize {
        1
    }

    /// Number of characters in `s`.
    fn char_count(&self, s: &[u8]) -> usize {
        s.len()
    }

    /// Byte length of the first `nchars` characters of `s`.
    fn char_prefix_len(&self, s: &[u8], nchars: usize) -> usize {
        nchars.min(s.len())
    }

    /// Compares honoring the pad attribute.
    fn strnncollsp(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self.pad_attribute() {
            PadAttribute::NoPad => self.strnncoll(a, b, false),
            PadAttribute::PadSpace => {
                let width = a.len().max(b.len());
                self.strnncoll(&pad_bytes(a, width), &pad_bytes(b, width), false)
            }
        }
    }

    /// Compares the first `nchars` characters of both sides, treating
    /// missing trailing characters as spaces.
    ///
    /// Values that had trailing spaces stripped on storage compare the same
    /// as the unstripped originals.
    fn strnncollsp_nchars(&self, a: &[u8], b: &[u8], nchars: usize) -> Ordering {
        let a = pad_chars(self, a, nchars);
        let b = pad_chars(self, b, nchars);
        self.strnncoll(&a, &b, false)
    }
}

fn pad_bytes(s: &[u8], width: usize) -> Cow<'_, [u8]> {
    if s.len() >= width {
        return Cow::Borrowed(s);
    }
    let mut padded = Vec::with_capacity(width);
    padded.extend_from_slice(s);
    padded.resize(width, b' ');
    Cow::Owned(padded)
}

fn pad_chars<'a, C: Collation + ?Sized>(cs: &C, s: &'a [u8], nchars: usize) -> Cow<'a, [u8]> {
    let s = &s[..cs.char_prefix_len(s, nchars)];
    let missing = nchars.saturating_sub(cs.char_count(s));
    pad_bytes(s, s.len() + missing)
}

/// Applies the prefix cut and compares with `cmp` over bytes.
fn compare_by<F>(a: &[u8], b: &[u8], b_is_prefix: bool, cmp: F) -> Ordering
where
    F: Fn(u8, u8) -> Ordering,
{
    let a = if b_is_prefix && a.len() > b.len() {
        &a[..b.len()]
    } else {
        a
    };
    for (x, y) in a.iter().zip(b) {
        match cmp(*x, *y) {
            Ordering::Equal => {}
            ord => return ord,
        }
    }
    a.len().cmp(&b.len())
}

/// Bytewise ordering with a configurable pad attribute.
#[derive(Debug, Clone, Copy)]
pub struct BinaryCollation {
    pad: PadAttribute,
}

impl BinaryCollation {
    /// Trailing spaces are significant.
    #[must_use]
    pub const fn no_pad() -> Self {
        Self {
            pad: PadAttribute::NoPad,
        }
    }

    /// Trailing spaces are insignificant.
    #[must_use]
    pub const fn pad_space() -> Self {
        Self {
            pad: PadAttribute::PadSpace,
        }
    }
}

impl Collation for BinaryCollation {
    fn name(&self) -> &str {
        match self.pad {
            PadAttribute::NoPad => "binary",
            PadAttribute::PadSpace => "binary_pad",
        }
    }

    fn pad_attribute(&self) -> PadAttribute {
        self.pad
    }

    fn strnncoll(&self, a: &[u8], b: &[u8], b_is_prefix: bool) -> Ordering {
        compare_by(a, b, b_is_prefix, |x, y| x.cmp(&y))
    }
}

/// Single-byte text, ASCII letters compared case-insensitively.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsciiCaseInsensitive;

impl Collation for AsciiCaseInsensitive {
    fn name(&self) -> &str {
        "ascii_general_ci"
    }

    fn pad_attribute(&self) -> PadAttribute {
        PadAttribute::PadSpace
    }

    fn strnncoll(&self, a: &[u8], b: &[u8], b_is_prefix: bool) -> Ordering {
        compare_by(a, b, b_is_prefix, |x, y| {
            x.to_ascii_lowercase().cmp(&y.to_ascii_lowercase())
        })
    }
}

/// UTF-8 text in code point order.
///
/// Byte order of UTF-8 equals code point order, so comparison is bytewise;
/// character counting understands multibyte sequences.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Binary;

impl Utf8Binary {
    fn is_continuation(byte: u8) -> bool {
        byte & 0xC0 == 0x80
    }
}

impl Collation for Utf8Binary {
    fn name(&self) -> &str {
        "utf8mb4_bin"
    }

    fn pad_attribute(&self) -> PadAttribute {
        PadAttribute::PadSpace
    }

    fn strnncoll(&self, a: &[u8], b: &[u8], b_is_prefix: bool) -> Ordering {
        compare_by(a, b, b_is_prefix, |x, y| x.cmp(&y))
    }

    fn max_char_len(&self) -> usize {
        4
    }

    fn char_count(&self, s: &[u8]) -> usize {
        s.iter().filter(|b| !Self::is_continuation(**b)).count()
    }

    fn char_prefix_len(&self, s: &[u8], nchars: usize) -> usize {
        let mut seen = 0;
        for (index, byte) in s.iter().enumerate() {
            if !Self::is_continuation(*byte) {
                if seen == nchars {
                    return index;
                }
                seen += 1;
            }
        }
        s.len()
    }
}
