//! Multi-segment index keys.
//!
//! A [`KeyDef`] describes how an index key is cut out of a fixed-layout
//! record and how two encoded keys are ordered. Each [`KeySegment`] adds,
//! in order:
//!
//! ```text
//! | null marker (1, nullable only: 0 = NULL, 1 = value) | part |
//! ```
//!
//! where `part` is the raw bytes for fixed-width types, a length prefix
//! followed by the bytes for variable-length and space-packed text, and
//! for bit fields an optional byte of leftover bits followed by the whole
//! bytes. A NULL segment carries no part.
//!
//! Records store variable-length columns as a length (1 byte when the
//! declared length is below 256, else 2 bytes LE) followed by the data, and
//! integers and floats in little-endian byte order.

use super::bits::get_rec_bits;
use super::collation::{BinaryCollation, Collation};
use super::key_length::{
    get_key_length, size_to_store_key_length, store_key_length, MAX_KEY_LENGTH,
    MAX_KEY_SEGMENTS,
};
use super::text::{compare_fixed, compare_varying};
use super::CompareFn;
use crate::error::{YdbError, YdbResult};
use bitflags::bitflags;
use std::cmp::Ordering;
use std::sync::Arc;

/// Sort type of a key segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// Fixed-length text, compared by collation.
    Text,
    /// Fixed-length bytes.
    Binary,
    /// Variable-length text, compared by collation.
    VarText,
    /// Variable-length bytes.
    VarBinary,
    /// Signed 8-bit integer.
    Int8,
    /// Unsigned 8-bit integer.
    UInt8,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Signed 24-bit integer.
    Int24,
    /// Unsigned 24-bit integer.
    UInt24,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 64-bit integer.
    UInt64,
    /// IEEE single.
    Float,
    /// IEEE double.
    Double,
    /// Bit field: leftover bits plus whole bytes.
    Bit,
}

impl KeyType {
    /// Width in bytes of numeric types.
    #[must_use]
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            Self::Int8 | Self::UInt8 => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int24 | Self::UInt24 => Some(3),
            Self::Int32 | Self::UInt32 | Self::Float => Some(4),
            Self::Int64 | Self::UInt64 | Self::Double => Some(8),
            Self::Text | Self::Binary | Self::VarText | Self::VarBinary | Self::Bit => None,
        }
    }

    const fn is_signed(self) -> bool {
        matches!(
            self,
            Self::Int8 | Self::Int16 | Self::Int24 | Self::Int32 | Self::Int64
        )
    }

    const fn is_variable(self) -> bool {
        matches!(self, Self::VarText | Self::VarBinary)
    }
}

bitflags! {
    /// Per-segment options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SegmentFlags: u16 {
        /// Fixed-length text/binary is stored with trailing spaces removed.
        const SPACE_PACK = 1 << 0;
        /// The segment indexes a prefix of its column.
        const PART_KEY = 1 << 1;
        /// Descending order.
        const REVERSE_SORT = 1 << 2;
    }
}

/// One column's contribution to an index key.
#[derive(Debug, Clone)]
pub struct KeySegment {
    /// Ordering of text values.
    pub collation: Arc<dyn Collation>,
    /// Sort type.
    pub key_type: KeyType,
    /// Offset of the value in the record.
    pub start: usize,
    /// Declared length in bytes.
    pub length: usize,
    /// Offset of the null indicator byte.
    pub null_pos: usize,
    /// Mask of the null indicator; 0 when the column is not nullable.
    pub null_bit: u8,
    /// Offset of the byte holding leftover bits of a bit field.
    pub bit_pos: usize,
    /// First leftover bit.
    pub bit_start: u8,
    /// Number of leftover bits.
    pub bit_length: u8,
    /// Options.
    pub flags: SegmentFlags,
}

impl KeySegment {
    /// Creates a non-nullable segment with a bytewise collation.
    #[must_use]
    pub fn new(key_type: KeyType, start: usize, length: usize) -> Self {
        Self {
            collation: Arc::new(BinaryCollation::no_pad()),
            key_type,
            start,
            length,
            null_pos: 0,
            null_bit: 0,
            bit_pos: 0,
            bit_start: 0,
            bit_length: 0,
            flags: SegmentFlags::empty(),
        }
    }

    /// Sets the collation.
    #[must_use]
    pub fn collation(mut self, collation: Arc<dyn Collation>) -> Self {
        self.collation = collation;
        self
    }

    /// Makes the segment nullable.
    #[must_use]
    pub fn nullable(mut self, null_pos: usize, null_bit: u8) -> Self {
        self.null_pos = null_pos;
        self.null_bit = null_bit;
        self
    }

    /// Sets the leftover bits of a bit field.
    #[must_use]
    pub fn bits(mut self, bit_pos: usize, bit_start: u8, bit_length: u8) -> Self {
        self.bit_pos = bit_pos;
        self.bit_start = bit_start;
        self.bit_length = bit_length;
        self
    }

    /// Sets the options.
    #[must_use]
    pub fn flags(mut self, flags: SegmentFlags) -> Self {
        self.flags = flags;
        self
    }

    fn is_nullable(&self) -> bool {
        self.null_bit != 0
    }

    fn is_length_prefixed(&self) -> bool {
        self.key_type.is_variable()
            || (matches!(self.key_type, KeyType::Text | KeyType::Binary)
                && self.flags.contains(SegmentFlags::SPACE_PACK))
    }

    fn max_encoded_len(&self) -> usize {
        let null = usize::from(self.is_nullable());
        let part = match self.key_type {
            _ if self.is_length_prefixed() => size_to_store_key_length(self.length) + self.length,
            KeyType::Bit => usize::from(self.bit_length > 0) + self.length,
            _ => self.length,
        };
        null + part
    }

    fn validate(&self) -> YdbResult<()> {
        if let Some(width) = self.key_type.fixed_width() {
            if self.length != width {
                return Err(YdbError::invalid_argument(format!(
                    "{:?} segment must be {width} bytes, not {}",
                    self.key_type, self.length
                )));
            }
        }
        if self.key_type == KeyType::Bit
            && (self.bit_start >= 8 || self.bit_length > 8 || self.bit_start + self.bit_length > 16)
        {
            return Err(YdbError::invalid_argument("bit field out of range"));
        }
        if self.is_length_prefixed() && self.length > usize::from(u16::MAX) {
            return Err(YdbError::invalid_argument("variable segment too long"));
        }
        Ok(())
    }

    fn field<'r>(record: &'r [u8], start: usize, len: usize) -> YdbResult<&'r [u8]> {
        start
            .checked_add(len)
            .and_then(|end| record.get(start..end))
            .ok_or_else(|| YdbError::invalid_argument("record too short for key segment"))
    }

    fn append_part(&self, record: &[u8], key: &mut Vec<u8>) -> YdbResult<()> {
        match self.key_type {
            KeyType::VarText | KeyType::VarBinary => {
                let pack = if self.length < 256 { 1 } else { 2 };
                let raw = Self::field(record, self.start, pack)?;
                let len = if pack == 1 {
                    usize::from(raw[0])
                } else {
                    usize::from(u16::from_le_bytes([raw[0], raw[1]]))
                };
                if len > self.length {
                    return Err(YdbError::invalid_argument(format!(
                        "value of {len} bytes in a {}-byte column",
                        self.length
                    )));
                }
                let data = Self::field(record, self.start + pack, len)?;
                store_key_length(key, len)?;
                key.extend_from_slice(data);
            }
            KeyType::Text | KeyType::Binary => {
                let data = Self::field(record, self.start, self.length)?;
                if self.flags.contains(SegmentFlags::SPACE_PACK) {
                    let end = data.iter().rposition(|b| *b != b' ').map_or(0, |p| p + 1);
                    store_key_length(key, end)?;
                    key.extend_from_slice(&data[..end]);
                } else {
                    key.extend_from_slice(data);
                }
            }
            KeyType::Bit => {
                if self.bit_length > 0 {
                    let window = record
                        .get(self.bit_pos..)
                        .filter(|w| !w.is_empty())
                        .ok_or_else(|| YdbError::invalid_argument("record too short for bits"))?;
                    let needs_two = u32::from(self.bit_start) + u32::from(self.bit_length) > 8;
                    if needs_two && window.len() < 2 {
                        return Err(YdbError::invalid_argument("record too short for bits"));
                    }
                    let bits = get_rec_bits(
                        window,
                        u32::from(self.bit_start),
                        u32::from(self.bit_length),
                    );
                    key.push(bits as u8);
                }
                key.extend_from_slice(Self::field(record, self.start, self.length)?);
            }
            _ => key.extend_from_slice(Self::field(record, self.start, self.length)?),
        }
        Ok(())
    }

    fn take_part<'k>(&self, key: &mut &'k [u8]) -> YdbResult<&'k [u8]> {
        let len = if self.is_length_prefixed() {
            get_key_length(key)?
        } else if self.key_type == KeyType::Bit {
            usize::from(self.bit_length > 0) + self.length
        } else {
            self.length
        };
        if key.len() < len {
            return Err(YdbError::invalid_argument("truncated key segment"));
        }
        let (part, rest) = key.split_at(len);
        *key = rest;
        Ok(part)
    }

    fn compare_parts(&self, a: &[u8], b: &[u8], b_is_prefix: bool) -> Ordering {
        let cs = self.collation.as_ref();
        match self.key_type {
            KeyType::Text => {
                let nchars = self.length / cs.max_char_len().max(1);
                compare_fixed(cs, a, b, nchars, b_is_prefix)
            }
            KeyType::VarText => compare_varying(cs, a, b, b_is_prefix),
            KeyType::Binary | KeyType::VarBinary | KeyType::Bit => {
                BinaryCollation::no_pad().strnncoll(a, b, b_is_prefix)
            }
            KeyType::Float => {
                let x = f32::from_le_bytes(to_array(a));
                let y = f32::from_le_bytes(to_array(b));
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            KeyType::Double => {
                let x = f64::from_le_bytes(to_array(a));
                let y = f64::from_le_bytes(to_array(b));
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            int => {
                let signed = int.is_signed();
                read_int(a, signed).cmp(&read_int(b, signed))
            }
        }
    }

    fn order(&self, ord: Ordering) -> Ordering {
        if self.flags.contains(SegmentFlags::REVERSE_SORT) {
            ord.reverse()
        } else {
            ord
        }
    }
}

fn to_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut raw = [0u8; N];
    let n = bytes.len().min(N);
    raw[..n].copy_from_slice(&bytes[..n]);
    raw
}

fn read_int(bytes: &[u8], signed: bool) -> i128 {
    let negative = signed && bytes.last().is_some_and(|b| b & 0x80 != 0);
    let mut raw = if negative { [0xFF; 16] } else { [0u8; 16] };
    let n = bytes.len().min(16);
    raw[..n].copy_from_slice(&bytes[..n]);
    i128::from_le_bytes(raw)
}

/// How much of the second key takes part in a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCompareMode {
    /// Both keys are complete.
    Full,
    /// The second key may stop after any segment; missing segments match.
    Partial,
    /// Like `Partial`, and the last present text segment is a prefix.
    Prefix,
}

/// An ordered list of key segments.
#[derive(Debug, Clone)]
pub struct KeyDef {
    segments: Vec<KeySegment>,
}

impl KeyDef {
    /// Creates a key definition.
    ///
    /// # Errors
    ///
    /// Fails if there are no segments or more than [`MAX_KEY_SEGMENTS`], if
    /// a segment is malformed, or if the longest possible key exceeds
    /// [`MAX_KEY_LENGTH`].
    pub fn new(segments: Vec<KeySegment>) -> YdbResult<Self> {
        if segments.is_empty() {
            return Err(YdbError::invalid_argument("key needs at least one segment"));
        }
        if segments.len() > MAX_KEY_SEGMENTS {
            return Err(YdbError::invalid_argument(format!(
                "{} key segments exceed {MAX_KEY_SEGMENTS}",
                segments.len()
            )));
        }
        for segment in &segments {
            segment.validate()?;
        }
        let def = Self { segments };
        let max = def.max_key_length();
        if max > MAX_KEY_LENGTH {
            return Err(YdbError::invalid_argument(format!(
                "key of up to {max} bytes exceeds {MAX_KEY_LENGTH}"
            )));
        }
        Ok(def)
    }

    /// Returns the segments.
    #[must_use]
    pub fn segments(&self) -> &[KeySegment] {
        &self.segments
    }

    /// Longest key this definition can produce.
    #[must_use]
    pub fn max_key_length(&self) -> usize {
        self.segments.iter().map(KeySegment::max_encoded_len).sum()
    }

    /// Builds the key of `record`.
    ///
    /// # Errors
    ///
    /// Fails if the record is too short for a segment or holds a
    /// variable-length value longer than its declared length.
    pub fn make_key(&self, record: &[u8]) -> YdbResult<Vec<u8>> {
        let mut key = Vec::with_capacity(self.max_key_length());
        for segment in &self.segments {
            if segment.is_nullable() {
                let indicator = KeySegment::field(record, segment.null_pos, 1)?[0];
                if indicator & segment.null_bit != 0 {
                    key.push(0);
                    continue;
                }
                key.push(1);
            }
            segment.append_part(record, &mut key)?;
        }
        Ok(key)
    }

    /// Compares two encoded keys segment by segment.
    ///
    /// NULL sorts before every value.
    ///
    /// # Errors
    ///
    /// Fails if either key is malformed.
    pub fn compare(&self, a: &[u8], b: &[u8], mode: KeyCompareMode) -> YdbResult<Ordering> {
        let (mut a, mut b) = (a, b);
        for segment in &self.segments {
            if b.is_empty() {
                return Ok(match mode {
                    KeyCompareMode::Full if !a.is_empty() => Ordering::Greater,
                    _ => Ordering::Equal,
                });
            }
            if a.is_empty() {
                return Ok(Ordering::Less);
            }
            if segment.is_nullable() {
                let (a_null, b_null) = (a[0] == 0, b[0] == 0);
                a = &a[1..];
                b = &b[1..];
                match (a_null, b_null) {
                    (true, true) => continue,
                    (true, false) => return Ok(segment.order(Ordering::Less)),
                    (false, true) => return Ok(segment.order(Ordering::Greater)),
                    (false, false) => {}
                }
            }
            let part_a = segment.take_part(&mut a)?;
            let part_b = segment.take_part(&mut b)?;
            let b_is_prefix = mode == KeyCompareMode::Prefix && b.is_empty();
            match segment.compare_parts(part_a, part_b, b_is_prefix) {
                Ordering::Equal => {}
                ord => return Ok(segment.order(ord)),
            }
        }
        Ok(Ordering::Equal)
    }

    /// Returns the index of the first NULL segment of `key`.
    ///
    /// # Errors
    ///
    /// Fails if the key is malformed.
    pub fn find_null(&self, key: &[u8]) -> YdbResult<Option<usize>> {
        let mut rest = key;
        for (index, segment) in self.segments.iter().enumerate() {
            if rest.is_empty() {
                break;
            }
            if segment.is_nullable() {
                let marker = rest[0];
                rest = &rest[1..];
                if marker == 0 {
                    return Ok(Some(index));
                }
            }
            segment.take_part(&mut rest)?;
        }
        Ok(None)
    }

    /// Turns the definition into a tree comparator over complete keys.
    ///
    /// Malformed keys fall back to bytewise order.
    #[must_use]
    pub fn comparator(self: Arc<Self>) -> CompareFn {
        Arc::new(move |a: &[u8], b: &[u8]| {
            self.compare(a, b, KeyCompareMode::Full)
                .unwrap_or_else(|_| a.cmp(b))
        })
    }
}
