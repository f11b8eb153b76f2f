//! Length prefixes of variable-length key parts.
//!
//! ```text
//! length < 255   | length (1) |
//! otherwise      | 0xFF (1) | length (2, LE) |
//! ```

use crate::error::{YdbError, YdbResult};

/// Longest key, in bytes.
pub const MAX_KEY_LENGTH: usize = 1000;

/// Most segments one key may have.
pub const MAX_KEY_SEGMENTS: usize = 32;

const LONG_LENGTH_MARKER: u8 = 0xFF;

/// Number of bytes needed to store `length`.
#[must_use]
pub const fn size_to_store_key_length(length: usize) -> usize {
    if length < LONG_LENGTH_MARKER as usize {
        1
    } else {
        3
    }
}

/// Appends the prefix for `length` to `out`, returning its width.
///
/// # Errors
///
/// Fails if `length` does not fit in two bytes.
pub fn store_key_length(out: &mut Vec<u8>, length: usize) -> YdbResult<usize> {
    if length < usize::from(LONG_LENGTH_MARKER) {
        out.push(length as u8);
        return Ok(1);
    }
    let length = u16::try_from(length)
        .map_err(|_| YdbError::invalid_argument(format!("key part of {length} bytes")))?;
    out.push(LONG_LENGTH_MARKER);
    out.extend_from_slice(&length.to_le_bytes());
    Ok(3)
}

/// Reads a prefix without consuming it, returning `(length, width)`.
///
/// # Errors
///
/// Fails on an empty or truncated prefix.
pub fn get_key_length_rdonly(key: &[u8]) -> YdbResult<(usize, usize)> {
    match key {
        [] => Err(truncated()),
        [LONG_LENGTH_MARKER, lo, hi, ..] => Ok((usize::from(u16::from_le_bytes([*lo, *hi])), 3)),
        [LONG_LENGTH_MARKER, ..] => Err(truncated()),
        [short, ..] => Ok((usize::from(*short), 1)),
    }
}

/// Reads a prefix and advances `key` past it.
pub fn get_key_length(key: &mut &[u8]) -> YdbResult<usize> {
    let (length, width) = get_key_length_rdonly(key)?;
    *key = &key[width..];
    Ok(length)
}

/// Reads a prefix and advances `key` past it, returning `(length, width)`.
pub fn get_key_pack_length(key: &mut &[u8]) -> YdbResult<(usize, usize)> {
    let (length, width) = get_key_length_rdonly(key)?;
    *key = &key[width..];
    Ok((length, width))
}

fn truncated() -> YdbError {
    YdbError::invalid_argument("truncated key length prefix")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn short_and_long_forms() {
        let mut out = Vec::new();
        assert_eq!(store_key_length(&mut out, 254).unwrap(), 1);
        assert_eq!(store_key_length(&mut out, 255).unwrap(), 3);
        assert_eq!(out, vec![254, 0xFF, 255, 0]);
    }

    #[test]
    fn advancing_and_read_only_variants() {
        let mut out = Vec::new();
        store_key_length(&mut out, 1000).unwrap();
        out.extend_from_slice(b"rest");

        assert_eq!(get_key_length_rdonly(&out).unwrap(), (1000, 3));
        let mut cursor: &[u8] = &out;
        assert_eq!(get_key_length(&mut cursor).unwrap(), 1000);
        assert_eq!(cursor, b"rest");

        let mut cursor: &[u8] = &[7, 1];
        assert_eq!(get_key_pack_length(&mut cursor).unwrap(), (7, 1));
        assert_eq!(cursor, &[1]);
    }

    #[test]
    fn truncated_prefixes_fail() {
        assert!(get_key_length_rdonly(&[]).is_err());
        assert!(get_key_length_rdonly(&[0xFF, 1]).is_err());
        assert!(store_key_length(&mut Vec::new(), 70_000).is_err());
    }

    proptest! {
        #[test]
        fn length_prefix_round_trip(length in 0usize..=MAX_KEY_LENGTH) {
            let mut out = Vec::new();
            let width = store_key_length(&mut out, length).unwrap();
            prop_assert_eq!(width, out.len());
            prop_assert_eq!(width, size_to_store_key_length(length));
            prop_assert_eq!(width, if length < 255 { 1 } else { 3 });
            let mut cursor: &[u8] = &out;
            prop_assert_eq!(get_key_length(&mut cursor).unwrap(), length);
            prop_assert!(cursor.is_empty());
        }
    }
}
