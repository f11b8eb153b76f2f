//! Output formatting shared by commands.

use clap::ValueEnum;
use serde::Serialize;

/// How a command prints its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable lines.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Renders bytes as text when they are printable UTF-8, as hex otherwise.
pub fn display_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
        _ => format!("0x{}", hex_encode(bytes)),
    }
}

pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A key/value pair as printed.
#[derive(Debug, Serialize)]
pub struct PairInfo {
    /// Key.
    pub key: String,
    /// Value.
    pub value: String,
}

impl PairInfo {
    pub fn new(key: &[u8], value: &[u8]) -> Self {
        Self {
            key: display_bytes(key),
            value: display_bytes(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printable_bytes_stay_text() {
        assert_eq!(display_bytes(b"user:1"), "user:1");
        assert_eq!(display_bytes(b""), "");
    }

    #[test]
    fn binary_bytes_become_hex() {
        assert_eq!(display_bytes(&[0, 1, 0xff]), "0x0001ff");
        assert_eq!(display_bytes(b"a\nb"), "0x610a62");
    }
}
