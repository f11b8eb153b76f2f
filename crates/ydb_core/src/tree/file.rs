//! On-disk image of a tree file.
//!
//! ```text
//! | magic (4) | version (2) | subdb count (4) | subdb* | crc32 (4) |
//!
//! subdb = | name len (2) | name | flags (4) | node size (4) | lsn (8) | state (1) | pair count (8) | pair* |
//! pair  = | key len (4) | key | value len (4) | value |
//! ```
//!
//! `state` bit 0 marks pairs left out of order by recovery. Version 1 files
//! have no `state` byte. A file is always rewritten whole.

use crate::error::{YdbError, YdbResult};
use crate::flags::DbFlags;
use crate::log::compute_crc32;
use crate::tree::subdb::SubDb;
use crate::types::Lsn;
use std::collections::BTreeMap;

/// Magic bytes at the start of every tree file.
pub const TREE_MAGIC: [u8; 4] = *b"YTRE";

/// Current tree file format version.
pub const TREE_VERSION: u16 = 2;

const STATE_UNORDERED: u8 = 0x01;

pub(crate) fn encode_file(subdbs: &BTreeMap<String, SubDb>) -> YdbResult<Vec<u8>> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&TREE_MAGIC);
    buf.extend_from_slice(&TREE_VERSION.to_le_bytes());
    buf.extend_from_slice(&to_u32(subdbs.len())?.to_le_bytes());

    for (name, subdb) in subdbs {
        let name_len = u16::try_from(name.len())
            .map_err(|_| YdbError::invalid_argument("sub-database name too long"))?;
        buf.extend_from_slice(&name_len.to_le_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(&subdb.flags.bits().to_le_bytes());
        buf.extend_from_slice(&subdb.node_size.to_le_bytes());
        buf.extend_from_slice(&subdb.lsn.as_u64().to_le_bytes());
        buf.push(if subdb.unordered { STATE_UNORDERED } else { 0 });
        buf.extend_from_slice(&(subdb.entries.len() as u64).to_le_bytes());
        for (key, value) in &subdb.entries {
            buf.extend_from_slice(&to_u32(key.len())?.to_le_bytes());
            buf.extend_from_slice(key);
            buf.extend_from_slice(&to_u32(value.len())?.to_le_bytes());
            buf.extend_from_slice(value);
        }
    }

    let crc = compute_crc32(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

pub(crate) fn decode_file(bytes: &[u8]) -> YdbResult<BTreeMap<String, SubDb>> {
    if bytes.is_empty() {
        return Ok(BTreeMap::new());
    }
    if bytes.len() < 14 {
        return Err(YdbError::tree_corruption("file too short"));
    }
    let (body, crc) = bytes.split_at(bytes.len() - 4);
    let stored = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
    let computed = compute_crc32(body);
    if stored != computed {
        return Err(YdbError::ChecksumMismatch {
            expected: stored,
            actual: computed,
        });
    }
    if body[0..4] != TREE_MAGIC {
        return Err(YdbError::tree_corruption("invalid magic"));
    }
    let version = u16::from_le_bytes([body[4], body[5]]);
    if version > TREE_VERSION {
        return Err(YdbError::tree_corruption(format!(
            "unsupported version {version}"
        )));
    }

    let mut offset = 6;
    let read_u16 = |offset: &mut usize| -> YdbResult<u16> {
        let raw = take(body, offset, 2)?;
        Ok(u16::from_le_bytes([raw[0], raw[1]]))
    };
    let read_u32 = |offset: &mut usize| -> YdbResult<u32> {
        let raw = take(body, offset, 4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    };
    let read_u64 = |offset: &mut usize| -> YdbResult<u64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(take(body, offset, 8)?);
        Ok(u64::from_le_bytes(raw))
    };

    let count = read_u32(&mut offset)?;
    let mut subdbs = BTreeMap::new();
    for _ in 0..count {
        let name_len = usize::from(read_u16(&mut offset)?);
        let name = String::from_utf8(take(body, &mut offset, name_len)?.to_vec())
            .map_err(|_| YdbError::tree_corruption("sub-database name is not UTF-8"))?;
        let flags = DbFlags::from_bits(read_u32(&mut offset)?)
            .ok_or_else(|| YdbError::tree_corruption("unknown sub-database flags"))?;
        let node_size = read_u32(&mut offset)?;
        let lsn = Lsn::new(read_u64(&mut offset)?);
        let state = if version >= 2 {
            take(body, &mut offset, 1)?[0]
        } else {
            0
        };
        if state & !STATE_UNORDERED != 0 {
            return Err(YdbError::tree_corruption(format!(
                "unknown sub-database state {state:#04x}"
            )));
        }
        let pairs = read_u64(&mut offset)?;
        let mut subdb = SubDb::new(flags, node_size);
        subdb.lsn = lsn;
        subdb.unordered = state & STATE_UNORDERED != 0;
        for _ in 0..pairs {
            let key_len = read_u32(&mut offset)? as usize;
            let key = take(body, &mut offset, key_len)?.to_vec();
            let value_len = read_u32(&mut offset)? as usize;
            let value = take(body, &mut offset, value_len)?.to_vec();
            subdb.entries.push((key, value));
        }
        subdbs.insert(name, subdb);
    }

    if offset != body.len() {
        return Err(YdbError::tree_corruption(format!(
            "trailing bytes: expected {offset} bytes, got {}",
            body.len()
        )));
    }
    Ok(subdbs)
}

fn take<'a>(body: &'a [u8], offset: &mut usize, len: usize) -> YdbResult<&'a [u8]> {
    let end = offset
        .checked_add(len)
        .filter(|end| *end <= body.len())
        .ok_or_else(|| YdbError::tree_corruption("unexpected end of file"))?;
    let slice = &body[*offset..end];
    *offset = end;
    Ok(slice)
}

fn to_u32(len: usize) -> YdbResult<u32> {
    u32::try_from(len).map_err(|_| YdbError::invalid_argument("item too large for a tree file"))
}
