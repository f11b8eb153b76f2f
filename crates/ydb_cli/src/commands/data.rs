//! Key/value commands.

use super::{open_db, open_env, DbName};
use crate::error::CliError;
use crate::output::{display_bytes, Format, PairInfo};
use serde::Serialize;
use std::path::Path;
use ydb_core::{CursorOp, DbFlags, PutFlags};

/// Runs the put command inside a transaction.
pub fn put(
    home: &Path,
    name: &DbName,
    key: &str,
    value: &str,
    no_overwrite: bool,
) -> Result<(), CliError> {
    let env = open_env(home)?;
    let db = open_db(&env, name, true)?;
    let flags = if no_overwrite {
        PutFlags::NOOVERWRITE
    } else {
        PutFlags::empty()
    };
    let txn = env.txn_begin(None)?;
    db.put(Some(&txn), key.as_bytes(), value.as_bytes(), flags)?;
    txn.commit()?;
    db.close(0)?;
    env.close(0)?;
    Ok(())
}

/// Runs the get command.
pub fn get(home: &Path, name: &DbName, key: &str, format: Format) -> Result<(), CliError> {
    let env = open_env(home)?;
    let db = open_db(&env, name, false)?;
    let value = db.get(None, key.as_bytes())?;
    match format {
        Format::Json => println!(
            "{}",
            serde_json::to_string_pretty(&PairInfo::new(key.as_bytes(), &value))?
        ),
        Format::Text => println!("{}", display_bytes(&value)),
    }
    db.close(0)?;
    env.close(0)?;
    Ok(())
}

/// Runs the del command inside a transaction.
pub fn del(home: &Path, name: &DbName, key: &str) -> Result<(), CliError> {
    let env = open_env(home)?;
    let db = open_db(&env, name, false)?;
    let txn = env.txn_begin(None)?;
    db.del(Some(&txn), key.as_bytes())?;
    txn.commit()?;
    db.close(0)?;
    env.close(0)?;
    Ok(())
}

/// Runs the scan command.
pub fn scan(
    home: &Path,
    name: &DbName,
    from: Option<&str>,
    limit: Option<usize>,
    format: Format,
) -> Result<(), CliError> {
    let env = open_env(home)?;
    let db = open_db(&env, name, false)?;
    let pairs = {
        let mut cursor = db.cursor(None)?;
        let max = limit.unwrap_or(usize::MAX);
        let mut pairs = Vec::new();
        let first = match from {
            Some(start) => cursor.get(Some(start.as_bytes()), CursorOp::SetRange),
            None => cursor.get(None, CursorOp::First),
        };
        match first {
            Ok((key, value)) if max > 0 => pairs.push(PairInfo::new(&key, &value)),
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        while pairs.len() < max && !pairs.is_empty() {
            match cursor.next() {
                Some(pair) => {
                    let (key, value) = pair?;
                    pairs.push(PairInfo::new(&key, &value));
                }
                None => break,
            }
        }
        cursor.close()?;
        pairs
    };

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&pairs)?),
        Format::Text => {
            for pair in &pairs {
                println!("{}\t{}", pair.key, pair.value);
            }
        }
    }
    db.close(0)?;
    env.close(0)?;
    Ok(())
}

/// Database statistics as printed.
#[derive(Debug, Serialize)]
pub struct StatInfo {
    /// File name.
    pub file: String,
    /// Sub-database name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdb: Option<String>,
    /// Distinct keys.
    pub keys: u64,
    /// Pairs, counting duplicates.
    pub pairs: u64,
    /// Node size in bytes.
    pub page_size: u32,
    /// Duplicate mode.
    pub duplicates: &'static str,
}

/// Runs the stat command.
pub fn stat(home: &Path, name: &DbName, format: Format) -> Result<(), CliError> {
    let env = open_env(home)?;
    let db = open_db(&env, name, false)?;
    let stat = db.stat()?;
    let info = StatInfo {
        file: name.file.clone(),
        subdb: name.subdb.clone(),
        keys: stat.nkeys,
        pairs: stat.ndata,
        page_size: stat.page_size,
        duplicates: if stat.flags.contains(DbFlags::DUPSORT) {
            "sorted"
        } else if stat.flags.contains(DbFlags::DUP) {
            "unsorted"
        } else {
            "none"
        },
    };
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&info)?),
        Format::Text => {
            println!("Database: {}", info.file);
            if let Some(subdb) = &info.subdb {
                println!("Sub-database: {subdb}");
            }
            println!("Keys:       {}", info.keys);
            println!("Pairs:      {}", info.pairs);
            println!("Page size:  {}", info.page_size);
            println!("Duplicates: {}", info.duplicates);
        }
    }
    db.close(0)?;
    env.close(0)?;
    Ok(())
}
