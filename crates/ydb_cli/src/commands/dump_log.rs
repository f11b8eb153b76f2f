//! Dump-log command implementation.

use crate::error::CliError;
use crate::output::{display_bytes, Format};
use serde::Serialize;
use std::path::Path;
use ydb_core::log::{LogEntry, LogIterator, LogRecord, LOG_FILE};
use ydb_storage::{FileBackend, StorageBackend};

/// Log record representation for output.
#[derive(Debug, Serialize)]
pub struct LogRecordInfo {
    /// Offset in the log file.
    pub offset: u64,
    /// Log sequence number.
    pub lsn: u64,
    /// Record type.
    pub record_type: &'static str,
    /// Transaction id, or the innermost id of a mutation's chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txid: Option<u64>,
    /// Parent transaction of a `BEGIN`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<u64>,
    /// Tree file of a mutation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Sub-database of a mutation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdb: Option<String>,
    /// Key of a mutation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Value size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_size: Option<usize>,
}

impl LogRecordInfo {
    fn from_entry(entry: &LogEntry) -> Self {
        let mut info = Self {
            offset: entry.offset,
            lsn: entry.lsn.as_u64(),
            record_type: "",
            txid: None,
            parent: None,
            file: None,
            subdb: None,
            key: None,
            value_size: None,
        };
        match &entry.record {
            LogRecord::Begin { txid, parent } => {
                info.record_type = "BEGIN";
                info.txid = Some(txid.as_u64());
                info.parent = parent.map(|p| p.as_u64());
            }
            LogRecord::Insert {
                xids,
                file,
                subdb,
                key,
                value,
            } => {
                info.record_type = "INSERT";
                info.txid = xids.innermost().map(|id| id.as_u64());
                info.file = Some(file.clone());
                info.subdb = Some(subdb.clone()).filter(|s| !s.is_empty());
                info.key = Some(display_bytes(key));
                info.value_size = Some(value.len());
            }
            LogRecord::Delete {
                xids,
                file,
                subdb,
                key,
                value,
            } => {
                info.record_type = "DELETE";
                info.txid = xids.innermost().map(|id| id.as_u64());
                info.file = Some(file.clone());
                info.subdb = Some(subdb.clone()).filter(|s| !s.is_empty());
                info.key = Some(display_bytes(key));
                info.value_size = value.as_ref().map(Vec::len);
            }
            LogRecord::Commit { txid } => {
                info.record_type = "COMMIT";
                info.txid = Some(txid.as_u64());
            }
            LogRecord::Abort { txid } => {
                info.record_type = "ABORT";
                info.txid = Some(txid.as_u64());
            }
            LogRecord::Checkpoint { last_txnid } => {
                info.record_type = "CHECKPOINT";
                info.txid = last_txnid.map(|id| id.as_u64());
            }
        }
        info
    }
}

/// Runs the dump-log command.
///
/// Reads the log file directly, so it works while no environment is open
/// and never replays or truncates anything.
pub fn run(home: &Path, limit: Option<usize>, format: Format) -> Result<(), CliError> {
    let path = home.join(LOG_FILE);
    if !path.exists() {
        return Err(CliError::NoLog(home.to_path_buf()));
    }
    let backend = FileBackend::open_existing(&path)?;
    let records = read_records(&backend, limit)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        Format::Text => print_text_output(&records),
    }
    Ok(())
}

fn read_records(
    backend: &dyn StorageBackend,
    limit: Option<usize>,
) -> Result<Vec<LogRecordInfo>, CliError> {
    let max = limit.unwrap_or(usize::MAX);
    let mut records = Vec::new();
    for entry in LogIterator::new(backend, 0)?.take(max) {
        records.push(LogRecordInfo::from_entry(&entry?));
    }
    Ok(records)
}

fn print_text_output(records: &[LogRecordInfo]) {
    println!("Log Records ({} total)", records.len());
    println!("================");
    println!();

    for record in records {
        print!(
            "[{:08}] lsn={:<6} {:10}",
            record.offset, record.lsn, record.record_type
        );
        if let Some(txid) = record.txid {
            print!(" txid={txid}");
        }
        if let Some(parent) = record.parent {
            print!(" parent={parent}");
        }
        if let Some(file) = &record.file {
            print!(" file={file}");
        }
        if let Some(subdb) = &record.subdb {
            print!(" subdb={subdb}");
        }
        if let Some(key) = &record.key {
            print!(" key={key}");
        }
        if let Some(size) = record.value_size {
            print!(" value={size} bytes");
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ydb_core::{TxnId, XidChain};
    use ydb_storage::InMemoryBackend;

    fn frame(lsn: u64, record: &LogRecord) -> Vec<u8> {
        record.encode_frame(ydb_core::Lsn::new(lsn)).unwrap()
    }

    #[test]
    fn reads_records_with_limit() {
        let mut backend = InMemoryBackend::new();
        let chain = XidChain::root().push(TxnId::new(7)).unwrap();
        let records = [
            LogRecord::Begin {
                txid: TxnId::new(7),
                parent: None,
            },
            LogRecord::Insert {
                xids: chain,
                file: "./t1".into(),
                subdb: String::new(),
                key: b"k".to_vec(),
                value: b"value".to_vec(),
            },
            LogRecord::Commit {
                txid: TxnId::new(7),
            },
        ];
        for (i, record) in records.iter().enumerate() {
            backend.append(&frame(i as u64 + 1, record)).unwrap();
        }

        let all = read_records(&backend, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1].record_type, "INSERT");
        assert_eq!(all[1].txid, Some(7));
        assert_eq!(all[1].key.as_deref(), Some("k"));
        assert_eq!(all[1].value_size, Some(5));
        assert_eq!(all[1].subdb, None);

        let first = read_records(&backend, Some(1)).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].lsn, 1);
    }
}
