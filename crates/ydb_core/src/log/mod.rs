//! Write-ahead log.
//!
//! Every mutation made through a database is appended here before the tree
//! is touched, and a transaction is committed once its `Commit` record has
//! been flushed.
//!
//! ## Record format
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | lsn (8) | body | crc32 (4) |
//! ```
//!
//! `length` covers the LSN and the body. The CRC covers everything before it.
//!
//! ## Recovery policy
//!
//! A record cut short at the end of the file is a crash during append and
//! is dropped. Anything else that fails validation stops the open: bad
//! magic, an unknown type, a newer version, or a CRC mismatch.
//!
//! Checkpoints truncate the file, so it only ever holds the work done
//! since the last checkpoint.

mod iterator;
mod logger;
mod record;

pub use iterator::{LogEntry, LogIterator};
pub use logger::{Logger, WalLogger, LOCK_FILE, LOG_FILE};
pub use record::{compute_crc32, LogRecord, LogRecordType, LOG_MAGIC, LOG_VERSION};
