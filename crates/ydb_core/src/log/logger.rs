//! The write-ahead logger.

use crate::error::{YdbError, YdbResult};
use crate::log::iterator::{LogEntry, LogIterator};
use crate::log::record::LogRecord;
use crate::types::{Lsn, TxnId};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use ydb_storage::{StorageBackend, Vfs};

/// Name of the log file inside the log directory.
pub const LOG_FILE: &str = "ydb.log";

/// Advisory lock held while a logger has the directory open.
pub const LOCK_FILE: &str = "ydb.lock";

/// Write-ahead log used by an environment.
///
/// Appends are serialized by the implementation. `commit` is the durability
/// point of a transaction: once it returns `Ok`, the commit record is on
/// stable storage.
pub trait Logger: Send + Sync + fmt::Debug {
    /// Appends a record, returning its sequence number.
    fn append(&self, record: &LogRecord) -> YdbResult<Lsn>;

    /// Forces every appended record to stable storage.
    fn flush(&self) -> YdbResult<()>;

    /// Registers a new transaction under `parent`.
    fn begin(&self, txid: TxnId, parent: Option<TxnId>) -> YdbResult<Lsn> {
        self.append(&LogRecord::Begin { txid, parent })
    }

    /// Durably records that `txid` committed.
    fn commit(&self, txid: TxnId) -> YdbResult<Lsn> {
        let lsn = self.append(&LogRecord::Commit { txid })?;
        self.flush()?;
        Ok(lsn)
    }

    /// Records that `txid` aborted.
    fn abort(&self, txid: TxnId) -> YdbResult<Lsn> {
        self.append(&LogRecord::Abort { txid })
    }

    /// Discards every record and starts over with a checkpoint marker.
    ///
    /// Callers must have made the effects of all logged work durable first.
    fn checkpoint(&self, last_txnid: Option<TxnId>) -> YdbResult<Lsn>;

    /// Sequence number of the last appended record, or zero.
    fn last_lsn(&self) -> Lsn;

    /// Highest transaction id the log has seen.
    fn last_txnid(&self) -> Option<TxnId>;

    /// Reads back every record currently in the log.
    fn entries(&self) -> YdbResult<Vec<LogEntry>>;

    /// Flushes and releases the log.
    fn close(&self) -> YdbResult<()>;
}

struct LogState {
    backend: Box<dyn StorageBackend>,
    next_lsn: Lsn,
    last_txnid: Option<TxnId>,
    closed: bool,
}

impl LogState {
    fn write(&mut self, record: &LogRecord) -> YdbResult<Lsn> {
        if self.closed {
            return Err(YdbError::invalid_state("log is closed"));
        }
        let lsn = self.next_lsn;
        let frame = record.encode_frame(lsn)?;
        self.backend.append(&frame)?;
        self.next_lsn = lsn.next();
        self.observe(record);
        Ok(lsn)
    }

    fn observe(&mut self, record: &LogRecord) {
        let seen = match record {
            LogRecord::Begin { txid, .. } => Some(*txid),
            LogRecord::Checkpoint { last_txnid } => *last_txnid,
            _ => None,
        };
        if seen > self.last_txnid {
            self.last_txnid = seen;
        }
    }
}

/// A [`Logger`] writing a single append-only file.
///
/// On disk the log directory is guarded by an advisory lock so two
/// environments cannot interleave records.
pub struct WalLogger {
    path: PathBuf,
    state: Mutex<LogState>,
    lock: Mutex<Option<File>>,
}

impl WalLogger {
    /// Opens (creating if needed) the log in `dir`.
    ///
    /// The existing log is scanned to restore the sequence and transaction
    /// counters; a torn final record is cut off.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `dir` is not a directory
    /// - `InvalidState` if another logger holds the directory lock
    /// - a corruption error if a complete record fails validation
    pub fn open(vfs: &Vfs, dir: &Path) -> YdbResult<Self> {
        if !vfs.is_dir(dir) {
            return Err(YdbError::not_found(format!(
                "log directory {}",
                dir.display()
            )));
        }

        let lock = if vfs.is_memory() {
            None
        } else {
            let lock_file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(dir.join(LOCK_FILE))?;
            if lock_file.try_lock_exclusive().is_err() {
                return Err(YdbError::invalid_state(format!(
                    "log directory {} is locked by another environment",
                    dir.display()
                )));
            }
            Some(lock_file)
        };

        let path = dir.join(LOG_FILE);
        let mut backend = vfs.open(&path, true)?;

        let mut last_lsn = Lsn::default();
        let mut replayed = Vec::new();
        let valid_end = {
            let mut iter = LogIterator::new(backend.as_ref(), 0)?;
            for entry in iter.by_ref() {
                let entry = entry?;
                last_lsn = last_lsn.max(entry.lsn);
                replayed.push(entry.record);
            }
            iter.valid_end()
        };
        let size = backend.size()?;
        if valid_end < size {
            warn!(
                path = %path.display(),
                valid_end,
                size,
                "discarding torn log tail"
            );
            backend.truncate(valid_end)?;
            backend.sync()?;
        }

        let mut state = LogState {
            backend,
            next_lsn: last_lsn.next(),
            last_txnid: None,
            closed: false,
        };
        for record in &replayed {
            state.observe(record);
        }

        info!(
            path = %path.display(),
            records = replayed.len(),
            last_lsn = last_lsn.as_u64(),
            "log opened"
        );

        Ok(Self {
            path,
            state: Mutex::new(state),
            lock: Mutex::new(lock),
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Logger for WalLogger {
    fn append(&self, record: &LogRecord) -> YdbResult<Lsn> {
        self.state.lock().write(record)
    }

    fn flush(&self) -> YdbResult<()> {
        let mut state = self.state.lock();
        state.backend.flush()?;
        state.backend.sync()?;
        Ok(())
    }

    fn checkpoint(&self, last_txnid: Option<TxnId>) -> YdbResult<Lsn> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(YdbError::invalid_state("log is closed"));
        }
        state.backend.truncate(0)?;
        let lsn = state.write(&LogRecord::Checkpoint { last_txnid })?;
        state.backend.flush()?;
        state.backend.sync()?;
        debug!(lsn = lsn.as_u64(), "log truncated at checkpoint");
        Ok(lsn)
    }

    fn last_lsn(&self) -> Lsn {
        Lsn::new(self.state.lock().next_lsn.as_u64().saturating_sub(1))
    }

    fn last_txnid(&self) -> Option<TxnId> {
        self.state.lock().last_txnid
    }

    fn entries(&self) -> YdbResult<Vec<LogEntry>> {
        let state = self.state.lock();
        LogIterator::new(state.backend.as_ref(), 0)?.collect()
    }

    fn close(&self) -> YdbResult<()> {
        let result = {
            let mut state = self.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            state
                .backend
                .flush()
                .and_then(|()| state.backend.sync())
                .map_err(YdbError::from)
        };
        // Dropping the file releases the advisory lock.
        self.lock.lock().take();
        debug!(path = %self.path.display(), "log closed");
        result
    }
}

impl fmt::Debug for WalLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalLogger")
            .field("path", &self.path)
            .field("last_lsn", &self.last_lsn())
            .finish()
    }
}
