//! Streaming log record iterator.
//!
//! Records are read one at a time through a bounded buffer, so scanning a
//! large log during recovery does not load it into memory.

use crate::error::{YdbError, YdbResult};
use crate::log::record::{
    compute_crc32, LogRecord, LogRecordType, CRC_SIZE, HEADER_SIZE, LOG_MAGIC, LOG_VERSION,
};
use crate::types::Lsn;
use ydb_storage::StorageBackend;

const READ_BUFFER_SIZE: usize = 64 * 1024;

const LSN_SIZE: usize = 8;

/// One decoded record and where it sits in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Byte offset of the record envelope.
    pub offset: u64,
    /// Sequence number assigned on append.
    pub lsn: Lsn,
    /// The record.
    pub record: LogRecord,
}

/// A streaming iterator over log records.
///
/// - A truncated header or payload at the end is a clean end of log
/// - Bad magic, an unknown type, a newer version or a CRC mismatch is an error
pub struct LogIterator<'a> {
    backend: &'a dyn StorageBackend,
    total_size: u64,
    current_offset: u64,
    buffer: Vec<u8>,
    buffer_pos: usize,
    buffer_len: usize,
    finished: bool,
}

impl<'a> LogIterator<'a> {
    /// Creates an iterator starting at `start_offset`.
    pub fn new(backend: &'a dyn StorageBackend, start_offset: u64) -> YdbResult<Self> {
        let total_size = backend.size()?;
        Ok(Self {
            backend,
            total_size,
            current_offset: start_offset,
            buffer: vec![0u8; READ_BUFFER_SIZE],
            buffer_pos: 0,
            buffer_len: 0,
            finished: false,
        })
    }

    /// Offset just past the last complete record returned.
    ///
    /// After the iterator ends cleanly, anything beyond this is a torn tail.
    #[must_use]
    pub fn valid_end(&self) -> u64 {
        self.current_offset
    }

    fn ensure_buffered(&mut self, min_bytes: usize) -> YdbResult<bool> {
        let available = self.buffer_len - self.buffer_pos;
        if available >= min_bytes {
            return Ok(true);
        }

        let unread = self.total_size.saturating_sub(self.current_offset) as usize;
        if unread < min_bytes {
            return Ok(false);
        }

        if self.buffer_pos > 0 && available > 0 {
            self.buffer.copy_within(self.buffer_pos..self.buffer_len, 0);
        }
        self.buffer_len = available;
        self.buffer_pos = 0;

        if min_bytes > self.buffer.len() {
            self.buffer.resize(min_bytes.next_power_of_two(), 0);
        }

        let to_read = std::cmp::min(self.buffer.len() - self.buffer_len, unread - available);
        if to_read > 0 {
            let read_offset = self.current_offset + self.buffer_len as u64;
            let data = self.backend.read_at(read_offset, to_read)?;
            self.buffer[self.buffer_len..self.buffer_len + data.len()].copy_from_slice(&data);
            self.buffer_len += data.len();
        }

        Ok(self.buffer_len - self.buffer_pos >= min_bytes)
    }

    fn read_next(&mut self) -> YdbResult<Option<LogEntry>> {
        let offset = self.current_offset;

        if !self.ensure_buffered(HEADER_SIZE)? {
            return Ok(None);
        }

        let header = &self.buffer[self.buffer_pos..self.buffer_pos + HEADER_SIZE];
        if header[0..4] != LOG_MAGIC {
            return Err(YdbError::log_corruption(format!(
                "invalid magic at offset {offset}"
            )));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version > LOG_VERSION {
            return Err(YdbError::log_corruption(format!(
                "unsupported version {version} at offset {offset}"
            )));
        }
        let type_byte = header[6];
        let record_type = LogRecordType::from_byte(type_byte).ok_or_else(|| {
            YdbError::log_corruption(format!(
                "unknown record type {type_byte} at offset {offset}"
            ))
        })?;
        let payload_len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;
        if payload_len < LSN_SIZE {
            return Err(YdbError::log_corruption(format!(
                "record at offset {offset} has no sequence number"
            )));
        }

        let total_len = HEADER_SIZE + payload_len + CRC_SIZE;
        if !self.ensure_buffered(total_len)? {
            return Ok(None);
        }

        let start = self.buffer_pos;
        let payload_end = start + HEADER_SIZE + payload_len;
        let stored = u32::from_le_bytes([
            self.buffer[payload_end],
            self.buffer[payload_end + 1],
            self.buffer[payload_end + 2],
            self.buffer[payload_end + 3],
        ]);
        let computed = compute_crc32(&self.buffer[start..payload_end]);
        if stored != computed {
            return Err(YdbError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }

        let payload = &self.buffer[start + HEADER_SIZE..payload_end];
        let mut lsn = [0u8; LSN_SIZE];
        lsn.copy_from_slice(&payload[..LSN_SIZE]);
        let record = LogRecord::decode_payload(record_type, &payload[LSN_SIZE..])?;

        self.buffer_pos += total_len;
        self.current_offset += total_len as u64;

        Ok(Some(LogEntry {
            offset,
            lsn: Lsn::new(u64::from_le_bytes(lsn)),
            record,
        }))
    }
}

impl Iterator for LogIterator<'_> {
    type Item = YdbResult<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
