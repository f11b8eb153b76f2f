//! Log record types and serialization.

use crate::error::{YdbError, YdbResult};
use crate::types::{Lsn, TxnId};
use crate::xids::XidChain;

/// Magic bytes identifying a log record.
pub const LOG_MAGIC: [u8; 4] = *b"YLOG";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

/// magic (4) + version (2) + type (1) + length (4)
pub(crate) const HEADER_SIZE: usize = 11;

pub(crate) const CRC_SIZE: usize = 4;

/// Type of log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// A transaction began.
    Begin = 1,
    /// A pair was inserted.
    Insert = 2,
    /// A key or pair was deleted.
    Delete = 3,
    /// A transaction committed.
    Commit = 4,
    /// A transaction aborted.
    Abort = 5,
    /// Every file was flushed; older records are gone.
    Checkpoint = 6,
}

impl LogRecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Begin),
            2 => Some(Self::Insert),
            3 => Some(Self::Delete),
            4 => Some(Self::Commit),
            5 => Some(Self::Abort),
            6 => Some(Self::Checkpoint),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A logged event.
///
/// Mutations name the tree file by its full path and carry the xid chain
/// of the transaction that made them; the root chain means the mutation
/// was not part of any transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// A transaction began.
    Begin {
        /// New transaction.
        txid: TxnId,
        /// Its parent, if nested.
        parent: Option<TxnId>,
    },
    /// A pair was inserted.
    Insert {
        /// Transaction chain of the writer.
        xids: XidChain,
        /// Tree file path.
        file: String,
        /// Sub-database name, empty for the whole file.
        subdb: String,
        /// Key.
        key: Vec<u8>,
        /// Value.
        value: Vec<u8>,
    },
    /// A key (every duplicate) or a single pair was deleted.
    Delete {
        /// Transaction chain of the writer.
        xids: XidChain,
        /// Tree file path.
        file: String,
        /// Sub-database name, empty for the whole file.
        subdb: String,
        /// Key.
        key: Vec<u8>,
        /// The deleted value when a single pair was removed.
        value: Option<Vec<u8>>,
    },
    /// A transaction committed.
    Commit {
        /// Transaction.
        txid: TxnId,
    },
    /// A transaction aborted.
    Abort {
        /// Transaction.
        txid: TxnId,
    },
    /// Checkpoint marker; the log was truncated just before it.
    Checkpoint {
        /// Highest transaction id handed out so far.
        last_txnid: Option<TxnId>,
    },
}

impl LogRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> LogRecordType {
        match self {
            Self::Begin { .. } => LogRecordType::Begin,
            Self::Insert { .. } => LogRecordType::Insert,
            Self::Delete { .. } => LogRecordType::Delete,
            Self::Commit { .. } => LogRecordType::Commit,
            Self::Abort { .. } => LogRecordType::Abort,
            Self::Checkpoint { .. } => LogRecordType::Checkpoint,
        }
    }

    /// Serializes the record body (without LSN or envelope).
    pub fn encode_payload(&self, buf: &mut Vec<u8>) -> YdbResult<()> {
        match self {
            Self::Begin { txid, parent } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                put_optional_id(buf, *parent);
            }
            Self::Insert {
                xids,
                file,
                subdb,
                key,
                value,
            } => {
                xids.encode_into(buf);
                put_str(buf, file)?;
                put_str(buf, subdb)?;
                put_bytes(buf, key)?;
                put_bytes(buf, value)?;
            }
            Self::Delete {
                xids,
                file,
                subdb,
                key,
                value,
            } => {
                xids.encode_into(buf);
                put_str(buf, file)?;
                put_str(buf, subdb)?;
                put_bytes(buf, key)?;
                match value {
                    Some(value) => {
                        buf.push(1);
                        put_bytes(buf, value)?;
                    }
                    None => buf.push(0),
                }
            }
            Self::Commit { txid } | Self::Abort { txid } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
            }
            Self::Checkpoint { last_txnid } => put_optional_id(buf, *last_txnid),
        }
        Ok(())
    }

    /// Deserializes a record from its type and body.
    pub fn decode_payload(record_type: LogRecordType, payload: &[u8]) -> YdbResult<Self> {
        let mut reader = PayloadReader::new(payload);
        let record = match record_type {
            LogRecordType::Begin => Self::Begin {
                txid: TxnId::new(reader.u64()?),
                parent: reader.optional_id()?,
            },
            LogRecordType::Insert => Self::Insert {
                xids: reader.xids()?,
                file: reader.string()?,
                subdb: reader.string()?,
                key: reader.bytes()?,
                value: reader.bytes()?,
            },
            LogRecordType::Delete => Self::Delete {
                xids: reader.xids()?,
                file: reader.string()?,
                subdb: reader.string()?,
                key: reader.bytes()?,
                value: match reader.u8()? {
                    0 => None,
                    _ => Some(reader.bytes()?),
                },
            },
            LogRecordType::Commit => Self::Commit {
                txid: TxnId::new(reader.u64()?),
            },
            LogRecordType::Abort => Self::Abort {
                txid: TxnId::new(reader.u64()?),
            },
            LogRecordType::Checkpoint => Self::Checkpoint {
                last_txnid: reader.optional_id()?,
            },
        };
        reader.finish(record_type)?;
        Ok(record)
    }

    /// Builds the full on-disk frame of this record.
    ///
    /// ```text
    /// | magic (4) | version (2) | type (1) | length (4) | lsn (8) | body | crc32 (4) |
    /// ```
    pub fn encode_frame(&self, lsn: Lsn) -> YdbResult<Vec<u8>> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&lsn.as_u64().to_le_bytes());
        self.encode_payload(&mut payload)?;

        let len = u32::try_from(payload.len())
            .map_err(|_| YdbError::invalid_argument("log record payload too large"))?;
        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&LOG_MAGIC);
        data.extend_from_slice(&LOG_VERSION.to_le_bytes());
        data.push(self.record_type().as_byte());
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&payload);
        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }
}

fn put_optional_id(buf: &mut Vec<u8>, id: Option<TxnId>) {
    buf.extend_from_slice(&id.map_or(0, TxnId::as_u64).to_le_bytes());
}

fn put_str(buf: &mut Vec<u8>, s: &str) -> YdbResult<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| YdbError::invalid_argument("name too long for a log record"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> YdbResult<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| YdbError::invalid_argument("log record payload too large"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> YdbResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| YdbError::log_corruption("unexpected end of payload"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> YdbResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> YdbResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> YdbResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> YdbResult<u64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    fn optional_id(&mut self) -> YdbResult<Option<TxnId>> {
        Ok(match self.u64()? {
            0 => None,
            id => Some(TxnId::new(id)),
        })
    }

    fn bytes(&mut self) -> YdbResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn string(&mut self) -> YdbResult<String> {
        let len = usize::from(self.u16()?);
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| YdbError::log_corruption("invalid UTF-8"))
    }

    fn xids(&mut self) -> YdbResult<XidChain> {
        let (xids, used) = XidChain::decode(&self.buf[self.pos..])?;
        self.pos += used;
        Ok(xids)
    }

    fn finish(&self, record_type: LogRecordType) -> YdbResult<()> {
        if self.pos != self.buf.len() {
            return Err(YdbError::log_corruption(format!(
                "trailing bytes in {record_type:?} record: expected {} bytes, got {}",
                self.pos,
                self.buf.len()
            )));
        }
        Ok(())
    }
}

/// Computes CRC32 checksum for data.
pub fn compute_crc32(data: &[u8]) -> u32 {
    // IEEE polynomial, reflected
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(ids: &[u64]) -> XidChain {
        ids.iter()
            .try_fold(XidChain::root(), |chain, id| chain.push(TxnId::new(*id)))
            .unwrap()
    }

    fn roundtrip(record: &LogRecord) -> LogRecord {
        let mut payload = Vec::new();
        record.encode_payload(&mut payload).unwrap();
        LogRecord::decode_payload(record.record_type(), &payload).unwrap()
    }

    #[test]
    fn record_type_bytes() {
        for t in [
            LogRecordType::Begin,
            LogRecordType::Insert,
            LogRecordType::Delete,
            LogRecordType::Commit,
            LogRecordType::Abort,
            LogRecordType::Checkpoint,
        ] {
            assert_eq!(LogRecordType::from_byte(t.as_byte()), Some(t));
        }
        assert_eq!(LogRecordType::from_byte(0), None);
    }

    #[test]
    fn mutation_records_carry_xids() {
        let insert = LogRecord::Insert {
            xids: chain(&[4, 9]),
            file: "/home/t.db".into(),
            subdb: "users".into(),
            key: b"k".to_vec(),
            value: vec![0; 300],
        };
        assert_eq!(roundtrip(&insert), insert);

        let delete = LogRecord::Delete {
            xids: XidChain::root(),
            file: "t.db".into(),
            subdb: String::new(),
            key: b"k".to_vec(),
            value: Some(b"v".to_vec()),
        };
        assert_eq!(roundtrip(&delete), delete);
    }

    #[test]
    fn begin_without_parent() {
        let record = LogRecord::Begin {
            txid: TxnId::new(1),
            parent: None,
        };
        assert_eq!(roundtrip(&record), record);
    }

    #[test]
    fn trailing_bytes_are_corruption() {
        let mut payload = Vec::new();
        LogRecord::Commit { txid: TxnId::new(7) }
            .encode_payload(&mut payload)
            .unwrap();
        payload.push(0);
        let err = LogRecord::decode_payload(LogRecordType::Commit, &payload).unwrap_err();
        assert!(matches!(err, YdbError::LogCorruption { .. }));
    }

    #[test]
    fn frame_layout() {
        let frame = LogRecord::Abort { txid: TxnId::new(2) }
            .encode_frame(Lsn::new(5))
            .unwrap();
        assert_eq!(&frame[..4], &LOG_MAGIC);
        assert_eq!(frame[6], LogRecordType::Abort.as_byte());
        assert_eq!(frame.len(), HEADER_SIZE + 16 + CRC_SIZE);
        let crc_at = frame.len() - CRC_SIZE;
        let stored = u32::from_le_bytes([
            frame[crc_at],
            frame[crc_at + 1],
            frame[crc_at + 2],
            frame[crc_at + 3],
        ]);
        assert_eq!(stored, compute_crc32(&frame[..crc_at]));
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }
}
