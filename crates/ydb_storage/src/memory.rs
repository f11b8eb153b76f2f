//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory byte store.
///
/// Clones share the same bytes, so a [`crate::Vfs::memory`] table can hand
/// out a fresh handle on every open while the content outlives each of them.
///
/// ```rust
/// use ydb_storage::{StorageBackend, InMemoryBackend};
///
/// let mut a = InMemoryBackend::new();
/// let b = a.clone();
/// a.append(b"shared").unwrap();
/// assert_eq!(b.size().unwrap(), 6);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        match start.checked_add(len) {
            Some(end) if end <= data.len() => Ok(data[start..end].to_vec()),
            _ => Err(StorageError::ReadPastEnd { offset, len, size }),
        }
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_offsets() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"abc").unwrap(), 0);
        assert_eq!(backend.append(b"de").unwrap(), 3);
        assert_eq!(backend.read_at(1, 3).unwrap(), b"bcd");
    }

    #[test]
    fn read_past_end_fails() {
        let backend = InMemoryBackend::with_data(b"hello".to_vec());
        assert!(matches!(
            backend.read_at(3, 10),
            Err(StorageError::ReadPastEnd { .. })
        ));
        assert!(matches!(
            backend.read_at(u64::MAX, 1),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn clones_share_content() {
        let mut a = InMemoryBackend::new();
        let b = a.clone();
        a.append(b"xyz").unwrap();
        assert_eq!(b.data(), b"xyz");
    }

    #[test]
    fn overwrite_replaces_everything() {
        let mut backend = InMemoryBackend::with_data(b"old content".to_vec());
        backend.overwrite(b"new").unwrap();
        assert_eq!(backend.read_all().unwrap(), b"new");
    }

    #[test]
    fn truncate_cannot_grow() {
        let mut backend = InMemoryBackend::with_data(b"hi".to_vec());
        assert!(matches!(
            backend.truncate(10),
            Err(StorageError::TruncateBeyondEnd { .. })
        ));
        backend.truncate(1).unwrap();
        assert_eq!(backend.data(), b"h");
    }
}
