//! Cursors over a [`Database`].

use crate::db::Database;
use crate::error::{YdbError, YdbResult};
use crate::flags::CursorOp;
use crate::tree::TreeCursor;
use crate::txn::Transaction;
use std::fmt;

/// A position in a database, bound to an optional transaction.
///
/// A cursor borrows its database, so the database outlives it.
pub struct Cursor<'a> {
    db: &'a Database,
    txn: Option<&'a Transaction>,
    inner: Box<dyn TreeCursor + 'a>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(
        db: &'a Database,
        txn: Option<&'a Transaction>,
        inner: Box<dyn TreeCursor + 'a>,
    ) -> Self {
        Self { db, txn, inner }
    }

    /// Moves according to `op` and returns the pair found there.
    ///
    /// `key` is required by [`CursorOp::Set`] and [`CursorOp::SetRange`].
    ///
    /// # Errors
    ///
    /// `NotFound` when there is no pair to move to; the position is kept.
    pub fn get(&mut self, key: Option<&[u8]>, op: CursorOp) -> YdbResult<(Vec<u8>, Vec<u8>)> {
        self.db.env().check_health()?;
        self.inner.get(key, op, self.txn)
    }

    /// Deletes the pair under the cursor.
    pub fn del(&mut self, flags: u32) -> YdbResult<()> {
        if flags != 0 {
            return Err(YdbError::invalid_argument("cursor delete takes no flags"));
        }
        self.db.env().check_health()?;
        self.inner.delete(self.txn)
    }

    /// The transaction the cursor runs under.
    #[must_use]
    pub fn txn(&self) -> Option<&'a Transaction> {
        self.txn
    }

    /// Releases the position.
    pub fn close(mut self) -> YdbResult<()> {
        self.inner.close();
        Ok(())
    }
}

impl Iterator for Cursor<'_> {
    type Item = YdbResult<(Vec<u8>, Vec<u8>)>;

    /// Steps with [`CursorOp::Next`], ending at the last pair.
    fn next(&mut self) -> Option<Self::Item> {
        match self.get(None, CursorOp::Next) {
            Err(e) if e.is_not_found() => None,
            other => Some(other),
        }
    }
}

impl fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("db", &self.db.fname())
            .field("txn", &self.txn.map(Transaction::id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{DbOpenFlags, DbType, PutFlags};

    fn filled() -> Database {
        let mut db = Database::create(None).unwrap();
        db.open(None, "c", None, DbType::BTree, DbOpenFlags::CREATE, 0)
            .unwrap();
        for key in ["b", "a", "c"] {
            db.put(None, key.as_bytes(), b"v", PutFlags::empty()).unwrap();
        }
        db
    }

    #[test]
    fn iterates_in_key_order() {
        let db = filled();
        let keys: Vec<Vec<u8>> = db
            .cursor(None)
            .unwrap()
            .map(|pair| pair.unwrap().0)
            .collect();
        assert_eq!(keys, [b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn del_removes_current() {
        let db = filled();
        let mut cursor = db.cursor(None).unwrap();
        cursor.get(Some(&b"b"[..]), CursorOp::Set).unwrap();
        assert!(cursor.del(1).is_err());
        cursor.del(0).unwrap();
        cursor.close().unwrap();
        assert!(db.get(None, b"b").unwrap_err().is_not_found());
    }
}
