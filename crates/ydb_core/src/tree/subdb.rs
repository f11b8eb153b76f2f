//! Sorted contents of one sub-database.
//!
//! Every method here is a plain data operation; logging, transactions and
//! locking are handled by the callers. Recovery replays log records
//! through the same methods.

use crate::error::{YdbError, YdbResult};
use crate::flags::{DbFlags, PutFlags};
use crate::types::Lsn;
use std::cmp::Ordering;
use std::ops::Range;

/// Ordering used by the data operations.
pub(crate) type Cmp<'a> = &'a dyn Fn(&[u8], &[u8]) -> Ordering;

/// A key/value pair.
pub(crate) type Pair = (Vec<u8>, Vec<u8>);

/// One named sub-database.
///
/// `lsn` is the last logged mutation reflected in `entries`; recovery skips
/// records at or below it. `unordered` is set when recovery appended pairs
/// without a comparator; the next bind sorts them back into place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SubDb {
    pub(crate) flags: DbFlags,
    pub(crate) node_size: u32,
    pub(crate) lsn: Lsn,
    pub(crate) unordered: bool,
    pub(crate) entries: Vec<Pair>,
}

/// Where an insert will land, decided before anything is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InsertPlan {
    /// Insert a new pair at this index.
    At(usize),
    /// Overwrite the value at this index.
    Replace(usize),
    /// The exact pair is already stored.
    Unchanged,
}

/// Reverses one applied mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum UndoOp {
    /// Remove a pair that was inserted.
    Remove { key: Vec<u8>, value: Vec<u8> },
    /// Put back the value that was overwritten.
    Replace { key: Vec<u8>, old: Vec<u8> },
    /// Put back every pair of a deleted key.
    Restore { key: Vec<u8>, pairs: Vec<Pair> },
    /// Put back one pair at its place in the key's duplicates.
    Reinsert {
        key: Vec<u8>,
        value: Vec<u8>,
        ordinal: usize,
    },
}

impl SubDb {
    pub(crate) fn new(flags: DbFlags, node_size: u32) -> Self {
        Self {
            flags,
            node_size,
            lsn: Lsn::default(),
            unordered: false,
            entries: Vec::new(),
        }
    }

    /// Index range of every pair whose key equals `key`.
    pub(crate) fn key_run(&self, key: &[u8], cmp: Cmp<'_>) -> Range<usize> {
        let start = self
            .entries
            .partition_point(|(k, _)| cmp(k, key) == Ordering::Less);
        let end = start
            + self.entries[start..].partition_point(|(k, _)| cmp(k, key) == Ordering::Equal);
        start..end
    }

    /// Index of the first pair with a key not less than `key`.
    pub(crate) fn lower_bound(&self, key: &[u8], cmp: Cmp<'_>) -> usize {
        self.entries
            .partition_point(|(k, _)| cmp(k, key) == Ordering::Less)
    }

    /// Decides where `key`/`value` goes, or why it cannot.
    pub(crate) fn plan_insert(
        &self,
        key: &[u8],
        value: &[u8],
        cmp: Cmp<'_>,
        dup_cmp: Cmp<'_>,
        flags: PutFlags,
    ) -> YdbResult<InsertPlan> {
        let run = self.key_run(key, cmp);
        if !run.is_empty() && flags.contains(PutFlags::NOOVERWRITE) {
            return Err(YdbError::already_exists("key"));
        }

        if self.flags.contains(DbFlags::DUPSORT) {
            let dups = &self.entries[run.clone()];
            let offset = dups.partition_point(|(_, v)| dup_cmp(v, value) == Ordering::Less);
            if dups
                .get(offset)
                .is_some_and(|(_, v)| dup_cmp(v, value) == Ordering::Equal)
            {
                if flags.contains(PutFlags::NODUPDATA) {
                    return Err(YdbError::already_exists("key/data pair"));
                }
                return Ok(InsertPlan::Unchanged);
            }
            return Ok(InsertPlan::At(run.start + offset));
        }

        if self.flags.contains(DbFlags::DUP) {
            return Ok(InsertPlan::At(run.end));
        }

        if run.is_empty() {
            Ok(InsertPlan::At(run.start))
        } else {
            Ok(InsertPlan::Replace(run.start))
        }
    }

    /// Applies a plan, returning how to reverse it.
    pub(crate) fn apply_insert(
        &mut self,
        plan: InsertPlan,
        key: &[u8],
        value: &[u8],
    ) -> Option<UndoOp> {
        match plan {
            InsertPlan::At(index) => {
                self.entries.insert(index, (key.to_vec(), value.to_vec()));
                Some(UndoOp::Remove {
                    key: key.to_vec(),
                    value: value.to_vec(),
                })
            }
            InsertPlan::Replace(index) => {
                let old = std::mem::replace(&mut self.entries[index].1, value.to_vec());
                Some(UndoOp::Replace {
                    key: key.to_vec(),
                    old,
                })
            }
            InsertPlan::Unchanged => None,
        }
    }

    /// Removes every pair of `key`, returning them in order.
    pub(crate) fn remove_key(&mut self, key: &[u8], cmp: Cmp<'_>) -> Vec<Pair> {
        let run = self.key_run(key, cmp);
        self.entries.drain(run).collect()
    }

    /// Removes the pair at `index`, returning its place among its duplicates.
    pub(crate) fn remove_at(&mut self, index: usize, cmp: Cmp<'_>) -> (Pair, usize) {
        let run_start = self.lower_bound(&self.entries[index].0, cmp);
        let pair = self.entries.remove(index);
        (pair, index - run_start)
    }

    /// Removes the first pair equal to `key`/`value`, if any.
    pub(crate) fn remove_pair(&mut self, key: &[u8], value: &[u8], cmp: Cmp<'_>) -> bool {
        let run = self.key_run(key, cmp);
        let found = self.entries[run.clone()]
            .iter()
            .position(|(_, v)| v.as_slice() == value);
        match found {
            Some(offset) => {
                self.entries.remove(run.start + offset);
                true
            }
            None => false,
        }
    }

    /// Reverses a mutation recorded by [`SubDb::apply_insert`] or a delete.
    pub(crate) fn undo(&mut self, op: &UndoOp, cmp: Cmp<'_>) {
        match op {
            UndoOp::Remove { key, value } => {
                self.remove_pair(key, value, cmp);
            }
            UndoOp::Replace { key, old } => {
                let run = self.key_run(key, cmp);
                if run.is_empty() {
                    self.entries.insert(run.start, (key.clone(), old.clone()));
                } else {
                    self.entries[run.start].1.clone_from(old);
                }
            }
            UndoOp::Restore { key, pairs } => {
                let run = self.key_run(key, cmp);
                self.entries.splice(run, pairs.iter().cloned());
            }
            UndoOp::Reinsert {
                key,
                value,
                ordinal,
            } => {
                let run = self.key_run(key, cmp);
                let index = run.start + (*ordinal).min(run.len());
                self.entries.insert(index, (key.clone(), value.clone()));
            }
        }
    }

    /// Re-applies a logged insert during recovery.
    ///
    /// Keys are matched byte for byte and new pairs go at the end, so this
    /// works without knowing the comparator the pairs are ordered by.
    pub(crate) fn replay_insert(&mut self, key: &[u8], value: &[u8]) -> bool {
        if self.flags.contains(DbFlags::DUPSORT) {
            if self
                .entries
                .iter()
                .any(|(k, v)| k.as_slice() == key && v.as_slice() == value)
            {
                return false;
            }
        } else if !self.flags.contains(DbFlags::DUP) {
            if let Some((_, v)) = self.entries.iter_mut().find(|(k, _)| k.as_slice() == key) {
                value.clone_into(v);
                return true;
            }
        }
        self.entries.push((key.to_vec(), value.to_vec()));
        self.unordered = true;
        true
    }

    /// Re-applies a logged delete during recovery, matching bytes.
    pub(crate) fn replay_delete(&mut self, key: &[u8], value: Option<&[u8]>) -> bool {
        match value {
            Some(value) => {
                let found = self
                    .entries
                    .iter()
                    .position(|(k, v)| k.as_slice() == key && v.as_slice() == value);
                found.map(|index| self.entries.remove(index)).is_some()
            }
            None => {
                let before = self.entries.len();
                self.entries.retain(|(k, _)| k.as_slice() != key);
                self.entries.len() != before
            }
        }
    }

    /// Sorts pairs appended by recovery into comparator order.
    ///
    /// The sort is stable, so unsorted duplicates keep their insertion
    /// order. Without duplicates the later of two equal keys wins.
    pub(crate) fn reorder(&mut self, cmp: Cmp<'_>, dup_cmp: Cmp<'_>) {
        if self.flags.contains(DbFlags::DUPSORT) {
            self.entries
                .sort_by(|(ka, va), (kb, vb)| cmp(ka, kb).then_with(|| dup_cmp(va, vb)));
            self.entries.dedup_by(|(ka, va), (kb, vb)| {
                cmp(ka, kb) == Ordering::Equal && dup_cmp(va, vb) == Ordering::Equal
            });
        } else {
            self.entries.sort_by(|(a, _), (b, _)| cmp(a, b));
            if !self.flags.contains(DbFlags::DUP) {
                let mut kept: Vec<Pair> = Vec::with_capacity(self.entries.len());
                for pair in self.entries.drain(..) {
                    match kept.last_mut() {
                        Some(last) if cmp(&last.0, &pair.0) == Ordering::Equal => *last = pair,
                        _ => kept.push(pair),
                    }
                }
                self.entries = kept;
            }
        }
        self.unordered = false;
    }

    /// Number of distinct keys.
    pub(crate) fn distinct_keys(&self, cmp: Cmp<'_>) -> usize {
        self.entries
            .iter()
            .enumerate()
            .filter(|(i, (k, _))| *i == 0 || cmp(&self.entries[i - 1].0, k) != Ordering::Equal)
            .count()
    }

    /// Approximate payload size in bytes.
    pub(crate) fn footprint(&self) -> u64 {
        self.entries
            .iter()
            .map(|(k, v)| (k.len() + v.len()) as u64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytewise(a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn put(db: &mut SubDb, key: &[u8], value: &[u8], flags: PutFlags) -> YdbResult<Option<UndoOp>> {
        let plan = db.plan_insert(key, value, &bytewise, &bytewise, flags)?;
        Ok(db.apply_insert(plan, key, value))
    }

    fn values(db: &SubDb) -> Vec<&[u8]> {
        db.entries.iter().map(|(_, v)| v.as_slice()).collect()
    }

    #[test]
    fn plain_insert_overwrites() {
        let mut db = SubDb::new(DbFlags::empty(), 4096);
        put(&mut db, b"b", b"1", PutFlags::empty()).unwrap();
        put(&mut db, b"a", b"0", PutFlags::empty()).unwrap();
        let undo = put(&mut db, b"b", b"2", PutFlags::empty()).unwrap().unwrap();
        assert_eq!(values(&db), vec![&b"0"[..], b"2"]);

        db.undo(&undo, &bytewise);
        assert_eq!(values(&db), vec![&b"0"[..], b"1"]);
    }

    #[test]
    fn no_overwrite_rejects_existing_key() {
        let mut db = SubDb::new(DbFlags::empty(), 4096);
        put(&mut db, b"k", b"v", PutFlags::empty()).unwrap();
        let err = put(&mut db, b"k", b"w", PutFlags::NOOVERWRITE).unwrap_err();
        assert!(matches!(err, YdbError::AlreadyExists { .. }));
        assert_eq!(values(&db), vec![&b"v"[..]]);
    }

    #[test]
    fn unsorted_duplicates_keep_insertion_order() {
        let mut db = SubDb::new(DbFlags::DUP, 4096);
        put(&mut db, b"k", b"z", PutFlags::empty()).unwrap();
        put(&mut db, b"k", b"a", PutFlags::empty()).unwrap();
        put(&mut db, b"j", b"m", PutFlags::empty()).unwrap();
        assert_eq!(values(&db), vec![&b"m"[..], b"z", b"a"]);
    }

    #[test]
    fn sorted_duplicates() {
        let mut db = SubDb::new(DbFlags::DUPSORT, 4096);
        put(&mut db, b"k", b"z", PutFlags::empty()).unwrap();
        put(&mut db, b"k", b"a", PutFlags::empty()).unwrap();
        assert_eq!(values(&db), vec![&b"a"[..], b"z"]);

        assert_eq!(put(&mut db, b"k", b"a", PutFlags::empty()).unwrap(), None);
        let err = put(&mut db, b"k", b"a", PutFlags::NODUPDATA).unwrap_err();
        assert!(matches!(err, YdbError::AlreadyExists { .. }));
        assert_eq!(db.distinct_keys(&bytewise), 1);
    }

    #[test]
    fn restore_after_key_delete() {
        let mut db = SubDb::new(DbFlags::DUP, 4096);
        put(&mut db, b"k", b"1", PutFlags::empty()).unwrap();
        put(&mut db, b"k", b"2", PutFlags::empty()).unwrap();
        let pairs = db.remove_key(b"k", &bytewise);
        assert!(db.entries.is_empty());
        db.undo(
            &UndoOp::Restore {
                key: b"k".to_vec(),
                pairs,
            },
            &bytewise,
        );
        assert_eq!(values(&db), vec![&b"1"[..], b"2"]);
    }

    #[test]
    fn reinsert_keeps_duplicate_position() {
        let mut db = SubDb::new(DbFlags::DUP, 4096);
        for v in [b"1", b"2", b"3"] {
            put(&mut db, b"k", v, PutFlags::empty()).unwrap();
        }
        let ((key, value), ordinal) = db.remove_at(1, &bytewise);
        assert_eq!(ordinal, 1);
        db.undo(
            &UndoOp::Reinsert {
                key,
                value,
                ordinal,
            },
            &bytewise,
        );
        assert_eq!(values(&db), vec![&b"1"[..], b"2", b"3"]);
    }

    fn reverse(a: &[u8], b: &[u8]) -> Ordering {
        b.cmp(a)
    }

    #[test]
    fn replayed_pairs_are_sorted_by_the_bound_comparator() {
        let mut db = SubDb::new(DbFlags::empty(), 4096);
        for key in [b"c", b"a"] {
            let plan = db.plan_insert(key, b"old", &reverse, &bytewise, PutFlags::empty()).unwrap();
            db.apply_insert(plan, key, b"old");
        }
        assert!(db.replay_insert(b"b", b"1"));
        assert!(db.replay_insert(b"a", b"new"));
        assert!(db.replay_insert(b"d", b"1"));
        assert!(db.replay_delete(b"c", None));
        assert!(db.unordered);

        db.reorder(&reverse, &bytewise);
        assert!(!db.unordered);
        let keys: Vec<&[u8]> = db.entries.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![&b"d"[..], b"b", b"a"]);
        assert_eq!(db.entries[db.key_run(b"a", &reverse).start].1, b"new");
    }

    #[test]
    fn replay_keeps_duplicate_modes() {
        let mut sorted = SubDb::new(DbFlags::DUPSORT, 4096);
        assert!(sorted.replay_insert(b"k", b"z"));
        assert!(sorted.replay_insert(b"k", b"a"));
        assert!(!sorted.replay_insert(b"k", b"a"));
        sorted.reorder(&bytewise, &bytewise);
        assert_eq!(values(&sorted), vec![&b"a"[..], b"z"]);
        assert!(sorted.replay_delete(b"k", Some(b"z")));
        assert!(!sorted.replay_delete(b"k", Some(b"z")));

        let mut unsorted = SubDb::new(DbFlags::DUP, 4096);
        put(&mut unsorted, b"k", b"2", PutFlags::empty()).unwrap();
        unsorted.replay_insert(b"j", b"0");
        unsorted.replay_insert(b"k", b"1");
        unsorted.reorder(&bytewise, &bytewise);
        assert_eq!(values(&unsorted), vec![&b"0"[..], b"2", b"1"]);
    }
}
