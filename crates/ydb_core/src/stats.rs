//! Transaction and database statistics.

use crate::flags::DbFlags;
use crate::types::TxnId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Environment-wide transaction counters.
///
/// All counters are atomic and can be read while transactions run.
#[derive(Debug, Default)]
pub(crate) struct TxnCounters {
    begun: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
    checkpoints: AtomicU64,
}

impl TxnCounters {
    pub(crate) fn record_begin(&self) {
        self.begun.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abort(&self) {
        self.aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_checkpoint(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot.
    pub(crate) fn snapshot(&self, last_txnid: Option<TxnId>) -> TxnStat {
        let begun = self.begun.load(Ordering::Relaxed);
        let committed = self.committed.load(Ordering::Relaxed);
        let aborted = self.aborted.load(Ordering::Relaxed);
        TxnStat {
            active: begun.saturating_sub(committed + aborted),
            begun,
            committed,
            aborted,
            checkpoints: self.checkpoints.load(Ordering::Relaxed),
            last_txnid,
        }
    }
}

/// Snapshot returned by [`crate::Environment::txn_stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxnStat {
    /// Transactions begun and not yet resolved.
    pub active: u64,
    /// Transactions begun since the environment opened.
    pub begun: u64,
    /// Transactions committed.
    pub committed: u64,
    /// Transactions aborted, explicitly or on drop.
    pub aborted: u64,
    /// Checkpoints taken.
    pub checkpoints: u64,
    /// Last id handed out, if any.
    pub last_txnid: Option<TxnId>,
}

/// Snapshot returned by [`crate::Database::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbStat {
    /// Distinct keys.
    pub nkeys: u64,
    /// Key/value pairs, counting every duplicate.
    pub ndata: u64,
    /// Configured node size.
    pub page_size: u32,
    /// Duplicate configuration.
    pub flags: DbFlags,
}

/// Position of a key relative to the database contents.
///
/// Each field is the fraction of pairs in that region; they sum to 1 unless
/// the database is empty, in which case all are 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyRange {
    /// Fraction of pairs with a smaller key.
    pub less: f64,
    /// Fraction of pairs with an equal key.
    pub equal: f64,
    /// Fraction of pairs with a greater key.
    pub greater: f64,
}

impl KeyRange {
    pub(crate) fn from_counts(less: usize, equal: usize, total: usize) -> Self {
        if total == 0 {
            return Self {
                less: 0.0,
                equal: 0.0,
                greater: 0.0,
            };
        }
        let total_f = total as f64;
        Self {
            less: less as f64 / total_f,
            equal: equal as f64 / total_f,
            greater: (total - less - equal) as f64 / total_f,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_tracks_active() {
        let counters = TxnCounters::default();
        counters.record_begin();
        counters.record_begin();
        counters.record_begin();
        counters.record_commit();
        counters.record_abort();
        let stat = counters.snapshot(Some(TxnId::new(3)));
        assert_eq!(stat.active, 1);
        assert_eq!(stat.begun, 3);
        assert_eq!(stat.last_txnid, Some(TxnId::new(3)));
    }

    #[test]
    fn key_range_fractions() {
        let range = KeyRange::from_counts(1, 2, 4);
        assert!((range.less - 0.25).abs() < f64::EPSILON);
        assert!((range.equal - 0.5).abs() < f64::EPSILON);
        assert!((range.greater - 0.25).abs() < f64::EPSILON);
        assert_eq!(KeyRange::from_counts(0, 0, 0).less, 0.0);
    }
}
