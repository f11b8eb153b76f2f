//! Log replay on open with `RECOVER`.
//!
//! A crash before write-back is simulated by putting back an earlier image
//! of the tree file after a clean shutdown; the log still holds every
//! record written since.

mod common;

use common::txn_flags;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use ydb_core::compare::CompareFn;
use ydb_core::log::{LogRecord, Logger, WalLogger};
use ydb_core::{Database, DbOpenFlags, DbType, EnvOpenFlags, Environment, PutFlags};
use ydb_storage::Vfs;

fn open_db(env: &Environment, flags: DbOpenFlags) -> Database {
    let mut db = Database::create(Some(env)).unwrap();
    db.open(None, "t1", None, DbType::BTree, flags, 0).unwrap();
    db
}

/// Writes a session's worth of work and returns the tree file image taken
/// right after the database was created.
fn crashed_session(home: &Path) -> Vec<u8> {
    let env = Environment::create();
    env.open(home, txn_flags(), 0).unwrap();
    let db = open_db(&env, DbOpenFlags::CREATE);
    let image = std::fs::read(home.join("t1")).unwrap();

    db.put(None, b"auto", b"1", PutFlags::empty()).unwrap();

    let committed = env.txn_begin(None).unwrap();
    db.put(Some(&committed), b"kept", b"1", PutFlags::empty())
        .unwrap();
    let child = env.txn_begin(Some(&committed)).unwrap();
    db.put(Some(&child), b"nested", b"1", PutFlags::empty())
        .unwrap();
    child.commit().unwrap();
    committed.commit().unwrap();

    let aborted = env.txn_begin(None).unwrap();
    db.put(Some(&aborted), b"lost", b"1", PutFlags::empty())
        .unwrap();
    aborted.abort().unwrap();

    let deleter = env.txn_begin(None).unwrap();
    db.del(Some(&deleter), b"auto").unwrap();
    deleter.commit().unwrap();

    db.close(0).unwrap();
    env.close(0).unwrap();
    image
}

#[test]
fn committed_work_is_replayed() {
    let dir = TempDir::new().unwrap();
    let image = crashed_session(dir.path());
    std::fs::write(dir.path().join("t1"), image).unwrap();

    let env = Environment::create();
    env.open(dir.path(), txn_flags() | EnvOpenFlags::RECOVER, 0)
        .unwrap();
    let db = open_db(&env, DbOpenFlags::empty());
    assert_eq!(db.get(None, b"kept").unwrap(), b"1");
    assert_eq!(db.get(None, b"nested").unwrap(), b"1");
    assert!(db.get(None, b"lost").unwrap_err().is_not_found());
    assert!(db.get(None, b"auto").unwrap_err().is_not_found());
    db.close(0).unwrap();
    env.close(0).unwrap();
}

#[test]
fn recovery_checkpoints_the_log() {
    let dir = TempDir::new().unwrap();
    crashed_session(dir.path());

    let env = Environment::create();
    env.open(dir.path(), txn_flags() | EnvOpenFlags::RECOVER, 0)
        .unwrap();
    env.close(0).unwrap();

    let log = WalLogger::open(&Vfs::disk(), dir.path()).unwrap();
    let entries = log.entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(matches!(
        entries[0].record,
        LogRecord::Checkpoint {
            last_txnid: Some(_)
        }
    ));
    log.close().unwrap();
}

#[test]
fn replay_is_idempotent() {
    let dir = TempDir::new().unwrap();
    crashed_session(dir.path());

    // The tree file already holds everything; replay must not duplicate.
    let env = Environment::create();
    env.open(dir.path(), txn_flags() | EnvOpenFlags::RECOVER, 0)
        .unwrap();
    let db = open_db(&env, DbOpenFlags::empty());
    assert_eq!(db.stat().unwrap().ndata, 2);
    db.close(0).unwrap();
    env.close(0).unwrap();
}

#[test]
fn recovery_skips_removed_files() {
    let dir = TempDir::new().unwrap();
    crashed_session(dir.path());
    std::fs::remove_file(dir.path().join("t1")).unwrap();

    let env = Environment::create();
    env.open(dir.path(), txn_flags() | EnvOpenFlags::RECOVER, 0)
        .unwrap();
    assert!(!dir.path().join("t1").exists());
    env.close(0).unwrap();
}

fn reverse_order() -> CompareFn {
    Arc::new(|a: &[u8], b: &[u8]| b.cmp(a))
}

fn open_reversed(env: &Environment, flags: DbOpenFlags) -> Database {
    let mut db = Database::create(Some(env)).unwrap();
    db.set_bt_compare(reverse_order()).unwrap();
    db.open(None, "rev", None, DbType::BTree, flags, 0).unwrap();
    db
}

#[test]
fn replay_respects_a_custom_key_order() {
    let dir = TempDir::new().unwrap();
    let env = Environment::create();
    env.open(dir.path(), txn_flags(), 0).unwrap();
    let db = open_reversed(&env, DbOpenFlags::CREATE);
    db.put(None, b"m", b"0", PutFlags::empty()).unwrap();
    env.txn_checkpoint().unwrap();
    let image = std::fs::read(dir.path().join("rev")).unwrap();

    let txn = env.txn_begin(None).unwrap();
    for key in [b"a", b"b", b"c", b"z"] {
        db.put(Some(&txn), key, b"1", PutFlags::empty()).unwrap();
    }
    db.del(Some(&txn), b"m").unwrap();
    txn.commit().unwrap();
    db.close(0).unwrap();
    env.close(0).unwrap();
    std::fs::write(dir.path().join("rev"), image).unwrap();

    let env = Environment::create();
    env.open(dir.path(), txn_flags() | EnvOpenFlags::RECOVER, 0)
        .unwrap();
    let db = open_reversed(&env, DbOpenFlags::empty());
    for key in [b"a", b"b", b"c", b"z"] {
        assert_eq!(db.get(None, key).unwrap(), b"1");
    }
    assert!(db.get(None, b"m").unwrap_err().is_not_found());
    let keys: Vec<Vec<u8>> = db.cursor(None).unwrap().map(|pair| pair.unwrap().0).collect();
    assert_eq!(keys, vec![b"z".to_vec(), b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
    db.close(0).unwrap();
    env.close(0).unwrap();
}
