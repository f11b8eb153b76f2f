//! Database and cursor behaviour against real environments.

mod common;

use common::TestEnv;
use std::sync::Arc;
use ydb_core::compare::{AsciiCaseInsensitive, KeyCompareMode, KeyDef, KeySegment, KeyType};
use ydb_core::{CursorOp, Database, DbFlags, DbOpenFlags, DbType, ErrorKind, PutFlags};

fn open(test: &TestEnv, fname: &str, dbname: Option<&str>, flags: DbOpenFlags) -> Database {
    let mut db = Database::create(Some(&test.env)).unwrap();
    db.open(None, fname, dbname, DbType::BTree, flags, 0o644)
        .unwrap();
    db
}

#[test]
fn private_put_get_del_close() {
    let mut db = Database::create(None).unwrap();
    db.open(None, "t1", None, DbType::BTree, DbOpenFlags::CREATE, 0o644)
        .unwrap();
    db.put(None, b"k", b"v", PutFlags::empty()).unwrap();
    assert_eq!(db.get(None, b"k").unwrap(), b"v");
    db.del(None, b"k").unwrap();
    assert!(db.get(None, b"k").unwrap_err().is_not_found());
    db.close(0).unwrap();
}

#[test]
fn create_excl_on_existing_file_leaves_it_alone() {
    let test = TestEnv::disk();
    let db = open(&test, "t1", None, DbOpenFlags::CREATE);
    db.put(None, b"k", b"v", PutFlags::empty()).unwrap();
    db.close(0).unwrap();
    let path = test.dir.path().join("t1");
    let before = std::fs::read(&path).unwrap();

    let mut db = Database::create(Some(&test.env)).unwrap();
    let err = db
        .open(
            None,
            "t1",
            None,
            DbType::BTree,
            DbOpenFlags::CREATE | DbOpenFlags::EXCL,
            0,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert!(!db.is_open());
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test]
fn create_on_existing_file_opens_it() {
    let test = TestEnv::disk();
    let db = open(&test, "t1", None, DbOpenFlags::CREATE);
    db.put(None, b"k", b"v", PutFlags::empty()).unwrap();
    db.close(0).unwrap();

    let db = open(&test, "t1", None, DbOpenFlags::CREATE);
    assert_eq!(db.get(None, b"k").unwrap(), b"v");
    assert_eq!(db.path(), Some(test.dir.path().join("t1").as_path()));
}

#[test]
fn data_survives_reopen() {
    let test = TestEnv::disk();
    let db = open(&test, "t1", None, DbOpenFlags::CREATE);
    let txn = test.env.txn_begin(None).unwrap();
    for i in 0..100u32 {
        db.put(Some(&txn), &i.to_be_bytes(), format!("v{i}").as_bytes(), PutFlags::empty())
            .unwrap();
    }
    txn.commit().unwrap();
    db.close(0).unwrap();
    let TestEnv { env, dir } = test;
    env.close(0).unwrap();

    let env = ydb_core::Environment::create();
    env.open(dir.path(), common::txn_flags(), 0).unwrap();
    let mut db = Database::create(Some(&env)).unwrap();
    db.open(None, "t1", None, DbType::Unknown, DbOpenFlags::empty(), 0)
        .unwrap();
    assert_eq!(db.stat().unwrap().ndata, 100);
    assert_eq!(db.get(None, &42u32.to_be_bytes()).unwrap(), b"v42");
}

#[test]
fn sub_databases_are_independent() {
    let test = TestEnv::disk();
    let users = open(&test, "app.db", Some("users"), DbOpenFlags::CREATE);
    let orders = open(&test, "app.db", Some("orders"), DbOpenFlags::CREATE);
    users.put(None, b"k", b"alice", PutFlags::empty()).unwrap();
    orders.put(None, b"k", b"order-1", PutFlags::empty()).unwrap();
    assert_eq!(users.get(None, b"k").unwrap(), b"alice");
    assert_eq!(orders.get(None, b"k").unwrap(), b"order-1");
    assert_eq!(users.dbname(), Some("users"));

    let mut again = Database::create(Some(&test.env)).unwrap();
    let err = again
        .open(
            None,
            "app.db",
            Some("users"),
            DbType::BTree,
            DbOpenFlags::CREATE | DbOpenFlags::EXCL,
            0,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    let err = again
        .open(None, "app.db", Some("missing"), DbType::BTree, DbOpenFlags::empty(), 0)
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn remove_sub_database() {
    let test = TestEnv::disk();
    for name in ["a", "b"] {
        let db = open(&test, "f.db", Some(name), DbOpenFlags::CREATE);
        db.put(None, b"k", name.as_bytes(), PutFlags::empty()).unwrap();
        db.close(0).unwrap();
    }

    Database::create(Some(&test.env))
        .unwrap()
        .remove("f.db", Some("a"), 0)
        .unwrap();

    let mut db = Database::create(Some(&test.env)).unwrap();
    let err = db
        .open(None, "f.db", Some("a"), DbType::BTree, DbOpenFlags::empty(), 0)
        .unwrap_err();
    assert!(err.is_not_found());
    let b = open(&test, "f.db", Some("b"), DbOpenFlags::empty());
    assert_eq!(b.get(None, b"k").unwrap(), b"b");

    let err = Database::create(Some(&test.env))
        .unwrap()
        .remove("f.db", Some("a"), 0)
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn remove_whole_file() {
    let test = TestEnv::disk();
    open(&test, "t1", None, DbOpenFlags::CREATE).close(0).unwrap();
    assert!(test.dir.path().join("t1").exists());

    Database::create(Some(&test.env))
        .unwrap()
        .remove("t1", None, 0)
        .unwrap();
    assert!(!test.dir.path().join("t1").exists());
    let mut db = Database::create(Some(&test.env)).unwrap();
    assert!(db
        .open(None, "t1", None, DbType::BTree, DbOpenFlags::empty(), 0)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn remove_refuses_an_open_file() {
    let test = TestEnv::disk();
    let held = open(&test, "t1", None, DbOpenFlags::CREATE);
    let err = Database::create(Some(&test.env))
        .unwrap()
        .remove("t1", None, 0)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(test.dir.path().join("t1").exists());
    held.close(0).unwrap();
}

#[test]
fn rename_whole_file() {
    let test = TestEnv::disk();
    let db = open(&test, "old", None, DbOpenFlags::CREATE);
    db.put(None, b"k", b"v", PutFlags::empty()).unwrap();
    db.close(0).unwrap();

    Database::create(Some(&test.env))
        .unwrap()
        .rename("old", None, "new", 0)
        .unwrap();
    assert!(!test.dir.path().join("old").exists());
    let db = open(&test, "new", None, DbOpenFlags::empty());
    assert_eq!(db.get(None, b"k").unwrap(), b"v");
}

#[test]
fn put_flags_guard_existing_data() {
    let test = TestEnv::memory();
    let db = test.db("t1");
    db.put(None, b"k", b"1", PutFlags::empty()).unwrap();
    let err = db.put(None, b"k", b"2", PutFlags::NOOVERWRITE).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    db.put(None, b"k", b"3", PutFlags::empty()).unwrap();
    assert_eq!(db.get(None, b"k").unwrap(), b"3");
    assert_eq!(db.stat().unwrap().ndata, 1);
}

#[test]
fn sorted_duplicates() {
    let test = TestEnv::memory();
    let mut db = Database::create(Some(&test.env)).unwrap();
    db.set_flags(DbFlags::DUPSORT).unwrap();
    db.open(None, "d", None, DbType::BTree, DbOpenFlags::CREATE, 0)
        .unwrap();
    for value in ["b", "a", "c"] {
        db.put(None, b"k", value.as_bytes(), PutFlags::empty())
            .unwrap();
    }
    db.put(None, b"z", b"x", PutFlags::empty()).unwrap();
    let err = db.put(None, b"k", b"a", PutFlags::NODUPDATA).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    db.put(None, b"k", b"a", PutFlags::empty()).unwrap();

    let mut cursor = db.cursor(None).unwrap();
    let mut values = vec![cursor.get(Some(&b"k"[..]), CursorOp::Set).unwrap().1];
    while let Ok((_, value)) = cursor.get(None, CursorOp::NextDup) {
        values.push(value);
    }
    assert_eq!(values, [b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    assert_eq!(cursor.get(None, CursorOp::NextNoDup).unwrap().0, b"z");
    drop(cursor);

    db.del(None, b"k").unwrap();
    assert_eq!(db.stat().unwrap().ndata, 1);
}

#[test]
fn insertion_ordered_duplicates() {
    let test = TestEnv::memory();
    let mut db = Database::create(Some(&test.env)).unwrap();
    db.set_flags(DbFlags::DUP).unwrap();
    db.open(None, "d", None, DbType::BTree, DbOpenFlags::CREATE, 0)
        .unwrap();
    for value in ["b", "a", "b"] {
        db.put(None, b"k", value.as_bytes(), PutFlags::empty())
            .unwrap();
    }
    let values: Vec<Vec<u8>> = db.cursor(None).unwrap().map(|p| p.unwrap().1).collect();
    assert_eq!(values, [b"b".to_vec(), b"a".to_vec(), b"b".to_vec()]);
    assert_eq!(db.get(None, b"k").unwrap(), b"b");
}

#[test]
fn custom_key_order() {
    let test = TestEnv::memory();
    let mut db = Database::create(Some(&test.env)).unwrap();
    db.set_bt_compare(Arc::new(|a: &[u8], b: &[u8]| b.cmp(a)))
        .unwrap();
    db.open(None, "r", None, DbType::BTree, DbOpenFlags::CREATE, 0)
        .unwrap();
    for key in ["a", "c", "b"] {
        db.put(None, key.as_bytes(), b"", PutFlags::empty()).unwrap();
    }
    let keys: Vec<Vec<u8>> = db.cursor(None).unwrap().map(|p| p.unwrap().0).collect();
    assert_eq!(keys, [b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
}

#[test]
fn key_definition_as_comparator() {
    let test = TestEnv::memory();
    let def = Arc::new(
        KeyDef::new(vec![
            KeySegment::new(KeyType::Text, 0, 4).collation(Arc::new(AsciiCaseInsensitive))
        ])
        .unwrap(),
    );
    let a = def.make_key(b"ABC ").unwrap();
    let b = def.make_key(b"abc ").unwrap();
    assert_eq!(
        def.compare(&a, &b, KeyCompareMode::Full).unwrap(),
        std::cmp::Ordering::Equal
    );

    let mut db = Database::create(Some(&test.env)).unwrap();
    db.set_bt_compare(Arc::clone(&def).comparator()).unwrap();
    db.open(None, "k", None, DbType::BTree, DbOpenFlags::CREATE, 0)
        .unwrap();
    db.put(None, &a, b"first", PutFlags::empty()).unwrap();
    db.put(None, &b, b"second", PutFlags::empty()).unwrap();
    assert_eq!(db.stat().unwrap().nkeys, 1);
    assert_eq!(db.get(None, &a).unwrap(), b"second");
}

#[test]
fn cursor_delete_is_undone_by_abort() {
    let test = TestEnv::memory();
    let db = test.db("t1");
    for key in ["a", "b", "c"] {
        db.put(None, key.as_bytes(), b"v", PutFlags::empty()).unwrap();
    }
    let txn = test.env.txn_begin(None).unwrap();
    {
        let mut cursor = db.cursor(Some(&txn)).unwrap();
        cursor.get(None, CursorOp::First).unwrap();
        cursor.del(0).unwrap();
        assert_eq!(cursor.get(None, CursorOp::Next).unwrap().0, b"b");
        cursor.close().unwrap();
    }
    assert!(db.get(None, b"a").unwrap_err().is_not_found());
    txn.abort().unwrap();
    assert_eq!(db.get(None, b"a").unwrap(), b"v");
}

#[test]
fn one_transaction_spans_databases() {
    let test = TestEnv::disk();
    let left = test.db("left");
    let right = test.db("right");
    let txn = test.env.txn_begin(None).unwrap();
    left.put(Some(&txn), b"k", b"l", PutFlags::empty()).unwrap();
    right.put(Some(&txn), b"k", b"r", PutFlags::empty()).unwrap();
    txn.abort().unwrap();
    assert!(left.get(None, b"k").unwrap_err().is_not_found());
    assert!(right.get(None, b"k").unwrap_err().is_not_found());
}

#[test]
fn key_range_brackets_a_key() {
    let test = TestEnv::memory();
    let db = test.db("t1");
    for key in ["a", "b", "c", "d"] {
        db.put(None, key.as_bytes(), b"", PutFlags::empty()).unwrap();
    }
    let range = db.key_range(None, b"b").unwrap();
    assert_eq!((range.less, range.equal, range.greater), (0.25, 0.25, 0.5));
    let range = db.key_range(None, b"bb").unwrap();
    assert_eq!((range.less, range.equal, range.greater), (0.5, 0.0, 0.5));
}
