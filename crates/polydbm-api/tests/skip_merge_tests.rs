/// Tests for merging skip files on synchronize
use polydbm::{DbManager, OpenParams, StatusCode};
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn write_skip(path: &Path, records: &[(&str, &str)]) {
    let mut db = DbManager::new();
    db.open(path, true, &OpenParams::new().with("truncate", "true")).unwrap();
    for (key, value) in records {
        db.set_str(key, value, true).unwrap();
    }
    db.close().unwrap();
}

fn sources(dir: &Path) -> Vec<PathBuf> {
    let a = dir.join("a.tks");
    let b = dir.join("b.tks");
    let c = dir.join("c.tks");
    write_skip(&a, &[("k1", "a1"), ("k2", "a2")]);
    write_skip(&b, &[("k2", "b2"), ("k3", "b3")]);
    write_skip(&c, &[("k2", "c2")]);
    vec![a, b, c]
}

fn merged(dir: &Path, reducer: &str) -> DbManager {
    let paths = sources(dir);
    let merge = paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(":");
    let mut db = DbManager::new();
    db.open(
        dir.join(format!("main-{}.tks", reducer)),
        true,
        &OpenParams::new(),
    )
    .unwrap();
    db.set_str("k0", "m0", true).unwrap();
    db.set_str("k2", "m2", true).unwrap();
    db.synchronize(
        false,
        &OpenParams::new().with("merge", merge).with("reducer", reducer),
    )
    .unwrap();
    db
}

#[test]
fn test_reduce_to_first_keeps_own_value() {
    let dir = tempdir().unwrap();
    let db = merged(dir.path(), "ReduceToFirst");
    assert_eq!(db.count().unwrap(), 4);
    assert_eq!(db.get_str("k2").unwrap(), "m2");
    assert_eq!(db.get_str("k1").unwrap(), "a1");
    assert_eq!(db.get_str("k3").unwrap(), "b3");
}

#[test]
fn test_reduce_to_last_takes_last_source() {
    let dir = tempdir().unwrap();
    let db = merged(dir.path(), "ReduceToLast");
    assert_eq!(db.get_str("k2").unwrap(), "c2");
    assert_eq!(db.get_str("k0").unwrap(), "m0");
}

#[test]
fn test_reduce_concat_in_source_order() {
    let dir = tempdir().unwrap();
    let db = merged(dir.path(), "ReduceConcat");
    assert_eq!(db.get_str("k2").unwrap(), "m2a2b2c2");
    assert_eq!(db.get_str("k1").unwrap(), "a1");

    let mut iter = db.make_iterator().unwrap();
    iter.first().unwrap();
    let mut keys = Vec::new();
    while let Some((key, _)) = iter.step_str().unwrap() {
        keys.push(key);
    }
    assert_eq!(keys, ["k0", "k1", "k2", "k3"]);
}

#[test]
fn test_merge_survives_reopen() {
    let dir = tempdir().unwrap();
    let mut db = merged(dir.path(), "ReduceConcatWithLine");
    db.close().unwrap();
    db.open(dir.path().join("main-ReduceConcatWithLine.tks"), false, &OpenParams::new())
        .unwrap();
    assert_eq!(db.get_str("k2").unwrap(), "m2\na2\nb2\nc2");
}

#[test]
fn test_reduce_to_total() {
    let dir = tempdir().unwrap();
    let extra = dir.path().join("extra.tks");
    write_skip(&extra, &[("n", "40")]);
    let mut db = DbManager::new();
    db.open(dir.path().join("totals.tks"), true, &OpenParams::new()).unwrap();
    db.set_str("n", "2", true).unwrap();
    db.synchronize(
        true,
        &OpenParams::new()
            .with("merge", extra.display().to_string())
            .with("reducer", "ReduceToTotal"),
    )
    .unwrap();
    assert_eq!(db.get_str("n").unwrap(), "42");
}

#[test]
fn test_invalid_merge_params() {
    let dir = tempdir().unwrap();
    let mut db = DbManager::new();
    db.open(dir.path().join("bad.tks"), true, &OpenParams::new()).unwrap();
    let err = db
        .synchronize(false, &OpenParams::new().with("reducer", "ReduceToMiddle"))
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::InvalidArgument);
    let err = db
        .synchronize(false, &OpenParams::new().with("compress", "true"))
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::InvalidArgument);
    assert!(db
        .synchronize(false, &OpenParams::new().with("merge", dir.path().join("missing.tks").display().to_string()))
        .is_err());
}

#[test]
fn test_pending_updates_visible_before_synchronize() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pending.tks");
    write_skip(&path, &[("a", "1"), ("b", "2"), ("c", "3")]);

    let mut db = DbManager::new();
    db.open(&path, true, &OpenParams::new()).unwrap();
    db.remove(b"b").unwrap();
    db.set_str("bb", "new", true).unwrap();
    db.set_str("a", "changed", true).unwrap();
    assert_eq!(db.count().unwrap(), 3);
    let mut iter = db.make_iterator().unwrap();
    iter.first().unwrap();
    let mut records = Vec::new();
    while let Some(record) = iter.step_str().unwrap() {
        records.push(record);
    }
    assert_eq!(
        records,
        [
            ("a".to_string(), "changed".to_string()),
            ("bb".to_string(), "new".to_string()),
            ("c".to_string(), "3".to_string()),
        ]
    );
    assert_eq!(db.inspect().unwrap()["num_pending"], "3");
}
