/// Tests for key search through the manager
use polydbm::{DbManager, DbmType, OpenParams, StatusCode};

fn open_with(dbm_type: DbmType, keys: &[&str]) -> DbManager {
    let mut db = DbManager::new();
    db.open("", true, &OpenParams::new().with("dbm", dbm_type.name()))
        .unwrap();
    for key in keys {
        db.set_str(key, "v", true).unwrap();
    }
    db
}

#[test]
fn test_begin_respects_capacity() {
    for dbm_type in [DbmType::StdHash, DbmType::Baby, DbmType::Tiny, DbmType::Cache] {
        let db = open_with(dbm_type, &["pre1", "pre2", "pre3", "other", "xpre"]);
        let found = db.search("begin", b"pre", 2, false).unwrap();
        assert_eq!(found.len(), 2, "{}", dbm_type);
        for key in &found {
            assert!(key.starts_with(b"pre"));
        }
        assert_eq!(db.search("begin", b"pre", 0, false).unwrap().len(), 3);
    }
}

#[test]
fn test_end_and_contain() {
    let db = open_with(DbmType::StdTree, &["alpha.txt", "beta.rs", "gamma.txt", "txt"]);
    assert_eq!(
        db.search_str("end", ".txt", 0).unwrap(),
        ["alpha.txt", "gamma.txt"]
    );
    assert_eq!(
        db.search_str("contain", "txt", 0).unwrap(),
        ["alpha.txt", "gamma.txt", "txt"]
    );
}

#[test]
fn test_regex_search() {
    let db = open_with(DbmType::StdTree, &["user:1", "user:22", "group:1", "user:x"]);
    assert_eq!(
        db.search_str("regex", r"^user:\d+$", 0).unwrap(),
        ["user:1", "user:22"]
    );
    let err = db.search("regex", b"[unclosed", 0, false).unwrap_err();
    assert_eq!(err.code(), StatusCode::InvalidArgument);
}

#[test]
fn test_edit_search_nearest_first() {
    let db = open_with(DbmType::Baby, &["kitten", "sitting", "mitten", "knitting", "bitten"]);
    let found = db.search_str("edit", "kitten", 2).unwrap();
    assert_eq!(found, ["kitten", "bitten"]);
    let all = db.search_str("edit", "kitten", 0).unwrap();
    assert_eq!(all.len(), 5);
    assert_eq!(all[0], "kitten");
}

#[test]
fn test_unknown_mode() {
    let db = open_with(DbmType::StdHash, &["a"]);
    let err = db.search("similar", b"a", 0, false).unwrap_err();
    assert_eq!(err.code(), StatusCode::InvalidArgument);
}

#[test]
fn test_search_into_keeps_results() {
    let db = open_with(DbmType::StdTree, &["a1", "a2", "b1"]);
    let mut out = vec![b"seed".to_vec()];
    db.search_into("begin", b"a", 0, false, &mut out).unwrap();
    assert_eq!(out, [b"seed".to_vec(), b"a1".to_vec(), b"a2".to_vec()]);

    let unopened = DbManager::new();
    let err = unopened.search("begin", b"a", 0, false).unwrap_err();
    assert_eq!(err.code(), StatusCode::Precondition);
}

#[test]
fn test_search_on_sharded_tree() {
    let mut db = DbManager::new();
    db.open(
        "",
        true,
        &OpenParams::new().with("dbm", "StdTreeDBM").with("num_shards", "3"),
    )
    .unwrap();
    for i in 0..30 {
        db.set_str(&format!("item{:02}", i), "v", true).unwrap();
    }
    assert_eq!(
        db.search_str("begin", "item2", 0).unwrap(),
        (20..30).map(|i| format!("item{}", i)).collect::<Vec<_>>()
    );
}

#[test]
fn test_edit_search_keeps_nearest_before_damaged_block() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("damaged.tks");
    let mut db = DbManager::new();
    db.open(&path, true, &OpenParams::new()).unwrap();
    for i in 0..2000 {
        db.set_str(&format!("key{:05}", i), "value", true).unwrap();
    }
    db.close().unwrap();

    // the first block ends near 4 KiB, so this lands in the second one
    let mut bytes = std::fs::read(&path).unwrap();
    assert!(bytes.len() > 12_000);
    bytes[6000] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    let mut db = DbManager::new();
    db.open(&path, false, &OpenParams::new()).unwrap();
    let mut out = Vec::new();
    let err = db
        .search_into("edit", b"key00000", 3, false, &mut out)
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::Corruption);
    assert_eq!(
        out,
        [b"key00000".to_vec(), b"key00001".to_vec(), b"key00002".to_vec()]
    );

    let mut out = Vec::new();
    assert!(db.search_into("begin", b"key", 0, false, &mut out).is_err());
    assert!(!out.is_empty());
    assert!(out.len() < 2000);
}
