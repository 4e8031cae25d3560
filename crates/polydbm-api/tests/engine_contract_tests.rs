/// Behavior every backend shares, checked through the manager
use polydbm::{DbManager, DbmType, OpenParams, StatusCode, INCREMENT_NOOP};
use std::collections::HashSet;
use tempfile::{tempdir, TempDir};

fn open_each() -> (TempDir, Vec<DbManager>) {
    let dir = tempdir().unwrap();
    let dbs = DbmType::ALL
        .into_iter()
        .map(|dbm_type| {
            let mut db = DbManager::new();
            let path = dir.path().join(format!("contract.{}", dbm_type.extension()));
            db.open(&path, true, &OpenParams::new()).unwrap();
            db
        })
        .collect();
    (dir, dbs)
}

#[test]
fn test_set_then_get() {
    let (_dir, dbs) = open_each();
    for db in &dbs {
        db.set(b"key", b"value", true).unwrap();
        assert_eq!(db.get(b"key").unwrap(), b"value", "{}", db);
        db.set(b"key", b"other", true).unwrap();
        assert_eq!(db.get(b"key").unwrap(), b"other", "{}", db);
        assert_eq!(db.get(b"missing").unwrap_err().code(), StatusCode::NotFound);
    }
}

#[test]
fn test_set_without_overwrite_keeps_value() {
    let (_dir, dbs) = open_each();
    for db in &dbs {
        db.set(b"k", b"v1", false).unwrap();
        let err = db.set(b"k", b"v2", false).unwrap_err();
        assert_eq!(err.code(), StatusCode::Duplication, "{}", db);
        assert_eq!(db.get(b"k").unwrap(), b"v1");
    }
}

#[test]
fn test_remove() {
    let (_dir, dbs) = open_each();
    for db in &dbs {
        db.set(b"k", b"v", true).unwrap();
        db.remove(b"k").unwrap();
        assert_eq!(db.get(b"k").unwrap_err().code(), StatusCode::NotFound);
        assert_eq!(db.remove(b"k").unwrap_err().code(), StatusCode::NotFound, "{}", db);
        assert_eq!(db.count().unwrap(), 0);
    }
}

#[test]
fn test_append() {
    let (_dir, dbs) = open_each();
    for db in &dbs {
        db.set(b"k", b"a", true).unwrap();
        db.append(b"k", b"b", b"-").unwrap();
        assert_eq!(db.get(b"k").unwrap(), b"a-b");
        db.append(b"fresh", b"x", b"-").unwrap();
        assert_eq!(db.get(b"fresh").unwrap(), b"x", "{}", db);
    }
}

#[test]
fn test_increment() {
    let (_dir, dbs) = open_each();
    for db in &dbs {
        assert_eq!(db.increment(b"n", 5, 10).unwrap(), 15);
        assert_eq!(db.get(b"n").unwrap(), 15i64.to_be_bytes());
        assert_eq!(db.increment(b"n", -20, 0).unwrap(), -5);

        assert_eq!(db.increment(b"seeded", INCREMENT_NOOP, 7).unwrap(), 7);
        assert_eq!(db.get(b"seeded").unwrap(), 7i64.to_be_bytes(), "{}", db);

        db.set(b"text", b"abc", true).unwrap();
        let err = db.increment(b"text", 1, 0).unwrap_err();
        assert_eq!(err.code(), StatusCode::InvalidArgument);
    }
}

#[test]
fn test_compare_exchange() {
    let (_dir, dbs) = open_each();
    for db in &dbs {
        db.compare_exchange(b"k", None, Some(b"v1")).unwrap();
        assert_eq!(db.get(b"k").unwrap(), b"v1");
        assert_eq!(
            db.compare_exchange(b"k", None, Some(b"v2")).unwrap_err().code(),
            StatusCode::Duplication
        );
        assert_eq!(
            db.compare_exchange(b"k", Some(b"nope"), Some(b"v2")).unwrap_err().code(),
            StatusCode::Duplication
        );
        db.compare_exchange(b"k", Some(b"v1"), Some(b"v2")).unwrap();
        db.compare_exchange(b"k", Some(b"v2"), None).unwrap();
        assert_eq!(db.get(b"k").unwrap_err().code(), StatusCode::NotFound, "{}", db);
        assert_eq!(
            db.compare_exchange(b"k", Some(b"v2"), Some(b"v3")).unwrap_err().code(),
            StatusCode::NotFound
        );
    }
}

#[test]
fn test_full_pass_visits_each_key_once() {
    let (_dir, dbs) = open_each();
    for db in &dbs {
        for i in 0..100 {
            db.set(format!("key{:03}", i).as_bytes(), b"v", true).unwrap();
        }
        let mut iter = db.make_iterator().unwrap();
        iter.first().unwrap();
        let mut seen = Vec::new();
        while let Some((key, _)) = iter.step().unwrap() {
            seen.push(key);
        }
        let unique: HashSet<_> = seen.iter().cloned().collect();
        assert_eq!(seen.len(), 100, "{}", db);
        assert_eq!(unique.len(), 100);
        if db.is_ordered() {
            let mut sorted = seen.clone();
            sorted.sort();
            assert_eq!(seen, sorted, "{}", db);
        }
    }
}

#[test]
fn test_iterator_state_errors() {
    let (_dir, dbs) = open_each();
    for db in &dbs {
        db.set(b"only", b"v", true).unwrap();
        let mut iter = db.make_iterator().unwrap();
        assert_eq!(iter.next().unwrap_err().code(), StatusCode::Precondition);
        assert_eq!(iter.get().unwrap_err().code(), StatusCode::NotFound);
        assert_eq!(iter.remove().unwrap_err().code(), StatusCode::Precondition);

        iter.first().unwrap();
        iter.next().unwrap();
        assert_eq!(iter.get().unwrap_err().code(), StatusCode::NotFound, "{}", db);

        if !db.is_ordered() {
            assert_eq!(iter.last().unwrap_err().code(), StatusCode::Unsupported);
            assert_eq!(iter.previous().unwrap_err().code(), StatusCode::Unsupported);
            assert_eq!(
                iter.jump_upper(b"a", true).unwrap_err().code(),
                StatusCode::Unsupported
            );
        }
    }
}

#[test]
fn test_iterator_mutation_advances() {
    let (_dir, dbs) = open_each();
    for db in &dbs {
        for key in ["a", "b", "c", "d"] {
            db.set_str(key, "old", true).unwrap();
        }
        let mut iter = db.make_iterator().unwrap();
        iter.first().unwrap();
        let mut removed = 0;
        while let Ok((key, _)) = iter.get() {
            if removed < 2 {
                iter.remove().unwrap();
                removed += 1;
            } else {
                assert_eq!(db.get(&key).unwrap(), b"old");
                iter.set(b"new").unwrap();
            }
        }
        assert_eq!(db.count().unwrap(), 2, "{}", db);
        let mut iter = db.make_iterator().unwrap();
        iter.first().unwrap();
        while let Some((_, value)) = iter.step().unwrap() {
            assert_eq!(value, b"new");
        }
    }
}

#[test]
fn test_removed_key_is_skipped() {
    let (_dir, dbs) = open_each();
    for db in &dbs {
        for key in ["a", "b", "c"] {
            db.set_str(key, "v", true).unwrap();
        }
        let mut iter = db.make_iterator().unwrap();
        iter.first().unwrap();
        let (first, _) = iter.get().unwrap();
        iter.next().unwrap();
        let (second, _) = iter.get().unwrap();
        db.remove(&second).unwrap();
        let mut rest = Vec::new();
        while let Some((key, _)) = iter.step().unwrap() {
            rest.push(key);
        }
        assert!(!rest.contains(&second), "{}", db);
        assert!(!rest.contains(&first));
        assert_eq!(rest.len(), 1);
    }
}

#[test]
fn test_ordered_navigation() {
    let (_dir, dbs) = open_each();
    for db in dbs.iter().filter(|db| db.is_ordered()) {
        for key in ["10", "20", "30", "40"] {
            db.set_str(key, "v", true).unwrap();
        }
        let mut iter = db.make_iterator().unwrap();
        iter.jump(b"25").unwrap();
        assert_eq!(iter.get_key().unwrap(), b"30");
        iter.previous().unwrap();
        assert_eq!(iter.get_key().unwrap(), b"20");
        iter.last().unwrap();
        assert_eq!(iter.get_key().unwrap(), b"40");
        iter.jump_lower(b"30", true).unwrap();
        assert_eq!(iter.get_key().unwrap(), b"30");
        iter.jump_lower(b"30", false).unwrap();
        assert_eq!(iter.get_key().unwrap(), b"20");
        iter.jump_upper(b"40", false).unwrap();
        assert!(iter.get().is_err(), "{}", db);
        iter.jump_lower(b"05", true).unwrap();
        assert!(iter.get().is_err());
    }
}

#[test]
fn test_read_only_rejects_writes() {
    let dir = tempdir().unwrap();
    for dbm_type in DbmType::ALL {
        let path = dir.path().join(format!("ro.{}", dbm_type.extension()));
        let mut db = DbManager::new();
        db.open(&path, true, &OpenParams::new()).unwrap();
        db.set(b"k", b"v", true).unwrap();
        db.close().unwrap();

        db.open(&path, false, &OpenParams::new()).unwrap();
        assert!(!db.is_writable());
        assert_eq!(db.get(b"k").unwrap(), b"v", "{}", dbm_type);
        for err in [
            db.set(b"k", b"w", true).unwrap_err(),
            db.remove(b"k").unwrap_err(),
            db.append(b"k", b"w", b"").unwrap_err(),
            db.clear().unwrap_err(),
        ] {
            assert_eq!(err.code(), StatusCode::Precondition, "{}", dbm_type);
        }
        assert_eq!(db.get(b"k").unwrap(), b"v");
        db.close().unwrap();
    }
}

#[test]
fn test_inspect_common_properties() {
    let (_dir, dbs) = open_each();
    for db in &dbs {
        db.set(b"k", b"v", true).unwrap();
        let props = db.inspect().unwrap();
        for name in ["class", "path", "num_records", "file_size", "healthy"] {
            assert!(props.contains_key(name), "{} lacks {}", db, name);
        }
        assert_eq!(props["class"], db.dbm_type().unwrap().name());
        assert_eq!(props["num_records"], "1");
        assert_eq!(props["healthy"], "true");
    }
}

#[test]
fn test_file_size_by_kind() {
    let (_dir, dbs) = open_each();
    for db in &dbs {
        let dbm_type = db.dbm_type().unwrap();
        db.set(b"k", b"v", true).unwrap();
        db.synchronize(false, &OpenParams::new()).unwrap();
        match db.file_size() {
            Ok(size) => {
                assert!(dbm_type.is_file_based());
                assert!(size > 0, "{}", db);
            }
            Err(e) => {
                assert!(!dbm_type.is_file_based());
                assert_eq!(e.code(), StatusCode::Unsupported);
            }
        }
    }
}
