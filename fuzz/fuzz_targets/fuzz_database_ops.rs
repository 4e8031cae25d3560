#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use polydbm::{DbManager, DbmType, OpenParams};

#[derive(Arbitrary, Debug)]
enum DbOp {
    Set { key: Vec<u8>, value: Vec<u8>, overwrite: bool },
    Get { key: Vec<u8> },
    Remove { key: Vec<u8> },
    Append { key: Vec<u8>, value: Vec<u8> },
    Increment { key: Vec<u8>, delta: i64 },
    CompareExchange { key: Vec<u8>, expected: Option<Vec<u8>>, desired: Option<Vec<u8>> },
    Iterate,
}

#[derive(Arbitrary, Debug)]
struct Input {
    backend: u8,
    ops: Vec<DbOp>,
}

fuzz_target!(|input: Input| {
    // Memory-only backends keep fuzzing fast
    let memory = [DbmType::Tiny, DbmType::Baby, DbmType::Cache, DbmType::StdHash, DbmType::StdTree];
    let dbm_type = memory[input.backend as usize % memory.len()];
    let mut db = DbManager::new();
    if db.open("", true, &OpenParams::new().with("dbm", dbm_type.name())).is_err() {
        return;
    }
    for op in input.ops.iter().take(100) { // Limit operations to prevent timeout
        match op {
            DbOp::Set { key, value, overwrite } => {
                let _ = db.set(key, value, *overwrite);
            }
            DbOp::Get { key } => {
                let _ = db.get(key);
            }
            DbOp::Remove { key } => {
                let _ = db.remove(key);
            }
            DbOp::Append { key, value } => {
                let _ = db.append(key, value, b",");
            }
            DbOp::Increment { key, delta } => {
                let _ = db.increment(key, *delta, 0);
            }
            DbOp::CompareExchange { key, expected, desired } => {
                let _ = db.compare_exchange(key, expected.as_deref(), desired.as_deref());
            }
            DbOp::Iterate => {
                if let Ok(mut iter) = db.make_iterator() {
                    if iter.first().is_ok() {
                        while let Ok(Some(_)) = iter.step() {}
                    }
                }
            }
        }
    }
});
