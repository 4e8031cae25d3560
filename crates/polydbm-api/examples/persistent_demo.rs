//! Demonstrates switching backends behind one API and reopening persistent data.
//!
//! Run with: cargo run -p polydbm --example persistent_demo

use polydbm::{DbManager, OpenParams};
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = Path::new("./demo_databases");

    println!("=== polydbm Persistent Database Demo ===\n");

    // Clean up any previous demo data
    if dir.exists() {
        std::fs::remove_dir_all(dir)?;
        println!("🧹 Cleaned up previous demo data\n");
    }
    std::fs::create_dir_all(dir)?;

    // PART 1: the same code against three backends
    println!("📝 PART 1: Writing the same records to three backends...");
    for file in ["users.tkh", "users.tkt", "users.tks"] {
        let mut db = DbManager::new();
        db.open(dir.join(file), true, &OpenParams::new())?;

        db.set_str("user:1:name", "Alice", true)?;
        db.set_str("user:2:name", "Bob", true)?;
        db.append_str("user:1:roles", "admin", ",")?;
        db.append_str("user:1:roles", "ops", ",")?;
        db.increment_str("stats:total_users", 2, 0)?;

        println!("   ✅ {}", db);
        db.close()?;
    }
    println!("   🔒 Databases closed\n");

    // PART 2: reopen read-only and walk the ordered one
    println!("🔓 PART 2: Reopening the tree database...");
    {
        let mut db = DbManager::new();
        db.open(dir.join("users.tkt"), false, &OpenParams::new())?;

        let mut iter = db.make_iterator()?;
        iter.first()?;
        while let Some((key, value)) = iter.step()? {
            let key = String::from_utf8_lossy(&key);
            match <[u8; 8]>::try_from(value.as_slice()) {
                // counters are 8-byte big-endian integers
                Ok(counter) if key.starts_with("stats:") => {
                    println!("   {} = {}", key, i64::from_be_bytes(counter))
                }
                _ => println!("   {} = {}", key, String::from_utf8_lossy(&value)),
            }
        }
    }

    // PART 3: sharding
    println!("\n🧩 PART 3: Sharded hash database...");
    {
        let mut db = DbManager::new();
        db.open(
            dir.join("events.tkh"),
            true,
            &OpenParams::new().with("num_shards", "4"),
        )?;
        for i in 0..1000 {
            db.set_str(&format!("event:{:04}", i), "payload", true)?;
        }
        let props = db.inspect()?;
        println!("   num_shards = {}", props["num_shards"]);
        println!("   num_records = {}", props["num_records"]);
        println!("   file_size = {}", props["file_size"]);
        db.close()?;

        // the shard count is found again from the file names
        db.open(dir.join("events.tkh"), false, &OpenParams::new())?;
        println!("   reopened: {}", db);
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}
