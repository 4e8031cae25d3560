use polydbm::logging::LogConfig;
use polydbm::{DbManager, OpenParams};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (debug level with pretty output to stdout)
    let _guard = LogConfig::debug().init()?;

    println!("=== polydbm Logging Demo ===\n");

    let dir = tempfile::tempdir()?;

    // Opening logs the chosen class and path
    println!("1. Opening a tree database...");
    let mut db = DbManager::new();
    db.open(dir.path().join("demo.tkt"), true, &OpenParams::new())?;

    println!("\n2. Writing data...");
    db.set(b"user:1", b"Alice", true)?;
    db.set(b"user:2", b"Bob", true)?;
    db.set(b"user:3", b"Charlie", true)?;

    println!("\n3. Reading data...");
    println!("Found: {}", db.get_str("user:1")?);

    println!("\n4. Rebuilding...");
    db.rebuild(&OpenParams::new().with("max_page_size", "4096"))?;

    println!("\n5. Synchronizing and closing...");
    db.synchronize(true, &OpenParams::new())?;
    db.close()?;

    println!("\n=== Demo Complete ===");
    println!("Check the logs above to see tracing output!");

    Ok(())
}
