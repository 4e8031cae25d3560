#![no_main]

use libfuzzer_sys::fuzz_target;
use polydbm_storage::sorted_file::SortedFileReader;
use std::io::Write;

fuzz_target!(|data: &[u8]| {
    // Limit input size
    if data.len() > 10_000_000 {
        return;
    }

    // Write to temporary file and try to open and scan it as a skip file
    if let Ok(mut temp_file) = tempfile::NamedTempFile::new() {
        if temp_file.write_all(data).is_ok() {
            if let Ok(reader) = SortedFileReader::open(temp_file.path(), 16) {
                let _ = reader.get(b"key");
                let _ = reader.key_after(None, true);
                let _ = reader.key_before(None, true);
                let mut iter = reader.iter();
                while let Ok(Some(_)) = iter.next_entry() {}
            }
        }
    }
});
