#![no_main]

use libfuzzer_sys::fuzz_target;
use polydbm_log::LogRecord;

fuzz_target!(|data: &[u8]| {
    // Limit input size to prevent timeout
    if data.len() > 1_000_000 {
        return;
    }

    // Decoding arbitrary bytes must fail cleanly, never panic
    let mut offset = 0;
    while offset < data.len() {
        match LogRecord::decode(&data[offset..]) {
            Ok((_, used)) if used > 0 => offset += used,
            _ => break,
        }
    }
});
