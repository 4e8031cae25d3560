// Integration tests for record log writing and replay

mod common;

use common::LogTestFixture;
use polydbm_core::OpenParams;
use polydbm_log::{replay, LogMeta, LogReader, LogRecord, LogWriter, RecordPayload, SyncMode};
use std::collections::HashMap;

fn header() -> LogRecord {
    LogRecord::meta(LogMeta::new(
        "HashDBM",
        &OpenParams::new().with("num_buckets", "64"),
    ))
}

#[test]
fn test_log_write_and_replay_in_order() {
    let fixture = LogTestFixture::new();

    {
        let mut writer =
            LogWriter::create(fixture.path(), SyncMode::Async).expect("Failed to create log");
        writer.append(&header()).expect("Failed to append header");
        writer
            .append(&LogRecord::put(b"a".to_vec(), b"1".to_vec()))
            .expect("Failed to append");
        writer
            .append(&LogRecord::put(b"b".to_vec(), b"2".to_vec()))
            .expect("Failed to append");
        writer
            .append(&LogRecord::put(b"a".to_vec(), b"3".to_vec()))
            .expect("Failed to append");
        writer
            .append(&LogRecord::remove(b"b".to_vec()))
            .expect("Failed to append");
    }

    let mut state: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
    let replayed = replay(fixture.path(), |payload| match payload {
        RecordPayload::Put { key, value } => {
            state.insert(key, value);
        }
        RecordPayload::Remove { key } => {
            state.remove(&key);
        }
        RecordPayload::Meta(_) => {}
    })
    .expect("Failed to replay");

    assert_eq!(replayed.frames, 4);
    assert_eq!(replayed.valid_len, fixture.file_len());
    assert_eq!(state.len(), 1);
    assert_eq!(state.get(b"a".as_slice()), Some(&b"3".to_vec()));
    let meta = replayed.meta.expect("header expected");
    assert_eq!(meta.open_params().get("num_buckets"), Some("64"));
}

#[test]
fn test_resume_after_damage_keeps_new_frames_reachable() {
    let fixture = LogTestFixture::new();

    {
        let mut writer = LogWriter::create(fixture.path(), SyncMode::Sync).unwrap();
        writer.append(&header()).unwrap();
        for i in 0..5 {
            writer
                .append(&LogRecord::put(
                    format!("key{}", i).into_bytes(),
                    b"v".to_vec(),
                ))
                .unwrap();
        }
    }
    // chop the last frame in half
    let len = fixture.file_len();
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(fixture.path())
        .unwrap();
    file.set_len(len - 5).unwrap();
    drop(file);

    let damaged = replay(fixture.path(), |_| {}).unwrap();
    assert_eq!(damaged.frames, 4);
    assert!(damaged.damage.is_some());

    {
        let mut writer =
            LogWriter::resume(fixture.path(), damaged.valid_len, SyncMode::Sync).unwrap();
        writer
            .append(&LogRecord::put(b"fresh".to_vec(), b"v".to_vec()))
            .unwrap();
    }

    let healed = replay(fixture.path(), |_| {}).unwrap();
    assert_eq!(healed.frames, 5);
    assert!(healed.damage.is_none());
}

#[test]
fn test_reader_iterator() {
    let fixture = LogTestFixture::new();
    {
        let mut writer = LogWriter::create(fixture.path(), SyncMode::None).unwrap();
        writer.append(&header()).unwrap();
        for i in 0..100u32 {
            writer
                .append(&LogRecord::put(i.to_be_bytes().to_vec(), vec![0; 100]))
                .unwrap();
        }
        writer.flush().unwrap();
    }

    let reader = LogReader::open(fixture.path()).unwrap();
    let records: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
    assert_eq!(records.len(), 101);
}
