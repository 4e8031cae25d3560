// Common test utilities for record log integration tests

use std::path::PathBuf;
use tempfile::TempDir;

/// Test fixture that owns a scratch directory for one log file
pub struct LogTestFixture {
    #[allow(dead_code)]
    pub temp_dir: TempDir,
    pub log_path: PathBuf,
}

impl LogTestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let log_path = temp_dir.path().join("casket.tkh");

        Self { temp_dir, log_path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.log_path
    }

    #[allow(dead_code)]
    pub fn file_len(&self) -> u64 {
        std::fs::metadata(&self.log_path)
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

impl Default for LogTestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_path_is_inside_temp_dir() {
        let fixture = LogTestFixture::new();
        assert!(fixture.path().starts_with(fixture.temp_dir.path()));
        assert!(!fixture.path().exists());
    }
}
