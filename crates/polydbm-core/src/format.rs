//! File format versions and magic numbers.
//!
//! Every persistent file starts (record log) or ends (skip file) with a
//! header carrying one of these magic numbers and a format version, so a
//! reader can reject foreign or newer files before touching records.

/// Record log format version
pub const RECORD_LOG_FORMAT_VERSION: u16 = 1;

/// Skip file format version
pub const SKIP_FILE_FORMAT_VERSION: u16 = 1;

/// Magic numbers for file validation
pub mod magic {
    /// Record log magic: "PDLG" (PolyDbm LoG)
    pub const RECORD_LOG: u32 = 0x50444C47;

    /// Skip file magic: "PDSK" (PolyDbm SKip)
    pub const SKIP_FILE: u32 = 0x5044534B;
}

/// Version compatibility information
pub struct FormatVersion {
    /// Current version of this format
    pub current: u16,
    /// Minimum supported version for reading
    pub min_read: u16,
}

impl FormatVersion {
    /// Check if a version can be read
    pub fn can_read(&self, version: u16) -> bool {
        version >= self.min_read && version <= self.current
    }
}

/// Record log format version info
pub fn record_log_version() -> FormatVersion {
    FormatVersion {
        current: RECORD_LOG_FORMAT_VERSION,
        min_read: 1,
    }
}

/// Skip file format version info
pub fn skip_file_version() -> FormatVersion {
    FormatVersion {
        current: SKIP_FILE_FORMAT_VERSION,
        min_read: 1,
    }
}
