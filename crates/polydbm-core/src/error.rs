//! Error types for polydbm.

use std::fmt;
use thiserror::Error;

/// Classification of an operation outcome.
///
/// Every [`Error`] maps to exactly one non-success code; `Success` exists so
/// callers that log or count outcomes can treat `Ok` results uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// The operation succeeded
    Success,
    /// The record does not exist
    NotFound,
    /// The record exists when exclusivity was required, or the value mismatched
    Duplication,
    /// A parameter, pattern or value encoding is invalid
    InvalidArgument,
    /// The handle is in the wrong state for the operation
    Precondition,
    /// The database file is locked by another handle
    FileLock,
    /// The underlying storage failed to read or write
    Io,
    /// A structural inconsistency was detected
    Corruption,
    /// The backend does not support the operation
    Unsupported,
    /// Unclassified failure
    Unknown,
}

impl StatusCode {
    /// Returns the canonical upper-case name of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Success => "SUCCESS",
            StatusCode::NotFound => "NOT_FOUND_ERROR",
            StatusCode::Duplication => "DUPLICATION_ERROR",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT_ERROR",
            StatusCode::Precondition => "PRECONDITION_ERROR",
            StatusCode::FileLock => "FILE_LOCK_ERROR",
            StatusCode::Io => "IO_ERROR",
            StatusCode::Corruption => "CORRUPTION_ERROR",
            StatusCode::Unsupported => "UNSUPPORTED_OPERATION_ERROR",
            StatusCode::Unknown => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for polydbm operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Record not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Existing record or value mismatch
    #[error("duplication: {0}")]
    Duplication(String),

    /// Invalid parameter, pattern or encoding
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation attempted in the wrong handle state
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The file is locked by someone else
    #[error("file lock error: {0}")]
    FileLock(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Damaged data detected
    #[error("corruption: {0}")]
    Corruption(String),

    /// Operation not supported by the backend
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Anything else
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl Error {
    /// Returns the status code of this error.
    pub fn code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NotFound,
            Error::Duplication(_) => StatusCode::Duplication,
            Error::InvalidArgument(_) => StatusCode::InvalidArgument,
            Error::Precondition(_) => StatusCode::Precondition,
            Error::FileLock(_) => StatusCode::FileLock,
            Error::Io(_) => StatusCode::Io,
            Error::Corruption(_) => StatusCode::Corruption,
            Error::Unsupported(_) => StatusCode::Unsupported,
            Error::Unknown(_) => StatusCode::Unknown,
        }
    }

    /// Returns `true` for [`StatusCode::NotFound`].
    pub fn is_not_found(&self) -> bool {
        self.code() == StatusCode::NotFound
    }

    /// Builds the error a closed or never-opened handle reports.
    pub fn not_opened() -> Self {
        Error::Precondition("not opened database".to_string())
    }

    /// Builds the error a read-only handle reports on writes.
    pub fn not_writable() -> Self {
        Error::Precondition("not writable database".to_string())
    }
}

/// A specialized `Result` type for polydbm operations.
pub type Result<T> = std::result::Result<T, Error>;
