//! Logging configuration for polydbm
//!
//! The library itself only emits `tracing` events. Applications that have no
//! subscriber of their own can install one here, writing to stdout, to a
//! daily rotated file, or to both.

use polydbm_core::{Error, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILE_NAME: &str = "polydbm.log";

/// Log output destination
#[derive(Debug, Clone)]
pub enum LogOutput {
    /// Output to stdout
    Stdout,
    /// Output to a file with daily rotation
    File(PathBuf),
    /// Output to both stdout and file
    Both(PathBuf),
}

/// Log format style
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line format (default)
    Pretty,
    /// Compact single-line format
    Compact,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level, as an `EnvFilter` directive. `RUST_LOG` wins when set.
    pub level: String,
    /// Output destination
    pub output: LogOutput,
    /// Format style
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: LogOutput::Stdout,
            format: LogFormat::Pretty,
        }
    }
}

impl LogConfig {
    /// Info level to stdout
    pub fn info() -> Self {
        Self::default()
    }

    /// Debug level to stdout; shows per-engine open and snapshot events
    pub fn debug() -> Self {
        Self::default().with_level("debug")
    }

    /// Warn level to stdout; only recovery anomalies and close failures
    pub fn warn() -> Self {
        Self::default().with_level("warn")
    }

    /// Write to a daily rotated file instead of stdout
    pub fn with_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output = LogOutput::File(path.into());
        self
    }

    /// Write to stdout and a daily rotated file
    pub fn with_both<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output = LogOutput::Both(path.into());
        self
    }

    /// Set log format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set log level filter
    pub fn with_level<S: Into<String>>(mut self, level: S) -> Self {
        self.level = level.into();
        self
    }

    fn filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .map_err(|e| Error::InvalidArgument(format!("invalid log level {:?}: {}", self.level, e)))
    }

    /// Installs the global subscriber.
    ///
    /// File output returns a guard that must be kept alive; dropping it
    /// flushes and stops the background writer. Fails with `Precondition`
    /// when a global subscriber is already installed.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use polydbm::logging::LogConfig;
    ///
    /// # fn main() -> polydbm::Result<()> {
    /// // Keep the guard alive for the lifetime of your application
    /// let _guard = LogConfig::info().with_file("logs/polydbm.log").init()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn init(self) -> Result<Option<WorkerGuard>> {
        let filter = self.filter()?;
        let registry = tracing_subscriber::registry().with(filter);
        let installed = match &self.output {
            LogOutput::Stdout => {
                let result = match self.format {
                    LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
                    LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
                };
                result.map(|()| None)
            }
            LogOutput::File(path) => {
                let (writer, guard) = file_writer(path);
                let result = match self.format {
                    LogFormat::Pretty => registry
                        .with(fmt::layer().with_writer(writer).with_ansi(false).pretty())
                        .try_init(),
                    LogFormat::Compact => registry
                        .with(fmt::layer().with_writer(writer).with_ansi(false).compact())
                        .try_init(),
                };
                result.map(|()| Some(guard))
            }
            LogOutput::Both(path) => {
                let (writer, guard) = file_writer(path);
                // both layers share one format; the file never gets colors
                let result = match self.format {
                    LogFormat::Pretty => registry
                        .with(fmt::layer().pretty())
                        .with(fmt::layer().with_writer(writer).with_ansi(false).pretty())
                        .try_init(),
                    LogFormat::Compact => registry
                        .with(fmt::layer().compact())
                        .with(fmt::layer().with_writer(writer).with_ansi(false).compact())
                        .try_init(),
                };
                result.map(|()| Some(guard))
            }
        };
        installed.map_err(|e| Error::Precondition(format!("logging already initialized: {}", e)))
    }
}

fn file_writer(path: &Path) -> (NonBlocking, WorkerGuard) {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_FILE_NAME);
    tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name))
}
