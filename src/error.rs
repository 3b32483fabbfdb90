//! Error types for telemetry ingestion.
//!
//! Two families of errors exist in this crate:
//!
//! - [`TelemetryError`] is what the embedding process sees: listener
//!   lifecycle failures, shutdown timeouts, configuration problems, and
//!   structural packet decode failures.
//! - [`StorageError`] is what a [`Store`](crate::storage::Store) backend
//!   returns. Sessions log these and keep going; they only reach the caller
//!   when a backend is being constructed.
//!
//! ## Error Categories
//!
//! - **Lifecycle Errors**: `AlreadyRunning`, `ServerClosed`, `Bind`
//! - **Decode Errors**: `PacketTooShort`, `OutOfBounds` (never leave the listener)
//! - **Shutdown Errors**: `ShutdownTimeout`
//! - **Configuration Errors**: `Config`, `File`
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use forza_telemetry::TelemetryError;
//!
//! let error = TelemetryError::bind_failed(
//!     "0.0.0.0:8000",
//!     std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
//! );
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for telemetry operations.
pub type Result<T, E = TelemetryError> = std::result::Result<T, E>;

/// Main error type for telemetry operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TelemetryError {
    #[error("Telemetry listener already running")]
    AlreadyRunning,

    #[error("Telemetry listener closed")]
    ServerClosed,

    #[error("Failed to bind telemetry socket on {addr}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Datagram too short: expected at least {expected} bytes, got {actual}")]
    PacketTooShort { expected: usize, actual: usize },

    #[error("Read past end of packet at offset {offset:#x}")]
    OutOfBounds { offset: usize },

    #[error("Shutdown timed out after {duration:?} with {pending} session(s) still closing")]
    ShutdownTimeout { duration: Duration, pending: usize },

    #[error("Configuration error in {context}: {details}")]
    Config { context: String, details: String },

    #[error("Configuration file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors returned by storage backends.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StorageError {
    #[error("No samples recorded for race {race_id}")]
    NotFound { race_id: Uuid },

    #[error("Storage I/O error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize or deserialize {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// True when the error only means "nothing stored yet".
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    /// Helper constructor for I/O errors with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io { path: path.into(), source }
    }
}

impl TelemetryError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            TelemetryError::AlreadyRunning => false,
            TelemetryError::ServerClosed => true,
            TelemetryError::Bind { .. } => true,
            TelemetryError::PacketTooShort { .. } => false,
            TelemetryError::OutOfBounds { .. } => false,
            TelemetryError::ShutdownTimeout { .. } => false,
            TelemetryError::Config { .. } => false,
            TelemetryError::File { .. } => false,
            TelemetryError::Storage(StorageError::Io { .. }) => true,
            TelemetryError::Storage(_) => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            TelemetryError::AlreadyRunning => vec![
                "Shut the running listener down before starting it again",
                "Use a separate server instance per listening address",
            ],
            TelemetryError::ServerClosed => vec![
                "Start the listener again if the shutdown was not intended",
                "Check the logs for socket read failures",
            ],
            TelemetryError::Bind { .. } => vec![
                "Check that no other process is bound to the address",
                "Verify the listen address format (host:port)",
                "Use a port above 1024 when running unprivileged",
            ],
            TelemetryError::PacketTooShort { .. } | TelemetryError::OutOfBounds { .. } => vec![
                "Set the game's data out packet format to Dash",
                "Verify the sender is a Forza Motorsport client",
            ],
            TelemetryError::ShutdownTimeout { .. } => vec![
                "Increase the shutdown timeout",
                "Check storage latency, sessions flush before closing",
            ],
            TelemetryError::Config { .. } => vec![
                "Check the configuration values against the documented defaults",
                "Remove the offending key to fall back to its default",
            ],
            TelemetryError::File { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
            ],
            TelemetryError::Storage(_) => vec![
                "Check the data directory exists and is writable",
                "Check free disk space",
                "Inspect races.json for corruption",
            ],
        }
    }

    /// Helper constructor for bind errors.
    pub fn bind_failed(addr: impl Into<String>, source: std::io::Error) -> Self {
        TelemetryError::Bind { addr: addr.into(), source }
    }

    /// Helper constructor for configuration errors.
    pub fn config(context: impl Into<String>, details: impl Into<String>) -> Self {
        TelemetryError::Config { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        TelemetryError::File { path, source }
    }
}
