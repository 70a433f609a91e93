//! Error types for mavlog
//!
//! `MavlogError` covers reassembly, storage and configuration failures.
//! Upload failures have their own `UploadError` so the runtime's HTTP client can
//! report them without depending on the rest of the core error surface.

use std::path::PathBuf;

use crate::types::VehicleCommand;

// ----------------------------------------------------------------------------
// Upload Errors
// ----------------------------------------------------------------------------

/// Reasons a single log upload attempt can fail
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Upload transport error: {reason}")]
    Transport { reason: String },
    #[error("Upload rejected with HTTP status {code}")]
    Status { code: u16 },
    #[error("Upload aborted")]
    Aborted,
    #[error("Upload credentials missing (email or destination URL not configured)")]
    MissingCredentials,
    #[error("Log file missing: {path}")]
    FileMissing { path: PathBuf },
}

// ----------------------------------------------------------------------------
// Core Error Type
// ----------------------------------------------------------------------------

/// Core error type for log capture and management
#[derive(Debug, thiserror::Error)]
pub enum MavlogError {
    #[error("Corrupt log header: first chunk carries {len} bytes, at least 16 required")]
    CorruptHeader { len: usize },

    #[error("Log sink write failed: {0}")]
    SinkWrite(#[source] std::io::Error),

    #[error("Reassembly session already failed")]
    SessionFailed,

    #[error("Reassembly session is closed")]
    SessionClosed,

    #[error("Storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Vehicle rejected {command} with result {code}")]
    CommandRejected { command: VehicleCommand, code: u8 },

    #[error("No acknowledgement for {command} after {attempts} attempts")]
    CommandAckTimeout { command: VehicleCommand, attempts: u32 },

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),
}

impl MavlogError {
    /// Wrap an I/O error with the path it occurred on
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MavlogError::Storage {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, MavlogError>;
