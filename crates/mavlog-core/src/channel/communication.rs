//! Channel Communication Protocol Types
//!
//! All traffic between the coordinator and the outside world flows through
//! these message types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::records::{RecordChange, RecordField};
use crate::types::{LogChunk, VehicleCommand, VehicleId};

// ----------------------------------------------------------------------------
// Command: User → Coordinator
// ----------------------------------------------------------------------------

/// Operations requested by the user or a front end
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    /// Start capturing from the current vehicle
    StartLogging,
    /// Stop the active capture
    StopLogging,
    /// Upload every selected, not yet uploaded log
    UploadLogs,
    /// Abort the in-flight upload and drop the rest of the queue
    CancelUpload,
    /// Delete every selected log
    DeleteSelected,
    /// Change the selection of one log
    SetSelected { name: String, selected: bool },
    SetEmail(String),
    SetDescription(String),
    SetUploadUrl(String),
    SetAutoUpload(bool),
    SetAutoStart(bool),
    SetDeleteAfterUpload(bool),
    /// Shutdown the manager gracefully
    Shutdown,
}

// ----------------------------------------------------------------------------
// Event: Vehicle / Uploader → Coordinator
// ----------------------------------------------------------------------------

/// How an upload attempt ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadOutcome {
    /// The server answered; only status 200 counts as success
    Response { status: u16, body: String },
    /// No usable response (transport error, abort, missing file)
    Failed { reason: String },
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Response { status: 200, .. })
    }
}

/// Events from the vehicle link and the uploader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// The active vehicle appeared, changed or disappeared
    VehicleChanged { vehicle: Option<VehicleId> },
    /// The active vehicle was armed or disarmed
    ArmedChanged { armed: bool },
    /// A chunk of the log stream arrived
    LogData(LogChunk),
    /// The vehicle acknowledged a command
    CommandAck { command_id: u16, result: u8 },
    /// The acknowledgement timer fired
    AckTimeout,
    /// Bytes of the current upload sent so far
    UploadProgress {
        name: String,
        bytes_sent: u64,
        bytes_total: u64,
    },
    /// The current upload completed
    UploadFinished { name: String, outcome: UploadOutcome },
}

// ----------------------------------------------------------------------------
// Effect: Coordinator → Runtime (External Side Effects Only)
// ----------------------------------------------------------------------------

/// Everything needed to upload one log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub name: String,
    pub file_path: PathBuf,
    pub url: String,
    pub email: String,
    pub description: String,
    pub source: String,
    pub version: String,
}

/// Side effects the runtime must carry out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Send a command to the vehicle (fire-and-forget)
    SendVehicleCommand(VehicleCommand),
    /// Arm, or re-arm, the acknowledgement timer
    ArmAckTimer { after: Duration },
    /// Cancel the acknowledgement timer
    CancelAckTimer,
    /// Start uploading a log
    BeginUpload(UploadRequest),
    /// Best-effort abort of the in-flight upload
    AbortUpload,
}

// ----------------------------------------------------------------------------
// AppEvent: Coordinator → User
// ----------------------------------------------------------------------------

/// Observable state changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppEvent {
    RecordAdded { name: String },
    RecordRemoved { name: String },
    RecordChanged(RecordChange),
    LoggingRunningChanged { running: bool },
    UploadingChanged { uploading: bool },
    SelectedCountChanged { count: usize },
    CanStartLogChanged { can_start: bool },
    /// One of the user preferences changed
    SettingsChanged,
    UploadSucceeded { name: String },
    UploadFailed { name: String, reason: String },
    /// Body returned by the server for an upload
    UploadResponse { name: String, body: String },
    /// A capture ended abnormally
    CaptureFailed { reason: String },
}

impl AppEvent {
    /// Upload progress; a later report carries the current value
    pub fn is_progress(&self) -> bool {
        matches!(
            self,
            AppEvent::RecordChanged(RecordChange {
                field: RecordField::Progress(_),
                ..
            })
        )
    }
}

impl fmt::Display for AppEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppEvent::RecordAdded { name } => write!(f, "log {} added", name),
            AppEvent::RecordRemoved { name } => write!(f, "log {} removed", name),
            AppEvent::RecordChanged(change) => {
                write!(f, "log {} changed: {:?}", change.name, change.field)
            }
            AppEvent::LoggingRunningChanged { running } => write!(f, "logging running: {}", running),
            AppEvent::UploadingChanged { uploading } => write!(f, "uploading: {}", uploading),
            AppEvent::SelectedCountChanged { count } => write!(f, "{} logs selected", count),
            AppEvent::CanStartLogChanged { can_start } => write!(f, "can start log: {}", can_start),
            AppEvent::SettingsChanged => write!(f, "settings changed"),
            AppEvent::UploadSucceeded { name } => write!(f, "log {} uploaded", name),
            AppEvent::UploadFailed { name, reason } => {
                write!(f, "upload of {} failed: {}", name, reason)
            }
            AppEvent::UploadResponse { name, body } => {
                write!(f, "server response for {}: {}", name, body)
            }
            AppEvent::CaptureFailed { reason } => write!(f, "capture failed: {}", reason),
        }
    }
}
