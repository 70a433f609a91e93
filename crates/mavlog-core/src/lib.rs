//! mavlog Core
//!
//! Reconstructs a contiguous ULog byte stream from lossy, possibly reordered
//! transport chunks and manages the lifecycle of captured log files:
//! - `reassembly`: sequence tracking, dropout synthesis and record framing
//! - `records`: the ordered collection of known log files
//! - `coordinator`: capture start/stop state machine and the upload queue
//! - `channel`: typed Command/Event/Effect/AppEvent protocol for the runtime
//!
//! Everything in this crate is synchronous. Side effects that need a timer, a
//! vehicle link or a network client are returned as [`Effect`]s and executed by
//! `mavlog-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod channel;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod reassembly;
pub mod records;
pub mod storage;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use channel::{
    create_app_event_channel, create_command_channel, create_event_channel, AppEvent,
    AppEventReceiver, AppEventSender, Command, CommandReceiver, CommandSender, Effect, Event,
    EventReceiver, EventSender, UploadOutcome, UploadRequest,
};
pub use config::{
    CaptureConfig, ChannelConfig, LogSettings, MemorySettingsStore, SettingsStore,
};
pub use coordinator::{CaptureState, LogCoordinator, Outputs};
pub use errors::{MavlogError, Result, UploadError};
pub use reassembly::{check_sequence, ChunkOutcome, ReassemblySession, SequenceCheck};
pub use records::{LogRecord, RecordChange, RecordField, RecordList};
pub use storage::{DirectoryStorage, LogStorage, StoredLog};
pub use types::{
    CommandResult, LogChunk, SystemTimeSource, TimeSource, VehicleCommand, VehicleId,
    NO_MESSAGE_START,
};
