//! mavlog Runtime
//!
//! Async execution for the synchronous coordinator in `mavlog-core`:
//! - `LogManagerTask`: the single task that owns the coordinator
//! - `AckTimer`: the one-shot acknowledgement timer
//! - `HttpUploader`: multipart uploads with progress and abort
//! - `RuntimeBuilder` / `RuntimeHandle`: wiring and control

pub mod builder;
pub mod error;
pub mod task;
pub mod timer;
pub mod uploader;
pub mod vehicle;

pub use builder::{RuntimeBuilder, RuntimeHandle};
pub use error::{RuntimeError, RuntimeResult};
pub use task::LogManagerTask;
pub use timer::AckTimer;
pub use uploader::{HttpUploader, LogUploader, FILE_FIELD};
pub use vehicle::{ChannelVehicleLink, NullVehicleLink, VehicleLink};

// Re-export core types for convenience
pub use mavlog_core::{
    AppEvent, AppEventReceiver, Command, CommandSender, Event, EventSender, LogCoordinator,
    UploadOutcome, UploadRequest,
};
