//! Channel Module
//!
//! - `communication`: commands, events, effects and app events
//! - `utils`: channel type aliases and constructors

pub mod communication;
pub mod utils;

pub use communication::{AppEvent, Command, Effect, Event, UploadOutcome, UploadRequest};

pub use crate::config::ChannelConfig;

pub use utils::{
    create_app_event_channel, create_command_channel, create_event_channel, AppEventReceiver,
    AppEventSender, ChannelError, CommandReceiver, CommandSender, EventReceiver, EventSender,
    NonBlockingSend,
};
