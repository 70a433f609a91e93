//! Core value types shared across the crate

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// First-message offset meaning "no record starts inside this chunk"
pub const NO_MESSAGE_START: u8 = 255;

/// Command identifier for starting the remote log stream
pub const CMD_LOGGING_START: u16 = 2510;

/// Command identifier for stopping the remote log stream
pub const CMD_LOGGING_STOP: u16 = 2511;

// ----------------------------------------------------------------------------
// Vehicle Identity
// ----------------------------------------------------------------------------

/// System id of the vehicle a log is captured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VehicleId(u8);

impl VehicleId {
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Log Chunk
// ----------------------------------------------------------------------------

/// One transport delivery of log stream bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogChunk {
    /// Wrapping 16-bit transport sequence number
    pub sequence: u16,
    /// Offset of the first record starting in `data`, or [`NO_MESSAGE_START`]
    pub first_message: u8,
    /// Stream bytes carried by this chunk
    pub data: Vec<u8>,
}

impl LogChunk {
    pub fn new(sequence: u16, first_message: u8, data: Vec<u8>) -> Self {
        Self {
            sequence,
            first_message,
            data,
        }
    }

    /// Whether a record boundary falls inside this chunk
    pub fn has_message_start(&self) -> bool {
        self.first_message != NO_MESSAGE_START
    }
}

// ----------------------------------------------------------------------------
// Vehicle Commands
// ----------------------------------------------------------------------------

/// Fire-and-forget commands issued to the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleCommand {
    StartLogging,
    StopLogging,
}

impl VehicleCommand {
    /// Map a command identifier from an acknowledgement to a logging command
    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            CMD_LOGGING_START => Some(VehicleCommand::StartLogging),
            CMD_LOGGING_STOP => Some(VehicleCommand::StopLogging),
            _ => None,
        }
    }

    pub fn id(&self) -> u16 {
        match self {
            VehicleCommand::StartLogging => CMD_LOGGING_START,
            VehicleCommand::StopLogging => CMD_LOGGING_STOP,
        }
    }
}

impl fmt::Display for VehicleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VehicleCommand::StartLogging => write!(f, "start logging"),
            VehicleCommand::StopLogging => write!(f, "stop logging"),
        }
    }
}

/// Result carried by a command acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandResult {
    Accepted,
    Rejected(u8),
}

impl CommandResult {
    /// Zero means accepted, anything else is a failure code
    pub fn from_code(code: u8) -> Self {
        if code == 0 {
            CommandResult::Accepted
        } else {
            CommandResult::Rejected(code)
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, CommandResult::Accepted)
    }
}

// ----------------------------------------------------------------------------
// Time Source
// ----------------------------------------------------------------------------

/// Wall-clock source used to stamp new capture files
pub trait TimeSource: Send {
    /// Current local time
    fn now(&self) -> NaiveDateTime;
}

/// Local system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vehicle_id_display_is_zero_padded() {
        assert_eq!(VehicleId::new(7).to_string(), "007");
        assert_eq!(VehicleId::new(42).to_string(), "042");
        assert_eq!(VehicleId::new(255).to_string(), "255");
    }

    #[test]
    fn test_command_ids() {
        for cmd in [VehicleCommand::StartLogging, VehicleCommand::StopLogging] {
            assert_eq!(VehicleCommand::from_id(cmd.id()), Some(cmd));
        }
        assert_eq!(VehicleCommand::from_id(400), None);
    }

    #[test]
    fn test_command_result_codes() {
        assert!(CommandResult::from_code(0).is_accepted());
        assert_eq!(CommandResult::from_code(4), CommandResult::Rejected(4));
    }

    #[test]
    fn test_chunk_message_start() {
        assert!(!LogChunk::new(0, NO_MESSAGE_START, vec![]).has_message_start());
        assert!(LogChunk::new(0, 0, vec![]).has_message_start());
    }
}
