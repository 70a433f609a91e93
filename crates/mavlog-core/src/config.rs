//! Configuration
//!
//! - [`CaptureConfig`]: fixed parameters of the capture pipeline
//! - [`LogSettings`]: user preferences, loaded from and persisted to a [`SettingsStore`]
//! - [`ChannelConfig`]: buffer sizes for the runtime channels

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::Result;
use crate::reassembly::MAX_DROPOUT_CHUNKS;

// ----------------------------------------------------------------------------
// Capture Configuration
// ----------------------------------------------------------------------------

/// Parameters of the capture pipeline and upload metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Directory holding captured logs
    pub log_dir: PathBuf,
    /// How long to wait for a start/stop acknowledgement before resending
    pub ack_timeout_ms: u64,
    /// Resends before a start/stop command is given up on
    pub max_command_retries: u32,
    /// Value of the `source` upload field
    pub source: String,
    /// Value of the `version` upload field
    pub app_version: String,
    /// Dropped chunks represented by one dropout record at most
    pub max_dropout_chunks: u16,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            ack_timeout_ms: 1000,
            max_command_retries: 3,
            source: "mavlog".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            max_dropout_chunks: MAX_DROPOUT_CHUNKS,
        }
    }
}

impl CaptureConfig {
    pub fn with_log_dir(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            ..Self::default()
        }
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the runtime channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Buffer size for Command channels (user → coordinator)
    pub command_buffer_size: usize,
    /// Buffer size for Event channels (vehicle/uploader → coordinator)
    pub event_buffer_size: usize,
    /// Buffer size for AppEvent channels (coordinator → user)
    pub app_event_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,   // user commands are infrequent
            event_buffer_size: 256,    // log data arrives in bursts
            app_event_buffer_size: 128, // one notification per record mutation
        }
    }
}

impl ChannelConfig {
    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            command_buffer_size: 100,
            event_buffer_size: 100,
            app_event_buffer_size: 1000,
        }
    }
}

// ----------------------------------------------------------------------------
// Settings Store
// ----------------------------------------------------------------------------

pub const KEY_EMAIL: &str = "email";
pub const KEY_DESCRIPTION: &str = "description";
pub const KEY_UPLOAD_URL: &str = "upload_url";
pub const KEY_AUTO_UPLOAD: &str = "auto_upload";
pub const KEY_AUTO_START: &str = "auto_start";
pub const KEY_DELETE_AFTER_UPLOAD: &str = "delete_after_upload";

/// Key/value persistence for user preferences
pub trait SettingsStore: Send {
    fn get_string(&self, key: &str) -> Option<String>;
    fn get_bool(&self, key: &str) -> Option<bool>;
    fn set_string(&mut self, key: &str, value: &str) -> Result<()>;
    fn set_bool(&mut self, key: &str, value: bool) -> Result<()>;
}

/// In-memory settings, used by tests and when nothing should be persisted
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    strings: HashMap<String, String>,
    bools: HashMap<String, bool>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.strings.get(key).cloned()
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.bools.get(key).copied()
    }

    fn set_string(&mut self, key: &str, value: &str) -> Result<()> {
        self.strings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn set_bool(&mut self, key: &str, value: bool) -> Result<()> {
        self.bools.insert(key.to_string(), value);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Log Settings
// ----------------------------------------------------------------------------

pub const DEFAULT_DESCRIPTION: &str = "mavlog session";
pub const DEFAULT_UPLOAD_URL: &str = "https://logs.px4.io/upload";

/// User preferences governing capture and upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSettings {
    pub email: String,
    pub description: String,
    pub upload_url: String,
    pub auto_upload: bool,
    pub auto_start: bool,
    pub delete_after_upload: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            email: String::new(),
            description: DEFAULT_DESCRIPTION.to_string(),
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            auto_upload: true,
            auto_start: true,
            delete_after_upload: false,
        }
    }
}

impl LogSettings {
    /// Read settings, falling back to defaults for missing keys
    pub fn load(store: &dyn SettingsStore) -> Self {
        let defaults = Self::default();
        let upload_url = store
            .get_string(KEY_UPLOAD_URL)
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.upload_url);
        Self {
            email: store.get_string(KEY_EMAIL).unwrap_or(defaults.email),
            description: store
                .get_string(KEY_DESCRIPTION)
                .unwrap_or(defaults.description),
            upload_url,
            auto_upload: store
                .get_bool(KEY_AUTO_UPLOAD)
                .unwrap_or(defaults.auto_upload),
            auto_start: store.get_bool(KEY_AUTO_START).unwrap_or(defaults.auto_start),
            delete_after_upload: store
                .get_bool(KEY_DELETE_AFTER_UPLOAD)
                .unwrap_or(defaults.delete_after_upload),
        }
    }

    /// Whether uploads can be attempted at all
    pub fn has_credentials(&self) -> bool {
        !self.email.is_empty() && !self.upload_url.is_empty()
    }

    /// Description sent with an upload; empty falls back to the default
    pub fn effective_description(&self) -> &str {
        if self.description.is_empty() {
            DEFAULT_DESCRIPTION
        } else {
            &self.description
        }
    }
}
