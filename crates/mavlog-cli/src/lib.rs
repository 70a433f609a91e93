//! mavlog CLI library
//!
//! Command-line access to the captured log directory: listing, deleting and
//! uploading logs, and editing the persisted upload settings.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod settings;

pub use cli::{Cli, Commands, ConfigAction};
pub use commands::CommandDispatcher;
pub use config::AppConfig;
pub use error::{CliError, Result};
pub use settings::JsonSettingsStore;
