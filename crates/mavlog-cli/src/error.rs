//! Error handling for the mavlog CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Log error: {0}")]
    Core(#[from] mavlog_core::MavlogError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] mavlog_runtime::RuntimeError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings persistence error: {0}")]
    SettingsPersistence(String),

    #[error("Unknown log: {0}")]
    UnknownLog(String),

    #[error("Unknown setting '{0}'")]
    UnknownSetting(String),

    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },

    #[error("{failed} of {total} uploads failed")]
    UploadsFailed { failed: usize, total: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("Invalid upload URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
