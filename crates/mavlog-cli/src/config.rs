//! mavlog CLI Configuration
//!
//! An optional TOML file overrides the defaults:
//!
//! ```toml
//! data_dir = "/var/lib/mavlog"
//!
//! [capture]
//! log_dir = "logs"
//! ack_timeout_ms = 1000
//! ```
//!
//! Relative log directories are resolved against the data directory, which
//! defaults to the platform data directory (`~/.local/share/mavlog` on Linux).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use mavlog_core::CaptureConfig;

use crate::error::{CliError, Result};

/// File the user settings are persisted to, inside the data directory
pub const SETTINGS_FILE: &str = "settings.json";

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root for logs and settings; platform data directory when unset
    pub data_dir: Option<PathBuf>,
    /// Capture pipeline and upload metadata
    pub capture: CaptureConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CliError::Config(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.ack_timeout_ms == 0 {
            return Err(CliError::Config(
                "ack_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.capture.max_dropout_chunks == 0 {
            return Err(CliError::Config(
                "max_dropout_chunks must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|dir| dir.join("mavlog"))
                .ok_or_else(|| CliError::Config("No platform data directory available".to_string())),
        }
    }

    /// Capture configuration with the log directory resolved
    pub fn resolved_capture(&self) -> Result<CaptureConfig> {
        let mut capture = self.capture.clone();
        if capture.log_dir.is_relative() {
            capture.log_dir = self.data_dir()?.join(&capture.log_dir);
        }
        Ok(capture)
    }

    pub fn settings_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(SETTINGS_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.data_dir.is_none());
        assert_eq!(config.capture, CaptureConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mavlog.toml");
        std::fs::write(
            &path,
            "data_dir = \"/srv/mavlog\"\n\n[capture]\nack_timeout_ms = 250\n",
        )
        .unwrap();

        let config = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.data_dir, Some(PathBuf::from("/srv/mavlog")));
        assert_eq!(config.capture.ack_timeout_ms, 250);
        assert_eq!(config.capture.max_command_retries, 3);

        let capture = config.resolved_capture().unwrap();
        assert_eq!(capture.log_dir, PathBuf::from("/srv/mavlog/logs"));
        assert_eq!(
            config.settings_path().unwrap(),
            PathBuf::from("/srv/mavlog/settings.json")
        );
    }

    #[test]
    fn test_absolute_log_dir_kept() {
        let config = AppConfig {
            data_dir: Some(PathBuf::from("/srv/mavlog")),
            capture: CaptureConfig::with_log_dir("/mnt/logs"),
        };
        assert_eq!(
            config.resolved_capture().unwrap().log_dir,
            PathBuf::from("/mnt/logs")
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mavlog.toml");
        std::fs::write(&path, "[capture]\nack_timeout_ms = 0\n").unwrap();
        assert!(matches!(
            AppConfig::load_from_file(&path),
            Err(CliError::Config(_))
        ));

        std::fs::write(&path, "[capture\n").unwrap();
        assert!(matches!(
            AppConfig::load_from_file(&path),
            Err(CliError::TomlParsing(_))
        ));
    }
}
