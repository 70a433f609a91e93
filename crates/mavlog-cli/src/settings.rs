//! Settings persistence for the mavlog CLI

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use mavlog_core::{MavlogError, SettingsStore};

use crate::error::{CliError, Result};

/// Settings kept as a flat JSON object, rewritten on every change
#[derive(Debug)]
pub struct JsonSettingsStore {
    path: PathBuf,
    values: Map<String, Value>,
}

impl JsonSettingsStore {
    /// Load settings from file; a missing file starts empty
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                values: Map::new(),
            });
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            CliError::SettingsPersistence(format!("Failed to read settings file: {}", e))
        })?;
        let values = serde_json::from_str(&contents).map_err(|e| {
            CliError::SettingsPersistence(format!("Failed to parse settings file: {}", e))
        })?;
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> mavlog_core::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MavlogError::storage(parent, e))?;
        }
        let contents = serde_json::to_string_pretty(&self.values)
            .map_err(|e| MavlogError::Settings(format!("Failed to serialize settings: {}", e)))?;
        std::fs::write(&self.path, contents).map_err(|e| MavlogError::storage(&self.path, e))
    }
}

impl SettingsStore for JsonSettingsStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key)?.as_str().map(str::to_string)
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key)?.as_bool()
    }

    fn set_string(&mut self, key: &str, value: &str) -> mavlog_core::Result<()> {
        self.values
            .insert(key.to_string(), Value::String(value.to_string()));
        self.save()
    }

    fn set_bool(&mut self, key: &str, value: bool) -> mavlog_core::Result<()> {
        self.values.insert(key.to_string(), Value::Bool(value));
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlog_core::config::{KEY_AUTO_UPLOAD, KEY_EMAIL};
    use mavlog_core::LogSettings;

    #[test]
    fn test_settings_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut store = JsonSettingsStore::open(&path).unwrap();
        assert_eq!(store.get_string(KEY_EMAIL), None);
        store.set_string(KEY_EMAIL, "pilot@example.com").unwrap();
        store.set_bool(KEY_AUTO_UPLOAD, false).unwrap();

        let reopened = JsonSettingsStore::open(&path).unwrap();
        assert_eq!(
            reopened.get_string(KEY_EMAIL).as_deref(),
            Some("pilot@example.com")
        );
        assert_eq!(reopened.get_bool(KEY_AUTO_UPLOAD), Some(false));

        let settings = LogSettings::load(&reopened);
        assert_eq!(settings.email, "pilot@example.com");
        assert!(!settings.auto_upload);
    }

    #[test]
    fn test_mismatched_type_reads_as_unset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"email": true, "auto_upload": "yes"}"#).unwrap();

        let store = JsonSettingsStore::open(&path).unwrap();
        assert_eq!(store.get_string(KEY_EMAIL), None);
        assert_eq!(store.get_bool(KEY_AUTO_UPLOAD), None);
    }

    #[test]
    fn test_corrupt_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            JsonSettingsStore::open(&path),
            Err(CliError::SettingsPersistence(_))
        ));
    }
}
