//! Log file storage
//!
//! The coordinator only needs a handful of operations on the log directory:
//! list what is there, open a new capture file, delete a log and flag a log as
//! uploaded. [`LogStorage`] is that seam; [`DirectoryStorage`] is the plain
//! filesystem implementation.

use chrono::NaiveDateTime;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::errors::{MavlogError, Result};
use crate::types::VehicleId;

/// Extension of captured log files
pub const LOG_EXTENSION: &str = "ulg";

/// Extension of the empty marker written next to an uploaded log
pub const SIDECAR_EXTENSION: &str = "uploaded";

/// Timestamp part of a capture name, millisecond resolution
const NAME_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S-%3f";

/// Base name (no extension) for a capture started at `at` from `vehicle`
pub fn log_base_name(vehicle: VehicleId, at: NaiveDateTime) -> String {
    format!("{}-{}", vehicle, at.format(NAME_TIMESTAMP_FORMAT))
}

// ----------------------------------------------------------------------------
// Storage Trait
// ----------------------------------------------------------------------------

/// A log file found during discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLog {
    pub name: String,
    pub size_bytes: u64,
    pub uploaded: bool,
}

/// Persistence of captured logs, addressed by base name
pub trait LogStorage: Send {
    /// Make sure the storage location exists
    fn prepare(&mut self) -> Result<()>;

    /// All logs currently stored, in no particular order
    fn discover(&self) -> Result<Vec<StoredLog>>;

    /// Create (truncating) the file for a new capture
    fn create(&mut self, name: &str) -> Result<Box<dyn Write + Send>>;

    /// Delete a log and its uploaded marker; a missing marker is not an error
    fn remove(&mut self, name: &str) -> Result<()>;

    /// Persist the uploaded marker for a log
    fn mark_uploaded(&mut self, name: &str) -> Result<()>;

    /// Filesystem path of a log, for the uploader
    fn log_path(&self, name: &str) -> PathBuf;
}

// ----------------------------------------------------------------------------
// Directory Storage
// ----------------------------------------------------------------------------

/// Logs stored as `<name>.ulg` files in a single directory
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    root: PathBuf,
}

impl DirectoryStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn sidecar_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, SIDECAR_EXTENSION))
    }
}

impl LogStorage for DirectoryStorage {
    fn prepare(&mut self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| MavlogError::storage(&self.root, e))
    }

    fn discover(&self) -> Result<Vec<StoredLog>> {
        let entries = fs::read_dir(&self.root).map_err(|e| MavlogError::storage(&self.root, e))?;

        let mut logs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MavlogError::storage(&self.root, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!(path = %path.display(), "Skipping log with non UTF-8 name");
                continue;
            };
            let metadata = match entry.metadata() {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => return Err(MavlogError::storage(&path, e)),
            };
            logs.push(StoredLog {
                name: name.to_string(),
                size_bytes: metadata.len(),
                uploaded: self.sidecar_path(name).exists(),
            });
        }
        debug!(count = logs.len(), root = %self.root.display(), "Discovered logs");
        Ok(logs)
    }

    fn create(&mut self, name: &str) -> Result<Box<dyn Write + Send>> {
        let path = self.log_path(name);
        let file = fs::File::create(&path).map_err(|e| MavlogError::storage(&path, e))?;
        Ok(Box::new(io::BufWriter::new(file)))
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        let path = self.log_path(name);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(log = name, "Log file already gone");
            }
            Err(e) => return Err(MavlogError::storage(&path, e)),
        }

        let sidecar = self.sidecar_path(name);
        match fs::remove_file(&sidecar) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MavlogError::storage(&sidecar, e)),
        }
    }

    fn mark_uploaded(&mut self, name: &str) -> Result<()> {
        let sidecar = self.sidecar_path(name);
        fs::File::create(&sidecar)
            .map(|_| ())
            .map_err(|e| MavlogError::storage(&sidecar, e))
    }

    fn log_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, LOG_EXTENSION))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn storage() -> (tempfile::TempDir, DirectoryStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = DirectoryStorage::new(dir.path().join("logs"));
        (dir, storage)
    }

    #[test]
    fn test_log_base_name_format() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_milli_opt(14, 5, 7, 42)
            .unwrap();
        assert_eq!(
            log_base_name(VehicleId::new(7), at),
            "007-2024-03-09-14-05-07-042"
        );
    }

    #[test]
    fn test_discover_reads_sidecars() {
        let (_dir, mut storage) = storage();
        storage.prepare().unwrap();

        let mut w = storage.create("001-a").unwrap();
        w.write_all(&[0u8; 10]).unwrap();
        w.flush().unwrap();
        drop(w);
        storage.create("002-b").unwrap();
        storage.mark_uploaded("002-b").unwrap();
        fs::write(storage.root().join("notes.txt"), b"x").unwrap();

        let mut logs = storage.discover().unwrap();
        logs.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            logs,
            vec![
                StoredLog {
                    name: "001-a".into(),
                    size_bytes: 10,
                    uploaded: false
                },
                StoredLog {
                    name: "002-b".into(),
                    size_bytes: 0,
                    uploaded: true
                },
            ]
        );
    }

    #[test]
    fn test_remove_tolerates_missing_sidecar() {
        let (_dir, mut storage) = storage();
        storage.prepare().unwrap();
        storage.create("a").unwrap();
        storage.create("b").unwrap();
        storage.mark_uploaded("b").unwrap();

        storage.remove("a").unwrap();
        storage.remove("b").unwrap();
        assert!(!storage.log_path("a").exists());
        assert!(!storage.log_path("b").exists());
        assert!(!storage.sidecar_path("b").exists());
        assert!(storage.discover().unwrap().is_empty());
    }

    #[test]
    fn test_discover_without_directory_fails() {
        let (_dir, storage) = storage();
        assert!(matches!(
            storage.discover(),
            Err(MavlogError::Storage { .. })
        ));
    }
}
