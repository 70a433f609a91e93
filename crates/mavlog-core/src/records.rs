//! Known log files and their per-file state
//!
//! Every mutation of a [`LogRecord`] goes through a setter that reports a
//! [`RecordChange`] when the value actually changed, so the coordinator can
//! forward exactly one observable notification per mutation.

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Record Changes
// ----------------------------------------------------------------------------

/// Which attribute of a record changed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RecordField {
    Size(u64),
    Selected(bool),
    Uploading(bool),
    Progress(f64),
    Writing(bool),
    Uploaded(bool),
}

/// A single attribute change on a named record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordChange {
    pub name: String,
    pub field: RecordField,
}

// ----------------------------------------------------------------------------
// Log Record
// ----------------------------------------------------------------------------

/// One persisted or in-progress log file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    name: String,
    size_bytes: u64,
    selected: bool,
    uploading: bool,
    upload_progress: f64,
    writing: bool,
    uploaded: bool,
}

impl LogRecord {
    /// A record for a file found on disk
    pub fn discovered(name: impl Into<String>, size_bytes: u64, uploaded: bool) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            selected: false,
            uploading: false,
            upload_progress: 0.0,
            writing: false,
            uploaded,
        }
    }

    /// A record for a capture that is about to start writing
    pub fn capturing(name: impl Into<String>) -> Self {
        Self {
            writing: true,
            ..Self::discovered(name, 0, false)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn selected(&self) -> bool {
        self.selected
    }

    pub fn uploading(&self) -> bool {
        self.uploading
    }

    /// Upload progress in `0.0..=1.0`
    pub fn upload_progress(&self) -> f64 {
        self.upload_progress
    }

    pub fn writing(&self) -> bool {
        self.writing
    }

    pub fn uploaded(&self) -> bool {
        self.uploaded
    }

    pub fn set_size(&mut self, size_bytes: u64) -> Option<RecordChange> {
        if self.size_bytes == size_bytes {
            return None;
        }
        self.size_bytes = size_bytes;
        Some(self.change(RecordField::Size(size_bytes)))
    }

    pub fn set_selected(&mut self, selected: bool) -> Option<RecordChange> {
        if self.selected == selected {
            return None;
        }
        self.selected = selected;
        Some(self.change(RecordField::Selected(selected)))
    }

    pub fn set_uploading(&mut self, uploading: bool) -> Option<RecordChange> {
        if self.uploading == uploading {
            return None;
        }
        self.uploading = uploading;
        Some(self.change(RecordField::Uploading(uploading)))
    }

    /// Values outside `0.0..=1.0` are clamped
    pub fn set_progress(&mut self, progress: f64) -> Option<RecordChange> {
        let progress = progress.clamp(0.0, 1.0);
        if self.upload_progress == progress {
            return None;
        }
        self.upload_progress = progress;
        Some(self.change(RecordField::Progress(progress)))
    }

    pub fn set_writing(&mut self, writing: bool) -> Option<RecordChange> {
        if self.writing == writing {
            return None;
        }
        self.writing = writing;
        Some(self.change(RecordField::Writing(writing)))
    }

    pub fn set_uploaded(&mut self, uploaded: bool) -> Option<RecordChange> {
        if self.uploaded == uploaded {
            return None;
        }
        self.uploaded = uploaded;
        Some(self.change(RecordField::Uploaded(uploaded)))
    }

    fn change(&self, field: RecordField) -> RecordChange {
        RecordChange {
            name: self.name.clone(),
            field,
        }
    }
}

// ----------------------------------------------------------------------------
// Record List
// ----------------------------------------------------------------------------

/// Records ordered by name, ascending
#[derive(Debug, Clone, Default)]
pub struct RecordList {
    records: Vec<LogRecord>,
}

impl RecordList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping name order; returns the index it landed at.
    ///
    /// A record with an existing name replaces the old entry.
    pub fn insert(&mut self, record: LogRecord) -> usize {
        let mut index = 0;
        while index < self.records.len() {
            match self.records[index].name().cmp(record.name()) {
                std::cmp::Ordering::Less => index += 1,
                std::cmp::Ordering::Equal => {
                    self.records[index] = record;
                    return index;
                }
                std::cmp::Ordering::Greater => break,
            }
        }
        self.records.insert(index, record);
        index
    }

    pub fn remove(&mut self, name: &str) -> Option<LogRecord> {
        let index = self.position(name)?;
        Some(self.records.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&LogRecord> {
        self.records.iter().find(|r| r.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut LogRecord> {
        self.records.iter_mut().find(|r| r.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogRecord> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LogRecord> {
        self.records.iter_mut()
    }

    pub fn names(&self) -> Vec<String> {
        self.records.iter().map(|r| r.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn selected_count(&self) -> usize {
        self.records.iter().filter(|r| r.selected()).count()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.records.iter().position(|r| r.name() == name)
    }
}
