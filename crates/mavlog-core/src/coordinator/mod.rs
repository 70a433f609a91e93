//! Capture and Upload Coordinator
//!
//! `LogCoordinator` is a synchronous state machine. Every operation takes
//! `&mut self`, mutates the record list and capture state, and returns the
//! [`Outputs`] produced: effects for the runtime to execute and app events for
//! observers. It never blocks and never touches the network.
//!
//! - `capture`: start/stop handshake, acknowledgement retries, log data
//! - `upload`: single-flight upload queue, selection and deletion

mod capture;
mod upload;

use std::io::Write;
use tracing::{debug, error, info, warn};

use crate::channel::{AppEvent, Command, Effect, Event};
use crate::config::{
    CaptureConfig, LogSettings, SettingsStore, DEFAULT_UPLOAD_URL, KEY_AUTO_START,
    KEY_AUTO_UPLOAD, KEY_DELETE_AFTER_UPLOAD, KEY_DESCRIPTION, KEY_EMAIL, KEY_UPLOAD_URL,
};
use crate::reassembly::ReassemblySession;
use crate::records::{LogRecord, RecordChange, RecordList};
use crate::storage::LogStorage;
use crate::types::{SystemTimeSource, TimeSource, VehicleCommand, VehicleId};

// ----------------------------------------------------------------------------
// Capture State
// ----------------------------------------------------------------------------

/// Where the remote log stream handshake stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    AwaitingStartAck,
    Capturing,
    AwaitingStopAck,
}

impl CaptureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::AwaitingStartAck => "awaiting start ack",
            CaptureState::Capturing => "capturing",
            CaptureState::AwaitingStopAck => "awaiting stop ack",
        }
    }
}

// ----------------------------------------------------------------------------
// Outputs
// ----------------------------------------------------------------------------

/// Effects and app events produced by one coordinator operation, in order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outputs {
    pub effects: Vec<Effect>,
    pub app_events: Vec<AppEvent>,
}

impl Outputs {
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty() && self.app_events.is_empty()
    }

    pub(crate) fn effect(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub(crate) fn emit(&mut self, event: AppEvent) {
        self.app_events.push(event);
    }

    pub(crate) fn record(&mut self, change: Option<RecordChange>) {
        if let Some(change) = change {
            self.app_events.push(AppEvent::RecordChanged(change));
        }
    }
}

/// Aggregate signals, compared before and after every operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Signals {
    logging_running: bool,
    uploading: bool,
    selected_count: usize,
    can_start_log: bool,
}

/// The capture currently being written
struct ActiveCapture {
    name: String,
    session: ReassemblySession<Box<dyn Write + Send>>,
}

// ----------------------------------------------------------------------------
// Coordinator
// ----------------------------------------------------------------------------

/// Owns the log records, the capture handshake and the upload queue
pub struct LogCoordinator {
    config: CaptureConfig,
    settings: LogSettings,
    settings_store: Box<dyn SettingsStore>,
    storage: Box<dyn LogStorage>,
    time_source: Box<dyn TimeSource>,
    records: RecordList,
    vehicle: Option<VehicleId>,
    capture: CaptureState,
    retries: u32,
    active: Option<ActiveCapture>,
    current_upload: Option<String>,
    logging_disabled: bool,
}

impl LogCoordinator {
    /// Load settings, prepare the log directory and discover existing logs.
    ///
    /// A log directory that cannot be created disables capture; uploads and
    /// deletion of already known logs keep working.
    pub fn new(
        config: CaptureConfig,
        settings_store: Box<dyn SettingsStore>,
        mut storage: Box<dyn LogStorage>,
    ) -> Self {
        let settings = LogSettings::load(settings_store.as_ref());
        let mut records = RecordList::new();
        let mut logging_disabled = false;

        if let Err(e) = storage.prepare() {
            error!("Could not create log directory, capture disabled: {}", e);
            logging_disabled = true;
        } else {
            match storage.discover() {
                Ok(logs) => {
                    for log in logs {
                        records.insert(LogRecord::discovered(log.name, log.size_bytes, log.uploaded));
                    }
                }
                Err(e) => warn!("Could not list existing logs: {}", e),
            }
        }
        info!(
            logs = records.len(),
            log_dir = %config.log_dir.display(),
            "Log coordinator ready"
        );

        Self {
            config,
            settings,
            settings_store,
            storage,
            time_source: Box::new(SystemTimeSource),
            records,
            vehicle: None,
            capture: CaptureState::Idle,
            retries: 0,
            active: None,
            current_upload: None,
            logging_disabled,
        }
    }

    /// Replace the clock used to name new captures
    pub fn with_time_source(mut self, time_source: Box<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Apply a user command
    pub fn handle_command(&mut self, command: Command) -> Outputs {
        debug!(?command, "Coordinator command");
        match command {
            Command::StartLogging => self.start_logging(),
            Command::StopLogging => self.stop_logging(),
            Command::UploadLogs => self.upload_logs(),
            Command::CancelUpload => self.cancel_upload(),
            Command::DeleteSelected => self.delete_selected(),
            Command::SetSelected { name, selected } => self.set_selected(&name, selected),
            Command::SetEmail(email) => self.set_email(email),
            Command::SetDescription(description) => self.set_description(description),
            Command::SetUploadUrl(url) => self.set_upload_url(url),
            Command::SetAutoUpload(enabled) => self.set_auto_upload(enabled),
            Command::SetAutoStart(enabled) => self.set_auto_start(enabled),
            Command::SetDeleteAfterUpload(enabled) => self.set_delete_after_upload(enabled),
            Command::Shutdown => self.shutdown(),
        }
    }

    /// Apply an event from the vehicle link or the uploader
    pub fn handle_event(&mut self, event: Event) -> Outputs {
        match event {
            Event::VehicleChanged { vehicle } => self.vehicle_changed(vehicle),
            Event::ArmedChanged { armed } => self.armed_changed(armed),
            Event::LogData(chunk) => self.log_data(chunk),
            Event::CommandAck { command_id, result } => self.command_ack(command_id, result),
            Event::AckTimeout => self.ack_timeout(),
            Event::UploadProgress {
                name,
                bytes_sent,
                bytes_total,
            } => self.upload_progress(&name, bytes_sent, bytes_total),
            Event::UploadFinished { name, outcome } => self.upload_finished(&name, outcome),
        }
    }

    /// Run one operation and append notifications for every aggregate signal it changed
    fn observe(&mut self, op: impl FnOnce(&mut Self, &mut Outputs)) -> Outputs {
        let before = self.signals();
        let mut out = Outputs::default();
        op(self, &mut out);
        let after = self.signals();

        if before.logging_running != after.logging_running {
            out.emit(AppEvent::LoggingRunningChanged {
                running: after.logging_running,
            });
        }
        if before.uploading != after.uploading {
            out.emit(AppEvent::UploadingChanged {
                uploading: after.uploading,
            });
        }
        if before.selected_count != after.selected_count {
            out.emit(AppEvent::SelectedCountChanged {
                count: after.selected_count,
            });
        }
        if before.can_start_log != after.can_start_log {
            out.emit(AppEvent::CanStartLogChanged {
                can_start: after.can_start_log,
            });
        }
        out
    }

    fn signals(&self) -> Signals {
        Signals {
            logging_running: self.logging_running(),
            uploading: self.uploading(),
            selected_count: self.records.selected_count(),
            can_start_log: self.can_start_log(),
        }
    }

    /// Close everything down: the active capture is kept on disk and the
    /// in-flight upload is aborted
    pub fn shutdown(&mut self) -> Outputs {
        self.observe(|this, out| {
            if this.active.is_some() || this.capture != CaptureState::Idle {
                if this.vehicle.is_some() && this.capture != CaptureState::AwaitingStopAck {
                    out.effect(Effect::SendVehicleCommand(VehicleCommand::StopLogging));
                }
                this.close_active_capture(out);
                out.effect(Effect::CancelAckTimer);
                this.capture = CaptureState::Idle;
            }
            if this.current_upload.is_some() {
                out.effect(Effect::AbortUpload);
            }
            info!("Log coordinator shut down");
        })
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn records(&self) -> &RecordList {
        &self.records
    }

    pub fn settings(&self) -> &LogSettings {
        &self.settings
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture
    }

    pub fn vehicle(&self) -> Option<VehicleId> {
        self.vehicle
    }

    /// Whether a capture is starting or running
    pub fn logging_running(&self) -> bool {
        matches!(
            self.capture,
            CaptureState::AwaitingStartAck | CaptureState::Capturing
        )
    }

    pub fn uploading(&self) -> bool {
        self.current_upload.is_some()
    }

    /// Name of the log being uploaded
    pub fn current_upload(&self) -> Option<&str> {
        self.current_upload.as_deref()
    }

    pub fn selected_count(&self) -> usize {
        self.records.selected_count()
    }

    pub fn can_start_log(&self) -> bool {
        self.vehicle.is_some() && !self.logging_disabled
    }

    pub fn logging_disabled(&self) -> bool {
        self.logging_disabled
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    pub fn set_email(&mut self, email: String) -> Outputs {
        self.observe(|this, out| {
            this.persist_string(KEY_EMAIL, &email);
            if this.settings.email != email {
                this.settings.email = email;
                out.emit(AppEvent::SettingsChanged);
            }
        })
    }

    pub fn set_description(&mut self, description: String) -> Outputs {
        self.observe(|this, out| {
            this.persist_string(KEY_DESCRIPTION, &description);
            if this.settings.description != description {
                this.settings.description = description;
                out.emit(AppEvent::SettingsChanged);
            }
        })
    }

    /// An empty URL restores the default collector
    pub fn set_upload_url(&mut self, url: String) -> Outputs {
        self.observe(|this, out| {
            let url = if url.is_empty() {
                DEFAULT_UPLOAD_URL.to_string()
            } else {
                url
            };
            this.persist_string(KEY_UPLOAD_URL, &url);
            if this.settings.upload_url != url {
                this.settings.upload_url = url;
                out.emit(AppEvent::SettingsChanged);
            }
        })
    }

    pub fn set_auto_upload(&mut self, enabled: bool) -> Outputs {
        self.observe(|this, out| {
            this.persist_bool(KEY_AUTO_UPLOAD, enabled);
            if this.settings.auto_upload != enabled {
                this.settings.auto_upload = enabled;
                out.emit(AppEvent::SettingsChanged);
            }
        })
    }

    pub fn set_auto_start(&mut self, enabled: bool) -> Outputs {
        self.observe(|this, out| {
            this.persist_bool(KEY_AUTO_START, enabled);
            if this.settings.auto_start != enabled {
                this.settings.auto_start = enabled;
                out.emit(AppEvent::SettingsChanged);
            }
        })
    }

    pub fn set_delete_after_upload(&mut self, enabled: bool) -> Outputs {
        self.observe(|this, out| {
            this.persist_bool(KEY_DELETE_AFTER_UPLOAD, enabled);
            if this.settings.delete_after_upload != enabled {
                this.settings.delete_after_upload = enabled;
                out.emit(AppEvent::SettingsChanged);
            }
        })
    }

    fn persist_string(&mut self, key: &str, value: &str) {
        if let Err(e) = self.settings_store.set_string(key, value) {
            warn!(key, "Could not persist setting: {}", e);
        }
    }

    fn persist_bool(&mut self, key: &str, value: bool) {
        if let Err(e) = self.settings_store.set_bool(key, value) {
            warn!(key, "Could not persist setting: {}", e);
        }
    }

    // ------------------------------------------------------------------------
    // Record helpers
    // ------------------------------------------------------------------------

    /// Delete a log from storage and from the list
    fn delete_record(&mut self, name: &str, out: &mut Outputs) {
        if let Err(e) = self.storage.remove(name) {
            warn!(log = name, "Could not delete log file: {}", e);
        }
        if self.records.remove(name).is_some() {
            out.emit(AppEvent::RecordRemoved {
                name: name.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemorySettingsStore;
    use crate::storage::DirectoryStorage;

    fn coordinator(dir: &tempfile::TempDir) -> LogCoordinator {
        LogCoordinator::new(
            CaptureConfig::with_log_dir(dir.path()),
            Box::new(MemorySettingsStore::new()),
            Box::new(DirectoryStorage::new(dir.path())),
        )
    }

    #[test]
    fn test_discovers_existing_logs_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("002-b.ulg"), [0u8; 4]).unwrap();
        std::fs::write(dir.path().join("001-a.ulg"), [0u8; 8]).unwrap();
        std::fs::write(dir.path().join("001-a.uploaded"), b"").unwrap();

        let coordinator = coordinator(&dir);
        let records: Vec<_> = coordinator.records().iter().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name(), "001-a");
        assert!(records[0].uploaded());
        assert_eq!(records[0].size_bytes(), 8);
        assert_eq!(records[1].name(), "002-b");
        assert!(!records[1].uploaded());
        assert!(!coordinator.logging_disabled());
    }

    #[test]
    fn test_unusable_log_dir_disables_capture() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let mut coordinator = LogCoordinator::new(
            CaptureConfig::with_log_dir(&blocker),
            Box::new(MemorySettingsStore::new()),
            Box::new(DirectoryStorage::new(blocker.join("logs"))),
        );
        assert!(coordinator.logging_disabled());

        coordinator.handle_event(Event::VehicleChanged {
            vehicle: Some(VehicleId::new(1)),
        });
        assert!(!coordinator.can_start_log());
        let out = coordinator.start_logging();
        assert!(out.effects.is_empty());
        assert_eq!(coordinator.capture_state(), CaptureState::Idle);
    }

    #[test]
    fn test_settings_are_persisted_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut coordinator = coordinator(&dir);

        let out = coordinator.set_email("pilot@example.com".into());
        assert_eq!(out.app_events, vec![AppEvent::SettingsChanged]);
        assert!(coordinator.set_email("pilot@example.com".into()).is_empty());

        coordinator.set_upload_url(String::new());
        assert_eq!(coordinator.settings().upload_url, DEFAULT_UPLOAD_URL);

        coordinator.handle_command(Command::SetAutoUpload(false));
        assert!(!coordinator.settings().auto_upload);
    }

    #[test]
    fn test_can_start_follows_vehicle() {
        let dir = tempfile::tempdir().unwrap();
        let mut coordinator = coordinator(&dir);
        assert!(!coordinator.can_start_log());

        let out = coordinator.handle_event(Event::VehicleChanged {
            vehicle: Some(VehicleId::new(3)),
        });
        assert!(out
            .app_events
            .contains(&AppEvent::CanStartLogChanged { can_start: true }));

        // Switching vehicles still notifies
        let out = coordinator.handle_event(Event::VehicleChanged {
            vehicle: Some(VehicleId::new(4)),
        });
        assert!(out
            .app_events
            .contains(&AppEvent::CanStartLogChanged { can_start: true }));

        let out = coordinator.handle_event(Event::VehicleChanged { vehicle: None });
        assert!(out
            .app_events
            .contains(&AppEvent::CanStartLogChanged { can_start: false }));
    }
}
