//! Upload queue, selection and deletion

use tracing::{debug, info, warn};

use super::{LogCoordinator, Outputs};
use crate::channel::{AppEvent, Effect, UploadOutcome, UploadRequest};
use crate::errors::UploadError;

impl LogCoordinator {
    /// Start uploading the selected logs unless an upload is already running
    pub fn upload_logs(&mut self) -> Outputs {
        self.observe(|this, out| {
            if let Some(current) = &this.current_upload {
                debug!(log = %current, "Upload already in progress");
                return;
            }
            this.advance_queue(out);
        })
    }

    /// Drop every queued log and abort the in-flight upload.
    ///
    /// The aborted upload still reports completion, as a failure.
    pub fn cancel_upload(&mut self) -> Outputs {
        self.observe(|this, out| {
            let current = this.current_upload.clone();
            for record in this.records.iter_mut() {
                if record.selected() && Some(record.name()) != current.as_deref() {
                    out.record(record.set_selected(false));
                }
            }
            if let Some(current) = current {
                info!(log = %current, "Aborting upload");
                out.effect(Effect::AbortUpload);
            }
        })
    }

    /// Delete every selected log; a log still being written or uploaded is deselected instead
    pub fn delete_selected(&mut self) -> Outputs {
        self.observe(|this, out| {
            let current = this.current_upload.clone();
            for name in this.records.names() {
                let Some(record) = this.records.get_mut(&name) else {
                    continue;
                };
                if !record.selected() {
                    continue;
                }
                if record.writing() {
                    warn!(log = %name, "Cannot delete a log that is being captured");
                    out.record(record.set_selected(false));
                    continue;
                }
                if current.as_deref() == Some(name.as_str()) {
                    warn!(log = %name, "Cannot delete a log that is being uploaded");
                    out.record(record.set_selected(false));
                    continue;
                }
                info!(log = %name, "Deleting log");
                this.delete_record(&name, out);
            }
        })
    }

    pub fn set_selected(&mut self, name: &str, selected: bool) -> Outputs {
        self.observe(|this, out| match this.records.get_mut(name) {
            Some(record) => out.record(record.set_selected(selected)),
            None => warn!(log = name, "Selection change for unknown log"),
        })
    }

    pub fn upload_progress(&mut self, name: &str, bytes_sent: u64, bytes_total: u64) -> Outputs {
        self.observe(|this, out| {
            if this.current_upload.as_deref() != Some(name) {
                debug!(log = name, "Progress for an upload that is not current");
                return;
            }
            if bytes_total == 0 {
                return;
            }
            debug!(log = name, bytes_sent, bytes_total, "Upload progress");
            if let Some(record) = this.records.get_mut(name) {
                out.record(record.set_progress(bytes_sent as f64 / bytes_total as f64));
            }
        })
    }

    pub fn upload_finished(&mut self, name: &str, outcome: UploadOutcome) -> Outputs {
        self.observe(|this, out| {
            if this.current_upload.as_deref() != Some(name) {
                warn!(log = name, "Completion for an upload that is not current");
                return;
            }

            let success = outcome.is_success();
            match outcome {
                UploadOutcome::Response { status, body } => {
                    debug!(log = name, status, "Upload response: {}", body);
                    out.emit(AppEvent::UploadResponse {
                        name: name.to_string(),
                        body,
                    });
                    if success {
                        info!(log = name, "Log uploaded");
                        out.emit(AppEvent::UploadSucceeded {
                            name: name.to_string(),
                        });
                        this.complete_upload(name, out);
                    } else {
                        let reason = UploadError::Status { code: status }.to_string();
                        warn!(log = name, "Log upload error: {}", reason);
                        out.emit(AppEvent::UploadFailed {
                            name: name.to_string(),
                            reason,
                        });
                    }
                }
                UploadOutcome::Failed { reason } => {
                    warn!(log = name, "Log upload error: {}", reason);
                    out.emit(AppEvent::UploadFailed {
                        name: name.to_string(),
                        reason,
                    });
                }
            }

            this.advance_queue(out);
        })
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Release the current target and start the next eligible selected log
    pub(super) fn advance_queue(&mut self, out: &mut Outputs) {
        if let Some(previous) = self.current_upload.take() {
            if let Some(record) = self.records.get_mut(&previous) {
                out.record(record.set_uploading(false));
            }
        }

        let has_credentials = self.settings.has_credentials();
        for name in self.records.names() {
            let Some(record) = self.records.get_mut(&name) else {
                continue;
            };
            if !record.selected() {
                continue;
            }
            out.record(record.set_selected(false));

            if record.uploaded() {
                debug!(log = %name, "Already uploaded, skipping");
                continue;
            }
            if record.writing() {
                warn!(log = %name, "Log still being captured, skipping upload");
                continue;
            }
            if !has_credentials {
                debug!(log = %name, "{}", UploadError::MissingCredentials);
                continue;
            }

            out.record(record.set_uploading(true));
            out.record(record.set_progress(0.0));
            let request = self.upload_request(&name);
            info!(log = %name, url = %request.url, "Uploading log");
            self.current_upload = Some(name);
            out.effect(Effect::BeginUpload(request));
            return;
        }
        debug!("Upload queue empty");
    }

    fn upload_request(&self, name: &str) -> UploadRequest {
        if self.settings.description.is_empty() {
            warn!(log = name, "Log description missing, using default");
        }
        UploadRequest {
            name: name.to_string(),
            file_path: self.storage.log_path(name),
            url: self.settings.upload_url.clone(),
            email: self.settings.email.clone(),
            description: self.settings.effective_description().to_string(),
            source: self.config.source.clone(),
            version: self.config.app_version.clone(),
        }
    }

    /// Successful upload: flag the log as uploaded, or delete it
    fn complete_upload(&mut self, name: &str, out: &mut Outputs) {
        if self.settings.delete_after_upload {
            self.delete_record(name, out);
            return;
        }
        let Some(record) = self.records.get_mut(name) else {
            warn!(log = name, "Uploaded log no longer exists");
            return;
        };
        out.record(record.set_progress(1.0));
        out.record(record.set_uploaded(true));
        if let Err(e) = self.storage.mark_uploaded(name) {
            warn!(log = name, "Could not write uploaded marker: {}", e);
        }
    }
}
