//! Capture handshake and log data handling

use tracing::{debug, error, info, warn};

use super::{ActiveCapture, CaptureState, LogCoordinator, Outputs};
use crate::channel::{AppEvent, Effect};
use crate::errors::MavlogError;
use crate::reassembly::{ChunkOutcome, ReassemblySession};
use crate::records::LogRecord;
use crate::storage::log_base_name;
use crate::types::{CommandResult, LogChunk, VehicleCommand, VehicleId};

impl LogCoordinator {
    // ------------------------------------------------------------------------
    // User operations
    // ------------------------------------------------------------------------

    /// Create a new log file and ask the vehicle to start streaming
    pub fn start_logging(&mut self) -> Outputs {
        self.observe(|this, out| this.begin_capture(out))
    }

    /// Close the active capture and ask the vehicle to stop streaming
    pub fn stop_logging(&mut self) -> Outputs {
        self.observe(|this, out| this.end_capture(out))
    }

    // ------------------------------------------------------------------------
    // Vehicle events
    // ------------------------------------------------------------------------

    pub fn vehicle_changed(&mut self, vehicle: Option<VehicleId>) -> Outputs {
        self.observe(|this, out| {
            if this.vehicle == vehicle {
                debug!(?vehicle, "Vehicle unchanged");
                return;
            }
            let could_start = this.can_start_log();

            if let Some(previous) = this.vehicle.take() {
                info!(vehicle = %previous, "Vehicle lost");
                match this.capture {
                    CaptureState::Capturing | CaptureState::AwaitingStartAck => this.end_capture(out),
                    CaptureState::AwaitingStopAck => {
                        out.effect(Effect::CancelAckTimer);
                        this.capture = CaptureState::Idle;
                    }
                    CaptureState::Idle => {}
                }
            }

            this.vehicle = vehicle;
            if let Some(vehicle) = vehicle {
                info!(vehicle = %vehicle, "Vehicle active");
            }
            // Observers re-evaluate on every vehicle change, even when the flag holds
            if could_start == this.can_start_log() {
                out.emit(AppEvent::CanStartLogChanged {
                    can_start: could_start,
                });
            }
        })
    }

    pub fn armed_changed(&mut self, armed: bool) -> Outputs {
        self.observe(|this, out| {
            if this.vehicle.is_none() {
                debug!(armed, "Armed change without vehicle ignored");
                return;
            }
            if !this.settings.auto_start {
                return;
            }
            if armed {
                if this.capture == CaptureState::Idle {
                    this.begin_capture(out);
                }
            } else if this.logging_running() {
                this.end_capture(out);
            }
        })
    }

    pub fn command_ack(&mut self, command_id: u16, result: u8) -> Outputs {
        self.observe(|this, out| {
            let Some(command) = VehicleCommand::from_id(command_id) else {
                return;
            };
            let result = CommandResult::from_code(result);

            match (command, this.capture) {
                (VehicleCommand::StartLogging, CaptureState::AwaitingStartAck) => {
                    out.effect(Effect::CancelAckTimer);
                    match result {
                        CommandResult::Accepted => {
                            info!("Vehicle started log stream");
                            this.capture = CaptureState::Capturing;
                        }
                        CommandResult::Rejected(code) => {
                            warn!(code, "Start log command failed");
                            this.discard_capture(out);
                            out.emit(AppEvent::CaptureFailed {
                                reason: MavlogError::CommandRejected { command, code }.to_string(),
                            });
                        }
                    }
                }
                (VehicleCommand::StopLogging, CaptureState::AwaitingStopAck) => {
                    out.effect(Effect::CancelAckTimer);
                    if !result.is_accepted() {
                        warn!(?result, "Stop log command failed");
                    }
                    this.capture = CaptureState::Idle;
                }
                (command, state) => {
                    debug!(%command, ?result, state = state.as_str(), "Unexpected acknowledgement ignored");
                }
            }
        })
    }

    /// The acknowledgement timer fired without a response
    pub fn ack_timeout(&mut self) -> Outputs {
        self.observe(|this, out| {
            let command = match this.capture {
                CaptureState::AwaitingStartAck => VehicleCommand::StartLogging,
                CaptureState::AwaitingStopAck => VehicleCommand::StopLogging,
                state => {
                    debug!(state = state.as_str(), "Stale acknowledgement timeout ignored");
                    return;
                }
            };

            this.retries += 1;
            if this.retries > this.config.max_command_retries {
                warn!(%command, retries = this.retries - 1, "No response to log command, giving up");
                if command == VehicleCommand::StartLogging {
                    this.discard_capture(out);
                    let reason = MavlogError::CommandAckTimeout {
                        command,
                        attempts: this.retries,
                    };
                    out.emit(AppEvent::CaptureFailed {
                        reason: reason.to_string(),
                    });
                }
                this.capture = CaptureState::Idle;
                return;
            }

            if this.vehicle.is_none() {
                out.effect(Effect::CancelAckTimer);
                this.close_active_capture(out);
                this.capture = CaptureState::Idle;
                return;
            }

            warn!(%command, attempt = this.retries, "Log command sent again");
            out.effect(Effect::SendVehicleCommand(command));
            out.effect(Effect::ArmAckTimer {
                after: this.config.ack_timeout(),
            });
        })
    }

    /// Feed one chunk of the log stream into the active capture
    pub fn log_data(&mut self, chunk: LogChunk) -> Outputs {
        self.observe(|this, out| {
            match this.capture {
                CaptureState::AwaitingStartAck => {
                    // Data before the acknowledgement means the stream is running
                    out.effect(Effect::CancelAckTimer);
                    this.capture = CaptureState::Capturing;
                }
                CaptureState::Capturing => {}
                state => {
                    warn!(
                        sequence = chunk.sequence,
                        state = state.as_str(),
                        "Log data received when not expected"
                    );
                    return;
                }
            }

            let Some(active) = this.active.as_mut() else {
                warn!(sequence = chunk.sequence, "Log data without an open log file");
                return;
            };
            match active.session.process_chunk(&chunk) {
                Ok(ChunkOutcome::Processed { .. }) => {
                    let written = active.session.bytes_written();
                    let name = active.name.clone();
                    if let Some(record) = this.records.get_mut(&name) {
                        out.record(record.set_size(written));
                    }
                }
                Ok(ChunkOutcome::Duplicate) | Ok(ChunkOutcome::Stale) => {}
                Err(e) => {
                    error!(log = %active.name, "Error writing log file: {}", e);
                    this.fail_capture(e.to_string(), out);
                }
            }
        })
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    pub(super) fn begin_capture(&mut self, out: &mut Outputs) {
        if self.logging_disabled {
            warn!("Capture disabled, log directory unavailable");
            return;
        }
        let Some(vehicle) = self.vehicle else {
            warn!("Cannot start logging without a vehicle");
            return;
        };
        if self.capture != CaptureState::Idle {
            debug!(state = self.capture.as_str(), "Capture already in progress");
            return;
        }

        let name = log_base_name(vehicle, self.time_source.now());
        let sink = match self.storage.create(&name) {
            Ok(sink) => sink,
            Err(e) => {
                error!(log = %name, "Could not create log file: {}", e);
                out.emit(AppEvent::CaptureFailed {
                    reason: e.to_string(),
                });
                return;
            }
        };
        let session = ReassemblySession::new(sink).with_dropout_cap(self.config.max_dropout_chunks);

        self.records.insert(LogRecord::capturing(name.clone()));
        out.emit(AppEvent::RecordAdded { name: name.clone() });
        info!(log = %name, vehicle = %vehicle, "Starting log capture");
        self.active = Some(ActiveCapture { name, session });

        out.effect(Effect::SendVehicleCommand(VehicleCommand::StartLogging));
        self.retries = 0;
        out.effect(Effect::ArmAckTimer {
            after: self.config.ack_timeout(),
        });
        self.capture = CaptureState::AwaitingStartAck;
    }

    pub(super) fn end_capture(&mut self, out: &mut Outputs) {
        if !self.logging_running() {
            debug!(state = self.capture.as_str(), "No capture to stop");
            return;
        }
        if self.vehicle.is_some() {
            out.effect(Effect::SendVehicleCommand(VehicleCommand::StopLogging));
        }

        if let Some(name) = self.close_active_capture(out) {
            if self.settings.auto_upload {
                if let Some(record) = self.records.get_mut(&name) {
                    out.record(record.set_selected(true));
                }
                if self.current_upload.is_none() {
                    self.advance_queue(out);
                }
            }
        }

        self.retries = 0;
        if self.vehicle.is_some() {
            out.effect(Effect::ArmAckTimer {
                after: self.config.ack_timeout(),
            });
            self.capture = CaptureState::AwaitingStopAck;
        } else {
            out.effect(Effect::CancelAckTimer);
            self.capture = CaptureState::Idle;
        }
    }

    /// Close the active session, keeping the file; returns the record name
    pub(super) fn close_active_capture(&mut self, out: &mut Outputs) -> Option<String> {
        let ActiveCapture { name, mut session } = self.active.take()?;
        if let Err(e) = session.close() {
            warn!(log = %name, "Error closing log file: {}", e);
        }
        info!(
            log = %name,
            bytes_written = session.bytes_written(),
            drop_count = session.drop_count(),
            "Log capture closed"
        );
        if let Some(record) = self.records.get_mut(&name) {
            out.record(record.set_size(session.bytes_written()));
            out.record(record.set_writing(false));
        }
        Some(name)
    }

    /// Drop the capture entirely: file, sidecar and record
    fn discard_capture(&mut self, out: &mut Outputs) {
        if let Some(name) = self.close_active_capture(out) {
            info!(log = %name, "Discarding log");
            self.delete_record(&name, out);
        }
        self.capture = CaptureState::Idle;
    }

    /// The session can no longer write: keep what was written and stop the stream
    fn fail_capture(&mut self, reason: String, out: &mut Outputs) {
        self.close_active_capture(out);
        if self.vehicle.is_some() {
            out.effect(Effect::SendVehicleCommand(VehicleCommand::StopLogging));
        }
        out.effect(Effect::CancelAckTimer);
        self.capture = CaptureState::Idle;
        out.emit(AppEvent::CaptureFailed { reason });
    }
}
