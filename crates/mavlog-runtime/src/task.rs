//! Log Manager Task
//!
//! The one task that owns the coordinator. Commands, events and the ack timer
//! are processed strictly in arrival order; the resulting effects are executed
//! before the next input is taken.
//!
//! App events never block the task. Progress reports are dropped when the app
//! event channel is full; every other event waits in a backlog until observers
//! catch up.

use std::collections::VecDeque;

use mavlog_core::channel::{ChannelError, NonBlockingSend};
use mavlog_core::{
    AppEvent, AppEventSender, Command, CommandReceiver, Effect, Event, EventReceiver, EventSender,
    LogCoordinator, Outputs,
};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::timer::AckTimer;
use crate::uploader::LogUploader;
use crate::vehicle::VehicleLink;

// ----------------------------------------------------------------------------
// Log Manager Task
// ----------------------------------------------------------------------------

/// Owns the coordinator and executes its effects
pub struct LogManagerTask<V, U> {
    coordinator: LogCoordinator,
    vehicle: V,
    uploader: U,
    ack_timer: AckTimer,
    command_receiver: CommandReceiver,
    event_receiver: EventReceiver,
    /// Handed to uploads so they can report back
    event_sender: EventSender,
    app_event_sender: AppEventSender,
    /// App events waiting for room in the channel, oldest first
    backlog: VecDeque<AppEvent>,
    running: bool,
}

impl<V: VehicleLink, U: LogUploader> LogManagerTask<V, U> {
    pub fn new(
        coordinator: LogCoordinator,
        vehicle: V,
        uploader: U,
        command_receiver: CommandReceiver,
        event_receiver: EventReceiver,
        event_sender: EventSender,
        app_event_sender: AppEventSender,
    ) -> Self {
        Self {
            coordinator,
            vehicle,
            uploader,
            ack_timer: AckTimer::new(),
            command_receiver,
            event_receiver,
            event_sender,
            app_event_sender,
            backlog: VecDeque::new(),
            running: true,
        }
    }

    /// Run until a shutdown command arrives or the command channel closes
    pub async fn run(mut self) -> LogCoordinator {
        info!("Log manager task starting");

        while self.running {
            let app_event_sender = self.app_event_sender.clone();
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(Command::Shutdown) => {
                            let outputs = self.coordinator.shutdown();
                            self.apply(outputs);
                            self.running = false;
                        }
                        Some(command) => {
                            let outputs = self.coordinator.handle_command(command);
                            self.apply(outputs);
                        }
                        None => {
                            info!("Command channel closed, shutting down");
                            let outputs = self.coordinator.shutdown();
                            self.apply(outputs);
                            self.running = false;
                        }
                    }
                }

                event = self.event_receiver.recv() => {
                    // The task holds an event sender itself, so this never yields None
                    if let Some(event) = event {
                        let outputs = self.coordinator.handle_event(event);
                        self.apply(outputs);
                    }
                }

                _ = self.ack_timer.expired() => {
                    debug!("Acknowledgement timer expired");
                    let outputs = self.coordinator.handle_event(Event::AckTimeout);
                    self.apply(outputs);
                }

                permit = app_event_sender.reserve(), if !self.backlog.is_empty() => {
                    match permit {
                        Ok(permit) => {
                            if let Some(event) = self.backlog.pop_front() {
                                permit.send(event);
                            }
                        }
                        Err(_) => self.backlog.clear(),
                    }
                }
            }
        }

        while let Some(event) = self.backlog.pop_front() {
            if self.app_event_sender.try_send(event).is_err() {
                warn!(dropped = self.backlog.len() + 1, "App events dropped at shutdown");
                self.backlog.clear();
            }
        }
        info!("Log manager task stopped");
        self.coordinator
    }

    /// Execute effects, then forward app events
    fn apply(&mut self, outputs: Outputs) {
        for effect in outputs.effects {
            self.execute(effect);
        }
        for event in outputs.app_events {
            self.forward(event);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::SendVehicleCommand(command) => {
                debug!(%command, "Sending vehicle command");
                self.vehicle.send(command);
            }
            Effect::ArmAckTimer { after } => self.ack_timer.arm(after),
            Effect::CancelAckTimer => self.ack_timer.cancel(),
            Effect::BeginUpload(request) => {
                self.uploader.begin(request, self.event_sender.clone());
            }
            Effect::AbortUpload => self.uploader.abort(),
        }
    }

    /// Never blocks. Progress is dropped on a full channel, anything else is
    /// kept in order behind the backlog.
    fn forward(&mut self, event: AppEvent) {
        if event.is_progress() {
            if !self.backlog.is_empty() {
                debug!("App events backlogged, progress dropped");
                return;
            }
            match self.app_event_sender.try_send_non_blocking(event) {
                Ok(()) | Err(ChannelError::ChannelClosed) => {}
                Err(ChannelError::ChannelFull) => debug!("App event channel full, progress dropped"),
            }
            return;
        }
        if !self.backlog.is_empty() {
            self.backlog.push_back(event);
            return;
        }
        match self.app_event_sender.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(event)) => {
                warn!("App event channel full, holding events until observers catch up");
                self.backlog.push_back(event);
            }
        }
    }
}
