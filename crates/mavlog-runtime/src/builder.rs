//! Runtime Builder API
//!
//! Wires a coordinator, a vehicle link and an uploader to the channels and
//! spawns the [`LogManagerTask`]. Consumers (CLI, tests, a vehicle bridge) get
//! a [`RuntimeHandle`] for sending commands and events and receiving app events.

use mavlog_core::{
    create_app_event_channel, create_command_channel, create_event_channel, AppEventReceiver,
    ChannelConfig, Command, CommandSender, Event, EventSender, LogCoordinator,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::task::LogManagerTask;
use crate::uploader::LogUploader;
use crate::vehicle::{NullVehicleLink, VehicleLink};

/// How long shutdown waits for the task to wind down
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

// ----------------------------------------------------------------------------
// Runtime Builder
// ----------------------------------------------------------------------------

/// Builder for the log manager runtime
pub struct RuntimeBuilder<V, U> {
    coordinator: LogCoordinator,
    vehicle: V,
    uploader: U,
    channel_config: ChannelConfig,
}

impl<U: LogUploader + 'static> RuntimeBuilder<NullVehicleLink, U> {
    /// Create a builder with no vehicle attached
    pub fn new(coordinator: LogCoordinator, uploader: U) -> Self {
        Self {
            coordinator,
            vehicle: NullVehicleLink,
            uploader,
            channel_config: ChannelConfig::default(),
        }
    }
}

impl<V: VehicleLink + 'static, U: LogUploader + 'static> RuntimeBuilder<V, U> {
    /// Attach the link commands to the vehicle are sent through
    pub fn with_vehicle<W: VehicleLink + 'static>(self, vehicle: W) -> RuntimeBuilder<W, U> {
        RuntimeBuilder {
            coordinator: self.coordinator,
            vehicle,
            uploader: self.uploader,
            channel_config: self.channel_config,
        }
    }

    /// Set channel buffer sizes
    pub fn channel_config(mut self, config: ChannelConfig) -> Self {
        self.channel_config = config;
        self
    }

    /// Spawn the log manager task; must be called inside a tokio runtime
    pub fn build_and_start(self) -> RuntimeHandle {
        let (command_sender, command_receiver) = create_command_channel(&self.channel_config);
        let (event_sender, event_receiver) = create_event_channel(&self.channel_config);
        let (app_event_sender, app_event_receiver) = create_app_event_channel(&self.channel_config);

        let task = LogManagerTask::new(
            self.coordinator,
            self.vehicle,
            self.uploader,
            command_receiver,
            event_receiver,
            event_sender.clone(),
            app_event_sender,
        );
        let task_handle = tokio::spawn(task.run());
        info!("Log manager runtime started");

        RuntimeHandle {
            command_sender,
            event_sender,
            app_event_receiver: Some(app_event_receiver),
            task_handle: Some(task_handle),
        }
    }
}

// ----------------------------------------------------------------------------
// Runtime Handle
// ----------------------------------------------------------------------------

/// Handle to a running log manager
pub struct RuntimeHandle {
    command_sender: CommandSender,
    event_sender: EventSender,
    app_event_receiver: Option<AppEventReceiver>,
    task_handle: Option<JoinHandle<LogCoordinator>>,
}

impl RuntimeHandle {
    /// Get a command sender for sending commands to the runtime
    pub fn command_sender(&self) -> CommandSender {
        self.command_sender.clone()
    }

    /// Sender for vehicle events (log data, acks, vehicle and armed changes)
    pub fn event_sender(&self) -> EventSender {
        self.event_sender.clone()
    }

    /// Take the app event receiver (can only be called once)
    pub fn take_app_event_receiver(&mut self) -> Option<AppEventReceiver> {
        self.app_event_receiver.take()
    }

    pub async fn send_command(&self, command: Command) -> RuntimeResult<()> {
        self.command_sender
            .send(command)
            .await
            .map_err(|_| RuntimeError::channel_closed("Failed to send command to runtime"))
    }

    pub async fn send_event(&self, event: Event) -> RuntimeResult<()> {
        self.event_sender
            .send(event)
            .await
            .map_err(|_| RuntimeError::channel_closed("Failed to send event to runtime"))
    }

    /// Check if the runtime is still running
    pub fn is_running(&self) -> bool {
        self.task_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Shutdown gracefully, returning the coordinator for inspection
    pub async fn shutdown(&mut self) -> RuntimeResult<LogCoordinator> {
        info!("Shutting down log manager runtime");
        let _ = self.send_command(Command::Shutdown).await;

        let Some(handle) = self.task_handle.take() else {
            return Err(RuntimeError::TaskFailed("runtime already shut down".to_string()));
        };
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
            Ok(Ok(coordinator)) => {
                info!("Log manager runtime shut down");
                Ok(coordinator)
            }
            Ok(Err(e)) => Err(RuntimeError::TaskFailed(format!("log manager task panicked: {}", e))),
            Err(_) => {
                warn!("Log manager task did not stop in time");
                Err(RuntimeError::TaskFailed("shutdown timed out".to_string()))
            }
        }
    }
}
