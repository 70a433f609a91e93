//! Vehicle link seam
//!
//! The runtime only ever sends two fire-and-forget commands to the vehicle.
//! Whatever talks to the autopilot implements [`VehicleLink`] and feeds its
//! observations back as [`mavlog_core::Event`]s.

use mavlog_core::VehicleCommand;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Outbound commands to the active vehicle
pub trait VehicleLink: Send {
    fn start_log(&mut self);
    fn stop_log(&mut self);

    fn send(&mut self, command: VehicleCommand) {
        match command {
            VehicleCommand::StartLogging => self.start_log(),
            VehicleCommand::StopLogging => self.stop_log(),
        }
    }
}

/// Link used when no vehicle is attached (upload-only operation)
#[derive(Debug, Default, Clone, Copy)]
pub struct NullVehicleLink;

impl VehicleLink for NullVehicleLink {
    fn start_log(&mut self) {
        debug!("No vehicle link, start log command dropped");
    }

    fn stop_log(&mut self) {
        debug!("No vehicle link, stop log command dropped");
    }
}

/// Forwards commands over a channel to the task that owns the real link
#[derive(Debug, Clone)]
pub struct ChannelVehicleLink {
    sender: mpsc::Sender<VehicleCommand>,
}

impl ChannelVehicleLink {
    pub fn new(sender: mpsc::Sender<VehicleCommand>) -> Self {
        Self { sender }
    }

    /// Create a link and the receiver the vehicle side reads commands from
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<VehicleCommand>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (Self::new(sender), receiver)
    }

    fn forward(&self, command: VehicleCommand) {
        if let Err(e) = self.sender.try_send(command) {
            warn!(%command, "Vehicle command not delivered: {}", e);
        }
    }
}

impl VehicleLink for ChannelVehicleLink {
    fn start_log(&mut self) {
        self.forward(VehicleCommand::StartLogging);
    }

    fn stop_log(&mut self) {
        self.forward(VehicleCommand::StopLogging);
    }
}
