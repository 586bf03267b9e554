//! Routing of decoded inbound messages.

use crate::clock::Clock;
use crate::control::channel::MessageChannel;
use crate::control::types::{Command, InboundMessage};
use crate::runtime::sensor::Sensor;
use crate::runtime::state::{DriverCore, DriverError};
use crate::trace::{debug, info};

impl<S: Sensor, C: MessageChannel, K: Clock> DriverCore<S, C, K> {
    /// Applies one inbound message.
    ///
    /// Liveness accounting happens in the caller; receiving anything at all
    /// counts.
    pub(crate) fn dispatch(&mut self, message: InboundMessage) -> Result<(), DriverError> {
        match message {
            InboundMessage::Command(command) => self.handle_command(command),
            InboundMessage::Time(reference) => {
                self.time_sync.on_time_reference(reference, &self.clock);
                debug!(
                    reference_time = reference.reference_time,
                    "time reference received"
                );
                Ok(())
            }
            InboundMessage::Heartbeat => Ok(()),
        }
    }

    fn handle_command(&mut self, command: Command) -> Result<(), DriverError> {
        match command {
            Command::Close => {
                info!("close requested by controller");
                self.close_requested = true;
                Ok(())
            }
            Command::Pause => {
                self.commit_paused(true)?;
                self.hook("pause", |sensor, ctx| sensor.pause(ctx))
            }
            Command::Resume => {
                self.commit_paused(false)?;
                self.hook("resume", |sensor, ctx| sensor.resume(ctx))
            }
            Command::Special(name) => {
                debug!(command = %name, "special command");
                self.hook("special command", |sensor, ctx| {
                    sensor.handle_special_command(ctx, &name)
                })
            }
        }
    }
}
