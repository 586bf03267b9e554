//! Typed, scoped ownership of the controller channel.

use thiserror::Error;

use crate::control::channel::{ChannelError, MessageChannel};
use crate::control::codec::{self, ProtocolError};
use crate::control::types::{InboundMessage, OutboundMessage, SensorId};

/// Failure to move an envelope across the link.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Sink for outbound messages, as seen by sensor hooks.
pub trait Outbox {
    /// Encodes and sends one message.
    fn publish(&mut self, message: OutboundMessage) -> Result<(), LinkError>;
}

/// Owns a [`MessageChannel`] for the duration of a run.
///
/// The channel is closed exactly once: by [`ControlLink::release`] or, if that
/// was never reached, on drop.
pub struct ControlLink<C: MessageChannel> {
    sensor_id: SensorId,
    channel: C,
    connected: bool,
    released: bool,
}

impl<C: MessageChannel> ControlLink<C> {
    #[must_use]
    pub fn new(sensor_id: SensorId, channel: C) -> Self {
        Self {
            sensor_id,
            channel,
            connected: false,
            released: false,
        }
    }

    /// Connects the underlying channel.
    ///
    /// # Errors
    ///
    /// Propagates the channel's connect failure.
    pub fn open(&mut self) -> Result<(), LinkError> {
        self.channel.connect()?;
        self.connected = true;
        Ok(())
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected && !self.released
    }

    #[must_use]
    pub fn sensor_id(&self) -> &SensorId {
        &self.sensor_id
    }

    /// Encodes and sends `message`.
    ///
    /// # Errors
    ///
    /// [`ChannelError::NotConnected`] before `open` or after `release`, or any
    /// encode/transport failure.
    pub fn send(&mut self, message: &OutboundMessage) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Err(ChannelError::NotConnected.into());
        }
        let frame = codec::encode(&self.sensor_id, message)?;
        self.channel.send(&frame)?;
        Ok(())
    }

    /// Receives and decodes the next queued envelope without blocking.
    ///
    /// # Errors
    ///
    /// Transport failures, or a frame that does not decode. A frame that fails
    /// to decode is consumed; the next call moves on to the following frame.
    pub fn try_recv(&mut self) -> Result<Option<InboundMessage>, LinkError> {
        if !self.is_connected() {
            return Err(ChannelError::NotConnected.into());
        }
        match self.channel.try_recv()? {
            Some(frame) => Ok(Some(codec::decode(&frame)?)),
            None => Ok(None),
        }
    }

    /// Closes the channel. Subsequent calls are no-ops.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.channel.close();
        }
    }
}

impl<C: MessageChannel> Outbox for ControlLink<C> {
    fn publish(&mut self, message: OutboundMessage) -> Result<(), LinkError> {
        self.send(&message)
    }
}

impl<C: MessageChannel> Drop for ControlLink<C> {
    fn drop(&mut self) {
        self.release();
    }
}
