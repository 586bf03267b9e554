//! Frame transport between a driver and its controller.
//!
//! The runtime only needs a connection-oriented duplex of discrete frames with
//! non-blocking receive. [`LoopbackChannel`] provides an in-process
//! implementation; [`crate::net::TcpChannel`] a socket-backed one.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use thiserror::Error;

/// Errors raised by a [`MessageChannel`].
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Operation attempted before `connect` or after `close`.
    #[error("channel not connected")]
    NotConnected,
    /// The peer went away.
    #[error("peer disconnected")]
    Disconnected,
    /// A frame exceeded the transport's size limit.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },
    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A duplex, frame-oriented connection to the controller.
pub trait MessageChannel {
    /// Establishes the connection.
    fn connect(&mut self) -> Result<(), ChannelError>;

    /// Queues one frame for delivery. Must not block indefinitely.
    fn send(&mut self, frame: &[u8]) -> Result<(), ChannelError>;

    /// Returns the next complete inbound frame, or `None` if nothing is queued.
    fn try_recv(&mut self) -> Result<Option<Vec<u8>>, ChannelError>;

    /// Releases the connection. Idempotent.
    fn close(&mut self);
}

impl<T: MessageChannel + ?Sized> MessageChannel for Box<T> {
    fn connect(&mut self) -> Result<(), ChannelError> {
        (**self).connect()
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        (**self).send(frame)
    }

    fn try_recv(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        (**self).try_recv()
    }

    fn close(&mut self) {
        (**self).close();
    }
}

/// Driver side of an in-process channel.
pub struct LoopbackChannel {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    connected: bool,
}

/// Controller side of an in-process channel. `Send`, so it can live on another thread.
pub struct ControllerEnd {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl LoopbackChannel {
    /// Creates a connected pair of endpoints.
    #[must_use]
    pub fn pair() -> (Self, ControllerEnd) {
        let (to_controller, from_driver) = mpsc::channel();
        let (to_driver, from_controller) = mpsc::channel();
        (
            Self {
                tx: to_controller,
                rx: from_controller,
                connected: false,
            },
            ControllerEnd {
                tx: to_driver,
                rx: from_driver,
            },
        )
    }
}

impl MessageChannel for LoopbackChannel {
    fn connect(&mut self) -> Result<(), ChannelError> {
        self.connected = true;
        Ok(())
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        if !self.connected {
            return Err(ChannelError::NotConnected);
        }
        self.tx
            .send(frame.to_vec())
            .map_err(|_| ChannelError::Disconnected)
    }

    fn try_recv(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        if !self.connected {
            return Err(ChannelError::NotConnected);
        }
        match self.rx.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            // A controller that hung up simply stops producing frames; the
            // link timeout is what notices.
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => Ok(None),
        }
    }

    fn close(&mut self) {
        self.connected = false;
    }
}

impl ControllerEnd {
    /// Sends a raw frame to the driver. Returns `false` if the driver side is gone.
    pub fn send(&self, frame: impl Into<Vec<u8>>) -> bool {
        self.tx.send(frame.into()).is_ok()
    }

    /// Sends a JSON value as a frame.
    pub fn send_json(&self, value: &serde_json::Value) -> bool {
        serde_json::to_vec(value).is_ok_and(|frame| self.send(frame))
    }

    /// Receives a frame from the driver without blocking.
    #[must_use]
    pub fn try_recv(&self) -> Option<Vec<u8>> {
        self.rx.try_recv().ok()
    }

    /// Receives a frame, waiting up to `timeout`.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Vec<u8>> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drains every frame queued so far, parsed as JSON. Unparseable frames are skipped.
    #[must_use]
    pub fn drain_json(&self) -> Vec<serde_json::Value> {
        std::iter::from_fn(|| self.try_recv())
            .filter_map(|frame| serde_json::from_slice(&frame).ok())
            .collect()
    }
}
