//! Control plane: envelope types, JSON codec and the controller channel.

pub mod channel;
pub mod codec;
pub mod link;
pub mod types;

pub use channel::{ChannelError, ControllerEnd, LoopbackChannel, MessageChannel};
pub use codec::ProtocolError;
pub use link::{ControlLink, LinkError, Outbox};
pub use types::{
    Command, DriverStatus, Health, InboundMessage, OutboundMessage, SensorId, SensorState,
    TimeReference,
};
