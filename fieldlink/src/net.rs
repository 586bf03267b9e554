//! Socket transport to the controller.
//!
//! Non-blocking TCP built on mio streams; the runtime polls it from the control
//! loop and never waits on it.

pub mod endpoint;
pub mod stream;

pub use endpoint::{Endpoint, EndpointError};
pub use stream::TcpChannel;
