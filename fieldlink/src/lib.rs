//! Runtime for sensor drivers supervised by a remote controller.
//!
//! A driver wraps one [`runtime::Sensor`] implementation, connects to its
//! controller over a [`control::MessageChannel`], and then runs two cooperative
//! loops on a single thread: a control loop that handles commands, time
//! references and heartbeats, and a sensor loop that polls the device. Every
//! exit path, clean or faulted, goes through the same teardown.

pub mod clock;
pub mod control;
pub mod net;
pub mod runtime;
mod trace;

pub use clock::{Clock, ManualClock, SystemClock};
pub use runtime::{Driver, DriverConfig, Sensor, SensorContext};
pub use trace::init_tracing;
