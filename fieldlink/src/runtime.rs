//! Driver runtime: configuration, sensor hooks and the single-threaded run loop.
//!
//! - `config`: constructor-time settings and the timing policy derived from them.
//! - `status`: the `(state, paused)` model and its change notifications.
//! - `time_sync`: drift-corrected reference time.
//! - `liveness`: controller-link timeout and read-timeout disambiguation.
//! - `sensor`: the hook trait concrete drivers implement.
//! - `scheduler`: control and sensor ticks interleaved on one thread.
//! - `lifecycle`: connect and set up, run the scheduler, always tear down.

pub mod config;
mod dispatch;
pub mod lifecycle;
pub mod liveness;
pub mod scheduler;
pub mod sensor;
mod state;
pub mod status;
pub mod time_sync;

#[cfg(test)]
mod testing;

pub use config::{DriverConfig, TimingPolicy};
pub use lifecycle::{Driver, RunReport, CLOSING_EVENT};
pub use scheduler::{LoopDeadlines, LoopExit, CLOSING_TEXT};
pub use sensor::{DataLedger, HookError, HookResult, Sensor, SensorContext};
pub use state::DriverError;
pub use status::StatusModel;
pub use time_sync::TimeSynchronizer;
