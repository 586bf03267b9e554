//! Driver configuration and the timing policy derived from it.
//!
//! Everything is fixed when the [`DriverConfig`] is handed to
//! [`crate::runtime::Driver::new`]. The periods that govern heartbeats, link
//! timeouts and loop pacing are all derived from the heartbeat period:
//!
//! | Value | Derivation |
//! |-------|------------|
//! | control period | `min(heartbeat, 200ms)` |
//! | read budget | `control period × 0.9` |
//! | link timeout | `heartbeat × 10` |
//! | first-message timeout | `link timeout × 1.5` |

use std::time::Duration;

use crate::control::types::SensorId;
use crate::net::Endpoint;

/// Smallest heartbeat period a driver may configure.
pub const MIN_HEARTBEAT_PERIOD: Duration = Duration::from_millis(100);

/// Slowest the control loop may run, keeping commands responsive at 5 Hz.
pub const MAX_CONTROL_PERIOD: Duration = Duration::from_millis(200);

/// Fraction of the control period a read hook may spend before returning.
const READ_BUDGET_FRACTION: f64 = 0.9;

/// Heartbeat periods without a controller message before the link is dead.
const LINK_TIMEOUT_HEARTBEATS: f64 = 10.0;

/// Extra grace given to the controller to send its very first message.
const FIRST_MESSAGE_GRACE: f64 = 1.5;

/// Constructor-time driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Identity stamped on every outbound envelope.
    pub sensor_id: SensorId,
    /// Controller to connect to.
    pub controller_endpoint: Endpoint,
    /// Expected time between sequential sensor reads.
    ///
    /// Zero runs the sensor on the control loop's cadence (single merged loop).
    ///
    /// **Default**: 250ms
    pub desired_read_period: Duration,
    /// How long the sensor needs to wrap up before the controller may force it closed.
    ///
    /// **Default**: 0
    pub max_closing_time: Duration,
    /// How often a heartbeat is sent, and how often one is expected.
    ///
    /// Floored at [`MIN_HEARTBEAT_PERIOD`].
    ///
    /// **Default**: 500ms
    pub heartbeat_period: Duration,
    /// Hold the state at `waiting_for_time` (and withhold data) until a time reference arrives.
    ///
    /// **Default**: true
    pub wait_for_valid_time: bool,
    /// Tell spurious read timeouts (a read yielding early) apart from real ones.
    ///
    /// Disable for sensors with several sources arriving at different rates that
    /// track their own timeouts.
    ///
    /// **Default**: true
    pub decide_timeout: bool,
}

impl DriverConfig {
    /// Creates a configuration with default timing.
    #[must_use]
    pub fn new(sensor_id: impl Into<SensorId>, controller_endpoint: Endpoint) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            controller_endpoint,
            desired_read_period: Duration::from_millis(250),
            max_closing_time: Duration::ZERO,
            heartbeat_period: Duration::from_millis(500),
            wait_for_valid_time: true,
            decide_timeout: true,
        }
    }

    #[must_use]
    pub const fn with_desired_read_period(mut self, period: Duration) -> Self {
        self.desired_read_period = period;
        self
    }

    #[must_use]
    pub const fn with_max_closing_time(mut self, duration: Duration) -> Self {
        self.max_closing_time = duration;
        self
    }

    #[must_use]
    pub const fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    #[must_use]
    pub const fn with_wait_for_valid_time(mut self, wait: bool) -> Self {
        self.wait_for_valid_time = wait;
        self
    }

    #[must_use]
    pub const fn with_decide_timeout(mut self, decide: bool) -> Self {
        self.decide_timeout = decide;
        self
    }

    /// Derives the timing policy for this configuration.
    #[must_use]
    pub fn timing(&self) -> TimingPolicy {
        TimingPolicy::derive(self.heartbeat_period, self.desired_read_period)
    }
}

/// Periods and thresholds the runtime works with, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingPolicy {
    /// Effective heartbeat period (after flooring).
    pub heartbeat_period: f64,
    /// Period of the control-plane tick.
    pub control_period: f64,
    /// Period of the sensor-plane tick.
    pub sensor_period: f64,
    /// Longest a read hook should run before yielding back.
    pub max_read_duration: f64,
    /// Silence after the last controller message that counts as a dead link.
    pub client_timeout_threshold: f64,
    /// Silence after connecting, with no message ever received, that counts as a dead link.
    pub max_time_to_receive_message: f64,
}

impl TimingPolicy {
    fn derive(heartbeat_period: Duration, desired_read_period: Duration) -> Self {
        let heartbeat = heartbeat_period.max(MIN_HEARTBEAT_PERIOD).as_secs_f64();
        let control = heartbeat.min(MAX_CONTROL_PERIOD.as_secs_f64());
        let sensor = if desired_read_period.is_zero() {
            control
        } else {
            desired_read_period.as_secs_f64()
        };
        let client_timeout = heartbeat * LINK_TIMEOUT_HEARTBEATS;
        Self {
            heartbeat_period: heartbeat,
            control_period: control,
            sensor_period: sensor,
            max_read_duration: control * READ_BUDGET_FRACTION,
            client_timeout_threshold: client_timeout,
            max_time_to_receive_message: client_timeout * FIRST_MESSAGE_GRACE,
        }
    }
}
