//! Owned runtime state of one driver.
//!
//! Every mutable piece of a running driver lives in [`DriverCore`] and is
//! touched only from the driver's own thread. The dispatcher, the scheduler and
//! the lifecycle each add an `impl` block on it.

use thiserror::Error;

use crate::clock::Clock;
use crate::control::channel::MessageChannel;
use crate::control::link::{ControlLink, LinkError};
use crate::control::types::{DriverStatus, OutboundMessage, SensorState};
use crate::runtime::config::{DriverConfig, TimingPolicy};
use crate::runtime::liveness::{LinkMonitor, ReadTimeoutJudge};
use crate::runtime::sensor::{DataLedger, HookError, HookResult, Sensor, SensorContext};
use crate::runtime::status::StatusModel;
use crate::runtime::time_sync::TimeSynchronizer;
use crate::trace::debug;

/// A hook or link failure that ends a run in the `error` state.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("controller link failed: {0}")]
    Link(#[from] LinkError),
    #[error("sensor {hook} hook failed: {source}")]
    Hook {
        hook: &'static str,
        #[source]
        source: HookError,
    },
}

pub(crate) struct DriverCore<S, C: MessageChannel, K> {
    pub(crate) sensor: S,
    pub(crate) link: ControlLink<C>,
    pub(crate) clock: K,
    pub(crate) timing: TimingPolicy,
    pub(crate) wait_for_valid_time: bool,
    /// Teardown budget in seconds; zero means unbounded.
    pub(crate) max_closing_time: f64,
    pub(crate) status: StatusModel,
    pub(crate) time_sync: TimeSynchronizer,
    pub(crate) link_monitor: LinkMonitor,
    pub(crate) read_judge: ReadTimeoutJudge,
    pub(crate) data: DataLedger,
    /// Set by a `close` command, observed by the next control tick.
    pub(crate) close_requested: bool,
    pub(crate) last_heartbeat_sent: f64,
}

impl<S: Sensor, C: MessageChannel, K: Clock> DriverCore<S, C, K> {
    pub(crate) fn new(config: &DriverConfig, sensor: S, channel: C, clock: K) -> Self {
        let timing = config.timing();
        Self {
            sensor,
            link: ControlLink::new(config.sensor_id.clone(), channel),
            clock,
            timing,
            wait_for_valid_time: config.wait_for_valid_time,
            max_closing_time: config.max_closing_time.as_secs_f64(),
            status: StatusModel::new(),
            time_sync: TimeSynchronizer::new(),
            link_monitor: LinkMonitor::new(&timing),
            read_judge: ReadTimeoutJudge::new(timing.sensor_period, config.decide_timeout),
            data: DataLedger::default(),
            close_requested: false,
            last_heartbeat_sent: 0.0,
        }
    }

    pub(crate) fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Runs one sensor hook with a fresh [`SensorContext`].
    pub(crate) fn hook<R>(
        &mut self,
        name: &'static str,
        f: impl FnOnce(&mut S, &mut SensorContext<'_>) -> HookResult<R>,
    ) -> Result<R, DriverError> {
        let mut ctx = SensorContext {
            outbox: &mut self.link,
            clock: &self.clock,
            time_sync: &self.time_sync,
            data: &mut self.data,
            paused: self.status.paused(),
            wait_for_valid_time: self.wait_for_valid_time,
            max_read_duration: self.timing.max_read_duration,
        };
        f(&mut self.sensor, &mut ctx).map_err(|source| DriverError::Hook { hook: name, source })
    }

    pub(crate) fn send(&mut self, message: OutboundMessage) -> Result<(), LinkError> {
        self.link.send(&message)
    }

    /// Publishes the current status unconditionally.
    pub(crate) fn announce_status(&mut self) -> Result<(), LinkError> {
        let status = self.status.status();
        self.send(OutboundMessage::NewSensorStatus(status))
    }

    pub(crate) fn publish_change(&mut self, change: Option<DriverStatus>) -> Result<(), LinkError> {
        match change {
            Some(status) => {
                debug!(state = %status.state, paused = status.paused, "status changed");
                self.send(OutboundMessage::NewSensorStatus(status))
            }
            None => Ok(()),
        }
    }

    pub(crate) fn commit_state(&mut self, state: SensorState) -> Result<(), LinkError> {
        let change = self.status.set_state(state);
        self.publish_change(change)
    }

    pub(crate) fn commit_paused(&mut self, paused: bool) -> Result<(), LinkError> {
        let change = self.status.set_paused(paused);
        self.publish_change(change)
    }
}
