//! Setup, scheduled run and guaranteed teardown of one driver.

use crate::clock::{Clock, SystemClock};
use crate::control::channel::MessageChannel;
use crate::control::types::{DriverStatus, OutboundMessage, SensorState};
use crate::runtime::config::DriverConfig;
use crate::runtime::scheduler::LoopExit;
use crate::runtime::sensor::Sensor;
use crate::runtime::state::{DriverCore, DriverError};
use crate::trace::{debug, error, info, warn};

/// Name of the event sent exactly once as a run winds down.
pub const CLOSING_EVENT: &str = "closing";

/// Outcome of [`Driver::run`].
#[derive(Debug)]
pub struct RunReport {
    pub exit: LoopExit,
    /// Status after teardown.
    pub final_status: DriverStatus,
    pub messages_received: u64,
    pub data_messages_sent: u64,
    /// Seconds spent tearing down, from the closed status to the released link.
    pub closing_time: f64,
}

/// A sensor driver bound to its controller channel.
///
/// ```no_run
/// use fieldlink::net::TcpChannel;
/// use fieldlink::runtime::{Driver, DriverConfig, HookResult, Sensor, SensorContext};
/// use fieldlink::control::SensorState;
///
/// struct Thermometer;
///
/// impl Sensor for Thermometer {
///     fn close(&mut self, _ctx: &mut SensorContext<'_>) -> HookResult {
///         Ok(())
///     }
///
///     fn read_data(&mut self, ctx: &mut SensorContext<'_>) -> HookResult<SensorState> {
///         ctx.handle_data(vec![ctx.utc_time().into(), 21.5_f64.into()])?;
///         Ok(SensorState::Normal)
///     }
/// }
///
/// let config = DriverConfig::new("thermo", "tcp://127.0.0.1:5000".parse()?);
/// let channel = TcpChannel::new(config.controller_endpoint);
/// let report = Driver::new(config, Thermometer, channel).run();
/// println!("{:?}", report.exit);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Driver<S, C: MessageChannel, K = SystemClock> {
    core: DriverCore<S, C, K>,
}

impl<S: Sensor, C: MessageChannel> Driver<S, C> {
    #[must_use]
    pub fn new(config: DriverConfig, sensor: S, channel: C) -> Self {
        Self::with_clock(config, sensor, channel, SystemClock::new())
    }
}

impl<S: Sensor, C: MessageChannel, K: Clock> Driver<S, C, K> {
    /// Creates a driver that reads time from `clock` instead of the system clock.
    #[must_use]
    pub fn with_clock(config: DriverConfig, sensor: S, channel: C, clock: K) -> Self {
        Self {
            core: DriverCore::new(&config, sensor, channel, clock),
        }
    }

    #[must_use]
    pub fn status(&self) -> DriverStatus {
        self.core.status.status()
    }

    #[must_use]
    pub fn sensor(&self) -> &S {
        &self.core.sensor
    }

    /// Connects, runs until the scheduler stops, then tears down.
    ///
    /// Teardown runs on every exit path: a faulted run commits `error` and
    /// reports the fault as text first, then the status drops to `closed`
    /// (unless health is already bad), one `closing` event goes out, the sensor
    /// is paused and closed, and the channel is released.
    pub fn run(mut self) -> RunReport {
        let exit = match self.start() {
            Ok(()) => self.core.run_loops(),
            Err(err) => LoopExit::Failed(err),
        };

        match &exit {
            LoopExit::CloseRequested => {
                info!(sensor_id = %self.core.link.sensor_id(), "closing on request");
            }
            LoopExit::ControllerLinkTimeout { .. } | LoopExit::Failed(_) => {
                self.report_failure(&exit);
            }
        }
        let closing_time = self.teardown();

        RunReport {
            final_status: self.core.status.status(),
            messages_received: self.core.link_monitor.messages_received(),
            data_messages_sent: self.core.data.data_messages_sent,
            closing_time,
            exit,
        }
    }

    fn start(&mut self) -> Result<(), DriverError> {
        let core = &mut self.core;
        core.link.open()?;
        let now = core.now();
        core.link_monitor.on_connected(now);
        info!(sensor_id = %core.link.sensor_id(), "connected to controller");

        core.announce_status()?;
        core.hook("setup", |sensor, ctx| sensor.setup(ctx))
    }

    fn report_failure(&mut self, exit: &LoopExit) {
        let diagnostic = exit.diagnostic().unwrap_or_default();
        error!(%diagnostic, "driver run failed");
        if let Err(err) = self.core.commit_state(SensorState::Error) {
            warn!(%err, "could not report error state");
        }
        if let Err(err) = self.core.send(OutboundMessage::NewSensorText(diagnostic)) {
            warn!(%err, "could not report failure");
        }
    }

    /// Returns how long teardown took, in seconds.
    fn teardown(&mut self) -> f64 {
        let core = &mut self.core;
        let started = core.now();
        debug!(budget = core.max_closing_time, "tearing down");
        let change = core.status.close();
        if let Err(err) = core.publish_change(change) {
            warn!(%err, "could not report closed state");
        }
        core.close_requested = false;

        if let Err(err) = core.send(OutboundMessage::NewSensorEvent(CLOSING_EVENT.to_owned())) {
            warn!(%err, "could not send closing event");
        }
        debug!("pausing sensor");
        if let Err(err) = core.hook("pause", |sensor, ctx| sensor.pause(ctx)) {
            warn!(%err, "sensor pause failed during teardown");
        }
        debug!("closing sensor");
        if let Err(err) = core.hook("close", |sensor, ctx| sensor.close(ctx)) {
            warn!(%err, "sensor close failed during teardown");
        }
        if !core.sensor.is_closed() {
            warn!("sensor still reports open after close");
        }

        debug!("releasing controller link");
        core.link.release();

        let elapsed = core.now() - started;
        if core.max_closing_time > 0.0 && elapsed > core.max_closing_time {
            warn!(elapsed, budget = core.max_closing_time, "teardown overran its closing budget");
        }
        info!(sensor_id = %core.link.sensor_id(), state = %core.status.state(), "driver stopped");
        elapsed
    }
}
