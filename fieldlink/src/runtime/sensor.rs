//! The hook interface a concrete sensor driver implements.
//!
//! The runtime calls these hooks from its single thread; none of them may block
//! for long. In particular [`Sensor::read_data`] should return within
//! [`SensorContext::max_read_duration`] so heartbeats and commands stay
//! responsive. A read that needs longer returns [`SensorState::TimedOut`] and
//! picks up where it left off on the next call; the runtime works out whether
//! that was a genuine timeout.

use serde_json::Value;

use crate::clock::Clock;
use crate::control::link::{LinkError, Outbox};
use crate::control::types::{OutboundMessage, SensorState};
use crate::runtime::time_sync::TimeSynchronizer;

/// Error type returned by sensor hooks. Any hook error ends the run.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a sensor hook.
pub type HookResult<T = ()> = Result<T, HookError>;

/// Driver-specific behaviour plugged into the runtime.
///
/// Only [`Sensor::read_data`] and [`Sensor::close`] are required.
pub trait Sensor {
    /// Called once after the controller link is up, before the loops start.
    fn setup(&mut self, ctx: &mut SensorContext<'_>) -> HookResult {
        let _ = ctx;
        Ok(())
    }

    /// Stops reading and releases sensor resources. Called on every exit path.
    fn close(&mut self, ctx: &mut SensorContext<'_>) -> HookResult;

    /// Whether the sensor has released its resources.
    fn is_closed(&self) -> bool {
        true
    }

    /// Asks the device for a new reading. Skipped while a previous request is
    /// still in flight.
    fn request_data(&mut self, ctx: &mut SensorContext<'_>) -> HookResult {
        let _ = ctx;
        Ok(())
    }

    /// Reads whatever the device has produced and reports the resulting state.
    fn read_data(&mut self, ctx: &mut SensorContext<'_>) -> HookResult<SensorState>;

    /// Called on a `pause` command and during teardown.
    fn pause(&mut self, ctx: &mut SensorContext<'_>) -> HookResult {
        let _ = ctx;
        Ok(())
    }

    /// Called on a `resume` command.
    fn resume(&mut self, ctx: &mut SensorContext<'_>) -> HookResult {
        let _ = ctx;
        Ok(())
    }

    /// Called for any command other than `close`, `pause` and `resume`.
    fn handle_special_command(
        &mut self,
        ctx: &mut SensorContext<'_>,
        command: &str,
    ) -> HookResult {
        let _ = (ctx, command);
        Ok(())
    }
}

impl<T: Sensor + ?Sized> Sensor for Box<T> {
    fn setup(&mut self, ctx: &mut SensorContext<'_>) -> HookResult {
        (**self).setup(ctx)
    }

    fn close(&mut self, ctx: &mut SensorContext<'_>) -> HookResult {
        (**self).close(ctx)
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    fn request_data(&mut self, ctx: &mut SensorContext<'_>) -> HookResult {
        (**self).request_data(ctx)
    }

    fn read_data(&mut self, ctx: &mut SensorContext<'_>) -> HookResult<SensorState> {
        (**self).read_data(ctx)
    }

    fn pause(&mut self, ctx: &mut SensorContext<'_>) -> HookResult {
        (**self).pause(ctx)
    }

    fn resume(&mut self, ctx: &mut SensorContext<'_>) -> HookResult {
        (**self).resume(ctx)
    }

    fn handle_special_command(
        &mut self,
        ctx: &mut SensorContext<'_>,
        command: &str,
    ) -> HookResult {
        (**self).handle_special_command(ctx, command)
    }
}

/// Bookkeeping for data produced by the sensor.
#[derive(Debug, Default)]
pub struct DataLedger {
    /// System time the sensor last handed over a record.
    pub last_data_time: f64,
    /// Number of `new_sensor_data` envelopes sent.
    pub data_messages_sent: u64,
}

/// What a hook can see and do while it runs.
pub struct SensorContext<'a> {
    pub(crate) outbox: &'a mut dyn Outbox,
    pub(crate) clock: &'a dyn Clock,
    pub(crate) time_sync: &'a TimeSynchronizer,
    pub(crate) data: &'a mut DataLedger,
    pub(crate) paused: bool,
    pub(crate) wait_for_valid_time: bool,
    pub(crate) max_read_duration: f64,
}

impl SensorContext<'_> {
    /// Current reference time, or `0.0` before the first time reference.
    #[must_use]
    pub fn utc_time(&self) -> f64 {
        self.time_sync.current_time(&self.clock)
    }

    /// Local system time in seconds.
    #[must_use]
    pub fn sys_time(&self) -> f64 {
        self.clock.now()
    }

    #[must_use]
    pub const fn paused(&self) -> bool {
        self.paused
    }

    /// Time budget for one [`Sensor::read_data`] call, in seconds.
    #[must_use]
    pub const fn max_read_duration(&self) -> f64 {
        self.max_read_duration
    }

    #[must_use]
    pub const fn data_messages_sent(&self) -> u64 {
        self.data.data_messages_sent
    }

    /// Whether data handed to [`SensorContext::handle_data`] is forwarded right now.
    #[must_use]
    pub fn should_record_data(&self) -> bool {
        let needs_time = self.wait_for_valid_time && self.utc_time() == 0.0;
        !(needs_time || self.paused)
    }

    /// Hands one record to the runtime.
    ///
    /// The record always counts as fresh data for timeout disambiguation. It is
    /// only forwarded to the controller when [`SensorContext::should_record_data`]
    /// holds; returns whether it was.
    ///
    /// # Errors
    ///
    /// Encoding or transport failure.
    pub fn handle_data(&mut self, record: Vec<Value>) -> Result<bool, LinkError> {
        self.data.last_data_time = self.clock.now();
        if !self.should_record_data() {
            return Ok(false);
        }
        let message = OutboundMessage::NewSensorData(vec![record]);
        self.outbox.publish(message)?;
        self.data.data_messages_sent += 1;
        Ok(true)
    }

    /// Sends free-form text to the controller.
    ///
    /// # Errors
    ///
    /// Encoding or transport failure.
    pub fn send_text(&mut self, text: impl Into<String>) -> Result<(), LinkError> {
        let message = OutboundMessage::NewSensorText(text.into());
        self.outbox.publish(message)
    }

    /// Notifies the controller that something noteworthy happened.
    ///
    /// # Errors
    ///
    /// Encoding or transport failure.
    pub fn send_event(&mut self, name: impl Into<String>) -> Result<(), LinkError> {
        let message = OutboundMessage::NewSensorEvent(name.into());
        self.outbox.publish(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::control::types::TimeReference;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingOutbox {
        sent: Vec<OutboundMessage>,
    }

    impl Outbox for RecordingOutbox {
        fn publish(&mut self, message: OutboundMessage) -> Result<(), LinkError> {
            self.sent.push(message);
            Ok(())
        }
    }

    struct Fixture {
        outbox: RecordingOutbox,
        clock: ManualClock,
        sync: TimeSynchronizer,
        data: DataLedger,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                outbox: RecordingOutbox::default(),
                clock: ManualClock::new(10.0),
                sync: TimeSynchronizer::new(),
                data: DataLedger::default(),
            }
        }

        fn ctx(&mut self, paused: bool, wait_for_valid_time: bool) -> SensorContext<'_> {
            SensorContext {
                outbox: &mut self.outbox,
                clock: &self.clock,
                time_sync: &self.sync,
                data: &mut self.data,
                paused,
                wait_for_valid_time,
                max_read_duration: 0.18,
            }
        }
    }

    #[test]
    fn data_withheld_while_paused_but_still_stamped() {
        let mut fx = Fixture::new();
        let mut ctx = fx.ctx(true, false);
        assert!(!ctx.handle_data(vec![json!(1)]).unwrap());
        assert_eq!(ctx.data_messages_sent(), 0);
        assert!(fx.outbox.sent.is_empty());
        assert_eq!(fx.data.last_data_time, 10.0);
    }

    #[test]
    fn data_withheld_until_time_reference() {
        let mut fx = Fixture::new();
        assert!(!fx.ctx(false, true).should_record_data());

        fx.sync.on_time_reference(
            TimeReference {
                reference_time: 1_000.0,
                local_time_at_source: 10.0,
            },
            &fx.clock,
        );
        let mut ctx = fx.ctx(false, true);
        assert!(ctx.should_record_data());
        assert!(ctx.handle_data(vec![json!("a"), json!(2.5)]).unwrap());
        assert_eq!(ctx.data_messages_sent(), 1);
        assert_eq!(
            fx.outbox.sent,
            vec![OutboundMessage::NewSensorData(vec![vec![json!("a"), json!(2.5)]])]
        );
    }

    #[test]
    fn text_and_events_pass_through() {
        let mut fx = Fixture::new();
        let mut ctx = fx.ctx(true, true);
        ctx.send_text("hello").unwrap();
        ctx.send_event("trigger").unwrap();
        assert_eq!(
            fx.outbox.sent,
            vec![
                OutboundMessage::NewSensorText("hello".into()),
                OutboundMessage::NewSensorEvent("trigger".into()),
            ]
        );
    }

    #[test]
    fn time_accessors() {
        let mut fx = Fixture::new();
        let ctx = fx.ctx(false, false);
        assert_eq!(ctx.sys_time(), 10.0);
        assert_eq!(ctx.utc_time(), 0.0);
        assert!((ctx.max_read_duration() - 0.18).abs() < 1e-12);
        assert!(!ctx.paused());
    }
}
