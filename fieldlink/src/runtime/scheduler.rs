//! Control-plane and sensor-plane ticks interleaved on one thread.
//!
//! Each plane has its own period and next-deadline timestamp. A tick stamps its
//! deadline when it starts, so a slow tick eats into its own period rather than
//! pushing the other plane back. Between ticks the thread sleeps until the
//! earlier of the two deadlines; that sleep is the only suspension point.
//!
//! The control tick drains every queued controller message without blocking,
//! checks link liveness, honours a pending close and sends heartbeats. The
//! sensor tick requests and reads data and commits the resulting state.

use crate::clock::Clock;
use crate::control::channel::MessageChannel;
use crate::control::codec::ProtocolError;
use crate::control::link::LinkError;
use crate::control::types::{Health, OutboundMessage, SensorState};
use crate::runtime::sensor::Sensor;
use crate::runtime::state::{DriverCore, DriverError};
use crate::trace::{debug, warn};

/// Text sent to the controller when the loop stops on request.
pub const CLOSING_TEXT: &str = "Closing...";

/// Why the scheduler stopped.
#[derive(Debug)]
pub enum LoopExit {
    /// The controller sent `close`.
    CloseRequested,
    /// The controller went silent for longer than the link allows.
    ControllerLinkTimeout { silent_for: f64 },
    /// A hook failed or the link broke.
    Failed(DriverError),
}

impl LoopExit {
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        matches!(self, Self::CloseRequested)
    }

    /// Text reported to the controller for an unclean exit.
    #[must_use]
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            Self::CloseRequested => None,
            Self::ControllerLinkTimeout { silent_for } => Some(format!(
                "Controller connection timed out after {silent_for:.2}s."
            )),
            Self::Failed(err) => Some(err.to_string()),
        }
    }
}

impl From<DriverError> for LoopExit {
    fn from(err: DriverError) -> Self {
        Self::Failed(err)
    }
}

/// Next-run timestamps of the two planes. Both start at zero so the first
/// pass runs both ticks.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct LoopDeadlines {
    pub control: f64,
    pub sensor: f64,
}

impl LoopDeadlines {
    #[must_use]
    pub fn next_wake(&self) -> f64 {
        self.control.min(self.sensor)
    }
}

impl<S: Sensor, C: MessageChannel, K: Clock> DriverCore<S, C, K> {
    /// Runs both planes until one of them ends the run.
    pub(crate) fn run_loops(&mut self) -> LoopExit {
        let mut deadlines = LoopDeadlines::default();
        loop {
            if let Some(exit) = self.step(&mut deadlines) {
                return exit;
            }
            let wait = deadlines.next_wake() - self.now();
            self.clock.sleep(wait.max(0.0));
        }
    }

    /// Runs whichever ticks are due now.
    pub(crate) fn step(&mut self, deadlines: &mut LoopDeadlines) -> Option<LoopExit> {
        let now = self.now();
        if now >= deadlines.control {
            deadlines.control = now + self.timing.control_period;
            match self.control_tick() {
                Ok(None) => {}
                Ok(Some(exit)) => return Some(exit),
                Err(err) => return Some(err.into()),
            }
        }

        let now = self.now();
        if now >= deadlines.sensor {
            deadlines.sensor = now + self.timing.sensor_period;
            if let Err(err) = self.sensor_tick() {
                return Some(err.into());
            }
        }
        None
    }

    fn control_tick(&mut self) -> Result<Option<LoopExit>, DriverError> {
        self.drain_inbound()?;

        let now = self.now();
        self.link_monitor.on_processing_pass(now);
        if let Some(silent_for) = self.link_monitor.timed_out() {
            return Ok(Some(LoopExit::ControllerLinkTimeout { silent_for }));
        }

        if self.close_requested {
            self.send(OutboundMessage::NewSensorText(CLOSING_TEXT.to_owned()))?;
            return Ok(Some(LoopExit::CloseRequested));
        }

        if now - self.last_heartbeat_sent > self.timing.heartbeat_period {
            self.send(OutboundMessage::heartbeat())?;
            self.last_heartbeat_sent = now;
        }
        Ok(None)
    }

    /// Dispatches every message queued on the link.
    ///
    /// A message of unknown type still proves the controller is alive; it is
    /// logged and skipped. Any other decode failure ends the run.
    fn drain_inbound(&mut self) -> Result<(), DriverError> {
        loop {
            let received = self.link.try_recv();
            let now = self.now();
            match received {
                Ok(Some(message)) => {
                    self.link_monitor.on_message(now);
                    debug!(kind = message.kind(), "controller message");
                    self.dispatch(message)?;
                }
                Ok(None) => return Ok(()),
                Err(LinkError::Protocol(ProtocolError::UnrecognizedMessageType(kind))) => {
                    self.link_monitor.on_message(now);
                    warn!(%kind, "ignoring controller message of unrecognized type");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn sensor_tick(&mut self) -> Result<(), DriverError> {
        if !self.read_judge.still_waiting_for_data() {
            self.hook("request_data", |sensor, ctx| sensor.request_data(ctx))?;
        }

        let started = self.now();
        let reported = self.hook("read_data", |sensor, ctx| sensor.read_data(ctx))?;
        let now = self.now();
        let elapsed = now - started;
        if elapsed > self.timing.max_read_duration {
            warn!(
                elapsed,
                budget = self.timing.max_read_duration,
                "read_data overran its budget"
            );
        }

        let last_data_time = self.data.last_data_time;
        let mut state = self.read_judge.judge(reported, now, last_data_time);
        if state.health() != Health::Bad && self.waiting_for_time() {
            state = SensorState::WaitingForTime;
        }
        self.commit_state(state)?;
        Ok(())
    }

    fn waiting_for_time(&self) -> bool {
        self.wait_for_valid_time && self.time_sync.current_time(&self.clock) == 0.0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{json, Value};

    use super::*;
    use crate::runtime::testing::{config, harness, harness_with, Call, ScriptedSensor, START};

    fn types(sent: &[Value]) -> Vec<&str> {
        sent.iter().filter_map(|m| m["type"].as_str()).collect()
    }

    fn statuses(sent: &[Value]) -> Vec<Value> {
        sent.iter()
            .filter(|m| m["type"] == "new_sensor_status")
            .map(|m| m["body"].clone())
            .collect()
    }

    #[test]
    fn deadlines_wake_at_the_earlier_plane() {
        let deadlines = LoopDeadlines {
            control: 10.2,
            sensor: 10.05,
        };
        assert_eq!(deadlines.next_wake(), 10.05);
    }

    #[test]
    fn first_step_runs_both_planes() {
        let (mut core, controller, _clock) = harness(ScriptedSensor::default());
        let mut deadlines = LoopDeadlines::default();
        assert!(core.step(&mut deadlines).is_none());

        assert!((deadlines.control - (START + 0.2)).abs() < 1e-9);
        assert!((deadlines.sensor - (START + 0.25)).abs() < 1e-9);
        assert_eq!(
            *core.sensor.calls.borrow(),
            vec![Call::RequestData, Call::ReadData]
        );
        let sent = controller.drain_json();
        assert_eq!(sent[0]["type"], "new_sensor_heartbeat");
        assert_eq!(sent[0]["body"], " ");
    }

    #[test]
    fn planes_run_on_independent_periods() {
        let config = config().with_desired_read_period(Duration::from_secs(1));
        let (mut core, controller, clock) = harness_with(&config, ScriptedSensor::default());
        controller.send_json(&json!({"type": "heartbeat", "body": ""}));

        let mut deadlines = LoopDeadlines::default();
        let mut control_ticks = 0;
        while clock.now() < START + 1.9 {
            let before = deadlines;
            assert!(core.step(&mut deadlines).is_none());
            if deadlines.control != before.control {
                control_ticks += 1;
            }
            clock.sleep((deadlines.next_wake() - clock.now()).max(0.0));
        }
        let reads = core
            .sensor
            .calls
            .borrow()
            .iter()
            .filter(|c| **c == Call::ReadData)
            .count();
        assert_eq!(reads, 2);
        assert_eq!(control_ticks, 10);
    }

    #[test]
    fn waiting_for_time_until_reference_arrives() {
        let (mut core, controller, _clock) = harness(ScriptedSensor::default());
        let mut deadlines = LoopDeadlines::default();
        let _ = core.step(&mut deadlines);
        assert_eq!(core.status.state(), SensorState::WaitingForTime);

        controller.send_json(&json!({"type": "time", "body": [5_000.0, START]}));
        deadlines = LoopDeadlines::default();
        let _ = core.step(&mut deadlines);
        assert_eq!(core.status.state(), SensorState::Normal);

        let sent = controller.drain_json();
        assert_eq!(
            statuses(&sent),
            vec![
                json!(["waiting_for_time", "neutral", true]),
                json!(["normal", "good", true]),
            ]
        );
    }

    #[test]
    fn bad_read_is_never_masked_by_waiting_for_time() {
        let sensor = ScriptedSensor {
            reads: [SensorState::Error].into(),
            ..ScriptedSensor::default()
        };
        let (mut core, _controller, _clock) = harness(sensor);
        let _ = core.step(&mut LoopDeadlines::default());
        assert_eq!(core.status.state(), SensorState::Error);
    }

    #[test]
    fn steady_state_sends_no_status() {
        let config = config().with_wait_for_valid_time(false);
        let (mut core, controller, clock) = harness_with(&config, ScriptedSensor::default());
        let mut deadlines = LoopDeadlines::default();
        for _ in 0..20 {
            let _ = core.step(&mut deadlines);
            clock.sleep((deadlines.next_wake() - clock.now()).max(0.0));
        }
        assert_eq!(statuses(&controller.drain_json()).len(), 1);
    }

    #[test]
    fn spurious_timeout_repolls_without_a_new_request() {
        let config = config().with_wait_for_valid_time(false);
        let sensor = ScriptedSensor {
            reads: [SensorState::TimedOut, SensorState::TimedOut].into(),
            ..ScriptedSensor::default()
        };
        let (mut core, _controller, clock) = harness_with(&config, sensor);
        core.data.last_data_time = START;

        let mut deadlines = LoopDeadlines::default();
        let _ = core.step(&mut deadlines);
        assert_eq!(core.status.state(), SensorState::Normal);
        assert!(core.read_judge.still_waiting_for_data());

        // A full read period later the same report is genuine.
        clock.set(deadlines.sensor);
        let _ = core.step(&mut deadlines);
        assert_eq!(core.status.state(), SensorState::TimedOut);
        assert!(!core.read_judge.still_waiting_for_data());

        let calls = core.sensor.calls.borrow();
        assert_eq!(
            *calls,
            vec![Call::RequestData, Call::ReadData, Call::ReadData]
        );
    }

    #[test]
    fn merged_loop_judges_timeouts_against_the_control_period() {
        let config = config()
            .with_desired_read_period(Duration::ZERO)
            .with_wait_for_valid_time(false);
        let sensor = ScriptedSensor {
            reads: [SensorState::TimedOut, SensorState::TimedOut].into(),
            ..ScriptedSensor::default()
        };
        let (mut core, _controller, clock) = harness_with(&config, sensor);
        core.data.last_data_time = START - 0.05;

        let mut deadlines = LoopDeadlines::default();
        let _ = core.step(&mut deadlines);
        assert_eq!(core.status.state(), SensorState::Normal);
        assert!(core.read_judge.still_waiting_for_data());
        assert!((deadlines.sensor - deadlines.control).abs() < 1e-9);

        clock.set(deadlines.sensor);
        let _ = core.step(&mut deadlines);
        assert_eq!(core.status.state(), SensorState::TimedOut);
    }

    #[test]
    fn close_request_sends_closing_text_and_stops() {
        let (mut core, controller, _clock) = harness(ScriptedSensor::default());
        controller.send_json(&json!({"type": "command", "body": "close"}));
        let exit = core.step(&mut LoopDeadlines::default()).unwrap();
        assert!(exit.is_clean());
        assert!(exit.diagnostic().is_none());

        let sent = controller.drain_json();
        assert_eq!(types(&sent), vec!["new_sensor_text"]);
        assert_eq!(sent[0]["body"], CLOSING_TEXT);
        assert!(core.sensor.calls.borrow().is_empty());
    }

    #[test]
    fn silent_controller_times_out() {
        let (mut core, _controller, clock) = harness(ScriptedSensor::default());
        clock.advance(7.6);
        let exit = core.step(&mut LoopDeadlines::default()).unwrap();
        match exit {
            LoopExit::ControllerLinkTimeout { silent_for } => {
                assert!((silent_for - 7.6).abs() < 1e-6);
            }
            ref other => panic!("unexpected exit: {other:?}"),
        }
        assert!(exit.diagnostic().unwrap().contains("timed out"));
    }

    #[test]
    fn unknown_message_type_counts_as_liveness() {
        let (mut core, controller, clock) = harness(ScriptedSensor::default());
        clock.advance(7.0);
        controller.send_json(&json!({"type": "reboot", "body": null}));
        let mut deadlines = LoopDeadlines::default();
        assert!(core.step(&mut deadlines).is_none());
        assert_eq!(core.link_monitor.messages_received(), 1);

        clock.advance(1.0);
        deadlines = LoopDeadlines::default();
        assert!(core.step(&mut deadlines).is_none());
    }

    #[test]
    fn malformed_time_payload_is_fatal() {
        let (mut core, controller, _clock) = harness(ScriptedSensor::default());
        controller.send_json(&json!({"type": "time", "body": [1.0]}));
        let exit = core.step(&mut LoopDeadlines::default()).unwrap();
        assert!(matches!(
            exit,
            LoopExit::Failed(DriverError::Link(LinkError::Protocol(
                ProtocolError::MalformedTimePayload(_)
            )))
        ));
    }

    #[test]
    fn read_failure_ends_the_loop() {
        let sensor = ScriptedSensor {
            fail_read_at: Some(1),
            ..ScriptedSensor::default()
        };
        let (mut core, _controller, _clock) = harness(sensor);
        let exit = core.step(&mut LoopDeadlines::default()).unwrap();
        assert!(matches!(
            exit,
            LoopExit::Failed(DriverError::Hook { hook: "read_data", .. })
        ));
    }

    #[test]
    fn run_loops_returns_on_close() {
        let sensor = ScriptedSensor::default();
        let (mut core, controller, clock) = harness(sensor);
        controller.send_json(&json!({"type": "heartbeat", "body": ""}));
        core.sensor.on_read = Some(Box::new(move |count, _ctx| {
            if count == 4 {
                controller.send_json(&json!({"type": "command", "body": "close"}));
            }
            Ok(())
        }));
        let exit = core.run_loops();
        assert!(exit.is_clean());
        // The fourth read happens at 0.75s; close is seen on the next control tick.
        assert!(clock.now() - START < 1.0);
    }
}
