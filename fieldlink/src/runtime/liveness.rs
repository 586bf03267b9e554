//! Liveness judgments: is the controller still there, and did the sensor
//! really time out?

use crate::control::types::SensorState;
use crate::runtime::config::TimingPolicy;

/// Tracks controller-link liveness from message receipt timestamps.
///
/// Undefined (never fires) until the link has connected and at least one
/// message-processing pass has happened.
#[derive(Debug)]
pub struct LinkMonitor {
    client_timeout_threshold: f64,
    max_time_to_receive_message: f64,
    connection_time: Option<f64>,
    last_processing_time: Option<f64>,
    last_received_message_time: f64,
    messages_received: u64,
}

impl LinkMonitor {
    #[must_use]
    pub fn new(timing: &TimingPolicy) -> Self {
        Self {
            client_timeout_threshold: timing.client_timeout_threshold,
            max_time_to_receive_message: timing.max_time_to_receive_message,
            connection_time: None,
            last_processing_time: None,
            last_received_message_time: 0.0,
            messages_received: 0,
        }
    }

    pub fn on_connected(&mut self, now: f64) {
        self.connection_time = Some(now);
    }

    /// Counts one inbound message as liveness evidence.
    pub fn on_message(&mut self, now: f64) {
        self.messages_received += 1;
        self.last_received_message_time = now;
    }

    /// Marks the end of a drain pass over the inbound queue.
    pub fn on_processing_pass(&mut self, now: f64) {
        self.last_processing_time = Some(now);
    }

    #[must_use]
    pub const fn messages_received(&self) -> u64 {
        self.messages_received
    }

    /// How long the link has been silent as of the last processing pass, if it
    /// has been silent longer than allowed.
    #[must_use]
    pub fn timed_out(&self) -> Option<f64> {
        let (Some(connected), Some(processed)) = (self.connection_time, self.last_processing_time)
        else {
            return None;
        };
        let (silent_for, limit) = if self.messages_received == 0 {
            (processed - connected, self.max_time_to_receive_message)
        } else {
            (
                processed - self.last_received_message_time,
                self.client_timeout_threshold,
            )
        };
        (silent_for > limit).then_some(silent_for)
    }
}

/// Decides whether a `timed_out` read is genuine or the read hook merely
/// yielded back to the scheduler mid-read.
#[derive(Debug)]
pub struct ReadTimeoutJudge {
    desired_read_period: f64,
    decide_timeout: bool,
    still_waiting_for_data: bool,
}

impl ReadTimeoutJudge {
    #[must_use]
    pub fn new(desired_read_period: f64, decide_timeout: bool) -> Self {
        Self {
            desired_read_period,
            decide_timeout,
            still_waiting_for_data: false,
        }
    }

    /// True while an earlier request is still in flight; the next tick re-polls
    /// instead of issuing a new request.
    #[must_use]
    pub const fn still_waiting_for_data(&self) -> bool {
        self.still_waiting_for_data
    }

    /// Applies disambiguation to a reported state.
    ///
    /// Only `timed_out` is ever rewritten. A genuine timeout (a full read period
    /// without data, or disambiguation disabled) clears the waiting flag so the
    /// next tick issues a fresh request. A spurious one becomes `normal` and sets
    /// the flag.
    pub fn judge(&mut self, reported: SensorState, now: f64, last_data_time: f64) -> SensorState {
        if reported != SensorState::TimedOut {
            return reported;
        }
        let genuine = !self.decide_timeout || now - last_data_time >= self.desired_read_period;
        if genuine {
            self.still_waiting_for_data = false;
            SensorState::TimedOut
        } else {
            self.still_waiting_for_data = true;
            SensorState::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::Endpoint;
    use crate::runtime::config::DriverConfig;
    use std::time::Duration;

    fn monitor() -> LinkMonitor {
        let timing = DriverConfig::new("s", Endpoint::localhost(1))
            .with_heartbeat_period(Duration::from_millis(500))
            .timing();
        LinkMonitor::new(&timing)
    }

    #[test]
    fn undefined_before_connect_and_first_pass() {
        let mut m = monitor();
        assert!(m.timed_out().is_none());
        m.on_processing_pass(100.0);
        assert!(m.timed_out().is_none());

        let mut m = monitor();
        m.on_connected(0.0);
        assert!(m.timed_out().is_none());
    }

    #[test]
    fn first_message_grace_period() {
        let mut m = monitor();
        m.on_connected(0.0);
        m.on_processing_pass(7.4);
        assert!(m.timed_out().is_none());
        m.on_processing_pass(7.6);
        let silent = m.timed_out().unwrap();
        assert!((silent - 7.6).abs() < 1e-9);
    }

    #[test]
    fn regular_threshold_after_first_message() {
        let mut m = monitor();
        m.on_connected(0.0);
        m.on_message(1.0);
        m.on_processing_pass(5.9);
        assert!(m.timed_out().is_none());
        m.on_processing_pass(6.1);
        assert!(m.timed_out().is_some());

        m.on_message(6.1);
        m.on_processing_pass(6.1);
        assert!(m.timed_out().is_none());
        assert_eq!(m.messages_received(), 2);
    }

    #[test]
    fn spurious_timeout_downgrades_to_normal() {
        let mut judge = ReadTimeoutJudge::new(1.0, true);
        let state = judge.judge(SensorState::TimedOut, 0.5, 0.0);
        assert_eq!(state, SensorState::Normal);
        assert!(judge.still_waiting_for_data());
    }

    #[test]
    fn genuine_timeout_stays_timed_out() {
        let mut judge = ReadTimeoutJudge::new(1.0, true);
        let _ = judge.judge(SensorState::TimedOut, 0.5, 0.0);
        let state = judge.judge(SensorState::TimedOut, 1.2, 0.0);
        assert_eq!(state, SensorState::TimedOut);
        assert!(!judge.still_waiting_for_data());
    }

    #[test]
    fn disabled_disambiguation_trusts_every_report() {
        let mut judge = ReadTimeoutJudge::new(1.0, false);
        assert_eq!(
            judge.judge(SensorState::TimedOut, 0.5, 0.0),
            SensorState::TimedOut
        );
        assert!(!judge.still_waiting_for_data());
    }

    #[test]
    fn other_states_pass_through() {
        let mut judge = ReadTimeoutJudge::new(1.0, true);
        let _ = judge.judge(SensorState::TimedOut, 0.5, 0.0);
        assert_eq!(judge.judge(SensorState::Normal, 0.6, 0.0), SensorState::Normal);
        // An in-flight request stays in flight until a timed_out report resolves it.
        assert!(judge.still_waiting_for_data());
        assert_eq!(judge.judge(SensorState::Error, 0.7, 0.0), SensorState::Error);
    }
}
