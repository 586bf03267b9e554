//! Scripted sensor and loopback harness shared by the runtime unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::clock::{Clock, ManualClock};
use crate::control::channel::{ControllerEnd, LoopbackChannel};
use crate::control::types::SensorState;
use crate::net::Endpoint;
use crate::runtime::config::DriverConfig;
use crate::runtime::sensor::{HookResult, Sensor, SensorContext};
use crate::runtime::state::DriverCore;

pub(crate) const START: f64 = 1_000.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Setup,
    Close,
    RequestData,
    ReadData,
    Pause,
    Resume,
    Special(String),
}

type ReadScript = Box<dyn FnMut(usize, &mut SensorContext<'_>) -> HookResult>;

/// Sensor whose read outcomes and failures are scripted up front.
///
/// Reads past the end of `reads` report `normal`.
#[derive(Default)]
pub(crate) struct ScriptedSensor {
    pub calls: Rc<RefCell<Vec<Call>>>,
    pub reads: VecDeque<SensorState>,
    pub fail_setup: bool,
    pub fail_read_at: Option<usize>,
    pub fail_special: bool,
    /// Seconds the close hook spends on the clock.
    pub close_delay: f64,
    pub on_read: Option<ReadScript>,
    pub read_count: usize,
}

impl ScriptedSensor {
    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl Sensor for ScriptedSensor {
    fn setup(&mut self, _ctx: &mut SensorContext<'_>) -> HookResult {
        self.record(Call::Setup);
        if self.fail_setup {
            return Err("device not found".into());
        }
        Ok(())
    }

    fn close(&mut self, ctx: &mut SensorContext<'_>) -> HookResult {
        self.record(Call::Close);
        ctx.clock.sleep(self.close_delay);
        Ok(())
    }

    fn request_data(&mut self, _ctx: &mut SensorContext<'_>) -> HookResult {
        self.record(Call::RequestData);
        Ok(())
    }

    fn read_data(&mut self, ctx: &mut SensorContext<'_>) -> HookResult<SensorState> {
        self.read_count += 1;
        self.record(Call::ReadData);
        if self.fail_read_at == Some(self.read_count) {
            return Err("read failed".into());
        }
        if let Some(script) = self.on_read.as_mut() {
            script(self.read_count, ctx)?;
        }
        Ok(self.reads.pop_front().unwrap_or(SensorState::Normal))
    }

    fn pause(&mut self, _ctx: &mut SensorContext<'_>) -> HookResult {
        self.record(Call::Pause);
        Ok(())
    }

    fn resume(&mut self, _ctx: &mut SensorContext<'_>) -> HookResult {
        self.record(Call::Resume);
        Ok(())
    }

    fn handle_special_command(
        &mut self,
        _ctx: &mut SensorContext<'_>,
        command: &str,
    ) -> HookResult {
        self.record(Call::Special(command.to_owned()));
        if self.fail_special {
            return Err(format!("cannot {command}").into());
        }
        Ok(())
    }
}

pub(crate) type TestCore = DriverCore<ScriptedSensor, LoopbackChannel, ManualClock>;

pub(crate) fn config() -> DriverConfig {
    DriverConfig::new("test-sensor", Endpoint::localhost(1))
}

/// A core with its link open, built on a manual clock reading [`START`].
pub(crate) fn harness_with(
    config: &DriverConfig,
    sensor: ScriptedSensor,
) -> (TestCore, ControllerEnd, ManualClock) {
    let (channel, controller) = LoopbackChannel::pair();
    let clock = ManualClock::new(START);
    let mut core = DriverCore::new(config, sensor, channel, clock.clone());
    core.link.open().unwrap();
    core.link_monitor.on_connected(clock.now());
    (core, controller, clock)
}

pub(crate) fn harness(sensor: ScriptedSensor) -> (TestCore, ControllerEnd, ManualClock) {
    harness_with(&config(), sensor)
}
