//! Synthetic test sensor.
//!
//! Generates `[counter, random int, random float, sys_time]` records at a
//! configured rate and reports them to a controller. Useful for exercising a
//! controller without hardware attached.
//!
//! # Usage
//!
//! ```sh
//! fieldlink-test-sensor test1 '{"output_rate": 2}' tcp://127.0.0.1:5000
//! ```
//!
//! # Special commands
//!
//! - `crash`: fail the command hook, ending the run in the `error` state.
//! - `time_test`: reply with the current reference and system time.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use serde_json::Value;

use fieldlink::control::SensorState;
use fieldlink::net::{Endpoint, TcpChannel};
use fieldlink::runtime::{Driver, DriverConfig, HookResult, LoopExit, Sensor, SensorContext};

/// Settings passed as the second positional argument.
#[derive(Debug, Deserialize)]
struct Settings {
    /// Records per second.
    output_rate: f64,
}

struct TestSensor {
    counter: u64,
    closed: bool,
}

impl Sensor for TestSensor {
    fn setup(&mut self, _ctx: &mut SensorContext<'_>) -> HookResult {
        self.closed = false;
        Ok(())
    }

    fn close(&mut self, _ctx: &mut SensorContext<'_>) -> HookResult {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn read_data(&mut self, ctx: &mut SensorContext<'_>) -> HookResult<SensorState> {
        let mut rng = rand::thread_rng();
        let record = vec![
            Value::from(self.counter.to_string()),
            Value::from(rng.gen_range(0..=100_i64)),
            Value::from(rng.gen::<f64>()),
            Value::from(ctx.sys_time()),
        ];
        ctx.handle_data(record)?;
        self.counter += 1;
        Ok(SensorState::Normal)
    }

    fn handle_special_command(
        &mut self,
        ctx: &mut SensorContext<'_>,
        command: &str,
    ) -> HookResult {
        match command {
            "crash" => Err("intentional crash for testing".into()),
            "time_test" => {
                let text = format!("utc_time={:.6} sys_time={:.6}", ctx.utc_time(), ctx.sys_time());
                ctx.send_text(text)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Parsed command line.
struct Args {
    config: DriverConfig,
}

#[derive(Debug, thiserror::Error)]
enum ArgsError {
    #[error("missing argument: {0}")]
    Missing(&'static str),
    #[error("unknown argument: {0}")]
    Unknown(String),
    #[error("invalid settings: {0}")]
    Settings(#[from] serde_json::Error),
    #[error("output_rate must be positive, got {0}")]
    OutputRate(f64),
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] fieldlink::net::EndpointError),
    #[error("invalid heartbeat period: {0}")]
    Heartbeat(String),
}

fn main() {
    fieldlink::init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let Args { config } = match parse_args(&args) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("fieldlink-test-sensor: {e}");
            print_usage();
            std::process::exit(2);
        }
    };

    eprintln!(
        "fieldlink-test-sensor: starting {} against {}",
        config.sensor_id, config.controller_endpoint
    );
    let channel = TcpChannel::new(config.controller_endpoint);
    let sensor = TestSensor {
        counter: 0,
        closed: true,
    };
    let report = Driver::new(config, sensor, channel).run();

    eprintln!(
        "fieldlink-test-sensor: stopped in state {} after {} data message(s)",
        report.final_status.state, report.data_messages_sent
    );
    match report.exit {
        LoopExit::CloseRequested => {}
        LoopExit::ControllerLinkTimeout { .. } | LoopExit::Failed(_) => std::process::exit(1),
    }
}

/// Parses `<sensor_id> <settings-json> <endpoint>` plus optional flags.
fn parse_args(args: &[String]) -> Result<Args, ArgsError> {
    let mut positional: Vec<&str> = Vec::new();
    let mut heartbeat: Option<Duration> = None;
    let mut wait_for_time = true;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--heartbeat" => {
                i += 1;
                let value = args.get(i).ok_or(ArgsError::Missing("--heartbeat <SECS>"))?;
                let secs: f64 = value
                    .parse()
                    .map_err(|_| ArgsError::Heartbeat(value.clone()))?;
                heartbeat = Some(
                    Duration::try_from_secs_f64(secs)
                        .map_err(|_| ArgsError::Heartbeat(value.clone()))?,
                );
            }
            "--no-wait-for-time" => wait_for_time = false,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            arg if arg.starts_with("--") => return Err(ArgsError::Unknown(arg.to_owned())),
            arg => positional.push(arg),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let sensor_id = positional.next().ok_or(ArgsError::Missing("<sensor_id>"))?;
    let settings = positional.next().ok_or(ArgsError::Missing("<settings>"))?;
    let endpoint = positional.next().ok_or(ArgsError::Missing("<endpoint>"))?;
    if let Some(extra) = positional.next() {
        return Err(ArgsError::Unknown(extra.to_owned()));
    }

    let settings: Settings = serde_json::from_str(settings)?;
    let rate = settings.output_rate;
    if rate <= 0.0 || !rate.is_finite() {
        return Err(ArgsError::OutputRate(rate));
    }
    let read_period =
        Duration::try_from_secs_f64(1.0 / rate).map_err(|_| ArgsError::OutputRate(rate))?;
    let endpoint: Endpoint = endpoint.parse()?;

    let mut config = DriverConfig::new(sensor_id, endpoint)
        .with_desired_read_period(read_period)
        .with_max_closing_time(Duration::from_secs(2))
        .with_wait_for_valid_time(wait_for_time);
    if let Some(period) = heartbeat {
        config = config.with_heartbeat_period(period);
    }
    Ok(Args { config })
}

fn print_usage() {
    eprintln!(
        r#"fieldlink-test-sensor - synthetic sensor driver

USAGE:
    fieldlink-test-sensor [OPTIONS] <SENSOR_ID> <SETTINGS> <ENDPOINT>

ARGS:
    <SENSOR_ID>     Identity assigned by the controller
    <SETTINGS>      JSON object, e.g. '{{"output_rate": 2}}'
    <ENDPOINT>      Controller address (tcp://host:port or host:port)

OPTIONS:
    --heartbeat <SECS>      Heartbeat period (default: 0.5, minimum 0.1)
    --no-wait-for-time      Produce data before the first time reference
    -h, --help              Print this help message
"#
    );
}
