//! Protocol types for driver-controller communication.
//!
//! Every frame on the wire is a JSON envelope `{"sensor_id", "type", "body"}`.
//! Inbound frames are decoded once at the channel boundary into
//! [`InboundMessage`]; outbound frames are built from [`OutboundMessage`].

use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::control::codec::ProtocolError;

/// Placeholder body carried by outbound heartbeats.
pub const HEARTBEAT_BODY: &str = " ";

/// Opaque identity assigned to a driver by its controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorId(String);

impl SensorId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SensorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SensorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Driver state. Health is derived from it, never stored alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorState {
    Closed,
    WaitingForTime,
    Normal,
    TimedOut,
    Error,
}

impl SensorState {
    /// All states, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Closed,
        Self::WaitingForTime,
        Self::Normal,
        Self::TimedOut,
        Self::Error,
    ];

    /// Coarse health classification of this state.
    #[must_use]
    pub const fn health(self) -> Health {
        match self {
            Self::Closed | Self::WaitingForTime => Health::Neutral,
            Self::Normal => Health::Good,
            Self::TimedOut | Self::Error => Health::Bad,
        }
    }

    /// Wire name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::WaitingForTime => "waiting_for_time",
            Self::Normal => "normal",
            Self::TimedOut => "timed_out",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SensorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorState {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ProtocolError::InvalidState(s.to_owned()))
    }
}

/// Health reported next to every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Neutral,
    Good,
    Bad,
}

/// The externally observable `(state, health, paused)` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverStatus {
    pub state: SensorState,
    pub paused: bool,
}

impl DriverStatus {
    #[must_use]
    pub const fn health(&self) -> Health {
        self.state.health()
    }
}

impl Serialize for DriverStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(&self.state)?;
        tuple.serialize_element(&self.health())?;
        tuple.serialize_element(&self.paused)?;
        tuple.end()
    }
}

/// A `(reference_time, local_time_at_source)` pair sent by the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeReference {
    /// Authoritative time at the controller.
    pub reference_time: f64,
    /// The controller's system time when `reference_time` was last updated.
    pub local_time_at_source: f64,
}

/// Command carried by an inbound `command` envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Close,
    Pause,
    Resume,
    /// Anything else, forwarded verbatim to the sensor.
    Special(String),
}

impl From<&str> for Command {
    fn from(command: &str) -> Self {
        match command {
            "close" => Self::Close,
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            other => Self::Special(other.to_owned()),
        }
    }
}

/// Messages sent from controller to driver.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Command(Command),
    Time(TimeReference),
    Heartbeat,
}

impl InboundMessage {
    /// Wire name of the message type.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::Time(_) => "time",
            Self::Heartbeat => "heartbeat",
        }
    }
}

/// Messages sent from driver to controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Body: `[state, health, paused]`.
    NewSensorStatus(DriverStatus),
    /// Body: placeholder string.
    NewSensorHeartbeat(String),
    /// Free-form text, shown to the operator like a print.
    NewSensorText(String),
    /// Named event the controller may act on (e.g. `closing`).
    NewSensorEvent(String),
    /// Records produced by the sensor.
    NewSensorData(Vec<Vec<Value>>),
}

impl OutboundMessage {
    #[must_use]
    pub fn heartbeat() -> Self {
        Self::NewSensorHeartbeat(HEARTBEAT_BODY.to_owned())
    }

    /// Wire name of the message type.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NewSensorStatus(_) => "new_sensor_status",
            Self::NewSensorHeartbeat(_) => "new_sensor_heartbeat",
            Self::NewSensorText(_) => "new_sensor_text",
            Self::NewSensorEvent(_) => "new_sensor_event",
            Self::NewSensorData(_) => "new_sensor_data",
        }
    }
}

/// Outbound envelope: the message plus the identity of the sending driver.
#[derive(Debug, Serialize)]
pub struct Envelope<'a> {
    pub sensor_id: &'a SensorId,
    #[serde(flatten)]
    pub message: &'a OutboundMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_mapping_is_total_and_fixed() {
        let expected = [
            (SensorState::Closed, Health::Neutral),
            (SensorState::WaitingForTime, Health::Neutral),
            (SensorState::Normal, Health::Good),
            (SensorState::TimedOut, Health::Bad),
            (SensorState::Error, Health::Bad),
        ];
        for (state, health) in expected {
            assert_eq!(state.health(), health, "{state}");
        }
        assert_eq!(SensorState::ALL.len(), expected.len());
    }

    #[test]
    fn state_parses_from_wire_name() {
        for state in SensorState::ALL {
            assert_eq!(state.as_str().parse::<SensorState>().unwrap(), state);
        }
    }

    #[test]
    fn unknown_state_name_is_invalid() {
        let err = "sleeping".parse::<SensorState>().unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidState(ref s) if s == "sleeping"));
    }

    #[test]
    fn command_classification() {
        assert_eq!(Command::from("close"), Command::Close);
        assert_eq!(Command::from("pause"), Command::Pause);
        assert_eq!(Command::from("resume"), Command::Resume);
        assert_eq!(
            Command::from("trigger"),
            Command::Special("trigger".to_owned())
        );
    }

    #[test]
    fn status_serializes_as_triple() {
        let status = DriverStatus {
            state: SensorState::TimedOut,
            paused: false,
        };
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json, serde_json::json!(["timed_out", "bad", false]));
    }

    #[test]
    fn outbound_kind_matches_serialized_tag() {
        let messages = [
            OutboundMessage::heartbeat(),
            OutboundMessage::NewSensorText("hi".into()),
            OutboundMessage::NewSensorEvent("closing".into()),
            OutboundMessage::NewSensorData(vec![vec![Value::from(1)]]),
        ];
        for msg in messages {
            let json = serde_json::to_value(&msg).unwrap();
            assert_eq!(json["type"], msg.kind());
        }
    }
}
