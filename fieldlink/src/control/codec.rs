//! JSON codec for driver-controller envelopes.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::control::types::{
    Command, Envelope, InboundMessage, OutboundMessage, SensorId, TimeReference,
};

/// Errors produced while encoding or decoding envelopes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame is not valid JSON or not an envelope object.
    #[error("invalid envelope: {0}")]
    Json(#[from] serde_json::Error),
    /// Envelope `type` is not one of the inbound types.
    #[error("unrecognized message type '{0}'")]
    UnrecognizedMessageType(String),
    /// `time` body is not exactly two numbers.
    #[error("malformed time payload: {0}")]
    MalformedTimePayload(Value),
    /// `command` body is not a string.
    #[error("malformed command payload: {0}")]
    MalformedCommand(Value),
    /// State name outside the enumerated set.
    #[error("invalid sensor state '{0}'")]
    InvalidState(String),
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    body: Value,
}

/// Serializes `message` into a JSON frame stamped with `sensor_id`.
///
/// # Errors
///
/// Returns [`ProtocolError::Json`] if a data record cannot be serialized.
pub fn encode(sensor_id: &SensorId, message: &OutboundMessage) -> Result<Vec<u8>, ProtocolError> {
    let envelope = Envelope { sensor_id, message };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Decodes an inbound JSON frame.
///
/// The `sensor_id` field is optional on inbound frames and ignored; the
/// controller addresses drivers by connection, not by envelope.
///
/// # Errors
///
/// - [`ProtocolError::Json`] if the frame is not an envelope.
/// - [`ProtocolError::UnrecognizedMessageType`] for a `type` outside the inbound set.
/// - [`ProtocolError::MalformedTimePayload`] / [`ProtocolError::MalformedCommand`]
///   for a body of the wrong shape.
pub fn decode(frame: &[u8]) -> Result<InboundMessage, ProtocolError> {
    let raw: RawEnvelope = serde_json::from_slice(frame)?;
    match raw.kind.as_str() {
        "command" => match raw.body {
            Value::String(command) => Ok(InboundMessage::Command(Command::from(command.as_str()))),
            other => Err(ProtocolError::MalformedCommand(other)),
        },
        "time" => decode_time(raw.body).map(InboundMessage::Time),
        "heartbeat" => Ok(InboundMessage::Heartbeat),
        _ => Err(ProtocolError::UnrecognizedMessageType(raw.kind)),
    }
}

fn decode_time(body: Value) -> Result<TimeReference, ProtocolError> {
    let pair = match body.as_array().map(Vec::as_slice) {
        Some([reference, source]) => reference.as_f64().zip(source.as_f64()),
        _ => None,
    };
    match pair {
        Some((reference_time, local_time_at_source)) => Ok(TimeReference {
            reference_time,
            local_time_at_source,
        }),
        None => Err(ProtocolError::MalformedTimePayload(body)),
    }
}
