use thiserror::Error;

use crate::topics::{TOPIC_CMD_FACTOR, TOPIC_CMD_OFFSET};

/// Declared range for the remotely tunable base offset, degrees.
pub const OFFSET_ANGLE_MIN: i32 = 0;
pub const OFFSET_ANGLE_MAX: i32 = 180;

/// Declared range for the remotely tunable control factor.
pub const CONTROL_FACTOR_MIN: f32 = 0.0;
pub const CONTROL_FACTOR_MAX: f32 = 1.0;

/// A validated inbound parameter update, ready to apply to the blind engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TelemetryUpdate {
    OffsetAngle(i32),
    ControlFactor(f32),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("no handler for topic `{0}`")]
    UnknownTopic(String),
    #[error("malformed numeric payload `{payload}` on `{topic}`")]
    MalformedPayload { topic: &'static str, payload: String },
}

/// Parse an inbound command payload into a typed update.
///
/// Remote values are clamped to their declared ranges; a payload that does
/// not parse as a finite number is rejected so the previous parameter value
/// stays in effect.
pub fn parse_update(topic: &str, payload: &str) -> Result<TelemetryUpdate, TelemetryError> {
    match topic {
        TOPIC_CMD_OFFSET => payload
            .trim()
            .parse::<i32>()
            .map(|angle| TelemetryUpdate::OffsetAngle(angle.clamp(OFFSET_ANGLE_MIN, OFFSET_ANGLE_MAX)))
            .map_err(|_| TelemetryError::MalformedPayload {
                topic: TOPIC_CMD_OFFSET,
                payload: payload.to_string(),
            }),
        TOPIC_CMD_FACTOR => payload
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|factor| factor.is_finite())
            .map(|factor| {
                TelemetryUpdate::ControlFactor(factor.clamp(CONTROL_FACTOR_MIN, CONTROL_FACTOR_MAX))
            })
            .ok_or_else(|| TelemetryError::MalformedPayload {
                topic: TOPIC_CMD_FACTOR,
                payload: payload.to_string(),
            }),
        other => Err(TelemetryError::UnknownTopic(other.to_string())),
    }
}

/// Publish/subscribe boundary of the device.
///
/// Implementations own connection management: reconnect with a fixed
/// multi-second backoff and re-subscribe the command topics after every
/// reconnect. `drain` returns the updates received since the previous call;
/// it is serviced exactly once per control cycle, so inbound messages are
/// serialized with the rest of the cycle.
pub trait TelemetryLink {
    fn publish(&mut self, topic: &str, payload: &str);
    fn drain(&mut self) -> Vec<TelemetryUpdate>;
}
