pub mod alarm;
pub mod blind;
pub mod climate;
pub mod config;
pub mod device;
pub mod telemetry;
pub mod topics;
pub mod types;
pub mod ui;

pub use alarm::{Alarm, AlarmBank, ALARM_SLOTS};
pub use blind::{compute_angle, normalize_light, BlindEngine};
pub use config::{BlindConfig, ClimateConfig, ControlConfig, NetworkConfig, RuntimeConfig};
pub use device::{Board, Device};
pub use telemetry::{parse_update, TelemetryError, TelemetryLink, TelemetryUpdate};
pub use topics::*;
pub use types::{ButtonId, ClimateReading, ClimateWarning, ClockTime};
