use crate::config::BlindConfig;
use crate::telemetry::TelemetryUpdate;

/// Full-scale raw reading of the light sensor ADC (12 bit).
pub const LIGHT_RAW_MAX: u16 = 4095;

/// Closed-loop controller for the blind position.
///
/// Keeps the two remotely tunable parameters and the last normalized light
/// sample, and recomputes the target angle whenever either changes. The
/// computed angle is passed through to the actuator unclamped; the servo
/// itself bounds what it accepts.
#[derive(Debug, Clone)]
pub struct BlindEngine {
    offset_angle: i32,
    control_factor: f32,
    last_light: Option<f32>,
}

impl BlindEngine {
    pub fn new(config: &BlindConfig) -> Self {
        Self {
            offset_angle: config.offset_angle,
            control_factor: config.control_factor,
            last_light: None,
        }
    }

    pub fn offset_angle(&self) -> i32 {
        self.offset_angle
    }

    pub fn control_factor(&self) -> f32 {
        self.control_factor
    }

    /// Last normalized light sample, 0.0 until the first reading arrives.
    pub fn light(&self) -> f32 {
        self.last_light.unwrap_or(0.0)
    }

    /// Feed one raw light reading. Returns the recomputed angle when the
    /// normalized value differs from the previous cycle, `None` otherwise.
    pub fn observe_light(&mut self, raw: u16) -> Option<i32> {
        let light = normalize_light(raw);
        if self.last_light == Some(light) {
            return None;
        }
        self.last_light = Some(light);
        Some(self.recompute())
    }

    /// Apply a validated remote parameter update and recompute.
    pub fn apply_update(&mut self, update: TelemetryUpdate) -> i32 {
        match update {
            TelemetryUpdate::OffsetAngle(angle) => self.offset_angle = angle,
            TelemetryUpdate::ControlFactor(factor) => self.control_factor = factor,
        }
        self.recompute()
    }

    pub fn recompute(&self) -> i32 {
        compute_angle(self.offset_angle, self.control_factor, self.light())
    }
}

/// Normalize a raw light reading to [0.0, 1.0].
///
/// The divider is wired so a larger raw reading means less effective light:
/// the reading is rescaled to [0, 100] inverted, then divided down.
pub fn normalize_light(raw: u16) -> f32 {
    let raw = raw.min(LIGHT_RAW_MAX);
    let inverted = f32::from(LIGHT_RAW_MAX - raw) * 100.0 / f32::from(LIGHT_RAW_MAX);
    inverted / 100.0
}

/// Target blind angle for the given parameters and light level, truncated
/// to whole degrees.
pub fn compute_angle(offset_angle: i32, control_factor: f32, light: f32) -> i32 {
    (offset_angle as f32 + (180.0 - offset_angle as f32) * light * control_factor) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn computes_reference_angle() {
        // 30 + (180 - 30) * 0.5 * 0.75 = 86.25, truncated.
        assert_eq!(compute_angle(30, 0.75, 0.5), 86);
    }

    #[test]
    fn recompute_is_pure_in_its_inputs() {
        assert_eq!(compute_angle(30, 0.75, 0.5), compute_angle(30, 0.75, 0.5));
        assert_eq!(compute_angle(0, 1.0, 1.0), 180);
        assert_eq!(compute_angle(30, 0.75, 0.0), 30);
    }

    #[test]
    fn normalization_inverts_the_raw_reading() {
        assert_eq!(normalize_light(0), 1.0);
        assert_eq!(normalize_light(LIGHT_RAW_MAX), 0.0);
        assert!(normalize_light(1000) > normalize_light(3000));
    }

    #[test]
    fn normalization_saturates_above_full_scale() {
        assert_eq!(normalize_light(u16::MAX), 0.0);
    }

    #[test]
    fn observe_light_reports_only_changes() {
        let mut engine = BlindEngine::new(&BlindConfig::default());

        assert!(engine.observe_light(2000).is_some());
        assert_eq!(engine.observe_light(2000), None);
        assert!(engine.observe_light(2001).is_some());
    }

    #[test]
    fn first_observation_always_recomputes() {
        let mut engine = BlindEngine::new(&BlindConfig::default());
        // A pitch-dark first reading still produces a command.
        assert_eq!(engine.observe_light(LIGHT_RAW_MAX), Some(30));
    }

    #[test]
    fn parameter_update_recomputes_with_current_light() {
        let mut engine = BlindEngine::new(&BlindConfig::default());
        engine.observe_light(0); // light = 1.0

        let angle = engine.apply_update(TelemetryUpdate::OffsetAngle(60));
        assert_eq!(angle, compute_angle(60, 0.75, 1.0));

        let angle = engine.apply_update(TelemetryUpdate::ControlFactor(0.5));
        assert_eq!(angle, compute_angle(60, 0.5, 1.0));
    }

    #[test]
    fn identical_update_still_yields_a_command() {
        let mut engine = BlindEngine::new(&BlindConfig::default());
        engine.observe_light(2000);

        let first = engine.apply_update(TelemetryUpdate::OffsetAngle(45));
        let second = engine.apply_update(TelemetryUpdate::OffsetAngle(45));
        assert_eq!(first, second);
    }
}
