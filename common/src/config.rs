use serde::{Deserialize, Serialize};

/// Timing knobs for the single-threaded control loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    pub cycle_interval_ms: u64,
    pub debounce_ms: u64,
    pub warn_pulse_ms: u64,
    pub reconnect_backoff_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            cycle_interval_ms: 200,
            debounce_ms: 50,
            warn_pulse_ms: 200,
            reconnect_backoff_ms: 2_000,
        }
    }
}

/// Start-up values for the remotely tunable blind parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlindConfig {
    pub offset_angle: i32,
    pub control_factor: f32,
}

impl Default for BlindConfig {
    fn default() -> Self {
        Self {
            offset_angle: 30,
            control_factor: 0.75,
        }
    }
}

/// Healthy ambient ranges. A warning fires strictly above the high bound or
/// strictly below the low bound; the bounds themselves are healthy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClimateConfig {
    pub temp_low_c: f32,
    pub temp_high_c: f32,
    pub humidity_low: f32,
    pub humidity_high: f32,
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            temp_low_c: 26.0,
            temp_high_c: 32.0,
            humidity_low: 60.0,
            humidity_high: 80.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub control: ControlConfig,
    pub blind: BlindConfig,
    pub climate: ClimateConfig,
    /// Seconds added to the time-source query. Edited on-device; the raw
    /// device clock itself is never adjusted.
    pub timezone_offset_secs: i32,
    pub network: NetworkConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            control: ControlConfig::default(),
            blind: BlindConfig::default(),
            climate: ClimateConfig::default(),
            timezone_offset_secs: 0,
            network: NetworkConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.blind.offset_angle = self.blind.offset_angle.clamp(0, 180);
        if !self.blind.control_factor.is_finite() {
            self.blind.control_factor = BlindConfig::default().control_factor;
        }
        self.blind.control_factor = self.blind.control_factor.clamp(0.0, 1.0);
        self.timezone_offset_secs = self
            .timezone_offset_secs
            .clamp(-12 * 3600, 14 * 3600 + 59 * 60);
    }
}
