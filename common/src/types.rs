/// The four logical front-panel buttons. All are wired active-low and
/// debounced by the board implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonId {
    Up,
    Down,
    Ok,
    Cancel,
}

impl ButtonId {
    pub const ALL: [Self; 4] = [Self::Up, Self::Down, Self::Ok, Self::Cancel];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Ok => "OK",
            Self::Cancel => "CANCEL",
        }
    }
}

/// Wall-clock time as reported by the time source, already biased by the
/// configured timezone offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl ClockTime {
    pub fn hhmmss(&self) -> String {
        format!("{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

/// One combined temperature/humidity sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    pub temperature_c: f32,
    pub humidity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClimateWarning {
    TemperatureHigh,
    TemperatureLow,
    HumidityHigh,
    HumidityLow,
}

impl ClimateWarning {
    pub fn message(self) -> &'static str {
        match self {
            Self::TemperatureHigh => "Temperature HIGH",
            Self::TemperatureLow => "Temperature LOW",
            Self::HumidityHigh => "Humidity HIGH",
            Self::HumidityLow => "Humidity LOW",
        }
    }
}
