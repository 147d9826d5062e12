use std::time::Duration;

use crate::alarm::{AlarmBank, ALARM_SLOTS};
use crate::blind::BlindEngine;
use crate::climate::{self, format_humidity, format_light, format_temperature};
use crate::config::RuntimeConfig;
use crate::telemetry::TelemetryLink;
use crate::topics::{TOPIC_BLIND_ANGLE, TOPIC_SENSOR_HUMIDITY, TOPIC_SENSOR_LIGHT, TOPIC_SENSOR_TEMP};
use crate::types::{ButtonId, ClimateReading, ClockTime};
use crate::ui;

/// Hardware boundary of the device. One implementation per build: simulated
/// peripherals on the host, real GPIO/I2C/ADC drivers on the esp32 target.
pub trait Board {
    /// Block until one of the four buttons reads pressed, debounce, and
    /// return it. `None` only when the optional timeout elapses first; the
    /// interaction flows pass `None` for the timeout and block indefinitely.
    fn wait_for_press(&mut self, timeout: Option<Duration>) -> Option<ButtonId>;

    /// Non-blocking level read of a single button.
    fn is_pressed(&mut self, button: ButtonId) -> bool;

    fn render(&mut self, text: &str, x: i32, y: i32, size: u8, clear_first: bool);
    fn clear_display(&mut self);

    fn set_alert_led(&mut self, on: bool);
    fn set_warn_led(&mut self, on: bool);
    fn play_note(&mut self, freq_hz: u16, duration_ms: u64);

    fn set_blind_angle(&mut self, angle: i32);

    fn read_light_raw(&mut self) -> u16;
    fn read_climate(&mut self) -> Option<ClimateReading>;

    /// Wall-clock time biased by the given offset. The offset shifts the
    /// query only; the underlying device clock is untouched.
    fn now(&mut self, offset_seconds: i32) -> ClockTime;

    fn sleep_ms(&mut self, ms: u64);
}

const CLOCK_POS: (i32, i32) = (0, 8);
const WARNING_POS_X: i32 = 0;
const WARNING_POS_Y: i32 = 44;
const WARNING_LINE_STEP: i32 = 12;

/// Top-level application state: alarm bank, timezone offset, menu cursor,
/// blind engine. Owned here so nothing depends on static initialization
/// order; `run_cycle` is the single thread of control.
pub struct Device {
    config: RuntimeConfig,
    alarms: AlarmBank,
    timezone_offset_secs: i32,
    cursor: usize,
    blind: BlindEngine,
}

impl Device {
    pub fn new(config: RuntimeConfig) -> Self {
        let blind = BlindEngine::new(&config.blind);
        Self {
            alarms: AlarmBank::default(),
            timezone_offset_secs: config.timezone_offset_secs,
            cursor: 0,
            blind,
            config,
        }
    }

    pub fn alarms(&self) -> &AlarmBank {
        &self.alarms
    }

    pub fn timezone_offset_secs(&self) -> i32 {
        self.timezone_offset_secs
    }

    /// One pass of the control loop, in the fixed order: menu entry,
    /// telemetry inbox, light, time + alarms, climate. Modal interaction
    /// (menu, ringing) runs to completion inside the cycle; nothing else
    /// progresses meanwhile.
    pub fn run_cycle<B: Board, T: TelemetryLink>(&mut self, board: &mut B, link: &mut T) {
        if board.is_pressed(ButtonId::Ok) {
            ui::run_menu(
                board,
                &mut self.cursor,
                &mut self.alarms,
                &mut self.timezone_offset_secs,
            );
        }

        for update in link.drain() {
            let angle = self.blind.apply_update(update);
            self.command_blind(board, link, angle);
        }

        let raw = board.read_light_raw();
        if let Some(angle) = self.blind.observe_light(raw) {
            self.command_blind(board, link, angle);
        }

        let now = board.now(self.timezone_offset_secs);
        board.render(&now.hhmmss(), CLOCK_POS.0, CLOCK_POS.1, 2, true);

        for slot in 0..ALARM_SLOTS {
            if self.alarms.is_due(slot, now.hour, now.minute) {
                ui::ring(board);
                self.alarms.mark_fired(slot);
            }
        }

        if let Some(reading) = board.read_climate() {
            let warnings = climate::evaluate(&self.config.climate, &reading);
            for (line, warning) in warnings.iter().enumerate() {
                board.render(
                    warning.message(),
                    WARNING_POS_X,
                    WARNING_POS_Y + line as i32 * WARNING_LINE_STEP,
                    1,
                    false,
                );
            }
            if !warnings.is_empty() {
                board.set_warn_led(true);
                board.sleep_ms(self.config.control.warn_pulse_ms);
                board.set_warn_led(false);
            }

            link.publish(TOPIC_SENSOR_TEMP, &format_temperature(reading.temperature_c));
            link.publish(TOPIC_SENSOR_HUMIDITY, &format_humidity(reading.humidity));
        }
    }

    /// Command the actuator and publish the angle and the light level that
    /// produced it. Publishing is unconditional per recompute, even when the
    /// angle is numerically unchanged.
    fn command_blind<B: Board, T: TelemetryLink>(&self, board: &mut B, link: &mut T, angle: i32) {
        board.set_blind_angle(angle);
        link.publish(TOPIC_BLIND_ANGLE, &angle.to_string());
        link.publish(TOPIC_SENSOR_LIGHT, &format_light(self.blind.light()));
    }
}
