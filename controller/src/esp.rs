use std::{
    sync::{mpsc, Arc, Mutex},
    thread,
    time::{Duration, Instant, SystemTime},
};

use anyhow::{anyhow, Context};
use chrono::{DateTime, Timelike, Utc};
use dht_sensor::dht11;
use embedded_graphics::{
    mono_font::{
        ascii::{FONT_10X20, FONT_6X10},
        MonoTextStyle,
    },
    pixelcolor::BinaryColor,
    prelude::*,
    text::Text,
};
use embedded_svc::{
    mqtt::client::QoS,
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
        ADC1,
    },
    delay::{Ets, FreeRtos},
    gpio::{
        AnyIOPin, AnyInputPin, AnyOutputPin, Gpio34, IOPin, Input, InputOutput, InputPin, Output,
        OutputPin, PinDriver, Pins, Pull,
    },
    i2c::{I2cConfig, I2cDriver, I2C0},
    ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver, Resolution, LEDC},
    peripherals::Peripherals,
    units::FromValueType,
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    log::EspLogger,
    mqtt::client::{EspMqttClient, EspMqttConnection, MqttClientConfiguration},
    nvs::EspDefaultNvsPartition,
    sntp::EspSntp,
    wifi::{BlockingWifi, EspWifi},
};
use log::{error, info, warn};
use ssd1306::{mode::BufferedGraphicsMode, prelude::*, I2CDisplayInterface, Ssd1306};

use sunblind_common::{
    config::NetworkConfig, parse_update, Board, ButtonId, ClimateReading, ClockTime, Device,
    RuntimeConfig, TelemetryLink, TelemetryUpdate, TOPIC_CMD_FACTOR, TOPIC_CMD_OFFSET,
    TOPIC_STATUS,
};

// GPIO map (ESP32 devkit):
//
//   Button UP      → GPIO32
//   Button DOWN    → GPIO33
//   Button OK      → GPIO26
//   Button CANCEL  → GPIO27
//   I²C SDA/SCL    → GPIO21 / GPIO22 (SSD1306)
//   Alert LED      → GPIO2
//   Warn LED       → GPIO15
//   Buzzer         → GPIO25
//   Servo          → GPIO13 (LEDC channel 0)
//   LDR divider    → GPIO34 (ADC1 CH6)
//   DHT11 data     → GPIO16

const WATCHDOG_TIMEOUT_SEC: u32 = 90;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;
const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

const SERVO_PERIOD_US: u32 = 20_000;
const SERVO_MIN_PULSE_US: u32 = 500;
const SERVO_MAX_PULSE_US: u32 = 2_500;

const INPUT_SCAN_DELAY_MS: u32 = 10;

type Display = Ssd1306<
    I2CInterface<I2cDriver<'static>>,
    DisplaySize128x64,
    BufferedGraphicsMode<DisplaySize128x64>,
>;

type LightAdc = AdcChannelDriver<'static, Gpio34, AdcDriver<'static, ADC1>>;

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let mut runtime = RuntimeConfig::default();
    ensure_wifi_defaults(&mut runtime);
    runtime.sanitize();

    let Peripherals {
        modem,
        pins,
        i2c0,
        ledc,
        adc1,
        ..
    } = Peripherals::take()?;

    let wifi = connect_wifi(modem, sys_loop.clone(), nvs_partition, &runtime.network)?;
    disable_wifi_power_save();

    let _sntp = EspSntp::new_default().context("failed to start SNTP")?;
    info!("SNTP initialized");

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;
    add_current_task_to_watchdog()?;

    let mut board =
        match EspBoard::new(pins, i2c0, ledc, adc1, runtime.control.debounce_ms) {
            Ok(board) => board,
            Err(err) => {
                // Without the panel there is nothing useful left to run.
                error!("peripheral init failed: {err:#}");
                loop {
                    feed_watchdog();
                    thread::sleep(Duration::from_secs(10));
                }
            }
        };

    let (mqtt, conn) = create_mqtt_client(&runtime.network)?;
    let mqtt = Arc::new(Mutex::new(mqtt));
    subscribe_topics(&mqtt)?;

    let (inbound_tx, inbound_rx) = mpsc::channel::<TelemetryUpdate>();
    spawn_mqtt_receiver(
        conn,
        mqtt.clone(),
        inbound_tx,
        runtime.control.reconnect_backoff_ms,
    );

    {
        let mut client = mqtt.lock().unwrap();
        if let Err(err) = client.publish(TOPIC_STATUS, QoS::AtLeastOnce, true, b"online") {
            warn!("failed to publish online status: {err:?}");
        }
    }

    let mut link = EspLink {
        mqtt,
        inbound: inbound_rx,
    };

    let cycle_interval_ms = runtime.control.cycle_interval_ms;
    let mut device = Device::new(runtime);

    info!("sunblind controller started (esp32 build)");

    // Keep services alive for the program lifetime.
    let _wifi = wifi;

    loop {
        feed_watchdog();
        device.run_cycle(&mut board, &mut link);
        FreeRtos::delay_ms(cycle_interval_ms as u32);
    }
}

struct EspBoard {
    btn_up: PinDriver<'static, AnyInputPin, Input>,
    btn_down: PinDriver<'static, AnyInputPin, Input>,
    btn_ok: PinDriver<'static, AnyInputPin, Input>,
    btn_cancel: PinDriver<'static, AnyInputPin, Input>,
    display: Display,
    alert_led: PinDriver<'static, AnyOutputPin, Output>,
    warn_led: PinDriver<'static, AnyOutputPin, Output>,
    buzzer: PinDriver<'static, AnyOutputPin, Output>,
    servo: LedcDriver<'static>,
    light: LightAdc,
    dht_pin: PinDriver<'static, AnyIOPin, InputOutput>,
    delay: Ets,
    debounce_ms: u64,
}

impl EspBoard {
    fn new(
        pins: Pins,
        i2c0: I2C0,
        ledc: LEDC,
        adc1: ADC1,
        debounce_ms: u64,
    ) -> anyhow::Result<Self> {
        let mut btn_up = PinDriver::input(pins.gpio32.downgrade_input())?;
        let mut btn_down = PinDriver::input(pins.gpio33.downgrade_input())?;
        let mut btn_ok = PinDriver::input(pins.gpio26.downgrade_input())?;
        let mut btn_cancel = PinDriver::input(pins.gpio27.downgrade_input())?;
        for button in [&mut btn_up, &mut btn_down, &mut btn_ok, &mut btn_cancel] {
            button.set_pull(Pull::Up)?;
        }

        let i2c = I2cDriver::new(
            i2c0,
            pins.gpio21,
            pins.gpio22,
            &I2cConfig::new().baudrate(400.kHz().into()),
        )?;
        let interface = I2CDisplayInterface::new(i2c);
        let mut display = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        display
            .init()
            .map_err(|err| anyhow!("display init failed: {err:?}"))?;

        let alert_led = PinDriver::output(pins.gpio2.downgrade_output())?;
        let warn_led = PinDriver::output(pins.gpio15.downgrade_output())?;
        let buzzer = PinDriver::output(pins.gpio25.downgrade_output())?;

        let timer = LedcTimerDriver::new(
            ledc.timer0,
            &TimerConfig::default()
                .frequency(50.Hz().into())
                .resolution(Resolution::Bits14),
        )?;
        let servo = LedcDriver::new(ledc.channel0, timer, pins.gpio13)?;

        let adc = AdcDriver::new(adc1)?;
        let adc_config = AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        };
        let light = AdcChannelDriver::new(adc, pins.gpio34, &adc_config)?;

        let mut dht_pin = PinDriver::input_output_od(pins.gpio16.downgrade())?;
        dht_pin.set_pull(Pull::Up)?;
        dht_pin.set_high()?;

        Ok(Self {
            btn_up,
            btn_down,
            btn_ok,
            btn_cancel,
            display,
            alert_led,
            warn_led,
            buzzer,
            servo,
            light,
            dht_pin,
            delay: Ets,
            debounce_ms,
        })
    }

    fn button(&self, button: ButtonId) -> &PinDriver<'static, AnyInputPin, Input> {
        match button {
            ButtonId::Up => &self.btn_up,
            ButtonId::Down => &self.btn_down,
            ButtonId::Ok => &self.btn_ok,
            ButtonId::Cancel => &self.btn_cancel,
        }
    }

    fn flush_display(&mut self) {
        if let Err(err) = self.display.flush() {
            warn!("display flush failed: {err:?}");
        }
    }
}

impl Board for EspBoard {
    fn wait_for_press(&mut self, timeout: Option<Duration>) -> Option<ButtonId> {
        let started = Instant::now();
        loop {
            for button in ButtonId::ALL {
                if self.button(button).is_low() {
                    FreeRtos::delay_ms(self.debounce_ms as u32);
                    return Some(button);
                }
            }
            if let Some(timeout) = timeout {
                if started.elapsed() >= timeout {
                    return None;
                }
            }
            FreeRtos::delay_ms(INPUT_SCAN_DELAY_MS);
        }
    }

    fn is_pressed(&mut self, button: ButtonId) -> bool {
        self.button(button).is_low()
    }

    fn render(&mut self, text: &str, x: i32, y: i32, size: u8, clear_first: bool) {
        if clear_first {
            self.display.clear_buffer();
        }
        let font = if size >= 2 { &FONT_10X20 } else { &FONT_6X10 };
        let style = MonoTextStyle::new(font, BinaryColor::On);
        if let Err(err) = Text::new(text, Point::new(x, y), style).draw(&mut self.display) {
            warn!("display draw failed: {err:?}");
        }
        self.flush_display();
    }

    fn clear_display(&mut self) {
        self.display.clear_buffer();
        self.flush_display();
    }

    fn set_alert_led(&mut self, on: bool) {
        let result = if on {
            self.alert_led.set_high()
        } else {
            self.alert_led.set_low()
        };
        if let Err(err) = result {
            warn!("alert led write failed: {err:?}");
        }
    }

    fn set_warn_led(&mut self, on: bool) {
        let result = if on {
            self.warn_led.set_high()
        } else {
            self.warn_led.set_low()
        };
        if let Err(err) = result {
            warn!("warn led write failed: {err:?}");
        }
    }

    fn play_note(&mut self, freq_hz: u16, duration_ms: u64) {
        if freq_hz == 0 {
            FreeRtos::delay_ms(duration_ms as u32);
            return;
        }
        let half_period_us = 500_000 / u32::from(freq_hz);
        let cycles = u64::from(freq_hz) * duration_ms / 1000;
        for _ in 0..cycles {
            let _ = self.buzzer.set_high();
            Ets::delay_us(half_period_us);
            let _ = self.buzzer.set_low();
            Ets::delay_us(half_period_us);
        }
    }

    fn set_blind_angle(&mut self, angle: i32) {
        // The servo accepts [0, 180]; anything outside saturates here.
        let angle = angle.clamp(0, 180) as u32;
        let pulse_us =
            SERVO_MIN_PULSE_US + angle * (SERVO_MAX_PULSE_US - SERVO_MIN_PULSE_US) / 180;
        let duty = pulse_us * self.servo.get_max_duty() / SERVO_PERIOD_US;
        if let Err(err) = self.servo.set_duty(duty) {
            warn!("servo duty write failed: {err:?}");
        }
    }

    fn read_light_raw(&mut self) -> u16 {
        match self.light.read() {
            Ok(raw) => raw,
            Err(err) => {
                warn!("light ADC read failed: {err:?}");
                0
            }
        }
    }

    fn read_climate(&mut self) -> Option<ClimateReading> {
        if let Err(err) = self.dht_pin.set_high() {
            warn!("failed to set DHT11 line high before read: {err:?}");
            return None;
        }

        match dht11::blocking::read(&mut self.delay, &mut self.dht_pin) {
            Ok(reading) => Some(ClimateReading {
                temperature_c: f32::from(reading.temperature),
                humidity: f32::from(reading.relative_humidity),
            }),
            Err(err) => {
                warn!("failed to read DHT11: {err:?}");
                None
            }
        }
    }

    fn now(&mut self, offset_seconds: i32) -> ClockTime {
        let now: DateTime<Utc> = SystemTime::now().into();
        let now = now + chrono::Duration::seconds(i64::from(offset_seconds));
        ClockTime {
            hour: now.hour() as u8,
            minute: now.minute() as u8,
            second: now.second() as u8,
        }
    }

    fn sleep_ms(&mut self, ms: u64) {
        FreeRtos::delay_ms(ms as u32);
    }
}

struct EspLink {
    mqtt: Arc<Mutex<EspMqttClient<'static>>>,
    inbound: mpsc::Receiver<TelemetryUpdate>,
}

impl TelemetryLink for EspLink {
    fn publish(&mut self, topic: &str, payload: &str) {
        let mut mqtt = self.mqtt.lock().unwrap();
        if let Err(err) = mqtt.publish(topic, QoS::AtLeastOnce, true, payload.as_bytes()) {
            warn!("publish on {topic} failed: {err:?}");
        }
    }

    fn drain(&mut self) -> Vec<TelemetryUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = self.inbound.try_recv() {
            updates.push(update);
        }
        updates
    }
}

fn ensure_wifi_defaults(runtime: &mut RuntimeConfig) {
    if runtime.network.wifi_ssid.is_empty() {
        if let Some(ssid) = option_env!("WIFI_SSID") {
            runtime.network.wifi_ssid = ssid.to_string();
        }
    }

    if runtime.network.wifi_pass.is_empty() {
        if let Some(pass) = option_env!("WIFI_PASS") {
            runtime.network.wifi_pass = pass.to_string();
        }
    }

    if let Some(host) = option_env!("MQTT_HOST") {
        runtime.network.mqtt_host = host.to_string();
    }
}

/// Bring the station link up, retrying forever with a fixed backoff.
/// Connectivity failures are never fatal; the device is useless without the
/// time source and broker anyway, so blocking here is acceptable.
fn connect_wifi(
    modem: esp_idf_hal::modem::Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    let mut attempt = 0_u32;
    loop {
        attempt = attempt.saturating_add(1);
        if let Err(err) = wifi.connect() {
            warn!("wifi connect failed on attempt {attempt}: {err:#}");
            let _ = wifi.disconnect();
            thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
            continue;
        }
        match wifi.wait_netif_up() {
            Ok(()) => {
                info!("wifi connected and netif up on attempt {attempt}");
                break;
            }
            Err(err) => {
                warn!("wifi netif up failed on attempt {attempt}: {err:#}");
                let _ = wifi.disconnect();
                thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
            }
        }
    }

    drop(wifi);
    Ok(esp_wifi)
}

fn create_mqtt_client(
    network: &NetworkConfig,
) -> anyhow::Result<(EspMqttClient<'static>, EspMqttConnection)> {
    let url = format!("mqtt://{}:{}", network.mqtt_host, network.mqtt_port);

    let conf = MqttClientConfiguration {
        client_id: Some("sunblind-controller"),
        username: if network.mqtt_user.is_empty() {
            None
        } else {
            Some(network.mqtt_user.as_str())
        },
        password: if network.mqtt_pass.is_empty() {
            None
        } else {
            Some(network.mqtt_pass.as_str())
        },
        ..Default::default()
    };

    Ok(EspMqttClient::new(&url, &conf)?)
}

fn subscribe_topics(mqtt: &Arc<Mutex<EspMqttClient<'static>>>) -> anyhow::Result<()> {
    let mut mqtt = mqtt.lock().unwrap();
    for topic in [TOPIC_CMD_OFFSET, TOPIC_CMD_FACTOR] {
        mqtt.subscribe(topic, QoS::AtMostOnce)?;
    }
    Ok(())
}

fn spawn_mqtt_receiver(
    mut conn: EspMqttConnection,
    mqtt: Arc<Mutex<EspMqttClient<'static>>>,
    inbound: mpsc::Sender<TelemetryUpdate>,
    backoff_ms: u64,
) {
    use embedded_svc::mqtt::client::{Details, EventPayload};

    thread::Builder::new()
        .name("mqtt-rx".into())
        .stack_size(12 * 1024)
        .spawn(move || loop {
            match conn.next() {
                Ok(event) => {
                    if let EventPayload::Received {
                        topic: Some(topic),
                        data,
                        details,
                        ..
                    } = event.payload()
                    {
                        // We only process full MQTT payloads.
                        if !matches!(details, Details::Complete) {
                            continue;
                        }

                        if data.len() > MAX_MQTT_PAYLOAD_BYTES {
                            warn!(
                                "dropping oversized MQTT payload on topic {} ({} bytes)",
                                topic,
                                data.len()
                            );
                            continue;
                        }

                        if let Ok(message) = core::str::from_utf8(data) {
                            match parse_update(topic, message) {
                                Ok(update) => {
                                    let _ = inbound.send(update);
                                }
                                Err(err) => warn!("ignoring telemetry message: {err}"),
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!("mqtt receive loop error: {err:?}");
                    thread::sleep(Duration::from_millis(backoff_ms));
                    if let Err(sub_err) = subscribe_topics(&mqtt) {
                        warn!("mqtt re-subscribe failed: {sub_err:#}");
                    }
                }
            }
        })
        .expect("failed to spawn mqtt receiver thread");
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_svc::sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_init(&config) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { esp_idf_svc::sys::esp_task_wdt_reset() };
}

fn disable_wifi_power_save() {
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_set_ps(0) };
    if rc == esp_idf_svc::sys::ESP_OK {
        info!("wifi power save disabled");
    } else {
        warn!("failed to disable wifi power save: esp_err_t={rc}");
    }
}
