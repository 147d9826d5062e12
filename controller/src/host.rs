use std::{sync::mpsc, thread, time::Duration};

use anyhow::Context;
use chrono::{Timelike, Utc};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use sunblind_common::{
    parse_update, Board, ButtonId, ClimateReading, ClockTime, Device, RuntimeConfig,
    TelemetryLink, TelemetryUpdate, TOPIC_CMD_FACTOR, TOPIC_CMD_OFFSET, TOPIC_STATUS,
};

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut runtime = load_runtime_config();
    runtime.sanitize();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options = MqttOptions::new("sunblind-controller", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    subscribe_topics(&mqtt).await?;

    let (inbound_tx, inbound_rx) = mpsc::channel::<TelemetryUpdate>();
    let (outbound_tx, outbound_rx) = unbounded_channel::<(String, String)>();

    spawn_mqtt_loop(
        mqtt.clone(),
        eventloop,
        inbound_tx,
        runtime.control.reconnect_backoff_ms,
    );
    spawn_publisher(mqtt.clone(), outbound_rx);

    mqtt.publish(TOPIC_STATUS, QoS::AtLeastOnce, true, "online")
        .await
        .context("failed to publish online status")?;

    info!("sunblind controller started (host build)");

    let device = tokio::task::spawn_blocking(move || {
        run_device_loop(runtime, inbound_rx, outbound_tx);
    });
    device.await.context("device loop terminated")?;
    Ok(())
}

/// The single thread of control: one `run_cycle` per pacing interval.
/// Blocking here is fine; MQTT IO lives on the async side of the channels.
fn run_device_loop(
    runtime: RuntimeConfig,
    inbound: mpsc::Receiver<TelemetryUpdate>,
    outbound: UnboundedSender<(String, String)>,
) {
    let cycle_interval = Duration::from_millis(runtime.control.cycle_interval_ms);
    let mut device = Device::new(runtime);
    let mut board = SimulatedBoard::default();
    let mut link = ChannelLink { inbound, outbound };

    loop {
        device.run_cycle(&mut board, &mut link);
        thread::sleep(cycle_interval);
    }
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    for topic in [TOPIC_CMD_OFFSET, TOPIC_CMD_FACTOR] {
        mqtt.subscribe(topic, QoS::AtMostOnce).await?;
    }
    Ok(())
}

fn spawn_mqtt_loop(
    mqtt: AsyncClient,
    mut eventloop: rumqttc::EventLoop,
    inbound: mpsc::Sender<TelemetryUpdate>,
    backoff_ms: u64,
) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    let payload = String::from_utf8_lossy(&message.payload);
                    match parse_update(&message.topic, &payload) {
                        Ok(update) => {
                            if inbound.send(update).is_err() {
                                warn!("device loop gone; dropping inbound update");
                            }
                        }
                        Err(err) => warn!("ignoring telemetry message: {err}"),
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    // A fresh session after reconnect needs both command
                    // subscriptions again.
                    if let Err(err) = subscribe_topics(&mqtt).await {
                        warn!("mqtt re-subscribe failed: {err:#}");
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    });
}

fn spawn_publisher(mqtt: AsyncClient, mut outbound: UnboundedReceiver<(String, String)>) {
    tokio::spawn(async move {
        while let Some((topic, payload)) = outbound.recv().await {
            if let Err(err) = mqtt
                .publish(topic.as_str(), QoS::AtLeastOnce, true, payload.into_bytes())
                .await
            {
                warn!("publish on {topic} failed: {err}");
            }
        }
    });
}

fn load_runtime_config() -> RuntimeConfig {
    let Ok(path) = std::env::var("SUNBLIND_CONFIG") else {
        return RuntimeConfig::default();
    };
    match std::fs::read(&path) {
        Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|err| {
            warn!("invalid config at {path}: {err}; using defaults");
            RuntimeConfig::default()
        }),
        Err(err) => {
            warn!("failed to read config at {path}: {err}; using defaults");
            RuntimeConfig::default()
        }
    }
}

struct ChannelLink {
    inbound: mpsc::Receiver<TelemetryUpdate>,
    outbound: UnboundedSender<(String, String)>,
}

impl TelemetryLink for ChannelLink {
    fn publish(&mut self, topic: &str, payload: &str) {
        if self
            .outbound
            .send((topic.to_string(), payload.to_string()))
            .is_err()
        {
            warn!("publisher task gone; dropping message on {topic}");
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

/// Hardware integration point: replace the simulated readings and no-op
/// outputs with GPIO/I2C/ADC drivers on the ESP target (`esp.rs`). The host
/// build has no front panel, so no button ever reads pressed.
#[derive(Default)]
struct SimulatedBoard {
    tick: u64,
}

impl Board for SimulatedBoard {
    fn wait_for_press(&mut self, timeout: Option<Duration>) -> Option<ButtonId> {
        if let Some(timeout) = timeout {
            thread::sleep(timeout);
        }
        None
    }

    fn is_pressed(&mut self, _button: ButtonId) -> bool {
        false
    }

    fn render(&mut self, text: &str, x: i32, y: i32, size: u8, clear_first: bool) {
        debug!(x, y, size, clear_first, "display: {text}");
    }

    fn clear_display(&mut self) {
        debug!("display cleared");
    }

    fn set_alert_led(&mut self, on: bool) {
        debug!("alert led: {on}");
    }

    fn set_warn_led(&mut self, on: bool) {
        debug!("warn led: {on}");
    }

    fn play_note(&mut self, freq_hz: u16, duration_ms: u64) {
        debug!("tone {freq_hz} Hz for {duration_ms} ms");
        thread::sleep(Duration::from_millis(duration_ms));
    }

    fn set_blind_angle(&mut self, angle: i32) {
        info!("blind angle -> {angle}");
    }

    fn read_light_raw(&mut self) -> u16 {
        self.tick = self.tick.wrapping_add(1);
        (1024 + (self.tick % 32) * 64) as u16
    }

    fn read_climate(&mut self) -> Option<ClimateReading> {
        Some(ClimateReading {
            temperature_c: 27.0 + ((self.tick % 8) as f32 * 0.2),
            humidity: 62.0 + ((self.tick % 6) as f32 * 0.5),
        })
    }

    fn now(&mut self, offset_seconds: i32) -> ClockTime {
        let now = Utc::now() + chrono::Duration::seconds(i64::from(offset_seconds));
        ClockTime {
            hour: now.hour() as u8,
            minute: now.minute() as u8,
            second: now.second() as u8,
        }
    }

    fn sleep_ms(&mut self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }
}
