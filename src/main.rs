// MIT License - Copyright (c) 2026 Peter Wright
// MQTT bridge

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Mutex;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

use paradox_ptr::{
    ArmMode, Binding, Command, CommandType, DeviceConfig, DeviceRegistry, Dispatcher, PanelError,
    PanelEvent, ParsedEvent, PolledValue, PtrType, RefreshTracker, Subject, Update,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "paradox2mqtt")]
#[command(about = "Bridge between a Paradox PTR1/PTR3 printer-port module and MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    devices: Vec<DeviceToml>,
    #[serde(default)]
    bindings: Vec<BindingToml>,
    mqtt: MqttToml,
}

#[derive(Debug, Deserialize)]
struct DeviceToml {
    id: String,
    /// PTR1, PTR3 or SIMULATE
    #[serde(rename = "type")]
    device_type: String,
    #[serde(default = "default_serial_port")]
    serial_port: String,
    #[serde(default = "default_refresh")]
    refresh_ms: u64,
    #[serde(default = "default_command_timeout")]
    command_timeout_ms: u64,
    #[serde(default = "default_simulator_delay")]
    simulator_delay_ms: u64,
}

fn default_serial_port() -> String {
    "/dev/ttyS0".to_string()
}
fn default_refresh() -> u64 {
    6000
}
fn default_command_timeout() -> u64 {
    50000
}
fn default_simulator_delay() -> u64 {
    5000
}

#[derive(Debug, Deserialize)]
struct BindingToml {
    item: String,
    device: String,
    /// Event key (e.g. `Zone 3`) or an expression over event keys
    variable: String,
    /// Poll command type (e.g. `RZS 3`, `PowerState`)
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    refresh_ms: Option<u64>,
    /// `KIND(function)`, e.g. `MAP(alarm.map)`
    #[serde(default)]
    transformation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MqttToml {
    url: String,
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default = "default_subscribe_topic")]
    subscribe_topic: String,
    #[serde(default = "default_publish_topic")]
    publish_topic: String,
}

fn default_client_id() -> String {
    "paradox-bridge".to_string()
}
fn default_subscribe_topic() -> String {
    "paradox/cmd".to_string()
}
fn default_publish_topic() -> String {
    "paradox".to_string()
}

fn build_device_config(toml: &DeviceToml) -> Result<DeviceConfig> {
    let ptr_type: PtrType = toml
        .device_type
        .parse()
        .with_context(|| format!("device {}", toml.id))?;
    Ok(DeviceConfig::builder()
        .id(&toml.id)
        .ptr_type(ptr_type)
        .serial_port(&toml.serial_port)
        .refresh_ms(toml.refresh_ms)
        .command_timeout_ms(toml.command_timeout_ms)
        .simulator_delay_ms(toml.simulator_delay_ms)
        .build())
}

/// Split `KIND(function)` into its parts.
fn parse_transformation(s: &str) -> Result<(String, String)> {
    let (kind, rest) = s
        .split_once('(')
        .with_context(|| format!("transformation '{s}' must look like KIND(function)"))?;
    let function = rest
        .strip_suffix(')')
        .with_context(|| format!("transformation '{s}' is missing ')'"))?;
    Ok((kind.trim().to_string(), function.trim().to_string()))
}

fn build_binding(toml: &BindingToml, devices: &[DeviceConfig]) -> Result<Binding> {
    let device = devices
        .iter()
        .find(|d| d.id == toml.device)
        .with_context(|| format!("binding {} refers to unknown device {}", toml.item, toml.device))?;

    let mut binding = Binding::new(&toml.item, &toml.device, &toml.variable);
    if let Some(command) = &toml.command {
        let command: CommandType = command
            .parse()
            .with_context(|| format!("binding {}", toml.item))?;
        if device.ptr_type.supports_commands() {
            let refresh = toml.refresh_ms.unwrap_or(device.refresh_ms);
            binding = binding.with_command(command, Duration::from_millis(refresh));
        } else {
            warn!(
                "Binding {}: {} devices cannot poll, {} is fed by events only",
                toml.item, device.ptr_type, toml.item
            );
        }
    }
    if let Some(transformation) = &toml.transformation {
        let (kind, function) = parse_transformation(transformation)?;
        binding = binding.with_transformation(kind, function);
    }
    Ok(binding)
}

// ---------------------------------------------------------------------------
// MQTT JSON types
// ---------------------------------------------------------------------------

// Published messages share a flat {now, op, ...} structure

#[derive(Serialize)]
struct MqttItemUpdate {
    now: u64,
    op: String,
    item: String,
    value: serde_json::Value,
}

#[derive(Serialize)]
struct MqttDeviceEvent {
    now: u64,
    op: String,
    device: String,
}

#[derive(Serialize)]
struct MqttPanelEvent {
    now: u64,
    op: String,
    device: String,
    date: String,
    time: String,
    partition: u32,
    action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    zone: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<u32>,
}

#[derive(Serialize)]
struct MqttCmdAck {
    now: u64,
    op: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    src: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

// Inbound command (subscribed)
#[derive(Deserialize)]
struct MqttCommand {
    op: String,
    #[serde(default)]
    device: Option<String>,
    #[serde(default)]
    zone: Option<u32>,
    #[serde(default)]
    area: Option<u32>,
    #[serde(default)]
    input: Option<u32>,
    #[serde(default)]
    open: Option<bool>,
    #[serde(default)]
    state: Option<i64>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    command: Option<String>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

fn json_value(value: &PolledValue) -> serde_json::Value {
    match value {
        PolledValue::Number(n) => serde_json::json!(n),
        PolledValue::Text(s) => serde_json::Value::String(s.clone()),
    }
}

async fn publish_json(client: &AsyncClient, topic: &str, payload: &impl Serialize, retain: bool) {
    match serde_json::to_string(payload) {
        Ok(json) => {
            if let Err(e) = client.publish(topic, QoS::AtLeastOnce, retain, json).await {
                error!("Failed to publish to {topic}: {e}");
            }
        }
        Err(e) => error!("Failed to serialize MQTT payload: {e}"),
    }
}

async fn publish_update(client: &AsyncClient, topic: &str, update: &Update) {
    let msg = MqttItemUpdate {
        now: now_epoch_ms(),
        op: "UPDATE".to_string(),
        item: update.item.clone(),
        value: json_value(&update.value),
    };
    let item_topic = format!("{topic}/{}", update.item);
    publish_json(client, &item_topic, &msg, true).await;
}

async fn publish_device_event(client: &AsyncClient, topic: &str, op: &str, device: &str) {
    let msg = MqttDeviceEvent {
        now: now_epoch_ms(),
        op: op.to_string(),
        device: device.to_string(),
    };
    publish_json(client, topic, &msg, false).await;
}

async fn publish_panel_event(client: &AsyncClient, topic: &str, device: &str, event: &ParsedEvent) {
    let (zone, user) = match event.subject {
        Some(Subject::Zone(n)) => (Some(n), None),
        Some(Subject::User(n)) => (None, Some(n)),
        None => (None, None),
    };
    let msg = MqttPanelEvent {
        now: now_epoch_ms(),
        op: "EVENT".to_string(),
        device: device.to_string(),
        date: event.date.to_string(),
        time: event.time.format("%H:%M").to_string(),
        partition: event.partition,
        action: event.action.variable().to_string(),
        zone,
        user,
    };
    publish_json(client, topic, &msg, false).await;
}

async fn publish_cmd_ack(
    client: &AsyncClient,
    topic: &str,
    success: bool,
    src: Option<serde_json::Value>,
    data: Option<serde_json::Value>,
) {
    let msg = MqttCmdAck {
        now: now_epoch_ms(),
        op: "CMD_ACK".to_string(),
        success,
        src,
        data,
    };
    publish_json(client, topic, &msg, false).await;
}

// ---------------------------------------------------------------------------
// Poll scheduler
// ---------------------------------------------------------------------------

/// Poll every binding whose refresh interval has elapsed.
async fn poll_due_bindings(
    registry: &Mutex<DeviceRegistry>,
    dispatcher: &Dispatcher,
    tracker: &Mutex<RefreshTracker>,
    client: &AsyncClient,
    topic: &str,
) {
    for (binding, command_type) in dispatcher.polled_bindings() {
        if !tracker
            .lock()
            .await
            .is_due(&binding.item, binding.refresh, Instant::now())
        {
            continue;
        }

        // The registry lock is not held while the device answers
        let device = registry.lock().await.client(&binding.device);
        let result = match device {
            Ok(device) => device.poll(command_type).await,
            Err(e) => Err(e),
        };

        let value = match result {
            Ok(value) => value,
            Err(e @ PanelError::Unsupported { .. }) => {
                debug!("{}: {e}", binding.item);
                continue;
            }
            Err(e) => {
                warn!("Poll of {} ({command_type}) failed: {e}", binding.item);
                continue;
            }
        };

        match dispatcher.transform(binding, value) {
            Ok(value) => {
                let update = Update {
                    item: binding.item.clone(),
                    value,
                };
                publish_update(client, topic, &update).await;
                tracker
                    .lock()
                    .await
                    .mark_updated(&binding.item, Instant::now());
            }
            Err(e) => warn!("Binding {} skipped: {e}", binding.item),
        }
    }
}

/// Restart device tasks that stopped after their line failed.
async fn restart_finished_devices(registry: &Mutex<DeviceRegistry>) {
    let mut registry = registry.lock().await;
    let finished: Vec<String> = registry
        .ids()
        .filter(|id| registry.get(id).is_ok_and(|handle| handle.is_finished()))
        .map(str::to_string)
        .collect();
    for id in finished {
        if let Err(e) = registry.reconnect(&id).await {
            error!("Restarting device {id} failed: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// MQTT command handler
// ---------------------------------------------------------------------------

fn parse_arm_mode(mode: Option<&str>) -> Option<ArmMode> {
    match mode.unwrap_or("A") {
        "A" | "away" => Some(ArmMode::Away),
        "F" | "force" => Some(ArmMode::Force),
        "S" | "stay" => Some(ArmMode::Stay),
        "I" | "instant" => Some(ArmMode::Instant),
        _ => None,
    }
}

/// Translate an inbound MQTT command into a panel command.
fn build_panel_command(cmd: &MqttCommand) -> std::result::Result<Command, String> {
    let area = cmd.area.unwrap_or(1);
    match cmd.op.as_str() {
        "ZONE_STATUS" => cmd
            .zone
            .map(|zone| Command::RequestZoneStatus { zone })
            .ok_or_else(|| "missing zone".to_string()),
        "AREA_STATUS" => Ok(Command::RequestAreaStatus { area }),
        "ARM" => {
            let mode = parse_arm_mode(cmd.mode.as_deref())
                .ok_or_else(|| format!("invalid arm mode {:?}", cmd.mode))?;
            let code = cmd.code.clone().ok_or_else(|| "missing code".to_string())?;
            Ok(Command::AreaArm { area, mode, code })
        }
        "DISARM" => {
            let code = cmd.code.clone().ok_or_else(|| "missing code".to_string())?;
            Ok(Command::AreaDisarm { area, code })
        }
        "PANIC_EMERGENCY" => Ok(Command::EmergencyPanic { area }),
        "PANIC_MEDICAL" => Ok(Command::MedicalPanic { area }),
        "PANIC_FIRE" => Ok(Command::FirePanic { area }),
        "SMOKE_RESET" => Ok(Command::SmokeReset { area }),
        "VIRTUAL_INPUT" => {
            let input = cmd.input.ok_or_else(|| "missing input".to_string())?;
            if cmd.open.unwrap_or(true) {
                Ok(Command::VirtualInputOpen { input })
            } else {
                Ok(Command::VirtualInputClosed { input })
            }
        }
        "POWER" => cmd
            .state
            .map(|state| Command::SetPowerState { state })
            .ok_or_else(|| "missing state".to_string()),
        "POWER_STATE" => Ok(Command::PowerQuery),
        "ERROR" => Ok(Command::ErrorQuery),
        "RESET_ALL" => Ok(Command::ResetAll),
        "RAW" => cmd
            .command
            .as_deref()
            .map(Command::parse)
            .ok_or_else(|| "missing command".to_string()),
        other => Err(format!("unknown command {other}")),
    }
}

async fn handle_command(
    payload_str: &str,
    cmd: MqttCommand,
    client: &AsyncClient,
    topic: &str,
    registry: &Mutex<DeviceRegistry>,
) {
    let src_json = serde_json::from_str::<serde_json::Value>(payload_str).ok();

    if cmd.op == "PING" {
        info!("Command: PING");
        publish_cmd_ack(client, topic, true, src_json, None).await;
        return;
    }

    let command = match build_panel_command(&cmd) {
        Ok(command) => command,
        Err(e) => {
            warn!("{}: {e}", cmd.op);
            publish_cmd_ack(client, topic, false, src_json, None).await;
            return;
        }
    };

    // The registry lock is released before the device answers
    let (device_id, device) = {
        let registry = registry.lock().await;
        let Some(device_id) = cmd
            .device
            .clone()
            .or_else(|| registry.ids().next().map(str::to_string))
        else {
            drop(registry);
            warn!("{}: no devices configured", cmd.op);
            publish_cmd_ack(client, topic, false, src_json, None).await;
            return;
        };
        let device = registry.client(&device_id);
        (device_id, device)
    };

    info!("Command: {} -> {} on {}", cmd.op, command, device_id);
    let result = match device {
        Ok(device) => device.query(command, None).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(payload) => {
            let data = Some(serde_json::Value::String(payload));
            publish_cmd_ack(client, topic, true, src_json, data).await;
        }
        Err(e) => {
            error!("{} on {} failed: {e}", cmd.op, device_id);
            publish_cmd_ack(client, topic, false, src_json, None).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=paradox_ptr=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        let config_text =
            std::fs::read_to_string(&cli.config).context("Failed to read config file")?;
        let config: Config = toml::from_str(&config_text).context("Failed to parse config file")?;

        let device_configs = config
            .devices
            .iter()
            .map(build_device_config)
            .collect::<Result<Vec<_>>>()?;
        let bindings = config
            .bindings
            .iter()
            .map(|b| build_binding(b, &device_configs))
            .collect::<Result<Vec<_>>>()?;
        let granularity = device_configs
            .iter()
            .map(|d| d.refresh_ms)
            .min()
            .unwrap_or(default_refresh())
            .max(100);
        let (mqtt_host, mqtt_port) = parse_mqtt_url(&config.mqtt.url)?;
        let publish_topic = config.mqtt.publish_topic;
        let subscribe_topic = config.mqtt.subscribe_topic;

        // Devices
        let mut registry = DeviceRegistry::new();
        let event_rx = registry.subscribe();
        for device in device_configs {
            info!(
                "Starting device {} ({} on {})",
                device.id, device.ptr_type, device.serial_port
            );
            registry.add(device).await;
        }
        let registry = Arc::new(Mutex::new(registry));
        let dispatcher = Arc::new(Dispatcher::new(bindings));
        let tracker = Arc::new(Mutex::new(RefreshTracker::new()));

        // MQTT
        let mut mqtt_opts = MqttOptions::new(&config.mqtt.client_id, &mqtt_host, mqtt_port);
        mqtt_opts.set_keep_alive(Duration::from_secs(30));
        let (client, mut eventloop) = AsyncClient::new(mqtt_opts, 256);

        client
            .subscribe(&subscribe_topic, QoS::AtLeastOnce)
            .await
            .context("Failed to subscribe to MQTT topic")?;
        info!("MQTT: subscribed to {subscribe_topic}");

        // Task 1: device events -> bindings -> MQTT
        let dispatcher_events = Arc::clone(&dispatcher);
        let tracker_events = Arc::clone(&tracker);
        let client_events = client.clone();
        let topic_events = publish_topic.clone();
        let event_handle = tokio::spawn(async move {
            let mut rx = event_rx;
            loop {
                match rx.recv().await {
                    Ok(PanelEvent::Parsed { device, event }) => {
                        publish_panel_event(&client_events, &topic_events, &device, &event).await;
                        for update in dispatcher_events.dispatch(&device, &event) {
                            publish_update(&client_events, &topic_events, &update).await;
                            tracker_events
                                .lock()
                                .await
                                .mark_updated(&update.item, Instant::now());
                        }
                    }
                    Ok(PanelEvent::Frame { device, line }) => {
                        debug!("{device}: {}", line.trim_end());
                    }
                    Ok(PanelEvent::Connected { device }) => {
                        info!("Device {device} connected");
                        publish_device_event(&client_events, &topic_events, "CONNECTED", &device)
                            .await;
                    }
                    Ok(PanelEvent::Disconnected { device }) => {
                        warn!("Device {device} disconnected");
                        publish_device_event(&client_events, &topic_events, "DISCONNECTED", &device)
                            .await;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Event receiver lagged, missed {n} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        info!("Event channel closed");
                        break;
                    }
                }
            }
        });

        // Task 2: MQTT event loop (receives messages, handles commands)
        let registry_cmds = Arc::clone(&registry);
        let client_cmds = client.clone();
        let topic_cmds = publish_topic.clone();
        let sub_topic = subscribe_topic.clone();
        let mqtt_handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        // rumqttc does not resubscribe after a broker reconnect
                        info!("MQTT: connected, subscribing to {sub_topic}");
                        if let Err(e) = client_cmds.subscribe(&sub_topic, QoS::AtLeastOnce).await
                        {
                            error!("Failed to subscribe to {sub_topic}: {e}");
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(msg))) => {
                        if msg.topic == sub_topic {
                            let payload = String::from_utf8_lossy(&msg.payload);
                            match serde_json::from_str::<MqttCommand>(&payload) {
                                Ok(cmd) => {
                                    info!("MQTT command received: {payload}");
                                    // Replies can take up to the command timeout; keep
                                    // the event loop polling meanwhile
                                    let payload = payload.into_owned();
                                    let client = client_cmds.clone();
                                    let topic = topic_cmds.clone();
                                    let registry = Arc::clone(&registry_cmds);
                                    tokio::spawn(async move {
                                        handle_command(&payload, cmd, &client, &topic, &registry)
                                            .await;
                                    });
                                }
                                Err(e) => {
                                    warn!("Failed to parse MQTT command: {e}");
                                }
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT event loop error: {e}");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        // Task 3: poll scheduler at the configured refresh granularity
        let registry_poll = Arc::clone(&registry);
        let dispatcher_poll = Arc::clone(&dispatcher);
        let tracker_poll = Arc::clone(&tracker);
        let client_poll = client.clone();
        let topic_poll = publish_topic.clone();
        let poll_handle = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(granularity));
            loop {
                ticker.tick().await;
                restart_finished_devices(&registry_poll).await;
                poll_due_bindings(
                    &registry_poll,
                    &dispatcher_poll,
                    &tracker_poll,
                    &client_poll,
                    &topic_poll,
                )
                .await;
            }
        });

        info!("MQTT bridge running. Send SIGHUP to restart, SIGINT/SIGTERM to stop.");
        let restart = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
                false
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                false
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading config and restarting devices...");
                true
            }
        };

        event_handle.abort();
        mqtt_handle.abort();
        poll_handle.abort();

        registry.lock().await.shutdown_all().await;

        if !restart {
            break;
        }
        info!("Reloading config from {}", cli.config);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Parse an MQTT URL like "mqtt://host:port" into (host, port).
fn parse_mqtt_url(url: &str) -> Result<(String, u16)> {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port_str) = stripped
        .rsplit_once(':')
        .context("MQTT URL must be in format mqtt://host:port")?;

    let port: u16 = port_str.parse().context("Invalid MQTT port number")?;

    Ok((host.to_string(), port))
}
