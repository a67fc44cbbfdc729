use log::{error, info, warn};
use netatmo_sensor_bridge::bridge::{AccessoryBridge, LocalBridge, MqttBridge};
use netatmo_sensor_bridge::config::{self, Config};
use netatmo_sensor_bridge::input::netatmo::NetatmoClient;
use netatmo_sensor_bridge::service::SensorService;
use std::sync::Arc;
use tokio::signal;

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    // Load .env file before the runtime starts its worker threads
    config::load_dotenv();
    init_logger();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };
    runtime.block_on(run());
}

async fn run() {
    info!("Starting Netatmo sensor bridge");

    let config = Config::from_env();
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }
    info!("Configuration loaded:");
    info!("  Device Name: {}", config.device.name);
    info!("  Device Type: {}", config.device.device_type);
    info!("  Gauge: {}", config.device.kind);
    info!("  Polling Interval: {}s", config.polling.interval_secs);
    info!("  Sliding Window: {} min", config.polling.window_minutes);
    info!("  Cooldown: {} min", config.polling.cooldown_minutes);
    info!("  Threshold: {}", config.polling.min_speed);

    let api = match NetatmoClient::new(&config.netatmo) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create Netatmo client: {}", e);
            std::process::exit(1);
        }
    };

    let mut mqtt_handle = None;
    let bridge: Arc<dyn AccessoryBridge> = match &config.mqtt {
        Some(mqtt) => {
            let (bridge, handle) = MqttBridge::start(mqtt, &config.device.name);
            info!("  MQTT Topic: {}", bridge.base_topic());
            mqtt_handle = Some(handle);
            bridge
        }
        None => {
            warn!("MQTT_BROKER_HOST not set, state changes are only logged");
            Arc::new(LocalBridge::new())
        }
    };

    let service = SensorService::new(config, api, bridge);
    let controller = service.controller();
    let sessions = service.sessions();
    let service_handle = service.start();

    info!("Netatmo sensor bridge is running");
    info!("  - Press Ctrl+C to exit");

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    service_handle.abort();
    controller.shutdown();
    sessions.teardown();
    if let Some(handle) = mqtt_handle {
        handle.abort();
    }

    info!("Netatmo sensor bridge stopped");
}
