use crate::error::{BridgeError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use strum::{Display, EnumString};

/// Load environment variables from a .env file.
/// Values may contain spaces without quotes; real environment variables win.
pub fn load_dotenv() {
    // Runs before the logger is initialised
    if let Err(e) = load_dotenv_from(Path::new(".env")) {
        eprintln!("Failed to read .env: {}", e);
    }
}

/// Load environment variables from the given file.
///
/// Returns `Ok(false)` when the file does not exist.
pub fn load_dotenv_from(env_path: &Path) -> Result<bool> {
    let content = match fs::read_to_string(env_path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    for (key, value) in parse_dotenv(&content) {
        if std::env::var(key).is_err() {
            // SAFETY: called from main before the async runtime spawns any threads
            unsafe { std::env::set_var(key, value) };
        }
    }
    Ok(true)
}

/// Parse `KEY=value` lines, skipping blanks and comments.
fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let mut value = value.trim();
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }
            Some((key.trim(), value))
        })
        .collect()
}

/// How the detection state is exposed to the accessory bridge.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Momentary switch that springs back off shortly after turning on.
    #[default]
    Switch,
    /// Leak sensor whose positive state is consumed by the next read.
    Leak,
}

impl DeviceType {
    /// Parse a configured device type. Unknown or missing values fall back to `Switch`.
    pub fn from_config(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_default()
    }
}

/// Which outdoor gauge is sampled.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementKind {
    #[default]
    Wind,
    Rain,
}

impl MeasurementKind {
    /// Netatmo module type tag of the gauge.
    pub fn module_type(&self) -> &'static str {
        match self {
            MeasurementKind::Wind => "NAModule2",
            MeasurementKind::Rain => "NAModule3",
        }
    }

    /// Measurement type requested from `getmeasure`.
    pub fn measure_type(&self) -> &'static str {
        match self {
            MeasurementKind::Wind => "WindStrength",
            MeasurementKind::Rain => "sum_rain",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,
    pub polling: PollingConfig,
    pub netatmo: NetatmoConfig,
    pub mqtt: Option<MqttConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub device_type: DeviceType,
    pub kind: MeasurementKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    pub interval_secs: u64,
    pub window_minutes: u64,
    /// 0 disables the cooldown.
    pub cooldown_minutes: u64,
    /// Strict threshold: a sample triggers when it is greater than this value.
    pub min_speed: f64,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn window(&self) -> Duration {
        minutes(self.window_minutes)
    }

    pub fn cooldown(&self) -> Duration {
        minutes(self.cooldown_minutes)
    }
}

/// Saturates instead of overflowing; `validate` rejects such values.
fn minutes(count: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(60))
}

/// Upper bound for minute-based settings (one year).
const MAX_MINUTES: u64 = 366 * 24 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetatmoConfig {
    pub api_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub base_topic: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig {
                name: "Wind Sensor".to_string(),
                device_type: DeviceType::Switch,
                kind: MeasurementKind::Wind,
            },
            polling: PollingConfig {
                interval_secs: 300,
                window_minutes: 30,
                cooldown_minutes: 0,
                min_speed: 20.0,
            },
            netatmo: NetatmoConfig {
                api_url: "https://api.netatmo.com".to_string(),
                client_id: String::new(),
                client_secret: String::new(),
                refresh_token: String::new(),
            },
            mqtt: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup, overlaying defaults.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(name) = var("DEVICE_NAME") {
            config.device.name = name;
        }
        config.device.device_type = DeviceType::from_config(var("DEVICE_TYPE").as_deref());
        if let Some(kind) = var("MEASUREMENT_KIND") {
            match kind.trim().parse() {
                Ok(k) => config.device.kind = k,
                Err(_) => warn!("Unknown MEASUREMENT_KIND '{}', using wind", kind),
            }
        }

        if let Some(v) = var("POLLING_INTERVAL_SECS")
            && let Ok(secs) = v.parse()
        {
            config.polling.interval_secs = secs;
        }
        if let Some(v) = var("SLIDING_WINDOW_MINUTES")
            && let Ok(minutes) = v.parse()
        {
            config.polling.window_minutes = minutes;
        }
        if let Some(v) = var("COOLDOWN_MINUTES")
            && let Ok(minutes) = v.parse()
        {
            config.polling.cooldown_minutes = minutes;
        }
        if let Some(v) = var("MIN_SPEED")
            && let Ok(speed) = v.parse()
        {
            config.polling.min_speed = speed;
        }

        if let Some(url) = var("NETATMO_API_URL") {
            config.netatmo.api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(id) = var("NETATMO_CLIENT_ID") {
            config.netatmo.client_id = id;
        }
        if let Some(secret) = var("NETATMO_CLIENT_SECRET") {
            config.netatmo.client_secret = secret;
        }
        if let Some(token) = var("NETATMO_REFRESH_TOKEN") {
            config.netatmo.refresh_token = token;
        }

        // MQTT bridge is only enabled when a broker is configured
        if let Some(host) = var("MQTT_BROKER_HOST") {
            let mut mqtt = MqttConfig {
                broker_host: host,
                broker_port: 1883,
                client_id: "netatmo-sensor-bridge".to_string(),
                username: var("MQTT_USERNAME"),
                password: var("MQTT_PASSWORD"),
                base_topic: "netatmo-sensor-bridge".to_string(),
            };
            if let Some(port) = var("MQTT_BROKER_PORT")
                && let Ok(p) = port.parse()
            {
                mqtt.broker_port = p;
            }
            if let Some(client_id) = var("MQTT_CLIENT_ID") {
                mqtt.client_id = client_id;
            }
            if let Some(base) = var("MQTT_BASE_TOPIC") {
                mqtt.base_topic = base.trim_end_matches('/').to_string();
            }
            config.mqtt = Some(mqtt);
        }

        config
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.polling.interval_secs == 0 {
            return Err(BridgeError::Config(
                "POLLING_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }
        if self.polling.window_minutes == 0 {
            return Err(BridgeError::Config(
                "SLIDING_WINDOW_MINUTES must be greater than 0".to_string(),
            ));
        }
        if self.polling.window_minutes > MAX_MINUTES {
            return Err(BridgeError::Config(format!(
                "SLIDING_WINDOW_MINUTES must be at most {}",
                MAX_MINUTES
            )));
        }
        if self.polling.cooldown_minutes > MAX_MINUTES {
            return Err(BridgeError::Config(format!(
                "COOLDOWN_MINUTES must be at most {}",
                MAX_MINUTES
            )));
        }
        if !self.polling.min_speed.is_finite() {
            return Err(BridgeError::Config("MIN_SPEED must be a number".to_string()));
        }
        let missing: Vec<&str> = [
            ("NETATMO_CLIENT_ID", &self.netatmo.client_id),
            ("NETATMO_CLIENT_SECRET", &self.netatmo.client_secret),
            ("NETATMO_REFRESH_TOKEN", &self.netatmo.refresh_token),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| key)
        .collect();
        if !missing.is_empty() {
            return Err(BridgeError::Config(format!(
                "missing credentials: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}
