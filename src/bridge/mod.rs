//! Accessory bridge boundary.
//!
//! The smart-home bridge is treated as an opaque publish/subscribe surface
//! keyed by characteristic: it can pull a value through a registered read
//! handler, or be pushed an update when the state changes on its own (for
//! example when a reset timer fires).

pub mod local;
pub mod mqtt;
pub mod publisher;

pub use local::LocalBridge;
pub use mqtt::MqttBridge;
pub use publisher::{LeakSink, SensorPublisher, SwitchSink};

use serde::Serialize;
use std::fmt;
use strum::{Display, EnumString};

/// Characteristics exposed by the virtual accessory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Characteristic {
    /// Momentary switch state.
    On,
    /// Leak sensor state.
    LeakDetected,
}

/// Leak sensor states, numbered like the HomeKit characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LeakState {
    NotDetected = 0,
    Detected = 1,
}

impl From<bool> for LeakState {
    fn from(detected: bool) -> Self {
        if detected {
            LeakState::Detected
        } else {
            LeakState::NotDetected
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacteristicValue {
    Bool(bool),
    Leak(LeakState),
}

impl fmt::Display for CharacteristicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharacteristicValue::Bool(on) => write!(f, "{}", on),
            CharacteristicValue::Leak(state) => write!(f, "{}", *state as u8),
        }
    }
}

/// Static accessory information shown by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessoryInfo {
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

/// Produces the current value of a characteristic on a bridge-initiated read.
pub type ReadHandler = Box<dyn Fn() -> CharacteristicValue + Send + Sync>;

/// Capabilities consumed from the accessory bridge.
pub trait AccessoryBridge: Send + Sync {
    /// Publish the accessory information.
    fn announce(&self, info: &AccessoryInfo);

    /// Serve bridge-initiated reads of `characteristic` with `handler`.
    fn register_read_handler(&self, characteristic: Characteristic, handler: ReadHandler);

    /// Push a value that changed outside a read.
    fn push_update(&self, characteristic: Characteristic, value: CharacteristicValue);
}
