//! In-process bridge that keeps the last values and logs every update.
//!
//! Used when no MQTT broker is configured, and by the tests to play the
//! part of the smart-home bridge.

use super::{AccessoryBridge, AccessoryInfo, Characteristic, CharacteristicValue, ReadHandler};
use log::info;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

#[derive(Default)]
pub struct LocalBridge {
    info: RwLock<Option<AccessoryInfo>>,
    handlers: RwLock<HashMap<Characteristic, ReadHandler>>,
    updates: Mutex<Vec<(Characteristic, CharacteristicValue)>>,
}

impl LocalBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Perform a bridge-initiated read, as a controller app would.
    pub fn read(&self, characteristic: Characteristic) -> Option<CharacteristicValue> {
        self.handlers
            .read()
            .get(&characteristic)
            .map(|handler| handler())
    }

    /// Every pushed update, oldest first.
    pub fn updates(&self) -> Vec<(Characteristic, CharacteristicValue)> {
        self.updates.lock().clone()
    }

    pub fn last_update(&self, characteristic: Characteristic) -> Option<CharacteristicValue> {
        self.updates
            .lock()
            .iter()
            .rev()
            .find(|(c, _)| *c == characteristic)
            .map(|(_, value)| *value)
    }

    pub fn info(&self) -> Option<AccessoryInfo> {
        self.info.read().clone()
    }
}

impl AccessoryBridge for LocalBridge {
    fn announce(&self, info: &AccessoryInfo) {
        info!(
            "[Bridge] Accessory '{}' ({} / {})",
            info.name, info.manufacturer, info.model
        );
        *self.info.write() = Some(info.clone());
    }

    fn register_read_handler(&self, characteristic: Characteristic, handler: ReadHandler) {
        self.handlers.write().insert(characteristic, handler);
    }

    fn push_update(&self, characteristic: Characteristic, value: CharacteristicValue) {
        info!("[Bridge] {} -> {}", characteristic, value);
        self.updates.lock().push((characteristic, value));
    }
}
