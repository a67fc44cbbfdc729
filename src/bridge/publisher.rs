//! Maps the controller's detection state onto the configured accessory type.

use super::{
    AccessoryBridge, AccessoryInfo, Characteristic, CharacteristicValue, LeakState, ReadHandler,
};
use crate::config::{DeviceType, MeasurementKind};
use crate::sensors::{DetectionController, OutputSink, SWITCH_RESET_DELAY};
use log::debug;
use std::sync::Arc;
use std::time::Duration;

pub const MANUFACTURER: &str = "netatmo-sensor-bridge";

/// Momentary switch output: turns on for a detection, springs back off.
pub struct SwitchSink {
    bridge: Arc<dyn AccessoryBridge>,
    reset_delay: Duration,
}

impl SwitchSink {
    pub fn new(bridge: Arc<dyn AccessoryBridge>) -> Self {
        Self {
            bridge,
            reset_delay: SWITCH_RESET_DELAY,
        }
    }
}

impl OutputSink for SwitchSink {
    fn publish(&self, detected: bool) {
        self.bridge
            .push_update(Characteristic::On, CharacteristicValue::Bool(detected));
    }

    fn reset_after(&self) -> Option<Duration> {
        Some(self.reset_delay)
    }
}

/// Leak sensor output: a detection stays visible until it has been read.
pub struct LeakSink {
    bridge: Arc<dyn AccessoryBridge>,
}

impl LeakSink {
    pub fn new(bridge: Arc<dyn AccessoryBridge>) -> Self {
        Self { bridge }
    }
}

impl OutputSink for LeakSink {
    fn publish(&self, detected: bool) {
        self.bridge.push_update(
            Characteristic::LeakDetected,
            CharacteristicValue::Leak(LeakState::from(detected)),
        );
    }

    fn clears_on_read(&self) -> bool {
        true
    }
}

/// Characteristic carrying the detection state for a device type.
pub fn characteristic_for(device_type: DeviceType) -> Characteristic {
    match device_type {
        DeviceType::Switch => Characteristic::On,
        DeviceType::Leak => Characteristic::LeakDetected,
    }
}

/// Characteristic value for a detection state.
pub fn value_for(device_type: DeviceType, detected: bool) -> CharacteristicValue {
    match device_type {
        DeviceType::Switch => CharacteristicValue::Bool(detected),
        DeviceType::Leak => CharacteristicValue::Leak(LeakState::from(detected)),
    }
}

/// Wires a controller to the accessory bridge.
pub struct SensorPublisher {
    bridge: Arc<dyn AccessoryBridge>,
    device_type: DeviceType,
}

impl SensorPublisher {
    pub fn new(bridge: Arc<dyn AccessoryBridge>, device_type: DeviceType) -> Self {
        Self {
            bridge,
            device_type,
        }
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Output sink implementing the push side and reset policy of the device type.
    pub fn sink(&self) -> Arc<dyn OutputSink> {
        match self.device_type {
            DeviceType::Switch => Arc::new(SwitchSink::new(self.bridge.clone())),
            DeviceType::Leak => Arc::new(LeakSink::new(self.bridge.clone())),
        }
    }

    /// Serve bridge-initiated reads from the controller.
    pub fn attach(&self, controller: &Arc<DetectionController>) {
        let device_type = self.device_type;
        let characteristic = characteristic_for(device_type);
        let controller = Arc::downgrade(controller);

        let handler: ReadHandler = Box::new(move || {
            let detected = controller
                .upgrade()
                .is_some_and(|controller| controller.read_detected());
            debug!("[Bridge] {} read: {}", characteristic, detected);
            value_for(device_type, detected)
        });
        self.bridge.register_read_handler(characteristic, handler);
    }

    pub fn announce(&self, name: &str, kind: MeasurementKind) {
        self.bridge.announce(&accessory_info(name, self.device_type, kind));
    }
}

pub fn accessory_info(name: &str, device_type: DeviceType, kind: MeasurementKind) -> AccessoryInfo {
    let gauge = match kind {
        MeasurementKind::Wind => "Wind Gauge",
        MeasurementKind::Rain => "Rain Gauge",
    };
    let accessory = match device_type {
        DeviceType::Switch => "Switch",
        DeviceType::Leak => "Leak Sensor",
    };
    AccessoryInfo {
        name: name.to_string(),
        manufacturer: MANUFACTURER.to_string(),
        model: format!("Virtual {} for Netatmo {}", accessory, gauge),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::LocalBridge;
    use tokio::time::sleep;

    fn setup(device_type: DeviceType) -> (Arc<LocalBridge>, Arc<DetectionController>) {
        let bridge = Arc::new(LocalBridge::new());
        let publisher = SensorPublisher::new(bridge.clone(), device_type);
        let controller = DetectionController::new(publisher.sink(), Duration::ZERO);
        publisher.attach(&controller);
        (bridge, controller)
    }

    #[tokio::test(start_paused = true)]
    async fn test_leak_sensor_read_resets_detection() {
        let (bridge, controller) = setup(DeviceType::Leak);

        controller.submit_verdict(true);
        assert_eq!(
            bridge.last_update(Characteristic::LeakDetected),
            Some(CharacteristicValue::Leak(LeakState::Detected))
        );
        assert_eq!(
            bridge.read(Characteristic::LeakDetected),
            Some(CharacteristicValue::Leak(LeakState::Detected))
        );
        assert_eq!(
            bridge.read(Characteristic::LeakDetected),
            Some(CharacteristicValue::Leak(LeakState::NotDetected))
        );
        assert_eq!(bridge.read(Characteristic::On), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_pushes_reset() {
        let (bridge, controller) = setup(DeviceType::Switch);

        controller.submit_verdict(true);
        assert_eq!(bridge.read(Characteristic::On), Some(CharacteristicValue::Bool(true)));

        sleep(SWITCH_RESET_DELAY * 2).await;
        assert_eq!(
            bridge.updates(),
            vec![
                (Characteristic::On, CharacteristicValue::Bool(true)),
                (Characteristic::On, CharacteristicValue::Bool(false)),
            ]
        );
        assert_eq!(bridge.read(Characteristic::On), Some(CharacteristicValue::Bool(false)));
    }

    #[tokio::test]
    async fn test_read_after_controller_dropped() {
        let (bridge, controller) = setup(DeviceType::Switch);
        drop(controller);
        assert_eq!(bridge.read(Characteristic::On), Some(CharacteristicValue::Bool(false)));
    }

    #[test]
    fn test_accessory_info() {
        let info = accessory_info("Roof", DeviceType::Leak, MeasurementKind::Rain);
        assert_eq!(info.model, "Virtual Leak Sensor for Netatmo Rain Gauge");
        assert_eq!(info.manufacturer, MANUFACTURER);

        let bridge = Arc::new(LocalBridge::new());
        SensorPublisher::new(bridge.clone(), DeviceType::Switch)
            .announce("Garden", MeasurementKind::Wind);
        assert_eq!(
            bridge.info().map(|i| i.model),
            Some("Virtual Switch for Netatmo Wind Gauge".to_string())
        );
    }
}
