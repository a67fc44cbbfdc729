//! Locates the wind (or rain) gauge in a station discovery payload.

use super::types::{DeviceReference, StationsData};
use crate::config::MeasurementKind;
use crate::error::{BridgeError, Result};

/// Find the first module of the requested kind.
///
/// Stations and their modules are scanned in payload order and the first
/// match wins; later gauges of the same kind are ignored.
pub fn resolve(payload: &StationsData, kind: MeasurementKind) -> Result<DeviceReference> {
    let module_type = kind.module_type();

    payload
        .devices
        .iter()
        .find_map(|device| {
            device
                .modules
                .iter()
                .find(|module| module.module_type == module_type)
                .map(|module| DeviceReference {
                    station_id: device.id.clone(),
                    module_id: module.id.clone(),
                })
        })
        .ok_or_else(|| BridgeError::DeviceNotFound {
            module_type: module_type.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::netatmo::types::{StationDevice, StationModule};

    fn module(id: &str, module_type: &str) -> StationModule {
        StationModule {
            id: id.to_string(),
            module_type: module_type.to_string(),
            module_name: None,
        }
    }

    fn station(id: &str, modules: Vec<StationModule>) -> StationDevice {
        StationDevice {
            id: id.to_string(),
            station_name: None,
            modules,
        }
    }

    #[test]
    fn test_resolves_wind_module() {
        let payload = StationsData {
            devices: vec![station(
                "70:ee:01",
                vec![module("02:01", "NAModule1"), module("06:01", "NAModule2")],
            )],
        };
        let device = resolve(&payload, MeasurementKind::Wind).unwrap();
        assert_eq!(device.station_id, "70:ee:01");
        assert_eq!(device.module_id, "06:01");
    }

    #[test]
    fn test_first_match_wins_across_stations() {
        let payload = StationsData {
            devices: vec![
                station("70:ee:01", vec![module("02:01", "NAModule1")]),
                station(
                    "70:ee:02",
                    vec![
                        module("05:02", "NAModule3"),
                        module("06:02", "NAModule2"),
                        module("06:03", "NAModule2"),
                    ],
                ),
                station("70:ee:03", vec![module("06:04", "NAModule2")]),
            ],
        };
        let device = resolve(&payload, MeasurementKind::Wind).unwrap();
        assert_eq!(device.station_id, "70:ee:02");
        assert_eq!(device.module_id, "06:02");
    }

    #[test]
    fn test_resolves_rain_module() {
        let payload = StationsData {
            devices: vec![station(
                "70:ee:01",
                vec![module("06:01", "NAModule2"), module("05:01", "NAModule3")],
            )],
        };
        let device = resolve(&payload, MeasurementKind::Rain).unwrap();
        assert_eq!(device.module_id, "05:01");
    }

    #[test]
    fn test_no_matching_module() {
        let payload = StationsData {
            devices: vec![station("70:ee:01", vec![module("02:01", "NAModule1")])],
        };
        match resolve(&payload, MeasurementKind::Wind) {
            Err(BridgeError::DeviceNotFound { module_type }) => {
                assert_eq!(module_type, "NAModule2")
            }
            other => panic!("expected DeviceNotFound, got {:?}", other),
        }
        assert!(resolve(&StationsData::default(), MeasurementKind::Wind).is_err());
    }
}
