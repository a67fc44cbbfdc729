//! Netatmo API payloads and the request/response types used by the poller.

use crate::config::MeasurementKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use strum::Display;

/// Station and module ids of the gauge being sampled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceReference {
    pub station_id: String,
    pub module_id: String,
}

impl fmt::Display for DeviceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.station_id, self.module_id)
    }
}

/// Bearer token of one API session.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Generic `{status, body, error}` envelope returned by every endpoint.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub status: Option<String>,
    pub body: Option<T>,
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Discovery payload from `getstationsdata`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationsData {
    #[serde(default)]
    pub devices: Vec<StationDevice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationDevice {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub station_name: Option<String>,
    #[serde(default)]
    pub modules: Vec<StationModule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationModule {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub module_type: String,
    #[serde(default)]
    pub module_name: Option<String>,
}

/// Aggregation scale of `getmeasure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Scale {
    #[strum(serialize = "30min")]
    ThirtyMinutes,
}

/// Parameters of one measurement fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureQuery {
    pub device: DeviceReference,
    pub date_begin: DateTime<Utc>,
    pub scale: Scale,
    pub kind: MeasurementKind,
    pub real_time: bool,
}

impl MeasureQuery {
    /// Query string parameters for `getmeasure`.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("device_id", self.device.station_id.clone()),
            ("module_id", self.device.module_id.clone()),
            ("scale", self.scale.to_string()),
            ("type", self.kind.measure_type().to_string()),
            ("date_begin", self.date_begin.timestamp().to_string()),
            ("real_time", self.real_time.to_string()),
            ("optimize", "false".to_string()),
        ]
    }
}

/// Body of `getmeasure`, in either the keyed or the optimized layout.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MeasureBody {
    /// `optimize=false`: `{"<timestamp>": [v, ...], ...}`
    Keyed(BTreeMap<String, Vec<Option<f64>>>),
    /// `optimize=true`: `[{"beg_time": .., "value": [[v, ...], ...]}, ...]`
    Optimized(Vec<OptimizedChunk>),
}

#[derive(Debug, Deserialize)]
pub struct OptimizedChunk {
    #[serde(default)]
    pub beg_time: Option<i64>,
    #[serde(default)]
    pub step_time: Option<i64>,
    #[serde(default)]
    pub value: Vec<Vec<Option<f64>>>,
}

/// Samples returned for one query. Each group is one measurement record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementBatch {
    pub groups: Vec<Vec<f64>>,
}

impl MeasurementBatch {
    pub fn new(groups: Vec<Vec<f64>>) -> Self {
        Self { groups }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(Vec::is_empty)
    }

    pub fn sample_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }
}

impl From<MeasureBody> for MeasurementBatch {
    fn from(body: MeasureBody) -> Self {
        let records: Vec<Vec<Option<f64>>> = match body {
            MeasureBody::Keyed(map) => map.into_values().collect(),
            MeasureBody::Optimized(chunks) => chunks.into_iter().flat_map(|c| c.value).collect(),
        };
        Self::new(
            records
                .into_iter()
                .map(|record| record.into_iter().flatten().collect())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_envelope_body_without_default() {
        // MeasureBody has no Default impl
        let envelope: ApiEnvelope<MeasureBody> =
            serde_json::from_str(r#"{"error": {"code": 2, "message": "Invalid access token"}}"#)
                .unwrap();
        assert!(envelope.status.is_none());
        assert!(envelope.body.is_none());
        assert_eq!(envelope.error.map(|e| e.code), Some(2));
    }

    #[test]
    fn test_stations_payload_parses() {
        let json = r#"{
            "status": "ok",
            "body": {"devices": [{
                "_id": "70:ee:50:00:00:01",
                "station_name": "Home",
                "modules": [
                    {"_id": "02:00:00:00:00:01", "type": "NAModule1", "module_name": "Outdoor"},
                    {"_id": "06:00:00:00:00:01", "type": "NAModule2"}
                ]
            }]}
        }"#;
        let envelope: ApiEnvelope<StationsData> = serde_json::from_str(json).unwrap();
        let body = envelope.body.unwrap();
        assert_eq!(body.devices.len(), 1);
        assert_eq!(body.devices[0].modules[1].module_type, "NAModule2");
        assert_eq!(body.devices[0].modules[1].module_name, None);
    }

    #[test]
    fn test_keyed_measure_body_drops_nulls() {
        let json = r#"{"1700000000": [5.0, null], "1700001800": [12.5]}"#;
        let body: MeasureBody = serde_json::from_str(json).unwrap();
        let batch = MeasurementBatch::from(body);
        assert_eq!(batch.groups, vec![vec![5.0], vec![12.5]]);
        assert_eq!(batch.sample_count(), 2);
    }

    #[test]
    fn test_optimized_measure_body() {
        let json = r#"[{"beg_time": 1700000000, "step_time": 1800, "value": [[3], [25, 4]]}]"#;
        let body: MeasureBody = serde_json::from_str(json).unwrap();
        let batch = MeasurementBatch::from(body);
        assert_eq!(batch.groups, vec![vec![3.0], vec![25.0, 4.0]]);
    }

    #[test]
    fn test_empty_body_is_empty_batch() {
        let body: MeasureBody = serde_json::from_str("[]").unwrap();
        assert!(MeasurementBatch::from(body).is_empty());
        assert!(MeasurementBatch::new(vec![vec![]]).is_empty());
    }

    #[test]
    fn test_query_params() {
        let query = MeasureQuery {
            device: DeviceReference {
                station_id: "70:ee".to_string(),
                module_id: "06:00".to_string(),
            },
            date_begin: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            scale: Scale::ThirtyMinutes,
            kind: MeasurementKind::Wind,
            real_time: true,
        };
        let params = query.to_params();
        assert!(params.contains(&("scale", "30min".to_string())));
        assert!(params.contains(&("type", "WindStrength".to_string())));
        assert!(params.contains(&("date_begin", "1700000000".to_string())));
        assert!(params.contains(&("real_time", "true".to_string())));
        assert!(params.contains(&("module_id", "06:00".to_string())));
    }

    #[test]
    fn test_access_token_debug_is_redacted() {
        let token = AccessToken::new("secret-token");
        assert_eq!(format!("{:?}", token), "AccessToken(***)");
        assert_eq!(token.as_str(), "secret-token");
    }
}
