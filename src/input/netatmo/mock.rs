//! Scripted [`WeatherApi`] for tests.

use super::WeatherApi;
use super::types::{
    AccessToken, MeasureQuery, MeasurementBatch, StationDevice, StationModule, StationsData,
};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

enum Scripted {
    Batch(MeasurementBatch),
    Fail(String),
}

pub struct MockWeatherApi {
    stations: Mutex<StationsData>,
    responses: Mutex<VecDeque<Scripted>>,
    default_batch: Mutex<MeasurementBatch>,
    latency: Mutex<Duration>,
    queries: Mutex<Vec<MeasureQuery>>,
    tokens_seen: Mutex<Vec<AccessToken>>,
    auth_count: AtomicUsize,
    fail_auth: AtomicBool,
}

impl MockWeatherApi {
    /// An API whose account has no stations.
    pub fn new() -> Self {
        Self {
            stations: Mutex::new(StationsData::default()),
            responses: Mutex::new(VecDeque::new()),
            default_batch: Mutex::new(MeasurementBatch::default()),
            latency: Mutex::new(Duration::ZERO),
            queries: Mutex::new(Vec::new()),
            tokens_seen: Mutex::new(Vec::new()),
            auth_count: AtomicUsize::new(0),
            fail_auth: AtomicBool::new(false),
        }
    }

    pub fn with_wind_station(station_id: &str, module_id: &str) -> Self {
        let api = Self::new();
        api.set_stations(Self::wind_station(station_id, module_id));
        api
    }

    pub fn wind_station(station_id: &str, module_id: &str) -> StationsData {
        StationsData {
            devices: vec![StationDevice {
                id: station_id.to_string(),
                station_name: Some("Home".to_string()),
                modules: vec![StationModule {
                    id: module_id.to_string(),
                    module_type: "NAModule2".to_string(),
                    module_name: Some("Wind".to_string()),
                }],
            }],
        }
    }

    pub fn set_stations(&self, stations: StationsData) {
        *self.stations.lock() = stations;
    }

    /// Queue a batch for the next measurement fetch.
    pub fn push_batch(&self, groups: Vec<Vec<f64>>) {
        self.responses
            .lock()
            .push_back(Scripted::Batch(MeasurementBatch::new(groups)));
    }

    /// Queue a failure for the next measurement fetch.
    pub fn push_failure(&self, message: &str) {
        self.responses
            .lock()
            .push_back(Scripted::Fail(message.to_string()));
    }

    /// Batch served once the scripted responses run out.
    pub fn set_default_batch(&self, groups: Vec<Vec<f64>>) {
        *self.default_batch.lock() = MeasurementBatch::new(groups);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn fail_auth(&self, fail: bool) {
        self.fail_auth.store(fail, Ordering::SeqCst);
    }

    pub fn auth_count(&self) -> usize {
        self.auth_count.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.queries.lock().len()
    }

    pub fn queries(&self) -> Vec<MeasureQuery> {
        self.queries.lock().clone()
    }

    pub fn tokens_seen(&self) -> Vec<AccessToken> {
        self.tokens_seen.lock().clone()
    }
}

#[async_trait]
impl WeatherApi for MockWeatherApi {
    async fn authenticate(&self) -> Result<AccessToken> {
        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(BridgeError::Auth("invalid_grant".to_string()));
        }
        let n = self.auth_count.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AccessToken::new(format!("token-{}", n)))
    }

    async fn stations(&self, _token: &AccessToken) -> Result<StationsData> {
        Ok(self.stations.lock().clone())
    }

    async fn measurements(
        &self,
        token: &AccessToken,
        query: &MeasureQuery,
    ) -> Result<MeasurementBatch> {
        self.queries.lock().push(query.clone());
        self.tokens_seen.lock().push(token.clone());

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let scripted = self.responses.lock().pop_front();
        match scripted {
            Some(Scripted::Batch(batch)) => Ok(batch),
            Some(Scripted::Fail(message)) => Err(BridgeError::Api { code: 500, message }),
            None => Ok(self.default_batch.lock().clone()),
        }
    }
}
