//! Netatmo Weather input source.
//!
//! The service only needs three capabilities from the cloud API, captured by
//! [`WeatherApi`]: open a session, list stations, and fetch measurements for
//! a time window. [`NetatmoClient`] implements them over HTTP.

pub mod client;
#[cfg(test)]
pub(crate) mod mock;
pub mod resolver;
pub mod session;
pub mod types;

pub use client::NetatmoClient;
pub use resolver::resolve;
pub use session::{ApiSession, REAUTH_INTERVAL, SessionManager};
pub use types::{AccessToken, DeviceReference, MeasureQuery, MeasurementBatch, StationsData};

use crate::error::Result;
use async_trait::async_trait;

/// Capabilities consumed from the weather cloud API.
#[async_trait]
pub trait WeatherApi: Send + Sync {
    /// Open a new session and return its access token.
    async fn authenticate(&self) -> Result<AccessToken>;

    /// Fetch the station/module discovery payload.
    async fn stations(&self, token: &AccessToken) -> Result<StationsData>;

    /// Fetch the samples of one module for a time window.
    async fn measurements(
        &self,
        token: &AccessToken,
        query: &MeasureQuery,
    ) -> Result<MeasurementBatch>;
}
