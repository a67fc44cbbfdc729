//! HTTP client for the Netatmo Weather API.

use super::WeatherApi;
use super::types::{
    AccessToken, ApiEnvelope, MeasureBody, MeasureQuery, MeasurementBatch, StationsData,
    TokenResponse,
};
use crate::config::NetatmoConfig;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::Mutex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Netatmo API client using the OAuth2 refresh-token grant.
///
/// Netatmo may hand out a new refresh token with every access token, so the
/// latest one is kept in memory for the next session.
pub struct NetatmoClient {
    http: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: Mutex<String>,
}

impl NetatmoClient {
    pub fn new(config: &NetatmoConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("netatmo-sensor-bridge/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token: Mutex::new(config.refresh_token.clone()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        token: &AccessToken,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = self.url(path);
        debug!("[Netatmo] GET {}", url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(token.as_str())
            .query(params)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(api_error(status.as_u16(), &text));
        }

        let envelope: ApiEnvelope<T> = serde_json::from_str(&text)
            .map_err(|e| BridgeError::InvalidResponse(format!("{}: {}", path, e)))?;
        unwrap_envelope(path, envelope)
    }
}

/// Map an error response to `BridgeError::Api`, preferring the API's own code.
fn api_error(status: u16, text: &str) -> BridgeError {
    match serde_json::from_str::<ApiEnvelope<serde_json::Value>>(text) {
        Ok(ApiEnvelope {
            error: Some(error), ..
        }) => BridgeError::Api {
            code: error.code,
            message: error.message,
        },
        _ => BridgeError::Api {
            code: i64::from(status),
            message: text.trim().to_string(),
        },
    }
}

fn unwrap_envelope<T>(path: &str, envelope: ApiEnvelope<T>) -> Result<T> {
    if let Some(error) = envelope.error {
        return Err(BridgeError::Api {
            code: error.code,
            message: error.message,
        });
    }
    if let Some(status) = envelope.status.as_deref()
        && status != "ok"
    {
        warn!("[Netatmo] {} answered with status '{}'", path, status);
    }
    envelope
        .body
        .ok_or_else(|| BridgeError::InvalidResponse(format!("{}: missing body", path)))
}

#[async_trait]
impl WeatherApi for NetatmoClient {
    async fn authenticate(&self) -> Result<AccessToken> {
        let refresh_token = self.refresh_token.lock().clone();
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(self.url("/oauth2/token"))
            .form(&params)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            #[derive(serde::Deserialize)]
            struct OAuthError {
                error: String,
            }
            let reason = serde_json::from_str::<OAuthError>(&text)
                .map(|e| e.error)
                .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
            return Err(BridgeError::Auth(reason));
        }

        let token: TokenResponse = serde_json::from_str(&text)
            .map_err(|e| BridgeError::Auth(format!("invalid token response: {}", e)))?;

        if let Some(rotated) = token.refresh_token
            && rotated != refresh_token
        {
            debug!("[Netatmo] Refresh token rotated");
            *self.refresh_token.lock() = rotated;
        }
        info!(
            "[Netatmo] Access token acquired (expires in {}s)",
            token.expires_in.unwrap_or_default()
        );

        Ok(AccessToken::new(token.access_token))
    }

    async fn stations(&self, token: &AccessToken) -> Result<StationsData> {
        self.get(token, "/api/getstationsdata", &[]).await
    }

    async fn measurements(
        &self,
        token: &AccessToken,
        query: &MeasureQuery,
    ) -> Result<MeasurementBatch> {
        let body: MeasureBody = self
            .get(token, "/api/getmeasure", &query.to_params())
            .await?;
        Ok(MeasurementBatch::from(body))
    }
}
