//! API session ownership and periodic reauthentication.
//!
//! A session is an owned, replaceable handle: rotating tears the old one down
//! (cancelling every fetch still bound to it) before a new one is acquired, so
//! a late response from a stale session can never reach the controller.

use super::WeatherApi;
use super::resolver::resolve;
use super::types::{AccessToken, DeviceReference};
use crate::config::MeasurementKind;
use crate::error::Result;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How often the session is discarded and recreated.
pub const REAUTH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// One authenticated API session and the gauge resolved for it.
#[derive(Debug)]
pub struct ApiSession {
    id: Uuid,
    token: AccessToken,
    device: Option<DeviceReference>,
    cancel: CancellationToken,
    opened_at: DateTime<Utc>,
}

impl ApiSession {
    fn new(token: AccessToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            token,
            device: None,
            cancel: CancellationToken::new(),
            opened_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    /// Resolved gauge, absent when discovery failed.
    pub fn device(&self) -> Option<&DeviceReference> {
        self.device.as_ref()
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Token cancelled when this session is torn down.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Holds the current API session and rotates it on demand.
pub struct SessionManager {
    api: Arc<dyn WeatherApi>,
    kind: MeasurementKind,
    current: RwLock<Option<Arc<ApiSession>>>,
}

impl SessionManager {
    pub fn new(api: Arc<dyn WeatherApi>, kind: MeasurementKind) -> Self {
        Self {
            api,
            kind,
            current: RwLock::new(None),
        }
    }

    pub fn api(&self) -> &Arc<dyn WeatherApi> {
        &self.api
    }

    pub fn current(&self) -> Option<Arc<ApiSession>> {
        self.current.read().clone()
    }

    /// Gauge of the current session, if one has been resolved.
    pub fn device(&self) -> Option<DeviceReference> {
        self.current
            .read()
            .as_ref()
            .and_then(|session| session.device.clone())
    }

    /// Drop the current session and cancel everything bound to it.
    pub fn teardown(&self) {
        if let Some(session) = self.current.write().take() {
            session.cancel.cancel();
            info!(
                "[Session] Session {} closed after {}s",
                session.id,
                (Utc::now() - session.opened_at()).num_seconds()
            );
        }
    }

    /// Replace the session: tear down, authenticate, then rediscover the gauge.
    ///
    /// After a discovery failure the new session is kept without a device, so
    /// polling stays paused until the next rotation resolves one.
    pub async fn rotate(&self) -> Result<DeviceReference> {
        self.teardown();

        let token = match self.api.authenticate().await {
            Ok(token) => token,
            Err(e) => {
                error!("[Session] Authentication failed: {}", e);
                return Err(e);
            }
        };

        let mut session = ApiSession::new(token);
        let resolved = match self.api.stations(&session.token).await {
            Ok(payload) => resolve(&payload, self.kind),
            Err(e) => {
                warn!("[Session] Station discovery request failed: {}", e);
                Err(e)
            }
        };

        match &resolved {
            Ok(device) => {
                info!("[Session] Session {} bound to {} gauge {}", session.id, self.kind, device);
                session.device = Some(device.clone());
            }
            Err(e) => error!(
                "[Session] Session {} has no {} gauge, polling paused: {}",
                session.id, self.kind, e
            ),
        }

        *self.current.write() = Some(Arc::new(session));
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::input::netatmo::mock::MockWeatherApi;
    use tokio_test::{assert_err, assert_ok};

    fn manager(api: &Arc<MockWeatherApi>) -> SessionManager {
        SessionManager::new(api.clone(), MeasurementKind::Wind)
    }

    #[tokio::test]
    async fn test_rotate_resolves_device() {
        let api = Arc::new(MockWeatherApi::with_wind_station("70:ee:01", "06:01"));
        let sessions = manager(&api);
        assert!(sessions.current().is_none());

        let device = assert_ok!(sessions.rotate().await);
        assert_eq!(device.module_id, "06:01");
        assert_eq!(sessions.device(), Some(device));
        assert_eq!(api.auth_count(), 1);
    }

    #[tokio::test]
    async fn test_rotate_cancels_previous_session() {
        let api = Arc::new(MockWeatherApi::with_wind_station("70:ee:01", "06:01"));
        let sessions = manager(&api);

        assert_ok!(sessions.rotate().await);
        let first = sessions.current().unwrap();
        let first_cancel = first.cancellation();

        assert_ok!(sessions.rotate().await);
        let second = sessions.current().unwrap();

        assert!(first.is_closed());
        assert!(first_cancel.is_cancelled());
        assert!(!second.is_closed());
        assert_ne!(first.id(), second.id());
        assert!(first.opened_at() <= second.opened_at());
        assert_eq!(api.auth_count(), 2);
    }

    #[tokio::test]
    async fn test_discovery_failure_keeps_session_without_device() {
        let api = Arc::new(MockWeatherApi::new());
        let sessions = manager(&api);

        let result = sessions.rotate().await;
        assert!(matches!(result, Err(BridgeError::DeviceNotFound { .. })));
        assert!(sessions.current().is_some());
        assert!(sessions.device().is_none());
    }

    #[tokio::test]
    async fn test_auth_failure_leaves_no_session() {
        let api = Arc::new(MockWeatherApi::with_wind_station("70:ee:01", "06:01"));
        let sessions = manager(&api);
        assert_ok!(sessions.rotate().await);

        api.fail_auth(true);
        assert_err!(sessions.rotate().await);
        assert!(sessions.current().is_none());
        assert!(sessions.device().is_none());
    }

    #[tokio::test]
    async fn test_rediscovery_picks_up_new_ids() {
        let api = Arc::new(MockWeatherApi::with_wind_station("70:ee:01", "06:01"));
        let sessions = manager(&api);
        assert_ok!(sessions.rotate().await);

        api.set_stations(MockWeatherApi::wind_station("70:ee:09", "06:09"));
        let device = assert_ok!(sessions.rotate().await);
        assert_eq!(device.station_id, "70:ee:09");
    }
}
