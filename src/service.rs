//! Service orchestrator.
//!
//! Owns the poll and reauthentication schedules and wires the session, the
//! poller, the controller and the publisher together in one event loop.

use crate::bridge::{AccessoryBridge, SensorPublisher};
use crate::config::Config;
use crate::error::BridgeError;
use crate::input::netatmo::{REAUTH_INTERVAL, SessionManager, WeatherApi};
use crate::poller::{PollSettings, Poller};
use crate::sensors::DetectionController;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};

/// Where the service stands after the last session rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Gauge resolved, polling runs.
    Ready,
    /// The account has no matching gauge; wait for the next rotation.
    NoGauge,
    /// Authentication or discovery failed transiently; retry on the poll cadence.
    Retry,
}

pub struct SensorService {
    config: Config,
    publisher: SensorPublisher,
    controller: Arc<DetectionController>,
    sessions: Arc<SessionManager>,
    poller: Poller,
    reauth_interval: Duration,
}

impl SensorService {
    pub fn new(config: Config, api: Arc<dyn WeatherApi>, bridge: Arc<dyn AccessoryBridge>) -> Self {
        let publisher = SensorPublisher::new(bridge, config.device.device_type);
        let controller = DetectionController::new(publisher.sink(), config.polling.cooldown());
        publisher.attach(&controller);

        let sessions = Arc::new(SessionManager::new(api, config.device.kind));
        let poller = Poller::new(
            sessions.clone(),
            controller.clone(),
            PollSettings::from(&config),
        );

        Self {
            config,
            publisher,
            controller,
            sessions,
            poller,
            reauth_interval: REAUTH_INTERVAL,
        }
    }

    pub fn with_reauth_interval(mut self, reauth_interval: Duration) -> Self {
        self.reauth_interval = reauth_interval;
        self
    }

    pub fn controller(&self) -> Arc<DetectionController> {
        self.controller.clone()
    }

    pub fn sessions(&self) -> Arc<SessionManager> {
        self.sessions.clone()
    }

    /// Spawn the event loop. Abort the handle to stop it.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        info!(
            "[Service] Starting '{}' ({} from the {} gauge, every {}s)",
            self.config.device.name,
            self.publisher.device_type(),
            self.config.device.kind,
            self.config.polling.interval_secs
        );
        self.publisher
            .announce(&self.config.device.name, self.config.device.kind);

        let mut session = self.open_session().await;

        let mut poll = interval(self.config.polling.interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if session != SessionState::Ready {
            // First retry one period after the failed attempt
            poll.reset();
        }
        let mut reauth = interval_at(Instant::now() + self.reauth_interval, self.reauth_interval);

        loop {
            tokio::select! {
                _ = poll.tick(), if session != SessionState::NoGauge => {
                    if session == SessionState::Retry {
                        session = self.open_session().await;
                    }
                    if session == SessionState::Ready {
                        self.poller.on_tick();
                    }
                }
                _ = reauth.tick() => {
                    info!("[Service] Reauthenticating");
                    let next = self.open_session().await;
                    if next == SessionState::Ready && session == SessionState::NoGauge {
                        info!("[Service] Gauge resolved, polling resumed");
                        poll.reset_immediately();
                    }
                    session = next;
                }
            }
        }
    }

    /// Rotate the session and classify the outcome.
    async fn open_session(&self) -> SessionState {
        match self.sessions.rotate().await {
            Ok(_) => SessionState::Ready,
            Err(BridgeError::DeviceNotFound { .. }) => SessionState::NoGauge,
            Err(e) => {
                warn!(
                    "[Service] Session setup failed, retrying in {}s: {}",
                    self.config.polling.interval_secs, e
                );
                SessionState::Retry
            }
        }
    }
}
