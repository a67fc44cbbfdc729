//! Polling scheduler: one measurement fetch per tick, skipped while cooling down.

use crate::config::{Config, MeasurementKind};
use crate::input::netatmo::types::Scale;
use crate::input::netatmo::{DeviceReference, MeasureQuery, SessionManager};
use crate::sensors::aggregator::{aggregate, peak};
use crate::sensors::DetectionController;
use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    pub window: Duration,
    pub threshold: f64,
    pub kind: MeasurementKind,
}

impl From<&Config> for PollSettings {
    fn from(config: &Config) -> Self {
        Self {
            window: config.polling.window(),
            threshold: config.polling.min_speed,
            kind: config.device.kind,
        }
    }
}

/// What a tick did.
#[derive(Debug)]
pub enum PollOutcome {
    /// The controller is cooling down; no request was issued.
    CoolingDown,
    /// No session or no resolved gauge; no request was issued.
    NoDevice,
    /// A fetch is in flight on the returned task.
    Dispatched(JoinHandle<()>),
}

/// Query for the trailing window ending at `now`.
pub fn build_query(
    device: DeviceReference,
    kind: MeasurementKind,
    now: DateTime<Utc>,
    window: Duration,
) -> MeasureQuery {
    let date_begin = TimeDelta::from_std(window)
        .ok()
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    MeasureQuery {
        device,
        date_begin,
        scale: Scale::ThirtyMinutes,
        kind,
        real_time: true,
    }
}

pub struct Poller {
    sessions: Arc<SessionManager>,
    controller: Arc<DetectionController>,
    settings: PollSettings,
}

impl Poller {
    pub fn new(
        sessions: Arc<SessionManager>,
        controller: Arc<DetectionController>,
        settings: PollSettings,
    ) -> Self {
        Self {
            sessions,
            controller,
            settings,
        }
    }

    /// Run one polling cycle. The fetch itself runs on a spawned task.
    pub fn on_tick(&self) -> PollOutcome {
        if self.controller.is_cooling_down() {
            debug!("[Poll] Cooling down, skipping fetch");
            return PollOutcome::CoolingDown;
        }

        let Some(session) = self.sessions.current() else {
            warn!("[Poll] No API session, skipping cycle");
            return PollOutcome::NoDevice;
        };
        let Some(device) = session.device().cloned() else {
            warn!("[Poll] No {} gauge resolved, skipping cycle", self.settings.kind);
            return PollOutcome::NoDevice;
        };

        let query = build_query(device, self.settings.kind, Utc::now(), self.settings.window);
        let threshold = self.settings.threshold;
        let api = self.sessions.api().clone();
        let controller = self.controller.clone();
        let cancel = session.cancellation();

        debug!(
            "[Poll] Fetching {} since {} for {}",
            query.kind, query.date_begin, query.device
        );

        let handle = tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("[Poll] Session rotated, request abandoned");
                    return;
                }
                result = api.measurements(session.token(), &query) => result,
            };

            match result {
                Ok(batch) => {
                    if cancel.is_cancelled() {
                        debug!("[Poll] Session rotated, response discarded");
                        return;
                    }
                    if batch.is_empty() {
                        debug!("[Poll] No samples in the window");
                    }
                    let verdict = aggregate(&batch, threshold);
                    debug!(
                        "[Poll] {} samples, peak {:?}, threshold {} -> {}",
                        batch.sample_count(),
                        peak(&batch),
                        threshold,
                        verdict
                    );
                    controller.submit_verdict(verdict);
                }
                Err(e) => warn!("[Poll] Fetch failed, skipping cycle: {}", e),
            }
        });

        PollOutcome::Dispatched(handle)
    }
}
