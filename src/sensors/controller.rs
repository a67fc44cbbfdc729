//! Debounce/cooldown controller for the detection signal.
//!
//! ```text
//!            verdict=true, cooldown > 0
//!   Idle ──────────────────────────────► Cooldown
//!    ▲                                      │
//!    └──────── cooldown timer expires ──────┘
//! ```
//!
//! In `Idle` every verdict is applied to the `detected` flag. A positive
//! verdict is the transient "triggered" step: it may start the cooldown and,
//! for momentary switches, arms the reset timer. In `Cooldown` verdicts are
//! dropped until the timer expires.

use super::output::OutputSink;
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use strum::Display;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ControllerState {
    Idle,
    Cooldown,
}

/// One-shot timer slot. The generation guards against an expiry that was
/// already running when the timer got replaced.
#[derive(Default)]
struct TimerSlot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    fn cancel(&mut self) {
        self.generation += 1;
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    fn is_armed(&self) -> bool {
        self.handle.is_some()
    }
}

struct Inner {
    state: ControllerState,
    detected: bool,
    cooldown_timer: TimerSlot,
    reset_timer: TimerSlot,
}

/// Owns the controller state and the detected flag.
pub struct DetectionController {
    inner: Mutex<Inner>,
    cooldown: Duration,
    sink: Arc<dyn OutputSink>,
}

impl DetectionController {
    /// A zero `cooldown` disables the cooldown state.
    pub fn new(sink: Arc<dyn OutputSink>, cooldown: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                state: ControllerState::Idle,
                detected: false,
                cooldown_timer: TimerSlot::default(),
                reset_timer: TimerSlot::default(),
            }),
            cooldown,
            sink,
        })
    }

    pub fn state(&self) -> ControllerState {
        self.inner.lock().state
    }

    pub fn is_cooling_down(&self) -> bool {
        self.state() == ControllerState::Cooldown
    }

    /// Current detected flag, without the read side effect.
    pub fn peek_detected(&self) -> bool {
        self.inner.lock().detected
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Apply one polling cycle's verdict.
    pub fn submit_verdict(self: &Arc<Self>, verdict: bool) {
        let changed = {
            let mut inner = self.inner.lock();
            if inner.state == ControllerState::Cooldown {
                debug!("[Controller] Cooling down, verdict {} discarded", verdict);
                return;
            }

            let changed = inner.detected != verdict;
            inner.detected = verdict;

            if verdict && !self.cooldown.is_zero() {
                inner.state = ControllerState::Cooldown;
                inner.cooldown_timer.cancel();
                let generation = inner.cooldown_timer.generation;
                inner.cooldown_timer.handle =
                    Some(self.arm(self.cooldown, move |c| c.expire_cooldown(generation)));
                info!(
                    "[Controller] Detection triggered, cooling down for {}s",
                    self.cooldown.as_secs()
                );
            } else if verdict {
                info!("[Controller] Detection triggered");
            }

            if verdict && let Some(delay) = self.sink.reset_after() {
                // Retriggering replaces a pending reset instead of stacking timers.
                inner.reset_timer.cancel();
                let generation = inner.reset_timer.generation;
                inner.reset_timer.handle =
                    Some(self.arm(delay, move |c| c.expire_reset(generation)));
            }

            changed
        };

        if changed {
            self.sink.publish(verdict);
        }
    }

    /// Leave the cooldown state. `detected` is left untouched.
    pub fn end_cooldown(&self) {
        let mut inner = self.inner.lock();
        inner.cooldown_timer.cancel();
        if inner.state == ControllerState::Cooldown {
            inner.state = ControllerState::Idle;
            info!("[Controller] Cooldown ended");
        }
    }

    /// Read the detected flag, applying the sink's read policy.
    pub fn read_detected(&self) -> bool {
        let mut inner = self.inner.lock();
        let detected = inner.detected;
        if detected && self.sink.clears_on_read() {
            inner.detected = false;
            debug!("[Controller] Detection consumed by read");
        }
        detected
    }

    /// Cancel every armed timer.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.cooldown_timer.cancel();
        inner.reset_timer.cancel();
    }

    /// Whether (cooldown, reset) timers are currently armed.
    pub fn armed_timers(&self) -> (bool, bool) {
        let inner = self.inner.lock();
        (inner.cooldown_timer.is_armed(), inner.reset_timer.is_armed())
    }

    fn expire_cooldown(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.cooldown_timer.generation != generation {
            return;
        }
        inner.cooldown_timer.handle = None;
        inner.state = ControllerState::Idle;
        info!("[Controller] Cooldown ended");
    }

    fn expire_reset(&self, generation: u64) {
        let was_detected = {
            let mut inner = self.inner.lock();
            if inner.reset_timer.generation != generation {
                return;
            }
            inner.reset_timer.handle = None;
            std::mem::replace(&mut inner.detected, false)
        };

        if was_detected {
            debug!("[Controller] Switch reset");
            self.sink.publish(false);
        }
    }

    fn arm(
        self: &Arc<Self>,
        delay: Duration,
        on_expiry: impl FnOnce(&DetectionController) + Send + 'static,
    ) -> JoinHandle<()> {
        let controller: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(controller) = controller.upgrade() {
                on_expiry(&controller);
            }
        })
    }
}
