//! Detection core: measurement aggregation and the debounce/cooldown state.
//!
//! The controller is the only owner of the detected flag. Everything else
//! reaches it through [`DetectionController::submit_verdict`] and
//! [`DetectionController::read_detected`], and changes leave through an
//! [`OutputSink`].

pub mod aggregator;
pub mod controller;
pub mod output;

pub use aggregator::aggregate;
pub use controller::{ControllerState, DetectionController};
pub use output::{OutputSink, SWITCH_RESET_DELAY};
