//! Output policy seam between the controller and the accessory bridge.

use std::time::Duration;

/// How long a momentary switch stays on before springing back off.
pub const SWITCH_RESET_DELAY: Duration = Duration::from_secs(1);

/// Destination of the detection state.
///
/// Each implementation carries the reset policy of its output style, so the
/// controller itself never branches on the device type.
pub trait OutputSink: Send + Sync {
    /// Push a changed detection state to the bridge.
    fn publish(&self, detected: bool);

    /// Delay after which a positive detection resets on its own.
    fn reset_after(&self) -> Option<Duration> {
        None
    }

    /// Whether reading a positive detection consumes it.
    fn clears_on_read(&self) -> bool {
        false
    }
}
