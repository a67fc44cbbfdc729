//! Reduces a measurement batch to a single "threshold exceeded" verdict.

use crate::input::netatmo::MeasurementBatch;

/// True iff any sample in any group is strictly greater than `threshold`.
pub fn aggregate(batch: &MeasurementBatch, threshold: f64) -> bool {
    batch.groups.iter().flatten().any(|&value| value > threshold)
}

/// Highest sample of the batch, for logging.
pub fn peak(batch: &MeasurementBatch) -> Option<f64> {
    batch.groups.iter().flatten().copied().reduce(f64::max)
}
