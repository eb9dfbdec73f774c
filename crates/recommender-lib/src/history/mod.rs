//! Container usage history
//!
//! The recommender only reads history through [`ContainerUsageHistory`]:
//! a percentile query per resource plus the metadata needed to judge how
//! much history backs those percentiles. How histories are built, decayed
//! or persisted is up to the implementation.

mod samples;
mod source;

pub use samples::SampleHistory;
pub use source::{
    FileHistorySource, HistorySnapshot, HistorySource, WorkloadHistories, WorkloadSnapshot,
};

use crate::models::{ResourceAmount, ResourceKind};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Samples per day at one sample per minute
pub const SAMPLES_PER_DAY: f64 = 60.0 * 24.0;

/// Read-only view of a container's observed usage
pub trait ContainerUsageHistory: Send + Sync {
    /// Usage at percentile `percentile` (in `[0, 1]`) for `kind`
    fn percentile(&self, kind: ResourceKind, percentile: f64) -> ResourceAmount;

    /// Start of the oldest sample
    fn first_sample_start(&self) -> Option<DateTime<Utc>>;

    /// Start of the most recent sample
    fn last_sample_start(&self) -> Option<DateTime<Utc>>;

    fn total_samples_count(&self) -> u64;

    /// Effective history length in days.
    ///
    /// The smaller of the observed lifespan and the number of samples
    /// expressed as days at one sample per minute, so that a sparse
    /// history spanning a long period is not over-trusted.
    fn history_length_days(&self) -> f64 {
        let lifespan_days = match (self.first_sample_start(), self.last_sample_start()) {
            (Some(first), Some(last)) => {
                (last - first).num_milliseconds().max(0) as f64 / (86_400.0 * 1000.0)
            }
            _ => 0.0,
        };
        let samples_days = self.total_samples_count() as f64 / SAMPLES_PER_DAY;
        lifespan_days.min(samples_days)
    }
}

/// Container name to usage history, for all containers of one workload
pub type ContainerHistories = HashMap<String, Arc<dyn ContainerUsageHistory>>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_history_length_is_min_of_lifespan_and_samples() {
        let start = Utc::now() - Duration::days(10);
        let mut history = SampleHistory::default();
        history.record(start, 100.0, 1000.0);
        history.record(start + Duration::days(2), 100.0, 1000.0);

        // Two samples across two days: sample count dominates
        assert!((history.history_length_days() - 2.0 / SAMPLES_PER_DAY).abs() < 1e-12);

        history.total_samples_count = (SAMPLES_PER_DAY * 30.0) as u64;
        assert!((history.history_length_days() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_history_has_zero_length() {
        let history = SampleHistory::default();
        assert_eq!(history.history_length_days(), 0.0);
    }
}
