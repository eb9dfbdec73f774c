//! Sample-backed usage history

use super::ContainerUsageHistory;
use crate::models::{ResourceAmount, ResourceKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Usage history holding raw samples.
///
/// CPU samples are in millicores, memory samples in bytes. Percentiles use
/// the nearest-rank method over the sorted samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleHistory {
    #[serde(default)]
    pub cpu_millicores: Vec<f64>,
    #[serde(default)]
    pub memory_bytes: Vec<f64>,
    #[serde(default)]
    pub first_sample_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sample_start: Option<DateTime<Utc>>,
    /// Total samples aggregated into this history. May exceed the retained
    /// sample count when older samples were folded away.
    #[serde(default)]
    pub total_samples_count: u64,
}

impl SampleHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one CPU and memory observation taken at `timestamp`
    pub fn record(&mut self, timestamp: DateTime<Utc>, cpu_millicores: f64, memory_bytes: f64) {
        self.cpu_millicores.push(cpu_millicores);
        self.memory_bytes.push(memory_bytes);
        self.total_samples_count += 1;

        if self.first_sample_start.map_or(true, |first| timestamp < first) {
            self.first_sample_start = Some(timestamp);
        }
        if self.last_sample_start.map_or(true, |last| timestamp > last) {
            self.last_sample_start = Some(timestamp);
        }
    }

    fn samples(&self, kind: ResourceKind) -> &[f64] {
        match kind {
            ResourceKind::Cpu => &self.cpu_millicores,
            ResourceKind::Memory => &self.memory_bytes,
        }
    }
}

impl ContainerUsageHistory for SampleHistory {
    fn percentile(&self, kind: ResourceKind, percentile: f64) -> ResourceAmount {
        ResourceAmount::from_float(nearest_rank(self.samples(kind), percentile))
    }

    fn first_sample_start(&self) -> Option<DateTime<Utc>> {
        self.first_sample_start
    }

    fn last_sample_start(&self) -> Option<DateTime<Utc>> {
        self.last_sample_start
    }

    fn total_samples_count(&self) -> u64 {
        let retained = self.cpu_millicores.len().max(self.memory_bytes.len()) as u64;
        self.total_samples_count.max(retained)
    }
}

fn nearest_rank(values: &[f64], percentile: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let p = if percentile.is_nan() { 0.0 } else { percentile.clamp(0.0, 1.0) };
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn history_with_cpu(values: &[f64]) -> SampleHistory {
        let start = Utc::now();
        let mut history = SampleHistory::new();
        for (i, v) in values.iter().enumerate() {
            history.record(start + Duration::minutes(i as i64), *v, *v * 1_000_000.0);
        }
        history
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let history = history_with_cpu(&[10.0, 1.0, 9.0, 2.0, 8.0, 3.0, 7.0, 4.0, 6.0, 5.0]);
        assert_eq!(history.percentile(ResourceKind::Cpu, 0.5).value(), 5);
        assert_eq!(history.percentile(ResourceKind::Cpu, 0.9).value(), 9);
        assert_eq!(history.percentile(ResourceKind::Cpu, 0.95).value(), 10);
        assert_eq!(history.percentile(ResourceKind::Cpu, 0.0).value(), 1);
        assert_eq!(history.percentile(ResourceKind::Memory, 0.5).value(), 5_000_000);
    }

    #[test]
    fn test_percentile_is_monotonic() {
        let history = history_with_cpu(&[3.0, 40.0, 7.0, 120.0, 15.0, 66.0]);
        let mut previous = ResourceAmount::ZERO;
        for step in 0..=20 {
            let current = history.percentile(ResourceKind::Cpu, step as f64 / 20.0);
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn test_empty_history_percentile_is_zero() {
        let history = SampleHistory::new();
        assert_eq!(history.percentile(ResourceKind::Cpu, 0.9), ResourceAmount::ZERO);
        assert_eq!(history.total_samples_count(), 0);
    }

    #[test]
    fn test_record_tracks_sample_window() {
        let start = Utc::now();
        let mut history = SampleHistory::new();
        history.record(start, 1.0, 1.0);
        history.record(start - Duration::hours(1), 1.0, 1.0);
        history.record(start + Duration::hours(1), 1.0, 1.0);

        assert_eq!(history.first_sample_start, Some(start - Duration::hours(1)));
        assert_eq!(history.last_sample_start, Some(start + Duration::hours(1)));
        assert_eq!(history.total_samples_count(), 3);
    }
}
