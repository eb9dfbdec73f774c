use super::ResourceEstimator;
use crate::history::ContainerUsageHistory;
use crate::models::{ResourceKind, Resources};

/// Base estimator returning a fixed percentile of historical usage per resource
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileEstimator {
    pub cpu_percentile: f64,
    pub memory_percentile: f64,
}

impl PercentileEstimator {
    pub fn new(cpu_percentile: f64, memory_percentile: f64) -> Self {
        Self {
            cpu_percentile,
            memory_percentile,
        }
    }
}

impl ResourceEstimator for PercentileEstimator {
    fn estimate(&self, history: &dyn ContainerUsageHistory) -> Resources {
        Resources::new(
            history.percentile(ResourceKind::Cpu, self.cpu_percentile),
            history.percentile(ResourceKind::Memory, self.memory_percentile),
        )
    }
}
