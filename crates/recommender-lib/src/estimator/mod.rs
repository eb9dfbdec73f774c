//! Historical resource estimation
//!
//! Three independently configured [`EstimatorChain`]s produce the target,
//! lower bound and upper bound of a recommendation from a container's usage
//! history.

mod chain;
mod percentile;

pub use chain::{confidence_factor, Adjustment, EstimatorChain};
pub use percentile::PercentileEstimator;

use crate::config::{BoundConfig, EstimatorConfig};
use crate::history::ContainerUsageHistory;
use crate::models::{RecommendedContainerResources, ResourceAmount, Resources};

/// Trait for estimators computing a resource vector from usage history
pub trait ResourceEstimator: Send + Sync {
    fn estimate(&self, history: &dyn ContainerUsageHistory) -> Resources;
}

/// Target, lower bound and upper bound estimators
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorSet {
    pub target: EstimatorChain,
    pub lower_bound: EstimatorChain,
    pub upper_bound: EstimatorChain,
}

impl EstimatorSet {
    /// Build the three chains from configuration. Expects a validated config.
    pub fn from_config(config: &EstimatorConfig) -> Self {
        let build = |bound: &BoundConfig| {
            let chain = EstimatorChain::new(PercentileEstimator::new(
                bound.cpu_percentile,
                bound.memory_percentile,
            ))
            .with_margin(config.margin_fraction);
            match bound.confidence {
                Some(c) => chain.with_confidence_multiplier(c.multiplier, c.exponent),
                None => chain,
            }
        };

        Self {
            target: build(&config.target),
            lower_bound: build(&config.lower_bound),
            upper_bound: build(&config.upper_bound),
        }
    }

    /// Copy of this set with `floor` applied to all three chains
    pub fn with_min_resources(&self, floor: Resources) -> Self {
        Self {
            target: self.target.clone().with_min_resources(floor),
            lower_bound: self.lower_bound.clone().with_min_resources(floor),
            upper_bound: self.upper_bound.clone().with_min_resources(floor),
        }
    }

    pub fn estimate(&self, history: &dyn ContainerUsageHistory) -> RecommendedContainerResources {
        RecommendedContainerResources {
            target: self.target.estimate(history),
            lower_bound: self.lower_bound.estimate(history),
            upper_bound: self.upper_bound.estimate(history),
        }
    }
}

/// Pod-level minimum resources from configuration
pub fn pod_min_resources(config: &EstimatorConfig) -> Resources {
    Resources::new(
        ResourceAmount::from_millicores(config.pod_min_cpu_millicores),
        ResourceAmount::from_megabytes(config.pod_min_memory_mb),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::SampleHistory;
    use chrono::{Duration, Utc};

    fn week_of_history() -> SampleHistory {
        let start = Utc::now() - Duration::days(7);
        let mut history = SampleHistory::new();
        for minute in 0..(7 * 24 * 60) {
            let cpu = (minute % 100) as f64 * 4.0;
            let memory = 100_000_000.0 + (minute % 50) as f64 * 1_000_000.0;
            history.record(start + Duration::minutes(minute), cpu, memory);
        }
        history
    }

    #[test]
    fn test_default_chains_match_configuration() {
        let set = EstimatorSet::from_config(&EstimatorConfig::default());

        assert_eq!(set.target.stages(), &[Adjustment::Margin { fraction: 0.15 }]);
        assert_eq!(
            set.lower_bound.stages()[1],
            Adjustment::ConfidenceMultiplier {
                multiplier: 0.001,
                exponent: -2.0
            }
        );
        assert_eq!(
            set.upper_bound.stages()[1],
            Adjustment::ConfidenceMultiplier {
                multiplier: 1.0,
                exponent: 1.0
            }
        );
        assert!(set.target.min_resources().is_none());
    }

    #[test]
    fn test_bounds_are_ordered() {
        let set = EstimatorSet::from_config(&EstimatorConfig::default());
        let r = set.estimate(&week_of_history());

        assert!(r.lower_bound.cpu <= r.target.cpu && r.target.cpu <= r.upper_bound.cpu);
        assert!(r.lower_bound.memory <= r.target.memory && r.target.memory <= r.upper_bound.memory);
    }

    #[test]
    fn test_floor_applies_to_all_bounds() {
        let floor = Resources::new(ResourceAmount::new(5_000), ResourceAmount::new(1 << 40));
        let set = EstimatorSet::from_config(&EstimatorConfig::default()).with_min_resources(floor);
        let r = set.estimate(&week_of_history());

        for bound in [r.target, r.lower_bound, r.upper_bound] {
            assert!(bound.cpu >= floor.cpu);
            assert!(bound.memory >= floor.memory);
        }
    }

    #[test]
    fn test_pod_min_resources_units() {
        let floor = pod_min_resources(&EstimatorConfig::default());
        assert_eq!(floor.cpu.value(), 25);
        assert_eq!(floor.memory.value(), 250 * 1024 * 1024);
    }
}
