//! Ordered estimation pipeline
//!
//! A chain starts from a percentile estimate and applies scaling stages in
//! the order they were added. The minimum-resource floor is kept apart
//! from the stages and always applied last, so it stays a hard lower bound
//! no matter how the chain was assembled.

use super::{PercentileEstimator, ResourceEstimator};
use crate::history::ContainerUsageHistory;
use crate::models::Resources;

/// A scaling stage applied on top of the base estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    /// Scale every resource by `1 + fraction`
    Margin { fraction: f64 },
    /// Scale by `(1 + multiplier / history_days) ^ exponent`
    ConfidenceMultiplier { multiplier: f64, exponent: f64 },
}

impl Adjustment {
    pub fn factor(&self, history: &dyn ContainerUsageHistory) -> f64 {
        match *self {
            Adjustment::Margin { fraction } => 1.0 + fraction,
            Adjustment::ConfidenceMultiplier {
                multiplier,
                exponent,
            } => confidence_factor(multiplier, exponent, history.history_length_days()),
        }
    }

    pub fn apply(&self, resources: Resources, history: &dyn ContainerUsageHistory) -> Resources {
        resources.scale(self.factor(history))
    }
}

/// Confidence multiplier for a history of `history_days` days.
///
/// Converges to 1 as history grows. With no history a positive exponent
/// yields infinity (amounts saturate) and a negative one yields zero.
pub fn confidence_factor(multiplier: f64, exponent: f64, history_days: f64) -> f64 {
    if multiplier == 0.0 {
        return 1.0;
    }
    (1.0 + multiplier / history_days.max(0.0)).powf(exponent)
}

/// Percentile estimate followed by ordered adjustments and an optional floor
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorChain {
    base: PercentileEstimator,
    stages: Vec<Adjustment>,
    min_resources: Option<Resources>,
}

impl EstimatorChain {
    pub fn new(base: PercentileEstimator) -> Self {
        Self {
            base,
            stages: Vec::new(),
            min_resources: None,
        }
    }

    pub fn with_margin(mut self, fraction: f64) -> Self {
        self.stages.push(Adjustment::Margin { fraction });
        self
    }

    pub fn with_confidence_multiplier(mut self, multiplier: f64, exponent: f64) -> Self {
        self.stages.push(Adjustment::ConfidenceMultiplier {
            multiplier,
            exponent,
        });
        self
    }

    /// Set the floor, replacing any previous one
    pub fn with_min_resources(mut self, min_resources: Resources) -> Self {
        self.min_resources = Some(min_resources);
        self
    }

    pub fn stages(&self) -> &[Adjustment] {
        &self.stages
    }

    pub fn min_resources(&self) -> Option<Resources> {
        self.min_resources
    }
}

impl ResourceEstimator for EstimatorChain {
    fn estimate(&self, history: &dyn ContainerUsageHistory) -> Resources {
        let scaled = self
            .stages
            .iter()
            .fold(self.base.estimate(history), |resources, stage| {
                stage.apply(resources, history)
            });

        match self.min_resources {
            Some(floor) => scaled.max(floor),
            None => scaled,
        }
    }
}
