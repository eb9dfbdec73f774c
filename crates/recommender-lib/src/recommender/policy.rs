//! Selection of containers driven by the feedback controller

use crate::config::OverrideConfig;
use crate::error::ConfigError;
use crate::models::ContainerId;
use std::fmt;
use std::str::FromStr;

const WILDCARD: &str = "*";

/// How the CPU target of a container is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecommendationMode {
    /// All bounds come from the historical estimators
    EstimatorOnly,
    /// Target CPU comes from the feedback controller
    ControllerOverride,
}

impl RecommendationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationMode::EstimatorOnly => "estimator_only",
            RecommendationMode::ControllerOverride => "controller_override",
        }
    }
}

impl fmt::Display for RecommendationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides the [`RecommendationMode`] of each container
pub trait OverridePolicy: Send + Sync {
    fn mode(&self, id: &ContainerId) -> RecommendationMode;
}

/// Pattern over container identities.
///
/// Either `namespace/workload/container`, where any segment may be `*`, or a
/// bare container name matching that container in every workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSelector {
    namespace: Option<String>,
    workload: Option<String>,
    container: Option<String>,
}

impl ContainerSelector {
    pub fn parse(selector: &str) -> Result<Self, ConfigError> {
        let invalid = |reason| ConfigError::InvalidSelector {
            selector: selector.to_string(),
            reason,
        };

        let segments: Vec<&str> = selector.trim().split('/').map(str::trim).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(invalid("segments must not be empty"));
        }

        let pattern = |s: &str| (s != WILDCARD).then(|| s.to_string());
        match segments.as_slice() {
            [container] => Ok(Self {
                namespace: None,
                workload: None,
                container: pattern(*container),
            }),
            [namespace, workload, container] => Ok(Self {
                namespace: pattern(*namespace),
                workload: pattern(*workload),
                container: pattern(*container),
            }),
            _ => Err(invalid("expected `container` or `namespace/workload/container`")),
        }
    }

    pub fn matches(&self, id: &ContainerId) -> bool {
        fn segment(pattern: &Option<String>, value: &str) -> bool {
            pattern.as_deref().map_or(true, |p| p == value)
        }

        segment(&self.namespace, &id.namespace)
            && segment(&self.workload, &id.workload)
            && segment(&self.container, &id.container)
    }
}

impl FromStr for ContainerSelector {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Overrides every container matched by one of the configured selectors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorPolicy {
    selectors: Vec<ContainerSelector>,
}

impl SelectorPolicy {
    pub fn new(selectors: Vec<ContainerSelector>) -> Self {
        Self { selectors }
    }

    pub fn from_config(config: &OverrideConfig) -> Result<Self, ConfigError> {
        let selectors = config
            .targets
            .iter()
            .map(|target| ContainerSelector::parse(target))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(selectors))
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }
}

impl OverridePolicy for SelectorPolicy {
    fn mode(&self, id: &ContainerId) -> RecommendationMode {
        if self.selectors.iter().any(|s| s.matches(id)) {
            RecommendationMode::ControllerOverride
        } else {
            RecommendationMode::EstimatorOnly
        }
    }
}

/// Policy backed by an arbitrary predicate over identities
pub struct PredicatePolicy<F> {
    predicate: F,
}

impl<F> PredicatePolicy<F>
where
    F: Fn(&ContainerId) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> OverridePolicy for PredicatePolicy<F>
where
    F: Fn(&ContainerId) -> bool + Send + Sync,
{
    fn mode(&self, id: &ContainerId) -> RecommendationMode {
        if (self.predicate)(id) {
            RecommendationMode::ControllerOverride
        } else {
            RecommendationMode::EstimatorOnly
        }
    }
}
