//! Pod resource recommendation
//!
//! [`PodResourceRecommender`] combines the historical estimator chains with
//! the feedback controller. Every container gets an estimator-only
//! recommendation; containers selected by the [`OverridePolicy`] have their
//! target CPU replaced by the controller output whenever live telemetry is
//! available. A container whose telemetry cannot be read falls back to the
//! estimator-only result for that pass and its controller state is left as
//! it was.

mod policy;
mod scheduler;

pub use policy::{
    ContainerSelector, OverridePolicy, PredicatePolicy, RecommendationMode, SelectorPolicy,
};
pub use scheduler::{RecommendationLoop, WorkloadRecommendation, DEFAULT_PASS_INTERVAL};

use crate::config::{OverrideConfig, RecommenderConfig};
use crate::controller::{
    ControllerInput, ControllerOutcome, ControllerState, ControllerStates, FeedbackController,
};
use crate::error::{ConfigError, TelemetryError};
use crate::estimator::{pod_min_resources, EstimatorSet};
use crate::history::ContainerHistories;
use crate::models::{
    ContainerId, RecommendedPodResources, ResourceAmount, Resources, WorkloadRef,
};
use crate::observability::{RecommenderMetrics, StructuredLogger};
use crate::telemetry::{MetricSelector, MetricSource, TelemetryReader};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Computes recommendations for the containers of one workload at a time
pub struct PodResourceRecommender {
    estimators: EstimatorSet,
    pod_min: Resources,
    controller: FeedbackController,
    policy: Arc<dyn OverridePolicy>,
    telemetry: Option<TelemetryReader>,
    overrides: OverrideConfig,
    states: ControllerStates,
    metrics: RecommenderMetrics,
    logger: StructuredLogger,
    fallbacks: AtomicU64,
}

impl PodResourceRecommender {
    /// Build the recommender from a configuration, validating it first.
    ///
    /// Without a metric source every overridden container falls back to the
    /// estimator-only path, see [`Self::with_metric_source`].
    pub fn new(config: &RecommenderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy = SelectorPolicy::from_config(&config.overrides)?;

        Ok(Self {
            estimators: EstimatorSet::from_config(&config.estimator),
            pod_min: pod_min_resources(&config.estimator),
            controller: FeedbackController::new(config.controller.clone()),
            policy: Arc::new(policy),
            telemetry: None,
            overrides: config.overrides.clone(),
            states: ControllerStates::new(),
            metrics: RecommenderMetrics::new(),
            logger: StructuredLogger::new("pod-recommender"),
            fallbacks: AtomicU64::new(0),
        })
    }

    /// Read controller telemetry from `source`
    pub fn with_metric_source(mut self, source: Arc<dyn MetricSource>) -> Self {
        self.telemetry = Some(TelemetryReader::new(
            source,
            self.overrides.response_time_metric.clone(),
            self.overrides.request_count_metric.clone(),
            self.controller.config().metric_timeout(),
        ));
        self
    }

    /// Replace the selector policy built from configuration
    pub fn with_policy(mut self, policy: Arc<dyn OverridePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Recommend resources for every container of `workload`.
    ///
    /// The result has exactly the keys of `containers`. Controller state of
    /// containers that are no longer part of the workload is dropped.
    pub async fn recommend(
        &self,
        workload: &WorkloadRef,
        containers: &ContainerHistories,
    ) -> RecommendedPodResources {
        let mut names: Vec<&str> = containers.keys().map(String::as_str).collect();
        names.sort_unstable();
        self.states.retain_containers(workload, &names);

        let mut recommendations = RecommendedPodResources::with_capacity(containers.len());
        if names.is_empty() {
            self.metrics.set_containers_tracked(self.states.len());
            return recommendations;
        }
        self.logger.log_workload(workload, names.len());

        // The pod floor is shared evenly between the containers
        let floor = self.pod_min.split(names.len());
        let estimators = self.estimators.with_min_resources(floor);

        for name in names {
            let Some(history) = containers.get(name) else {
                continue;
            };
            let id = workload.container(name);
            let mut resources = estimators.estimate(history.as_ref());

            let mut mode = self.policy.mode(&id);
            if mode == RecommendationMode::ControllerOverride {
                match self.controller_step(&id, floor.cpu.as_cores()).await {
                    Ok(outcome) => resources.target.cpu = ResourceAmount::from_cores(outcome.cores),
                    Err(e) => {
                        self.fallbacks.fetch_add(1, Ordering::Relaxed);
                        self.metrics.inc_controller_fallbacks();
                        self.logger.log_controller_fallback(&id, &e.to_string());
                        mode = RecommendationMode::EstimatorOnly;
                    }
                }
            }

            self.metrics.inc_recommendations(mode.as_str());
            self.logger.log_recommendation(&id, mode.as_str(), &resources);
            recommendations.insert(name.to_string(), resources);
        }

        self.metrics.set_containers_tracked(self.states.len());
        recommendations
    }

    /// Fetch telemetry and run one controller step for `id`.
    ///
    /// The identity's lock is held from the fetch to the commit, so steps of
    /// one container never interleave. Nothing is committed on error.
    async fn controller_step(
        &self,
        id: &ContainerId,
        core_min: f64,
    ) -> Result<ControllerOutcome, TelemetryError> {
        let reader = self.telemetry.as_ref().ok_or(TelemetryError::Unconfigured)?;
        let selector = self.metric_selector(id);

        let handle = self.states.entry(id);
        let mut state = handle.lock().await;

        let started = Instant::now();
        let telemetry = reader.read(&selector).await;
        self.metrics
            .observe_metric_fetch_latency(started.elapsed().as_secs_f64());
        let telemetry = match telemetry {
            Ok(telemetry) => telemetry,
            Err(e) => {
                drop(state);
                self.states.discard_unstepped(id, &handle);
                return Err(e);
            }
        };

        let input = ControllerInput {
            response_time_ms: telemetry.response_time_ms,
            requests: state.request_delta(telemetry.request_count),
        };
        let outcome = self.controller.step(&state, input, core_min);
        state.commit(&outcome, telemetry.request_count);

        self.metrics.record_controller_step(&outcome);
        self.logger.log_controller_step(id, &input, &outcome);
        Ok(outcome)
    }

    /// Telemetry selector for the pods of `id`'s workload
    fn metric_selector(&self, id: &ContainerId) -> MetricSelector {
        let label = self.overrides.workload_label.trim();
        MetricSelector {
            namespace: self
                .overrides
                .metrics_namespace
                .clone()
                .unwrap_or_else(|| id.namespace.clone()),
            pod: self.overrides.pod_name.clone(),
            label_selector: (!label.is_empty()).then(|| format!("{label}={}", id.workload)),
        }
    }

    /// Drop controller state of every workload not in `live`
    pub fn retain_workloads(&self, live: &[WorkloadRef]) {
        self.states.retain_workloads(live);
        self.metrics.set_containers_tracked(self.states.len());
    }

    /// Drop the controller state of one container
    pub fn forget(&self, id: &ContainerId) -> bool {
        let removed = self.states.remove(id);
        if removed {
            debug!(container = %id, "Forgot controller state");
        }
        removed
    }

    /// Identities currently holding controller state
    pub fn tracked_identities(&self) -> Vec<ContainerId> {
        self.states.identities()
    }

    pub async fn controller_state(&self, id: &ContainerId) -> Option<ControllerState> {
        self.states.get(id).await
    }

    /// Telemetry fallbacks since startup
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }
}
