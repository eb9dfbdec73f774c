//! Observability infrastructure for the recommender
//!
//! Provides:
//! - Prometheus metrics (pass latency, metric fetch latency, controller activity)
//! - Structured JSON logging with tracing

use crate::controller::{ControllerInput, ControllerOutcome};
use crate::models::{ContainerId, RecommendedContainerResources, WorkloadRef};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for pass and fetch latencies (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<RecommenderMetricsInner> = OnceLock::new();

struct RecommenderMetricsInner {
    pass_latency_seconds: Histogram,
    metric_fetch_latency_seconds: Histogram,
    containers_tracked: IntGauge,
    recommendations_total: IntCounterVec,
    controller_fallbacks_total: IntCounter,
    controller_singular_total: IntCounter,
    controller_saturated_total: IntCounter,
    history_load_errors_total: IntCounter,
}

impl RecommenderMetricsInner {
    fn new() -> Self {
        Self {
            pass_latency_seconds: register_histogram!(
                "pod_recommender_pass_latency_seconds",
                "Time spent computing recommendations for all tracked workloads",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register pass_latency_seconds"),

            metric_fetch_latency_seconds: register_histogram!(
                "pod_recommender_metric_fetch_latency_seconds",
                "Time spent fetching live telemetry for one container",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register metric_fetch_latency_seconds"),

            containers_tracked: register_int_gauge!(
                "pod_recommender_containers_tracked",
                "Number of containers holding feedback controller state"
            )
            .expect("Failed to register containers_tracked"),

            recommendations_total: register_int_counter_vec!(
                "pod_recommender_recommendations_total",
                "Container recommendations produced, by mode",
                &["mode"]
            )
            .expect("Failed to register recommendations_total"),

            controller_fallbacks_total: register_int_counter!(
                "pod_recommender_controller_fallbacks_total",
                "Controller steps skipped because telemetry was unavailable"
            )
            .expect("Failed to register controller_fallbacks_total"),

            controller_singular_total: register_int_counter!(
                "pod_recommender_controller_singular_total",
                "Controller steps whose model inversion was singular"
            )
            .expect("Failed to register controller_singular_total"),

            controller_saturated_total: register_int_counter!(
                "pod_recommender_controller_saturated_total",
                "Controller steps whose output was clamped to the core bounds"
            )
            .expect("Failed to register controller_saturated_total"),

            history_load_errors_total: register_int_counter!(
                "pod_recommender_history_load_errors_total",
                "Failed attempts to load usage histories"
            )
            .expect("Failed to register history_load_errors_total"),
        }
    }
}

/// Recommender metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct RecommenderMetrics {
    _private: (),
}

impl Default for RecommenderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RecommenderMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(RecommenderMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &RecommenderMetricsInner {
        GLOBAL_METRICS.get_or_init(RecommenderMetricsInner::new)
    }

    pub fn observe_pass_latency(&self, duration_secs: f64) {
        self.inner().pass_latency_seconds.observe(duration_secs);
    }

    pub fn observe_metric_fetch_latency(&self, duration_secs: f64) {
        self.inner().metric_fetch_latency_seconds.observe(duration_secs);
    }

    pub fn set_containers_tracked(&self, count: usize) {
        self.inner().containers_tracked.set(count as i64);
    }

    /// Count one container recommendation under `mode`
    pub fn inc_recommendations(&self, mode: &str) {
        self.inner()
            .recommendations_total
            .with_label_values(&[mode])
            .inc();
    }

    pub fn inc_controller_fallbacks(&self) {
        self.inner().controller_fallbacks_total.inc();
    }

    /// Record the saturation flags of a controller step
    pub fn record_controller_step(&self, outcome: &ControllerOutcome) {
        if outcome.singular {
            self.inner().controller_singular_total.inc();
        }
        if outcome.saturated {
            self.inner().controller_saturated_total.inc();
        }
    }

    pub fn inc_history_load_errors(&self) {
        self.inner().history_load_errors_total.inc();
    }
}

/// Structured logger for recommender events
///
/// Every event carries an `event` field so log pipelines can filter on it.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn log_startup(&self, version: &str, interval_secs: u64, override_targets: usize) {
        info!(
            event = "recommender_started",
            instance = %self.instance,
            version = %version,
            interval_secs = interval_secs,
            override_targets = override_targets,
            "Pod resource recommender started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "recommender_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Pod resource recommender shutting down"
        );
    }

    /// Log the final recommendation for one container
    pub fn log_recommendation(
        &self,
        id: &ContainerId,
        mode: &str,
        resources: &RecommendedContainerResources,
    ) {
        debug!(
            event = "recommendation_generated",
            instance = %self.instance,
            container = %id,
            mode = %mode,
            target_cpu_millicores = resources.target.cpu.value(),
            target_memory_bytes = resources.target.memory.value(),
            lower_cpu_millicores = resources.lower_bound.cpu.value(),
            lower_memory_bytes = resources.lower_bound.memory.value(),
            upper_cpu_millicores = resources.upper_bound.cpu.value(),
            upper_memory_bytes = resources.upper_bound.memory.value(),
            "Generated container recommendation"
        );
    }

    /// Log every intermediate value of a controller step
    pub fn log_controller_step(
        &self,
        id: &ContainerId,
        input: &ControllerInput,
        outcome: &ControllerOutcome,
    ) {
        info!(
            event = "controller_step",
            instance = %self.instance,
            container = %id,
            requests = input.requests,
            response_time_ms = input.response_time_ms,
            error = outcome.error,
            ke = outcome.proportional,
            ui = outcome.integral,
            ut = outcome.utilization,
            target_core = outcome.target_cores,
            approx_core = outcome.cores,
            approx_ut = outcome.realized_utilization,
            next_ui = outcome.next_integral,
            singular = outcome.singular,
            saturated = outcome.saturated,
            "Feedback controller step"
        );
    }

    pub fn log_controller_fallback(&self, id: &ContainerId, reason: &str) {
        warn!(
            event = "controller_fallback",
            instance = %self.instance,
            container = %id,
            reason = %reason,
            "Telemetry unavailable, using estimator-only recommendation"
        );
    }

    pub fn log_pass_completed(
        &self,
        workloads: usize,
        containers: usize,
        fallbacks: u64,
        duration_ms: u64,
    ) {
        info!(
            event = "pass_completed",
            instance = %self.instance,
            workloads = workloads,
            containers = containers,
            fallbacks = fallbacks,
            duration_ms = duration_ms,
            "Recommendation pass completed"
        );
    }

    pub fn log_workload(&self, workload: &WorkloadRef, containers: usize) {
        debug!(
            instance = %self.instance,
            workload = %workload,
            containers = containers,
            "Recommending workload"
        );
    }
}
