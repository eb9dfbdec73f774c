//! Recommender configuration
//!
//! All tunables of the estimation pipeline and the feedback controller.
//! Every struct deserializes with per-field defaults, so an empty source
//! yields the stock configuration. Unknown keys are rejected.

use crate::error::ConfigError;
use crate::recommender::ContainerSelector;
use serde::Deserialize;
use std::time::Duration;

/// Fraction of usage added as the safety margin to the recommended request
pub const DEFAULT_MARGIN_FRACTION: f64 = 0.15;

/// Minimum CPU recommendation for a pod
pub const DEFAULT_POD_MIN_CPU_MILLICORES: f64 = 25.0;

/// Minimum memory recommendation for a pod
pub const DEFAULT_POD_MIN_MEMORY_MB: f64 = 250.0;

/// Deadline for fetching live telemetry for one container
pub const DEFAULT_METRIC_TIMEOUT: Duration = Duration::from_millis(2000);

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecommenderConfig {
    pub estimator: EstimatorConfig,
    pub controller: ControllerConfig,
    pub overrides: OverrideConfig,
}

impl RecommenderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.estimator.validate()?;
        self.controller.validate()?;
        self.overrides.validate()
    }
}

/// Confidence multiplier parameters, see [`crate::estimator::confidence_factor`]
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfidenceConfig {
    pub multiplier: f64,
    pub exponent: f64,
}

/// Percentiles and optional confidence scaling for one recommendation bound
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoundConfig {
    pub cpu_percentile: f64,
    pub memory_percentile: f64,
    #[serde(default)]
    pub confidence: Option<ConfidenceConfig>,
}

/// Historical estimation pipeline configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EstimatorConfig {
    pub margin_fraction: f64,
    pub pod_min_cpu_millicores: f64,
    pub pod_min_memory_mb: f64,
    pub target: BoundConfig,
    pub lower_bound: BoundConfig,
    pub upper_bound: BoundConfig,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            margin_fraction: DEFAULT_MARGIN_FRACTION,
            pod_min_cpu_millicores: DEFAULT_POD_MIN_CPU_MILLICORES,
            pod_min_memory_mb: DEFAULT_POD_MIN_MEMORY_MB,
            target: BoundConfig {
                cpu_percentile: 0.9,
                memory_percentile: 0.9,
                confidence: None,
            },
            // Shrinks the lower bound by (1 + 0.001/days)^-2 when history is
            // short: 5m -> x0.6, 30m -> x0.9, 60m -> x0.95.
            lower_bound: BoundConfig {
                cpu_percentile: 0.5,
                memory_percentile: 0.5,
                confidence: Some(ConfidenceConfig {
                    multiplier: 0.001,
                    exponent: -2.0,
                }),
            },
            // Inflates the upper bound by (1 + 1/days): 12h -> x3, 24h -> x2,
            // one week -> x1.14.
            upper_bound: BoundConfig {
                cpu_percentile: 0.95,
                memory_percentile: 0.95,
                confidence: Some(ConfidenceConfig {
                    multiplier: 1.0,
                    exponent: 1.0,
                }),
            },
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(
            self.margin_fraction.is_finite() && self.margin_fraction >= 0.0,
            "margin_fraction",
            self.margin_fraction,
            "must be a non-negative number",
        )?;
        ensure(
            self.pod_min_cpu_millicores.is_finite() && self.pod_min_cpu_millicores >= 0.0,
            "pod_min_cpu_millicores",
            self.pod_min_cpu_millicores,
            "must be a non-negative number",
        )?;
        ensure(
            self.pod_min_memory_mb.is_finite() && self.pod_min_memory_mb >= 0.0,
            "pod_min_memory_mb",
            self.pod_min_memory_mb,
            "must be a non-negative number",
        )?;

        for (name, bound) in [
            ("target", &self.target),
            ("lower_bound", &self.lower_bound),
            ("upper_bound", &self.upper_bound),
        ] {
            check_percentile(format!("{name}.cpu"), bound.cpu_percentile)?;
            check_percentile(format!("{name}.memory"), bound.memory_percentile)?;
            if let Some(confidence) = bound.confidence {
                ensure(
                    confidence.multiplier.is_finite() && confidence.multiplier >= 0.0,
                    "confidence.multiplier",
                    confidence.multiplier,
                    "must be a non-negative number",
                )?;
                ensure(
                    confidence.exponent.is_finite(),
                    "confidence.exponent",
                    confidence.exponent,
                    "must be finite",
                )?;
            }
        }
        Ok(())
    }
}

/// Feedback controller parameters
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// Nominal operating point
    pub p_nom: f64,
    /// Response time set point in milliseconds
    pub sla_ms: f64,
    /// Conservativeness of the controller, strictly between 0 and 1
    pub a: f64,
    /// Queuing model coefficients
    pub a1: f64,
    pub a2: f64,
    pub a3: f64,
    /// Maximum amount of cores to afford for the scaling
    pub core_max: f64,
    pub metric_timeout_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            p_nom: 0.8,
            sla_ms: 1000.0,
            a: 0.5,
            a1: 0.1963,
            a2: 0.002,
            a3: 0.5658,
            core_max: 1.0,
            metric_timeout_ms: DEFAULT_METRIC_TIMEOUT.as_millis() as u64,
        }
    }
}

impl ControllerConfig {
    pub fn metric_timeout(&self) -> Duration {
        Duration::from_millis(self.metric_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(
            self.p_nom > 0.0 && self.p_nom < 1.0,
            "p_nom",
            self.p_nom,
            "must be strictly between 0 and 1",
        )?;
        ensure(
            self.a > 0.0 && self.a < 1.0,
            "a",
            self.a,
            "must be strictly between 0 and 1",
        )?;
        ensure(
            self.sla_ms.is_finite() && self.sla_ms > 0.0,
            "sla_ms",
            self.sla_ms,
            "must be positive",
        )?;
        ensure(self.a1.is_finite(), "a1", self.a1, "must be finite")?;
        ensure(self.a2.is_finite(), "a2", self.a2, "must be finite")?;
        ensure(
            self.a3.is_finite() && self.a3 != 0.0,
            "a3",
            self.a3,
            "must be finite and non-zero",
        )?;
        ensure(
            self.core_max.is_finite() && self.core_max > 0.0,
            "core_max",
            self.core_max,
            "must be positive",
        )?;
        ensure(
            self.metric_timeout_ms > 0,
            "metric_timeout_ms",
            self.metric_timeout_ms as f64,
            "must be positive",
        )
    }
}

/// Which containers the controller drives, and where their telemetry lives
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverrideConfig {
    /// Selectors of the form `namespace/workload/container` (`*` matches
    /// anything) or a bare container name
    pub targets: Vec<String>,
    pub response_time_metric: String,
    pub request_count_metric: String,
    /// Namespace queried for telemetry; defaults to the workload's namespace
    pub metrics_namespace: Option<String>,
    /// Pod name queried for telemetry
    pub pod_name: String,
    /// Pod label whose value is the workload name. Telemetry queries select
    /// `<label>=<workload>`; an empty label queries every matching pod.
    pub workload_label: String,
}

impl Default for OverrideConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            response_time_metric: "response_time".to_string(),
            request_count_metric: "response_count".to_string(),
            metrics_namespace: None,
            pod_name: "*".to_string(),
            workload_label: "app".to_string(),
        }
    }
}

impl OverrideConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.response_time_metric.trim().is_empty() {
            return Err(ConfigError::EmptyMetricName("response_time_metric"));
        }
        if self.request_count_metric.trim().is_empty() {
            return Err(ConfigError::EmptyMetricName("request_count_metric"));
        }
        for target in &self.targets {
            ContainerSelector::parse(target)?;
        }
        Ok(())
    }
}

fn ensure(
    condition: bool,
    name: &'static str,
    value: f64,
    reason: &'static str,
) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            value,
            reason,
        })
    }
}

fn check_percentile(name: String, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidPercentile { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RecommenderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.estimator.margin_fraction, 0.15);
        assert_eq!(config.controller.sla_ms, 1000.0);
        assert_eq!(config.overrides.response_time_metric, "response_time");
        assert_eq!(config.overrides.workload_label, "app");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RecommenderConfig = serde_json::from_str(
            r#"{"controller": {"core_max": 2.0}, "overrides": {"targets": ["web"]}}"#,
        )
        .unwrap();
        assert_eq!(config.controller.core_max, 2.0);
        assert_eq!(config.controller.p_nom, 0.8);
        assert_eq!(config.estimator, EstimatorConfig::default());
        assert_eq!(config.overrides.targets, vec!["web".to_string()]);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: Result<RecommenderConfig, _> =
            serde_json::from_str(r#"{"estimator": {"gpu_percentile": 0.9}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_percentile_rejected() {
        let mut config = RecommenderConfig::default();
        config.estimator.upper_bound.cpu_percentile = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPercentile { name, .. }) if name == "upper_bound.cpu"
        ));
    }

    #[test]
    fn test_degenerate_controller_rejected() {
        let mut config = RecommenderConfig::default();
        config.controller.p_nom = 1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidParameter { name: "p_nom", .. })
        ));

        let mut config = RecommenderConfig::default();
        config.controller.core_max = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_metric_name_rejected() {
        let mut config = RecommenderConfig::default();
        config.overrides.request_count_metric = " ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyMetricName("request_count_metric"))
        ));
    }

    #[test]
    fn test_bad_selector_rejected() {
        let mut config = RecommenderConfig::default();
        config.overrides.targets = vec!["a/b".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSelector { .. })
        ));
    }
}
