//! Live service telemetry for controller-driven containers
//!
//! [`MetricSource`] is the boundary to a monitoring backend. The
//! [`TelemetryReader`] pulls the two series the feedback controller needs
//! (mean response time and cumulative request count) under one deadline.

mod custom_metrics;

pub use custom_metrics::{
    CustomMetricsClient, DescribedObject, ListMetadata, MetricValueItem, MetricValueList,
};

use crate::error::TelemetryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Objects whose metrics are queried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSelector {
    pub namespace: String,
    /// Pod name, or `*` for every pod in the namespace
    pub pod: String,
    /// Label selector narrowing the pods, e.g. `app=frontend`
    pub label_selector: Option<String>,
}

/// One metric value as reported by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub described_object: DescribedObject,
    pub metric_name: String,
    pub timestamp: DateTime<Utc>,
    /// Raw value, possibly with a trailing `m` (milli-units)
    pub value: String,
}

impl MetricSample {
    pub fn parsed_value(&self) -> f64 {
        parse_value(&self.value)
    }
}

/// Trait for monitoring backends serving named metrics
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Samples of `metric_name` for `selector`, in backend order
    async fn query(
        &self,
        selector: &MetricSelector,
        metric_name: &str,
    ) -> Result<Vec<MetricSample>, TelemetryError>;
}

/// Parse a metric value string.
///
/// A trailing `m` scales by 0.001. Anything that does not parse to a
/// finite, non-negative number yields `0.0`.
pub fn parse_value(value: &str) -> f64 {
    let value = value.trim();
    let (digits, multiplier) = match value.strip_suffix('m') {
        Some(rest) => (rest, 0.001),
        None => (value, 1.0),
    };

    match digits.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => v * multiplier,
        _ => 0.0,
    }
}

/// Telemetry for one controller step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    /// Mean response time in milliseconds
    pub response_time_ms: f64,
    /// Cumulative request count
    pub request_count: f64,
}

/// Fetches controller telemetry from a [`MetricSource`] with a deadline
#[derive(Clone)]
pub struct TelemetryReader {
    source: Arc<dyn MetricSource>,
    response_time_metric: String,
    request_count_metric: String,
    timeout: Duration,
}

impl TelemetryReader {
    pub fn new(
        source: Arc<dyn MetricSource>,
        response_time_metric: impl Into<String>,
        request_count_metric: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            response_time_metric: response_time_metric.into(),
            request_count_metric: request_count_metric.into(),
            timeout,
        }
    }

    /// Read both series. Exceeding the deadline is a [`TelemetryError::Timeout`].
    pub async fn read(&self, selector: &MetricSelector) -> Result<Telemetry, TelemetryError> {
        let fetch = async {
            let response_time_ms = self.first_value(selector, &self.response_time_metric).await?;
            let request_count = self.first_value(selector, &self.request_count_metric).await?;
            Ok(Telemetry {
                response_time_ms,
                request_count,
            })
        };

        match tokio::time::timeout(self.timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(TelemetryError::Timeout(self.timeout)),
        }
    }

    async fn first_value(
        &self,
        selector: &MetricSelector,
        metric: &str,
    ) -> Result<f64, TelemetryError> {
        let samples = self.source.query(selector, metric).await?;
        let sample = samples.first().ok_or_else(|| TelemetryError::NoSamples {
            metric: metric.to_string(),
        })?;
        let value = sample.parsed_value();
        debug!(
            metric = %metric,
            object = %sample.described_object.name,
            raw = %sample.value,
            value = value,
            "Read metric sample"
        );
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// In-memory metric source returning fixed values per metric
    struct StaticSource {
        values: HashMap<String, Vec<String>>,
        delay: Option<Duration>,
    }

    impl StaticSource {
        fn new(values: Vec<(&str, Vec<&str>)>) -> Self {
            Self {
                values: values
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.into_iter().map(String::from).collect()))
                    .collect(),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl MetricSource for StaticSource {
        async fn query(
            &self,
            selector: &MetricSelector,
            metric_name: &str,
        ) -> Result<Vec<MetricSample>, TelemetryError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let values = self
                .values
                .get(metric_name)
                .cloned()
                .ok_or_else(|| TelemetryError::Source("unknown metric".into()))?;
            Ok(values
                .into_iter()
                .map(|value| MetricSample {
                    described_object: DescribedObject {
                        kind: "Pod".to_string(),
                        namespace: selector.namespace.clone(),
                        name: "web-0".to_string(),
                        api_version: "v1".to_string(),
                    },
                    metric_name: metric_name.to_string(),
                    timestamp: Utc::now(),
                    value,
                })
                .collect())
        }
    }

    fn selector() -> MetricSelector {
        MetricSelector {
            namespace: "shop".to_string(),
            pod: "*".to_string(),
            label_selector: None,
        }
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("abc"), 0.0);
        assert!((parse_value("12m") - 0.012).abs() < 1e-12);
        assert_eq!(parse_value("-5"), 0.0);
        assert_eq!(parse_value("-5m"), 0.0);
        assert_eq!(parse_value("42"), 42.0);
        assert_eq!(parse_value("1.5e3"), 1500.0);
        assert_eq!(parse_value(""), 0.0);
        assert_eq!(parse_value("m"), 0.0);
        assert_eq!(parse_value("inf"), 0.0);
        assert_eq!(parse_value("NaN"), 0.0);
    }

    #[tokio::test]
    async fn test_reader_uses_first_sample() {
        let source = StaticSource::new(vec![
            ("response_time", vec!["850500m", "10"]),
            ("response_count", vec!["1200"]),
        ]);
        let reader = TelemetryReader::new(
            Arc::new(source),
            "response_time",
            "response_count",
            Duration::from_secs(1),
        );

        let telemetry = reader.read(&selector()).await.unwrap();
        assert!((telemetry.response_time_ms - 850.5).abs() < 1e-9);
        assert_eq!(telemetry.request_count, 1200.0);
    }

    #[tokio::test]
    async fn test_reader_reports_missing_samples() {
        let source = StaticSource::new(vec![
            ("response_time", vec![]),
            ("response_count", vec!["1"]),
        ]);
        let reader = TelemetryReader::new(
            Arc::new(source),
            "response_time",
            "response_count",
            Duration::from_secs(1),
        );

        let err = reader.read(&selector()).await.unwrap_err();
        assert!(matches!(err, TelemetryError::NoSamples { metric } if metric == "response_time"));
    }

    #[tokio::test]
    async fn test_reader_times_out() {
        let mut source = StaticSource::new(vec![
            ("response_time", vec!["1"]),
            ("response_count", vec!["1"]),
        ]);
        source.delay = Some(Duration::from_secs(5));
        let reader = TelemetryReader::new(
            Arc::new(source),
            "response_time",
            "response_count",
            Duration::from_millis(20),
        );

        let err = reader.read(&selector()).await.unwrap_err();
        assert!(matches!(err, TelemetryError::Timeout(_)));
    }
}
