//! Error types shared across the recommender

use std::time::Duration;
use thiserror::Error;

/// Failure to obtain live telemetry for a container.
///
/// Every variant is recoverable: the affected container falls back to the
/// estimator-only recommendation for the current pass.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("metric query timed out after {0:?}")]
    Timeout(Duration),

    #[error("metric request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("metrics API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode metric response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid metrics endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("metric {metric} returned no samples")]
    NoSamples { metric: String },

    #[error("no metric source configured")]
    Unconfigured,

    #[error("metric source error: {0}")]
    Source(String),
}

/// Invalid recommender configuration. Raised only while building the
/// pipeline at startup, never during a pass.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} percentile must be within [0, 1], got {value}")]
    InvalidPercentile { name: String, value: f64 },

    #[error("invalid value for {name}: {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("metric name for {0} must not be empty")]
    EmptyMetricName(&'static str),

    #[error("unknown resource kind: {0}")]
    UnknownResource(String),

    #[error("invalid override selector {selector:?}: {reason}")]
    InvalidSelector {
        selector: String,
        reason: &'static str,
    },
}
