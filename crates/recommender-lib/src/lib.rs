//! Pod resource recommendation library
//!
//! This crate provides:
//! - Percentile-based estimation of CPU and memory from usage history
//! - A response-time feedback controller overriding the CPU target of selected containers
//! - Live telemetry from the Kubernetes custom metrics API
//! - A periodic recommendation loop with health checks and observability

pub mod config;
pub mod controller;
pub mod error;
pub mod estimator;
pub mod health;
pub mod history;
pub mod models;
pub mod observability;
pub mod recommender;
pub mod telemetry;

pub use config::RecommenderConfig;
pub use error::{ConfigError, TelemetryError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{RecommenderMetrics, StructuredLogger};
pub use recommender::{PodResourceRecommender, RecommendationLoop, WorkloadRecommendation};
