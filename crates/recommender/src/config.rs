//! Process configuration

use anyhow::{Context, Result};
use recommender_lib::RecommenderConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming an optional configuration file
pub const CONFIG_PATH_ENV: &str = "RECOMMENDER_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Instance name used in structured logs
    #[serde(default = "default_instance")]
    pub instance: String,

    /// Port of the health, metrics and recommendations API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// JSON snapshot of tracked workloads and their usage histories
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,

    /// Seconds between recommendation passes
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Base URL of the API server serving custom metrics
    #[serde(default = "default_metrics_api_url")]
    pub metrics_api_url: String,

    /// File holding a bearer token for the metrics API
    #[serde(default)]
    pub metrics_api_token_path: Option<PathBuf>,

    #[serde(default)]
    pub recommender: RecommenderConfig,
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "pod-recommender".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_history_path() -> PathBuf {
    PathBuf::from("/var/lib/pod-recommender/histories.json")
}

fn default_interval() -> u64 {
    60
}

fn default_metrics_api_url() -> String {
    "https://kubernetes.default.svc".to_string()
}

impl AppConfig {
    /// Load from the file named by `RECOMMENDER_CONFIG` (if set) overlaid
    /// with `RECOMMENDER__*` environment variables
    pub fn load() -> Result<Self> {
        Self::load_from(std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
    }

    pub fn load_from(path: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = &path {
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("RECOMMENDER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        let app: AppConfig = config
            .try_deserialize()
            .context("Invalid configuration")?;
        app.recommender
            .validate()
            .context("Invalid recommender configuration")?;
        Ok(app)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    /// Bearer token for the metrics API, if configured
    pub fn metrics_api_token(&self) -> Result<Option<String>> {
        match &self.metrics_api_token_path {
            Some(path) => std::fs::read_to_string(path)
                .map(Some)
                .with_context(|| format!("Failed to read token file {}", path.display())),
            None => Ok(None),
        }
    }
}
