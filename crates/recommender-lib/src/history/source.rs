//! Sources of tracked workloads and their usage histories

use super::{ContainerHistories, ContainerUsageHistory, SampleHistory};
use crate::models::WorkloadRef;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Usage histories for every tracked container of one workload
#[derive(Clone)]
pub struct WorkloadHistories {
    pub workload: WorkloadRef,
    pub containers: ContainerHistories,
}

/// Provides the set of workloads to recommend for on each pass
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn load(&self) -> Result<Vec<WorkloadHistories>>;
}

/// On-disk snapshot of tracked workloads
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistorySnapshot {
    #[serde(default)]
    pub workloads: Vec<WorkloadSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSnapshot {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub containers: HashMap<String, SampleHistory>,
}

impl HistorySnapshot {
    pub fn into_workloads(self) -> Vec<WorkloadHistories> {
        self.workloads
            .into_iter()
            .map(|w| WorkloadHistories {
                workload: WorkloadRef::new(w.namespace, w.name),
                containers: w
                    .containers
                    .into_iter()
                    .map(|(name, history)| {
                        (name, Arc::new(history) as Arc<dyn ContainerUsageHistory>)
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Reads a JSON [`HistorySnapshot`] from disk on every load
pub struct FileHistorySource {
    path: PathBuf,
}

impl FileHistorySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl HistorySource for FileHistorySource {
    async fn load(&self) -> Result<Vec<WorkloadHistories>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read history snapshot {}", self.path.display()))?;
        let snapshot: HistorySnapshot =
            serde_json::from_str(&content).context("Failed to parse history snapshot")?;

        debug!(
            path = %self.path.display(),
            workloads = snapshot.workloads.len(),
            "Loaded history snapshot"
        );
        Ok(snapshot.into_workloads())
    }
}
