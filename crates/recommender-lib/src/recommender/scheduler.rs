//! Recommendation scheduling loop
//!
//! Loads the tracked workloads on every tick, recommends for each of them
//! and publishes the latest results. A failed history load skips the pass
//! and leaves the previously published results in place.

use super::PodResourceRecommender;
use crate::health::{components, HealthRegistry};
use crate::history::HistorySource;
use crate::models::{RecommendedPodResources, WorkloadRef};
use crate::observability::RecommenderMetrics;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

pub const DEFAULT_PASS_INTERVAL: Duration = Duration::from_secs(60);

/// Latest recommendation for one workload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadRecommendation {
    pub namespace: String,
    pub workload: String,
    pub containers: RecommendedPodResources,
    pub generated_at: DateTime<Utc>,
}

/// Periodic driver of a [`PodResourceRecommender`]
pub struct RecommendationLoop {
    recommender: Arc<PodResourceRecommender>,
    source: Arc<dyn HistorySource>,
    health: HealthRegistry,
    metrics: RecommenderMetrics,
    interval: Duration,
    latest: RwLock<BTreeMap<String, WorkloadRecommendation>>,
}

impl RecommendationLoop {
    pub fn new(
        recommender: Arc<PodResourceRecommender>,
        source: Arc<dyn HistorySource>,
        health: HealthRegistry,
        interval: Duration,
    ) -> Self {
        Self {
            recommender,
            source,
            health,
            metrics: RecommenderMetrics::new(),
            interval,
            latest: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn recommender(&self) -> &Arc<PodResourceRecommender> {
        &self.recommender
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Run passes until `shutdown` fires
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting recommendation loop"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_pass().await {
                        warn!(error = %e, "Recommendation pass skipped");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down recommendation loop");
                    break;
                }
            }
        }
    }

    /// Run one pass over every tracked workload
    pub async fn run_pass(&self) -> Result<()> {
        let start = Instant::now();

        let workloads = match self.source.load().await {
            Ok(workloads) => workloads,
            Err(e) => {
                self.metrics.inc_history_load_errors();
                self.health
                    .set_unhealthy(components::HISTORY_SOURCE, format!("{e:#}"))
                    .await;
                return Err(e.context("Failed to load usage histories"));
            }
        };
        self.health.set_healthy(components::HISTORY_SOURCE).await;

        let fallbacks_before = self.recommender.fallback_count();
        let mut results = BTreeMap::new();
        let mut containers = 0;

        for workload in &workloads {
            let recommendation = self
                .recommender
                .recommend(&workload.workload, &workload.containers)
                .await;
            containers += recommendation.len();
            results.insert(
                workload.workload.to_string(),
                WorkloadRecommendation {
                    namespace: workload.workload.namespace.clone(),
                    workload: workload.workload.name.clone(),
                    containers: recommendation,
                    generated_at: Utc::now(),
                },
            );
        }

        let live: Vec<WorkloadRef> = workloads.iter().map(|w| w.workload.clone()).collect();
        self.recommender.retain_workloads(&live);
        *self.latest.write().await = results;

        let fallbacks = self.recommender.fallback_count() - fallbacks_before;
        if fallbacks > 0 {
            self.health
                .set_degraded(
                    components::METRIC_SOURCE,
                    format!("{fallbacks} telemetry fallbacks in last pass"),
                )
                .await;
        } else {
            self.health.set_healthy(components::METRIC_SOURCE).await;
        }
        self.health.set_healthy(components::RECOMMENDATION_LOOP).await;
        self.health.set_ready(true).await;

        let elapsed = start.elapsed();
        self.metrics.observe_pass_latency(elapsed.as_secs_f64());
        self.recommender.logger().log_pass_completed(
            workloads.len(),
            containers,
            fallbacks,
            elapsed.as_millis() as u64,
        );
        Ok(())
    }

    /// Latest recommendations of every workload, ordered by `namespace/name`
    pub async fn latest(&self) -> Vec<WorkloadRecommendation> {
        self.latest.read().await.values().cloned().collect()
    }

    pub async fn get(&self, namespace: &str, workload: &str) -> Option<WorkloadRecommendation> {
        let key = WorkloadRef::new(namespace, workload).to_string();
        self.latest.read().await.get(&key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecommenderConfig;
    use crate::health::ComponentStatus;
    use crate::history::{ContainerUsageHistory, SampleHistory, WorkloadHistories};
    use crate::models::ResourceAmount;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// History source with a fixed workload list that can be switched to failing
    struct StaticHistories {
        workloads: std::sync::Mutex<Vec<WorkloadHistories>>,
        fail: AtomicBool,
    }

    impl StaticHistories {
        fn new(workloads: Vec<WorkloadHistories>) -> Self {
            Self {
                workloads: std::sync::Mutex::new(workloads),
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl HistorySource for StaticHistories {
        async fn load(&self) -> Result<Vec<WorkloadHistories>> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("snapshot unavailable");
            }
            Ok(self.workloads.lock().unwrap().clone())
        }
    }

    fn workload(namespace: &str, name: &str, containers: &[&str]) -> WorkloadHistories {
        let mut history = SampleHistory::new();
        let start = Utc::now() - chrono::Duration::days(2);
        for minute in 0..(2 * 24 * 60) {
            history.record(start + chrono::Duration::minutes(minute), 200.0, 64e6);
        }
        let history: Arc<dyn ContainerUsageHistory> = Arc::new(history);

        WorkloadHistories {
            workload: WorkloadRef::new(namespace, name),
            containers: containers
                .iter()
                .map(|c| (c.to_string(), history.clone()))
                .collect(),
        }
    }

    async fn scheduler(source: Arc<StaticHistories>) -> RecommendationLoop {
        let recommender =
            Arc::new(PodResourceRecommender::new(&RecommenderConfig::default()).unwrap());
        RecommendationLoop::new(
            recommender,
            source,
            HealthRegistry::with_default_components().await,
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn test_pass_publishes_every_workload() {
        let source = Arc::new(StaticHistories::new(vec![
            workload("shop", "frontend", &["nginx", "sidecar"]),
            workload("blog", "web", &["app"]),
        ]));
        let scheduler = scheduler(source).await;

        assert!(!scheduler.health().readiness().await.ready);
        scheduler.run_pass().await.unwrap();

        let latest = scheduler.latest().await;
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].namespace, "blog");

        let frontend = scheduler.get("shop", "frontend").await.unwrap();
        assert_eq!(frontend.containers.len(), 2);
        assert_eq!(frontend.containers["nginx"].target.cpu, ResourceAmount::new(230));
        assert!(scheduler.get("shop", "missing").await.is_none());
        assert!(scheduler.health().readiness().await.ready);
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_results() {
        let source = Arc::new(StaticHistories::new(vec![workload(
            "shop",
            "frontend",
            &["nginx"],
        )]));
        let scheduler = scheduler(source.clone()).await;
        scheduler.run_pass().await.unwrap();

        source.fail.store(true, Ordering::SeqCst);
        assert!(scheduler.run_pass().await.is_err());

        assert!(scheduler.get("shop", "frontend").await.is_some());
        let health = scheduler.health().health().await;
        assert_eq!(
            health.components[components::HISTORY_SOURCE].status,
            ComponentStatus::Unhealthy
        );
        assert!(!scheduler.health().readiness().await.ready);
    }

    #[tokio::test]
    async fn test_removed_workloads_disappear() {
        let source = Arc::new(StaticHistories::new(vec![
            workload("shop", "frontend", &["nginx"]),
            workload("shop", "checkout", &["app"]),
        ]));
        let scheduler = scheduler(source.clone()).await;
        scheduler.run_pass().await.unwrap();

        *source.workloads.lock().unwrap() = vec![workload("shop", "checkout", &["app"])];
        scheduler.run_pass().await.unwrap();

        assert!(scheduler.get("shop", "frontend").await.is_none());
        assert_eq!(scheduler.latest().await.len(), 1);
    }

    #[tokio::test]
    async fn test_overrides_without_telemetry_degrade_metric_source() {
        let mut config = RecommenderConfig::default();
        config.overrides.targets = vec!["nginx".to_string()];
        let recommender = Arc::new(PodResourceRecommender::new(&config).unwrap());
        let source = Arc::new(StaticHistories::new(vec![workload(
            "shop",
            "frontend",
            &["nginx"],
        )]));
        let scheduler = RecommendationLoop::new(
            recommender,
            source,
            HealthRegistry::with_default_components().await,
            Duration::from_millis(10),
        );

        scheduler.run_pass().await.unwrap();

        let health = scheduler.health().health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components[components::METRIC_SOURCE].status,
            ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let source = Arc::new(StaticHistories::new(vec![workload(
            "shop",
            "frontend",
            &["nginx"],
        )]));
        let scheduler = Arc::new(scheduler(source).await);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(scheduler.clone().run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(scheduler.get("shop", "frontend").await.is_some());
    }
}
