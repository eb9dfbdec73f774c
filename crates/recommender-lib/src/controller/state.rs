//! Per-identity controller state

use super::ControllerOutcome;
use crate::models::{ContainerId, WorkloadRef};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Integral accumulator and request-count baseline of one container
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControllerState {
    pub integral: f64,
    /// Last observed cumulative request count
    pub request_baseline: f64,
    /// Committed controller steps
    pub steps: u64,
}

impl ControllerState {
    /// Requests since the previous evaluation. A counter that went
    /// backwards was reset, so the whole current count is new.
    pub fn request_delta(&self, request_count: f64) -> f64 {
        if request_count >= self.request_baseline {
            request_count - self.request_baseline
        } else {
            request_count
        }
    }

    /// Record the outcome of a successful controller step
    pub fn commit(&mut self, outcome: &ControllerOutcome, request_count: f64) {
        self.integral = outcome.next_integral;
        self.request_baseline = request_count;
        self.steps += 1;
    }
}

/// Controller state for every overridden container, one lock per identity
#[derive(Debug, Default)]
pub struct ControllerStates {
    states: DashMap<ContainerId, Arc<Mutex<ControllerState>>>,
}

impl ControllerStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// State handle for `id`, created on first use
    pub fn entry(&self, id: &ContainerId) -> Arc<Mutex<ControllerState>> {
        if let Some(existing) = self.states.get(id) {
            return existing.value().clone();
        }
        self.states
            .entry(id.clone())
            .or_insert_with(|| {
                debug!(container = %id, "Creating controller state");
                Arc::new(Mutex::new(ControllerState::default()))
            })
            .value()
            .clone()
    }

    /// Current state of `id`, if tracked
    pub async fn get(&self, id: &ContainerId) -> Option<ControllerState> {
        let handle = self.states.get(id).map(|r| r.value().clone())?;
        let state = *handle.lock().await;
        Some(state)
    }

    /// Drop `handle` for `id` if no step was ever committed to it and nobody
    /// else holds it. Callers must release their lock on `handle` first.
    pub fn discard_unstepped(
        &self,
        id: &ContainerId,
        handle: &Arc<Mutex<ControllerState>>,
    ) -> bool {
        let removed = self
            .states
            .remove_if(id, |_, current| {
                // The map and the caller hold the only references
                Arc::ptr_eq(current, handle)
                    && Arc::strong_count(current) == 2
                    && current.try_lock().is_ok_and(|state| state.steps == 0)
            })
            .is_some();
        if removed {
            debug!(container = %id, "Discarded controller state without committed steps");
        }
        removed
    }

    pub fn remove(&self, id: &ContainerId) -> bool {
        self.states.remove(id).is_some()
    }

    /// Drop state of `workload`'s containers not in `live_containers`
    pub fn retain_containers(&self, workload: &WorkloadRef, live_containers: &[&str]) {
        self.states.retain(|id, _| {
            let keep = !id.belongs_to(workload) || live_containers.contains(&id.container.as_str());
            if !keep {
                debug!(container = %id, "Dropping controller state of untracked container");
            }
            keep
        });
    }

    /// Drop state of every workload not in `live_workloads`
    pub fn retain_workloads(&self, live_workloads: &[WorkloadRef]) {
        self.states.retain(|id, _| {
            let keep = live_workloads.iter().any(|w| id.belongs_to(w));
            if !keep {
                debug!(container = %id, "Dropping controller state of untracked workload");
            }
            keep
        });
    }

    pub fn identities(&self) -> Vec<ContainerId> {
        self.states.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
