//! Core data models for the recommender

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Largest representable resource amount (millicores or bytes)
pub const MAX_RESOURCE_AMOUNT: u64 = 100_000_000_000_000;

/// Bytes per megabyte, as used by the pod memory floor
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Kind of resource a recommendation covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cpu,
    Memory,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(ResourceKind::Cpu),
            "memory" => Ok(ResourceKind::Memory),
            other => Err(ConfigError::UnknownResource(other.to_string())),
        }
    }
}

/// Fixed-point resource quantity.
///
/// CPU is stored in millicores, memory in bytes. Amounts are never negative
/// and never exceed [`MAX_RESOURCE_AMOUNT`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ResourceAmount(u64);

impl ResourceAmount {
    pub const ZERO: ResourceAmount = ResourceAmount(0);
    pub const MAX: ResourceAmount = ResourceAmount(MAX_RESOURCE_AMOUNT);

    pub fn new(value: u64) -> Self {
        Self(value.min(MAX_RESOURCE_AMOUNT))
    }

    /// Convert a raw floating point amount, rounding to the nearest unit.
    ///
    /// Negative and NaN inputs become zero; anything above the maximum,
    /// including positive infinity, saturates.
    pub fn from_float(amount: f64) -> Self {
        if amount.is_nan() || amount <= 0.0 {
            Self::ZERO
        } else if amount >= MAX_RESOURCE_AMOUNT as f64 {
            Self::MAX
        } else {
            Self(amount.round() as u64)
        }
    }

    pub fn from_cores(cores: f64) -> Self {
        Self::from_float(cores * 1000.0)
    }

    pub fn from_millicores(millicores: f64) -> Self {
        Self::from_float(millicores)
    }

    pub fn from_megabytes(megabytes: f64) -> Self {
        Self::from_float(megabytes * BYTES_PER_MB)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// CPU amount expressed in cores
    pub fn as_cores(&self) -> f64 {
        self.0 as f64 / 1000.0
    }

    pub fn scale(self, factor: f64) -> Self {
        Self::from_float(self.0 as f64 * factor)
    }

    /// One of `parts` equal shares, rounded up so that the shares never
    /// sum to less than the whole
    pub fn split(self, parts: usize) -> Self {
        match parts {
            0 => self,
            n => Self(self.0.div_ceil(n as u64)),
        }
    }
}

impl fmt::Display for ResourceAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resource vector with both `cpu` and `memory` always present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Resources {
    pub cpu: ResourceAmount,
    pub memory: ResourceAmount,
}

impl Resources {
    pub fn new(cpu: ResourceAmount, memory: ResourceAmount) -> Self {
        Self { cpu, memory }
    }

    pub fn get(&self, kind: ResourceKind) -> ResourceAmount {
        match kind {
            ResourceKind::Cpu => self.cpu,
            ResourceKind::Memory => self.memory,
        }
    }

    /// Apply `f` to every resource in the vector
    pub fn map(self, mut f: impl FnMut(ResourceKind, ResourceAmount) -> ResourceAmount) -> Self {
        Self {
            cpu: f(ResourceKind::Cpu, self.cpu),
            memory: f(ResourceKind::Memory, self.memory),
        }
    }

    pub fn scale(self, factor: f64) -> Self {
        self.map(|_, amount| amount.scale(factor))
    }

    pub fn split(self, parts: usize) -> Self {
        self.map(|_, amount| amount.split(parts))
    }

    /// Element-wise maximum
    pub fn max(self, other: Resources) -> Self {
        Self {
            cpu: self.cpu.max(other.cpu),
            memory: self.memory.max(other.memory),
        }
    }
}

/// Recommendation of resources for a single container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendedContainerResources {
    /// Recommended optimal amount of resources
    pub target: Resources,
    /// Recommended minimum amount of resources
    pub lower_bound: Resources,
    /// Recommended maximum amount of resources
    pub upper_bound: Resources,
}

/// Map from container name to recommended resources
pub type RecommendedPodResources = HashMap<String, RecommendedContainerResources>;

/// Workload owning a set of tracked containers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub namespace: String,
    pub name: String,
}

impl WorkloadRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn container(&self, container: impl Into<String>) -> ContainerId {
        ContainerId {
            namespace: self.namespace.clone(),
            workload: self.name.clone(),
            container: container.into(),
        }
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Identity of a tracked container: namespace + workload + container name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId {
    pub namespace: String,
    pub workload: String,
    pub container: String,
}

impl ContainerId {
    pub fn new(
        namespace: impl Into<String>,
        workload: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            workload: workload.into(),
            container: container.into(),
        }
    }

    pub fn belongs_to(&self, workload: &WorkloadRef) -> bool {
        self.namespace == workload.namespace && self.workload == workload.name
    }

    pub fn workload(&self) -> WorkloadRef {
        WorkloadRef::new(self.namespace.clone(), self.workload.clone())
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.workload, self.container)
    }
}
