//! Cluster collaborators of the failover manager.
//!
//! The manager never talks to Kubernetes directly. It goes through three
//! seams so the control logic stays independent of how clusters are reached:
//!
//! ```text
//! ┌────────────────────┐   connection()   ┌──────────────┐
//! │  ClusterRegistry   │ ───────────────▶ │  ClusterApi  │  (per cluster)
//! └────────────────────┘                  └──────────────┘
//! ┌────────────────────┐
//! │ClusterHealthChecker│  check_health() → status + capacity
//! └────────────────────┘
//! ```

mod health;
mod kube_api;
mod quantity;
mod registry;

pub use health::KubeHealthChecker;
pub use kube_api::KubeClusterApi;
pub use quantity::{parse_cpu, parse_memory};
pub use registry::KubeconfigRegistry;

use crate::crd::ObservabilityPlatform;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A cluster known to the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl Cluster {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            labels: BTreeMap::new(),
            region: None,
        }
    }
}

/// Coarse cluster status reported by the health checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterStatus {
    Ready,
    NotReady,
    Offline,
    Unknown,
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClusterStatus::Ready => "Ready",
            ClusterStatus::NotReady => "NotReady",
            ClusterStatus::Offline => "Offline",
            ClusterStatus::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Capacity snapshot of a cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMetrics {
    /// CPU cores in use.
    pub cpu_usage: f64,
    /// Allocatable CPU cores.
    pub cpu_capacity: f64,
    /// Memory bytes in use.
    pub memory_usage: i64,
    /// Allocatable memory bytes.
    pub memory_capacity: i64,
    pub pod_count: i32,
    pub pod_capacity: i32,
    pub node_count: i32,
    pub node_ready: i32,
}

impl ClusterMetrics {
    /// CPU utilization as a fraction, `None` without capacity.
    pub fn cpu_utilization(&self) -> Option<f64> {
        if self.cpu_capacity > 0.0 {
            Some(self.cpu_usage / self.cpu_capacity)
        } else {
            None
        }
    }

    /// Memory utilization as a fraction, `None` without capacity.
    pub fn memory_utilization(&self) -> Option<f64> {
        if self.memory_capacity > 0 {
            Some(self.memory_usage as f64 / self.memory_capacity as f64)
        } else {
            None
        }
    }

    /// The higher of CPU and memory utilization.
    pub fn peak_utilization(&self) -> Option<f64> {
        match (self.cpu_utilization(), self.memory_utilization()) {
            (Some(cpu), Some(mem)) => Some(cpu.max(mem)),
            (Some(u), None) | (None, Some(u)) => Some(u),
            (None, None) => None,
        }
    }
}

/// Result of one health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterHealth {
    pub cluster_name: String,
    pub status: ClusterStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ClusterMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ClusterHealth {
    pub fn is_ready(&self) -> bool {
        self.status == ClusterStatus::Ready
    }

    /// Health result for a cluster that could not be checked.
    pub fn unreachable(cluster: &str, status: ClusterStatus, message: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster.to_string(),
            status,
            metrics: None,
            message: Some(message.into()),
            checked_at: Utc::now(),
        }
    }
}

/// API surface of one member cluster used by the failover pipeline.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List ObservabilityPlatforms across all namespaces.
    async fn list_platforms(&self) -> Result<Vec<ObservabilityPlatform>>;

    /// Fetch one platform; `Ok(None)` if it does not exist.
    async fn get_platform(&self, namespace: &str, name: &str)
        -> Result<Option<ObservabilityPlatform>>;

    async fn create_platform(&self, platform: &ObservabilityPlatform)
        -> Result<ObservabilityPlatform>;

    /// Replace an existing platform (the object carries its resourceVersion).
    async fn replace_platform(&self, platform: &ObservabilityPlatform)
        -> Result<ObservabilityPlatform>;

    /// Create a namespace if missing. An existing namespace is success.
    async fn ensure_namespace(&self, name: &str, labels: &BTreeMap<String, String>) -> Result<()>;
}

/// Resolves cluster names to live API connections.
#[async_trait]
pub trait ClusterRegistry: Send + Sync {
    async fn list(&self) -> Result<Vec<Cluster>>;

    async fn connection(&self, name: &str) -> Result<Arc<dyn ClusterApi>>;
}

/// Checks clusters for readiness and capacity.
#[async_trait]
pub trait ClusterHealthChecker: Send + Sync {
    async fn check_health(&self, name: &str) -> Result<ClusterHealth>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utilization() {
        let metrics = ClusterMetrics {
            cpu_usage: 3.0,
            cpu_capacity: 4.0,
            memory_usage: 2 << 30,
            memory_capacity: 8 << 30,
            ..Default::default()
        };
        assert_eq!(metrics.cpu_utilization(), Some(0.75));
        assert_eq!(metrics.memory_utilization(), Some(0.25));
        assert_eq!(metrics.peak_utilization(), Some(0.75));
    }

    #[test]
    fn test_zero_capacity_has_no_utilization() {
        let metrics = ClusterMetrics::default();
        assert_eq!(metrics.cpu_utilization(), None);
        assert_eq!(metrics.peak_utilization(), None);
    }
}
