//! Health probing of member clusters through the Kubernetes API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::{debug, warn};

use super::quantity::{parse_cpu, parse_memory};
use super::registry::KubeconfigRegistry;
use super::{ClusterHealth, ClusterHealthChecker, ClusterMetrics, ClusterStatus};
use crate::error::{FailoverError, Result};

/// Default bound on one health check.
pub const DEFAULT_HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Health checker that inspects nodes and pod requests of each cluster.
pub struct KubeHealthChecker {
    registry: Arc<KubeconfigRegistry>,
    timeout: Duration,
}

impl KubeHealthChecker {
    pub fn new(registry: Arc<KubeconfigRegistry>) -> Self {
        Self {
            registry,
            timeout: DEFAULT_HEALTH_CHECK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn inspect(&self, name: &str, client: Client) -> Result<ClusterHealth> {
        if let Err(e) = client.apiserver_version().await {
            warn!(cluster = %name, error = %e, "API server unreachable");
            return Ok(ClusterHealth::unreachable(
                name,
                ClusterStatus::Offline,
                format!("API server unreachable: {e}"),
            ));
        }

        let nodes: Api<Node> = Api::all(client.clone());
        let nodes = nodes.list(&ListParams::default()).await?.items;
        let pods: Api<Pod> = Api::all(client);
        let pods = pods.list(&ListParams::default()).await?.items;

        let metrics = collect_metrics(&nodes, &pods);
        let status = node_status(&metrics);
        let message = (status != ClusterStatus::Ready).then(|| {
            format!(
                "{}/{} nodes ready",
                metrics.node_ready, metrics.node_count
            )
        });

        debug!(
            cluster = %name,
            status = %status,
            nodes_ready = metrics.node_ready,
            nodes = metrics.node_count,
            "Cluster health checked"
        );

        Ok(ClusterHealth {
            cluster_name: name.to_string(),
            status,
            metrics: Some(metrics),
            message,
            checked_at: Utc::now(),
        })
    }
}

#[async_trait]
impl ClusterHealthChecker for KubeHealthChecker {
    async fn check_health(&self, name: &str) -> Result<ClusterHealth> {
        let client = match self.registry.client(name).await {
            Ok(client) => client,
            Err(e) if e.is_not_found() => return Err(e),
            Err(e) => {
                return Ok(ClusterHealth::unreachable(
                    name,
                    ClusterStatus::Offline,
                    e.to_string(),
                ))
            }
        };

        match tokio::time::timeout(self.timeout, self.inspect(name, client)).await {
            Ok(Ok(health)) => Ok(health),
            Ok(Err(e)) => Err(FailoverError::HealthCheck {
                cluster: name.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Ok(ClusterHealth::unreachable(
                name,
                ClusterStatus::Unknown,
                format!("health check timed out after {:?}", self.timeout),
            )),
        }
    }
}

fn node_is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

/// Aggregate node allocatable and pod requests into a capacity snapshot.
fn collect_metrics(nodes: &[Node], pods: &[Pod]) -> ClusterMetrics {
    let mut metrics = ClusterMetrics {
        node_count: nodes.len() as i32,
        ..Default::default()
    };

    for node in nodes {
        if node_is_ready(node) {
            metrics.node_ready += 1;
        }
        let Some(allocatable) = node.status.as_ref().and_then(|s| s.allocatable.as_ref()) else {
            continue;
        };
        if let Some(cpu) = allocatable.get("cpu").and_then(|q| parse_cpu(&q.0)) {
            metrics.cpu_capacity += cpu;
        }
        if let Some(memory) = allocatable.get("memory").and_then(|q| parse_memory(&q.0)) {
            metrics.memory_capacity += memory;
        }
        if let Some(pods) = allocatable.get("pods").and_then(|q| q.0.parse::<i32>().ok()) {
            metrics.pod_capacity += pods;
        }
    }

    for pod in pods {
        let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
        if matches!(phase, Some("Succeeded") | Some("Failed")) {
            continue;
        }
        metrics.pod_count += 1;

        let containers = pod.spec.iter().flat_map(|s| s.containers.iter());
        for container in containers {
            let Some(requests) = container.resources.as_ref().and_then(|r| r.requests.as_ref())
            else {
                continue;
            };
            if let Some(cpu) = requests.get("cpu").and_then(|q| parse_cpu(&q.0)) {
                metrics.cpu_usage += cpu;
            }
            if let Some(memory) = requests.get("memory").and_then(|q| parse_memory(&q.0)) {
                metrics.memory_usage += memory;
            }
        }
    }

    metrics
}

/// Ready requires at least one ready node and a ready majority (half or more).
fn node_status(metrics: &ClusterMetrics) -> ClusterStatus {
    if metrics.node_ready > 0 && metrics.node_ready * 2 >= metrics.node_count {
        ClusterStatus::Ready
    } else {
        ClusterStatus::NotReady
    }
}
