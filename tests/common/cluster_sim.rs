// Cluster simulation for integration tests
// In-memory member clusters, registry and health checker

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use gunj_failover::cluster::{
    Cluster, ClusterApi, ClusterHealth, ClusterHealthChecker, ClusterMetrics, ClusterRegistry,
    ClusterStatus,
};
use gunj_failover::crd::{ObservabilityPlatform, ObservabilityPlatformStatus, PlatformPhase};
use gunj_failover::{FailoverError, Result};
use kube::ResourceExt;
use parking_lot::Mutex;

type Key = (String, String);

fn key_of(platform: &ObservabilityPlatform) -> Key {
    (platform.namespace().unwrap_or_default(), platform.name_any())
}

/// Simulated member cluster holding ObservabilityPlatforms and namespaces
pub struct SimCluster {
    pub name: String,
    platforms: Mutex<BTreeMap<Key, ObservabilityPlatform>>,
    namespaces: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    /// Platforms written by the failover report Ready immediately
    auto_ready: AtomicBool,
    fail_list: AtomicBool,
    fail_namespaces: AtomicBool,
    fail_create: Mutex<HashSet<String>>,
    resource_version: AtomicU64,
    creates: AtomicUsize,
    replaces: AtomicUsize,
}

impl SimCluster {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            platforms: Mutex::new(BTreeMap::new()),
            namespaces: Mutex::new(BTreeMap::new()),
            auto_ready: AtomicBool::new(true),
            fail_list: AtomicBool::new(false),
            fail_namespaces: AtomicBool::new(false),
            fail_create: Mutex::new(HashSet::new()),
            resource_version: AtomicU64::new(1),
            creates: AtomicUsize::new(0),
            replaces: AtomicUsize::new(0),
        }
    }

    fn next_version(&self) -> String {
        self.resource_version.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Seed a platform as if an operator had created it on this cluster
    pub fn add_platform(&self, mut platform: ObservabilityPlatform) {
        platform.metadata.resource_version = Some(self.next_version());
        platform.metadata.uid = Some(format!("{}-{}", self.name, platform.name_any()));
        platform.metadata.creation_timestamp =
            Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(Utc::now()));
        if platform.status.is_none() {
            platform.status = Some(ready_status());
        }
        self.platforms.lock().insert(key_of(&platform), platform);
    }

    pub fn platforms(&self) -> Vec<ObservabilityPlatform> {
        self.platforms.lock().values().cloned().collect()
    }

    pub fn platform(&self, namespace: &str, name: &str) -> Option<ObservabilityPlatform> {
        self.platforms
            .lock()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.namespaces.lock().keys().cloned().collect()
    }

    pub fn namespace_labels(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.namespaces.lock().get(name).cloned()
    }

    pub fn set_auto_ready(&self, ready: bool) {
        self.auto_ready.store(ready, Ordering::SeqCst);
    }

    /// Flip every platform on the cluster to Ready
    pub fn mark_all_ready(&self) {
        for platform in self.platforms.lock().values_mut() {
            platform.status = Some(ready_status());
        }
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_namespaces(&self, fail: bool) {
        self.fail_namespaces.store(fail, Ordering::SeqCst);
    }

    /// Make creation of the named platform fail
    pub fn fail_create_for(&self, name: &str) {
        self.fail_create.lock().insert(name.to_string());
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn replace_count(&self) -> usize {
        self.replaces.load(Ordering::SeqCst)
    }

    fn written_status(
        &self,
        previous: Option<ObservabilityPlatformStatus>,
    ) -> Option<ObservabilityPlatformStatus> {
        if self.auto_ready.load(Ordering::SeqCst) {
            Some(ready_status())
        } else {
            previous.or_else(|| {
                Some(ObservabilityPlatformStatus {
                    phase: PlatformPhase::Installing,
                    ..Default::default()
                })
            })
        }
    }
}

fn ready_status() -> ObservabilityPlatformStatus {
    ObservabilityPlatformStatus {
        phase: PlatformPhase::Ready,
        ..Default::default()
    }
}

fn sim_error(cluster: &str, message: &str) -> FailoverError {
    FailoverError::Connection {
        cluster: cluster.to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl ClusterApi for SimCluster {
    async fn list_platforms(&self) -> Result<Vec<ObservabilityPlatform>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(sim_error(&self.name, "list failed"));
        }
        Ok(self.platforms())
    }

    async fn get_platform(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ObservabilityPlatform>> {
        Ok(self.platform(namespace, name))
    }

    async fn create_platform(
        &self,
        platform: &ObservabilityPlatform,
    ) -> Result<ObservabilityPlatform> {
        if self.fail_create.lock().contains(&platform.name_any()) {
            return Err(sim_error(&self.name, "admission denied"));
        }
        assert!(
            platform.metadata.resource_version.is_none(),
            "create must not carry a resourceVersion"
        );

        let key = key_of(platform);
        let mut platforms = self.platforms.lock();
        if platforms.contains_key(&key) {
            return Err(FailoverError::InvalidArgument(format!("{:?} already exists", key)));
        }

        let mut created = platform.clone();
        created.metadata.resource_version = Some(self.next_version());
        created.metadata.uid = Some(format!("{}-{}", self.name, platform.name_any()));
        created.status = self.written_status(None);
        platforms.insert(key, created.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(created)
    }

    async fn replace_platform(
        &self,
        platform: &ObservabilityPlatform,
    ) -> Result<ObservabilityPlatform> {
        let key = key_of(platform);
        let mut platforms = self.platforms.lock();
        let Some(existing) = platforms.get(&key) else {
            return Err(FailoverError::NotFound(format!("{:?}", key)));
        };
        if existing.metadata.resource_version != platform.metadata.resource_version {
            return Err(FailoverError::InvalidArgument("resourceVersion conflict".to_string()));
        }

        let mut replaced = platform.clone();
        replaced.metadata.resource_version = Some(self.next_version());
        replaced.status = self.written_status(existing.status.clone());
        platforms.insert(key, replaced.clone());
        self.replaces.fetch_add(1, Ordering::SeqCst);
        Ok(replaced)
    }

    async fn ensure_namespace(&self, name: &str, labels: &BTreeMap<String, String>) -> Result<()> {
        if self.fail_namespaces.load(Ordering::SeqCst) {
            return Err(sim_error(&self.name, "namespace creation forbidden"));
        }
        self.namespaces
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| labels.clone());
        Ok(())
    }
}

/// Registry of simulated clusters
#[derive(Default)]
pub struct SimRegistry {
    clusters: Mutex<Vec<(Cluster, Arc<SimCluster>)>>,
    unreachable: Mutex<HashSet<String>>,
}

impl SimRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cluster with labels
    pub fn add(&self, name: &str, labels: &[(&str, &str)]) -> Arc<SimCluster> {
        let mut cluster = Cluster::new(name);
        cluster.labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let sim = Arc::new(SimCluster::new(name));
        self.clusters.lock().push((cluster, sim.clone()));
        sim
    }

    pub fn cluster(&self, name: &str) -> Arc<SimCluster> {
        self.clusters
            .lock()
            .iter()
            .find(|(c, _)| c.name == name)
            .map(|(_, sim)| sim.clone())
            .unwrap_or_else(|| panic!("unknown sim cluster {}", name))
    }

    pub fn set_reachable(&self, name: &str, reachable: bool) {
        let mut unreachable = self.unreachable.lock();
        if reachable {
            unreachable.remove(name);
        } else {
            unreachable.insert(name.to_string());
        }
    }
}

#[async_trait]
impl ClusterRegistry for SimRegistry {
    async fn list(&self) -> Result<Vec<Cluster>> {
        Ok(self.clusters.lock().iter().map(|(c, _)| c.clone()).collect())
    }

    async fn connection(&self, name: &str) -> Result<Arc<dyn ClusterApi>> {
        if self.unreachable.lock().contains(name) {
            return Err(sim_error(name, "connection refused"));
        }
        self.clusters
            .lock()
            .iter()
            .find(|(c, _)| c.name == name)
            .map(|(_, sim)| sim.clone() as Arc<dyn ClusterApi>)
            .ok_or_else(|| FailoverError::NotFound(format!("cluster {}", name)))
    }
}

#[derive(Clone)]
enum Reading {
    Status(ClusterStatus, Option<ClusterMetrics>),
    Error,
}

/// Health checker answering from a scripted table.
///
/// Clusters without an entry are Ready at 50% utilization.
#[derive(Default)]
pub struct SimHealthChecker {
    readings: Mutex<HashMap<String, Reading>>,
    checks: AtomicUsize,
}

impl SimHealthChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ready with the given CPU and memory utilization
    pub fn set_ready(&self, cluster: &str, cpu: f64, memory: f64) {
        self.readings.lock().insert(
            cluster.to_string(),
            Reading::Status(ClusterStatus::Ready, Some(metrics(cpu, memory))),
        );
    }

    pub fn set_metrics(&self, cluster: &str, metrics: ClusterMetrics) {
        self.readings.lock().insert(
            cluster.to_string(),
            Reading::Status(ClusterStatus::Ready, Some(metrics)),
        );
    }

    pub fn set_status(&self, cluster: &str, status: ClusterStatus) {
        self.readings
            .lock()
            .insert(cluster.to_string(), Reading::Status(status, Some(metrics(0.1, 0.1))));
    }

    /// Ready but without capacity metrics
    pub fn set_no_metrics(&self, cluster: &str) {
        self.readings
            .lock()
            .insert(cluster.to_string(), Reading::Status(ClusterStatus::Ready, None));
    }

    pub fn set_error(&self, cluster: &str) {
        self.readings.lock().insert(cluster.to_string(), Reading::Error);
    }

    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

pub fn metrics(cpu: f64, memory: f64) -> ClusterMetrics {
    ClusterMetrics {
        cpu_usage: cpu * 100.0,
        cpu_capacity: 100.0,
        memory_usage: (memory * 1_000_000.0) as i64,
        memory_capacity: 1_000_000,
        pod_count: 10,
        pod_capacity: 110,
        node_count: 3,
        node_ready: 3,
    }
}

#[async_trait]
impl ClusterHealthChecker for SimHealthChecker {
    async fn check_health(&self, name: &str) -> Result<ClusterHealth> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        let reading = self
            .readings
            .lock()
            .get(name)
            .cloned()
            .unwrap_or(Reading::Status(ClusterStatus::Ready, Some(metrics(0.5, 0.5))));

        match reading {
            Reading::Status(status, metrics) => Ok(ClusterHealth {
                cluster_name: name.to_string(),
                status,
                metrics,
                message: None,
                checked_at: Utc::now(),
            }),
            Reading::Error => Err(FailoverError::HealthCheck {
                cluster: name.to_string(),
                message: "health check failed".to_string(),
            }),
        }
    }
}
