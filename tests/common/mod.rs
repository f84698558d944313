// Common test utilities for integration tests

pub mod cluster_sim;
pub mod fixtures;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use gunj_failover::config::{FailoverConfig, ManagerSettings};
use gunj_failover::failover::{Collaborators, FailoverManager};
use gunj_failover::hub::{AuditRecord, MemoryHubStore};
use gunj_failover::networking::LoggingNetworkHook;
use gunj_failover::FailoverState;

use cluster_sim::{SimCluster, SimHealthChecker, SimRegistry};

/// Failover manager wired to simulated clusters and an in-memory hub
pub struct TestEnv {
    pub registry: Arc<SimRegistry>,
    pub health: Arc<SimHealthChecker>,
    pub hub: Arc<MemoryHubStore>,
    pub manager: FailoverManager,
}

impl TestEnv {
    /// Register the clusters (without labels) and build a manager
    pub fn new(clusters: &[&str], settings: ManagerSettings) -> Self {
        let registry = Arc::new(SimRegistry::new());
        for name in clusters {
            registry.add(name, &[]);
        }
        Self::with_registry(registry, settings)
    }

    pub fn with_registry(registry: Arc<SimRegistry>, settings: ManagerSettings) -> Self {
        Self::with_hub(registry, Arc::new(MemoryHubStore::new()), settings)
    }

    /// Build a manager on top of an existing hub, as after a restart
    pub fn with_hub(
        registry: Arc<SimRegistry>,
        hub: Arc<MemoryHubStore>,
        settings: ManagerSettings,
    ) -> Self {
        let health = Arc::new(SimHealthChecker::new());
        let manager = FailoverManager::new(
            Collaborators {
                registry: registry.clone(),
                health: health.clone(),
                hub: hub.clone(),
                network: Arc::new(LoggingNetworkHook),
            },
            settings,
        );

        Self {
            registry,
            health,
            hub,
            manager,
        }
    }

    pub async fn configure(&self, config: FailoverConfig) {
        self.manager
            .configure_failover(config)
            .await
            .expect("failover config should be accepted");
    }

    pub fn cluster(&self, name: &str) -> Arc<SimCluster> {
        self.registry.cluster(name)
    }

    pub fn state(&self, cluster: &str) -> Option<FailoverState> {
        self.manager.cluster_state(cluster)
    }

    /// Audit reasons in publication order
    pub fn audit_reasons(&self) -> Vec<&'static str> {
        self.hub.records().iter().map(|r: &AuditRecord| r.reason).collect()
    }
}

/// Poll `condition` until it holds or `deadline` passes
pub async fn wait_until<F>(deadline: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let step = Duration::from_millis(10);
    let mut waited = Duration::ZERO;
    while waited < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(step).await;
        waited += step;
    }
    condition()
}

/// Run a future with a test-wide timeout
pub async fn with_timeout<F: Future>(limit: Duration, fut: F) -> F::Output {
    tokio::time::timeout(limit, fut)
        .await
        .expect("operation timed out")
}
