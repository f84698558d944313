//! gunj-failover - multi-cluster failover for observability platforms.
//!
//! A hub-side control plane that keeps `ObservabilityPlatform` workloads
//! available across independently managed Kubernetes clusters. It watches
//! cluster health and, when a serving cluster fails, migrates its platforms
//! to a healthy cluster chosen by priority group.
//!
//! # Features
//!
//! - **Cluster state machine**: every cluster is `Active`, `Standby`,
//!   `FailingOver` or `Failed`.
//! - **Automatic failover**: a debounced health monitor with bounded
//!   concurrency.
//! - **Manual control**: trigger and revert failovers on demand.
//! - **Durable history**: bounded history and config persisted on the hub.
//! - **Drills**: exercise the failover path without a real outage.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      FailoverManager                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Entry points: trigger | revert | monitor | drill           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pipeline: validate → collect → prepare → migrate →         │
//! │            reroute → verify                                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Collaborators: ClusterRegistry | ClusterHealthChecker |    │
//! │                 HubStore | NetworkHook                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use gunj_failover::cluster::{KubeHealthChecker, KubeconfigRegistry};
//! use gunj_failover::config::OperatorConfig;
//! use gunj_failover::failover::{Collaborators, FailoverManager};
//! use gunj_failover::hub::KubeHubStore;
//! use gunj_failover::networking::LoggingNetworkHook;
//!
//! #[tokio::main]
//! async fn main() -> gunj_failover::Result<()> {
//!     let config = OperatorConfig::development();
//!     let registry = Arc::new(KubeconfigRegistry::new(config.clusters.clone()));
//!     let hub_client = kube::Client::try_default().await?;
//!
//!     let manager = FailoverManager::new(
//!         Collaborators {
//!             registry: registry.clone(),
//!             health: Arc::new(KubeHealthChecker::new(registry)),
//!             hub: Arc::new(KubeHubStore::connect(hub_client, &config.hub_namespace).await?),
//!             network: Arc::new(LoggingNetworkHook),
//!         },
//!         config.settings.clone(),
//!     );
//!
//!     manager.trigger_failover("primary", "secondary").await?;
//!     Ok(())
//! }
//! ```

pub mod cluster;
pub mod config;
pub mod crd;
pub mod error;
pub mod failover;
pub mod hub;
pub mod metrics;
pub mod networking;
pub mod shutdown;

pub use error::{FailoverError, Result};
pub use failover::{
    Collaborators, EventStatus, FailoverEvent, FailoverManager, FailoverState, MonitorHandle,
};
