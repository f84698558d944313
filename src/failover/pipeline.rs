//! The failover execution pipeline.
//!
//! ```text
//! validate ─▶ collect ─▶ prepare ─▶ migrate ─▶ reroute ─▶ verify
//!  (hard)      (soft)     (hard)    (per-item)   (soft)    (hard)
//! ```
//!
//! Hard steps abort the attempt with their phase context. Soft steps log and
//! carry on with whatever they managed to produce.

use std::collections::{BTreeMap, HashSet};

use chrono::{SecondsFormat, Utc};
use kube::ResourceExt;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::state::ExecutionGuard;
use super::types::{FailoverEvent, FailoverPhase};
use crate::cluster::{ClusterApi, ClusterHealthChecker, ClusterRegistry};
use crate::config::ManagerSettings;
use crate::crd::ObservabilityPlatform;
use crate::error::{FailoverError, Result};
use crate::networking::NetworkHook;

/// Annotations written on, and read from, migrated platforms.
pub mod annotations {
    /// Set to `"true"` to keep a platform out of failovers.
    pub const EXCLUDE: &str = "failover.gunj.io/exclude";
    pub const SOURCE_CLUSTER: &str = "failover.gunj.io/source-cluster";
    pub const FAILOVER_TIME: &str = "failover.gunj.io/failover-time";
    pub const ORIGINAL_NAME: &str = "failover.gunj.io/original-name";
}

/// Label put on namespaces created while preparing a target.
pub const PREPARED_LABEL: (&str, &str) = ("gunj.io/failover", "prepared");

pub(crate) const VALIDATION_FAILED: &str = "target cluster validation failed";
pub(crate) const PREPARE_FAILED: &str = "failed to prepare target cluster";
pub(crate) const MIGRATION_FAILED: &str = "resource migration failed";
pub(crate) const VERIFICATION_FAILED: &str = "failover verification failed";

pub(crate) struct Pipeline<'a> {
    pub registry: &'a dyn ClusterRegistry,
    pub health: &'a dyn ClusterHealthChecker,
    pub network: &'a dyn NetworkHook,
    pub settings: &'a ManagerSettings,
}

impl Pipeline<'_> {
    /// Run every step for `event`, filling in its resource map.
    pub async fn execute(&self, guard: &ExecutionGuard, event: &mut FailoverEvent) -> Result<()> {
        let from = event.from_cluster.clone();
        let to = event.to_cluster.clone();

        guard.set_phase(FailoverPhase::Validating);
        self.validate_target(&to)
            .await
            .map_err(|e| e.in_phase(VALIDATION_FAILED))?;

        guard.set_phase(FailoverPhase::Collecting);
        let resources = self.collect(&from).await;

        guard.set_phase(FailoverPhase::Preparing);
        self.prepare(&to, &resources)
            .await
            .map_err(|e| e.in_phase(PREPARE_FAILED))?;

        guard.set_phase(FailoverPhase::Migrating);
        event.resources_map = self
            .migrate(&resources, &from, &to)
            .await
            .map_err(|e| e.in_phase(MIGRATION_FAILED))?;

        guard.set_phase(FailoverPhase::Rerouting);
        if let Err(e) = self.network.reroute(&from, &to).await {
            warn!(from = %from, to = %to, error = %e, "Failed to update networking");
        }

        guard.set_phase(FailoverPhase::Verifying);
        self.verify(&to, &from, resources.len())
            .await
            .map_err(|e| e.in_phase(VERIFICATION_FAILED))
    }

    /// The target must be Ready and have headroom under the capacity threshold.
    async fn validate_target(&self, cluster: &str) -> Result<()> {
        let health = self.health.check_health(cluster).await?;
        if !health.is_ready() {
            return Err(FailoverError::TargetNotReady {
                cluster: cluster.to_string(),
                status: health.status.to_string(),
            });
        }

        let metrics = health.metrics.as_ref().ok_or_else(|| FailoverError::HealthCheck {
            cluster: cluster.to_string(),
            message: "no capacity metrics reported".to_string(),
        })?;

        let cpu = metrics.cpu_utilization();
        let memory = metrics.memory_utilization();

        for (resource, utilization) in [("CPU", cpu), ("memory", memory)] {
            let Some(u) = utilization else {
                return Err(FailoverError::HealthCheck {
                    cluster: cluster.to_string(),
                    message: format!("no allocatable {} capacity reported", resource),
                });
            };
            if u > self.settings.capacity_threshold {
                return Err(FailoverError::CapacityExceeded {
                    cluster: cluster.to_string(),
                    resource: resource.to_string(),
                    utilization: u * 100.0,
                });
            }
        }

        debug!(cluster = %cluster, cpu = ?cpu, memory = ?memory, "Target cluster validated");
        Ok(())
    }

    /// Platforms on the source that should move. Never fails.
    async fn collect(&self, cluster: &str) -> Vec<ObservabilityPlatform> {
        let listed = match self.registry.connection(cluster).await {
            Ok(api) => api.list_platforms().await,
            Err(e) => Err(e),
        };

        match listed {
            Ok(platforms) => {
                let total = platforms.len();
                let selected: Vec<_> = platforms.into_iter().filter(should_failover).collect();
                info!(
                    cluster = %cluster,
                    total,
                    selected = selected.len(),
                    "Collected platforms from source cluster"
                );
                selected
            }
            Err(e) => {
                warn!(cluster = %cluster, error = %e, "Failed to get resources from source cluster");
                Vec::new()
            }
        }
    }

    async fn prepare(&self, cluster: &str, resources: &[ObservabilityPlatform]) -> Result<()> {
        let api = self.registry.connection(cluster).await?;
        let labels = BTreeMap::from([(PREPARED_LABEL.0.to_string(), PREPARED_LABEL.1.to_string())]);

        let mut seen = HashSet::new();
        let namespaces = self
            .settings
            .required_namespaces
            .iter()
            .cloned()
            .chain(resources.iter().filter_map(|r| r.namespace()))
            .filter(|ns| seen.insert(ns.clone()));

        for namespace in namespaces {
            api.ensure_namespace(&namespace, &labels).await?;
            debug!(cluster = %cluster, namespace = %namespace, "Namespace ready");
        }
        Ok(())
    }

    /// Upsert each platform on the target. Individual failures are skipped.
    async fn migrate(
        &self,
        resources: &[ObservabilityPlatform],
        from: &str,
        to: &str,
    ) -> Result<BTreeMap<String, String>> {
        let target = self
            .registry
            .connection(to)
            .await
            .map_err(|e| connection_error(to, e))?;

        let mut migrated = BTreeMap::new();
        for platform in resources {
            let Some(namespace) = platform.namespace() else {
                warn!(name = %platform.name_any(), "Skipping platform without namespace");
                continue;
            };
            let name = platform.name_any();
            let copy = prepare_copy(platform, from);

            if let Err(e) = upsert(target.as_ref(), &namespace, &name, copy).await {
                warn!(
                    namespace = %namespace,
                    name = %name,
                    cluster = %to,
                    error = %e,
                    "Failed to migrate platform"
                );
                continue;
            }

            let key = format!("{}/{}", namespace, name);
            migrated.insert(key.clone(), key);
        }

        info!(
            from = %from,
            to = %to,
            migrated = migrated.len(),
            total = resources.len(),
            "Resource migration finished"
        );
        Ok(migrated)
    }

    /// Poll the target until `expected` migrated platforms report Ready.
    async fn verify(&self, cluster: &str, from: &str, expected: usize) -> Result<()> {
        let api = self.registry.connection(cluster).await?;
        let mut ticker = interval(self.settings.verification_poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let poll = async {
            loop {
                ticker.tick().await;
                match api.list_platforms().await {
                    Ok(platforms) => {
                        let ready = platforms
                            .iter()
                            .filter(|p| migrated_from(p, from) && p.is_ready())
                            .count();
                        debug!(cluster = %cluster, ready, expected, "Failover verification progress");
                        if ready >= expected {
                            info!(cluster = %cluster, resources = ready, "Failover verification successful");
                            return;
                        }
                    }
                    Err(e) => warn!(cluster = %cluster, error = %e, "Failed to list platforms"),
                }
            }
        };

        timeout(self.settings.verification_timeout, poll)
            .await
            .map_err(|_| {
                FailoverError::Timeout(format!(
                    "{} migrated resources to become ready on {}",
                    expected, cluster
                ))
            })
    }
}

fn should_failover(platform: &ObservabilityPlatform) -> bool {
    platform
        .annotations()
        .get(annotations::EXCLUDE)
        .map(|v| v != "true")
        .unwrap_or(true)
}

fn migrated_from(platform: &ObservabilityPlatform, cluster: &str) -> bool {
    platform
        .annotations()
        .get(annotations::SOURCE_CLUSTER)
        .map(|v| v == cluster)
        .unwrap_or(false)
}

fn connection_error(cluster: &str, err: FailoverError) -> FailoverError {
    match err {
        e @ FailoverError::Connection { .. } => e,
        other => FailoverError::Connection {
            cluster: cluster.to_string(),
            message: other.to_string(),
        },
    }
}

/// Copy a platform for the target: server-owned fields cleared, origin stamped.
pub(crate) fn prepare_copy(platform: &ObservabilityPlatform, from: &str) -> ObservabilityPlatform {
    let mut copy = platform.clone();
    copy.metadata.resource_version = None;
    copy.metadata.uid = None;
    copy.metadata.creation_timestamp = None;
    copy.metadata.managed_fields = None;
    copy.status = None;

    let name = platform.name_any();
    let stamped = copy.annotations_mut();
    stamped.insert(annotations::SOURCE_CLUSTER.to_string(), from.to_string());
    stamped.insert(
        annotations::FAILOVER_TIME.to_string(),
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    stamped.insert(annotations::ORIGINAL_NAME.to_string(), name);
    copy
}

/// Create the platform, or overwrite spec and metadata of the existing one.
async fn upsert(
    api: &dyn ClusterApi,
    namespace: &str,
    name: &str,
    copy: ObservabilityPlatform,
) -> Result<()> {
    match api.get_platform(namespace, name).await? {
        None => {
            api.create_platform(&copy).await?;
        }
        Some(mut existing) => {
            existing.spec = copy.spec;
            existing.metadata.labels = copy.metadata.labels;
            existing.metadata.annotations = copy.metadata.annotations;
            api.replace_platform(&existing).await?;
        }
    }
    Ok(())
}
