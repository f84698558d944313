//! Configuration module for the failover control plane.
//!
//! Two layers live here:
//!
//! - [`FailoverConfig`]: the operator-facing failover policy (strategy,
//!   priority groups, the automatic-trigger gate). It is persisted on the hub.
//! - [`OperatorConfig`]: process settings loaded from a JSON file at startup
//!   (cluster list, hub namespace, pipeline timings).

mod selector;

pub use selector::selector_matches;

use crate::error::{FailoverError, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// Default time a cluster may stay unhealthy before it is failed over.
pub const DEFAULT_MAX_UNAVAILABLE_TIME: Duration = Duration::from_secs(5 * 60);

/// Default hub namespace for failover records.
pub const DEFAULT_HUB_NAMESPACE: &str = "gunj-multicluster";

/// Failover strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FailoverStrategy {
    /// One cluster of the top priority group serves the workload.
    #[default]
    #[serde(rename = "active-passive")]
    ActivePassive,
    /// Every cluster of the top priority group serves the workload.
    #[serde(rename = "active-active")]
    ActiveActive,
}

impl FailoverStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailoverStrategy::ActivePassive => "active-passive",
            FailoverStrategy::ActiveActive => "active-active",
        }
    }
}

impl std::fmt::Display for FailoverStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FailoverStrategy {
    type Err = FailoverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "active-passive" => Ok(FailoverStrategy::ActivePassive),
            "active-active" => Ok(FailoverStrategy::ActiveActive),
            other => Err(FailoverError::InvalidConfig(format!(
                "unknown strategy: {}",
                other
            ))),
        }
    }
}

/// An empty strategy string is accepted and means the default.
fn deserialize_strategy<'de, D>(deserializer: D) -> std::result::Result<FailoverStrategy, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    raw.parse().map_err(serde::de::Error::custom)
}

/// Failover configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailoverConfig {
    /// Gate for the automatic monitoring loop.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, deserialize_with = "deserialize_strategy")]
    pub strategy: FailoverStrategy,

    /// Unhealthy time before a cluster becomes a failover candidate.
    /// Zero means [`DEFAULT_MAX_UNAVAILABLE_TIME`].
    #[serde(default, with = "duration_secs")]
    pub max_unavailable_time: Duration,

    #[serde(default)]
    pub priority_groups: Vec<PriorityGroup>,
}

/// A group of clusters sharing one failover priority.
///
/// Groups are evaluated in list order; `priority` only identifies the group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityGroup {
    pub priority: i32,

    #[serde(default)]
    pub clusters: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,
}

impl FailoverConfig {
    /// Apply defaults for unset fields, then validate.
    pub fn normalize(mut self) -> Result<Self> {
        if self.max_unavailable_time.is_zero() {
            self.max_unavailable_time = DEFAULT_MAX_UNAVAILABLE_TIME;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate priority groups and the unavailability window.
    pub fn validate(&self) -> Result<()> {
        if self.max_unavailable_time.subsec_nanos() != 0 {
            return Err(FailoverError::InvalidConfig(format!(
                "maxUnavailableTime must be whole seconds, got {:?}",
                self.max_unavailable_time
            )));
        }

        if self.priority_groups.is_empty() {
            return Err(FailoverError::InvalidConfig(
                "at least one priority group is required".to_string(),
            ));
        }

        let mut priorities = HashSet::new();
        for group in &self.priority_groups {
            if !priorities.insert(group.priority) {
                return Err(FailoverError::InvalidConfig(format!(
                    "duplicate priority {}",
                    group.priority
                )));
            }

            if group.clusters.is_empty() && group.selector.is_none() {
                return Err(FailoverError::InvalidConfig(format!(
                    "priority group {} has no clusters or selector",
                    group.priority
                )));
            }
        }

        Ok(())
    }

    /// The group whose clusters start out active.
    pub fn top_group(&self) -> Option<&PriorityGroup> {
        self.priority_groups.first()
    }
}

impl PriorityGroup {
    /// Resolve group membership against the known cluster labels.
    ///
    /// Named clusters come first, then selector matches in the order given.
    /// Duplicates are dropped.
    pub fn resolve_members<'a, I>(&self, known: I) -> Vec<String>
    where
        I: IntoIterator<Item = (&'a str, &'a BTreeMap<String, String>)>,
    {
        let mut seen = HashSet::new();
        let mut members = Vec::new();

        for name in &self.clusters {
            if seen.insert(name.clone()) {
                members.push(name.clone());
            }
        }

        if let Some(selector) = &self.selector {
            for (name, labels) in known {
                if selector_matches(selector, labels) && seen.insert(name.to_string()) {
                    members.push(name.to_string());
                }
            }
        }

        members
    }
}

/// How the monitor picks a target among healthy clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    /// First healthy cluster in group order.
    #[default]
    FirstHealthy,
    /// Healthy cluster with the lowest CPU/memory utilization.
    LeastLoaded,
}

/// What happens to cluster states when a failover fails a hard gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FailureStatePolicy {
    /// Leave both clusters `FailingOver` for an operator to inspect.
    #[default]
    Hold,
    /// Restore both clusters to their pre-attempt states.
    Rollback,
}

/// Tunables for the failover manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerSettings {
    /// Automatic health evaluation interval.
    #[serde(with = "duration_secs")]
    pub monitor_interval: Duration,
    #[serde(with = "duration_secs")]
    pub verification_poll_interval: Duration,
    #[serde(with = "duration_secs")]
    pub verification_timeout: Duration,
    /// Maximum CPU/memory utilization (0.0-1.0) accepted on a target.
    pub capacity_threshold: f64,
    /// Namespaces created on the target before migration.
    pub required_namespaces: Vec<String>,
    /// Upper bound on concurrently running automatic failovers.
    pub max_concurrent_failovers: usize,
    pub history_limit: usize,
    /// Grace period for in-flight automatic failovers on shutdown.
    #[serde(with = "duration_secs")]
    pub shutdown_grace: Duration,
    pub selection_policy: SelectionPolicy,
    pub failure_state_policy: FailureStatePolicy,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            monitor_interval: Duration::from_secs(30),
            verification_poll_interval: Duration::from_secs(10),
            verification_timeout: Duration::from_secs(5 * 60),
            capacity_threshold: 0.8,
            required_namespaces: vec![
                "monitoring".to_string(),
                "observability".to_string(),
                "gunj-system".to_string(),
            ],
            max_concurrent_failovers: 4,
            history_limit: 100,
            shutdown_grace: Duration::from_secs(30),
            selection_policy: SelectionPolicy::FirstHealthy,
            failure_state_policy: FailureStatePolicy::Hold,
        }
    }
}

impl ManagerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.monitor_interval.is_zero() {
            return Err(invalid("settings.monitorInterval", "must be non-zero"));
        }
        if self.verification_poll_interval.is_zero() {
            return Err(invalid(
                "settings.verificationPollInterval",
                "must be non-zero",
            ));
        }
        if !(self.capacity_threshold > 0.0 && self.capacity_threshold <= 1.0) {
            return Err(invalid(
                "settings.capacityThreshold",
                "must be within (0, 1]",
            ));
        }
        if self.max_concurrent_failovers == 0 {
            return Err(invalid(
                "settings.maxConcurrentFailovers",
                "must be at least 1",
            ));
        }
        if self.history_limit == 0 {
            return Err(invalid("settings.historyLimit", "must be at least 1"));
        }
        Ok(())
    }
}

/// A managed cluster reachable through a kubeconfig context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterEntry {
    pub name: String,
    /// Kubeconfig context; defaults to the cluster name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ClusterEntry {
    pub fn context_name(&self) -> &str {
        self.context.as_deref().unwrap_or(&self.name)
    }
}

/// Process-level configuration for the failover operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatorConfig {
    /// Namespace on the hub holding config, history and events.
    pub hub_namespace: String,
    /// Kubeconfig context of the hub; `None` uses the inferred config.
    pub hub_context: Option<String>,
    pub clusters: Vec<ClusterEntry>,
    pub settings: ManagerSettings,
    /// Failover policy applied at startup when the hub has none.
    pub failover: Option<FailoverConfig>,
    /// Endpoint notified to re-route traffic after migration.
    pub networking_webhook: Option<String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            hub_namespace: DEFAULT_HUB_NAMESPACE.to_string(),
            hub_context: None,
            clusters: vec![],
            settings: ManagerSettings::default(),
            failover: None,
            networking_webhook: None,
        }
    }
}

impl OperatorConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FailoverError::InvalidConfig(format!("failed to read config file: {}", e))
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            FailoverError::InvalidConfig(format!("failed to parse config: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.hub_namespace.is_empty() {
            return Err(invalid("hubNamespace", "must not be empty"));
        }

        let mut names = HashSet::new();
        for cluster in &self.clusters {
            if cluster.name.is_empty() {
                return Err(invalid("clusters[].name", "must not be empty"));
            }
            if !names.insert(cluster.name.as_str()) {
                return Err(invalid(
                    "clusters[].name",
                    &format!("duplicate cluster {}", cluster.name),
                ));
            }
        }

        if let Some(failover) = &self.failover {
            failover.validate()?;
        }

        self.settings.validate()
    }

    /// Configuration for a local kind/minikube setup with two clusters.
    pub fn development() -> Self {
        let cluster = |name: &str, region: &str| ClusterEntry {
            name: name.to_string(),
            context: Some(format!("kind-{}", name)),
            region: Some(region.to_string()),
            labels: BTreeMap::from([("environment".to_string(), "dev".to_string())]),
        };

        Self {
            clusters: vec![cluster("primary", "local-a"), cluster("secondary", "local-b")],
            failover: Some(FailoverConfig {
                enabled: true,
                strategy: FailoverStrategy::ActivePassive,
                max_unavailable_time: Duration::from_secs(60),
                priority_groups: vec![PriorityGroup {
                    priority: 1,
                    clusters: vec!["primary".to_string(), "secondary".to_string()],
                    selector: None,
                }],
            }),
            ..Default::default()
        }
    }
}

fn invalid(field: &str, reason: &str) -> FailoverError {
    FailoverError::InvalidConfig(format!("{}: {}", field, reason))
}

/// Serializes a [`Duration`] as whole seconds.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
