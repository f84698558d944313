//! Shared manager state and the execution guard.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::time::Instant;

use super::history::History;
use super::types::{ActiveFailover, FailoverEvent, FailoverPhase, FailoverState};
use crate::cluster::Cluster;
use crate::config::{FailoverConfig, FailoverStrategy};
use crate::error::{FailoverError, Result};
use crate::metrics;

/// Everything the manager mutates, behind one lock.
#[derive(Debug)]
pub(crate) struct ManagerState {
    pub config: Option<FailoverConfig>,
    pub cluster_states: BTreeMap<String, FailoverState>,
    pub active: HashMap<String, ActiveFailover>,
    pub history: History,
    /// Clusters held by a running or dispatched failover.
    pub reservations: HashSet<String>,
    /// Last healthy observation per cluster, seeded when a config is installed.
    pub last_healthy: HashMap<String, Instant>,
}

impl ManagerState {
    pub fn new(history_limit: usize) -> Self {
        Self {
            config: None,
            cluster_states: BTreeMap::new(),
            active: HashMap::new(),
            history: History::new(history_limit),
            reservations: HashSet::new(),
            last_healthy: HashMap::new(),
        }
    }

    pub fn state_of(&self, cluster: &str) -> Option<FailoverState> {
        self.cluster_states.get(cluster).copied()
    }

    pub fn set_state(&mut self, cluster: &str, state: FailoverState) {
        self.cluster_states.insert(cluster.to_string(), state);
        metrics::set_cluster_state(cluster, state);
    }

    /// Install a new config with its derived states.
    pub fn commit(&mut self, config: FailoverConfig, states: BTreeMap<String, FailoverState>) {
        for cluster in self.cluster_states.keys() {
            if !states.contains_key(cluster) {
                metrics::clear_cluster_state(cluster);
            }
        }
        for (cluster, state) in &states {
            metrics::set_cluster_state(cluster, *state);
        }
        let now = Instant::now();
        self.last_healthy = states.keys().map(|name| (name.clone(), now)).collect();
        self.config = Some(config);
        self.cluster_states = states;
    }

    pub fn is_reserved(&self, cluster: &str) -> bool {
        self.reservations.contains(cluster)
    }

    /// Reserve both clusters of a failover, or neither.
    pub fn reserve(&mut self, from: &str, to: &str) -> Result<()> {
        for cluster in [from, to] {
            if self.reservations.contains(cluster) {
                return Err(FailoverError::ClusterBusy(format!(
                    "cluster {} is already part of a running failover",
                    cluster
                )));
            }
        }
        self.reservations.insert(from.to_string());
        self.reservations.insert(to.to_string());
        Ok(())
    }

    /// Flat status view: cluster states, in-flight failovers, config summary.
    pub fn status_map(&self) -> BTreeMap<String, String> {
        let mut status = BTreeMap::new();

        for (cluster, state) in &self.cluster_states {
            status.insert(format!("cluster.{}.state", cluster), state.to_string());
        }

        for (id, active) in &self.active {
            let event = &active.event;
            status.insert(format!("failover.{}.status", id), event.status.to_string());
            status.insert(format!("failover.{}.from", id), event.from_cluster.clone());
            status.insert(format!("failover.{}.to", id), event.to_cluster.clone());
            status.insert(
                format!("failover.{}.phase", id),
                active.phase.as_str().to_string(),
            );
        }

        if let Some(config) = &self.config {
            status.insert("config.enabled".to_string(), config.enabled.to_string());
            status.insert(
                "config.strategy".to_string(),
                config.strategy.as_str().to_string(),
            );
        }

        status
    }
}

/// Compute initial cluster states for a config.
///
/// Every registry cluster and named member starts `Standby`. The first
/// listed group then gets one `Active` cluster (active-passive) or all of
/// them (active-active).
pub(crate) fn derive_states(
    config: &FailoverConfig,
    clusters: &[Cluster],
) -> BTreeMap<String, FailoverState> {
    let mut states: BTreeMap<String, FailoverState> = clusters
        .iter()
        .map(|c| (c.name.clone(), FailoverState::Standby))
        .collect();

    for group in &config.priority_groups {
        for name in &group.clusters {
            states.insert(name.clone(), FailoverState::Standby);
        }
    }

    let Some(top) = config.top_group() else {
        return states;
    };
    let members = top.resolve_members(clusters.iter().map(|c| (c.name.as_str(), &c.labels)));

    let active: Vec<&String> = match config.strategy {
        FailoverStrategy::ActivePassive => members.iter().take(1).collect(),
        FailoverStrategy::ActiveActive => members.iter().collect(),
    };
    for name in active {
        states.insert(name.clone(), FailoverState::Active);
    }

    states
}

/// Holds a failover's reservations and in-flight entry.
///
/// Dropping it releases both, whatever path the execution took.
pub(crate) struct ExecutionGuard {
    state: Arc<RwLock<ManagerState>>,
    clusters: [String; 2],
    id: Option<String>,
}

impl ExecutionGuard {
    /// Reserve `from` and `to`, failing fast if either is busy.
    pub fn acquire(state: &Arc<RwLock<ManagerState>>, from: &str, to: &str) -> Result<Self> {
        state.write().reserve(from, to)?;
        Ok(Self::reserved(state, from, to))
    }

    /// Wrap clusters already reserved under the caller's lock.
    pub fn reserved(state: &Arc<RwLock<ManagerState>>, from: &str, to: &str) -> Self {
        Self {
            state: Arc::clone(state),
            clusters: [from.to_string(), to.to_string()],
            id: None,
        }
    }

    pub fn from(&self) -> &str {
        &self.clusters[0]
    }

    pub fn to(&self) -> &str {
        &self.clusters[1]
    }

    /// Mark both clusters `FailingOver` and register the in-flight entry.
    ///
    /// Returns the states the clusters had before.
    pub fn begin(&mut self, event: &FailoverEvent) -> [Option<FailoverState>; 2] {
        let mut state = self.state.write();
        let previous = [state.state_of(self.from()), state.state_of(self.to())];
        for cluster in &self.clusters {
            state.set_state(cluster, FailoverState::FailingOver);
        }
        state.active.insert(
            event.id.clone(),
            ActiveFailover {
                event: event.clone(),
                phase: FailoverPhase::Validating,
            },
        );
        self.id = Some(event.id.clone());
        previous
    }

    pub fn set_phase(&self, phase: FailoverPhase) {
        if let Some(id) = &self.id {
            if let Some(active) = self.state.write().active.get_mut(id) {
                active.phase = phase;
            }
        }
    }
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        let mut state = self.state.write();
        if let Some(id) = self.id.take() {
            state.active.remove(&id);
        }
        for cluster in &self.clusters {
            state.reservations.remove(cluster);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PriorityGroup;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

    fn cluster(name: &str, tier: &str) -> Cluster {
        let mut c = Cluster::new(name);
        c.labels.insert("tier".to_string(), tier.to_string());
        c
    }

    fn config(strategy: FailoverStrategy, groups: Vec<PriorityGroup>) -> FailoverConfig {
        FailoverConfig {
            enabled: true,
            strategy,
            priority_groups: groups,
            ..Default::default()
        }
    }

    fn group(priority: i32, clusters: &[&str]) -> PriorityGroup {
        PriorityGroup {
            priority,
            clusters: clusters.iter().map(|c| c.to_string()).collect(),
            selector: None,
        }
    }

    #[test]
    fn test_active_passive_marks_first_of_top_group() {
        let clusters = vec![cluster("a", "1"), cluster("b", "1"), cluster("c", "2")];
        let cfg = config(
            FailoverStrategy::ActivePassive,
            vec![group(1, &["a", "b"]), group(2, &["c"])],
        );

        let states = derive_states(&cfg, &clusters);
        assert_eq!(states["a"], FailoverState::Active);
        assert_eq!(states["b"], FailoverState::Standby);
        assert_eq!(states["c"], FailoverState::Standby);
    }

    #[test]
    fn test_top_group_is_first_listed_not_lowest_priority() {
        let clusters = vec![cluster("a", "1"), cluster("b", "1"), cluster("c", "2")];
        let cfg = config(
            FailoverStrategy::ActivePassive,
            vec![group(10, &["c"]), group(1, &["a", "b"])],
        );

        let states = derive_states(&cfg, &clusters);
        assert_eq!(states["c"], FailoverState::Active);
        assert_eq!(states["a"], FailoverState::Standby);
        assert_eq!(states["b"], FailoverState::Standby);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_seeds_last_healthy() {
        let mut state = ManagerState::new(10);
        let cfg = config(FailoverStrategy::ActivePassive, vec![group(1, &["a", "b"])]);
        let states = derive_states(&cfg, &[]);

        let before = Instant::now();
        tokio::time::advance(std::time::Duration::from_secs(5)).await;
        state.commit(cfg, states);

        assert_eq!(state.last_healthy.len(), 2);
        assert!(state.last_healthy.values().all(|at| *at > before));
    }

    #[test]
    fn test_active_active_includes_selector_members() {
        let clusters = vec![cluster("a", "gold"), cluster("b", "gold"), cluster("c", "silver")];
        let mut top = group(1, &[]);
        top.selector = Some(LabelSelector {
            match_labels: Some(BTreeMap::from([("tier".to_string(), "gold".to_string())])),
            ..Default::default()
        });
        let cfg = config(FailoverStrategy::ActiveActive, vec![top, group(2, &["c"])]);

        let states = derive_states(&cfg, &clusters);
        assert_eq!(states["a"], FailoverState::Active);
        assert_eq!(states["b"], FailoverState::Active);
        assert_eq!(states["c"], FailoverState::Standby);
    }

    #[test]
    fn test_named_members_outside_registry_are_tracked() {
        let cfg = config(FailoverStrategy::ActivePassive, vec![group(1, &["ghost", "a"])]);
        let states = derive_states(&cfg, &[cluster("a", "1")]);
        assert_eq!(states["ghost"], FailoverState::Active);
        assert_eq!(states["a"], FailoverState::Standby);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let state = Arc::new(RwLock::new(ManagerState::new(10)));
        let event = FailoverEvent::new("x".to_string(), "a", "b", "test");
        {
            let mut guard = ExecutionGuard::acquire(&state, "a", "b").unwrap();
            guard.begin(&event);
            guard.set_phase(FailoverPhase::Migrating);

            assert!(ExecutionGuard::acquire(&state, "b", "c").is_err());
            let status = state.read().status_map();
            assert_eq!(status["failover.x.phase"], "Migrating");
            assert_eq!(status["cluster.a.state"], "FailingOver");
        }

        let s = state.read();
        assert!(s.active.is_empty());
        assert!(s.reservations.is_empty());
    }

    #[test]
    fn test_reserve_is_all_or_nothing() {
        let mut state = ManagerState::new(10);
        state.reserve("a", "b").unwrap();
        let err = state.reserve("c", "a").unwrap_err();
        assert!(matches!(err, FailoverError::ClusterBusy(_)));
        assert!(!state.is_reserved("c"));
    }
}
