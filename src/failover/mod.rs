//! Multi-cluster failover manager.
//!
//! The [`FailoverManager`] owns the per-cluster [`FailoverState`] map and
//! moves `ObservabilityPlatform` resources from a failing cluster to a
//! healthy one. Failovers start from three places:
//!
//! - [`FailoverManager::trigger_failover`]: an operator asks for one
//! - [`FailoverManager::revert_failover`]: undo a recorded failover
//! - the health monitor started by [`FailoverManager::start_monitoring`]
//!
//! All of them share one execution path. It reserves both clusters, runs the
//! [pipeline](pipeline), finalizes or fails the attempt, and records it in
//! the bounded history persisted on the hub.
//!
//! # Locking
//!
//! A single `parking_lot::RwLock` guards the state. It is never held across
//! an `.await`; all cluster and hub I/O happens outside of it.

mod history;
mod monitor;
mod pipeline;
mod scenario;
mod selection;
mod state;
mod types;

pub use history::History;
pub use monitor::MonitorHandle;
pub use pipeline::{annotations, PREPARED_LABEL};
pub use scenario::DrillScenario;
pub use types::{ActiveFailover, EventStatus, FailoverEvent, FailoverPhase, FailoverState, Trigger};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{error, info, warn};

use crate::cluster::{ClusterHealthChecker, ClusterRegistry};
use crate::config::{FailoverConfig, FailureStatePolicy, ManagerSettings};
use crate::error::{FailoverError, Result};
use crate::hub::{reasons, AuditRecord, HubStore};
use crate::metrics;
use crate::networking::NetworkHook;

use history::HistoryWriter;
use pipeline::Pipeline;
use state::{derive_states, ExecutionGuard, ManagerState};
use types::{new_event_id, revert_event_id};

const MANUAL_REASON: &str = "Manual failover";
const AUTOMATIC_REASON: &str = "Automatic failover due to cluster failure";

/// External systems the manager works through.
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<dyn ClusterRegistry>,
    pub health: Arc<dyn ClusterHealthChecker>,
    pub hub: Arc<dyn HubStore>,
    pub network: Arc<dyn NetworkHook>,
}

/// Cloneable handle to the failover manager.
#[derive(Clone)]
pub struct FailoverManager {
    inner: Arc<Inner>,
}

struct Inner {
    collaborators: Collaborators,
    settings: ManagerSettings,
    state: Arc<RwLock<ManagerState>>,
    history_writer: HistoryWriter,
}

impl FailoverManager {
    /// Create a manager. Must be called inside a Tokio runtime.
    pub fn new(collaborators: Collaborators, settings: ManagerSettings) -> Self {
        let history_writer = HistoryWriter::spawn(Arc::clone(&collaborators.hub));
        let state = Arc::new(RwLock::new(ManagerState::new(settings.history_limit)));

        Self {
            inner: Arc::new(Inner {
                collaborators,
                settings,
                state,
                history_writer,
            }),
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.inner.settings
    }

    /// Validate and install a failover config, deriving fresh cluster states.
    ///
    /// The config is persisted to the hub before it takes effect. Any error
    /// leaves the previous config and states untouched.
    pub async fn configure_failover(&self, config: FailoverConfig) -> Result<()> {
        self.apply_config(config, true).await
    }

    async fn apply_config(&self, config: FailoverConfig, persist: bool) -> Result<()> {
        let config = config.normalize()?;
        let clusters = self.inner.collaborators.registry.list().await?;
        let states = derive_states(&config, &clusters);

        if persist {
            self.inner.collaborators.hub.store_config(&config).await?;
        }

        info!(
            strategy = %config.strategy,
            enabled = config.enabled,
            groups = config.priority_groups.len(),
            clusters = states.len(),
            "Failover configured"
        );
        self.inner.state.write().commit(config, states);
        Ok(())
    }

    /// Load the persisted config and history from the hub.
    pub async fn restore_from_hub(&self) -> Result<()> {
        let hub = &self.inner.collaborators.hub;

        if let Some(config) = hub.load_config().await? {
            self.apply_config(config, false).await?;
        }

        let history = hub.load_history().await?;
        let restored = history.len();
        self.inner.state.write().history.restore(history);
        info!(events = restored, "Restored failover state from hub");
        Ok(())
    }

    /// Flat status map of cluster states, in-flight failovers and config.
    pub fn failover_status(&self) -> BTreeMap<String, String> {
        self.inner.state.read().status_map()
    }

    pub fn cluster_state(&self, cluster: &str) -> Option<FailoverState> {
        self.inner.state.read().state_of(cluster)
    }

    /// History snapshot, oldest first.
    pub fn history(&self) -> Vec<FailoverEvent> {
        self.inner.state.read().history.snapshot()
    }

    pub fn config(&self) -> Option<FailoverConfig> {
        self.inner.state.read().config.clone()
    }

    pub fn active_failovers(&self) -> Vec<ActiveFailover> {
        self.inner.state.read().active.values().cloned().collect()
    }

    /// Wait until the latest history snapshot has been written to the hub.
    pub async fn flush_history(&self) {
        self.inner.history_writer.flush().await;
    }

    /// Fail over from `from` to `to` and wait for the outcome.
    pub async fn trigger_failover(&self, from: &str, to: &str) -> Result<FailoverEvent> {
        info!(from = %from, to = %to, "Manual failover requested");
        let guard = self.reserve(from, to)?;
        let event = FailoverEvent::new(new_event_id(Trigger::Manual), from, to, MANUAL_REASON);
        self.run_failover(guard, event, Trigger::Manual).await
    }

    /// Run the recorded failover `id` in reverse.
    pub async fn revert_failover(&self, id: &str) -> Result<FailoverEvent> {
        info!(id = %id, "Reverting failover");
        let original = self
            .inner
            .state
            .read()
            .history
            .find(id)
            .cloned()
            .ok_or_else(|| FailoverError::NotFound(format!("failover event {}", id)))?;

        let from = original.to_cluster;
        let to = original.from_cluster;
        let guard = self.reserve(&from, &to)?;
        let event = FailoverEvent::new(
            revert_event_id(id),
            &from,
            &to,
            format!("Revert failover {}", id),
        );
        self.run_failover(guard, event, Trigger::Revert).await
    }

    fn reserve(&self, from: &str, to: &str) -> Result<ExecutionGuard> {
        if from == to {
            return Err(FailoverError::InvalidArgument(format!(
                "cannot fail over cluster {} to itself",
                from
            )));
        }
        ExecutionGuard::acquire(&self.inner.state, from, to).map_err(|e| {
            metrics::record_error(&e);
            warn!(from = %from, to = %to, error = %e, "Failover rejected");
            e
        })
    }

    /// Execute one failover end to end and record its outcome.
    pub(crate) async fn run_failover(
        &self,
        mut guard: ExecutionGuard,
        mut event: FailoverEvent,
        trigger: Trigger,
    ) -> Result<FailoverEvent> {
        let started = Instant::now();
        let collab = &self.inner.collaborators;
        let (from, to) = (event.from_cluster.clone(), event.to_cluster.clone());

        let previous = guard.begin(&event);
        collab
            .hub
            .record(AuditRecord::normal(
                reasons::FAILOVER_STARTED,
                &event.id,
                format!("Starting failover from {} to {}", from, to),
            ))
            .await;
        info!(id = %event.id, from = %from, to = %to, trigger = trigger.as_str(), "Failover started");

        let pipeline = Pipeline {
            registry: collab.registry.as_ref(),
            health: collab.health.as_ref(),
            network: collab.network.as_ref(),
            settings: &self.inner.settings,
        };
        let outcome = pipeline.execute(&guard, &mut event).await;

        match &outcome {
            Ok(()) => {
                event.status = EventStatus::Completed;
                {
                    let mut state = self.inner.state.write();
                    state.set_state(&from, FailoverState::Standby);
                    state.set_state(&to, FailoverState::Active);
                }
                collab
                    .hub
                    .record(AuditRecord::normal(
                        reasons::FAILOVER_COMPLETED,
                        &event.id,
                        format!("Successfully failed over from {} to {}", from, to),
                    ))
                    .await;
                info!(
                    id = %event.id,
                    from = %from,
                    to = %to,
                    resources = event.resources_map.len(),
                    "Failover completed"
                );
            }
            Err(e) => {
                event.status = EventStatus::Failed;
                event.error = Some(e.to_string());
                metrics::record_error(e);

                if self.inner.settings.failure_state_policy == FailureStatePolicy::Rollback {
                    let mut state = self.inner.state.write();
                    for (cluster, prior) in [(&from, previous[0]), (&to, previous[1])] {
                        match prior {
                            Some(s) => state.set_state(cluster, s),
                            None => {
                                state.cluster_states.remove(cluster.as_str());
                                metrics::clear_cluster_state(cluster);
                            }
                        }
                    }
                }

                collab
                    .hub
                    .record(AuditRecord::warning(
                        reasons::FAILOVER_FAILED,
                        &event.id,
                        format!("Failover from {} to {} failed: {}", from, to, e),
                    ))
                    .await;
                error!(id = %event.id, from = %from, to = %to, error = %e, "Failover failed");
            }
        }

        let (version, snapshot) = {
            let mut state = self.inner.state.write();
            state.history.push(event.clone());
            (state.history.version(), state.history.snapshot())
        };
        self.inner.history_writer.publish(version, snapshot);

        metrics::record_execution(
            trigger,
            outcome.is_ok(),
            started.elapsed().as_secs_f64(),
            event.resources_map.len(),
        );
        drop(guard);

        outcome.map(|()| event)
    }
}
