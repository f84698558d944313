//! Health-driven automatic failover.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::selection::{select_target, Eligible};
use super::state::ExecutionGuard;
use super::types::{new_event_id, FailoverEvent, FailoverState, Trigger};
use super::{FailoverManager, AUTOMATIC_REASON};
use crate::cluster::ClusterHealth;
use crate::shutdown::ShutdownCoordinator;

/// A failover chosen by an evaluation pass, with its clusters reserved.
pub(crate) struct PlannedFailover {
    pub guard: ExecutionGuard,
    pub event: FailoverEvent,
}

/// Running health monitor.
pub struct MonitorHandle {
    coordinator: ShutdownCoordinator,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Wait for the monitor to exit after its coordinator shut down.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            if e.is_panic() {
                error!(error = %e, "Failover monitor panicked");
            }
        }
    }

    /// Stop the monitor and wait for in-flight failovers to drain.
    pub async fn shutdown(self) {
        self.coordinator.shutdown();
        self.join().await;
    }
}

impl FailoverManager {
    /// Start the periodic health evaluation.
    ///
    /// The first pass runs one `monitor_interval` after start. The monitor
    /// stops when `coordinator` shuts down.
    pub fn start_monitoring(&self, coordinator: ShutdownCoordinator) -> MonitorHandle {
        let task = tokio::spawn(monitor_loop(self.clone(), coordinator.clone()));
        info!(
            interval = ?self.settings().monitor_interval,
            max_concurrent = self.settings().max_concurrent_failovers,
            "Failover monitor started"
        );
        MonitorHandle { coordinator, task }
    }

    /// One evaluation pass: check every group member and plan failovers.
    pub(crate) async fn evaluate(&self) -> Vec<PlannedFailover> {
        let Some(config) = self.config() else {
            return Vec::new();
        };
        if !config.enabled {
            return Vec::new();
        }

        let collab = &self.inner.collaborators;
        let clusters = match collab.registry.list().await {
            Ok(clusters) => clusters,
            Err(e) => {
                warn!(error = %e, "Failed to list clusters, selectors will not match");
                Vec::new()
            }
        };

        let groups: Vec<Vec<String>> = config
            .priority_groups
            .iter()
            .map(|g| g.resolve_members(clusters.iter().map(|c| (c.name.as_str(), &c.labels))))
            .collect();

        let mut names: Vec<&String> = groups.iter().flatten().collect();
        names.sort();
        names.dedup();

        let readings = join_all(names.iter().map(|name| async move {
            let health = match collab.health.check_health(name).await {
                Ok(health) => Some(health),
                Err(e) => {
                    warn!(cluster = %name, error = %e, "Health check failed");
                    None
                }
            };
            ((*name).clone(), health)
        }))
        .await;
        let health: HashMap<String, Option<ClusterHealth>> = readings.into_iter().collect();

        self.plan(&groups, &health, config.max_unavailable_time)
    }

    /// Classify group members and reserve a target for each candidate.
    fn plan(
        &self,
        groups: &[Vec<String>],
        health: &HashMap<String, Option<ClusterHealth>>,
        max_unavailable: std::time::Duration,
    ) -> Vec<PlannedFailover> {
        let now = Instant::now();
        let policy = self.settings().selection_policy;
        let mut state = self.inner.state.write();

        let mut candidates: Vec<Vec<String>> = Vec::with_capacity(groups.len());
        let mut eligible: Vec<Vec<Eligible>> = Vec::with_capacity(groups.len());

        for members in groups {
            let mut group_candidates = Vec::new();
            let mut group_eligible = Vec::new();

            for name in members {
                let current = state.state_of(name);
                if current == Some(FailoverState::FailingOver) || state.is_reserved(name) {
                    continue;
                }

                let reading = health.get(name).and_then(Option::as_ref);
                if current == Some(FailoverState::Failed) {
                    group_candidates.push(name.clone());
                    continue;
                }

                match reading {
                    Some(h) if h.is_ready() => {
                        state.last_healthy.insert(name.clone(), now);
                        group_eligible.push(Eligible {
                            name: name.clone(),
                            metrics: h.metrics.clone(),
                        });
                    }
                    _ => {
                        let healthy_at = *state.last_healthy.entry(name.clone()).or_insert(now);
                        let unhealthy_for = now.duration_since(healthy_at);
                        debug!(cluster = %name, unhealthy_for = ?unhealthy_for, "Cluster unhealthy");
                        if current == Some(FailoverState::Active) && unhealthy_for >= max_unavailable {
                            group_candidates.push(name.clone());
                        }
                    }
                }
            }

            candidates.push(group_candidates);
            eligible.push(group_eligible);
        }

        let mut planned = Vec::new();
        for (index, group_candidates) in candidates.iter().enumerate() {
            for from in group_candidates {
                if state.is_reserved(from) {
                    continue;
                }

                let target = {
                    let free = |e: &&Eligible| !state.is_reserved(&e.name) && e.name != *from;
                    let own = eligible[index].iter().filter(free);
                    match select_target(policy, own) {
                        Some(t) => Some(t.name.clone()),
                        None => select_target(
                            policy,
                            eligible[index + 1..].iter().flatten().filter(free),
                        )
                        .map(|t| t.name.clone()),
                    }
                };

                let Some(to) = target else {
                    warn!(cluster = %from, "No healthy target cluster available for failover");
                    continue;
                };

                if let Err(e) = state.reserve(from, &to) {
                    warn!(from = %from, to = %to, error = %e, "Skipping automatic failover");
                    continue;
                }

                info!(from = %from, to = %to, "Triggering automatic failover");
                planned.push(PlannedFailover {
                    guard: ExecutionGuard::reserved(&self.inner.state, from, &to),
                    event: FailoverEvent::new(
                        new_event_id(Trigger::Automatic),
                        from,
                        &to,
                        AUTOMATIC_REASON,
                    ),
                });
            }
        }

        planned
    }

    /// Evaluate once and run the planned failovers to completion.
    pub(crate) async fn evaluate_and_run(&self) -> usize {
        let planned = self.evaluate().await;
        let count = planned.len();
        let runs = planned.into_iter().map(|p| async move {
            let _ = self.run_failover(p.guard, p.event, Trigger::Automatic).await;
        });
        join_all(runs).await;
        count
    }
}

async fn monitor_loop(manager: FailoverManager, coordinator: ShutdownCoordinator) {
    let settings = manager.settings().clone();
    let permits = Arc::new(Semaphore::new(settings.max_concurrent_failovers));
    let mut tasks: JoinSet<()> = JoinSet::new();

    let mut ticker = interval(settings.monitor_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = coordinator.wait_for_shutdown() => break,
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "Automatic failover task aborted");
                }
            }
            _ = ticker.tick() => {
                for planned in manager.evaluate().await {
                    let manager = manager.clone();
                    let permits = Arc::clone(&permits);
                    tasks.spawn(async move {
                        let Ok(_permit) = permits.acquire_owned().await else {
                            return;
                        };
                        let _ = manager
                            .run_failover(planned.guard, planned.event, Trigger::Automatic)
                            .await;
                    });
                }
            }
        }
    }

    if !tasks.is_empty() {
        info!(
            in_flight = tasks.len(),
            grace = ?settings.shutdown_grace,
            "Waiting for automatic failovers to finish"
        );
        let drained = timeout(settings.shutdown_grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(remaining = tasks.len(), "Aborting automatic failovers after grace period");
            tasks.shutdown().await;
        }
    }

    info!("Failover monitor stopped");
}
