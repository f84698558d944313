//! Bounded failover history and its background persister.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::types::FailoverEvent;
use crate::hub::HubStore;
use crate::metrics;

/// Chronological failover history, oldest first, capped at `limit`.
#[derive(Debug, Clone)]
pub struct History {
    events: VecDeque<FailoverEvent>,
    limit: usize,
    version: u64,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(limit.min(128)),
            limit: limit.max(1),
            version: 0,
        }
    }

    /// Append an event, evicting the oldest ones past the limit.
    pub fn push(&mut self, event: FailoverEvent) {
        self.events.push_back(event);
        while self.events.len() > self.limit {
            self.events.pop_front();
        }
        self.version += 1;
    }

    /// Replace the contents with a persisted snapshot, keeping the newest entries.
    pub fn restore(&mut self, events: Vec<FailoverEvent>) {
        let skip = events.len().saturating_sub(self.limit);
        self.events = events.into_iter().skip(skip).collect();
    }

    pub fn find(&self, id: &str) -> Option<&FailoverEvent> {
        self.events.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn snapshot(&self) -> Vec<FailoverEvent> {
        self.events.iter().cloned().collect()
    }
}

/// Hands history snapshots to a single writer task.
///
/// Callers never wait on the hub: a newer snapshot simply replaces one the
/// writer has not picked up yet.
pub(crate) struct HistoryWriter {
    tx: watch::Sender<(u64, Vec<FailoverEvent>)>,
    written: watch::Receiver<u64>,
    task: JoinHandle<()>,
}

impl HistoryWriter {
    pub fn spawn(hub: Arc<dyn HubStore>) -> Self {
        let (tx, rx) = watch::channel((0, Vec::new()));
        let (written_tx, written) = watch::channel(0);
        let task = tokio::spawn(persist_loop(hub, rx, written_tx));
        Self { tx, written, task }
    }

    /// Queue a snapshot. Stale versions are dropped.
    pub fn publish(&self, version: u64, snapshot: Vec<FailoverEvent>) {
        self.tx.send_if_modified(|current| {
            if version > current.0 {
                *current = (version, snapshot);
                true
            } else {
                false
            }
        });
    }

    /// Wait until the latest queued snapshot has been handed to the hub.
    pub async fn flush(&self) {
        let target = self.tx.borrow().0;
        let mut written = self.written.clone();
        let _ = written.wait_for(|v| *v >= target).await;
    }
}

impl Drop for HistoryWriter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn persist_loop(
    hub: Arc<dyn HubStore>,
    mut rx: watch::Receiver<(u64, Vec<FailoverEvent>)>,
    written: watch::Sender<u64>,
) {
    while rx.changed().await.is_ok() {
        let (version, snapshot) = rx.borrow_and_update().clone();
        match hub.store_history(&snapshot).await {
            Ok(()) => debug!(version, events = snapshot.len(), "Failover history persisted"),
            Err(e) => {
                metrics::record_error(&e);
                warn!(error = %e, "Failed to persist failover history");
            }
        }
        written.send_replace(version);
    }
}
