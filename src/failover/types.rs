//! Failover records and cluster states.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-cluster failover role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailoverState {
    Active,
    Standby,
    FailingOver,
    Failed,
}

impl FailoverState {
    pub const ALL: [FailoverState; 4] = [
        FailoverState::Active,
        FailoverState::Standby,
        FailoverState::FailingOver,
        FailoverState::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailoverState::Active => "Active",
            FailoverState::Standby => "Standby",
            FailoverState::FailingOver => "FailingOver",
            FailoverState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for FailoverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a failover attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Initiated,
    Completed,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Initiated => "Initiated",
            EventStatus::Completed => "Completed",
            EventStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline step an in-flight failover is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailoverPhase {
    Validating,
    Collecting,
    Preparing,
    Migrating,
    Rerouting,
    Verifying,
}

impl FailoverPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailoverPhase::Validating => "Validating",
            FailoverPhase::Collecting => "Collecting",
            FailoverPhase::Preparing => "Preparing",
            FailoverPhase::Migrating => "Migrating",
            FailoverPhase::Rerouting => "Rerouting",
            FailoverPhase::Verifying => "Verifying",
        }
    }
}

/// What started a failover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Manual,
    Automatic,
    Revert,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Manual => "manual",
            Trigger::Automatic => "automatic",
            Trigger::Revert => "revert",
        }
    }
}

/// One failover attempt as kept in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailoverEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub from_cluster: String,
    pub to_cluster: String,
    pub reason: String,
    pub status: EventStatus,
    /// Source `namespace/name` to target `namespace/name`.
    #[serde(default)]
    pub resources_map: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FailoverEvent {
    pub fn new(id: String, from: &str, to: &str, reason: impl Into<String>) -> Self {
        Self {
            id,
            timestamp: Utc::now(),
            from_cluster: from.to_string(),
            to_cluster: to.to_string(),
            reason: reason.into(),
            status: EventStatus::Initiated,
            resources_map: BTreeMap::new(),
            error: None,
        }
    }
}

/// A failover currently executing.
#[derive(Debug, Clone)]
pub struct ActiveFailover {
    pub event: FailoverEvent,
    pub phase: FailoverPhase,
}

fn short_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// `<prefix>-<unix-millis>-<8 hex>`.
pub(crate) fn new_event_id(trigger: Trigger) -> String {
    let prefix = match trigger {
        Trigger::Automatic => "auto",
        Trigger::Manual | Trigger::Revert => "manual",
    };
    format!(
        "{}-{}-{}",
        prefix,
        Utc::now().timestamp_millis(),
        short_suffix()
    )
}

pub(crate) fn revert_event_id(original: &str) -> String {
    format!("revert-{}-{}", original, short_suffix())
}
