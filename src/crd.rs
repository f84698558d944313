//! Custom Resource Definitions for the failover subsystem

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// ObservabilityPlatform CRD
// ============================================================================

/// ObservabilityPlatform is the workload unit migrated between clusters
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "observability.io",
    version = "v1beta1",
    kind = "ObservabilityPlatform",
    plural = "observabilityplatforms",
    shortname = "op",
    status = "ObservabilityPlatformStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilityPlatformSpec {
    /// Observability components to deploy
    #[serde(default)]
    pub components: Components,

    /// Global settings applied to all components
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<serde_json::Value>,

    /// Node selector for the entire platform
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Whether reconciliation of this platform is paused
    #[serde(default)]
    pub paused: bool,
}

/// Component set of a platform
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Components {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus: Option<ComponentSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grafana: Option<ComponentSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loki: Option<ComponentSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo: Option<ComponentSpec>,
}

/// Settings shared by every component
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Image version to deploy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default = "default_replicas")]
    pub replicas: i32,
}

fn default_enabled() -> bool {
    true
}

fn default_replicas() -> i32 {
    1
}

impl Default for ComponentSpec {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            version: None,
            replicas: default_replicas(),
        }
    }
}

/// Status of an ObservabilityPlatform
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilityPlatformStatus {
    /// Current phase
    #[serde(default)]
    pub phase: PlatformPhase,

    /// Observed generation
    #[serde(default)]
    pub observed_generation: i64,

    /// Message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Platform phase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum PlatformPhase {
    #[default]
    Pending,
    Installing,
    Ready,
    Failed,
    Upgrading,
    Deleting,
    #[serde(other)]
    Unknown,
}

impl ObservabilityPlatform {
    /// Returns true once the owning cluster reports the platform ready.
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| s.phase == PlatformPhase::Ready)
            .unwrap_or(false)
    }
}
