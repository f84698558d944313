//! Hub cluster storage for failover config, history, and audit events.
//!
//! The hub keeps two ConfigMaps in its namespace:
//!
//! | ConfigMap          | Key            | Content                          |
//! |--------------------|----------------|----------------------------------|
//! | `failover-config`  | `config.json`  | the active [`FailoverConfig`]    |
//! | `failover-history` | `history.json` | bounded list of failover events  |
//!
//! Audit events are published as Kubernetes Events on the history ConfigMap.
//! Publishing is fire-and-forget: a failed event is logged, never returned.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::FailoverConfig;
use crate::error::{FailoverError, Result};
use crate::failover::FailoverEvent;

pub const CONFIG_MAP: &str = "failover-config";
pub const CONFIG_KEY: &str = "config.json";
pub const HISTORY_MAP: &str = "failover-history";
pub const HISTORY_KEY: &str = "history.json";

const FIELD_MANAGER: &str = "gunj-failover";
const REPORTER: &str = "gunj-failover-manager";

/// Well-known audit reasons.
pub mod reasons {
    pub const FAILOVER_STARTED: &str = "FailoverStarted";
    pub const FAILOVER_COMPLETED: &str = "FailoverCompleted";
    pub const FAILOVER_FAILED: &str = "FailoverFailed";
}

/// Severity of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    Normal,
    Warning,
}

/// A failover lifecycle event destined for the hub.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub level: AuditLevel,
    pub reason: &'static str,
    pub failover_id: String,
    pub note: String,
}

impl AuditRecord {
    pub fn normal(reason: &'static str, failover_id: &str, note: impl Into<String>) -> Self {
        Self {
            level: AuditLevel::Normal,
            reason,
            failover_id: failover_id.to_string(),
            note: note.into(),
        }
    }

    pub fn warning(reason: &'static str, failover_id: &str, note: impl Into<String>) -> Self {
        Self {
            level: AuditLevel::Warning,
            ..Self::normal(reason, failover_id, note)
        }
    }
}

/// Durable storage on the hub cluster.
#[async_trait]
pub trait HubStore: Send + Sync {
    async fn store_config(&self, config: &FailoverConfig) -> Result<()>;

    async fn load_config(&self) -> Result<Option<FailoverConfig>>;

    async fn store_history(&self, history: &[FailoverEvent]) -> Result<()>;

    /// Persisted history, oldest first; empty if none was stored.
    async fn load_history(&self) -> Result<Vec<FailoverEvent>>;

    /// Publish an audit event. Never fails.
    async fn record(&self, record: AuditRecord);
}

/// Hub store backed by ConfigMaps and Kubernetes Events.
pub struct KubeHubStore {
    client: Client,
    namespace: String,
    recorder: Recorder,
}

impl KubeHubStore {
    /// Connect to the hub and make sure its namespace exists.
    pub async fn connect(client: Client, namespace: &str) -> Result<Self> {
        let namespaces: Api<Namespace> = Api::all(client.clone());
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match namespaces.create(&PostParams::default(), &ns).await {
            Ok(_) => info!(namespace = %namespace, "Created hub namespace"),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {}
            Err(e) => return Err(e.into()),
        }

        let reporter = Reporter {
            controller: REPORTER.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };

        Ok(Self {
            recorder: Recorder::new(client.clone(), reporter),
            client,
            namespace: namespace.to_string(),
        })
    }

    fn config_maps(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    async fn upsert(&self, name: &str, key: &str, value: String) -> Result<()> {
        let api = self.config_maps();
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(self.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    "app.kubernetes.io/managed-by".to_string(),
                    FIELD_MANAGER.to_string(),
                )])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(key.to_string(), value.clone())])),
            ..Default::default()
        };

        let result = match api.create(&PostParams::default(), &cm).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                let patch = serde_json::json!({ "data": BTreeMap::from([(key, &value)]) });
                let pp = PatchParams::apply(FIELD_MANAGER);
                api.patch(name, &pp, &Patch::Merge(&patch)).await.map(|_| ())
            }
            Err(e) => Err(e),
        };

        result.map_err(|e| FailoverError::Persistence(format!("failed to store {}: {}", name, e)))?;
        debug!(config_map = %name, namespace = %self.namespace, "Hub ConfigMap stored");
        Ok(())
    }

    async fn load<T: DeserializeOwned>(&self, name: &str, key: &str) -> Result<Option<T>> {
        let Some(cm) = self.config_maps().get_opt(name).await? else {
            return Ok(None);
        };
        match cm.data.as_ref().and_then(|d| d.get(key)) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn history_ref(&self) -> ObjectReference {
        ObjectReference {
            api_version: Some("v1".to_string()),
            kind: Some("ConfigMap".to_string()),
            name: Some(HISTORY_MAP.to_string()),
            namespace: Some(self.namespace.clone()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl HubStore for KubeHubStore {
    async fn store_config(&self, config: &FailoverConfig) -> Result<()> {
        self.upsert(CONFIG_MAP, CONFIG_KEY, serde_json::to_string(config)?)
            .await
    }

    async fn load_config(&self) -> Result<Option<FailoverConfig>> {
        self.load(CONFIG_MAP, CONFIG_KEY).await
    }

    async fn store_history(&self, history: &[FailoverEvent]) -> Result<()> {
        self.upsert(HISTORY_MAP, HISTORY_KEY, serde_json::to_string(history)?)
            .await
    }

    async fn load_history(&self) -> Result<Vec<FailoverEvent>> {
        Ok(self
            .load(HISTORY_MAP, HISTORY_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn record(&self, record: AuditRecord) {
        let event = Event {
            type_: match record.level {
                AuditLevel::Normal => EventType::Normal,
                AuditLevel::Warning => EventType::Warning,
            },
            reason: record.reason.to_string(),
            note: Some(format!("[{}] {}", record.failover_id, record.note)),
            action: "Failover".to_string(),
            secondary: None,
        };

        if let Err(e) = self.recorder.publish(&event, &self.history_ref()).await {
            warn!(
                reason = record.reason,
                failover_id = %record.failover_id,
                error = %e,
                "Failed to publish failover event"
            );
        }
    }
}

/// In-process hub store.
///
/// Values are kept as serialized JSON so reads go through the same decoding
/// path as the ConfigMap store.
#[derive(Default)]
pub struct MemoryHubStore {
    config: Mutex<Option<String>>,
    history: Mutex<Option<String>>,
    records: Mutex<Vec<AuditRecord>>,
    fail_writes: Mutex<bool>,
}

impl MemoryHubStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a persistence error.
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Raw JSON last written for the history.
    pub fn history_json(&self) -> Option<String> {
        self.history.lock().clone()
    }

    fn check_writable(&self, what: &str) -> Result<()> {
        if *self.fail_writes.lock() {
            return Err(FailoverError::Persistence(format!(
                "failed to store {}: hub unavailable",
                what
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl HubStore for MemoryHubStore {
    async fn store_config(&self, config: &FailoverConfig) -> Result<()> {
        self.check_writable(CONFIG_MAP)?;
        *self.config.lock() = Some(serde_json::to_string(config)?);
        Ok(())
    }

    async fn load_config(&self) -> Result<Option<FailoverConfig>> {
        let raw = self.config.lock().clone();
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn store_history(&self, history: &[FailoverEvent]) -> Result<()> {
        self.check_writable(HISTORY_MAP)?;
        *self.history.lock() = Some(serde_json::to_string(history)?);
        Ok(())
    }

    async fn load_history(&self) -> Result<Vec<FailoverEvent>> {
        let raw = self.history.lock().clone();
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn record(&self, record: AuditRecord) {
        self.records.lock().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PriorityGroup;

    #[tokio::test]
    async fn test_memory_store_round_trips_config() {
        let store = MemoryHubStore::new();
        assert!(store.load_config().await.unwrap().is_none());

        let config = FailoverConfig {
            enabled: true,
            priority_groups: vec![PriorityGroup {
                priority: 1,
                clusters: vec!["a".to_string()],
                selector: None,
            }],
            ..Default::default()
        };
        store.store_config(&config).await.unwrap();
        assert_eq!(store.load_config().await.unwrap(), Some(config));
    }

    #[tokio::test]
    async fn test_failed_writes_surface_as_persistence_errors() {
        let store = MemoryHubStore::new();
        store.set_fail_writes(true);
        let err = store.store_history(&[]).await.unwrap_err();
        assert!(matches!(err, FailoverError::Persistence(_)));
        assert!(store.history_json().is_none());
    }

    #[test]
    fn test_warning_record() {
        let record = AuditRecord::warning(reasons::FAILOVER_FAILED, "manual-1", "boom");
        assert_eq!(record.level, AuditLevel::Warning);
        assert_eq!(record.reason, "FailoverFailed");
        assert_eq!(record.failover_id, "manual-1");
    }
}
