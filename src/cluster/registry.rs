//! Cluster registry backed by kubeconfig contexts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use parking_lot::RwLock;
use tracing::{debug, info};

use super::{Cluster, ClusterApi, ClusterRegistry, KubeClusterApi};
use crate::config::ClusterEntry;
use crate::error::{FailoverError, Result};

/// Registry of member clusters, one kubeconfig context each.
///
/// Clients are created lazily on first use and cached by cluster name.
pub struct KubeconfigRegistry {
    entries: Vec<ClusterEntry>,
    kubeconfig: Option<Kubeconfig>,
    clients: RwLock<HashMap<String, Client>>,
}

impl KubeconfigRegistry {
    /// Build a registry reading the default kubeconfig location.
    pub fn new(entries: Vec<ClusterEntry>) -> Self {
        Self {
            entries,
            kubeconfig: None,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Build a registry over an explicit kubeconfig document.
    pub fn with_kubeconfig(entries: Vec<ClusterEntry>, kubeconfig: Kubeconfig) -> Self {
        Self {
            entries,
            kubeconfig: Some(kubeconfig),
            clients: RwLock::new(HashMap::new()),
        }
    }

    fn entry(&self, name: &str) -> Result<&ClusterEntry> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| FailoverError::NotFound(format!("cluster {name}")))
    }

    /// Get (or create) the client for a registered cluster.
    pub async fn client(&self, name: &str) -> Result<Client> {
        let cached = self.clients.read().get(name).cloned();
        if let Some(client) = cached {
            return Ok(client);
        }

        let entry = self.entry(name)?;
        let options = KubeConfigOptions {
            context: Some(entry.context_name().to_string()),
            ..Default::default()
        };

        let config = match &self.kubeconfig {
            Some(kubeconfig) => Config::from_custom_kubeconfig(kubeconfig.clone(), &options).await,
            None => Config::from_kubeconfig(&options).await,
        }
        .map_err(|e| FailoverError::Connection {
            cluster: name.to_string(),
            message: e.to_string(),
        })?;

        let client = Client::try_from(config).map_err(|e| FailoverError::Connection {
            cluster: name.to_string(),
            message: e.to_string(),
        })?;

        info!(cluster = %name, context = %entry.context_name(), "Connected to cluster");
        self.clients
            .write()
            .insert(name.to_string(), client.clone());
        Ok(client)
    }

    /// Drop a cached client so the next call reconnects.
    pub fn invalidate(&self, name: &str) {
        if self.clients.write().remove(name).is_some() {
            debug!(cluster = %name, "Dropped cached client");
        }
    }
}

#[async_trait]
impl ClusterRegistry for KubeconfigRegistry {
    async fn list(&self) -> Result<Vec<Cluster>> {
        Ok(self
            .entries
            .iter()
            .map(|e| Cluster {
                name: e.name.clone(),
                labels: e.labels.clone(),
                region: e.region.clone(),
            })
            .collect())
    }

    async fn connection(&self, name: &str) -> Result<Arc<dyn ClusterApi>> {
        let client = self.client(name).await?;
        Ok(Arc::new(KubeClusterApi::new(client)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn entry(name: &str, region: &str) -> ClusterEntry {
        ClusterEntry {
            name: name.to_string(),
            context: None,
            region: Some(region.to_string()),
            labels: BTreeMap::from([("region".to_string(), region.to_string())]),
        }
    }

    #[tokio::test]
    async fn test_list_reflects_entries() {
        let registry = KubeconfigRegistry::new(vec![entry("east", "us-east"), entry("west", "us-west")]);
        let clusters = registry.list().await.unwrap();

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].name, "east");
        assert_eq!(clusters[1].region.as_deref(), Some("us-west"));
        assert_eq!(clusters[1].labels.get("region").map(String::as_str), Some("us-west"));
    }

    #[tokio::test]
    async fn test_unknown_cluster_is_not_found() {
        let registry = KubeconfigRegistry::new(vec![entry("east", "us-east")]);
        let err = registry.client("nowhere").await.err().unwrap();
        assert!(err.is_not_found());
    }
}
