//! `ClusterApi` over a live `kube::Client`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ListParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

use super::ClusterApi;
use crate::crd::ObservabilityPlatform;
use crate::error::{FailoverError, Result};

/// Cluster API backed by the Kubernetes API server of one member cluster.
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn platforms(&self, namespace: &str) -> Api<ObservabilityPlatform> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list_platforms(&self) -> Result<Vec<ObservabilityPlatform>> {
        let api: Api<ObservabilityPlatform> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn get_platform(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ObservabilityPlatform>> {
        Ok(self.platforms(namespace).get_opt(name).await?)
    }

    async fn create_platform(
        &self,
        platform: &ObservabilityPlatform,
    ) -> Result<ObservabilityPlatform> {
        let namespace = namespace_of(platform)?;
        let created = self
            .platforms(&namespace)
            .create(&PostParams::default(), platform)
            .await?;
        debug!(name = %created.name_any(), namespace = %namespace, "Platform created");
        Ok(created)
    }

    async fn replace_platform(
        &self,
        platform: &ObservabilityPlatform,
    ) -> Result<ObservabilityPlatform> {
        let namespace = namespace_of(platform)?;
        let name = platform.name_any();
        let replaced = self
            .platforms(&namespace)
            .replace(&name, &PostParams::default(), platform)
            .await?;
        debug!(name = %name, namespace = %namespace, "Platform replaced");
        Ok(replaced)
    }

    async fn ensure_namespace(&self, name: &str, labels: &BTreeMap<String, String>) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            ..Default::default()
        };

        match api.create(&PostParams::default(), &ns).await {
            Ok(_) => {
                debug!(namespace = %name, "Namespace created");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn namespace_of(platform: &ObservabilityPlatform) -> Result<String> {
    platform.namespace().ok_or_else(|| {
        FailoverError::InvalidArgument(format!(
            "platform {} has no namespace",
            platform.name_any()
        ))
    })
}
