//! Traffic re-routing hooks invoked after migration.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{FailoverError, Result};

/// Moves client traffic from one cluster to another.
#[async_trait]
pub trait NetworkHook: Send + Sync {
    async fn reroute(&self, from: &str, to: &str) -> Result<()>;
}

/// Hook that only logs the cutover, for setups where DNS/LB is managed elsewhere.
#[derive(Debug, Default, Clone)]
pub struct LoggingNetworkHook;

#[async_trait]
impl NetworkHook for LoggingNetworkHook {
    async fn reroute(&self, from: &str, to: &str) -> Result<()> {
        info!(from = %from, to = %to, "Traffic re-route requested");
        Ok(())
    }
}

#[derive(Serialize)]
struct RerouteRequest<'a> {
    from: &'a str,
    to: &'a str,
}

/// Hook that POSTs `{"from": .., "to": ..}` to an HTTP endpoint.
pub struct WebhookNetworkHook {
    client: reqwest::Client,
    url: String,
}

impl WebhookNetworkHook {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FailoverError::InvalidConfig(format!("networking webhook: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NetworkHook for WebhookNetworkHook {
    async fn reroute(&self, from: &str, to: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&RerouteRequest { from, to })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FailoverError::Connection {
                cluster: to.to_string(),
                message: format!("networking webhook failed: {}", e),
            })?;

        debug!(status = %response.status(), url = %self.url, "Networking webhook answered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logging_hook_succeeds() {
        LoggingNetworkHook.reroute("a", "b").await.unwrap();
    }

    #[test]
    fn test_request_body() {
        let body = serde_json::to_value(RerouteRequest { from: "a", to: "b" }).unwrap();
        assert_eq!(body, serde_json::json!({"from": "a", "to": "b"}));
    }
}
