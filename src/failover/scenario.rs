//! Failover drills.

use std::str::FromStr;

use tracing::{info, warn};

use super::types::FailoverState;
use super::FailoverManager;
use crate::error::{FailoverError, Result};

/// A named failover drill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrillScenario {
    /// Mark the primary cluster failed and let automatic failover react.
    PrimaryFailure,
    NetworkPartition,
    CascadingFailure,
}

impl DrillScenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrillScenario::PrimaryFailure => "primary-failure",
            DrillScenario::NetworkPartition => "network-partition",
            DrillScenario::CascadingFailure => "cascading-failure",
        }
    }
}

impl FromStr for DrillScenario {
    type Err = FailoverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "primary-failure" => Ok(DrillScenario::PrimaryFailure),
            "network-partition" => Ok(DrillScenario::NetworkPartition),
            "cascading-failure" => Ok(DrillScenario::CascadingFailure),
            other => Err(FailoverError::InvalidArgument(format!(
                "unknown test scenario: {}",
                other
            ))),
        }
    }
}

impl FailoverManager {
    /// Run a drill by name.
    pub async fn test_failover(&self, scenario: &str) -> Result<()> {
        let scenario: DrillScenario = scenario.parse()?;
        info!(scenario = scenario.as_str(), "Running failover test");

        match scenario {
            DrillScenario::PrimaryFailure => self.drill_primary_failure().await,
            DrillScenario::NetworkPartition => {
                info!("Testing network partition scenario");
                Ok(())
            }
            DrillScenario::CascadingFailure => {
                info!("Testing cascading failure scenario");
                Ok(())
            }
        }
    }

    async fn drill_primary_failure(&self) -> Result<()> {
        let primary = {
            let mut state = self.inner.state.write();
            let primary = state
                .cluster_states
                .iter()
                .find(|(_, s)| **s == FailoverState::Active)
                .map(|(name, _)| name.clone())
                .ok_or_else(|| FailoverError::NotFound("no active cluster found".to_string()))?;
            state.set_state(&primary, FailoverState::Failed);
            primary
        };

        warn!(cluster = %primary, "Simulating primary cluster failure");
        let dispatched = self.evaluate_and_run().await;
        info!(cluster = %primary, failovers = dispatched, "Primary failure drill finished");
        Ok(())
    }
}
