//! Error types for the failover control plane.
//!
//! Every failover attempt is scoped: nothing in here is fatal to the hosting
//! process. Errors fall into a handful of categories:
//!
//! - **Configuration**: invalid strategy or priority groups, rejected before
//!   any state changes
//! - **Validation**: the target cluster is unhealthy or over capacity
//! - **Connectivity**: the registry could not reach a cluster
//! - **Verification**: migrated resources never became ready in time
//! - **Persistence**: the hub cluster rejected a config/history write

use thiserror::Error;

/// Main error type for failover operations.
#[derive(Error, Debug)]
pub enum FailoverError {
    #[error("invalid failover config: {0}")]
    InvalidConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("cluster busy: {0}")]
    ClusterBusy(String),

    #[error("target cluster {cluster} is not ready: {status}")]
    TargetNotReady { cluster: String, status: String },

    #[error("target cluster {cluster} {resource} usage too high: {utilization:.2}%")]
    CapacityExceeded {
        cluster: String,
        resource: String,
        utilization: f64,
    },

    #[error("failed to connect to cluster {cluster}: {message}")]
    Connection { cluster: String, message: String },

    #[error("failed to check health of cluster {cluster}: {message}")]
    HealthCheck { cluster: String, message: String },

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("timeout waiting for {0}")]
    Timeout(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A hard-gate failure wrapped with the pipeline phase it happened in.
    #[error("{context}: {source}")]
    Phase {
        context: &'static str,
        #[source]
        source: Box<FailoverError>,
    },
}

impl FailoverError {
    /// Wrap this error with pipeline phase context.
    pub fn in_phase(self, context: &'static str) -> Self {
        FailoverError::Phase {
            context,
            source: Box::new(self),
        }
    }

    /// Short, stable label used for the error metric.
    pub fn kind(&self) -> &'static str {
        match self {
            FailoverError::InvalidConfig(_) => "invalid_config",
            FailoverError::InvalidArgument(_) => "invalid_argument",
            FailoverError::NotFound(_) => "not_found",
            FailoverError::ClusterBusy(_) => "cluster_busy",
            FailoverError::TargetNotReady { .. } => "target_not_ready",
            FailoverError::CapacityExceeded { .. } => "capacity_exceeded",
            FailoverError::Connection { .. } => "connection",
            FailoverError::HealthCheck { .. } => "health_check",
            FailoverError::Kube(_) => "kube",
            FailoverError::Timeout(_) => "timeout",
            FailoverError::Serialization(_) => "serialization",
            FailoverError::Persistence(_) => "persistence",
            FailoverError::Io(_) => "io",
            FailoverError::Phase { source, .. } => source.kind(),
        }
    }

    /// Returns the innermost error, skipping phase wrappers.
    pub fn root(&self) -> &FailoverError {
        match self {
            FailoverError::Phase { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns true if the Kubernetes API answered 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), FailoverError::Kube(kube::Error::Api(ae)) if ae.code == 404)
            || matches!(self.root(), FailoverError::NotFound(_))
    }

    /// Returns true if the Kubernetes API answered 409.
    pub fn is_already_exists(&self) -> bool {
        matches!(self.root(), FailoverError::Kube(kube::Error::Api(ae)) if ae.code == 409)
    }
}

/// Result type alias for failover operations.
pub type Result<T> = std::result::Result<T, FailoverError>;
