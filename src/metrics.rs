//! Prometheus metrics for the failover manager

use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, register_int_counter,
    CounterVec, GaugeVec, HistogramVec, IntCounter, TextEncoder,
};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::error::FailoverError;
use crate::failover::{FailoverState, Trigger};

lazy_static::lazy_static! {
    /// Failover executions by trigger and result
    pub static ref EXECUTIONS: CounterVec = register_counter_vec!(
        "gunj_failover_executions_total",
        "Total number of failover executions",
        &["trigger", "result"]
    ).unwrap();

    /// Failover execution duration
    pub static ref EXECUTION_DURATION: HistogramVec = register_histogram_vec!(
        "gunj_failover_duration_seconds",
        "Duration of failover executions",
        &["trigger"],
        vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]
    ).unwrap();

    /// Resources migrated to a target cluster
    pub static ref MIGRATED_RESOURCES: IntCounter = register_int_counter!(
        "gunj_failover_migrated_resources_total",
        "Total number of ObservabilityPlatforms migrated"
    ).unwrap();

    /// One-hot failover state per cluster
    pub static ref CLUSTER_STATE: GaugeVec = register_gauge_vec!(
        "gunj_failover_cluster_state",
        "Failover state of each cluster (1 for the current state)",
        &["cluster", "state"]
    ).unwrap();

    /// Failover errors
    pub static ref ERRORS: CounterVec = register_counter_vec!(
        "gunj_failover_errors_total",
        "Total number of failover errors",
        &["type"]
    ).unwrap();
}

/// Run the metrics server
pub async fn run_metrics_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(port = %port, "Metrics server started");

    loop {
        match listener.accept().await {
            Ok((mut socket, _)) => {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;

                    let body = encode();
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
            Err(e) => warn!(error = %e, "Failed to accept metrics connection"),
        }
    }
}

/// Encode the default registry in the text exposition format
pub fn encode() -> String {
    let encoder = TextEncoder::new();
    encoder
        .encode_to_string(&prometheus::gather())
        .unwrap_or_default()
}

/// Record a finished failover
pub fn record_execution(trigger: Trigger, success: bool, duration_secs: f64, migrated: usize) {
    let result = if success { "success" } else { "failure" };
    EXECUTIONS
        .with_label_values(&[trigger.as_str(), result])
        .inc();
    EXECUTION_DURATION
        .with_label_values(&[trigger.as_str()])
        .observe(duration_secs);
    MIGRATED_RESOURCES.inc_by(migrated as u64);
}

/// Set the state gauge of a cluster
pub fn set_cluster_state(cluster: &str, state: FailoverState) {
    for candidate in FailoverState::ALL {
        let value = if candidate == state { 1.0 } else { 0.0 };
        CLUSTER_STATE
            .with_label_values(&[cluster, candidate.as_str()])
            .set(value);
    }
}

/// Drop the state series of a cluster no longer managed
pub fn clear_cluster_state(cluster: &str) {
    for state in FailoverState::ALL {
        let _ = CLUSTER_STATE.remove_label_values(&[cluster, state.as_str()]);
    }
}

/// Record an error
pub fn record_error(error: &FailoverError) {
    ERRORS.with_label_values(&[error.kind()]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_state_is_one_hot() {
        set_cluster_state("metrics-test", FailoverState::Active);
        set_cluster_state("metrics-test", FailoverState::Standby);

        let active = CLUSTER_STATE.with_label_values(&["metrics-test", "Active"]).get();
        let standby = CLUSTER_STATE.with_label_values(&["metrics-test", "Standby"]).get();
        assert_eq!(active, 0.0);
        assert_eq!(standby, 1.0);
    }

    #[test]
    fn test_encode_contains_families() {
        record_error(&FailoverError::Timeout("verification".into()));
        let text = encode();
        assert!(text.contains("gunj_failover_errors_total"));
    }
}
