// Test fixtures for failover integration tests

use std::time::Duration;

use gunj_failover::config::{
    FailoverConfig, FailoverStrategy, ManagerSettings, PriorityGroup, SelectionPolicy,
};
use gunj_failover::crd::{ComponentSpec, Components, ObservabilityPlatform, ObservabilityPlatformSpec};
use gunj_failover::failover::annotations;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::ResourceExt;

/// Settings with short timings so pipelines finish quickly
pub fn fast_settings() -> ManagerSettings {
    ManagerSettings {
        monitor_interval: Duration::from_secs(1),
        verification_poll_interval: Duration::from_millis(10),
        verification_timeout: Duration::from_millis(500),
        shutdown_grace: Duration::from_secs(2),
        required_namespaces: vec!["monitoring".to_string(), "gunj-system".to_string()],
        ..Default::default()
    }
}

pub fn least_loaded_settings() -> ManagerSettings {
    ManagerSettings {
        selection_policy: SelectionPolicy::LeastLoaded,
        ..fast_settings()
    }
}

/// A platform with Prometheus and Grafana enabled
pub fn platform(namespace: &str, name: &str) -> ObservabilityPlatform {
    let spec = ObservabilityPlatformSpec {
        components: Components {
            prometheus: Some(ComponentSpec {
                version: Some("v2.48.0".to_string()),
                replicas: 2,
                ..Default::default()
            }),
            grafana: Some(ComponentSpec::default()),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut p = ObservabilityPlatform::new(name, spec);
    p.metadata.namespace = Some(namespace.to_string());
    p.labels_mut().insert("app.kubernetes.io/part-of".to_string(), "gunj".to_string());
    p
}

/// A platform annotated to stay on its cluster
pub fn excluded_platform(namespace: &str, name: &str) -> ObservabilityPlatform {
    let mut p = platform(namespace, name);
    p.annotations_mut()
        .insert(annotations::EXCLUDE.to_string(), "true".to_string());
    p
}

pub fn group(priority: i32, clusters: &[&str]) -> PriorityGroup {
    PriorityGroup {
        priority,
        clusters: clusters.iter().map(|c| c.to_string()).collect(),
        selector: None,
    }
}

pub fn selector_group(priority: i32, labels: &[(&str, &str)]) -> PriorityGroup {
    PriorityGroup {
        priority,
        clusters: Vec::new(),
        selector: Some(LabelSelector {
            match_labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }),
    }
}

/// Enabled active-passive config over the given groups
pub fn config(groups: Vec<PriorityGroup>) -> FailoverConfig {
    FailoverConfig {
        enabled: true,
        strategy: FailoverStrategy::ActivePassive,
        max_unavailable_time: Duration::from_secs(3),
        priority_groups: groups,
    }
}
