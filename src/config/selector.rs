//! Label selector evaluation against cluster labels.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use std::collections::BTreeMap;
use tracing::warn;

/// Returns true if `labels` satisfy every term of `selector`.
///
/// An empty selector matches everything, as in Kubernetes.
pub fn selector_matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    let labels_ok = selector
        .match_labels
        .as_ref()
        .map(|wanted| {
            wanted
                .iter()
                .all(|(key, value)| labels.get(key) == Some(value))
        })
        .unwrap_or(true);

    labels_ok
        && selector
            .match_expressions
            .as_ref()
            .map(|exprs| exprs.iter().all(|expr| requirement_matches(expr, labels)))
            .unwrap_or(true)
}

fn requirement_matches(req: &LabelSelectorRequirement, labels: &BTreeMap<String, String>) -> bool {
    let values = req.values.as_deref().unwrap_or_default();
    let current = labels.get(&req.key);

    match req.operator.as_str() {
        "In" => current.map(|v| values.contains(v)).unwrap_or(false),
        "NotIn" => current.map(|v| !values.contains(v)).unwrap_or(true),
        "Exists" => current.is_some(),
        "DoesNotExist" => current.is_none(),
        other => {
            warn!(operator = %other, key = %req.key, "Unsupported selector operator");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn expr(key: &str, op: &str, values: &[&str]) -> LabelSelectorRequirement {
        LabelSelectorRequirement {
            key: key.to_string(),
            operator: op.to_string(),
            values: if values.is_empty() {
                None
            } else {
                Some(values.iter().map(|v| v.to_string()).collect())
            },
        }
    }

    #[test]
    fn test_empty_selector_matches_all() {
        assert!(selector_matches(&LabelSelector::default(), &labels(&[])));
    }

    #[test]
    fn test_match_labels() {
        let selector = LabelSelector {
            match_labels: Some(labels(&[("region", "eu")])),
            ..Default::default()
        };
        assert!(selector_matches(&selector, &labels(&[("region", "eu"), ("tier", "1")])));
        assert!(!selector_matches(&selector, &labels(&[("region", "us")])));
    }

    #[test]
    fn test_match_expressions() {
        let selector = LabelSelector {
            match_expressions: Some(vec![
                expr("region", "In", &["eu", "us"]),
                expr("env", "NotIn", &["dev"]),
                expr("failover", "Exists", &[]),
                expr("quarantine", "DoesNotExist", &[]),
            ]),
            ..Default::default()
        };

        assert!(selector_matches(
            &selector,
            &labels(&[("region", "eu"), ("env", "prod"), ("failover", "yes")])
        ));
        assert!(!selector_matches(
            &selector,
            &labels(&[("region", "eu"), ("env", "dev"), ("failover", "yes")])
        ));
        assert!(!selector_matches(
            &selector,
            &labels(&[("region", "eu"), ("failover", "yes"), ("quarantine", "1")])
        ));
    }

    #[test]
    fn test_unknown_operator_never_matches() {
        let selector = LabelSelector {
            match_expressions: Some(vec![expr("region", "Gt", &["1"])]),
            ..Default::default()
        };
        assert!(!selector_matches(&selector, &labels(&[("region", "2")])));
    }
}
