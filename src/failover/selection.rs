//! Target selection for automatic failovers.

use std::cmp::Ordering;

use crate::cluster::ClusterMetrics;
use crate::config::SelectionPolicy;

/// A healthy cluster that may receive a failover.
#[derive(Debug, Clone)]
pub(crate) struct Eligible {
    pub name: String,
    pub metrics: Option<ClusterMetrics>,
}

/// Pick a target among `eligible`, which is in group order.
pub(crate) fn select_target<'a, I>(policy: SelectionPolicy, eligible: I) -> Option<&'a Eligible>
where
    I: IntoIterator<Item = &'a Eligible>,
{
    let mut eligible = eligible.into_iter();
    match policy {
        SelectionPolicy::FirstHealthy => eligible.next(),
        SelectionPolicy::LeastLoaded => eligible.min_by(|a, b| compare_load(a, b)),
    }
}

/// Lower peak utilization first; clusters without metrics last.
fn compare_load(a: &Eligible, b: &Eligible) -> Ordering {
    let load = |e: &Eligible| e.metrics.as_ref().and_then(ClusterMetrics::peak_utilization);
    match (load(a), load(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
