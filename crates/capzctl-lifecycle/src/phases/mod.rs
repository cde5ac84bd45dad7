//! Transition handlers of the lifecycle state machine.
//!
//! Each group of transitions lives in its own module. Handlers return plain
//! `Result`s; the orchestrator decides which phase a failure is charged to.

pub(crate) mod addons;
pub(crate) mod deletion;
pub(crate) mod management;
pub(crate) mod pivoting;
pub(crate) mod provisioning;

use capzctl_common::retry::retry_with_backoff;
use capzctl_common::Result;

use crate::orchestrator::Orchestrator;
use crate::state::{ClusterHandle, ObservedCluster, WorkloadCluster};

/// Observe a workload cluster, retrying transient failures
pub(crate) async fn observe(
    orchestrator: &Orchestrator,
    handle: &ClusterHandle,
    cluster: &WorkloadCluster,
) -> Result<ObservedCluster> {
    retry_with_backoff(&orchestrator.config.apply_retry, "observe cluster", || {
        orchestrator.clusters.observe(handle, cluster)
    })
    .await
}
