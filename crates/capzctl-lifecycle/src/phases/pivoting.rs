//! Pivot: move Cluster API resources into the workload cluster.

use tracing::info;

use capzctl_common::retry::retry_with_backoff;
use capzctl_common::Result;

use crate::orchestrator::Orchestrator;
use crate::state::{ClusterHandle, WorkloadCluster};

/// Make the workload cluster manage itself.
///
/// Returns the workload cluster's handle, which becomes the management
/// handle for everything that follows.
pub(crate) async fn pivot(
    orchestrator: &Orchestrator,
    management: &ClusterHandle,
    cluster: &WorkloadCluster,
) -> Result<ClusterHandle> {
    let workload = workload_handle(orchestrator, management, cluster).await?;
    info!(cluster = %cluster, from = %management.name, "pivoting cluster resources");
    orchestrator
        .pivot
        .pivot(management, &workload, cluster)
        .await?;
    info!(cluster = %cluster, "pivot complete");
    Ok(workload)
}

/// Connection details of the workload cluster, retrying transient failures.
pub(crate) async fn workload_handle(
    orchestrator: &Orchestrator,
    management: &ClusterHandle,
    cluster: &WorkloadCluster,
) -> Result<ClusterHandle> {
    retry_with_backoff(&orchestrator.config.apply_retry, "fetch workload kubeconfig", || {
        orchestrator.clusters.workload_handle(management, cluster)
    })
    .await
}
