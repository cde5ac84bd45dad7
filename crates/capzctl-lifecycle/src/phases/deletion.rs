//! Teardown: delete the Cluster, wait for it, clean up the management cluster.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use capzctl_common::retry::retry_with_backoff;
use capzctl_common::Result;

use crate::orchestrator::Orchestrator;
use crate::phases::provisioning::bounded;
use crate::state::{ClusterHandle, WorkloadCluster};

/// Ask the management cluster to delete the Cluster object.
pub(crate) async fn request_deletion(
    orchestrator: &Orchestrator,
    handle: &ClusterHandle,
    cluster: &WorkloadCluster,
) -> Result<()> {
    info!(cluster = %cluster, "deleting cluster");
    retry_with_backoff(&orchestrator.config.apply_retry, "delete cluster", || {
        orchestrator.clusters.delete_cluster(handle, cluster)
    })
    .await
}

/// Poll until the Cluster object is gone.
pub(crate) async fn wait_for_removal(
    orchestrator: &Orchestrator,
    handle: &ClusterHandle,
    cluster: &WorkloadCluster,
    cancel: &CancellationToken,
) -> Result<()> {
    let interval = orchestrator.config.poll_interval;
    let poll = async {
        loop {
            match orchestrator.clusters.observe(handle, cluster).await {
                Ok(observed) if !observed.cluster_exists => return Ok(()),
                Ok(_) => debug!(cluster = %cluster, "cluster still being deleted"),
                Err(e) if e.is_retryable() => {
                    warn!(cluster = %cluster, error = %e, "status check failed, will retry")
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(interval).await;
        }
    };
    bounded(
        &cluster.name,
        orchestrator.config.deletion_timeout,
        cancel,
        "waiting for the cluster to be deleted",
        poll,
    )
    .await?;
    info!(cluster = %cluster, "cluster deleted");
    Ok(())
}

/// Delete a just-in-time management cluster that no longer manages anything.
///
/// Returns whether the management cluster was deleted.
pub(crate) async fn cleanup_management(
    orchestrator: &Orchestrator,
    handle: &ClusterHandle,
) -> Result<bool> {
    if !handle.is_just_in_time() {
        info!(management = %handle.name, "management cluster was not provisioned by capzctl, keeping it");
        return Ok(false);
    }

    let remaining = retry_with_backoff(&orchestrator.config.apply_retry, "list clusters", || {
        orchestrator.clusters.list_clusters(handle)
    })
    .await?;
    if !remaining.is_empty() {
        info!(
            management = %handle.name,
            remaining = remaining.len(),
            "management cluster still manages clusters, keeping it"
        );
        return Ok(false);
    }

    info!(management = %handle.name, "deleting just-in-time management cluster");
    orchestrator.management.delete(handle).await?;
    Ok(true)
}
