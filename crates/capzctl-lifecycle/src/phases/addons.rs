//! Workload add-ons: CNI installation and the node readiness wait.
//!
//! Runs against the workload cluster after its control plane is ready. A
//! failure here leaves a usable cluster behind, so the orchestrator reports
//! it as partial success.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use capzctl_capi::AddonPlan;
use capzctl_common::retry::retry_with_backoff;
use capzctl_common::Result;

use super::provisioning::bounded;
use crate::orchestrator::Orchestrator;
use crate::state::{ClusterHandle, NodeReadiness, WorkloadCluster};

/// Apply every CNI manifest of the plan, then wait for the nodes if asked.
pub(crate) async fn install(
    orchestrator: &Orchestrator,
    workload: &ClusterHandle,
    cluster: &WorkloadCluster,
    plan: &AddonPlan,
    cancel: &CancellationToken,
) -> Result<()> {
    for source in &plan.cni_manifests {
        info!(cluster = %cluster, source = %source, "installing CNI");
        retry_with_backoff(&orchestrator.config.addon_retry, "install CNI", || {
            orchestrator.addons.install(workload, source)
        })
        .await?;
    }

    if plan.wait_for_nodes {
        let nodes = wait_for_nodes(orchestrator, workload, cluster, cancel).await?;
        info!(cluster = %cluster, nodes = nodes.total, "all nodes ready");
    }
    Ok(())
}

/// Poll node readiness until every registered node is Ready.
async fn wait_for_nodes(
    orchestrator: &Orchestrator,
    workload: &ClusterHandle,
    cluster: &WorkloadCluster,
    cancel: &CancellationToken,
) -> Result<NodeReadiness> {
    let timeout = orchestrator.config.nodes_timeout;
    let interval = orchestrator.config.poll_interval;
    info!(cluster = %cluster, timeout_secs = timeout.as_secs(), "waiting for nodes");

    let wait = async {
        loop {
            match orchestrator.addons.node_readiness(workload).await {
                Ok(nodes) if nodes.all_ready() => return Ok(nodes),
                Ok(nodes) => {
                    debug!(cluster = %cluster, ready = nodes.ready, total = nodes.total, "nodes not ready yet");
                }
                Err(e) if e.is_retryable() => {
                    warn!(cluster = %cluster, error = %e, "node check failed, will retry");
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(interval).await;
        }
    };

    bounded(&cluster.name, timeout, cancel, "waiting for nodes to become ready", wait).await
}
