//! Manifest submission and control-plane readiness.
//!
//! Submission is retried for transient failures only. The readiness wait is
//! bounded by the configured timeout and ends early on cancellation; neither
//! retracts manifests that were already applied.

use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use capzctl_capi::ManifestBundle;
use capzctl_common::retry::retry_with_backoff;
use capzctl_common::{Error, Result};

use crate::orchestrator::Orchestrator;
use crate::state::{ClusterHandle, StatusSnapshot, WorkloadCluster};

/// Submit the bundle to the management cluster.
pub(crate) async fn apply_manifests(
    orchestrator: &Orchestrator,
    handle: &ClusterHandle,
    bundle: &ManifestBundle,
) -> Result<()> {
    info!(management = %handle.name, manifests = bundle.len(), "applying manifests");
    retry_with_backoff(&orchestrator.config.apply_retry, "apply manifests", || {
        orchestrator.clusters.apply(handle, bundle)
    })
    .await
}

/// Manifests of the bundle that did not land on the management cluster.
///
/// An apply that failed midway leaves the Cluster object behind, which is
/// enough for phase derivation to report the manifests as applied.
pub(crate) async fn missing_manifests(
    orchestrator: &Orchestrator,
    handle: &ClusterHandle,
    bundle: &ManifestBundle,
) -> Result<Vec<String>> {
    retry_with_backoff(&orchestrator.config.apply_retry, "check applied manifests", || {
        orchestrator.clusters.missing_manifests(handle, bundle)
    })
    .await
}

/// Follow the status stream until the control plane is ready.
///
/// Transient stream errors are logged and the stream keeps being polled. A
/// stream that ends without a ready snapshot is a fatal error.
pub(crate) async fn wait_for_control_plane(
    orchestrator: &Orchestrator,
    handle: &ClusterHandle,
    cluster: &WorkloadCluster,
    cancel: &CancellationToken,
) -> Result<StatusSnapshot> {
    let timeout = orchestrator.config.readiness_timeout;
    let mut statuses = orchestrator
        .clusters
        .watch_control_plane_status(handle, cluster);
    info!(cluster = %cluster, timeout_secs = timeout.as_secs(), "waiting for control plane");

    let watch = async {
        while let Some(item) = statuses.next().await {
            match item {
                Ok(snapshot) if snapshot.ready => return Ok(snapshot),
                Ok(snapshot) => {
                    debug!(
                        cluster = %cluster,
                        initialized = snapshot.initialized,
                        ready_replicas = snapshot.ready_replicas,
                        replicas = snapshot.replicas,
                        message = ?snapshot.message,
                        "control plane not ready yet"
                    );
                }
                Err(e) if e.is_retryable() => {
                    warn!(cluster = %cluster, error = %e, "status check failed, will retry");
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::fatal(
            &cluster.name,
            "status",
            "status stream ended before the control plane became ready",
        ))
    };

    bounded(&cluster.name, timeout, cancel, "waiting for the control plane", watch).await
}

/// Run `work` until it finishes, `timeout` passes or `cancel` fires.
pub(crate) async fn bounded<T>(
    cluster: &str,
    timeout: Duration,
    cancel: &CancellationToken,
    during: &str,
    work: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::cancelled(cluster, during)),
        result = tokio::time::timeout(timeout, work) => match result {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(
                cluster,
                timeout,
                format!("gave up {}", during),
            )),
        },
    }
}
