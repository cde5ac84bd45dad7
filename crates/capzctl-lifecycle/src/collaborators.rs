//! External collaborators of the lifecycle orchestrator
//!
//! The orchestrator never talks to a cluster, a container runtime or a CLI
//! directly. Everything with a side effect goes through one of these traits,
//! so tests drive the state machine with mocks and production wires in the
//! adapters from [`crate::adapters`].

use async_trait::async_trait;
use futures::stream::BoxStream;

#[cfg(test)]
use mockall::automock;

use capzctl_capi::ManifestBundle;
use capzctl_common::Result;

use crate::state::{ClusterHandle, NodeReadiness, ObservedCluster, StatusSnapshot, WorkloadCluster};

/// Finds, provisions and tears down management clusters
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ManagementClusterProvider: Send + Sync {
    /// Look up a management cluster; `Ok(None)` when it does not exist
    async fn find(&self, name: &str, resource_group: &str) -> Result<Option<ClusterHandle>>;

    /// Provision a new management cluster
    async fn create(&self, name: &str, resource_group: &str, location: &str)
        -> Result<ClusterHandle>;

    /// Install the Cluster API controllers (idempotent)
    async fn install_controllers(&self, handle: &ClusterHandle) -> Result<()>;

    /// Upgrade the installed controllers to the latest release of their contract
    async fn upgrade_controllers(&self, handle: &ClusterHandle) -> Result<()>;

    /// Tear the management cluster down
    async fn delete(&self, handle: &ClusterHandle) -> Result<()>;
}

/// Applies, observes and removes workload cluster resources
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Server-side apply every manifest of the bundle
    async fn apply(&self, handle: &ClusterHandle, bundle: &ManifestBundle) -> Result<()>;

    /// `Kind/name` of every manifest of the bundle the management cluster lacks
    async fn missing_manifests(
        &self,
        handle: &ClusterHandle,
        bundle: &ManifestBundle,
    ) -> Result<Vec<String>>;

    /// True when the Cluster API CRDs and controllers are present
    async fn controllers_installed(&self, handle: &ClusterHandle) -> Result<bool>;

    /// Current state of a workload cluster as seen by the management cluster
    async fn observe(&self, handle: &ClusterHandle, cluster: &WorkloadCluster)
        -> Result<ObservedCluster>;

    /// Lazy status stream that ends after the first ready snapshot
    ///
    /// Items are produced only while the stream is polled, so dropping it
    /// stops the underlying polling.
    fn watch_control_plane_status(
        &self,
        handle: &ClusterHandle,
        cluster: &WorkloadCluster,
    ) -> BoxStream<'static, Result<StatusSnapshot>>;

    /// Request deletion of the Cluster object (returns without waiting)
    async fn delete_cluster(&self, handle: &ClusterHandle, cluster: &WorkloadCluster) -> Result<()>;

    /// Every Cluster object in the management cluster
    async fn list_clusters(&self, handle: &ClusterHandle) -> Result<Vec<WorkloadCluster>>;

    /// Connection details for the workload cluster itself
    async fn workload_handle(
        &self,
        handle: &ClusterHandle,
        cluster: &WorkloadCluster,
    ) -> Result<ClusterHandle>;
}

/// Moves Cluster API resources between management clusters
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PivotService: Send + Sync {
    /// Make `destination` manage `cluster` in place of `source`
    async fn pivot(
        &self,
        source: &ClusterHandle,
        destination: &ClusterHandle,
        cluster: &WorkloadCluster,
    ) -> Result<()>;
}

/// Installs add-ons into a ready workload cluster and reports on its nodes
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkloadAddons: Send + Sync {
    /// Apply the manifest at `source` (a URL or a local path)
    async fn install(&self, workload: &ClusterHandle, source: &str) -> Result<()>;

    /// Ready and total node counts
    async fn node_readiness(&self, workload: &ClusterHandle) -> Result<NodeReadiness>;
}
