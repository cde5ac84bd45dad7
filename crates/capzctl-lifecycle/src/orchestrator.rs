//! Lifecycle orchestrator
//!
//! Drives one cluster through creation, pivot or deletion. Each invocation
//! starts by asking the management cluster where the cluster stands, so a
//! repeated command resumes at the first unfinished transition. Composition
//! happens before the first external call: a bad template never leaves
//! anything half-applied.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use capzctl_capi::{AddonPlan, Composer, CompositionContext};
use capzctl_common::retry::{retry_with_backoff, RetryConfig};
use capzctl_common::{Error, Result, DEFAULT_MANAGEMENT_CLUSTER_NAME};

use crate::collaborators::{ClusterApi, ManagementClusterProvider, PivotService, WorkloadAddons};
use crate::phases::{self, addons, deletion, management, pivoting, provisioning};
use crate::state::{
    derive_phase, ClusterHandle, LifecyclePhase, LifecycleRecord, ObservedCluster, Outcome,
    WorkloadCluster,
};

/// Default time to wait for a control plane to become ready
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Default time to wait for a Cluster object to disappear
pub const DEFAULT_DELETION_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Default interval between status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default time to wait for workload nodes to become ready
pub const DEFAULT_NODES_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Retry policy for CNI installation: 100 attempts, 3 seconds apart
fn default_addon_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 100,
        initial_delay: Duration::from_secs(3),
        max_delay: Duration::from_secs(3),
        backoff_multiplier: 1.0,
    }
}

/// Tunables of the orchestrator
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Retry policy for apply and other idempotent collaborator calls
    pub apply_retry: RetryConfig,
    /// Bound on the control-plane readiness wait
    pub readiness_timeout: Duration,
    /// Bound on the deletion wait
    pub deletion_timeout: Duration,
    /// Interval between deletion and node polls
    pub poll_interval: Duration,
    /// Retry policy for add-on installation
    pub addon_retry: RetryConfig,
    /// Bound on the node readiness wait
    pub nodes_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            apply_retry: RetryConfig::default(),
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            deletion_timeout: DEFAULT_DELETION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            addon_retry: default_addon_retry(),
            nodes_timeout: DEFAULT_NODES_TIMEOUT,
        }
    }
}

/// Which management cluster to use and whether it may be created
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagementTarget {
    /// Management cluster name
    pub name: String,
    /// Resource group it is tracked under
    pub resource_group: String,
    /// Location for a just-in-time cluster
    pub location: Option<String>,
    /// Allow just-in-time provisioning when the cluster is missing
    pub provision: bool,
}

impl Default for ManagementTarget {
    fn default() -> Self {
        Self {
            name: DEFAULT_MANAGEMENT_CLUSTER_NAME.to_string(),
            resource_group: DEFAULT_MANAGEMENT_CLUSTER_NAME.to_string(),
            location: None,
            provision: true,
        }
    }
}

/// Input of [`Orchestrator::create`]
#[derive(Clone, Debug)]
pub struct CreateRequest {
    /// Resolved cluster description
    pub context: CompositionContext,
    /// Management cluster to create it from
    pub management: ManagementTarget,
    /// Add-ons installed once the control plane is ready
    pub addons: AddonPlan,
    /// Move the cluster's resources into itself once ready
    pub pivot: bool,
}

/// Input of [`Orchestrator::delete`]
#[derive(Clone, Debug)]
pub struct DeleteRequest {
    /// Cluster to delete
    pub cluster: WorkloadCluster,
    /// Management cluster holding it
    pub management: ManagementTarget,
    /// Also delete a just-in-time management cluster left empty
    pub delete_management: bool,
}

/// Observed state of one cluster
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// The cluster
    pub cluster: WorkloadCluster,
    /// Phase derived from the observation
    pub phase: LifecyclePhase,
    /// Raw observation
    pub observed: ObservedCluster,
    /// Management cluster that was asked
    pub management: ClusterHandle,
}

/// The lifecycle state machine
pub struct Orchestrator {
    pub(crate) management: Arc<dyn ManagementClusterProvider>,
    pub(crate) clusters: Arc<dyn ClusterApi>,
    pub(crate) pivot: Arc<dyn PivotService>,
    pub(crate) addons: Arc<dyn WorkloadAddons>,
    pub(crate) composer: Composer,
    pub(crate) config: OrchestratorConfig,
}

impl Orchestrator {
    /// Orchestrator over the given collaborators with default tunables
    pub fn new(
        management: Arc<dyn ManagementClusterProvider>,
        clusters: Arc<dyn ClusterApi>,
        pivot: Arc<dyn PivotService>,
        addons: Arc<dyn WorkloadAddons>,
    ) -> Self {
        Self {
            management,
            clusters,
            pivot,
            addons,
            composer: Composer::default(),
            config: OrchestratorConfig::default(),
        }
    }

    /// Replace the tunables
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the composer (e.g. one over a non-default catalog)
    pub fn with_composer(mut self, composer: Composer) -> Self {
        self.composer = composer;
        self
    }

    /// Tunables in effect
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Create a workload cluster, resuming whatever a previous run left off
    pub async fn create(&self, request: &CreateRequest, cancel: &CancellationToken) -> Outcome {
        let ctx = &request.context;
        let cluster = WorkloadCluster::new(&ctx.namespace, &ctx.cluster_name);
        let mut record = LifecycleRecord::new(cluster.clone());

        let bundle = match self.composer.compose(ctx) {
            Ok(bundle) => bundle,
            Err(e) => return Outcome::failed(record, LifecyclePhase::ManifestsComposed, e),
        };

        let handle = match management::resolve(self, &request.management, &cluster).await {
            Ok(handle) => handle,
            Err(e) => return Outcome::failed(record, LifecyclePhase::ManagementClusterResolved, e),
        };
        record.management = Some(handle.clone());
        record.advance(LifecyclePhase::ManagementClusterResolved);

        let observed = match phases::observe(self, &handle, &cluster).await {
            Ok(observed) => observed,
            Err(e) => return Outcome::failed(record, LifecyclePhase::ControllersInstalled, e),
        };
        let current = derive_phase(&observed);
        if current > LifecyclePhase::ManagementClusterResolved {
            info!(cluster = %cluster, phase = %current, "resuming from observed phase");
        }

        match current {
            LifecyclePhase::Deleting => {
                let e = Error::precondition(&cluster.name, "cluster is being deleted");
                return Outcome::failed(record, LifecyclePhase::ManifestsApplied, e);
            }
            LifecyclePhase::Pivoted => {
                info!(cluster = %cluster, "cluster already pivoted, nothing to do");
                for phase in [
                    LifecyclePhase::ControllersInstalled,
                    LifecyclePhase::ManifestsComposed,
                    LifecyclePhase::ManifestsApplied,
                    LifecyclePhase::ControlPlaneReady,
                    LifecyclePhase::Pivoted,
                    LifecyclePhase::Done,
                ] {
                    record.advance(phase);
                }
                return Outcome::Succeeded(record);
            }
            _ => {}
        }

        if let Err(e) =
            management::ensure_controllers(self, &handle, observed.controllers_installed).await
        {
            return Outcome::failed(record, LifecyclePhase::ControllersInstalled, e);
        }
        record.advance(LifecyclePhase::ControllersInstalled);
        record.advance(LifecyclePhase::ManifestsComposed);

        let submit = if current < LifecyclePhase::ManifestsApplied {
            true
        } else {
            match provisioning::missing_manifests(self, &handle, &bundle).await {
                Ok(missing) if missing.is_empty() => {
                    info!(cluster = %cluster, "manifests already applied, not re-submitting");
                    false
                }
                Ok(missing) => {
                    warn!(cluster = %cluster, missing = ?missing, "previous apply was incomplete, re-submitting manifests");
                    true
                }
                Err(e) => return Outcome::failed(record, LifecyclePhase::ManifestsApplied, e),
            }
        };
        if submit {
            if let Err(e) = provisioning::apply_manifests(self, &handle, &bundle).await {
                return Outcome::failed(record, LifecyclePhase::ManifestsApplied, e);
            }
        }
        record.advance(LifecyclePhase::ManifestsApplied);

        if current < LifecyclePhase::ControlPlaneReady {
            if let Err(e) =
                provisioning::wait_for_control_plane(self, &handle, &cluster, cancel).await
            {
                return Outcome::failed(record, LifecyclePhase::ControlPlaneReady, e);
            }
        }
        record.advance(LifecyclePhase::ControlPlaneReady);

        if !request.addons.is_empty() {
            let installed = match pivoting::workload_handle(self, &handle, &cluster).await {
                Ok(workload) => {
                    record.workload = Some(workload.clone());
                    addons::install(self, &workload, &cluster, &request.addons, cancel).await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = installed {
                warn!(cluster = %cluster, error = %e, "add-on installation failed, control plane is up");
                record.advance(LifecyclePhase::Done);
                return Outcome::partial(record, e);
            }
        }

        if request.pivot {
            match pivoting::pivot(self, &handle, &cluster).await {
                Ok(workload) => {
                    record.workload = Some(workload);
                    record.advance(LifecyclePhase::Pivoted);
                }
                Err(e) => {
                    warn!(cluster = %cluster, error = %e, "pivot failed, cluster stays managed by {}", handle.name);
                    record.advance(LifecyclePhase::Done);
                    return Outcome::partial(record, e);
                }
            }
        } else if record.workload.is_none() {
            match pivoting::workload_handle(self, &handle, &cluster).await {
                Ok(workload) => record.workload = Some(workload),
                Err(e) => warn!(cluster = %cluster, error = %e, "workload kubeconfig not available"),
            }
        }

        record.advance(LifecyclePhase::Done);
        Outcome::Succeeded(record)
    }

    /// Pivot an existing, ready cluster
    pub async fn pivot(&self, target: &ManagementTarget, cluster: &WorkloadCluster) -> Outcome {
        let mut record = LifecycleRecord::new(cluster.clone());

        let handle = match management::find_existing(self, target, cluster).await {
            Ok(handle) => handle,
            Err(e) => return Outcome::failed(record, LifecyclePhase::ManagementClusterResolved, e),
        };
        record.management = Some(handle.clone());
        record.advance(LifecyclePhase::ManagementClusterResolved);

        let observed = match phases::observe(self, &handle, cluster).await {
            Ok(observed) => observed,
            Err(e) => return Outcome::failed(record, LifecyclePhase::Pivoted, e),
        };
        match derive_phase(&observed) {
            LifecyclePhase::ControlPlaneReady => record.advance(LifecyclePhase::ControlPlaneReady),
            LifecyclePhase::Pivoted => {
                info!(cluster = %cluster, "cluster already pivoted");
                record.advance(LifecyclePhase::Pivoted);
                record.advance(LifecyclePhase::Done);
                return Outcome::Succeeded(record);
            }
            phase => {
                let e = Error::precondition(
                    &cluster.name,
                    format!("control plane is not ready (observed phase {})", phase),
                );
                return Outcome::failed(record, LifecyclePhase::Pivoted, e);
            }
        }

        match pivoting::pivot(self, &handle, cluster).await {
            Ok(workload) => record.workload = Some(workload),
            Err(e) => return Outcome::failed(record, LifecyclePhase::Pivoted, e),
        }
        record.advance(LifecyclePhase::Pivoted);
        record.advance(LifecyclePhase::Done);
        Outcome::Succeeded(record)
    }

    /// Delete a workload cluster and, if asked, its empty just-in-time manager
    pub async fn delete(&self, request: &DeleteRequest, cancel: &CancellationToken) -> Outcome {
        let cluster = &request.cluster;
        let mut record = LifecycleRecord::new(cluster.clone());

        let handle = match management::find_existing(self, &request.management, cluster).await {
            Ok(handle) => handle,
            Err(e) => return Outcome::failed(record, LifecyclePhase::ManagementClusterResolved, e),
        };
        record.management = Some(handle.clone());
        record.advance(LifecyclePhase::ManagementClusterResolved);

        let observed = match phases::observe(self, &handle, cluster).await {
            Ok(observed) => observed,
            Err(e) => return Outcome::failed(record, LifecyclePhase::Deleting, e),
        };
        if observed.pivoted {
            let e = Error::precondition(
                &cluster.name,
                "cluster was pivoted; delete it through the cluster that now manages it",
            );
            return Outcome::failed(record, LifecyclePhase::Deleting, e);
        }

        if observed.cluster_exists {
            if !observed.deleting {
                if let Err(e) = deletion::request_deletion(self, &handle, cluster).await {
                    return Outcome::failed(record, LifecyclePhase::Deleting, e);
                }
            }
            record.advance(LifecyclePhase::Deleting);
            if let Err(e) = deletion::wait_for_removal(self, &handle, cluster, cancel).await {
                return Outcome::failed(record, LifecyclePhase::Deleted, e);
            }
        } else {
            info!(cluster = %cluster, "cluster not found, nothing to delete");
            record.advance(LifecyclePhase::Deleting);
        }
        record.advance(LifecyclePhase::Deleted);

        if request.delete_management {
            if let Err(e) = deletion::cleanup_management(self, &handle).await {
                warn!(management = %handle.name, error = %e, "management cluster cleanup failed");
                return Outcome::partial(record, e);
            }
        }
        Outcome::Succeeded(record)
    }

    /// Observed state of a cluster
    pub async fn status(&self, target: &ManagementTarget, cluster: &WorkloadCluster) -> Result<ClusterStatus> {
        let handle = management::find_existing(self, target, cluster).await?;
        let observed = phases::observe(self, &handle, cluster).await?;
        Ok(ClusterStatus {
            cluster: cluster.clone(),
            phase: derive_phase(&observed),
            observed,
            management: handle,
        })
    }

    /// Clusters managed by the management cluster
    pub async fn list(&self, target: &ManagementTarget) -> Result<Vec<WorkloadCluster>> {
        let anchor = WorkloadCluster::new("default", &target.name);
        let handle = management::find_existing(self, target, &anchor).await?;
        retry_with_backoff(&self.config.apply_retry, "list clusters", || {
            self.clusters.list_clusters(&handle)
        })
        .await
    }

    /// Find or provision the management cluster and install controllers
    pub async fn ensure_management(&self, target: &ManagementTarget) -> Result<ClusterHandle> {
        let anchor = WorkloadCluster::new("default", &target.name);
        let handle = management::resolve(self, target, &anchor).await?;
        let installed = retry_with_backoff(&self.config.apply_retry, "check controllers", || {
            self.clusters.controllers_installed(&handle)
        })
        .await?;
        management::ensure_controllers(self, &handle, installed).await?;
        Ok(handle)
    }

    /// Upgrade the controllers of an existing management cluster
    pub async fn update_management(&self, target: &ManagementTarget) -> Result<ClusterHandle> {
        let anchor = WorkloadCluster::new("default", &target.name);
        let handle = management::find_existing(self, target, &anchor).await?;
        let installed = retry_with_backoff(&self.config.apply_retry, "check controllers", || {
            self.clusters.controllers_installed(&handle)
        })
        .await?;
        if !installed {
            return Err(Error::precondition(
                &target.name,
                "Cluster API controllers are not installed; run `management create` first",
            ));
        }
        info!(management = %handle.name, "upgrading Cluster API controllers");
        self.management.upgrade_controllers(&handle).await?;
        Ok(handle)
    }

    /// Delete the management cluster
    ///
    /// Refuses while it still manages clusters unless `force` is set.
    pub async fn delete_management(&self, target: &ManagementTarget, force: bool) -> Result<()> {
        let anchor = WorkloadCluster::new("default", &target.name);
        let handle = management::find_existing(self, target, &anchor).await?;
        if !force {
            let remaining = retry_with_backoff(&self.config.apply_retry, "list clusters", || {
                self.clusters.list_clusters(&handle)
            })
            .await?;
            if !remaining.is_empty() {
                let names: Vec<String> = remaining.iter().map(ToString::to_string).collect();
                return Err(Error::precondition(
                    &target.name,
                    format!("management cluster still manages {}", names.join(", ")),
                ));
            }
        }
        self.management.delete(&handle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        MockClusterApi, MockManagementClusterProvider, MockPivotService, MockWorkloadAddons,
    };
    use crate::state::{HandleOrigin, NodeReadiness, StatusSnapshot};
    use capzctl_capi::{resolve, ClusterRequest, CustomTemplate, TemplateCatalog};
    use capzctl_common::ErrorKind;
    use futures::stream::{self, StreamExt};

    fn handle(origin: HandleOrigin) -> ClusterHandle {
        ClusterHandle {
            name: "capi-manager".to_string(),
            resource_group: "capi-manager".to_string(),
            kubeconfig: None,
            context: Some("kind-capi-manager".to_string()),
            origin,
        }
    }

    fn workload() -> ClusterHandle {
        ClusterHandle {
            name: "demo".to_string(),
            resource_group: "demo".to_string(),
            kubeconfig: Some("demo.kubeconfig".into()),
            context: None,
            origin: HandleOrigin::Existing,
        }
    }

    fn context() -> CompositionContext {
        resolve(
            &TemplateCatalog::builtin(),
            &ClusterRequest {
                name: "demo".to_string(),
                location: Some("eastus".to_string()),
                subscription_id: Some("00000000-0000-0000-0000-000000000000".to_string()),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn create_request(pivot: bool) -> CreateRequest {
        CreateRequest {
            context: context(),
            management: ManagementTarget {
                location: Some("eastus".to_string()),
                ..Default::default()
            },
            addons: AddonPlan::default(),
            pivot,
        }
    }

    fn observed(exists: bool, ready: bool) -> ObservedCluster {
        ObservedCluster {
            controllers_installed: true,
            cluster_exists: exists,
            control_plane_ready: ready,
            ..Default::default()
        }
    }

    fn ready_stream() -> futures::stream::BoxStream<'static, Result<StatusSnapshot>> {
        stream::iter(vec![
            Ok(StatusSnapshot::default()),
            Ok(StatusSnapshot {
                initialized: true,
                ready: true,
                ready_replicas: 1,
                replicas: 1,
                message: None,
            }),
        ])
        .boxed()
    }

    fn test_config() -> OrchestratorConfig {
        OrchestratorConfig {
            apply_retry: RetryConfig::fast(3),
            readiness_timeout: Duration::from_millis(100),
            deletion_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(5),
            addon_retry: RetryConfig::fast(3),
            nodes_timeout: Duration::from_millis(100),
        }
    }

    fn orchestrator(
        management: MockManagementClusterProvider,
        clusters: MockClusterApi,
        pivot: MockPivotService,
    ) -> Orchestrator {
        orchestrator_with_addons(management, clusters, pivot, MockWorkloadAddons::new())
    }

    fn orchestrator_with_addons(
        management: MockManagementClusterProvider,
        clusters: MockClusterApi,
        pivot: MockPivotService,
        addons: MockWorkloadAddons,
    ) -> Orchestrator {
        Orchestrator::new(
            Arc::new(management),
            Arc::new(clusters),
            Arc::new(pivot),
            Arc::new(addons),
        )
        .with_config(test_config())
    }

    fn existing_management() -> MockManagementClusterProvider {
        let mut management = MockManagementClusterProvider::new();
        management
            .expect_find()
            .returning(|_, _| Ok(Some(handle(HandleOrigin::Existing))));
        management.expect_create().never();
        management.expect_install_controllers().never();
        management
    }

    mod creation {
        use super::*;

        #[tokio::test]
        async fn fresh_create_walks_every_phase() {
            let mut clusters = MockClusterApi::new();
            clusters.expect_observe().returning(|_, _| Ok(observed(false, false)));
            clusters.expect_apply().times(1).returning(|_, _| Ok(()));
            clusters
                .expect_watch_control_plane_status()
                .times(1)
                .returning(|_, _| ready_stream());
            clusters
                .expect_workload_handle()
                .returning(|_, _| Ok(workload()));
            let orch = orchestrator(existing_management(), clusters, MockPivotService::new());

            let outcome = orch.create(&create_request(false), &CancellationToken::new()).await;

            assert!(outcome.is_success(), "{:?}", outcome.error());
            let record = outcome.record();
            assert_eq!(record.phase, LifecyclePhase::Done);
            assert_eq!(
                record.history,
                vec![
                    LifecyclePhase::Start,
                    LifecyclePhase::ManagementClusterResolved,
                    LifecyclePhase::ControllersInstalled,
                    LifecyclePhase::ManifestsComposed,
                    LifecyclePhase::ManifestsApplied,
                    LifecyclePhase::ControlPlaneReady,
                    LifecyclePhase::Done,
                ]
            );
            assert_eq!(record.workload, Some(workload()));
        }

        #[tokio::test]
        async fn missing_management_cluster_is_provisioned_just_in_time() {
            let mut management = MockManagementClusterProvider::new();
            management.expect_find().returning(|_, _| Ok(None));
            management
                .expect_create()
                .withf(|name, _, location| name == "capi-manager" && location == "eastus")
                .times(1)
                .returning(|_, _, _| Ok(handle(HandleOrigin::JustInTime)));
            management
                .expect_install_controllers()
                .times(1)
                .returning(|_| Ok(()));

            let mut clusters = MockClusterApi::new();
            clusters.expect_observe().returning(|_, _| {
                Ok(ObservedCluster::default())
            });
            clusters.expect_apply().returning(|_, _| Ok(()));
            clusters
                .expect_watch_control_plane_status()
                .returning(|_, _| ready_stream());
            clusters
                .expect_workload_handle()
                .returning(|_, _| Ok(workload()));
            let orch = orchestrator(management, clusters, MockPivotService::new());

            let outcome = orch.create(&create_request(false), &CancellationToken::new()).await;

            assert!(outcome.is_success());
            assert!(outcome.record().management.as_ref().unwrap().is_just_in_time());
        }

        #[tokio::test]
        async fn provisioning_disabled_fails_at_management_resolution() {
            let mut management = MockManagementClusterProvider::new();
            management.expect_find().returning(|_, _| Ok(None));
            management.expect_create().never();
            let orch = orchestrator(management, MockClusterApi::new(), MockPivotService::new());
            let mut request = create_request(false);
            request.management.provision = false;

            let outcome = orch.create(&request, &CancellationToken::new()).await;

            let Outcome::Failed { record, error } = outcome else {
                panic!("expected failure");
            };
            assert_eq!(record.failed_at, Some(LifecyclePhase::ManagementClusterResolved));
            assert_eq!(error.kind(), ErrorKind::Precondition);
        }

        #[tokio::test]
        async fn management_create_failure_is_fatal() {
            let mut management = MockManagementClusterProvider::new();
            management.expect_find().returning(|_, _| Ok(None));
            management
                .expect_create()
                .returning(|name, _, _| Err(Error::fatal(name, "kind", "docker is not running")));
            let orch = orchestrator(management, MockClusterApi::new(), MockPivotService::new());

            let outcome = orch.create(&create_request(false), &CancellationToken::new()).await;

            assert_eq!(
                outcome.record().failed_at,
                Some(LifecyclePhase::ManagementClusterResolved)
            );
            assert_eq!(outcome.error().unwrap().kind(), ErrorKind::FatalCollaborator);
        }

        #[tokio::test]
        async fn install_failure_fails_at_controllers_installed() {
            let mut management = MockManagementClusterProvider::new();
            management
                .expect_find()
                .returning(|_, _| Ok(Some(handle(HandleOrigin::Existing))));
            management
                .expect_install_controllers()
                .returning(|h| Err(Error::fatal(&h.name, "clusterctl", "unauthorized")));
            let mut clusters = MockClusterApi::new();
            clusters
                .expect_observe()
                .returning(|_, _| Ok(ObservedCluster::default()));
            clusters.expect_apply().never();
            let orch = orchestrator(management, clusters, MockPivotService::new());

            let outcome = orch.create(&create_request(false), &CancellationToken::new()).await;

            assert_eq!(
                outcome.record().failed_at,
                Some(LifecyclePhase::ControllersInstalled)
            );
        }

        #[tokio::test]
        async fn composition_error_makes_no_external_calls() {
            let mut management = MockManagementClusterProvider::new();
            management.expect_find().never();
            management.expect_create().never();
            let mut clusters = MockClusterApi::new();
            clusters.expect_apply().never();
            clusters.expect_observe().never();
            let orch = orchestrator(management, clusters, MockPivotService::new());

            let mut request = create_request(false);
            request.context.custom_template =
                Some(CustomTemplate::from_source("broken.yaml", "name: ${NOT_A_VARIABLE}"));

            let outcome = orch.create(&request, &CancellationToken::new()).await;

            let Outcome::Failed { record, error } = outcome else {
                panic!("expected failure");
            };
            assert_eq!(record.failed_at, Some(LifecyclePhase::ManifestsComposed));
            assert_eq!(record.management, None);
            assert_eq!(error.kind(), ErrorKind::Composition);
        }

        #[tokio::test]
        async fn transient_apply_failures_are_retried() {
            let mut clusters = MockClusterApi::new();
            clusters.expect_observe().returning(|_, _| Ok(observed(false, false)));
            let mut calls = 0;
            clusters.expect_apply().times(2).returning(move |_, _| {
                calls += 1;
                if calls == 1 {
                    Err(Error::transient("demo", "apply", "connection reset"))
                } else {
                    Ok(())
                }
            });
            clusters
                .expect_watch_control_plane_status()
                .returning(|_, _| ready_stream());
            clusters
                .expect_workload_handle()
                .returning(|_, _| Ok(workload()));
            let orch = orchestrator(existing_management(), clusters, MockPivotService::new());

            let outcome = orch.create(&create_request(false), &CancellationToken::new()).await;

            assert!(outcome.is_success());
        }

        #[tokio::test]
        async fn fatal_apply_failure_is_not_retried() {
            let mut clusters = MockClusterApi::new();
            clusters.expect_observe().returning(|_, _| Ok(observed(false, false)));
            clusters
                .expect_apply()
                .times(1)
                .returning(|_, _| Err(Error::fatal("demo", "apply", "quota exceeded")));
            clusters.expect_watch_control_plane_status().never();
            let orch = orchestrator(existing_management(), clusters, MockPivotService::new());

            let outcome = orch.create(&create_request(false), &CancellationToken::new()).await;

            let Outcome::Failed { record, error } = outcome else {
                panic!("expected failure");
            };
            assert_eq!(record.failed_at, Some(LifecyclePhase::ManifestsApplied));
            assert_eq!(
                record.last_error.as_ref().unwrap().message,
                error.to_string()
            );
        }

        #[tokio::test]
        async fn resume_after_apply_does_not_resubmit() {
            let mut clusters = MockClusterApi::new();
            clusters.expect_observe().returning(|_, _| Ok(observed(true, false)));
            clusters.expect_missing_manifests().returning(|_, _| Ok(vec![]));
            clusters.expect_apply().never();
            clusters
                .expect_watch_control_plane_status()
                .times(1)
                .returning(|_, _| ready_stream());
            clusters
                .expect_workload_handle()
                .returning(|_, _| Ok(workload()));
            let orch = orchestrator(existing_management(), clusters, MockPivotService::new());

            let outcome = orch.create(&create_request(false), &CancellationToken::new()).await;

            assert!(outcome.is_success());
            assert!(outcome.record().reached(LifecyclePhase::ControlPlaneReady));
        }

        #[tokio::test]
        async fn incomplete_apply_is_resubmitted_on_resume() {
            let mut clusters = MockClusterApi::new();
            clusters.expect_observe().returning(|_, _| Ok(observed(true, false)));
            clusters
                .expect_missing_manifests()
                .times(1)
                .returning(|_, _| Ok(vec!["KubeadmControlPlane/demo-control-plane".to_string()]));
            clusters.expect_apply().times(1).returning(|_, _| Ok(()));
            clusters
                .expect_watch_control_plane_status()
                .returning(|_, _| ready_stream());
            clusters
                .expect_workload_handle()
                .returning(|_, _| Ok(workload()));
            let orch = orchestrator(existing_management(), clusters, MockPivotService::new());

            let outcome = orch.create(&create_request(false), &CancellationToken::new()).await;

            assert!(outcome.is_success(), "{:?}", outcome.error());
        }

        #[tokio::test]
        async fn applied_manifest_check_failure_fails_at_manifests_applied() {
            let mut clusters = MockClusterApi::new();
            clusters.expect_observe().returning(|_, _| Ok(observed(true, false)));
            clusters
                .expect_missing_manifests()
                .returning(|_, _| Err(Error::fatal("demo", "kube-apiserver", "forbidden")));
            clusters.expect_apply().never();
            clusters.expect_watch_control_plane_status().never();
            let orch = orchestrator(existing_management(), clusters, MockPivotService::new());

            let outcome = orch.create(&create_request(false), &CancellationToken::new()).await;

            assert_eq!(outcome.record().failed_at, Some(LifecyclePhase::ManifestsApplied));
            assert_eq!(outcome.error().unwrap().kind(), ErrorKind::FatalCollaborator);
        }

        #[tokio::test]
        async fn ready_cluster_is_not_polled_again() {
            let mut clusters = MockClusterApi::new();
            clusters.expect_observe().returning(|_, _| Ok(observed(true, true)));
            clusters.expect_missing_manifests().returning(|_, _| Ok(vec![]));
            clusters.expect_apply().never();
            clusters.expect_watch_control_plane_status().never();
            clusters
                .expect_workload_handle()
                .returning(|_, _| Ok(workload()));
            let orch = orchestrator(existing_management(), clusters, MockPivotService::new());

            let outcome = orch.create(&create_request(false), &CancellationToken::new()).await;

            assert!(outcome.is_success());
        }

        #[tokio::test]
        async fn deleting_cluster_cannot_be_created() {
            let mut clusters = MockClusterApi::new();
            clusters.expect_observe().returning(|_, _| {
                Ok(ObservedCluster {
                    deleting: true,
                    ..observed(true, false)
                })
            });
            clusters.expect_apply().never();
            let orch = orchestrator(existing_management(), clusters, MockPivotService::new());

            let outcome = orch.create(&create_request(false), &CancellationToken::new()).await;

            assert_eq!(outcome.error().unwrap().kind(), ErrorKind::Precondition);
        }

        #[tokio::test]
        async fn readiness_timeout_is_reported_distinctly() {
            let mut clusters = MockClusterApi::new();
            clusters.expect_observe().returning(|_, _| Ok(observed(false, false)));
            clusters.expect_apply().returning(|_, _| Ok(()));
            clusters
                .expect_watch_control_plane_status()
                .returning(|_, _| stream::pending().boxed());
            let orch = orchestrator(existing_management(), clusters, MockPivotService::new());

            let outcome = orch.create(&create_request(false), &CancellationToken::new()).await;

            assert_eq!(outcome.record().failed_at, Some(LifecyclePhase::ControlPlaneReady));
            assert_eq!(outcome.error().unwrap().kind(), ErrorKind::Timeout);
        }

        #[tokio::test]
        async fn cancellation_stops_the_readiness_wait() {
            let mut clusters = MockClusterApi::new();
            clusters.expect_observe().returning(|_, _| Ok(observed(true, false)));
            clusters.expect_missing_manifests().returning(|_, _| Ok(vec![]));
            clusters
                .expect_watch_control_plane_status()
                .returning(|_, _| stream::pending().boxed());
            let orch = orchestrator(existing_management(), clusters, MockPivotService::new());
            let cancel = CancellationToken::new();
            cancel.cancel();

            let outcome = orch.create(&create_request(false), &cancel).await;

            assert_eq!(outcome.record().failed_at, Some(LifecyclePhase::ControlPlaneReady));
            assert_eq!(outcome.error().unwrap().kind(), ErrorKind::Cancelled);
        }

        #[tokio::test]
        async fn stream_ending_early_is_fatal() {
            let mut clusters = MockClusterApi::new();
            clusters.expect_observe().returning(|_, _| Ok(observed(true, false)));
            clusters.expect_missing_manifests().returning(|_, _| Ok(vec![]));
            clusters
                .expect_watch_control_plane_status()
                .returning(|_, _| stream::iter(vec![Ok(StatusSnapshot::default())]).boxed());
            let orch = orchestrator(existing_management(), clusters, MockPivotService::new());

            let outcome = orch.create(&create_request(false), &CancellationToken::new()).await;

            assert_eq!(outcome.error().unwrap().kind(), ErrorKind::FatalCollaborator);
        }
    }

    mod pivoting {
        use super::*;

        #[tokio::test]
        async fn pivot_after_ready_moves_resources() {
            let mut clusters = MockClusterApi::new();
            clusters.expect_observe().returning(|_, _| Ok(observed(false, false)));
            clusters.expect_apply().returning(|_, _| Ok(()));
            clusters
                .expect_watch_control_plane_status()
                .returning(|_, _| ready_stream());
            clusters
                .expect_workload_handle()
                .returning(|_, _| Ok(workload()));
            let mut pivot = MockPivotService::new();
            pivot
                .expect_pivot()
                .withf(|source, dest, cluster| {
                    source.name == "capi-manager" && dest.name == "demo" && cluster.name == "demo"
                })
                .times(1)
                .returning(|_, _, _| Ok(()));
            let orch = orchestrator(existing_management(), clusters, pivot);

            let outcome = orch.create(&create_request(true), &CancellationToken::new()).await;

            assert!(outcome.is_success());
            assert!(outcome.record().reached(LifecyclePhase::Pivoted));
        }

        #[tokio::test]
        async fn pivot_failure_is_partial_success() {
            let mut clusters = MockClusterApi::new();
            clusters.expect_observe().returning(|_, _| Ok(observed(true, true)));
            clusters.expect_missing_manifests().returning(|_, _| Ok(vec![]));
            clusters
                .expect_workload_handle()
                .returning(|_, _| Ok(workload()));
            let mut pivot = MockPivotService::new();
            pivot
                .expect_pivot()
                .returning(|_, _, c| Err(Error::fatal(&c.name, "clusterctl", "move failed")));
            let orch = orchestrator(existing_management(), clusters, pivot);

            let outcome = orch.create(&create_request(true), &CancellationToken::new()).await;

            let Outcome::Partial { record, error } = outcome else {
                panic!("expected partial success");
            };
            assert_eq!(record.phase, LifecyclePhase::Done);
            assert!(record.reached(LifecyclePhase::ControlPlaneReady));
            assert!(!record.reached(LifecyclePhase::Pivoted));
            assert_eq!(error.kind(), ErrorKind::FatalCollaborator);
        }

        #[tokio::test]
        async fn standalone_pivot_rejects_unready_cluster() {
            let mut clusters = MockClusterApi::new();
            clusters.expect_observe().returning(|_, _| Ok(observed(true, false)));
            let mut pivot = MockPivotService::new();
            pivot.expect_pivot().never();
            let orch = orchestrator(existing_management(), clusters, pivot);

            let outcome = orch
                .pivot(&ManagementTarget::default(), &WorkloadCluster::new("default", "demo"))
                .await;

            assert_eq!(outcome.record().failed_at, Some(LifecyclePhase::Pivoted));
            assert_eq!(outcome.error().unwrap().kind(), ErrorKind::Precondition);
        }

        #[tokio::test]
        async fn standalone_pivot_of_pivoted_cluster_is_a_no_op() {
            let mut clusters = MockClusterApi::new();
            clusters.expect_observe().returning(|_, _| {
                Ok(ObservedCluster {
                    pivoted: true,
                    ..observed(false, false)
                })
            });
            let mut pivot = MockPivotService::new();
            pivot.expect_pivot().never();
            let orch = orchestrator(existing_management(), clusters, pivot);

            let outcome = orch
                .pivot(&ManagementTarget::default(), &WorkloadCluster::new("default", "demo"))
                .await;

            assert!(outcome.is_success());
        }
    }

    mod workload_addons {
        use super::*;
        use capzctl_capi::constants::{CALICO_MANIFEST_URL, WINDOWS_CALICO_MANIFEST_URL};
        use capzctl_capi::OsFamily;

        fn ready_cluster() -> MockClusterApi {
            let mut clusters = MockClusterApi::new();
            clusters.expect_observe().returning(|_, _| Ok(observed(true, true)));
            clusters.expect_missing_manifests().returning(|_, _| Ok(vec![]));
            clusters
                .expect_workload_handle()
                .returning(|_, _| Ok(workload()));
            clusters
        }

        fn addon_request(pivot: bool) -> CreateRequest {
            let mut request = create_request(pivot);
            request.addons = AddonPlan::for_context(&request.context);
            request
        }

        fn all_nodes_ready(addons: &mut MockWorkloadAddons) {
            addons
                .expect_node_readiness()
                .returning(|_| Ok(NodeReadiness { ready: 2, total: 2 }));
        }

        #[tokio::test]
        async fn calico_is_installed_into_the_workload_cluster() {
            let mut addons = MockWorkloadAddons::new();
            addons
                .expect_install()
                .withf(|workload, source| workload.name == "demo" && source == CALICO_MANIFEST_URL)
                .times(1)
                .returning(|_, _| Ok(()));
            all_nodes_ready(&mut addons);
            let orch = orchestrator_with_addons(
                existing_management(),
                ready_cluster(),
                MockPivotService::new(),
                addons,
            );

            let outcome = orch.create(&addon_request(false), &CancellationToken::new()).await;

            assert!(outcome.is_success(), "{:?}", outcome.error());
            assert_eq!(outcome.record().workload, Some(workload()));
        }

        #[tokio::test]
        async fn windows_workers_get_windows_calico_second() {
            let installed = Arc::new(std::sync::Mutex::new(Vec::new()));
            let mut addons = MockWorkloadAddons::new();
            let seen = installed.clone();
            addons.expect_install().times(2).returning(move |_, source| {
                seen.lock().unwrap().push(source.to_string());
                Ok(())
            });
            all_nodes_ready(&mut addons);
            let orch = orchestrator_with_addons(
                existing_management(),
                ready_cluster(),
                MockPivotService::new(),
                addons,
            );
            let mut request = create_request(false);
            request.context = resolve(
                &TemplateCatalog::builtin(),
                &ClusterRequest {
                    name: "demo".to_string(),
                    location: Some("eastus".to_string()),
                    subscription_id: Some("00000000-0000-0000-0000-000000000000".to_string()),
                    os_family: Some(OsFamily::Windows),
                    ..Default::default()
                },
            )
            .unwrap();
            request.addons = AddonPlan::for_context(&request.context);

            let outcome = orch.create(&request, &CancellationToken::new()).await;

            assert!(outcome.is_success(), "{:?}", outcome.error());
            assert_eq!(
                *installed.lock().unwrap(),
                vec![CALICO_MANIFEST_URL, WINDOWS_CALICO_MANIFEST_URL]
            );
        }

        #[tokio::test]
        async fn transient_cni_failures_are_retried() {
            let mut addons = MockWorkloadAddons::new();
            let mut calls = 0;
            addons.expect_install().times(2).returning(move |_, _| {
                calls += 1;
                if calls == 1 {
                    Err(Error::transient("demo", "kubectl", "connection refused"))
                } else {
                    Ok(())
                }
            });
            all_nodes_ready(&mut addons);
            let orch = orchestrator_with_addons(
                existing_management(),
                ready_cluster(),
                MockPivotService::new(),
                addons,
            );

            let outcome = orch.create(&addon_request(false), &CancellationToken::new()).await;

            assert!(outcome.is_success(), "{:?}", outcome.error());
        }

        #[tokio::test]
        async fn cni_failure_is_partial_and_skips_pivot() {
            let mut addons = MockWorkloadAddons::new();
            addons
                .expect_install()
                .returning(|_, _| Err(Error::fatal("demo", "kubectl", "manifest not found")));
            addons.expect_node_readiness().never();
            let mut pivot = MockPivotService::new();
            pivot.expect_pivot().never();
            let orch = orchestrator_with_addons(existing_management(), ready_cluster(), pivot, addons);

            let outcome = orch.create(&addon_request(true), &CancellationToken::new()).await;

            let Outcome::Partial { record, error } = outcome else {
                panic!("expected partial success");
            };
            assert_eq!(record.phase, LifecyclePhase::Done);
            assert!(record.reached(LifecyclePhase::ControlPlaneReady));
            assert!(!record.reached(LifecyclePhase::Pivoted));
            assert_eq!(record.workload, Some(workload()));
            assert_eq!(error.kind(), ErrorKind::FatalCollaborator);
        }

        #[tokio::test]
        async fn nodes_never_ready_is_partial_timeout() {
            let mut addons = MockWorkloadAddons::new();
            addons.expect_install().returning(|_, _| Ok(()));
            addons
                .expect_node_readiness()
                .returning(|_| Ok(NodeReadiness { ready: 1, total: 3 }));
            let orch = orchestrator_with_addons(
                existing_management(),
                ready_cluster(),
                MockPivotService::new(),
                addons,
            );

            let outcome = orch.create(&addon_request(false), &CancellationToken::new()).await;

            let Outcome::Partial { error, .. } = outcome else {
                panic!("expected partial success");
            };
            assert_eq!(error.kind(), ErrorKind::Timeout);
        }

        #[tokio::test]
        async fn nodes_becoming_ready_lets_the_pivot_run() {
            let mut addons = MockWorkloadAddons::new();
            addons.expect_install().returning(|_, _| Ok(()));
            let mut polls = 0;
            addons.expect_node_readiness().returning(move |_| {
                polls += 1;
                match polls {
                    1 => Err(Error::transient("demo", "kube-apiserver", "connection refused")),
                    2 => Ok(NodeReadiness { ready: 0, total: 2 }),
                    _ => Ok(NodeReadiness { ready: 2, total: 2 }),
                }
            });
            let mut pivot = MockPivotService::new();
            pivot.expect_pivot().times(1).returning(|_, _, _| Ok(()));
            let orch = orchestrator_with_addons(existing_management(), ready_cluster(), pivot, addons);

            let outcome = orch.create(&addon_request(true), &CancellationToken::new()).await;

            assert!(outcome.is_success(), "{:?}", outcome.error());
            assert!(outcome.record().reached(LifecyclePhase::Pivoted));
        }

        #[tokio::test]
        async fn empty_plan_touches_nothing_in_the_workload() {
            let mut addons = MockWorkloadAddons::new();
            addons.expect_install().never();
            addons.expect_node_readiness().never();
            let orch = orchestrator_with_addons(
                existing_management(),
                ready_cluster(),
                MockPivotService::new(),
                addons,
            );

            let outcome = orch.create(&create_request(false), &CancellationToken::new()).await;

            assert!(outcome.is_success());
        }
    }

    mod deletion {
        use super::*;

        fn delete_request(delete_management: bool) -> DeleteRequest {
            DeleteRequest {
                cluster: WorkloadCluster::new("default", "demo"),
                management: ManagementTarget::default(),
                delete_management,
            }
        }

        fn jit_management(delete_result: fn() -> Result<()>) -> MockManagementClusterProvider {
            let mut management = MockManagementClusterProvider::new();
            management
                .expect_find()
                .returning(|_, _| Ok(Some(handle(HandleOrigin::JustInTime))));
            management
                .expect_delete()
                .returning(move |_| delete_result());
            management
        }

        fn disappearing_cluster() -> MockClusterApi {
            let mut clusters = MockClusterApi::new();
            let mut polls = 0;
            clusters.expect_observe().returning(move |_, _| {
                polls += 1;
                Ok(observed(polls < 3, true))
            });
            clusters
                .expect_delete_cluster()
                .times(1)
                .returning(|_, _| Ok(()));
            clusters
        }

        #[tokio::test]
        async fn waits_for_cluster_then_removes_empty_jit_management() {
            let mut clusters = disappearing_cluster();
            clusters.expect_list_clusters().returning(|_| Ok(vec![]));
            let orch = orchestrator(jit_management(|| Ok(())), clusters, MockPivotService::new());

            let outcome = orch.delete(&delete_request(true), &CancellationToken::new()).await;

            assert!(outcome.is_success());
            assert_eq!(outcome.record().phase, LifecyclePhase::Deleted);
            assert!(outcome.record().reached(LifecyclePhase::Deleting));
        }

        #[tokio::test]
        async fn management_with_remaining_clusters_is_kept() {
            let mut clusters = disappearing_cluster();
            clusters
                .expect_list_clusters()
                .returning(|_| Ok(vec![WorkloadCluster::new("default", "other")]));
            let mut management = MockManagementClusterProvider::new();
            management
                .expect_find()
                .returning(|_, _| Ok(Some(handle(HandleOrigin::JustInTime))));
            management.expect_delete().never();
            let orch = orchestrator(management, clusters, MockPivotService::new());

            let outcome = orch.delete(&delete_request(true), &CancellationToken::new()).await;

            assert!(outcome.is_success());
        }

        #[tokio::test]
        async fn existing_management_is_never_deleted() {
            let mut clusters = disappearing_cluster();
            clusters.expect_list_clusters().never();
            let mut management = existing_management();
            management.expect_delete().never();
            let orch = orchestrator(management, clusters, MockPivotService::new());

            let outcome = orch.delete(&delete_request(true), &CancellationToken::new()).await;

            assert!(outcome.is_success());
        }

        #[tokio::test]
        async fn management_cleanup_failure_is_partial() {
            let mut clusters = disappearing_cluster();
            clusters.expect_list_clusters().returning(|_| Ok(vec![]));
            let orch = orchestrator(
                jit_management(|| Err(Error::fatal("capi-manager", "kind", "delete failed"))),
                clusters,
                MockPivotService::new(),
            );

            let outcome = orch.delete(&delete_request(true), &CancellationToken::new()).await;

            let Outcome::Partial { record, .. } = outcome else {
                panic!("expected partial success");
            };
            assert_eq!(record.phase, LifecyclePhase::Deleted);
        }

        #[tokio::test]
        async fn deletion_wait_times_out() {
            let mut clusters = MockClusterApi::new();
            clusters.expect_observe().returning(|_, _| Ok(observed(true, true)));
            clusters.expect_delete_cluster().returning(|_, _| Ok(()));
            let orch = orchestrator(existing_management(), clusters, MockPivotService::new());

            let outcome = orch.delete(&delete_request(false), &CancellationToken::new()).await;

            assert_eq!(outcome.record().failed_at, Some(LifecyclePhase::Deleted));
            assert_eq!(outcome.error().unwrap().kind(), ErrorKind::Timeout);
        }

        #[tokio::test]
        async fn absent_cluster_deletes_cleanly() {
            let mut clusters = MockClusterApi::new();
            clusters.expect_observe().returning(|_, _| Ok(observed(false, false)));
            clusters.expect_delete_cluster().never();
            let orch = orchestrator(existing_management(), clusters, MockPivotService::new());

            let outcome = orch.delete(&delete_request(false), &CancellationToken::new()).await;

            assert!(outcome.is_success());
        }

        #[tokio::test]
        async fn missing_management_fails_resolution() {
            let mut management = MockManagementClusterProvider::new();
            management.expect_find().returning(|_, _| Ok(None));
            let orch = orchestrator(management, MockClusterApi::new(), MockPivotService::new());

            let outcome = orch.delete(&delete_request(false), &CancellationToken::new()).await;

            assert_eq!(
                outcome.record().failed_at,
                Some(LifecyclePhase::ManagementClusterResolved)
            );
        }
    }

    mod management_commands {
        use super::*;

        #[tokio::test]
        async fn ensure_management_installs_missing_controllers() {
            let mut management = MockManagementClusterProvider::new();
            management
                .expect_find()
                .returning(|_, _| Ok(Some(handle(HandleOrigin::Existing))));
            management
                .expect_install_controllers()
                .times(1)
                .returning(|_| Ok(()));
            let mut clusters = MockClusterApi::new();
            clusters
                .expect_controllers_installed()
                .returning(|_| Ok(false));
            let orch = orchestrator(management, clusters, MockPivotService::new());

            let handle = orch.ensure_management(&ManagementTarget::default()).await.unwrap();

            assert_eq!(handle.name, "capi-manager");
        }

        #[tokio::test]
        async fn update_management_upgrades_installed_controllers() {
            let mut management = existing_management();
            management
                .expect_upgrade_controllers()
                .withf(|h| h.name == "capi-manager")
                .times(1)
                .returning(|_| Ok(()));
            let mut clusters = MockClusterApi::new();
            clusters.expect_controllers_installed().returning(|_| Ok(true));
            let orch = orchestrator(management, clusters, MockPivotService::new());

            let handle = orch.update_management(&ManagementTarget::default()).await.unwrap();

            assert_eq!(handle.name, "capi-manager");
        }

        #[tokio::test]
        async fn update_management_requires_installed_controllers() {
            let mut management = existing_management();
            management.expect_upgrade_controllers().never();
            let mut clusters = MockClusterApi::new();
            clusters.expect_controllers_installed().returning(|_| Ok(false));
            let orch = orchestrator(management, clusters, MockPivotService::new());

            let err = orch
                .update_management(&ManagementTarget::default())
                .await
                .unwrap_err();

            assert_eq!(err.kind(), ErrorKind::Precondition);
        }

        #[tokio::test]
        async fn delete_management_refuses_while_clusters_remain() {
            let mut management = existing_management();
            management.expect_delete().never();
            let mut clusters = MockClusterApi::new();
            clusters
                .expect_list_clusters()
                .returning(|_| Ok(vec![WorkloadCluster::new("default", "demo")]));
            let orch = orchestrator(management, clusters, MockPivotService::new());

            let err = orch
                .delete_management(&ManagementTarget::default(), false)
                .await
                .unwrap_err();

            assert_eq!(err.kind(), ErrorKind::Precondition);
            assert!(err.to_string().contains("default/demo"));
        }

        #[tokio::test]
        async fn status_reports_derived_phase() {
            let mut clusters = MockClusterApi::new();
            clusters.expect_observe().returning(|_, _| Ok(observed(true, false)));
            let orch = orchestrator(existing_management(), clusters, MockPivotService::new());

            let status = orch
                .status(&ManagementTarget::default(), &WorkloadCluster::new("default", "demo"))
                .await
                .unwrap();

            assert_eq!(status.phase, LifecyclePhase::ManifestsApplied);
        }
    }
}
