//! Cluster API access through kube-rs
//!
//! Manifests are server-side applied as `DynamicObject`s. Readiness and
//! existence are read from the Cluster object and the control plane it
//! references. A ConfigMap marker left behind by a pivot records that the
//! cluster now lives elsewhere.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, ObjectMeta, Patch, PatchParams};
use kube::Client;
use serde_json::Value;
use tracing::{debug, info};

use capzctl_capi::ManifestBundle;
use capzctl_common::kube_utils::{build_api_resource, create_client};
use capzctl_common::{
    Error, Result, CLUSTER_NAME_LABEL, CONTROLLER_NAMESPACES, FIELD_MANAGER, MANAGED_BY_LABEL,
    MANAGED_BY_VALUE,
};

use crate::collaborators::ClusterApi;
use crate::orchestrator::DEFAULT_POLL_INTERVAL;
use crate::state::{ClusterHandle, HandleOrigin, ObservedCluster, StatusSnapshot, WorkloadCluster};

/// apiVersion used to read Cluster objects
const CLUSTER_API_VERSION: &str = "cluster.x-k8s.io/v1beta1";

/// CRDs that must exist for the controllers to count as installed
const REQUIRED_CRDS: &[&str] = &[
    "clusters.cluster.x-k8s.io",
    "kubeadmcontrolplanes.controlplane.cluster.x-k8s.io",
    "azureclusters.infrastructure.cluster.x-k8s.io",
];

/// Key of the kubeconfig in the `<cluster>-kubeconfig` Secret
const KUBECONFIG_SECRET_KEY: &str = "value";

/// [`ClusterApi`] over kube-rs
#[derive(Clone, Debug)]
pub struct KubeClusterApi {
    kubeconfig_dir: PathBuf,
    poll_interval: Duration,
}

impl KubeClusterApi {
    /// Write workload kubeconfigs into `kubeconfig_dir`
    pub fn new(kubeconfig_dir: impl Into<PathBuf>) -> Self {
        Self {
            kubeconfig_dir: kubeconfig_dir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Interval between control-plane status polls
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

async fn client_for(handle: &ClusterHandle) -> Result<Client> {
    create_client(handle.kubeconfig.as_deref(), handle.context.as_deref()).await
}

fn cluster_api(client: &Client, namespace: &str) -> Api<DynamicObject> {
    let ar = build_api_resource(CLUSTER_API_VERSION, "Cluster");
    Api::namespaced_with(client.clone(), namespace, &ar)
}

async fn get_cluster(client: &Client, cluster: &WorkloadCluster) -> Result<Option<DynamicObject>> {
    Ok(cluster_api(client, &cluster.namespace)
        .get_opt(&cluster.name)
        .await?)
}

async fn crd_exists(client: &Client, name: &str) -> Result<bool> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    Ok(crds.get_opt(name).await?.is_some())
}

async fn controllers_present(client: &Client) -> Result<bool> {
    for crd in REQUIRED_CRDS {
        if !crd_exists(client, crd).await? {
            debug!(crd = %crd, "Cluster API CRD missing");
            return Ok(false);
        }
    }
    let namespaces: Api<Namespace> = Api::all(client.clone());
    for namespace in CONTROLLER_NAMESPACES {
        if namespaces.get_opt(namespace).await?.is_none() {
            debug!(namespace = %namespace, "controller namespace missing");
            return Ok(false);
        }
    }
    Ok(true)
}

/// Name of the marker ConfigMap a pivot leaves in the source cluster
pub(crate) fn pivot_marker_name(cluster: &str) -> String {
    format!("{}-pivoted", cluster)
}

/// Record in `source` that `cluster` was moved to `destination`
pub(crate) async fn record_pivot(
    source: &ClusterHandle,
    destination: &ClusterHandle,
    cluster: &WorkloadCluster,
) -> Result<()> {
    let client = client_for(source).await?;
    let api: Api<ConfigMap> = Api::namespaced(client, &cluster.namespace);
    let marker = ConfigMap {
        metadata: ObjectMeta {
            name: Some(pivot_marker_name(&cluster.name)),
            namespace: Some(cluster.namespace.clone()),
            labels: Some(BTreeMap::from([
                (CLUSTER_NAME_LABEL.to_string(), cluster.name.clone()),
                (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
            ])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            "destination".to_string(),
            destination
                .kubeconfig
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| destination.name.clone()),
        )])),
        ..Default::default()
    };
    api.patch(
        &pivot_marker_name(&cluster.name),
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(&marker),
    )
    .await?;
    Ok(())
}

async fn pivot_marker_exists(client: &Client, cluster: &WorkloadCluster) -> Result<bool> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), &cluster.namespace);
    Ok(api.get_opt(&pivot_marker_name(&cluster.name)).await?.is_some())
}

/// True when a `status.conditions` entry of `type` has status `True`
fn condition_true(status: &Value, condition: &str) -> bool {
    status
        .get("conditions")
        .and_then(Value::as_array)
        .map(|conditions| {
            conditions.iter().any(|c| {
                c.get("type").and_then(Value::as_str) == Some(condition)
                    && c.get("status").and_then(Value::as_str) == Some("True")
            })
        })
        .unwrap_or(false)
}

/// Control-plane readiness as reported on a Cluster object
fn cluster_control_plane_ready(cluster: &Value) -> bool {
    let Some(status) = cluster.get("status") else {
        return false;
    };
    status.get("controlPlaneReady").and_then(Value::as_bool) == Some(true)
        || condition_true(status, "ControlPlaneReady")
}

/// Message of the first condition that is not `True`
fn first_unready_message(status: &Value) -> Option<String> {
    status
        .get("conditions")?
        .as_array()?
        .iter()
        .find(|c| c.get("status").and_then(Value::as_str) != Some("True"))
        .and_then(|c| c.get("message").and_then(Value::as_str))
        .map(str::to_string)
}

/// Status snapshot from a Cluster object and its control plane object
fn snapshot_from(cluster: &Value, control_plane: Option<&Value>) -> StatusSnapshot {
    let cp_status = control_plane.and_then(|cp| cp.get("status"));
    let int = |key: &str| {
        cp_status
            .and_then(|s| s.get(key))
            .and_then(Value::as_i64)
            .unwrap_or(0)
    };
    StatusSnapshot {
        initialized: cp_status
            .and_then(|s| s.get("initialized"))
            .and_then(Value::as_bool)
            .unwrap_or(false),
        ready: cluster_control_plane_ready(cluster),
        ready_replicas: int("readyReplicas"),
        replicas: int("replicas"),
        message: cluster.get("status").and_then(first_unready_message),
    }
}

/// `spec.controlPlaneRef` of a Cluster as (apiVersion, kind, name)
fn control_plane_ref(cluster: &Value) -> Option<(String, String, String)> {
    let reference = cluster.get("spec")?.get("controlPlaneRef")?;
    let field = |key: &str| reference.get(key).and_then(Value::as_str).map(str::to_string);
    Some((field("apiVersion")?, field("kind")?, field("name")?))
}

async fn control_plane_status(handle: &ClusterHandle, cluster: &WorkloadCluster) -> Result<StatusSnapshot> {
    let client = client_for(handle).await?;
    let Some(object) = get_cluster(&client, cluster).await? else {
        return Err(Error::fatal(
            &cluster.name,
            "status",
            format!("Cluster {} not found", cluster),
        ));
    };
    let cluster_value = serde_json::to_value(&object)?;

    let control_plane = match control_plane_ref(&cluster_value) {
        Some((api_version, kind, name)) => {
            let ar = build_api_resource(&api_version, &kind);
            let api: Api<DynamicObject> = Api::namespaced_with(client, &cluster.namespace, &ar);
            api.get_opt(&name)
                .await?
                .map(|cp| serde_json::to_value(&cp))
                .transpose()?
        }
        None => None,
    };
    Ok(snapshot_from(&cluster_value, control_plane.as_ref()))
}

/// `Kind/name`, as reported for manifests that did not land
fn manifest_key(kind: &str, name: &str) -> String {
    format!("{}/{}", kind, name)
}

/// Path a workload cluster's kubeconfig is written to
pub(crate) fn kubeconfig_path(dir: &Path, cluster: &str) -> PathBuf {
    dir.join(format!("{}.kubeconfig", cluster))
}

async fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    let io_err = |e: std::io::Error| {
        Error::fatal(
            capzctl_common::error::UNKNOWN_CONTEXT,
            "kubeconfig",
            format!("failed to write {}: {}", path.display(), e),
        )
    };
    tokio::fs::write(path, contents).await.map_err(io_err)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(io_err)?;
    }
    Ok(())
}

enum WatchState {
    First,
    Polling,
    Done,
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn apply(&self, handle: &ClusterHandle, bundle: &ManifestBundle) -> Result<()> {
        let client = client_for(handle).await?;
        let params = PatchParams::apply(FIELD_MANAGER).force();
        for manifest in bundle.manifests() {
            let object: DynamicObject = serde_json::from_value(serde_json::to_value(manifest)?)?;
            let ar = build_api_resource(&manifest.api_version, &manifest.kind);
            let namespace = manifest.metadata.namespace.as_deref().unwrap_or("default");
            let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, &ar);
            api.patch(manifest.name(), &params, &Patch::Apply(&object))
                .await?;
            debug!(kind = %manifest.kind, name = %manifest.name(), "applied manifest");
        }
        info!(management = %handle.name, manifests = bundle.len(), "manifests applied");
        Ok(())
    }

    async fn missing_manifests(
        &self,
        handle: &ClusterHandle,
        bundle: &ManifestBundle,
    ) -> Result<Vec<String>> {
        let client = client_for(handle).await?;
        let mut missing = Vec::new();
        for manifest in bundle.manifests() {
            let ar = build_api_resource(&manifest.api_version, &manifest.kind);
            let namespace = manifest.metadata.namespace.as_deref().unwrap_or("default");
            let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, &ar);
            if api.get_opt(manifest.name()).await?.is_none() {
                missing.push(manifest_key(&manifest.kind, manifest.name()));
            }
        }
        debug!(management = %handle.name, missing = missing.len(), "checked applied manifests");
        Ok(missing)
    }

    async fn controllers_installed(&self, handle: &ClusterHandle) -> Result<bool> {
        let client = client_for(handle).await?;
        controllers_present(&client).await
    }

    async fn observe(&self, handle: &ClusterHandle, cluster: &WorkloadCluster) -> Result<ObservedCluster> {
        let client = client_for(handle).await?;
        if !controllers_present(&client).await? {
            return Ok(ObservedCluster::default());
        }

        let mut observed = ObservedCluster {
            controllers_installed: true,
            pivoted: pivot_marker_exists(&client, cluster).await?,
            ..Default::default()
        };
        if let Some(object) = get_cluster(&client, cluster).await? {
            observed.cluster_exists = true;
            observed.deleting = object.metadata.deletion_timestamp.is_some();
            observed.control_plane_ready =
                cluster_control_plane_ready(&serde_json::to_value(&object)?);
        }
        debug!(cluster = %cluster, observed = ?observed, "observed cluster");
        Ok(observed)
    }

    fn watch_control_plane_status(
        &self,
        handle: &ClusterHandle,
        cluster: &WorkloadCluster,
    ) -> BoxStream<'static, Result<StatusSnapshot>> {
        let handle = handle.clone();
        let cluster = cluster.clone();
        let interval = self.poll_interval;
        stream::unfold(WatchState::First, move |state| {
            let handle = handle.clone();
            let cluster = cluster.clone();
            async move {
                match state {
                    WatchState::Done => None,
                    WatchState::First | WatchState::Polling => {
                        if matches!(state, WatchState::Polling) {
                            tokio::time::sleep(interval).await;
                        }
                        let item = control_plane_status(&handle, &cluster).await;
                        let next = match &item {
                            Ok(snapshot) if snapshot.ready => WatchState::Done,
                            _ => WatchState::Polling,
                        };
                        Some((item, next))
                    }
                }
            }
        })
        .boxed()
    }

    async fn delete_cluster(&self, handle: &ClusterHandle, cluster: &WorkloadCluster) -> Result<()> {
        let client = client_for(handle).await?;
        match cluster_api(&client, &cluster.namespace)
            .delete(&cluster.name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(cluster = %cluster, "Cluster already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_clusters(&self, handle: &ClusterHandle) -> Result<Vec<WorkloadCluster>> {
        let client = client_for(handle).await?;
        let ar = build_api_resource(CLUSTER_API_VERSION, "Cluster");
        let api: Api<DynamicObject> = Api::all_with(client, &ar);
        let mut clusters: Vec<WorkloadCluster> = api
            .list(&ListParams::default())
            .await?
            .items
            .into_iter()
            .filter_map(|object| {
                let name = object.metadata.name?;
                let namespace = object.metadata.namespace.unwrap_or_else(|| "default".to_string());
                Some(WorkloadCluster::new(namespace, name))
            })
            .collect();
        clusters.sort();
        Ok(clusters)
    }

    async fn workload_handle(
        &self,
        handle: &ClusterHandle,
        cluster: &WorkloadCluster,
    ) -> Result<ClusterHandle> {
        let client = client_for(handle).await?;
        let secrets: Api<Secret> = Api::namespaced(client, &cluster.namespace);
        let secret_name = format!("{}-kubeconfig", cluster.name);
        let secret = secrets.get_opt(&secret_name).await?.ok_or_else(|| {
            Error::transient(
                &cluster.name,
                "kubeconfig",
                format!("secret {} not available yet", secret_name),
            )
        })?;
        let contents = secret
            .data
            .as_ref()
            .and_then(|data| data.get(KUBECONFIG_SECRET_KEY))
            .ok_or_else(|| {
                Error::fatal(
                    &cluster.name,
                    "kubeconfig",
                    format!("secret {} has no {} key", secret_name, KUBECONFIG_SECRET_KEY),
                )
            })?;

        let path = kubeconfig_path(&self.kubeconfig_dir, &cluster.name);
        write_private(&path, &contents.0).await?;
        info!(cluster = %cluster, path = %path.display(), "workload kubeconfig written");

        Ok(ClusterHandle {
            name: cluster.name.clone(),
            resource_group: cluster.name.clone(),
            kubeconfig: Some(path),
            context: None,
            origin: HandleOrigin::Existing,
        })
    }
}
