//! clusterctl: controller installation and `clusterctl move`

use async_trait::async_trait;
use tracing::info;

use capzctl_common::retry::{retry_with_backoff, RetryConfig};
use capzctl_common::Result;

use super::command::ExternalCommand;
use super::kube_api::record_pivot;
use super::kubeconfig_args;
use crate::collaborators::PivotService;
use crate::state::{ClusterHandle, WorkloadCluster};

/// Infrastructure provider installed by `clusterctl init`
const INFRASTRUCTURE_PROVIDER: &str = "azure";

/// Feature gates enabled on the Cluster API controllers
const CLUSTERCTL_FEATURES: &[(&str, &str)] = &[
    ("EXP_MACHINE_POOL", "true"),
    ("EXP_CLUSTER_RESOURCE_SET", "true"),
];

fn init_args(handle: &ClusterHandle) -> Vec<String> {
    let mut args = vec![
        "init".to_string(),
        "--infrastructure".to_string(),
        INFRASTRUCTURE_PROVIDER.to_string(),
        "--wait-providers".to_string(),
    ];
    args.extend(kubeconfig_args(handle, "--kubeconfig-context"));
    args
}

/// Contract `clusterctl upgrade apply` moves the providers to
const UPGRADE_CONTRACT: &str = "v1beta1";

fn upgrade_args(handle: &ClusterHandle) -> Vec<String> {
    let mut args = vec![
        "upgrade".to_string(),
        "apply".to_string(),
        "--contract".to_string(),
        UPGRADE_CONTRACT.to_string(),
    ];
    args.extend(kubeconfig_args(handle, "--kubeconfig-context"));
    args
}

fn move_args(source: &ClusterHandle, destination: &ClusterHandle, cluster: &WorkloadCluster) -> Vec<String> {
    let mut args = vec![
        "move".to_string(),
        "--namespace".to_string(),
        cluster.namespace.clone(),
    ];
    args.extend(kubeconfig_args(source, "--kubeconfig-context"));
    if let Some(path) = &destination.kubeconfig {
        args.push("--to-kubeconfig".to_string());
        args.push(path.display().to_string());
    }
    if let Some(context) = &destination.context {
        args.push("--to-kubeconfig-context".to_string());
        args.push(context.clone());
    }
    args
}

/// Install the Azure provider and core controllers on `handle`
pub(crate) async fn init(handle: &ClusterHandle, retry: &RetryConfig) -> Result<()> {
    let args = init_args(handle);
    info!(cluster = %handle.name, args = ?args, "running clusterctl init");
    retry_with_backoff(retry, "clusterctl init", || {
        let mut command = ExternalCommand::new("clusterctl", &handle.name).args(args.clone());
        for (key, value) in CLUSTERCTL_FEATURES {
            command = command.env(key, *value);
        }
        command.run()
    })
    .await?;
    info!(cluster = %handle.name, "Cluster API controllers installed");
    Ok(())
}

/// Upgrade every provider on `handle` to the latest release of the contract
pub(crate) async fn upgrade(handle: &ClusterHandle, retry: &RetryConfig) -> Result<()> {
    let args = upgrade_args(handle);
    info!(cluster = %handle.name, args = ?args, "running clusterctl upgrade");
    retry_with_backoff(retry, "clusterctl upgrade", || {
        ExternalCommand::new("clusterctl", &handle.name)
            .args(args.clone())
            .run()
    })
    .await?;
    info!(cluster = %handle.name, "Cluster API controllers upgraded");
    Ok(())
}

/// [`PivotService`] over `clusterctl move`
#[derive(Clone, Debug)]
pub struct ClusterctlPivot {
    retry: RetryConfig,
}

impl ClusterctlPivot {
    /// Pivot service with the given retry policy for clusterctl calls
    pub fn new(retry: RetryConfig) -> Self {
        Self { retry }
    }
}

impl Default for ClusterctlPivot {
    fn default() -> Self {
        Self::new(RetryConfig::with_max_attempts(3))
    }
}

#[async_trait]
impl PivotService for ClusterctlPivot {
    async fn pivot(
        &self,
        source: &ClusterHandle,
        destination: &ClusterHandle,
        cluster: &WorkloadCluster,
    ) -> Result<()> {
        init(destination, &self.retry).await?;

        let args = move_args(source, destination, cluster);
        info!(cluster = %cluster, args = ?args, "running clusterctl move");
        retry_with_backoff(&self.retry, "clusterctl move", || {
            ExternalCommand::new("clusterctl", &cluster.name)
                .args(args.clone())
                .run()
        })
        .await?;

        record_pivot(source, destination, cluster).await
    }
}
