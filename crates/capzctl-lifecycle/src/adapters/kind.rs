//! Management clusters backed by kind and initialized with clusterctl
//!
//! A management cluster reached through an explicit kubeconfig is treated as
//! existing unless its context is a `kind-<name>` context, which marks a
//! cluster this tool provisioned. Without a kubeconfig, `kind get clusters`
//! decides whether the named cluster exists.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use capzctl_common::kube_utils::{create_client, kubeconfig_contexts};
use capzctl_common::retry::RetryConfig;
use capzctl_common::{Error, Result};

use super::clusterctl;
use super::command::ExternalCommand;
use crate::collaborators::ManagementClusterProvider;
use crate::state::{ClusterHandle, HandleOrigin};

/// How long `kind create cluster` waits for the node to be ready
const KIND_WAIT: &str = "5m";

/// [`ManagementClusterProvider`] over kind and clusterctl
#[derive(Clone, Debug, Default)]
pub struct KindManagementProvider {
    kubeconfig: Option<PathBuf>,
    context: Option<String>,
    init_retry: RetryConfig,
}

impl KindManagementProvider {
    /// Provider using the default kubeconfig
    pub fn new() -> Self {
        Self {
            init_retry: RetryConfig::with_max_attempts(3),
            ..Default::default()
        }
    }

    /// Use an explicit management kubeconfig and context
    pub fn with_kubeconfig(mut self, kubeconfig: Option<PathBuf>, context: Option<String>) -> Self {
        self.kubeconfig = kubeconfig;
        self.context = context;
        self
    }

    fn kind_handle(&self, name: &str, resource_group: &str) -> ClusterHandle {
        ClusterHandle {
            name: name.to_string(),
            resource_group: resource_group.to_string(),
            kubeconfig: self.kubeconfig.clone(),
            context: Some(kind_context(name)),
            origin: HandleOrigin::JustInTime,
        }
    }

    async fn find_configured(
        &self,
        name: &str,
        resource_group: &str,
    ) -> Result<Option<ClusterHandle>> {
        if let Some(path) = &self.kubeconfig {
            let contexts = kubeconfig_contexts(path)?;
            if let Some(context) = &self.context {
                if !contexts.contains(context) {
                    return Err(Error::fatal(
                        name,
                        "kubeconfig",
                        format!("context {} not found in {}", context, path.display()),
                    ));
                }
            }
        }

        let client = create_client(self.kubeconfig.as_deref(), self.context.as_deref()).await?;
        let version = client.apiserver_version().await?;
        debug!(management = %name, version = %version.git_version, "management cluster reachable");

        Ok(Some(ClusterHandle {
            name: name.to_string(),
            resource_group: resource_group.to_string(),
            kubeconfig: self.kubeconfig.clone(),
            context: self.context.clone(),
            origin: self
                .context
                .as_deref()
                .map(origin_for_context)
                .unwrap_or(HandleOrigin::Existing),
        }))
    }
}

#[async_trait]
impl ManagementClusterProvider for KindManagementProvider {
    async fn find(&self, name: &str, resource_group: &str) -> Result<Option<ClusterHandle>> {
        if self.kubeconfig.is_some() || self.context.is_some() {
            return self.find_configured(name, resource_group).await;
        }

        let output = ExternalCommand::new("kind", name)
            .args(["get", "clusters"])
            .run()
            .await?;
        if kind_clusters(&output).any(|c| c == name) {
            debug!(management = %name, "found kind cluster");
            Ok(Some(self.kind_handle(name, resource_group)))
        } else {
            Ok(None)
        }
    }

    async fn create(
        &self,
        name: &str,
        resource_group: &str,
        location: &str,
    ) -> Result<ClusterHandle> {
        info!(management = %name, location = %location, "creating kind management cluster");
        let mut args = vec![
            "create".to_string(),
            "cluster".to_string(),
            "--name".to_string(),
            name.to_string(),
            "--wait".to_string(),
            KIND_WAIT.to_string(),
        ];
        if let Some(path) = &self.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(path.display().to_string());
        }
        ExternalCommand::new("kind", name).args(args).run().await?;
        Ok(self.kind_handle(name, resource_group))
    }

    async fn install_controllers(&self, handle: &ClusterHandle) -> Result<()> {
        clusterctl::init(handle, &self.init_retry).await
    }

    async fn upgrade_controllers(&self, handle: &ClusterHandle) -> Result<()> {
        clusterctl::upgrade(handle, &self.init_retry).await
    }

    async fn delete(&self, handle: &ClusterHandle) -> Result<()> {
        if !handle.is_just_in_time() {
            return Err(Error::precondition(
                &handle.name,
                "refusing to delete a management cluster capzctl did not create",
            ));
        }
        info!(management = %handle.name, "deleting kind management cluster");
        let mut args = vec![
            "delete".to_string(),
            "cluster".to_string(),
            "--name".to_string(),
            handle.name.clone(),
        ];
        if let Some(path) = &handle.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(path.display().to_string());
        }
        ExternalCommand::new("kind", &handle.name)
            .args(args)
            .run()
            .await?;
        Ok(())
    }
}

/// kubeconfig context kind creates for a cluster
fn kind_context(name: &str) -> String {
    format!("kind-{}", name)
}

/// Origin implied by a kubeconfig context name
fn origin_for_context(context: &str) -> HandleOrigin {
    if context.starts_with("kind-") {
        HandleOrigin::JustInTime
    } else {
        HandleOrigin::Existing
    }
}

/// Cluster names printed by `kind get clusters`
fn kind_clusters(output: &str) -> impl Iterator<Item = &str> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("No kind clusters"))
}
