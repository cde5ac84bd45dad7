//! CLI command implementations

pub mod create;
pub mod delete;
pub mod format;
pub mod generate;
pub mod list;
pub mod management;
pub mod pivot;
pub mod show;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, ValueEnum};

use capzctl_capi::{
    ClusterRequest, CustomTemplate, DiskMode, IdentityRequest, OsFamily, SchemaVersion, Topology,
};
use capzctl_lifecycle::adapters::{
    ClusterctlPivot, KindManagementProvider, KubeClusterApi, KubectlAddons,
};
use capzctl_lifecycle::{ManagementTarget, Orchestrator, OrchestratorConfig, WorkloadCluster};

use crate::config::{self, CapzctlConfig};
use crate::{Error, GlobalArgs, Result};

/// Namespace used when a command doesn't name one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Worker operating system
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OsArg {
    Linux,
    Windows,
}

impl From<OsArg> for OsFamily {
    fn from(os: OsArg) -> Self {
        match os {
            OsArg::Linux => OsFamily::Linux,
            OsArg::Windows => OsFamily::Windows,
        }
    }
}

/// OS disk mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DiskArg {
    Managed,
    Ephemeral,
}

impl From<DiskArg> for DiskMode {
    fn from(disk: DiskArg) -> Self {
        match disk {
            DiskArg::Managed => DiskMode::Managed,
            DiskArg::Ephemeral => DiskMode::Ephemeral,
        }
    }
}

/// Worker topology
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TopologyArg {
    MachineDeployment,
    MachinePool,
}

impl From<TopologyArg> for Topology {
    fn from(topology: TopologyArg) -> Self {
        match topology {
            TopologyArg::MachineDeployment => Topology::MachineDeployment,
            TopologyArg::MachinePool => Topology::MachinePool,
        }
    }
}

/// Everything that describes the cluster to compose
#[derive(Args, Debug, Clone, Default)]
pub struct ClusterArgs {
    /// Cluster name (a memorable one is generated when omitted)
    #[arg(short, long, env = "CLUSTER_NAME")]
    pub name: Option<String>,

    /// Namespace of the Cluster API resources
    #[arg(long)]
    pub namespace: Option<String>,

    /// Kubernetes version
    #[arg(long, env = "AZURE_KUBERNETES_VERSION")]
    pub kubernetes_version: Option<String>,

    /// Number of control-plane machines
    #[arg(long, env = "AZURE_CONTROL_PLANE_MACHINE_COUNT", allow_negative_numbers = true)]
    pub control_plane_machine_count: Option<i64>,

    /// VM size of the control-plane machines
    #[arg(long, env = "AZURE_CONTROL_PLANE_MACHINE_TYPE")]
    pub control_plane_machine_type: Option<String>,

    /// Number of worker machines
    #[arg(long, env = "AZURE_NODE_MACHINE_COUNT", allow_negative_numbers = true)]
    pub worker_machine_count: Option<i64>,

    /// VM size of the worker machines
    #[arg(long, env = "AZURE_NODE_MACHINE_TYPE")]
    pub worker_machine_type: Option<String>,

    /// Worker operating system
    #[arg(long, value_enum)]
    pub os: Option<OsArg>,

    /// OS disk mode
    #[arg(long, value_enum)]
    pub disk: Option<DiskArg>,

    /// Worker topology
    #[arg(long, value_enum)]
    pub topology: Option<TopologyArg>,

    /// Run the Azure cloud controller manager out of tree
    #[arg(long)]
    pub external_cloud_provider: bool,

    /// SSH public key installed on every machine
    #[arg(long, env = "AZURE_SSH_PUBLIC_KEY")]
    pub ssh_public_key: Option<String>,

    /// Read the SSH public key from a file
    #[arg(long, conflicts_with = "ssh_public_key")]
    pub ssh_public_key_file: Option<PathBuf>,

    /// Azure resource group (defaults to the cluster name)
    #[arg(short = 'g', long)]
    pub resource_group: Option<String>,

    /// Azure location
    #[arg(short, long, env = "AZURE_LOCATION")]
    pub location: Option<String>,

    /// Azure subscription
    #[arg(long, env = "AZURE_SUBSCRIPTION_ID")]
    pub subscription_id: Option<String>,

    /// Existing virtual network to place the cluster in
    #[arg(long)]
    pub vnet_name: Option<String>,

    /// Azure AD tenant of the service principal
    #[arg(long, env = "AZURE_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Client id of the service principal
    #[arg(long, env = "AZURE_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Name of the AzureClusterIdentity
    #[arg(long, env = "CLUSTER_IDENTITY_NAME")]
    pub identity_name: Option<String>,

    /// Secret holding the service principal's client secret
    #[arg(long, env = "AZURE_CLUSTER_IDENTITY_SECRET_NAME")]
    pub identity_secret_name: Option<String>,

    /// Namespace of the client secret
    #[arg(long, env = "AZURE_CLUSTER_IDENTITY_SECRET_NAMESPACE")]
    pub identity_secret_namespace: Option<String>,

    /// YAML file with preBootstrapCommands and postBootstrapCommands
    #[arg(long)]
    pub bootstrap_commands: Option<PathBuf>,

    /// Template file used instead of the built-in templates
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// Cluster API schema version (v1alpha4 or v1beta1)
    #[arg(long)]
    pub schema_version: Option<SchemaVersion>,
}

impl ClusterArgs {
    /// The cluster name, generating one when none was given
    pub fn name_or_generate(&self) -> String {
        self.name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(capzctl_common::names::generate_cluster_name)
    }

    fn identity(&self) -> Option<IdentityRequest> {
        if self.tenant_id.is_none() && self.client_id.is_none() {
            return None;
        }
        Some(IdentityRequest {
            name: self.identity_name.clone(),
            tenant_id: self.tenant_id.clone(),
            client_id: self.client_id.clone(),
            secret_name: self.identity_secret_name.clone(),
            secret_namespace: self.identity_secret_namespace.clone(),
        })
    }

    /// Build the raw request; files named by flags are read here
    pub fn to_request(&self, name: String, config: &CapzctlConfig) -> Result<ClusterRequest> {
        let ssh_public_key = match &self.ssh_public_key_file {
            Some(path) => Some(read_file(path, "SSH public key")?.trim().to_string()),
            None => self.ssh_public_key.clone(),
        };
        let bootstrap_commands = self
            .bootstrap_commands
            .as_deref()
            .map(|path| read_file(path, "bootstrap commands"))
            .transpose()?;
        let custom_template = self
            .template
            .as_deref()
            .map(CustomTemplate::from_path)
            .transpose()?;

        Ok(ClusterRequest {
            name,
            namespace: self.namespace.clone(),
            kubernetes_version: self.kubernetes_version.clone(),
            control_plane_machine_count: self.control_plane_machine_count,
            control_plane_machine_type: self.control_plane_machine_type.clone(),
            worker_machine_count: self.worker_machine_count,
            worker_machine_type: self.worker_machine_type.clone(),
            os_family: self.os.map(Into::into),
            disk_mode: self.disk.map(Into::into),
            topology: self.topology.map(Into::into),
            external_cloud_provider: self.external_cloud_provider,
            ssh_public_key,
            resource_group: self.resource_group.clone(),
            location: self.location.clone().or_else(|| config.location.clone()),
            subscription_id: self.subscription_id.clone(),
            vnet_name: self.vnet_name.clone(),
            identity: self.identity(),
            bootstrap_commands,
            custom_template,
            schema_version: self.schema_version,
        })
    }
}

fn read_file(path: &Path, what: &str) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::validation(format!("cannot read {} from {}: {}", what, path.display(), e)))
}

/// Which management cluster to talk to
#[derive(Args, Debug, Clone, Default)]
pub struct ManagementArgs {
    /// Management cluster name
    #[arg(long, env = "CAPZCTL_MANAGEMENT_CLUSTER")]
    pub management_cluster: Option<String>,

    /// Resource group the management cluster is tracked under
    #[arg(long)]
    pub management_resource_group: Option<String>,
}

impl ManagementArgs {
    /// Resolve the target from flags, then config, then defaults
    pub fn target(
        &self,
        config: &CapzctlConfig,
        location: Option<String>,
        provision: bool,
    ) -> ManagementTarget {
        let defaults = ManagementTarget::default();
        let name = self
            .management_cluster
            .clone()
            .or_else(|| config.management_cluster.clone())
            .unwrap_or(defaults.name);
        let resource_group = self
            .management_resource_group
            .clone()
            .or_else(|| config.management_resource_group.clone())
            .unwrap_or_else(|| name.clone());
        ManagementTarget {
            name,
            resource_group,
            location: location.or_else(|| config.location.clone()),
            provision,
        }
    }
}

/// A workload cluster addressed by name
#[derive(Args, Debug, Clone)]
pub struct ClusterRef {
    /// Cluster name
    pub name: String,

    /// Namespace of the Cluster API resources
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,
}

impl ClusterRef {
    pub fn cluster(&self) -> WorkloadCluster {
        WorkloadCluster::new(self.namespace.clone(), self.name.clone())
    }
}

/// Build an orchestrator over kind, clusterctl and the kube API.
///
/// Workload kubeconfigs are written to the current directory.
pub fn orchestrator(
    global: &GlobalArgs,
    config: &CapzctlConfig,
    tunables: OrchestratorConfig,
) -> Result<Orchestrator> {
    let kubeconfig = config::resolve_kubeconfig(global.kubeconfig.as_deref(), config).map(PathBuf::from);
    let context = global
        .context
        .clone()
        .or_else(|| config.management_context.clone());
    let provider = KindManagementProvider::new().with_kubeconfig(kubeconfig, context);
    let clusters =
        KubeClusterApi::new(std::env::current_dir()?).with_poll_interval(tunables.poll_interval);

    Ok(Orchestrator::new(
        Arc::new(provider),
        Arc::new(clusters),
        Arc::new(ClusterctlPivot::default()),
        Arc::new(KubectlAddons::new()),
    )
    .with_config(tunables))
}
