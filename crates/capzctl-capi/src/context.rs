//! Composition context: the fully resolved, immutable input to composition
//!
//! Produced by the feature resolver, consumed by the composer. Every field
//! has been defaulted and validated, so rendering never has to guess.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bootstrap::BootstrapCommands;
use crate::constants::{
    CONTROL_PLANE_SUFFIX, LINUX_DEPLOYMENT_SUFFIX, MACHINE_POOL_SUFFIX, WINDOWS_DEPLOYMENT_SUFFIX,
};
use crate::custom::CustomTemplate;

/// Operating system of the worker group
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OsFamily {
    /// Linux workers
    #[default]
    Linux,
    /// Windows workers (control plane stays Linux)
    Windows,
}

/// OS disk mode of every machine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiskMode {
    /// Premium managed OS disks
    #[default]
    Managed,
    /// Ephemeral OS disks on the VM's local storage
    Ephemeral,
}

/// How the worker group is realized
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topology {
    /// MachineDeployment + AzureMachineTemplate + KubeadmConfigTemplate
    #[default]
    MachineDeployment,
    /// MachinePool + AzureMachinePool + KubeadmConfig
    MachinePool,
}

/// Cluster API schema version the manifests target
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum SchemaVersion {
    /// Cluster API v1alpha4 / CAPZ v1alpha4
    #[serde(rename = "v1alpha4")]
    V1Alpha4,
    /// Cluster API v1beta1 / CAPZ v1beta1
    #[default]
    #[serde(rename = "v1beta1")]
    V1Beta1,
}

impl SchemaVersion {
    /// Wire name of the version
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::V1Alpha4 => "v1alpha4",
            SchemaVersion::V1Beta1 => "v1beta1",
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1alpha4" => Ok(SchemaVersion::V1Alpha4),
            "v1beta1" => Ok(SchemaVersion::V1Beta1),
            other => Err(format!("unknown schema version '{}'", other)),
        }
    }
}

/// Name suffix identifying a machine role.
///
/// Role-specific rendering decisions are made from the suffix alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RoleSuffix(&'static str);

impl RoleSuffix {
    /// Control-plane machines
    pub const CONTROL_PLANE: RoleSuffix = RoleSuffix(CONTROL_PLANE_SUFFIX);
    /// Linux MachineDeployment workers
    pub const LINUX_DEPLOYMENT: RoleSuffix = RoleSuffix(LINUX_DEPLOYMENT_SUFFIX);
    /// Windows MachineDeployment workers
    pub const WINDOWS_DEPLOYMENT: RoleSuffix = RoleSuffix(WINDOWS_DEPLOYMENT_SUFFIX);
    /// MachinePool workers
    pub const MACHINE_POOL: RoleSuffix = RoleSuffix(MACHINE_POOL_SUFFIX);

    /// Worker suffix for a topology and OS family
    pub fn worker(topology: Topology, os: OsFamily) -> Self {
        match (topology, os) {
            (Topology::MachinePool, _) => Self::MACHINE_POOL,
            (Topology::MachineDeployment, OsFamily::Windows) => Self::WINDOWS_DEPLOYMENT,
            (Topology::MachineDeployment, OsFamily::Linux) => Self::LINUX_DEPLOYMENT,
        }
    }

    /// The suffix text
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// True for control-plane machines
    pub fn is_control_plane(&self) -> bool {
        self.0 == CONTROL_PLANE_SUFFIX
    }

    /// True for any worker group
    pub fn is_worker(&self) -> bool {
        !self.is_control_plane()
    }

    /// True for Windows worker groups
    pub fn is_windows_worker(&self) -> bool {
        self.is_worker() && self.0.ends_with("-win")
    }
}

impl fmt::Display for RoleSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Machine count and VM size of one group
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MachineGroup {
    /// Number of machines (positive)
    pub count: u32,
    /// Azure VM size
    pub machine_type: String,
}

/// Where the cluster's Azure resources live
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AzurePlacement {
    /// Resource group holding the cluster's resources
    pub resource_group: String,
    /// Azure region
    pub location: String,
    /// Subscription id, when known
    pub subscription_id: Option<String>,
}

/// Service principal identity the cluster authenticates with
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterIdentity {
    /// Name of the AzureClusterIdentity resource
    pub name: String,
    /// Azure AD tenant id
    pub tenant_id: String,
    /// Service principal client id
    pub client_id: String,
    /// Secret holding the client secret
    pub secret_name: String,
    /// Namespace of the client secret
    pub secret_namespace: String,
}

/// Fully resolved composition input
#[derive(Clone, Debug, PartialEq)]
pub struct CompositionContext {
    /// Cluster name (DNS label)
    pub cluster_name: String,
    /// Namespace of every composed manifest
    pub namespace: String,
    /// Kubernetes version, `v`-prefixed
    pub kubernetes_version: String,
    /// Control-plane machines
    pub control_plane: MachineGroup,
    /// Worker machines
    pub workers: MachineGroup,
    /// Worker OS family
    pub os_family: OsFamily,
    /// OS disk mode
    pub disk_mode: DiskMode,
    /// Worker topology
    pub topology: Topology,
    /// Run an external cloud controller manager instead of the in-tree provider
    pub external_cloud_provider: bool,
    /// Base64-encoded SSH public key
    pub ssh_public_key_b64: Option<String>,
    /// Azure placement
    pub placement: AzurePlacement,
    /// Name of an existing VNet to use
    pub vnet_name: Option<String>,
    /// Optional service principal identity
    pub identity: Option<ClusterIdentity>,
    /// Bootstrap commands injected into kubeadm configs
    pub bootstrap: BootstrapCommands,
    /// Target Cluster API schema version
    pub schema_version: SchemaVersion,
    /// User template replacing the catalog
    pub custom_template: Option<CustomTemplate>,
}

impl CompositionContext {
    /// Role suffix of the worker group
    pub fn worker_role(&self) -> RoleSuffix {
        RoleSuffix::worker(self.topology, self.os_family)
    }

    /// Value of the derived cloud-provider argument
    pub fn cloud_provider(&self) -> &'static str {
        if self.external_cloud_provider {
            "external"
        } else {
            "azure"
        }
    }

    /// Values for every template variable this context can supply
    pub fn variables(&self) -> VariableMap {
        let mut vars = VariableMap::new();
        vars.set(Variable::ClusterName, self.cluster_name.as_str());
        vars.set(Variable::Namespace, self.namespace.as_str());
        vars.set(Variable::KubernetesVersion, self.kubernetes_version.as_str());
        vars.set(Variable::ControlPlaneMachineCount, self.control_plane.count);
        vars.set(Variable::WorkerMachineCount, self.workers.count);
        vars.set(
            Variable::ControlPlaneMachineType,
            self.control_plane.machine_type.as_str(),
        );
        vars.set(Variable::NodeMachineType, self.workers.machine_type.as_str());
        vars.set(Variable::Location, self.placement.location.as_str());
        vars.set(Variable::ResourceGroup, self.placement.resource_group.as_str());
        vars.set(Variable::CloudProvider, self.cloud_provider());
        if let Some(subscription) = &self.placement.subscription_id {
            vars.set(Variable::SubscriptionId, subscription.as_str());
        }
        if let Some(key) = &self.ssh_public_key_b64 {
            vars.set(Variable::SshPublicKeyB64, key.as_str());
        }
        if let Some(vnet) = &self.vnet_name {
            vars.set(Variable::VnetName, vnet.as_str());
        }
        if let Some(identity) = &self.identity {
            vars.set(Variable::ClusterIdentityName, identity.name.as_str());
            vars.set(Variable::TenantId, identity.tenant_id.as_str());
            vars.set(Variable::ClientId, identity.client_id.as_str());
            vars.set(Variable::IdentitySecretName, identity.secret_name.as_str());
            vars.set(
                Variable::IdentitySecretNamespace,
                identity.secret_namespace.as_str(),
            );
        }
        vars
    }
}

/// A named template variable.
///
/// Templates refer to variables as `${NAME}`; [`Variable::name`] gives the
/// text between the braces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Variable {
    /// CLUSTER_NAME
    ClusterName,
    /// NAMESPACE
    Namespace,
    /// KUBERNETES_VERSION
    KubernetesVersion,
    /// CONTROL_PLANE_MACHINE_COUNT
    ControlPlaneMachineCount,
    /// WORKER_MACHINE_COUNT
    WorkerMachineCount,
    /// AZURE_CONTROL_PLANE_MACHINE_TYPE
    ControlPlaneMachineType,
    /// AZURE_NODE_MACHINE_TYPE
    NodeMachineType,
    /// AZURE_LOCATION
    Location,
    /// AZURE_RESOURCE_GROUP
    ResourceGroup,
    /// AZURE_SUBSCRIPTION_ID
    SubscriptionId,
    /// AZURE_SSH_PUBLIC_KEY_B64
    SshPublicKeyB64,
    /// AZURE_VNET_NAME
    VnetName,
    /// CLOUD_PROVIDER, derived from the external-cloud-provider flag
    CloudProvider,
    /// CLUSTER_IDENTITY_NAME
    ClusterIdentityName,
    /// AZURE_TENANT_ID
    TenantId,
    /// AZURE_CLIENT_ID
    ClientId,
    /// AZURE_CLUSTER_IDENTITY_SECRET_NAME
    IdentitySecretName,
    /// AZURE_CLUSTER_IDENTITY_SECRET_NAMESPACE
    IdentitySecretNamespace,
    /// RESOURCE_NAME, the rendered name of the manifest being composed
    ResourceName,
    /// ROLE_SUFFIX, the role suffix of the manifest being composed
    RoleSuffix,
}

impl Variable {
    /// Every variable, in declaration order
    pub const ALL: &'static [Variable] = &[
        Variable::ClusterName,
        Variable::Namespace,
        Variable::KubernetesVersion,
        Variable::ControlPlaneMachineCount,
        Variable::WorkerMachineCount,
        Variable::ControlPlaneMachineType,
        Variable::NodeMachineType,
        Variable::Location,
        Variable::ResourceGroup,
        Variable::SubscriptionId,
        Variable::SshPublicKeyB64,
        Variable::VnetName,
        Variable::CloudProvider,
        Variable::ClusterIdentityName,
        Variable::TenantId,
        Variable::ClientId,
        Variable::IdentitySecretName,
        Variable::IdentitySecretNamespace,
        Variable::ResourceName,
        Variable::RoleSuffix,
    ];

    /// Placeholder name used inside templates
    pub fn name(&self) -> &'static str {
        match self {
            Variable::ClusterName => "CLUSTER_NAME",
            Variable::Namespace => "NAMESPACE",
            Variable::KubernetesVersion => "KUBERNETES_VERSION",
            Variable::ControlPlaneMachineCount => "CONTROL_PLANE_MACHINE_COUNT",
            Variable::WorkerMachineCount => "WORKER_MACHINE_COUNT",
            Variable::ControlPlaneMachineType => "AZURE_CONTROL_PLANE_MACHINE_TYPE",
            Variable::NodeMachineType => "AZURE_NODE_MACHINE_TYPE",
            Variable::Location => "AZURE_LOCATION",
            Variable::ResourceGroup => "AZURE_RESOURCE_GROUP",
            Variable::SubscriptionId => "AZURE_SUBSCRIPTION_ID",
            Variable::SshPublicKeyB64 => "AZURE_SSH_PUBLIC_KEY_B64",
            Variable::VnetName => "AZURE_VNET_NAME",
            Variable::CloudProvider => "CLOUD_PROVIDER",
            Variable::ClusterIdentityName => "CLUSTER_IDENTITY_NAME",
            Variable::TenantId => "AZURE_TENANT_ID",
            Variable::ClientId => "AZURE_CLIENT_ID",
            Variable::IdentitySecretName => "AZURE_CLUSTER_IDENTITY_SECRET_NAME",
            Variable::IdentitySecretNamespace => "AZURE_CLUSTER_IDENTITY_SECRET_NAMESPACE",
            Variable::ResourceName => "RESOURCE_NAME",
            Variable::RoleSuffix => "ROLE_SUFFIX",
        }
    }

    /// Look a variable up by placeholder name
    pub fn from_name(name: &str) -> Option<Variable> {
        Self::ALL.iter().copied().find(|v| v.name() == name)
    }

    /// True for variables the composer fills per manifest rather than the context
    pub fn is_entry_scoped(&self) -> bool {
        matches!(self, Variable::ResourceName | Variable::RoleSuffix)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed variable value
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VarValue {
    /// Text
    Str(String),
    /// Count
    Int(u32),
}

impl VarValue {
    /// JSON form, used when a placeholder is the entire string
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            VarValue::Str(s) => serde_json::Value::String(s.clone()),
            VarValue::Int(n) => serde_json::Value::from(*n),
        }
    }
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarValue::Str(s) => f.write_str(s),
            VarValue::Int(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for VarValue {
    fn from(s: &str) -> Self {
        VarValue::Str(s.to_string())
    }
}

impl From<String> for VarValue {
    fn from(s: String) -> Self {
        VarValue::Str(s)
    }
}

impl From<u32> for VarValue {
    fn from(n: u32) -> Self {
        VarValue::Int(n)
    }
}

/// Variable values available to a rendering pass
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VariableMap {
    values: BTreeMap<Variable, VarValue>,
}

impl VariableMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value
    pub fn set(&mut self, var: Variable, value: impl Into<VarValue>) {
        self.values.insert(var, value.into());
    }

    /// Value of a variable, if supplied
    pub fn get(&self, var: Variable) -> Option<&VarValue> {
        self.values.get(&var)
    }

    /// True when the variable has a value
    pub fn contains(&self, var: Variable) -> bool {
        self.values.contains_key(&var)
    }

    /// Copy with additional values layered on top
    pub fn with(&self, extra: impl IntoIterator<Item = (Variable, VarValue)>) -> Self {
        let mut values = self.values.clone();
        values.extend(extra);
        Self { values }
    }

    /// Values keyed by placeholder name, stringified
    pub fn to_env(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .map(|(k, v)| (k.name().to_string(), v.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::control_plane(RoleSuffix::CONTROL_PLANE, true, false)]
    #[case::linux_md(RoleSuffix::LINUX_DEPLOYMENT, false, false)]
    #[case::windows_md(RoleSuffix::WINDOWS_DEPLOYMENT, false, true)]
    #[case::pool(RoleSuffix::MACHINE_POOL, false, false)]
    fn role_suffix_classification(
        #[case] role: RoleSuffix,
        #[case] control_plane: bool,
        #[case] windows: bool,
    ) {
        assert_eq!(role.is_control_plane(), control_plane);
        assert_eq!(role.is_worker(), !control_plane);
        assert_eq!(role.is_windows_worker(), windows);
    }

    #[test]
    fn worker_suffix_follows_topology_then_os() {
        assert_eq!(
            RoleSuffix::worker(Topology::MachineDeployment, OsFamily::Windows).as_str(),
            "md-win"
        );
        assert_eq!(
            RoleSuffix::worker(Topology::MachineDeployment, OsFamily::Linux).as_str(),
            "md-0"
        );
        assert_eq!(
            RoleSuffix::worker(Topology::MachinePool, OsFamily::Linux).as_str(),
            "mp-0"
        );
    }

    #[test]
    fn variable_names_round_trip() {
        for var in Variable::ALL {
            assert_eq!(Variable::from_name(var.name()), Some(*var));
        }
        assert_eq!(Variable::from_name("NOT_A_VARIABLE"), None);
    }

    #[test]
    fn schema_version_parses_and_orders() {
        assert_eq!("v1beta1".parse::<SchemaVersion>(), Ok(SchemaVersion::V1Beta1));
        assert!("v2".parse::<SchemaVersion>().is_err());
        assert!(SchemaVersion::V1Alpha4 < SchemaVersion::V1Beta1);
        assert_eq!(SchemaVersion::default(), SchemaVersion::V1Beta1);
    }

    #[test]
    fn variable_map_layers_and_stringifies() {
        let mut vars = VariableMap::new();
        vars.set(Variable::ClusterName, "demo");
        vars.set(Variable::WorkerMachineCount, 3u32);
        let layered = vars.with([(Variable::ResourceName, VarValue::from("demo-md-0"))]);
        assert!(layered.contains(Variable::ResourceName));
        assert!(!vars.contains(Variable::ResourceName));
        let env = layered.to_env();
        assert_eq!(env["WORKER_MACHINE_COUNT"], "3");
        assert_eq!(env["RESOURCE_NAME"], "demo-md-0");
    }
}
