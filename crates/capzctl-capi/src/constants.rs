//! Constants for Azure Cluster API composition

// ============================================================================
// Defaults
// ============================================================================

/// Default namespace for composed manifests
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default VM size for control-plane and worker machines
pub const DEFAULT_MACHINE_TYPE: &str = "Standard_D2s_v3";

/// Default number of control-plane machines
pub const DEFAULT_CONTROL_PLANE_COUNT: u32 = 1;

/// Default number of worker machines
pub const DEFAULT_WORKER_COUNT: u32 = 1;

/// Pod CIDR assigned to every composed cluster
pub const DEFAULT_POD_CIDR: &str = "192.168.0.0/16";

/// Maximum length of a DNS label
pub const MAX_DNS_LABEL_LENGTH: usize = 63;

// ============================================================================
// Role suffixes
// ============================================================================

/// Name suffix of control-plane resources
pub const CONTROL_PLANE_SUFFIX: &str = "control-plane";
/// Name suffix of the Linux MachineDeployment worker group
pub const LINUX_DEPLOYMENT_SUFFIX: &str = "md-0";
/// Name suffix of the Windows MachineDeployment worker group
pub const WINDOWS_DEPLOYMENT_SUFFIX: &str = "md-win";
/// Name suffix of the MachinePool worker group
pub const MACHINE_POOL_SUFFIX: &str = "mp-0";

/// Every role suffix; a cluster may not be named after one of these
pub const RESERVED_SUFFIXES: &[&str] = &[
    CONTROL_PLANE_SUFFIX,
    LINUX_DEPLOYMENT_SUFFIX,
    WINDOWS_DEPLOYMENT_SUFFIX,
    MACHINE_POOL_SUFFIX,
];

// ============================================================================
// Well-known keys
// ============================================================================

/// Bootstrap key holding commands run before kubeadm
pub const PRE_KUBEADM_COMMANDS: &str = "preKubeadmCommands";
/// Bootstrap key holding commands run after kubeadm
pub const POST_KUBEADM_COMMANDS: &str = "postKubeadmCommands";

/// Annotation selecting the container runtime of Windows worker groups
pub const CONTAINER_RUNTIME_ANNOTATION: &str = "runtime";
/// Container runtime used by Windows workers
pub const WINDOWS_CONTAINER_RUNTIME: &str = "containerd";
/// CRI socket path used by Windows nodes
pub const WINDOWS_CRI_SOCKET: &str = "npipe:////./pipe/containerd-containerd";

/// Label that makes clusterctl move a resource together with its cluster
pub const MOVE_HIERARCHY_LABEL: &str = "clusterctl.cluster.x-k8s.io/move-hierarchy";

/// Path of the Azure cloud provider config on Linux nodes
pub const LINUX_AZURE_JSON_PATH: &str = "/etc/kubernetes/azure.json";
/// Path of the Azure cloud provider config on Windows nodes
pub const WINDOWS_AZURE_JSON_PATH: &str = "c:/k/azure.json";

// ============================================================================
// Add-ons
// ============================================================================

/// Calico manifest installed into every workload cluster
pub const CALICO_MANIFEST_URL: &str = "https://raw.githubusercontent.com/kubernetes-sigs/cluster-api-provider-azure/master/templates/addons/calico.yaml";
/// Calico for Windows, installed alongside Calico when the cluster has Windows workers
pub const WINDOWS_CALICO_MANIFEST_URL: &str = "https://raw.githubusercontent.com/kubernetes-sigs/cluster-api-provider-azure/main/templates/addons/windows/calico/calico.yaml";
