//! Built-in Azure templates
//!
//! Skeletons follow the upstream CAPZ flavors. Placeholders name
//! [`Variable`]s; `RESOURCE_NAME` is the manifest's own rendered name.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::{
    CatalogVersion, CommandList, Fragment, FragmentBody, FragmentStage, Guard, LayoutSlot,
    NameRule, Placement, RefScope, RefSlot, ResourceKind, TemplateEntry,
};
use crate::constants::{
    CONTAINER_RUNTIME_ANNOTATION, DEFAULT_POD_CIDR, LINUX_AZURE_JSON_PATH, MOVE_HIERARCHY_LABEL,
    POST_KUBEADM_COMMANDS, PRE_KUBEADM_COMMANDS, WINDOWS_AZURE_JSON_PATH,
    WINDOWS_CONTAINER_RUNTIME, WINDOWS_CRI_SOCKET,
};
use crate::context::{DiskMode, OsFamily, SchemaVersion, Topology, Variable};

const CLOUD_INIT_HOSTNAME: &str = "{{ ds.meta_data[\"local_hostname\"] }}";

// ============================================================================
// Versions
// ============================================================================

/// Cluster API v1beta1 catalog
pub(crate) fn v1beta1() -> CatalogVersion {
    let api_versions = BTreeMap::from([
        (ResourceKind::Cluster, "cluster.x-k8s.io/v1beta1"),
        (ResourceKind::MachineDeployment, "cluster.x-k8s.io/v1beta1"),
        (ResourceKind::MachinePool, "cluster.x-k8s.io/v1beta1"),
        (ResourceKind::KubeadmControlPlane, "controlplane.cluster.x-k8s.io/v1beta1"),
        (ResourceKind::KubeadmConfigTemplate, "bootstrap.cluster.x-k8s.io/v1beta1"),
        (ResourceKind::KubeadmConfig, "bootstrap.cluster.x-k8s.io/v1beta1"),
        (ResourceKind::AzureCluster, "infrastructure.cluster.x-k8s.io/v1beta1"),
        (ResourceKind::AzureClusterIdentity, "infrastructure.cluster.x-k8s.io/v1beta1"),
        (ResourceKind::AzureMachineTemplate, "infrastructure.cluster.x-k8s.io/v1beta1"),
        (ResourceKind::AzureMachinePool, "infrastructure.cluster.x-k8s.io/v1beta1"),
    ]);
    version(SchemaVersion::V1Beta1, "v1.26.3", api_versions)
}

/// Cluster API v1alpha4 catalog; machine pools live in the experimental groups
pub(crate) fn v1alpha4() -> CatalogVersion {
    let api_versions = BTreeMap::from([
        (ResourceKind::Cluster, "cluster.x-k8s.io/v1alpha4"),
        (ResourceKind::MachineDeployment, "cluster.x-k8s.io/v1alpha4"),
        (ResourceKind::MachinePool, "exp.cluster.x-k8s.io/v1alpha4"),
        (ResourceKind::KubeadmControlPlane, "controlplane.cluster.x-k8s.io/v1alpha4"),
        (ResourceKind::KubeadmConfigTemplate, "bootstrap.cluster.x-k8s.io/v1alpha4"),
        (ResourceKind::KubeadmConfig, "bootstrap.cluster.x-k8s.io/v1alpha4"),
        (ResourceKind::AzureCluster, "infrastructure.cluster.x-k8s.io/v1alpha4"),
        (ResourceKind::AzureClusterIdentity, "infrastructure.cluster.x-k8s.io/v1alpha4"),
        (ResourceKind::AzureMachineTemplate, "infrastructure.cluster.x-k8s.io/v1alpha4"),
        (ResourceKind::AzureMachinePool, "exp.infrastructure.cluster.x-k8s.io/v1alpha4"),
    ]);
    version(SchemaVersion::V1Alpha4, "v1.22.8", api_versions)
}

fn version(
    schema: SchemaVersion,
    default_kubernetes_version: &'static str,
    api_versions: BTreeMap<ResourceKind, &'static str>,
) -> CatalogVersion {
    let entries = [
        cluster(),
        azure_cluster(),
        azure_cluster_identity(),
        kubeadm_control_plane(),
        azure_machine_template(),
        machine_deployment(),
        kubeadm_config_template(),
        machine_pool(),
        azure_machine_pool(),
        kubeadm_config(),
    ]
    .into_iter()
    .map(|e| (e.kind, e))
    .collect();

    CatalogVersion {
        schema,
        default_kubernetes_version,
        api_versions,
        layout: layout(),
        entries,
        unsupported: vec![(OsFamily::Windows, Topology::MachinePool)],
    }
}

fn layout() -> Vec<LayoutSlot> {
    use ResourceKind::*;
    let md = Topology::MachineDeployment;
    let mp = Topology::MachinePool;
    let slot = |key, kind, placement, include| LayoutSlot {
        key,
        kind,
        placement,
        include,
    };
    vec![
        slot("cluster", Cluster, Placement::Cluster, Guard::Always),
        slot("infra-cluster", AzureCluster, Placement::Cluster, Guard::Always),
        slot("identity", AzureClusterIdentity, Placement::Cluster, Guard::HasIdentity),
        slot("control-plane", KubeadmControlPlane, Placement::ControlPlane, Guard::Always),
        slot("control-plane-template", AzureMachineTemplate, Placement::ControlPlane, Guard::Always),
        slot("worker-pool-0", MachineDeployment, Placement::Workers(md), Guard::Always),
        slot("worker-template-0", AzureMachineTemplate, Placement::Workers(md), Guard::Always),
        slot("worker-bootstrap-0", KubeadmConfigTemplate, Placement::Workers(md), Guard::Always),
        slot("worker-pool-0", MachinePool, Placement::Workers(mp), Guard::Always),
        slot("worker-template-0", AzureMachinePool, Placement::Workers(mp), Guard::Always),
        slot("worker-bootstrap-0", KubeadmConfig, Placement::Workers(mp), Guard::Always),
    ]
}

// ============================================================================
// Shared fragments
// ============================================================================

fn fragment(
    stage: FragmentStage,
    guard: Guard,
    path: &'static [&'static str],
    body: FragmentBody,
) -> Fragment {
    Fragment {
        stage,
        guard,
        path,
        body,
    }
}

fn managed_os_disk() -> Value {
    json!({ "managedDisk": { "storageAccountType": "Premium_LRS" } })
}

fn ephemeral_os_disk() -> Value {
    json!({
        "cachingType": "ReadOnly",
        "diffDiskSettings": { "option": "Local" },
        "managedDisk": { "storageAccountType": "Standard_LRS" }
    })
}

fn disk_fragments(os_disk: &'static [&'static str]) -> [Fragment; 2] {
    [
        fragment(
            FragmentStage::DiskMode,
            Guard::Disk(DiskMode::Managed),
            os_disk,
            FragmentBody::Merge(managed_os_disk),
        ),
        fragment(
            FragmentStage::DiskMode,
            Guard::Disk(DiskMode::Ephemeral),
            os_disk,
            FragmentBody::Merge(ephemeral_os_disk),
        ),
    ]
}

fn command_fragments(
    pre: &'static [&'static str],
    post: &'static [&'static str],
) -> [Fragment; 2] {
    [
        fragment(
            FragmentStage::ListInjection,
            Guard::Always,
            pre,
            FragmentBody::Commands(CommandList::Pre),
        ),
        fragment(
            FragmentStage::ListInjection,
            Guard::Always,
            post,
            FragmentBody::Commands(CommandList::Post),
        ),
    ]
}

fn ssh_key_fragment(path: &'static [&'static str]) -> Fragment {
    fragment(
        FragmentStage::ScalarInjection,
        Guard::Always,
        path,
        FragmentBody::Scalar {
            variable: Variable::SshPublicKeyB64,
            default: "",
        },
    )
}

fn reference(
    path: &'static [&'static str],
    kind: ResourceKind,
    scope: RefScope,
) -> RefSlot {
    RefSlot {
        path,
        kind,
        scope,
        guard: Guard::Always,
    }
}

fn azure_json_file(key: &str, path: &str) -> Value {
    json!({
        "contentFrom": { "secret": { "key": key, "name": "${RESOURCE_NAME}-azure-json" } },
        "owner": "root:root",
        "path": path,
        "permissions": "0644"
    })
}

fn cloud_config_volume() -> Value {
    json!({
        "hostPath": LINUX_AZURE_JSON_PATH,
        "mountPath": LINUX_AZURE_JSON_PATH,
        "name": "cloud-config",
        "readOnly": true
    })
}

fn linux_node_registration() -> Value {
    json!({
        "kubeletExtraArgs": {
            "azure-container-registry-config": LINUX_AZURE_JSON_PATH,
            "cloud-config": LINUX_AZURE_JSON_PATH,
            "cloud-provider": "${CLOUD_PROVIDER}"
        },
        "name": CLOUD_INIT_HOSTNAME
    })
}

// ============================================================================
// Cluster-wide resources
// ============================================================================

fn cluster() -> TemplateEntry {
    TemplateEntry {
        kind: ResourceKind::Cluster,
        name: NameRule::ClusterName,
        labels: &[],
        skeleton: || {
            json!({
                "clusterNetwork": { "pods": { "cidrBlocks": [DEFAULT_POD_CIDR] } }
            })
        },
        fragments: vec![],
        refs: vec![
            reference(
                &["spec", "controlPlaneRef"],
                ResourceKind::KubeadmControlPlane,
                RefScope::ControlPlane,
            ),
            reference(
                &["spec", "infrastructureRef"],
                ResourceKind::AzureCluster,
                RefScope::Cluster,
            ),
        ],
    }
}

fn azure_cluster() -> TemplateEntry {
    TemplateEntry {
        kind: ResourceKind::AzureCluster,
        name: NameRule::ClusterName,
        labels: &[],
        skeleton: || {
            json!({
                "location": "${AZURE_LOCATION}",
                "resourceGroup": "${AZURE_RESOURCE_GROUP}",
                "subscriptionID": "${AZURE_SUBSCRIPTION_ID}",
                "networkSpec": {
                    "subnets": [
                        { "name": "control-plane-subnet", "role": "control-plane" },
                        {
                            "name": "node-subnet",
                            "natGateway": { "name": "node-natgateway" },
                            "role": "node"
                        }
                    ]
                }
            })
        },
        fragments: vec![fragment(
            FragmentStage::ScalarInjection,
            Guard::Always,
            &["spec", "networkSpec", "vnet", "name"],
            FragmentBody::Scalar {
                variable: Variable::VnetName,
                default: "${CLUSTER_NAME}-vnet",
            },
        )],
        refs: vec![RefSlot {
            path: &["spec", "identityRef"],
            kind: ResourceKind::AzureClusterIdentity,
            scope: RefScope::Cluster,
            guard: Guard::HasIdentity,
        }],
    }
}

fn azure_cluster_identity() -> TemplateEntry {
    TemplateEntry {
        kind: ResourceKind::AzureClusterIdentity,
        name: NameRule::FromVariable(Variable::ClusterIdentityName),
        labels: &[(MOVE_HIERARCHY_LABEL, "true")],
        skeleton: || {
            json!({
                "type": "ServicePrincipal",
                "tenantID": "${AZURE_TENANT_ID}",
                "clientID": "${AZURE_CLIENT_ID}",
                "clientSecret": {
                    "name": "${AZURE_CLUSTER_IDENTITY_SECRET_NAME}",
                    "namespace": "${AZURE_CLUSTER_IDENTITY_SECRET_NAMESPACE}"
                },
                "allowedNamespaces": {}
            })
        },
        fragments: vec![],
        refs: vec![],
    }
}

// ============================================================================
// Control plane
// ============================================================================

fn kubeadm_control_plane() -> TemplateEntry {
    TemplateEntry {
        kind: ResourceKind::KubeadmControlPlane,
        name: NameRule::RoleSuffixed,
        labels: &[],
        skeleton: || {
            json!({
                "replicas": "${CONTROL_PLANE_MACHINE_COUNT}",
                "version": "${KUBERNETES_VERSION}",
                "machineTemplate": {},
                "kubeadmConfigSpec": {
                    "clusterConfiguration": {
                        "apiServer": {
                            "extraArgs": {
                                "cloud-config": LINUX_AZURE_JSON_PATH,
                                "cloud-provider": "${CLOUD_PROVIDER}"
                            },
                            "extraVolumes": [cloud_config_volume()],
                            "timeoutForControlPlane": "20m"
                        },
                        "controllerManager": {
                            "extraArgs": {
                                "allocate-node-cidrs": "false",
                                "cloud-config": LINUX_AZURE_JSON_PATH,
                                "cloud-provider": "${CLOUD_PROVIDER}",
                                "cluster-name": "${CLUSTER_NAME}"
                            },
                            "extraVolumes": [cloud_config_volume()]
                        },
                        "etcd": {
                            "local": {
                                "dataDir": "/var/lib/etcddisk/etcd",
                                "extraArgs": { "quota-backend-bytes": "8589934592" }
                            }
                        }
                    },
                    "diskSetup": {
                        "filesystems": [
                            {
                                "device": "/dev/disk/azure/scsi1/lun0",
                                "extraOpts": ["-E", "lazy_itable_init=1,lazy_journal_init=1"],
                                "filesystem": "ext4",
                                "label": "etcd_disk"
                            }
                        ],
                        "partitions": [
                            {
                                "device": "/dev/disk/azure/scsi1/lun0",
                                "layout": true,
                                "overwrite": false,
                                "tableType": "gpt"
                            }
                        ]
                    },
                    "files": [azure_json_file("control-plane-azure.json", LINUX_AZURE_JSON_PATH)],
                    "initConfiguration": { "nodeRegistration": linux_node_registration() },
                    "joinConfiguration": { "nodeRegistration": linux_node_registration() },
                    "mounts": [["LABEL=etcd_disk", "/var/lib/etcddisk"]],
                    "useExperimentalRetryJoin": true
                }
            })
        },
        fragments: command_fragments(
            &["spec", "kubeadmConfigSpec", PRE_KUBEADM_COMMANDS],
            &["spec", "kubeadmConfigSpec", POST_KUBEADM_COMMANDS],
        )
        .to_vec(),
        refs: vec![reference(
            &["spec", "machineTemplate", "infrastructureRef"],
            ResourceKind::AzureMachineTemplate,
            RefScope::SameRole,
        )],
    }
}

/// Rendered for the control plane and for MachineDeployment workers; the
/// role-suffix fragments pick machine size, etcd disk and OS type.
fn azure_machine_template() -> TemplateEntry {
    const OS_DISK: &[&str] = &["spec", "template", "spec", "osDisk"];
    const MACHINE: &[&str] = &["spec", "template", "spec"];

    let mut fragments = disk_fragments(OS_DISK).to_vec();
    fragments.extend([
        fragment(
            FragmentStage::RoleSuffix,
            Guard::ControlPlaneRole,
            MACHINE,
            FragmentBody::Merge(|| {
                json!({
                    "dataDisks": [
                        { "diskSizeGB": 256, "lun": 0, "nameSuffix": "etcddisk" }
                    ],
                    "vmSize": "${AZURE_CONTROL_PLANE_MACHINE_TYPE}"
                })
            }),
        ),
        fragment(
            FragmentStage::RoleSuffix,
            Guard::WorkerRole,
            MACHINE,
            FragmentBody::Merge(|| json!({ "vmSize": "${AZURE_NODE_MACHINE_TYPE}" })),
        ),
        fragment(
            FragmentStage::RoleSuffix,
            Guard::WindowsWorkerRole,
            OS_DISK,
            FragmentBody::Merge(|| json!({ "osType": "Windows" })),
        ),
        ssh_key_fragment(&["spec", "template", "spec", "sshPublicKey"]),
    ]);

    TemplateEntry {
        kind: ResourceKind::AzureMachineTemplate,
        name: NameRule::RoleSuffixed,
        labels: &[],
        skeleton: || {
            json!({
                "template": {
                    "spec": {
                        "osDisk": { "diskSizeGB": 128, "osType": "Linux" }
                    }
                }
            })
        },
        fragments,
        refs: vec![],
    }
}

// ============================================================================
// MachineDeployment workers
// ============================================================================

fn machine_deployment() -> TemplateEntry {
    TemplateEntry {
        kind: ResourceKind::MachineDeployment,
        name: NameRule::RoleSuffixed,
        labels: &[],
        skeleton: || {
            json!({
                "clusterName": "${CLUSTER_NAME}",
                "replicas": "${WORKER_MACHINE_COUNT}",
                "selector": { "matchLabels": {} },
                "template": {
                    "spec": {
                        "bootstrap": {},
                        "clusterName": "${CLUSTER_NAME}",
                        "version": "${KUBERNETES_VERSION}"
                    }
                }
            })
        },
        fragments: vec![fragment(
            FragmentStage::RoleSuffix,
            Guard::WindowsWorkerRole,
            &["metadata", "annotations"],
            FragmentBody::Merge(|| json!({ CONTAINER_RUNTIME_ANNOTATION: WINDOWS_CONTAINER_RUNTIME })),
        )],
        refs: vec![
            reference(
                &["spec", "template", "spec", "bootstrap", "configRef"],
                ResourceKind::KubeadmConfigTemplate,
                RefScope::SameRole,
            ),
            reference(
                &["spec", "template", "spec", "infrastructureRef"],
                ResourceKind::AzureMachineTemplate,
                RefScope::SameRole,
            ),
        ],
    }
}

fn kubeadm_config_template() -> TemplateEntry {
    const SPEC: &[&str] = &["spec", "template", "spec"];

    let mut fragments = vec![
        fragment(
            FragmentStage::OsFamily,
            Guard::Os(OsFamily::Linux),
            SPEC,
            FragmentBody::Merge(|| {
                json!({
                    "files": [azure_json_file("worker-node-azure.json", LINUX_AZURE_JSON_PATH)],
                    "joinConfiguration": { "nodeRegistration": linux_node_registration() }
                })
            }),
        ),
        fragment(
            FragmentStage::OsFamily,
            Guard::Os(OsFamily::Windows),
            SPEC,
            FragmentBody::Merge(|| {
                json!({
                    "files": [azure_json_file("worker-node-azure.json", WINDOWS_AZURE_JSON_PATH)],
                    "joinConfiguration": {
                        "nodeRegistration": {
                            "kubeletExtraArgs": {
                                "azure-container-registry-config": WINDOWS_AZURE_JSON_PATH,
                                "cloud-config": WINDOWS_AZURE_JSON_PATH,
                                "cloud-provider": "${CLOUD_PROVIDER}",
                                "v": "2",
                                "windows-priorityclass": "ABOVE_NORMAL_PRIORITY_CLASS"
                            },
                            "name": CLOUD_INIT_HOSTNAME
                        }
                    }
                })
            }),
        ),
        fragment(
            FragmentStage::RoleSuffix,
            Guard::WindowsWorkerRole,
            &["spec", "template", "spec", "joinConfiguration", "nodeRegistration"],
            FragmentBody::Merge(|| json!({ "criSocket": WINDOWS_CRI_SOCKET })),
        ),
    ];
    fragments.extend(command_fragments(
        &["spec", "template", "spec", PRE_KUBEADM_COMMANDS],
        &["spec", "template", "spec", POST_KUBEADM_COMMANDS],
    ));

    TemplateEntry {
        kind: ResourceKind::KubeadmConfigTemplate,
        name: NameRule::RoleSuffixed,
        labels: &[],
        skeleton: || json!({ "template": { "spec": {} } }),
        fragments,
        refs: vec![],
    }
}

// ============================================================================
// MachinePool workers
// ============================================================================

fn machine_pool() -> TemplateEntry {
    TemplateEntry {
        kind: ResourceKind::MachinePool,
        name: NameRule::RoleSuffixed,
        labels: &[],
        skeleton: || {
            json!({
                "clusterName": "${CLUSTER_NAME}",
                "replicas": "${WORKER_MACHINE_COUNT}",
                "template": {
                    "spec": {
                        "bootstrap": {},
                        "clusterName": "${CLUSTER_NAME}",
                        "version": "${KUBERNETES_VERSION}"
                    }
                }
            })
        },
        fragments: vec![],
        refs: vec![
            reference(
                &["spec", "template", "spec", "bootstrap", "configRef"],
                ResourceKind::KubeadmConfig,
                RefScope::SameRole,
            ),
            reference(
                &["spec", "template", "spec", "infrastructureRef"],
                ResourceKind::AzureMachinePool,
                RefScope::SameRole,
            ),
        ],
    }
}

fn azure_machine_pool() -> TemplateEntry {
    let mut fragments = disk_fragments(&["spec", "template", "osDisk"]).to_vec();
    fragments.push(ssh_key_fragment(&["spec", "template", "sshPublicKey"]));

    TemplateEntry {
        kind: ResourceKind::AzureMachinePool,
        name: NameRule::RoleSuffixed,
        labels: &[],
        skeleton: || {
            json!({
                "location": "${AZURE_LOCATION}",
                "strategy": {
                    "rollingUpdate": {
                        "deletePolicy": "Oldest",
                        "maxSurge": "25%",
                        "maxUnavailable": 1
                    },
                    "type": "RollingUpdate"
                },
                "template": {
                    "osDisk": { "diskSizeGB": 30, "osType": "Linux" },
                    "vmSize": "${AZURE_NODE_MACHINE_TYPE}"
                }
            })
        },
        fragments,
        refs: vec![],
    }
}

fn kubeadm_config() -> TemplateEntry {
    TemplateEntry {
        kind: ResourceKind::KubeadmConfig,
        name: NameRule::RoleSuffixed,
        labels: &[],
        skeleton: || {
            json!({
                "files": [azure_json_file("worker-node-azure.json", LINUX_AZURE_JSON_PATH)],
                "joinConfiguration": { "nodeRegistration": linux_node_registration() }
            })
        },
        fragments: command_fragments(
            &["spec", PRE_KUBEADM_COMMANDS],
            &["spec", POST_KUBEADM_COMMANDS],
        )
        .to_vec(),
        refs: vec![],
    }
}
