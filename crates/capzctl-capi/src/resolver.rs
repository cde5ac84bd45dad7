//! Feature resolver
//!
//! Converts a raw [`ClusterRequest`] into a [`CompositionContext`]: applies
//! defaults, validates each field and the combinations between them, parses
//! the bootstrap command document and checks that every variable the planned
//! templates require can be supplied. Pure: no I/O, no external calls.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use capzctl_common::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bootstrap::BootstrapCommands;
use crate::catalog::TemplateCatalog;
use crate::constants::{
    DEFAULT_CONTROL_PLANE_COUNT, DEFAULT_MACHINE_TYPE, DEFAULT_NAMESPACE, DEFAULT_WORKER_COUNT,
    MAX_DNS_LABEL_LENGTH, RESERVED_SUFFIXES,
};
use crate::context::{
    AzurePlacement, ClusterIdentity, CompositionContext, DiskMode, MachineGroup, OsFamily,
    SchemaVersion, Topology,
};
use crate::custom::CustomTemplate;

/// Default name of the AzureClusterIdentity
pub const DEFAULT_IDENTITY_NAME: &str = "cluster-identity";
/// Default name of the secret holding the identity's client secret
pub const DEFAULT_IDENTITY_SECRET_NAME: &str = "cluster-identity-secret";

/// Raw cluster creation input as given by the user
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterRequest {
    /// Cluster name
    pub name: String,
    /// Namespace of the composed manifests
    pub namespace: Option<String>,
    /// Kubernetes version, with or without the `v` prefix
    pub kubernetes_version: Option<String>,
    /// Number of control-plane machines
    pub control_plane_machine_count: Option<i64>,
    /// Control-plane VM size
    pub control_plane_machine_type: Option<String>,
    /// Number of worker machines
    pub worker_machine_count: Option<i64>,
    /// Worker VM size
    pub worker_machine_type: Option<String>,
    /// Worker OS family
    pub os_family: Option<OsFamily>,
    /// OS disk mode
    pub disk_mode: Option<DiskMode>,
    /// Worker topology
    pub topology: Option<Topology>,
    /// Use an external cloud controller manager
    pub external_cloud_provider: bool,
    /// SSH public key, as found in an `id_rsa.pub` file
    pub ssh_public_key: Option<String>,
    /// Azure resource group; defaults to the cluster name
    pub resource_group: Option<String>,
    /// Azure region
    pub location: Option<String>,
    /// Azure subscription id
    pub subscription_id: Option<String>,
    /// Existing VNet to place the cluster in
    pub vnet_name: Option<String>,
    /// Service principal identity
    pub identity: Option<IdentityRequest>,
    /// Bootstrap command document (YAML text)
    pub bootstrap_commands: Option<String>,
    /// Template replacing the built-in catalog
    #[serde(skip)]
    pub custom_template: Option<CustomTemplate>,
    /// Target Cluster API schema version; defaults to the newest in the catalog
    pub schema_version: Option<SchemaVersion>,
}

/// Raw service principal identity
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentityRequest {
    /// AzureClusterIdentity name
    pub name: Option<String>,
    /// Azure AD tenant id
    pub tenant_id: Option<String>,
    /// Service principal client id
    pub client_id: Option<String>,
    /// Secret holding the client secret
    pub secret_name: Option<String>,
    /// Namespace of that secret
    pub secret_namespace: Option<String>,
}

/// Resolve a request against the catalog
pub fn resolve(catalog: &TemplateCatalog, request: &ClusterRequest) -> Result<CompositionContext> {
    let name = request.name.trim();
    validate_dns_label(name, "name", name)?;
    if RESERVED_SUFFIXES.contains(&name) {
        return Err(Error::validation_for_field(
            name,
            "name",
            format!("'{}' is a reserved role suffix and cannot name a cluster", name),
        ));
    }

    let namespace = non_empty(&request.namespace).unwrap_or(DEFAULT_NAMESPACE);
    validate_dns_label(namespace, "namespace", name)?;

    let schema_version = match request.schema_version {
        Some(v) => v,
        None => catalog.newest().unwrap_or_default(),
    };
    let version = catalog
        .version(schema_version)
        .map_err(|e| in_cluster(e, name))?;

    let kubernetes_version = match non_empty(&request.kubernetes_version) {
        Some(v) => normalize_kubernetes_version(v)
            .ok_or_else(|| {
                Error::validation_for_field(
                    name,
                    "kubernetesVersion",
                    format!("'{}' is not a MAJOR.MINOR.PATCH version", v),
                )
            })?,
        None => version.default_kubernetes_version.to_string(),
    };

    let control_plane_count = machine_count(
        name,
        "controlPlaneMachineCount",
        request.control_plane_machine_count,
        DEFAULT_CONTROL_PLANE_COUNT,
    )?;
    if control_plane_count > 1 && control_plane_count % 2 == 0 {
        warn!(
            cluster = %name,
            count = control_plane_count,
            "Even control-plane machine count; etcd quorum prefers an odd count"
        );
    }
    let worker_count = machine_count(
        name,
        "workerMachineCount",
        request.worker_machine_count,
        DEFAULT_WORKER_COUNT,
    )?;

    let os_family = request.os_family.unwrap_or_default();
    let disk_mode = request.disk_mode.unwrap_or_default();
    let topology = request.topology.unwrap_or_default();
    if !version.supports(os_family, topology) {
        return Err(Error::validation_for_field(
            name,
            "osFamily",
            format!(
                "{:?} workers cannot use {:?} in schema {}",
                os_family, topology, schema_version
            ),
        ));
    }

    let location = non_empty(&request.location).ok_or_else(|| {
        Error::validation_for_field(name, "location", "an Azure location is required")
    })?;
    let resource_group = non_empty(&request.resource_group).unwrap_or(name);

    let ssh_public_key_b64 = non_empty(&request.ssh_public_key).map(|key| STANDARD.encode(key));

    let identity = request
        .identity
        .as_ref()
        .map(|identity| resolve_identity(name, namespace, identity))
        .transpose()?;

    let bootstrap = match non_empty(&request.bootstrap_commands) {
        Some(document) => BootstrapCommands::parse(document).map_err(|e| in_cluster(e, name))?,
        None => BootstrapCommands::default(),
    };

    let ctx = CompositionContext {
        cluster_name: name.to_string(),
        namespace: namespace.to_string(),
        kubernetes_version,
        control_plane: MachineGroup {
            count: control_plane_count,
            machine_type: non_empty(&request.control_plane_machine_type)
                .unwrap_or(DEFAULT_MACHINE_TYPE)
                .to_string(),
        },
        workers: MachineGroup {
            count: worker_count,
            machine_type: non_empty(&request.worker_machine_type)
                .unwrap_or(DEFAULT_MACHINE_TYPE)
                .to_string(),
        },
        os_family,
        disk_mode,
        topology,
        external_cloud_provider: request.external_cloud_provider,
        ssh_public_key_b64,
        placement: AzurePlacement {
            resource_group: resource_group.to_string(),
            location: location.to_string(),
            subscription_id: non_empty(&request.subscription_id).map(str::to_string),
        },
        vnet_name: non_empty(&request.vnet_name).map(str::to_string),
        identity,
        bootstrap,
        schema_version,
        custom_template: request.custom_template.clone(),
    };

    if ctx.custom_template.is_none() {
        check_required_variables(catalog, &ctx)?;
    }

    debug!(
        cluster = %ctx.cluster_name,
        schema = %ctx.schema_version,
        kubernetes_version = %ctx.kubernetes_version,
        os = ?ctx.os_family,
        topology = ?ctx.topology,
        "Resolved composition context"
    );
    Ok(ctx)
}

/// Every variable a planned kind's skeleton needs must have a value
fn check_required_variables(catalog: &TemplateCatalog, ctx: &CompositionContext) -> Result<()> {
    let version = catalog.version(ctx.schema_version)?;
    let vars = ctx.variables();
    for planned in version.plan(ctx) {
        if let Some(missing) = catalog
            .required_variables(planned.kind)
            .into_iter()
            .find(|v| !vars.contains(*v))
        {
            return Err(Error::validation_for_field(
                &ctx.cluster_name,
                missing.name(),
                format!("{} is required by {} but was not supplied", missing, planned.kind),
            ));
        }
    }
    Ok(())
}

fn resolve_identity(
    cluster: &str,
    namespace: &str,
    identity: &IdentityRequest,
) -> Result<ClusterIdentity> {
    let required = |value: &Option<String>, field: &str| {
        non_empty(value).map(str::to_string).ok_or_else(|| {
            Error::validation_for_field(
                cluster,
                format!("identity.{}", field),
                "a service principal identity needs a tenant id and a client id",
            )
        })
    };
    let resolved = ClusterIdentity {
        name: non_empty(&identity.name)
            .unwrap_or(DEFAULT_IDENTITY_NAME)
            .to_string(),
        tenant_id: required(&identity.tenant_id, "tenantId")?,
        client_id: required(&identity.client_id, "clientId")?,
        secret_name: non_empty(&identity.secret_name)
            .unwrap_or(DEFAULT_IDENTITY_SECRET_NAME)
            .to_string(),
        secret_namespace: non_empty(&identity.secret_namespace)
            .unwrap_or(namespace)
            .to_string(),
    };
    validate_dns_label(&resolved.name, "identity.name", cluster)?;
    Ok(resolved)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn in_cluster(err: Error, cluster: &str) -> Error {
    match err {
        Error::Validation {
            cluster: c,
            message,
            field,
        } if c == capzctl_common::error::UNKNOWN_CONTEXT => Error::Validation {
            cluster: cluster.to_string(),
            message,
            field,
        },
        other => other,
    }
}

fn machine_count(cluster: &str, field: &str, value: Option<i64>, default: u32) -> Result<u32> {
    match value {
        None => Ok(default),
        Some(n) if n <= 0 => Err(Error::validation_for_field(
            cluster,
            field,
            format!("machine count must be positive, got {}", n),
        )),
        Some(n) => u32::try_from(n).map_err(|_| {
            Error::validation_for_field(cluster, field, format!("machine count {} is too large", n))
        }),
    }
}

/// Check an RFC 1123 DNS label
pub fn validate_dns_label(value: &str, field: &str, cluster: &str) -> Result<()> {
    let problem = if value.is_empty() {
        Some("must not be empty".to_string())
    } else if value.len() > MAX_DNS_LABEL_LENGTH {
        Some(format!("must be at most {} characters", MAX_DNS_LABEL_LENGTH))
    } else if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        Some("may only contain lowercase letters, digits and '-'".to_string())
    } else if value.starts_with('-') || value.ends_with('-') {
        Some("must start and end with a letter or digit".to_string())
    } else {
        None
    };
    match problem {
        Some(problem) => Err(Error::validation_for_field(
            if cluster.is_empty() {
                capzctl_common::error::UNKNOWN_CONTEXT
            } else {
                cluster
            },
            field,
            format!("{} '{}' {}", field, value, problem),
        )),
        None => Ok(()),
    }
}

/// Normalize `v?MAJOR.MINOR.PATCH` to the `v`-prefixed form
pub fn normalize_kubernetes_version(version: &str) -> Option<String> {
    let bare = version.strip_prefix('v').unwrap_or(version);
    let parts: Vec<&str> = bare.split('.').collect();
    let numeric = |p: &&str| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit());
    (parts.len() == 3 && parts.iter().all(numeric)).then(|| format!("v{}", bare))
}
