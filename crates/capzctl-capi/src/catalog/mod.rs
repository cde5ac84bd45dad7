//! Template catalog
//!
//! The catalog is data: for every resource kind it holds a JSON skeleton
//! with `${VAR}` placeholders, an ordered list of conditional fragments, the
//! cross-reference slots the kind carries, and how its name is formed. The
//! composer interprets entries with one generic routine; nothing in the
//! composer knows what a particular kind looks like.
//!
//! The catalog is versioned by Cluster API schema version. Versions share
//! skeletons and differ in API groups and the pinned Kubernetes version.

mod placeholder;
pub(crate) mod templates;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use capzctl_common::{Error, Result};
use serde_json::Value;

use crate::context::{
    CompositionContext, DiskMode, OsFamily, RoleSuffix, SchemaVersion, Topology, Variable,
};

pub use placeholder::{placeholder_names, referenced_variables, substitute};

/// Kinds of resource the catalog can render
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    /// Cluster API Cluster
    Cluster,
    /// CAPZ infrastructure cluster
    AzureCluster,
    /// CAPZ service principal identity
    AzureClusterIdentity,
    /// Kubeadm control plane
    KubeadmControlPlane,
    /// CAPZ machine template (control plane and MachineDeployment workers)
    AzureMachineTemplate,
    /// MachineDeployment worker group
    MachineDeployment,
    /// Kubeadm bootstrap config template for MachineDeployment workers
    KubeadmConfigTemplate,
    /// MachinePool worker group
    MachinePool,
    /// CAPZ VM scale set backing a MachinePool
    AzureMachinePool,
    /// Kubeadm bootstrap config for MachinePool workers
    KubeadmConfig,
}

impl ResourceKind {
    /// Kubernetes kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cluster => "Cluster",
            ResourceKind::AzureCluster => "AzureCluster",
            ResourceKind::AzureClusterIdentity => "AzureClusterIdentity",
            ResourceKind::KubeadmControlPlane => "KubeadmControlPlane",
            ResourceKind::AzureMachineTemplate => "AzureMachineTemplate",
            ResourceKind::MachineDeployment => "MachineDeployment",
            ResourceKind::KubeadmConfigTemplate => "KubeadmConfigTemplate",
            ResourceKind::MachinePool => "MachinePool",
            ResourceKind::AzureMachinePool => "AzureMachinePool",
            ResourceKind::KubeadmConfig => "KubeadmConfig",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order in which fragments apply. Later stages override earlier ones
/// where they write the same key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FragmentStage {
    /// Branches on the worker OS family
    OsFamily,
    /// Branches on the disk mode
    DiskMode,
    /// Branches on the role suffix
    RoleSuffix,
    /// Optional lists, omitted when empty
    ListInjection,
    /// Optional scalars with a literal default
    ScalarInjection,
}

/// Typed predicate deciding whether a fragment, reference or layout slot applies
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Guard {
    /// Always applies
    Always,
    /// Worker OS family matches
    Os(OsFamily),
    /// Disk mode matches
    Disk(DiskMode),
    /// Rendering for the control-plane role
    ControlPlaneRole,
    /// Rendering for any worker role
    WorkerRole,
    /// Rendering for a Windows worker role
    WindowsWorkerRole,
    /// An identity was supplied
    HasIdentity,
}

impl Guard {
    /// Evaluate against a context and the role being rendered
    pub fn holds(&self, ctx: &CompositionContext, role: Option<RoleSuffix>) -> bool {
        match self {
            Guard::Always => true,
            Guard::Os(os) => ctx.os_family == *os,
            Guard::Disk(mode) => ctx.disk_mode == *mode,
            Guard::ControlPlaneRole => role.is_some_and(|r| r.is_control_plane()),
            Guard::WorkerRole => role.is_some_and(|r| r.is_worker()),
            Guard::WindowsWorkerRole => role.is_some_and(|r| r.is_windows_worker()),
            Guard::HasIdentity => ctx.identity.is_some(),
        }
    }
}

/// Which bootstrap command list a fragment injects
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandList {
    /// Commands before kubeadm
    Pre,
    /// Commands after kubeadm
    Post,
}

/// What a fragment contributes
#[derive(Clone, Copy, Debug)]
pub enum FragmentBody {
    /// A skeleton deep-merged at the fragment path
    Merge(fn() -> Value),
    /// A bootstrap command list set at the path, omitted entirely when empty
    Commands(CommandList),
    /// A variable's value, or the literal default when the context has none
    Scalar {
        /// Variable supplying the value
        variable: Variable,
        /// Text used when the variable is absent (may contain placeholders)
        default: &'static str,
    },
}

/// A conditional piece of a template
#[derive(Clone, Copy, Debug)]
pub struct Fragment {
    /// When the fragment applies relative to others
    pub stage: FragmentStage,
    /// Whether it applies
    pub guard: Guard,
    /// Document path the body is written to
    pub path: &'static [&'static str],
    /// The contribution
    pub body: FragmentBody,
}

/// Which planned entry a reference points at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefScope {
    /// The cluster-scoped entry of the target kind
    Cluster,
    /// The control-plane entry of the target kind
    ControlPlane,
    /// The entry of the target kind with the same role as the referrer
    SameRole,
}

/// A cross-reference slot: the composer writes `{apiVersion, kind, name}` of
/// the resolved target at `path`
#[derive(Clone, Copy, Debug)]
pub struct RefSlot {
    /// Document path of the reference object
    pub path: &'static [&'static str],
    /// Kind of the referenced manifest
    pub kind: ResourceKind,
    /// How the target entry is selected
    pub scope: RefScope,
    /// Whether the reference is rendered
    pub guard: Guard,
}

/// How a manifest's name is formed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameRule {
    /// The cluster name
    ClusterName,
    /// `<cluster>-<role suffix>`
    RoleSuffixed,
    /// The value of a context variable
    FromVariable(Variable),
}

/// Catalog entry for one resource kind
#[derive(Clone, Debug)]
pub struct TemplateEntry {
    /// Kind rendered by this entry
    pub kind: ResourceKind,
    /// Naming rule
    pub name: NameRule,
    /// Labels beyond the standard cluster labels
    pub labels: &'static [(&'static str, &'static str)],
    /// Spec skeleton with placeholders
    pub skeleton: fn() -> Value,
    /// Conditional fragments, applied in stage order
    pub fragments: Vec<Fragment>,
    /// Cross-reference slots
    pub refs: Vec<RefSlot>,
}

impl TemplateEntry {
    /// Fragments sorted by stage; declaration order breaks ties
    pub fn ordered_fragments(&self) -> Vec<&Fragment> {
        let mut fragments: Vec<&Fragment> = self.fragments.iter().collect();
        fragments.sort_by_key(|f| f.stage);
        fragments
    }

    /// Context variables the skeleton always needs
    pub fn required_variables(&self) -> BTreeSet<Variable> {
        referenced_variables(&(self.skeleton)())
            .unwrap_or_default()
            .into_iter()
            .filter(|v| !v.is_entry_scoped())
            .collect()
    }
}

/// Which machines a layout slot belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Cluster-wide, no role
    Cluster,
    /// Control-plane role
    ControlPlane,
    /// Worker role, only for the given topology
    Workers(Topology),
}

/// One position of the bundle layout
#[derive(Clone, Copy, Debug)]
pub struct LayoutSlot {
    /// Bundle key of the composed manifest
    pub key: &'static str,
    /// Kind rendered into this slot
    pub kind: ResourceKind,
    /// Role the slot renders for
    pub placement: Placement,
    /// Whether the slot is used
    pub include: Guard,
}

/// A manifest the composer will render
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedEntry {
    /// Bundle key
    pub key: String,
    /// Kind to render
    pub kind: ResourceKind,
    /// Role suffix, `None` for cluster-wide manifests
    pub role: Option<RoleSuffix>,
}

/// Templates for one schema version
#[derive(Clone, Debug)]
pub struct CatalogVersion {
    /// Schema version
    pub schema: SchemaVersion,
    /// Kubernetes version used when the user gives none
    pub default_kubernetes_version: &'static str,
    /// apiVersion per kind
    pub api_versions: BTreeMap<ResourceKind, &'static str>,
    /// Ordered bundle layout
    pub layout: Vec<LayoutSlot>,
    /// Entries per kind
    pub entries: BTreeMap<ResourceKind, TemplateEntry>,
    /// Unsupported OS / topology pairs
    pub unsupported: Vec<(OsFamily, Topology)>,
}

impl CatalogVersion {
    /// apiVersion for a kind
    pub fn api_version(&self, kind: ResourceKind) -> Result<&'static str> {
        self.api_versions.get(&kind).copied().ok_or_else(|| {
            Error::composition_for_kind(
                kind.as_str(),
                format!("no apiVersion for schema {}", self.schema),
            )
        })
    }

    /// Entry for a kind
    pub fn entry(&self, kind: ResourceKind) -> Result<&TemplateEntry> {
        self.entries.get(&kind).ok_or_else(|| {
            Error::composition_for_kind(
                kind.as_str(),
                format!("no template in schema {}", self.schema),
            )
        })
    }

    /// True when the OS family and topology can be combined
    pub fn supports(&self, os: OsFamily, topology: Topology) -> bool {
        !self.unsupported.contains(&(os, topology))
    }

    /// Manifests to render for a context, in bundle order
    pub fn plan(&self, ctx: &CompositionContext) -> Vec<PlannedEntry> {
        self.layout
            .iter()
            .filter_map(|slot| {
                let role = match slot.placement {
                    Placement::Cluster => None,
                    Placement::ControlPlane => Some(RoleSuffix::CONTROL_PLANE),
                    Placement::Workers(topology) if topology == ctx.topology => {
                        Some(ctx.worker_role())
                    }
                    Placement::Workers(_) => return None,
                };
                slot.include.holds(ctx, role).then(|| PlannedEntry {
                    key: slot.key.to_string(),
                    kind: slot.kind,
                    role,
                })
            })
            .collect()
    }
}

/// All schema versions the catalog can render
#[derive(Clone, Debug)]
pub struct TemplateCatalog {
    versions: BTreeMap<SchemaVersion, CatalogVersion>,
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateCatalog {
    /// The built-in Azure catalog
    pub fn builtin() -> Self {
        let versions = [templates::v1alpha4(), templates::v1beta1()]
            .into_iter()
            .map(|v| (v.schema, v))
            .collect();
        Self { versions }
    }

    /// Build a catalog from explicit versions
    pub fn from_versions(versions: impl IntoIterator<Item = CatalogVersion>) -> Self {
        Self {
            versions: versions.into_iter().map(|v| (v.schema, v)).collect(),
        }
    }

    /// Newest schema version held
    pub fn newest(&self) -> Option<SchemaVersion> {
        self.versions.keys().next_back().copied()
    }

    /// Schema versions held, oldest first
    pub fn versions(&self) -> impl Iterator<Item = SchemaVersion> + '_ {
        self.versions.keys().copied()
    }

    /// Templates for a schema version
    pub fn version(&self, schema: SchemaVersion) -> Result<&CatalogVersion> {
        self.versions.get(&schema).ok_or_else(|| {
            Error::validation_for_field(
                capzctl_common::error::UNKNOWN_CONTEXT,
                "schemaVersion",
                format!("schema version {} is not in the catalog", schema),
            )
        })
    }

    /// Entry for a kind at a schema version
    pub fn template_for(&self, kind: ResourceKind, schema: SchemaVersion) -> Result<&TemplateEntry> {
        self.version(schema)?.entry(kind)
    }

    /// Context variables a kind always needs, across every version held
    pub fn required_variables(&self, kind: ResourceKind) -> BTreeSet<Variable> {
        self.versions
            .values()
            .filter_map(|v| v.entries.get(&kind))
            .flat_map(TemplateEntry::required_variables)
            .collect()
    }

    /// True when the newest version supports the OS family and topology
    pub fn supports(&self, os: OsFamily, topology: Topology) -> bool {
        self.newest()
            .and_then(|v| self.versions.get(&v))
            .is_some_and(|v| v.supports(os, topology))
    }
}
