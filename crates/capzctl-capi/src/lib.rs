//! Cluster API manifest composition for Azure
//!
//! The pipeline is pure and runs entirely offline:
//!
//! ```text
//! ClusterRequest --resolve--> CompositionContext --compose--> ManifestBundle
//! ```
//!
//! - [`resolver`] validates user intent and applies defaults
//! - [`catalog`] holds the versioned, data-driven templates
//! - [`composer`] renders the catalog and enforces reference closure
//! - [`custom`] renders user templates that replace the catalog
//! - [`addons`] lists what goes into a workload cluster once it is ready

pub mod addons;
pub mod bootstrap;
pub mod catalog;
pub mod composer;
pub mod constants;
pub mod context;
pub mod custom;
pub mod manifest;
pub mod resolver;

pub use addons::AddonPlan;
pub use bootstrap::BootstrapCommands;
pub use catalog::{ResourceKind, TemplateCatalog};
pub use composer::{compose, Composer};
pub use context::{
    AzurePlacement, ClusterIdentity, CompositionContext, DiskMode, MachineGroup, OsFamily,
    RoleSuffix, SchemaVersion, Topology,
};
pub use custom::{CustomTemplate, TemplateSyntax};
pub use manifest::{BundleEntry, CAPIManifest, ManifestBundle};
pub use resolver::{resolve, ClusterRequest, IdentityRequest};
