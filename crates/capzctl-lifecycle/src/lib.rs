//! Lifecycle orchestration for Cluster API clusters on Azure
//!
//! ```text
//! Start -> ManagementClusterResolved -> ControllersInstalled -> ManifestsComposed
//!       -> ManifestsApplied -> ControlPlaneReady -> [Pivoted] -> Done
//! Deleting -> Deleted
//! ```
//!
//! Between `ControlPlaneReady` and the pivot, the CNI add-ons of the request
//! are installed into the workload cluster and its nodes awaited.
//!
//! The [`Orchestrator`] drives these transitions through the collaborator
//! traits in [`collaborators`]; [`adapters`] provides the kind, clusterctl,
//! kubectl and kube-rs implementations.

pub mod adapters;
pub mod collaborators;
pub mod orchestrator;
mod phases;
pub mod state;

pub use collaborators::{ClusterApi, ManagementClusterProvider, PivotService, WorkloadAddons};
pub use orchestrator::{
    ClusterStatus, CreateRequest, DeleteRequest, ManagementTarget, Orchestrator,
    OrchestratorConfig,
};
pub use state::{
    derive_phase, ClusterHandle, HandleOrigin, LifecyclePhase, LifecycleRecord, NodeReadiness,
    ObservedCluster, Outcome, RecordedError, StatusSnapshot, WorkloadCluster,
};
