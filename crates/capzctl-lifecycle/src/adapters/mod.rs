//! Production implementations of the collaborator traits
//!
//! - [`KindManagementProvider`]: management clusters via `kind` + `clusterctl init`
//! - [`KubeClusterApi`]: apply / observe / delete through kube-rs
//! - [`ClusterctlPivot`]: `clusterctl move`
//! - [`KubectlAddons`]: CNI manifests and node readiness in the workload cluster

mod addons;
mod clusterctl;
mod command;
mod kind;
mod kube_api;

pub use addons::KubectlAddons;
pub use clusterctl::ClusterctlPivot;
pub use command::{classify_failure, ExternalCommand};
pub use kind::KindManagementProvider;
pub use kube_api::KubeClusterApi;

use crate::state::ClusterHandle;

/// `--kubeconfig` / `--kubeconfig-context` arguments selecting `handle`
pub(crate) fn kubeconfig_args(handle: &ClusterHandle, context_flag: &str) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(path) = &handle.kubeconfig {
        args.push("--kubeconfig".to_string());
        args.push(path.display().to_string());
    }
    if let Some(context) = &handle.context {
        args.push(context_flag.to_string());
        args.push(context.clone());
    }
    args
}
