//! Common types for capzctl: errors, retry, and Kubernetes utilities

pub mod error;
pub mod kube_utils;
pub mod names;
pub mod retry;

pub use error::{Error, ErrorKind};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "capzctl";

/// Label carrying the owning cluster name on every composed manifest
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Label marking resources created by capzctl
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`]
pub const MANAGED_BY_VALUE: &str = "capzctl";

/// Default name of a just-in-time management cluster
pub const DEFAULT_MANAGEMENT_CLUSTER_NAME: &str = "capi-manager";

/// Namespaces whose controllers make up an initialized management cluster
pub const CONTROLLER_NAMESPACES: &[&str] = &[
    "capi-system",
    "capi-kubeadm-bootstrap-system",
    "capi-kubeadm-control-plane-system",
    "capz-system",
];
