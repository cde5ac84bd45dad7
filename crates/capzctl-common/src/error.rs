//! Error types for capzctl
//!
//! Errors are structured with fields to aid debugging. Each variant maps onto
//! one failure category of the composition and lifecycle workflow so callers
//! can decide between reporting, retrying, and aborting without parsing
//! messages.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Failure category of an [`Error`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Malformed or inconsistent user input
    Validation,
    /// Template catalog defect or unresolvable composition
    Composition,
    /// External collaborator failed in a way worth retrying
    TransientCollaborator,
    /// External collaborator failed permanently
    FatalCollaborator,
    /// A wait exceeded its deadline
    Timeout,
    /// Operation not permitted in the current lifecycle phase
    Precondition,
    /// Operation interrupted by the caller
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Composition => "composition",
            ErrorKind::TransientCollaborator => "transient-collaborator",
            ErrorKind::FatalCollaborator => "fatal-collaborator",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Precondition => "precondition",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Main error type for capzctl operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Invalid user input, detected before any external call
    #[error("validation error for {cluster}: {message}")]
    Validation {
        /// Name of the cluster with invalid configuration
        cluster: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field (e.g., "controlPlaneMachineCount")
        field: Option<String>,
    },

    /// Manifest composition failed
    #[error("composition error{}: {message}", kind.as_deref().map(|k| format!(" [{}]", k)).unwrap_or_default())]
    Composition {
        /// Description of what failed
        message: String,
        /// The resource kind being composed (if known)
        kind: Option<String>,
    },

    /// External collaborator (management cluster, apply service, pivot) failed
    #[error("{collaborator} error for {cluster}: {message}")]
    Collaborator {
        /// Name of the cluster the call was made for
        cluster: String,
        /// Collaborator that failed (e.g., "kind", "clusterctl", "apply")
        collaborator: String,
        /// Description of what failed
        message: String,
        /// Whether this error is retryable
        retryable: bool,
    },

    /// A bounded wait ran out
    #[error("timed out after {}s for {cluster}: {message}", waited.as_secs())]
    Timeout {
        /// Name of the cluster being waited on
        cluster: String,
        /// How long the wait lasted
        waited: Duration,
        /// What was being waited for
        message: String,
    },

    /// Operation requested in a phase that does not allow it
    #[error("precondition not met for {cluster}: {message}")]
    Precondition {
        /// Name of the cluster
        cluster: String,
        /// Which precondition failed
        message: String,
    },

    /// Operation interrupted by the caller
    #[error("operation cancelled for {cluster} while {during}")]
    Cancelled {
        /// Name of the cluster
        cluster: String,
        /// What was in progress
        during: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },
}

impl Error {
    /// Create a validation error with the given message
    ///
    /// For simple validation errors without cluster context.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            cluster: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with cluster context
    pub fn validation_for(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            cluster: cluster.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with cluster context and field name
    pub fn validation_for_field(
        cluster: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            cluster: cluster.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a composition error with the given message
    pub fn composition(msg: impl Into<String>) -> Self {
        Self::Composition {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a composition error for a specific resource kind
    pub fn composition_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Composition {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a retryable collaborator error
    pub fn transient(
        cluster: impl Into<String>,
        collaborator: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Collaborator {
            cluster: cluster.into(),
            collaborator: collaborator.into(),
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a non-retryable collaborator error (e.g., missing binary, bad credentials)
    pub fn fatal(
        cluster: impl Into<String>,
        collaborator: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Collaborator {
            cluster: cluster.into(),
            collaborator: collaborator.into(),
            message: msg.into(),
            retryable: false,
        }
    }

    /// Create a timeout error
    pub fn timeout(cluster: impl Into<String>, waited: Duration, msg: impl Into<String>) -> Self {
        Self::Timeout {
            cluster: cluster.into(),
            waited,
            message: msg.into(),
        }
    }

    /// Create a precondition error
    pub fn precondition(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Precondition {
            cluster: cluster.into(),
            message: msg.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(cluster: impl Into<String>, during: impl Into<String>) -> Self {
        Self::Cancelled {
            cluster: cluster.into(),
            during: during.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Failure category of this error
    ///
    /// Kubernetes errors are classified by status: client errors other than
    /// request timeout and throttling are fatal, everything else (5xx,
    /// connection failures) is transient.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) if is_permanent_status(ae.code) => {
                    ErrorKind::FatalCollaborator
                }
                _ => ErrorKind::TransientCollaborator,
            },
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Composition { .. } => ErrorKind::Composition,
            Error::Collaborator { retryable, .. } => {
                if *retryable {
                    ErrorKind::TransientCollaborator
                } else {
                    ErrorKind::FatalCollaborator
                }
            }
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Precondition { .. } => ErrorKind::Precondition,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
            Error::Serialization { .. } => ErrorKind::Composition,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientCollaborator
    }

    /// Get the cluster name if this error is associated with a specific cluster
    pub fn cluster(&self) -> Option<&str> {
        match self {
            Error::Validation { cluster, .. }
            | Error::Collaborator { cluster, .. }
            | Error::Timeout { cluster, .. }
            | Error::Precondition { cluster, .. }
            | Error::Cancelled { cluster, .. } => Some(cluster),
            Error::Kube { .. } | Error::Composition { .. } | Error::Serialization { .. } => None,
        }
    }
}

fn is_permanent_status(code: u16) -> bool {
    (400..500).contains(&code) && code != 408 && code != 429
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // ==========================================================================
    // Story Tests: how failures are categorized for the caller
    // ==========================================================================

    /// Story: malformed input is rejected up front with the offending field
    #[test]
    fn story_validation_names_cluster_and_field() {
        let err = Error::validation_for_field(
            "demo",
            "controlPlaneMachineCount",
            "must be a positive integer",
        );
        assert!(err.to_string().contains("validation error for demo"));
        assert_eq!(err.cluster(), Some("demo"));
        assert_eq!(err.kind(), ErrorKind::Validation);
        match err {
            Error::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("controlPlaneMachineCount"))
            }
            _ => panic!("Expected Validation variant"),
        }
    }

    /// Story: composition errors point at the template kind that failed
    #[test]
    fn story_composition_error_carries_kind() {
        let err = Error::composition_for_kind("MachineDeployment", "unresolved reference");
        assert_eq!(
            err.to_string(),
            "composition error [MachineDeployment]: unresolved reference"
        );
        let err = Error::composition("duplicate manifest");
        assert_eq!(err.to_string(), "composition error: duplicate manifest");
        assert!(!err.is_retryable());
    }

    /// Story: collaborator failures split into transient and fatal
    #[test]
    fn story_collaborator_failures_drive_retry_decisions() {
        let err = Error::transient("demo", "apply", "connection refused");
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::TransientCollaborator);
        assert!(err.to_string().contains("apply error for demo"));

        let err = Error::fatal("demo", "clusterctl", "binary not found");
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::FatalCollaborator);
    }

    #[test]
    fn timeout_reports_waited_seconds() {
        let err = Error::timeout("demo", Duration::from_secs(1200), "control plane not ready");
        assert_eq!(
            err.to_string(),
            "timed out after 1200s for demo: control plane not ready"
        );
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(!err.is_retryable());
    }

    #[rstest]
    #[case::bad_request(400, false)]
    #[case::unauthorized(401, false)]
    #[case::forbidden(403, false)]
    #[case::not_found(404, false)]
    #[case::request_timeout(408, true)]
    #[case::conflict(409, false)]
    #[case::throttled(429, true)]
    #[case::server_error(500, true)]
    #[case::unavailable(503, true)]
    fn kube_api_errors_classified_by_status(#[case] code: u16, #[case] retryable: bool) {
        let err: Error = kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Test".to_string(),
            code,
        })
        .into();
        assert_eq!(err.is_retryable(), retryable);
        assert_eq!(err.cluster(), None);
    }

    #[rstest]
    #[case::precondition(Error::precondition("demo", "not ready"), ErrorKind::Precondition)]
    #[case::cancelled(Error::cancelled("demo", "waiting"), ErrorKind::Cancelled)]
    #[case::serialization(Error::serialization("bad yaml"), ErrorKind::Composition)]
    fn non_retryable_categories(#[case] err: Error, #[case] kind: ErrorKind) {
        assert_eq!(err.kind(), kind);
        assert!(!err.is_retryable());
    }

    #[test]
    fn error_kind_display_is_kebab_case() {
        assert_eq!(
            ErrorKind::TransientCollaborator.to_string(),
            "transient-collaborator"
        );
        assert_eq!(ErrorKind::Validation.to_string(), "validation");
    }
}
