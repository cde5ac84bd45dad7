//! Lifecycle phases, records and outcomes
//!
//! The current phase of a cluster is never remembered between runs. It is
//! re-derived from what the management cluster reports ([`derive_phase`]),
//! which is what makes a repeated `create` resume instead of restart.

use std::fmt;
use std::path::PathBuf;

use capzctl_common::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Phase of a cluster's lifecycle
///
/// Creation phases are declared in the order they are reached, so `Ord`
/// compares progress along the creation path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LifecyclePhase {
    /// Nothing has happened yet
    Start,
    /// A management cluster is known and reachable
    ManagementClusterResolved,
    /// Cluster API controllers are running in the management cluster
    ControllersInstalled,
    /// The manifest bundle has been composed
    ManifestsComposed,
    /// The manifest bundle has been submitted
    ManifestsApplied,
    /// The workload control plane reports ready
    ControlPlaneReady,
    /// Cluster API resources moved into the workload cluster
    Pivoted,
    /// Creation finished
    Done,
    /// A transition failed; see the record's `failed_at`
    Failed,
    /// The Cluster object is being removed
    Deleting,
    /// The Cluster object is gone
    Deleted,
}

impl LifecyclePhase {
    /// True for phases no further transition leaves
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LifecyclePhase::Done | LifecyclePhase::Failed | LifecyclePhase::Deleted
        )
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecyclePhase::Start => "Start",
            LifecyclePhase::ManagementClusterResolved => "ManagementClusterResolved",
            LifecyclePhase::ControllersInstalled => "ControllersInstalled",
            LifecyclePhase::ManifestsComposed => "ManifestsComposed",
            LifecyclePhase::ManifestsApplied => "ManifestsApplied",
            LifecyclePhase::ControlPlaneReady => "ControlPlaneReady",
            LifecyclePhase::Pivoted => "Pivoted",
            LifecyclePhase::Done => "Done",
            LifecyclePhase::Failed => "Failed",
            LifecyclePhase::Deleting => "Deleting",
            LifecyclePhase::Deleted => "Deleted",
        };
        f.write_str(s)
    }
}

/// A workload cluster as addressed in the management cluster
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkloadCluster {
    /// Namespace holding the Cluster object
    pub namespace: String,
    /// Cluster name
    pub name: String,
}

impl WorkloadCluster {
    /// Address a cluster by namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkloadCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// How a management cluster came to be used
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HandleOrigin {
    /// The cluster existed before this tool touched it
    Existing,
    /// The cluster was provisioned just in time by this tool
    JustInTime,
}

/// Connection details of a cluster the tool talks to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterHandle {
    /// Cluster name
    pub name: String,
    /// Resource group the cluster is tracked under
    pub resource_group: String,
    /// Kubeconfig file; `None` uses the default loading chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,
    /// Kubeconfig context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Whether the tool created this cluster
    pub origin: HandleOrigin,
}

impl ClusterHandle {
    /// True when the tool provisioned this cluster and may tear it down
    pub fn is_just_in_time(&self) -> bool {
        self.origin == HandleOrigin::JustInTime
    }
}

/// What the management cluster reports about a workload cluster
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedCluster {
    /// Cluster API CRDs and controllers are present
    pub controllers_installed: bool,
    /// The Cluster object exists
    pub cluster_exists: bool,
    /// The Cluster object carries a deletion timestamp
    pub deleting: bool,
    /// The control plane reports ready
    pub control_plane_ready: bool,
    /// The cluster's resources were moved to another management cluster
    pub pivoted: bool,
}

/// Map an observation to the phase it proves was reached
///
/// Total over every combination of flags. Pivot is checked first because a
/// pivoted cluster's resources no longer live in the observed management
/// cluster, so the other flags describe only what was left behind.
pub fn derive_phase(observed: &ObservedCluster) -> LifecyclePhase {
    if !observed.controllers_installed {
        LifecyclePhase::ManagementClusterResolved
    } else if observed.pivoted {
        LifecyclePhase::Pivoted
    } else if observed.deleting {
        LifecyclePhase::Deleting
    } else if !observed.cluster_exists {
        LifecyclePhase::ControllersInstalled
    } else if !observed.control_plane_ready {
        LifecyclePhase::ManifestsApplied
    } else {
        LifecyclePhase::ControlPlaneReady
    }
}

/// One point in a control-plane status stream
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    /// The control plane is initialized (API server reachable)
    pub initialized: bool,
    /// The control plane is ready
    pub ready: bool,
    /// Ready control-plane replicas
    pub ready_replicas: i64,
    /// Desired control-plane replicas
    pub replicas: i64,
    /// Latest condition message, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Node readiness of a workload cluster
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeReadiness {
    /// Nodes with a `Ready=True` condition
    pub ready: usize,
    /// Nodes registered
    pub total: usize,
}

impl NodeReadiness {
    /// At least one node is registered and every node is ready
    pub fn all_ready(&self) -> bool {
        self.total > 0 && self.ready == self.total
    }
}

/// Error attached to a lifecycle record
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedError {
    /// Taxonomy category
    pub kind: ErrorKind,
    /// Error text, verbatim
    pub message: String,
}

impl From<&Error> for RecordedError {
    fn from(e: &Error) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Progress of one lifecycle invocation
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleRecord {
    /// Workload cluster the invocation is about
    pub cluster: WorkloadCluster,
    /// Current phase
    pub phase: LifecyclePhase,
    /// Phase whose transition failed, when `phase` is `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<LifecyclePhase>,
    /// Management cluster in use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management: Option<ClusterHandle>,
    /// Workload cluster connection, once its kubeconfig is available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workload: Option<ClusterHandle>,
    /// Last error seen, including ones that only made the outcome partial
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<RecordedError>,
    /// Phases in the order they were reached
    pub history: Vec<LifecyclePhase>,
}

impl LifecycleRecord {
    /// A record at `Start`
    pub fn new(cluster: WorkloadCluster) -> Self {
        Self {
            cluster,
            phase: LifecyclePhase::Start,
            failed_at: None,
            management: None,
            workload: None,
            last_error: None,
            history: vec![LifecyclePhase::Start],
        }
    }

    /// Move to `phase`
    pub fn advance(&mut self, phase: LifecyclePhase) {
        info!(cluster = %self.cluster, from = %self.phase, to = %phase, "Lifecycle transition");
        self.phase = phase;
        self.history.push(phase);
    }

    /// Attach an error without changing phase
    pub fn note_error(&mut self, error: &Error) {
        self.last_error = Some(RecordedError::from(error));
    }

    /// Mark the transition into `at` as failed
    pub fn fail(&mut self, at: LifecyclePhase, error: &Error) {
        error!(cluster = %self.cluster, phase = %at, error = %error, "Lifecycle transition failed");
        self.phase = LifecyclePhase::Failed;
        self.failed_at = Some(at);
        self.history.push(LifecyclePhase::Failed);
        self.note_error(error);
    }

    /// True when `phase` was reached during this invocation
    pub fn reached(&self, phase: LifecyclePhase) -> bool {
        self.history.contains(&phase)
    }
}

/// Result of a lifecycle invocation
#[derive(Debug)]
pub enum Outcome {
    /// Everything requested happened
    Succeeded(LifecycleRecord),
    /// The main goal was reached but an optional step failed
    Partial {
        /// Final record
        record: LifecycleRecord,
        /// The optional step's error
        error: Error,
    },
    /// A required transition failed
    Failed {
        /// Final record, with `failed_at` set
        record: LifecycleRecord,
        /// The error that stopped the run
        error: Error,
    },
}

impl Outcome {
    /// Failed outcome after recording the error against `at`
    pub fn failed(mut record: LifecycleRecord, at: LifecyclePhase, error: Error) -> Self {
        record.fail(at, &error);
        Outcome::Failed { record, error }
    }

    /// Partial outcome after recording the error
    pub fn partial(mut record: LifecycleRecord, error: Error) -> Self {
        record.note_error(&error);
        Outcome::Partial { record, error }
    }

    /// Final record
    pub fn record(&self) -> &LifecycleRecord {
        match self {
            Outcome::Succeeded(record)
            | Outcome::Partial { record, .. }
            | Outcome::Failed { record, .. } => record,
        }
    }

    /// Error behind a partial or failed outcome
    pub fn error(&self) -> Option<&Error> {
        match self {
            Outcome::Succeeded(_) => None,
            Outcome::Partial { error, .. } | Outcome::Failed { error, .. } => Some(error),
        }
    }

    /// True only for `Succeeded`
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn observed(installed: bool, exists: bool, deleting: bool, ready: bool, pivoted: bool) -> ObservedCluster {
        ObservedCluster {
            controllers_installed: installed,
            cluster_exists: exists,
            deleting,
            control_plane_ready: ready,
            pivoted,
        }
    }

    #[rstest]
    #[case::empty_management(observed(false, false, false, false, false), LifecyclePhase::ManagementClusterResolved)]
    #[case::controllers_only(observed(true, false, false, false, false), LifecyclePhase::ControllersInstalled)]
    #[case::applied(observed(true, true, false, false, false), LifecyclePhase::ManifestsApplied)]
    #[case::ready(observed(true, true, false, true, false), LifecyclePhase::ControlPlaneReady)]
    #[case::deleting(observed(true, true, true, true, false), LifecyclePhase::Deleting)]
    #[case::pivoted(observed(true, false, false, false, true), LifecyclePhase::Pivoted)]
    #[case::pivoted_wins_over_leftovers(observed(true, true, true, true, true), LifecyclePhase::Pivoted)]
    #[case::controllers_missing_wins(observed(false, true, false, true, false), LifecyclePhase::ManagementClusterResolved)]
    fn derives_phase(#[case] observed: ObservedCluster, #[case] expected: LifecyclePhase) {
        assert_eq!(derive_phase(&observed), expected);
    }

    #[test]
    fn derivation_is_total() {
        for bits in 0u8..32 {
            let o = observed(bits & 1 != 0, bits & 2 != 0, bits & 4 != 0, bits & 8 != 0, bits & 16 != 0);
            let phase = derive_phase(&o);
            assert!(!matches!(
                phase,
                LifecyclePhase::Start | LifecyclePhase::Failed | LifecyclePhase::Done
            ));
        }
    }

    #[test]
    fn creation_phases_are_ordered() {
        assert!(LifecyclePhase::Start < LifecyclePhase::ManagementClusterResolved);
        assert!(LifecyclePhase::ManifestsApplied < LifecyclePhase::ControlPlaneReady);
        assert!(LifecyclePhase::ControlPlaneReady < LifecyclePhase::Pivoted);
    }

    #[rstest]
    #[case::no_nodes(0, 0, false)]
    #[case::some_not_ready(1, 3, false)]
    #[case::all_ready(3, 3, true)]
    fn nodes_ready_only_when_registered_and_ready(
        #[case] ready: usize,
        #[case] total: usize,
        #[case] expected: bool,
    ) {
        assert_eq!(NodeReadiness { ready, total }.all_ready(), expected);
    }

    #[test]
    fn failing_records_phase_and_error() {
        let mut record = LifecycleRecord::new(WorkloadCluster::new("default", "demo"));
        record.advance(LifecyclePhase::ManagementClusterResolved);
        let err = Error::fatal("demo", "kind", "docker is not running");
        record.fail(LifecyclePhase::ControllersInstalled, &err);

        assert_eq!(record.phase, LifecyclePhase::Failed);
        assert_eq!(record.failed_at, Some(LifecyclePhase::ControllersInstalled));
        let recorded = record.last_error.as_ref().unwrap();
        assert_eq!(recorded.kind, ErrorKind::FatalCollaborator);
        assert_eq!(recorded.message, err.to_string());
        assert_eq!(
            record.history,
            vec![
                LifecyclePhase::Start,
                LifecyclePhase::ManagementClusterResolved,
                LifecyclePhase::Failed
            ]
        );
    }

    #[test]
    fn record_serializes_for_reports() {
        let mut record = LifecycleRecord::new(WorkloadCluster::new("default", "demo"));
        record.advance(LifecyclePhase::ManagementClusterResolved);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["phase"], "ManagementClusterResolved");
        assert_eq!(json["cluster"]["name"], "demo");
        assert!(json.get("failedAt").is_none());
    }

    #[test]
    fn outcome_accessors() {
        let record = LifecycleRecord::new(WorkloadCluster::new("default", "demo"));
        let outcome = Outcome::partial(record, Error::transient("demo", "clusterctl", "connection refused"));
        assert!(!outcome.is_success());
        assert!(outcome.error().is_some());
        assert_eq!(
            outcome.record().last_error.as_ref().unwrap().kind,
            ErrorKind::TransientCollaborator
        );
    }
}
