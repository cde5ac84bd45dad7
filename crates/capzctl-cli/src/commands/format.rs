//! Rendering of command results as text tables or JSON

use serde::Serialize;

use capzctl_common::ErrorKind;
use capzctl_lifecycle::{ClusterStatus, LifecycleRecord, Outcome, WorkloadCluster};

use crate::{CommandStatus, OutputFormat, Result};

/// Render rows as a column-aligned table with headers.
pub fn format_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let num_cols = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(num_cols) {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let mut out = vec![table_line(headers.iter().copied(), &widths)];
    for row in rows {
        out.push(table_line(row.iter().take(num_cols).map(String::as_str), &widths));
    }
    out.join("\n")
}

fn table_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(c, width)| format!("{:<width$}", c, width = *width))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

/// Exit status of a lifecycle outcome
pub fn outcome_status(outcome: &Outcome) -> CommandStatus {
    match outcome {
        Outcome::Succeeded(_) => CommandStatus::Success,
        Outcome::Partial { .. } => CommandStatus::Partial,
        Outcome::Failed { .. } => CommandStatus::Failed,
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorReport {
    kind: ErrorKind,
    message: String,
    retryable: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutcomeReport<'a> {
    status: &'static str,
    #[serde(flatten)]
    record: &'a LifecycleRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorReport>,
}

fn status_word(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Succeeded(_) => "succeeded",
        Outcome::Partial { .. } => "partial",
        Outcome::Failed { .. } => "failed",
    }
}

fn management_name(record: &LifecycleRecord) -> String {
    record
        .management
        .as_ref()
        .map(|m| m.name.clone())
        .unwrap_or_else(|| "-".to_string())
}

/// Render the result of create, pivot or delete
pub fn render_outcome(outcome: &Outcome, format: OutputFormat) -> Result<String> {
    let record = outcome.record();
    match format {
        OutputFormat::Json => {
            let report = OutcomeReport {
                status: status_word(outcome),
                record,
                error: outcome.error().map(|e| ErrorReport {
                    kind: e.kind(),
                    message: e.to_string(),
                    retryable: e.is_retryable(),
                }),
            };
            Ok(serde_json::to_string_pretty(&report)?)
        }
        OutputFormat::Text => {
            let mut out = vec![format_table(
                &["CLUSTER", "PHASE", "MANAGEMENT"],
                &[vec![
                    record.cluster.to_string(),
                    record.phase.to_string(),
                    management_name(record),
                ]],
            )];
            let history: Vec<String> = record.history.iter().map(|p| p.to_string()).collect();
            out.push(format!("history: {}", history.join(" -> ")));
            if let Some(path) = record.workload.as_ref().and_then(|w| w.kubeconfig.as_ref()) {
                out.push(format!("kubeconfig: {}", path.display()));
            }
            match outcome {
                Outcome::Succeeded(_) => {}
                Outcome::Partial { error, .. } => {
                    out.push(format!("completed with errors ({}): {}", error.kind(), error));
                }
                Outcome::Failed { error, .. } => {
                    let at = record
                        .failed_at
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    out.push(format!("failed at {} ({}): {}", at, error.kind(), error));
                    if error.is_retryable() {
                        out.push("the error is transient; re-running the command resumes from here".to_string());
                    }
                }
            }
            Ok(out.join("\n"))
        }
    }
}

/// Render the observed state of one cluster
pub fn render_status(status: &ClusterStatus, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(status)?),
        OutputFormat::Text => {
            let yes_no = |b: bool| if b { "yes" } else { "no" }.to_string();
            Ok(format_table(
                &["CLUSTER", "PHASE", "EXISTS", "READY", "PIVOTED", "MANAGEMENT"],
                &[vec![
                    status.cluster.to_string(),
                    status.phase.to_string(),
                    yes_no(status.observed.cluster_exists),
                    yes_no(status.observed.control_plane_ready),
                    yes_no(status.observed.pivoted),
                    status.management.name.clone(),
                ]],
            ))
        }
    }
}

/// Render the clusters found on a management cluster
pub fn render_clusters(clusters: &[WorkloadCluster], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(clusters)?),
        OutputFormat::Text => {
            if clusters.is_empty() {
                return Ok("No clusters found".to_string());
            }
            let rows: Vec<Vec<String>> = clusters
                .iter()
                .map(|c| vec![c.namespace.clone(), c.name.clone()])
                .collect();
            Ok(format_table(&["NAMESPACE", "NAME"], &rows))
        }
    }
}
