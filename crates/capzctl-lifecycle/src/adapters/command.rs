//! Running external CLIs (kind, clusterctl, kubectl) and classifying their failures

use tokio::process::Command;
use tracing::debug;

use capzctl_common::{Error, Result};

/// stderr fragments that mark a failure as worth retrying
const TRANSIENT_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "i/o timeout",
    "timed out",
    "tls handshake timeout",
    "serviceunavailable",
    "service unavailable",
    "toomanyrequests",
    "too many requests",
    "etcdserver: leader changed",
    "the object has been modified",
];

/// Classify a failed command by its error output
pub fn classify_failure(cluster: &str, collaborator: &str, stderr: &str) -> Error {
    let lower = stderr.to_lowercase();
    let message = stderr.trim().to_string();
    if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
        Error::transient(cluster, collaborator, message)
    } else {
        Error::fatal(cluster, collaborator, message)
    }
}

/// An external command about to run
pub struct ExternalCommand<'a> {
    program: &'a str,
    args: Vec<String>,
    env: Vec<(&'a str, String)>,
    cluster: &'a str,
}

impl<'a> ExternalCommand<'a> {
    /// Command for `program`; failures are attributed to `cluster`
    pub fn new(program: &'a str, cluster: &'a str) -> Self {
        Self {
            program,
            args: Vec::new(),
            env: Vec::new(),
            cluster,
        }
    }

    /// Append arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable
    pub fn env(mut self, key: &'a str, value: impl Into<String>) -> Self {
        self.env.push((key, value.into()));
        self
    }

    /// Run to completion and return stdout
    pub async fn run(self) -> Result<String> {
        debug!(program = %self.program, args = ?self.args, "running command");
        let output = Command::new(self.program)
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (*k, v.as_str())))
            .output()
            .await
            .map_err(|e| {
                Error::fatal(
                    self.cluster,
                    self.program,
                    format!("failed to run {}: {}", self.program, e),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() { stdout } else { stderr };
            return Err(classify_failure(self.cluster, self.program, &detail));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
