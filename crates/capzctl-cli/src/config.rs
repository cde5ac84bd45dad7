//! capzctl CLI configuration stored at `~/.capzctl/config.json`.
//!
//! Holds defaults that would otherwise be repeated on every invocation:
//! which management cluster to use and where new clusters go.
//!
//! The management kubeconfig resolution chain (highest priority first):
//! 1. Explicit `--kubeconfig` flag
//! 2. `CAPZCTL_KUBECONFIG` environment variable
//! 3. `managementKubeconfig` from the config file
//! 4. Fall back to kube default (`KUBECONFIG` env / `~/.kube/config`)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const CONFIG_DIR_NAME: &str = ".capzctl";
const CONFIG_FILE_NAME: &str = "config.json";
const CAPZCTL_KUBECONFIG_ENV: &str = "CAPZCTL_KUBECONFIG";

/// Persistent CLI configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CapzctlConfig {
    /// Management cluster name.
    pub management_cluster: Option<String>,
    /// Resource group the management cluster is tracked under.
    pub management_resource_group: Option<String>,
    /// Kubeconfig of the management cluster.
    pub management_kubeconfig: Option<String>,
    /// Kubeconfig context of the management cluster.
    pub management_context: Option<String>,
    /// Default Azure location for new clusters.
    pub location: Option<String>,
}

/// Returns `~/.capzctl/`, creating it if it doesn't exist.
pub fn capzctl_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::command_failed("could not determine home directory"))?;
    let dir = home.join(CONFIG_DIR_NAME);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::command_failed(format!("failed to create {}: {}", dir.display(), e))
        })?;
    }
    Ok(dir)
}

/// Path to `~/.capzctl/config.json`.
pub fn config_path() -> Result<PathBuf> {
    Ok(capzctl_dir()?.join(CONFIG_FILE_NAME))
}

/// Load config from `~/.capzctl/config.json`, returning default if missing.
pub fn load_config() -> Result<CapzctlConfig> {
    load_config_from(&config_path()?)
}

/// Save config to `~/.capzctl/config.json`.
pub fn save_config(config: &CapzctlConfig) -> Result<()> {
    save_config_to(&config_path()?, config)
}

/// Load config from `path`, returning default if missing.
pub fn load_config_from(path: &Path) -> Result<CapzctlConfig> {
    if !path.exists() {
        return Ok(CapzctlConfig::default());
    }
    let data = std::fs::read_to_string(path)
        .map_err(|e| Error::command_failed(format!("failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&data)
        .map_err(|e| Error::command_failed(format!("failed to parse {}: {}", path.display(), e)))
}

/// Save config to `path`.
pub fn save_config_to(path: &Path, config: &CapzctlConfig) -> Result<()> {
    let data = serde_json::to_string_pretty(config)?;
    std::fs::write(path, data)
        .map_err(|e| Error::command_failed(format!("failed to write {}: {}", path.display(), e)))
}

/// Resolve the management kubeconfig path using the priority chain.
///
/// Returns `None` to use kube defaults.
pub fn resolve_kubeconfig(explicit: Option<&str>, config: &CapzctlConfig) -> Option<String> {
    resolve_kubeconfig_with(explicit, std::env::var(CAPZCTL_KUBECONFIG_ENV).ok(), config)
}

fn resolve_kubeconfig_with(
    explicit: Option<&str>,
    env: Option<String>,
    config: &CapzctlConfig,
) -> Option<String> {
    if let Some(path) = explicit {
        return Some(path.to_string());
    }
    if let Some(path) = env.filter(|p| !p.is_empty()) {
        return Some(path);
    }
    config.management_kubeconfig.clone()
}
