//! Shared Kubernetes utilities using kube-rs

use std::path::Path;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};

use crate::error::UNKNOWN_CONTEXT;
use crate::Error;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Plural resource names for the kinds capzctl applies and reads.
const KIND_PLURALS: &[(&str, &str)] = &[
    ("cluster", "clusters"),
    ("azurecluster", "azureclusters"),
    ("azureclusteridentity", "azureclusteridentities"),
    ("kubeadmcontrolplane", "kubeadmcontrolplanes"),
    ("azuremachinetemplate", "azuremachinetemplates"),
    ("machinedeployment", "machinedeployments"),
    ("kubeadmconfigtemplate", "kubeadmconfigtemplates"),
    ("machinepool", "machinepools"),
    ("azuremachinepool", "azuremachinepools"),
    ("kubeadmconfig", "kubeadmconfigs"),
    ("secret", "secrets"),
    ("configmap", "configmaps"),
    ("clusterresourceset", "clusterresourcesets"),
];

/// Build an ApiResource from an apiVersion and kind.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Split an apiVersion into (group, version); core types have an empty group.
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Lowercase plural resource name for a kind
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    for (singular, plural) in KIND_PLURALS {
        if *singular == lower {
            return (*plural).to_string();
        }
    }

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Create a kube client from an optional kubeconfig path and context.
///
/// With no path, the standard inference chain (`KUBECONFIG`, in-cluster) is used.
pub async fn create_client(kubeconfig: Option<&Path>, context: Option<&str>) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::fatal(
                    UNKNOWN_CONTEXT,
                    "kubeconfig",
                    format!("failed to read {}: {}", path.display(), e),
                )
            })?;
            let options = KubeConfigOptions {
                context: context.map(str::to_string),
                ..Default::default()
            };
            Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .map_err(|e| {
                    Error::fatal(
                        UNKNOWN_CONTEXT,
                        "kubeconfig",
                        format!("failed to load {}: {}", path.display(), e),
                    )
                })?
        }
        None => {
            let options = KubeConfigOptions {
                context: context.map(str::to_string),
                ..Default::default()
            };
            match context {
                Some(_) => Config::from_kubeconfig(&options).await.map_err(|e| {
                    Error::fatal(UNKNOWN_CONTEXT, "kubeconfig", format!("failed to load context: {}", e))
                })?,
                None => Config::infer().await.map_err(|e| {
                    Error::fatal(UNKNOWN_CONTEXT, "kubeconfig", format!("failed to infer config: {}", e))
                })?,
            }
        }
    };
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Client::try_from(config).map_err(|e| {
        Error::fatal(UNKNOWN_CONTEXT, "kubeconfig", format!("failed to create client: {}", e))
    })
}

/// Names of the contexts defined in a kubeconfig file
pub fn kubeconfig_contexts(path: &Path) -> Result<Vec<String>, Error> {
    let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
        Error::fatal(
            UNKNOWN_CONTEXT,
            "kubeconfig",
            format!("failed to read {}: {}", path.display(), e),
        )
    })?;
    Ok(kubeconfig.contexts.into_iter().map(|c| c.name).collect())
}
