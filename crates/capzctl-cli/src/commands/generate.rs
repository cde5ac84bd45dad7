//! Generate command - compose manifests offline

use std::path::{Path, PathBuf};

use clap::Args;
use tracing::info;

use capzctl_capi::{compose, resolve, CompositionContext, TemplateCatalog};

use super::ClusterArgs;
use crate::config::{load_config, CapzctlConfig};
use crate::{CommandStatus, Result};

/// Arguments for `capzctl generate`
#[derive(Args, Debug)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Write the manifests to a file instead of stdout
    #[arg(long)]
    pub output_file: Option<PathBuf>,
}

/// Resolve and compose; returns the context and the YAML stream
pub fn compose_manifests(
    cluster: &ClusterArgs,
    name: String,
    config: &CapzctlConfig,
) -> Result<(CompositionContext, String)> {
    let request = cluster.to_request(name, config)?;
    let context = resolve(&TemplateCatalog::builtin(), &request)?;
    let bundle = compose(&context)?;
    info!(
        cluster = %context.cluster_name,
        schema = %context.schema_version,
        manifests = bundle.len(),
        "composed cluster manifests"
    );
    Ok((context, bundle.to_yaml()?))
}

/// Write the YAML stream to `path`
pub fn write_manifests(path: &Path, yaml: &str) -> Result<()> {
    std::fs::write(path, yaml)?;
    info!(path = %path.display(), "wrote cluster manifests");
    Ok(())
}

pub fn run(args: GenerateArgs) -> Result<CommandStatus> {
    let config = load_config()?;
    let name = args.cluster.name_or_generate();
    let (_, yaml) = compose_manifests(&args.cluster, name, &config)?;

    match &args.output_file {
        Some(path) => write_manifests(path, &yaml)?,
        None => print!("{}", yaml),
    }
    Ok(CommandStatus::Success)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ClusterArgs {
        ClusterArgs {
            location: Some("eastus".to_string()),
            subscription_id: Some("00000000-0000-0000-0000-000000000000".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn composes_a_yaml_stream_for_the_named_cluster() {
        let (context, yaml) =
            compose_manifests(&args(), "demo".to_string(), &CapzctlConfig::default()).unwrap();
        assert_eq!(context.cluster_name, "demo");
        assert!(yaml.contains("kind: Cluster\n"));
        assert!(yaml.contains("name: demo\n"));
        assert!(yaml.contains("---\n"));
    }

    #[test]
    fn invalid_request_fails_before_composition() {
        let mut bad = args();
        bad.control_plane_machine_count = Some(0);
        let err = compose_manifests(&bad, "demo".to_string(), &CapzctlConfig::default())
            .unwrap_err();
        match err {
            crate::Error::Capzctl(e) => {
                assert_eq!(e.kind(), capzctl_common::ErrorKind::Validation)
            }
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn manifests_are_written_to_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.yaml");
        let (_, yaml) =
            compose_manifests(&args(), "demo".to_string(), &CapzctlConfig::default()).unwrap();
        write_manifests(&path, &yaml).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), yaml);
    }
}
