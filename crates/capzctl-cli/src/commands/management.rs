//! Management cluster commands

use clap::{Args, Subcommand};
use tracing::info;

use capzctl_lifecycle::{ClusterHandle, OrchestratorConfig};

use super::format::format_table;
use super::{orchestrator, ManagementArgs};
use crate::config::{load_config, save_config, CapzctlConfig};
use crate::{CommandStatus, GlobalArgs, OutputFormat, Result};

#[derive(Subcommand, Debug)]
pub enum ManagementCommands {
    /// Find or create the management cluster and install the controllers
    Create(ManagementCreateArgs),
    /// Upgrade the Cluster API controllers of an existing management cluster
    Update(ManagementUpdateArgs),
    /// Delete a management cluster capzctl created
    Delete(ManagementDeleteArgs),
}

#[derive(Args, Debug)]
pub struct ManagementCreateArgs {
    #[command(flatten)]
    pub management: ManagementArgs,

    /// Azure location recorded for the management cluster
    #[arg(short, long, env = "AZURE_LOCATION")]
    pub location: Option<String>,

    /// Don't remember the management cluster in ~/.capzctl/config.json
    #[arg(long)]
    pub no_save: bool,
}

#[derive(Args, Debug)]
pub struct ManagementUpdateArgs {
    #[command(flatten)]
    pub management: ManagementArgs,
}

#[derive(Args, Debug)]
pub struct ManagementDeleteArgs {
    #[command(flatten)]
    pub management: ManagementArgs,

    /// Delete even if workload clusters are still registered
    #[arg(long)]
    pub force: bool,
}

pub async fn run(cmd: ManagementCommands, global: &GlobalArgs) -> Result<CommandStatus> {
    let mut config = load_config()?;
    let orchestrator = orchestrator(global, &config, OrchestratorConfig::default())?;

    match cmd {
        ManagementCommands::Create(args) => {
            let target = args.management.target(&config, args.location.clone(), true);
            let handle = orchestrator.ensure_management(&target).await?;
            if !args.no_save {
                remember(&mut config, &handle);
                save_config(&config)?;
                info!(cluster = %handle.name, "saved management cluster to config");
            }
            println!("{}", render_handle(&handle, global.output)?);
        }
        ManagementCommands::Update(args) => {
            let target = args.management.target(&config, None, false);
            let handle = orchestrator.update_management(&target).await?;
            info!(cluster = %handle.name, "management cluster controllers upgraded");
            println!("{}", render_handle(&handle, global.output)?);
        }
        ManagementCommands::Delete(args) => {
            let target = args.management.target(&config, None, false);
            orchestrator.delete_management(&target, args.force).await?;
            if config.management_cluster.as_deref() == Some(target.name.as_str()) {
                forget(&mut config);
                save_config(&config)?;
            }
            println!("Deleted management cluster {}", target.name);
        }
    }
    Ok(CommandStatus::Success)
}

fn remember(config: &mut CapzctlConfig, handle: &ClusterHandle) {
    config.management_cluster = Some(handle.name.clone());
    config.management_resource_group = Some(handle.resource_group.clone());
    config.management_context = handle.context.clone();
    config.management_kubeconfig = handle
        .kubeconfig
        .as_ref()
        .map(|p| p.display().to_string());
}

fn forget(config: &mut CapzctlConfig) {
    config.management_cluster = None;
    config.management_resource_group = None;
    config.management_context = None;
    config.management_kubeconfig = None;
}

fn render_handle(handle: &ClusterHandle, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(handle)?),
        OutputFormat::Text => Ok(format_table(
            &["NAME", "RESOURCE GROUP", "CONTEXT", "CREATED BY CAPZCTL"],
            &[vec![
                handle.name.clone(),
                handle.resource_group.clone(),
                handle.context.clone().unwrap_or_else(|| "-".to_string()),
                if handle.is_just_in_time() { "yes" } else { "no" }.to_string(),
            ]],
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capzctl_lifecycle::HandleOrigin;

    fn handle() -> ClusterHandle {
        ClusterHandle {
            name: "capi-manager".to_string(),
            resource_group: "capi-manager".to_string(),
            kubeconfig: Some("/tmp/mgmt.kubeconfig".into()),
            context: Some("kind-capi-manager".to_string()),
            origin: HandleOrigin::JustInTime,
        }
    }

    #[test]
    fn remember_then_forget_clears_management_fields() {
        let mut config = CapzctlConfig {
            location: Some("eastus".to_string()),
            ..Default::default()
        };
        remember(&mut config, &handle());
        assert_eq!(config.management_cluster.as_deref(), Some("capi-manager"));
        assert_eq!(config.management_context.as_deref(), Some("kind-capi-manager"));
        assert_eq!(
            config.management_kubeconfig.as_deref(),
            Some("/tmp/mgmt.kubeconfig")
        );

        forget(&mut config);
        assert_eq!(
            config,
            CapzctlConfig {
                location: Some("eastus".to_string()),
                ..Default::default()
            }
        );
    }

    #[test]
    fn update_subcommand_parses() {
        use crate::{Cli, Commands};
        use clap::Parser;

        let cli = Cli::try_parse_from([
            "capzctl",
            "management",
            "update",
            "--management-cluster",
            "mgmt",
        ])
        .unwrap();
        let Commands::Management(ManagementCommands::Update(args)) = cli.command else {
            panic!("expected management update");
        };
        assert_eq!(args.management.management_cluster.as_deref(), Some("mgmt"));
    }

    #[test]
    fn handle_text_marks_just_in_time_clusters() {
        let text = render_handle(&handle(), OutputFormat::Text).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert!(row.contains("kind-capi-manager"));
        assert!(row.trim_end().ends_with("yes"));
    }
}
