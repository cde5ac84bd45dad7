//! Delete command

use std::time::Duration;

use clap::Args;
use tokio_util::sync::CancellationToken;

use capzctl_lifecycle::{DeleteRequest, OrchestratorConfig};

use super::format::{outcome_status, render_outcome};
use super::{orchestrator, ClusterRef, ManagementArgs};
use crate::config::load_config;
use crate::{CommandStatus, GlobalArgs, Result};

/// Arguments for `capzctl delete`
#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub cluster: ClusterRef,

    #[command(flatten)]
    pub management: ManagementArgs,

    /// Also delete the management cluster if capzctl created it and it is now empty
    #[arg(long)]
    pub delete_management: bool,

    /// Minutes to wait for the cluster to disappear
    #[arg(long, default_value_t = 20)]
    pub timeout: u64,
}

pub async fn run(
    args: DeleteArgs,
    global: &GlobalArgs,
    cancel: &CancellationToken,
) -> Result<CommandStatus> {
    let config = load_config()?;
    let tunables = OrchestratorConfig {
        deletion_timeout: Duration::from_secs(args.timeout * 60),
        ..Default::default()
    };
    let orchestrator = orchestrator(global, &config, tunables)?;

    let request = DeleteRequest {
        cluster: args.cluster.cluster(),
        management: args.management.target(&config, None, false),
        delete_management: args.delete_management,
    };
    let outcome = orchestrator.delete(&request, cancel).await;

    println!("{}", render_outcome(&outcome, global.output)?);
    Ok(outcome_status(&outcome))
}

#[cfg(test)]
mod tests {
    use crate::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn delete_takes_a_positional_name() {
        let cli = Cli::try_parse_from([
            "capzctl",
            "delete",
            "demo",
            "--namespace",
            "team-a",
            "--delete-management",
        ])
        .unwrap();
        let Commands::Delete(args) = cli.command else {
            panic!("expected delete");
        };
        assert_eq!(args.cluster.cluster().to_string(), "team-a/demo");
        assert!(args.delete_management);
        assert_eq!(args.timeout, 20);
    }

    #[test]
    fn delete_requires_a_name() {
        assert!(Cli::try_parse_from(["capzctl", "delete"]).is_err());
    }
}
