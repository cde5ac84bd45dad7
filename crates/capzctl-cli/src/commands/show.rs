//! Show command - observed phase of one cluster

use clap::Args;

use capzctl_lifecycle::OrchestratorConfig;

use super::format::render_status;
use super::{orchestrator, ClusterRef, ManagementArgs};
use crate::config::load_config;
use crate::{CommandStatus, GlobalArgs, Result};

/// Arguments for `capzctl show`
#[derive(Args, Debug)]
pub struct ShowArgs {
    #[command(flatten)]
    pub cluster: ClusterRef,

    #[command(flatten)]
    pub management: ManagementArgs,
}

pub async fn run(args: ShowArgs, global: &GlobalArgs) -> Result<CommandStatus> {
    let config = load_config()?;
    let orchestrator = orchestrator(global, &config, OrchestratorConfig::default())?;

    let target = args.management.target(&config, None, false);
    let status = orchestrator.status(&target, &args.cluster.cluster()).await?;

    println!("{}", render_status(&status, global.output)?);
    Ok(CommandStatus::Success)
}
