//! List command

use clap::Args;

use capzctl_lifecycle::OrchestratorConfig;

use super::format::render_clusters;
use super::{orchestrator, ManagementArgs};
use crate::config::load_config;
use crate::{CommandStatus, GlobalArgs, Result};

/// Arguments for `capzctl list`
#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub management: ManagementArgs,
}

pub async fn run(args: ListArgs, global: &GlobalArgs) -> Result<CommandStatus> {
    let config = load_config()?;
    let orchestrator = orchestrator(global, &config, OrchestratorConfig::default())?;

    let target = args.management.target(&config, None, false);
    let clusters = orchestrator.list(&target).await?;

    println!("{}", render_clusters(&clusters, global.output)?);
    Ok(CommandStatus::Success)
}
