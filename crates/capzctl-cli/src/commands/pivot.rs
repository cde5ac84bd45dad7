//! Pivot command

use clap::Args;

use capzctl_lifecycle::OrchestratorConfig;

use super::format::{outcome_status, render_outcome};
use super::{orchestrator, ClusterRef, ManagementArgs};
use crate::config::load_config;
use crate::{CommandStatus, GlobalArgs, Result};

/// Arguments for `capzctl pivot`
#[derive(Args, Debug)]
pub struct PivotArgs {
    #[command(flatten)]
    pub cluster: ClusterRef,

    #[command(flatten)]
    pub management: ManagementArgs,
}

pub async fn run(args: PivotArgs, global: &GlobalArgs) -> Result<CommandStatus> {
    let config = load_config()?;
    let orchestrator = orchestrator(global, &config, OrchestratorConfig::default())?;

    let target = args.management.target(&config, None, false);
    let outcome = orchestrator.pivot(&target, &args.cluster.cluster()).await;

    println!("{}", render_outcome(&outcome, global.output)?);
    Ok(outcome_status(&outcome))
}
