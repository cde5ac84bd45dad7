//! Create command - compose, provision, wait and optionally pivot

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use capzctl_capi::AddonPlan;
use capzctl_lifecycle::{CreateRequest, OrchestratorConfig};

use super::format::{outcome_status, render_outcome};
use super::generate::{compose_manifests, write_manifests};
use super::{orchestrator, ClusterArgs, ManagementArgs};
use crate::config::load_config;
use crate::{CommandStatus, GlobalArgs, Result};

/// Arguments for `capzctl create`
#[derive(Args, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    #[command(flatten)]
    pub management: ManagementArgs,

    /// Move the Cluster API resources into the new cluster once it is ready
    #[arg(long)]
    pub pivot: bool,

    /// Fail instead of creating a management cluster when none is found
    #[arg(long)]
    pub no_provision: bool,

    /// Compose and print the manifests without touching any cluster
    #[arg(long)]
    pub dry_run: bool,

    /// Where to keep a copy of the manifests (default: <name>.yaml)
    #[arg(long)]
    pub output_file: Option<PathBuf>,

    /// Minutes to wait for the control plane to become ready
    #[arg(long, default_value_t = 20)]
    pub timeout: u64,

    /// Skip the Calico install and the wait for Ready nodes
    #[arg(long)]
    pub no_cni: bool,
}

pub async fn run(
    args: CreateArgs,
    global: &GlobalArgs,
    cancel: &CancellationToken,
) -> Result<CommandStatus> {
    let config = load_config()?;
    let name = args.cluster.name_or_generate();
    let (context, yaml) = compose_manifests(&args.cluster, name, &config)?;

    if args.dry_run {
        print!("{}", yaml);
        return Ok(CommandStatus::Success);
    }

    let output_file = args
        .output_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}.yaml", context.cluster_name)));
    write_manifests(&output_file, &yaml)?;

    let management = args.management.target(
        &config,
        Some(context.placement.location.clone()),
        !args.no_provision,
    );
    let tunables = OrchestratorConfig {
        readiness_timeout: Duration::from_secs(args.timeout * 60),
        ..Default::default()
    };
    let orchestrator = orchestrator(global, &config, tunables)?;

    info!(
        cluster = %context.cluster_name,
        management = %management.name,
        pivot = args.pivot,
        "creating cluster"
    );
    let addons = if args.no_cni {
        AddonPlan::default()
    } else {
        AddonPlan::for_context(&context)
    };
    let request = CreateRequest {
        context,
        management,
        addons,
        pivot: args.pivot,
    };
    let outcome = orchestrator.create(&request, cancel).await;

    println!("{}", render_outcome(&outcome, global.output)?);
    Ok(outcome_status(&outcome))
}
