//! capzctl CLI library
//!
//! This module exposes the CLI components for testing and reuse.

pub mod commands;
pub mod config;
pub mod error;

use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;

pub use error::{Error, Result};

/// capzctl - compose and provision Cluster API clusters on Azure
#[derive(Parser, Debug)]
#[command(name = "capzctl", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Kubeconfig of the management cluster
    #[arg(long, global = true)]
    pub kubeconfig: Option<String>,

    /// Kubeconfig context of the management cluster
    #[arg(long, global = true)]
    pub context: Option<String>,
}

/// How results are printed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON on stdout
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a workload cluster, provisioning a management cluster if needed
    Create(commands::create::CreateArgs),
    /// Compose the cluster manifests without contacting any cluster
    Generate(commands::generate::GenerateArgs),
    /// Delete a workload cluster
    Delete(commands::delete::DeleteArgs),
    /// Move a ready cluster's Cluster API resources into the cluster itself
    Pivot(commands::pivot::PivotArgs),
    /// Show where a workload cluster stands
    Show(commands::show::ShowArgs),
    /// List workload clusters on the management cluster
    List(commands::list::ListArgs),
    /// Manage the management cluster
    #[command(subcommand)]
    Management(commands::management::ManagementCommands),
}

/// How a command ended, mapped onto the process exit code
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandStatus {
    /// Everything requested happened
    Success,
    /// The main goal was reached but a follow-up step failed
    Partial,
    /// The command failed
    Failed,
}

impl From<CommandStatus> for ExitCode {
    fn from(status: CommandStatus) -> Self {
        match status {
            CommandStatus::Success => ExitCode::SUCCESS,
            CommandStatus::Failed => ExitCode::from(1),
            CommandStatus::Partial => ExitCode::from(2),
        }
    }
}

impl Cli {
    /// Run the selected subcommand; `cancel` fires on Ctrl-C
    pub async fn run(self, cancel: CancellationToken) -> Result<CommandStatus> {
        let global = self.global;
        match self.command {
            Commands::Create(args) => commands::create::run(args, &global, &cancel).await,
            Commands::Generate(args) => commands::generate::run(args),
            Commands::Delete(args) => commands::delete::run(args, &global, &cancel).await,
            Commands::Pivot(args) => commands::pivot::run(args, &global).await,
            Commands::Show(args) => commands::show::run(args, &global).await,
            Commands::List(args) => commands::list::run(args, &global).await,
            Commands::Management(cmd) => commands::management::run(cmd, &global).await,
        }
    }
}
