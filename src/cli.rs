use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "metronome-sync")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Reconcile declared billing resources with Metronome", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one reconciliation pass (create, update, delete)
    Apply(ApplyArgs),

    /// Show what apply would change, without changing anything
    Diff(DiffArgs),

    /// Reconcile repeatedly at a fixed interval
    Watch(WatchArgs),

    /// Show tracked resources and their conditions
    Status(StatusArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Options shared by every command that talks to Metronome
#[derive(Args, Clone)]
pub struct PassArgs {
    /// Manifest file (default: resources.toml in the config directory)
    #[arg(short, long, env = "METRONOME_SYNC_MANIFEST")]
    pub manifest: Option<PathBuf>,

    /// Number of resources reconciled in parallel
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Deadline for a whole pass, in seconds
    #[arg(short, long, default_value = "300")]
    pub timeout: u64,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Limit to a kind or one resource: `product` or `product.api`
    pub target: Option<String>,

    #[command(flatten)]
    pub pass: PassArgs,

    /// Delete resources removed from the manifest without asking
    #[arg(short, long)]
    pub yes: bool,

    /// Dry run - observe and report, change nothing
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct DiffArgs {
    /// Limit to a kind or one resource: `rate` or `rate.api-list`
    pub target: Option<String>,

    #[command(flatten)]
    pub pass: PassArgs,
}

#[derive(Args)]
pub struct WatchArgs {
    /// Seconds between the start of consecutive passes
    #[arg(short, long, default_value = "300")]
    pub interval: u64,

    #[command(flatten)]
    pub pass: PassArgs,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Limit to a kind or one resource
    pub target: Option<String>,

    /// Manifest file (default: resources.toml in the config directory)
    #[arg(short, long, env = "METRONOME_SYNC_MANIFEST")]
    pub manifest: Option<PathBuf>,
}
