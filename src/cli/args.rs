//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::str::FromStr;

use crate::cli::commands::{
    backup::BackupCommands, completions::CompletionsArgs, config::ConfigCommands,
    distribution::DistributionCommands, init::InitArgs, object::ObjectCommands,
    participant::ParticipantCommands, stats::StatsArgs,
};

#[derive(Parser)]
#[command(name = "kitshare")]
#[command(author, version, about = "Fair distribution of shared kits")]
#[command(
    long_about = "Track participants and kits of parts, and distribute units fairly across runs using a persistent assignment ledger."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output (debug logging)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Project root (default: auto-detect by finding .kitshare/)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new kitshare project
    Init(InitArgs),

    /// Participant management
    #[command(subcommand)]
    Participant(ParticipantCommands),

    /// Object, part and type management
    #[command(subcommand)]
    Object(ObjectCommands),

    /// Create, preview, inspect and cancel distributions
    #[command(subcommand, visible_alias = "dist")]
    Distribution(DistributionCommands),

    /// Show distribution statistics and the equity index
    Stats(StatsArgs),

    /// Export or import the whole ledger as JSON
    #[command(subcommand)]
    Backup(BackupCommands),

    /// View and modify configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Automatically detect based on context (pretty for show, tsv for list)
    #[default]
    Auto,
    /// YAML format (full fidelity)
    Yaml,
    /// Tab-separated values (for piping)
    Tsv,
    /// JSON format (for programming)
    Json,
    /// CSV format (for spreadsheets)
    Csv,
    /// Markdown tables
    Md,
    /// Just IDs, one per line
    Id,
}

impl FromStr for OutputFormat {
    type Err = String;

    /// Parse a `default_format` config value
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s.trim(), true)
    }
}
