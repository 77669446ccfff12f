//! CLI argument definitions for the positioning binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use positioning::OrderBy;
use positioning::lock::LockStrategy;

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Maintenance tool for dense position columns
#[derive(Parser, Debug)]
#[command(name = "positioning")]
#[command(about = "Heal, reorder and check scoped position columns")]
#[command(version)]
pub struct Cli {
    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rewrite every scope of a column to 1..N
    Heal(HealArgs),
    /// Put the given rows in a new order within their scopes
    Reposition(RepositionArgs),
    /// Report gaps and duplicates per scope
    Check(CheckArgs),
}

/// Which database, table and column to work on.
#[derive(clap::Args, Debug, Clone)]
pub struct TargetArgs {
    /// Database URL (sqlite:path.db or postgres://...)
    #[arg(long, env = "POSITIONING_DATABASE_URL")]
    pub database_url: String,

    /// Table holding the positioned rows
    #[arg(short, long)]
    pub table: String,

    /// Position column
    #[arg(short, long, default_value = "position")]
    pub column: String,

    /// Scope columns, comma separated or repeated
    #[arg(short, long, value_delimiter = ',')]
    pub scope: Vec<String>,

    /// Primary key columns, comma separated
    #[arg(long, value_delimiter = ',', default_value = "id")]
    pub primary_key: Vec<String>,

    /// How concurrent writers are serialised (advisory, row, none)
    #[arg(long, default_value = "advisory", env = "POSITIONING_LOCK")]
    pub lock: LockStrategy,

    /// Directory for SQLite advisory lock files
    #[arg(long, env = "POSITIONING_LOCK_DIR")]
    pub lock_dir: Option<PathBuf>,
}

/// Arguments for the heal command
#[derive(clap::Args, Debug)]
pub struct HealArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Sort order, e.g. `name:desc,created_at` (default: current position)
    #[arg(long)]
    pub order: Option<OrderBy>,
}

/// Arguments for the reposition command
#[derive(clap::Args, Debug)]
pub struct RepositionArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Keys in their new order; composite keys are written `a:b`
    #[arg(required_unless_present = "weights", conflicts_with = "weights")]
    pub keys: Vec<String>,

    /// `key=weight` pairs; rows are ordered by ascending weight
    #[arg(long, value_delimiter = ',')]
    pub weights: Vec<String>,
}

/// Arguments for the check command
#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Exit with an error when any scope is not dense
    #[arg(long)]
    pub strict: bool,
}
