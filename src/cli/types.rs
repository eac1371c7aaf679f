//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::domain::models::RequestKind;

#[derive(Parser, Debug)]
#[command(name = "typebench")]
#[command(about = "typebench - benchmark Python type checker language servers", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (replaces .typebench/config.yaml and local.yaml)
    #[arg(short, long, global = true, env = "TYPEBENCH_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the benchmark and store a dated report
    Run(RunArgs),

    /// Show a stored report
    Show(ShowArgs),

    /// Day-to-day variance of valid-definition rates across stored reports
    Variance(VarianceArgs),

    /// Probe and list configured checkers
    Checkers(CheckersArgs),
}

/// Request kind as accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Definition,
    Diagnostics,
}

impl From<KindArg> for RequestKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Definition => Self::Definition,
            KindArg::Diagnostics => Self::Diagnostics,
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Number of packages to benchmark
    #[arg(short = 'n', long)]
    pub packages: Option<usize>,

    /// Runs per (package, checker) pair
    #[arg(short, long)]
    pub runs: Option<u32>,

    /// Samples issued within each run
    #[arg(short, long)]
    pub samples: Option<u32>,

    /// Checkers to run (comma-separated keys)
    #[arg(long, value_delimiter = ',')]
    pub checkers: Vec<String>,

    /// Cells executing at once
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Request issued for each sample
    #[arg(short, long, value_enum)]
    pub kind: Option<KindArg>,

    /// Date the sample seed derives from (YYYY-MM-DD, default today in UTC)
    #[arg(long)]
    pub seed_date: Option<NaiveDate>,

    /// Stop submitting cells after this many seconds
    #[arg(long)]
    pub max_wall_clock: Option<u64>,

    /// Stop submitting cells after this many
    #[arg(long)]
    pub max_cells: Option<usize>,

    /// Directory holding stored reports
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Directory packages are cloned into
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// JSON package list
    #[arg(long)]
    pub packages_file: Option<PathBuf>,

    /// Leave raw observations out of the report
    #[arg(long)]
    pub no_raw: bool,

    /// Resolve checkers and packages, print the plan, run nothing
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Default)]
pub struct ShowArgs {
    /// Report date (YYYY-MM-DD); the latest report when omitted
    pub date: Option<NaiveDate>,

    /// Only show this package
    #[arg(short, long)]
    pub package: Option<String>,

    /// Directory holding stored reports
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// List stored report dates instead
    #[arg(long)]
    pub list: bool,
}

#[derive(Args, Debug)]
pub struct VarianceArgs {
    /// Only use the most recent N reports
    #[arg(short, long)]
    pub last: Option<usize>,

    /// CV percentage above which a series is flagged
    #[arg(long, default_value_t = 10.0)]
    pub threshold: f64,

    /// Directory holding stored reports
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct CheckersArgs {
    /// Checkers to probe (comma-separated keys); all when omitted
    #[arg(long, value_delimiter = ',')]
    pub checkers: Vec<String>,
}
