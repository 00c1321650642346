use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "slurmtab",
    version,
    about = "Group slurm job scalar logs and render comparison tables"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Report(ReportArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    /// JSON file declaring groups, metric specs and optional filters.
    #[arg(long)]
    pub config: PathBuf,

    /// Directory tree containing the per-job log subdirectories.
    #[arg(long)]
    pub log_root: PathBuf,

    /// Persistent cache of parsed logs; omit for a fresh in-memory cache.
    #[arg(long)]
    pub cache: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    pub format: OutputFormat,

    /// Result name to sort rows by, e.g. "acc avg".
    #[arg(long)]
    pub sort_by: Option<String>,

    #[arg(long, default_value_t = false)]
    pub descending: bool,

    /// Re-parse logs for all job ids, ignoring cached entries.
    #[arg(long, default_value_t = false)]
    pub force: bool,

    /// Parameter or result keys to drop from the table columns.
    #[arg(long = "ignore")]
    pub ignore_keys: Vec<String>,

    /// Index of the job-id component among numeric path components, for
    /// layouts with leading numeric directories.
    #[arg(long, default_value_t = 0)]
    pub id_component_offset: usize,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Latex,
}
