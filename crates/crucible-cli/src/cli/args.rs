use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "crucible",
    version,
    about = "Deterministic evaluation harness for language models"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run an evaluation pack against one or more models
    Run(RunArgs),
    /// List available evaluation packs
    Packs(PacksArgs),
    /// Export graded results to CSV or JSON
    Export(ExportArgs),
    /// Generate a Markdown summary for a run
    Report(ReportArgs),
    /// Merge a pilot run from another database into an existing run
    Merge(MergeArgs),
}

#[derive(clap::Args, Clone)]
pub struct RunArgs {
    /// Pack name to run
    #[arg(long)]
    pub pack: String,

    /// Model spec as provider:model_name (repeatable)
    #[arg(long = "model", required = true)]
    pub models: Vec<String>,

    /// Repetitions per case
    #[arg(long, default_value_t = 1)]
    pub n: u32,

    #[arg(long, default_value = "results.sqlite")]
    pub db: PathBuf,

    #[arg(long, default_value = "packs")]
    pub packs_dir: PathBuf,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Max output tokens
    #[arg(long, default_value_t = 1024)]
    pub max_tokens: u32,

    /// Enable agentic tool use (run_python)
    #[arg(long)]
    pub tools: bool,

    /// Max tool-use turns per generation
    #[arg(long, default_value_t = 10)]
    pub max_tool_turns: u32,

    /// Max seconds per case
    #[arg(long, default_value_t = 120)]
    pub case_timeout: u64,
}

#[derive(clap::Args, Clone)]
pub struct PacksArgs {
    #[arg(long, default_value = "packs")]
    pub packs_dir: PathBuf,
}

#[derive(clap::Args, Clone)]
pub struct ExportArgs {
    #[arg(long, default_value = "results.sqlite")]
    pub db: PathBuf,

    /// Run id (default: latest)
    #[arg(long)]
    pub run: Option<i64>,

    /// Export format: csv | json
    #[arg(long, default_value = "csv")]
    pub format: String,

    /// Output file path (default: stdout)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(clap::Args, Clone)]
pub struct ReportArgs {
    #[arg(long, default_value = "results.sqlite")]
    pub db: PathBuf,

    /// Run id (default: latest)
    #[arg(long)]
    pub run: Option<i64>,

    /// Output file path (default: stdout)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(clap::Args, Clone)]
pub struct MergeArgs {
    /// Target database
    #[arg(long, default_value = "results.sqlite")]
    pub db: PathBuf,

    /// Source (pilot) database
    #[arg(long)]
    pub from: PathBuf,

    /// Run id in the source database
    #[arg(long)]
    pub from_run: i64,

    /// Run id in the target database to append into
    #[arg(long)]
    pub into_run: i64,
}
