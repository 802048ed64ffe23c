//! CLI argument definitions for the ADaM builder.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;
use tracing::level_filters::LevelFilter;

use adam_cli::logging::LogFormat;

#[derive(Parser)]
#[command(
    name = "adam",
    version,
    about = "Build ADaM datasets from YAML specifications and SDTM tables",
    long_about = "Build ADaM analysis datasets from layered YAML specifications.\n\n\
                  Specifications inherit from their parents, are checked against a rule set \
                  and then derived column by column from Parquet or CSV source domains."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Allow source values to appear in log output.
    #[arg(long = "log-data", global = true)]
    pub log_data: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Derive a dataset from a specification and write it to disk.
    Build(BuildArgs),

    /// Print the merged specification document.
    Merge(MergeArgs),

    /// Check a specification, and optionally a derived dataset against it.
    Validate(ValidateArgs),

    /// List the functions available to `function` derivations.
    Functions,
}

#[derive(Parser)]
pub struct SpecArgs {
    /// Leaf specification document.
    #[arg(value_name = "SPEC")]
    pub spec: PathBuf,

    /// Rule-set document used instead of the document's `schema`.
    #[arg(long = "schema", value_name = "PATH")]
    pub schema: Option<PathBuf>,
}

#[derive(Parser)]
pub struct BuildArgs {
    #[command(flatten)]
    pub spec: SpecArgs,

    /// Directory holding the source domain tables (overrides `source_dir`).
    #[arg(long = "source-dir", value_name = "DIR")]
    pub source_dir: Option<PathBuf>,

    /// File format of the source tables.
    #[arg(long = "source-format", value_enum, default_value = "auto")]
    pub source_format: SourceFormatArg,

    /// Domain whose key tuples seed the dataset.
    #[arg(long = "key-domain", value_name = "DOMAIN")]
    pub key_domain: Option<String>,

    /// Output file (default: <DOMAIN>.<format> next to the specification).
    #[arg(long = "output", short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Output format; inferred from `--output` when omitted.
    #[arg(long = "format", value_enum)]
    pub format: Option<OutputFormatArg>,

    /// Keep derived columns in the type they were computed in.
    #[arg(long = "no-coerce")]
    pub no_coerce: bool,

    /// Load source domains one after another.
    #[arg(long = "sequential")]
    pub sequential: bool,

    /// Run the column `validation` rules against the result.
    #[arg(long = "check")]
    pub check: bool,

    /// Derive and report without writing the dataset.
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

#[derive(Parser)]
pub struct MergeArgs {
    #[command(flatten)]
    pub spec: SpecArgs,

    /// Write the merged document to a file instead of stdout.
    #[arg(long = "output", short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Print the resolved specification as JSON instead of the merged YAML.
    #[arg(long = "resolved")]
    pub resolved: bool,
}

#[derive(Parser)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub spec: SpecArgs,

    /// Derived dataset (Parquet or CSV) to check against the column rules.
    #[arg(long = "data", value_name = "PATH")]
    pub data: Option<PathBuf>,

    /// Write the dataset report as JSON.
    #[arg(long = "report", value_name = "PATH")]
    pub report: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SourceFormatArg {
    Auto,
    Csv,
    Parquet,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormatArg {
    Parquet,
    Csv,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogLevelArg> for LevelFilter {
    fn from(level: LogLevelArg) -> Self {
        match level {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        }
    }
}

impl From<LogFormatArg> for LogFormat {
    fn from(format: LogFormatArg) -> Self {
        match format {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}
