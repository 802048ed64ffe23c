//! `adam` command-line entry point.

use std::io::{self, IsTerminal};
use std::process::ExitCode;

use clap::{ColorChoice, Parser};

use adam_cli::logging::{LogConfig, LogFormat, init_logging};

mod cli;
mod commands;
mod summary;

use crate::cli::{Cli, Command};
use crate::commands::{run_build, run_functions, run_merge, run_validate};
use crate::summary::print_build_summary;

fn main() -> ExitCode {
    let cli = Cli::parse();
    cli.color.write_global();

    let log_config = log_config(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: cannot open log output: {error}");
        return ExitCode::FAILURE;
    }
    // Progress bars would interleave with machine-readable log lines.
    let show_progress = log_config.format != LogFormat::Json;

    let outcome = match &cli.command {
        Command::Build(args) => run_build(args, show_progress).map(|outcome| {
            print_build_summary(&outcome);
            outcome.has_errors()
        }),
        Command::Merge(args) => run_merge(args),
        Command::Validate(args) => run_validate(args),
        Command::Functions => run_functions().map(|()| false),
    };
    match outcome {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

/// `--log-level` wins over `-v`/`-q`; either one disables `RUST_LOG`.
fn log_config(cli: &Cli) -> LogConfig {
    let level = cli
        .log_level
        .map_or_else(|| cli.verbosity.tracing_level_filter(), Into::into);
    let explicit = cli.log_level.is_some() || cli.verbosity.is_present();
    let ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    LogConfig::default()
        .with_level_filter(level)
        .with_env_filter(!explicit)
        .with_format(cli.log_format.into())
        .with_ansi(ansi)
        .with_log_file(cli.log_file.clone())
        .with_log_data(cli.log_data)
}
