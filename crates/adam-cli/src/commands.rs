use std::fs;
use std::io::{self, IsTerminal, Write};

use anyhow::{Context, Result, bail};
use tracing::info;

use adam_cli::output::OutputFormat;
use adam_cli::pipeline::{BuildOutcome, BuildRequest, build};
use adam_cli::progress::BarProgress;
use adam_derive::{EngineOptions, FunctionRegistry, SourceFormat, read_table};
use adam_spec::{SpecBuilder, resolve};
use adam_validate::validate_dataset;

use crate::cli::{BuildArgs, MergeArgs, OutputFormatArg, SourceFormatArg, SpecArgs, ValidateArgs};
use crate::summary::{print_dataset_report, print_functions, print_schema_report};

pub fn run_build(args: &BuildArgs, show_progress: bool) -> Result<BuildOutcome> {
    let mut options = EngineOptions::new()
        .with_source_format(source_format(args.source_format))
        .with_parallel_load(!args.sequential)
        .with_coerce_types(!args.no_coerce);
    if let Some(domain) = &args.key_domain {
        options = options.with_key_domain(domain);
    }
    let request = BuildRequest::new(&args.spec.spec)
        .with_schema(args.spec.schema.clone())
        .with_source_dir(args.source_dir.clone())
        .with_options(options)
        .with_output(args.output.clone(), args.format.map(output_format))
        .with_check(args.check)
        .with_dry_run(args.dry_run);

    let progress = if show_progress && io::stderr().is_terminal() {
        BarProgress::new()
    } else {
        BarProgress::hidden()
    };
    let outcome = build(&request, &progress);
    progress.finish();
    outcome
}

pub fn run_merge(args: &MergeArgs) -> Result<bool> {
    let (merged, report) = spec_builder(&args.spec)
        .check()
        .with_context(|| format!("merge {}", args.spec.spec.display()))?;
    print_schema_report(&report);

    let text = if args.resolved {
        if !report.is_valid() {
            bail!("specification has schema errors; not resolving");
        }
        let spec = resolve(&merged).context("resolve merged document")?;
        let mut json = serde_json::to_string_pretty(&spec).context("serialize specification")?;
        json.push('\n');
        json
    } else {
        serde_yaml::to_string(&merged).context("serialize merged document")?
    };

    match &args.output {
        Some(path) => {
            fs::write(path, &text).with_context(|| format!("write {}", path.display()))?;
            info!(path = %path.display(), "merged document written");
        }
        None => {
            io::stdout()
                .write_all(text.as_bytes())
                .context("write merged document")?;
        }
    }
    Ok(!report.is_valid())
}

pub fn run_validate(args: &ValidateArgs) -> Result<bool> {
    let (merged, report) = spec_builder(&args.spec)
        .check()
        .with_context(|| format!("check {}", args.spec.spec.display()))?;
    print_schema_report(&report);
    if !report.is_valid() {
        return Ok(true);
    }
    let spec = resolve(&merged).context("resolve merged document")?;
    println!(
        "{}: specification valid ({} columns, {} warnings)",
        spec.domain,
        spec.columns.len(),
        report.warning_count()
    );

    let Some(data) = &args.data else {
        return Ok(false);
    };
    let df = read_table(data).with_context(|| format!("read dataset {}", data.display()))?;
    let dataset_report = validate_dataset(&df, &spec);
    print_dataset_report(&dataset_report);
    if let Some(path) = &args.report {
        let json =
            serde_json::to_string_pretty(&dataset_report).context("serialize dataset report")?;
        fs::write(path, format!("{json}\n"))
            .with_context(|| format!("write report {}", path.display()))?;
    }
    Ok(dataset_report.has_errors())
}

pub fn run_functions() -> Result<()> {
    let registry = FunctionRegistry::with_builtins();
    print_functions(registry.names());
    Ok(())
}

fn spec_builder(args: &SpecArgs) -> SpecBuilder {
    let builder = SpecBuilder::new(&args.spec);
    match &args.schema {
        Some(schema) => builder.with_schema(schema),
        None => builder,
    }
}

fn source_format(arg: SourceFormatArg) -> SourceFormat {
    match arg {
        SourceFormatArg::Auto => SourceFormat::Auto,
        SourceFormatArg::Csv => SourceFormat::Csv,
        SourceFormatArg::Parquet => SourceFormat::Parquet,
    }
}

fn output_format(arg: OutputFormatArg) -> OutputFormat {
    match arg {
        OutputFormatArg::Parquet => OutputFormat::Parquet,
        OutputFormatArg::Csv => OutputFormat::Csv,
    }
}
