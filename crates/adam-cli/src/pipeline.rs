//! The build pipeline behind `adam build`: load the specification, read the
//! source domains, derive, optionally check, and write.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use adam_derive::{
    DerivationEngine, DirectoryStore, EngineOptions, ProgressObserver, SourceNamespace,
};
use adam_spec::{LoadedSpec, SpecBuilder};
use adam_validate::{DatasetReport, validate_dataset};
use anyhow::{Context, Result};
use polars::prelude::DataFrame;
use tracing::{debug, info, info_span};

use crate::logging::redact_value;
use crate::output::{OutputFormat, write_dataset};

/// Everything `build` needs to know besides the progress sink.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub spec: PathBuf,
    pub schema: Option<PathBuf>,
    /// Overrides the document's `source_dir`.
    pub source_dir: Option<PathBuf>,
    pub options: EngineOptions,
    pub output: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    /// Run the column `validation` rules on the result.
    pub check: bool,
    /// Skip writing the dataset.
    pub dry_run: bool,
}

impl BuildRequest {
    pub fn new(spec: impl Into<PathBuf>) -> Self {
        Self {
            spec: spec.into(),
            schema: None,
            source_dir: None,
            options: EngineOptions::default(),
            output: None,
            format: None,
            check: false,
            dry_run: false,
        }
    }

    pub fn with_schema(mut self, schema: Option<PathBuf>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_source_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.source_dir = dir;
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_output(mut self, output: Option<PathBuf>, format: Option<OutputFormat>) -> Self {
        self.output = output;
        self.format = format;
        self
    }

    pub fn with_check(mut self, enable: bool) -> Self {
        self.check = enable;
        self
    }

    pub fn with_dry_run(mut self, enable: bool) -> Self {
        self.dry_run = enable;
        self
    }

    /// Explicit format, else the output extension, else Parquet.
    pub fn output_format(&self) -> OutputFormat {
        self.format
            .or_else(|| self.output.as_deref().and_then(OutputFormat::from_path))
            .unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct BuildOutcome {
    pub loaded: LoadedSpec,
    pub dataset: DataFrame,
    pub source_dir: PathBuf,
    /// Where the dataset was written; `None` on a dry run.
    pub output: Option<PathBuf>,
    pub report: Option<DatasetReport>,
    pub duration: Duration,
}

impl BuildOutcome {
    pub fn has_errors(&self) -> bool {
        self.report.as_ref().is_some_and(DatasetReport::has_errors)
    }
}

/// Loads, merges, validates and resolves the document at `path`.
pub fn load_spec(path: &Path, schema: Option<&Path>) -> Result<LoadedSpec> {
    let mut builder = SpecBuilder::new(path);
    if let Some(schema) = schema {
        builder = builder.with_schema(schema);
    }
    builder
        .build()
        .with_context(|| format!("load specification {}", path.display()))
}

/// `<domain>.<ext>` next to the leaf document.
pub fn default_output_path(loaded: &LoadedSpec, format: OutputFormat) -> PathBuf {
    loaded.base_dir().join(format!(
        "{}.{}",
        loaded.specification.domain.to_lowercase(),
        format.extension()
    ))
}

pub fn build(request: &BuildRequest, observer: &dyn ProgressObserver) -> Result<BuildOutcome> {
    let start = Instant::now();
    let loaded = load_spec(&request.spec, request.schema.as_deref())?;
    let spec = loaded.specification.clone();
    let span = info_span!("build", dataset = %spec.domain);
    let _guard = span.enter();

    let source_dir = request
        .source_dir
        .clone()
        .or_else(|| loaded.source_dir())
        .unwrap_or_else(|| loaded.base_dir().to_path_buf());
    let options = request.options.clone().with_source_dir(&source_dir);
    let store = DirectoryStore::new(&source_dir).with_format(options.source_format);

    let sources = SourceNamespace::load(&spec, &store, &options)
        .with_context(|| format!("load source domains from {}", source_dir.display()))?;
    let mut dataset = DerivationEngine::new(spec.clone(), sources)
        .with_options(options)
        .build_with(observer)
        .with_context(|| format!("derive {}", spec.domain))?;

    let report = request.check.then(|| validate_dataset(&dataset, &spec));
    if let Some(report) = &report {
        for issue in &report.issues {
            let detail = issue.message();
            debug!(
                code = issue.code(),
                column = issue.column(),
                detail = redact_value(&detail),
                "dataset issue"
            );
        }
    }

    let output = if request.dry_run {
        None
    } else {
        let format = request.output_format();
        let path = request
            .output
            .clone()
            .unwrap_or_else(|| default_output_path(&loaded, format));
        write_dataset(&mut dataset, &path, format)?;
        Some(path)
    };

    let duration = start.elapsed();
    info!(
        dataset = %spec.domain,
        rows = dataset.height(),
        columns = dataset.width(),
        output = %output.as_deref().map(|p| p.display().to_string()).unwrap_or_default(),
        duration_ms = duration.as_millis(),
        "build complete"
    );

    Ok(BuildOutcome {
        loaded,
        dataset,
        source_dir,
        output,
        report,
        duration,
    })
}
