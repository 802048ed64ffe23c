//! Dataset assembly.
//!
//! The engine seeds the target table with the distinct key tuples of the key
//! domain and then derives the declared columns one at a time, in document
//! order. A later column may read any earlier one. The first failing column
//! aborts the build.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use adam_model::Specification;
use polars::prelude::*;
use tracing::{debug, info, info_span, warn};

use crate::error::{DeriveError, Result};
use crate::executors::{DerivationContext, dispatch};
use crate::frame::{frame_keys, non_null_count};
use crate::functions::FunctionRegistry;
use crate::options::EngineOptions;
use crate::source::{SourceNamespace, SourceStore, key_domain};

/// Callbacks fired around each column derivation.
pub trait ProgressObserver {
    fn column_started(&self, _index: usize, _total: usize, _column: &str) {}

    fn column_finished(&self, _index: usize, _total: usize, _column: &str) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {}

/// Builds one derived dataset from a resolved specification.
#[derive(Debug, Clone)]
pub struct DerivationEngine {
    spec: Arc<Specification>,
    sources: SourceNamespace,
    registry: FunctionRegistry,
    options: EngineOptions,
}

impl DerivationEngine {
    /// Engine with the built-in functions and default options.
    pub fn new(spec: Arc<Specification>, sources: SourceNamespace) -> Self {
        Self {
            spec,
            sources,
            registry: FunctionRegistry::with_builtins(),
            options: EngineOptions::default(),
        }
    }

    /// Replaces the function registry. Merge custom functions into
    /// [`FunctionRegistry::with_builtins`] to keep the built-ins.
    pub fn with_registry(mut self, registry: FunctionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn spec(&self) -> &Specification {
        &self.spec
    }

    pub fn sources(&self) -> &SourceNamespace {
        &self.sources
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn build(&self) -> Result<DataFrame> {
        self.build_with(&NoProgress)
    }

    /// Builds the dataset, reporting each column to `observer`.
    pub fn build_with(&self, observer: &dyn ProgressObserver) -> Result<DataFrame> {
        let start = Instant::now();
        let spec = self.spec.as_ref();
        let ctx = DerivationContext::new(spec, &self.sources, &self.registry, &self.options);

        let mut target = self.seed()?;
        let columns: Vec<_> = spec
            .columns
            .iter()
            .filter(|column| !spec.is_key(&column.name))
            .collect();
        let total = columns.len();

        for (index, column) in columns.into_iter().enumerate() {
            observer.column_started(index, total, &column.name);
            let span = info_span!(
                "derive_column",
                column = %column.name,
                kind = %column.derivation.kind()
            );
            let _guard = span.enter();

            target = dispatch(column, &ctx, &target).map_err(|source| DeriveError::Column {
                column: column.name.clone(),
                source: Box::new(source),
            })?;
            debug!(
                non_null = target.column(&column.name).map(non_null_count).unwrap_or(0),
                rows = target.height(),
                "column derived"
            );
            observer.column_finished(index, total, &column.name);
        }

        let dataset = self.order_columns(&target)?;
        info!(
            dataset = %spec.domain,
            rows = dataset.height(),
            columns = dataset.width(),
            duration_ms = start.elapsed().as_millis(),
            "dataset derived"
        );
        Ok(dataset)
    }

    /// Distinct key tuples of the key domain, in first-seen order. Rows with
    /// a null key value are skipped.
    fn seed(&self) -> Result<DataFrame> {
        let key = &self.spec.key;
        let domain = key_domain(&self.spec, &self.options);
        let table = self.sources.table(&domain)?;
        let keys = table.select(key.iter().map(String::as_str))?;
        let columns = key
            .iter()
            .map(|name| keys.column(name))
            .collect::<PolarsResult<Vec<_>>>()?;

        let mut seen = HashSet::new();
        let mut rows: Vec<IdxSize> = Vec::new();
        let mut skipped = 0usize;
        for (row, tuple) in frame_keys(&keys, key)?.into_iter().enumerate() {
            let mut has_null = false;
            for column in &columns {
                has_null |= column.get(row)?.is_null();
            }
            if has_null {
                skipped += 1;
                continue;
            }
            if seen.insert(tuple) {
                rows.push(row as IdxSize);
            }
        }
        if skipped > 0 {
            warn!(domain = %domain, skipped, "key rows with null values skipped");
        }

        let seeded = keys.take(&IdxCa::from_vec("rows".into(), rows))?;
        debug!(domain = %domain, rows = seeded.height(), "target seeded");
        Ok(seeded)
    }

    /// Key columns not declared as columns first, then declaration order.
    fn order_columns(&self, target: &DataFrame) -> Result<DataFrame> {
        let spec = self.spec.as_ref();
        let names: Vec<&str> = spec
            .key
            .iter()
            .map(String::as_str)
            .filter(|key| spec.column(key).is_none())
            .chain(spec.column_names())
            .collect();
        Ok(target.select(names)?)
    }
}

/// Loads the sources `spec` reads from `store` and builds the dataset.
pub fn derive(
    spec: Arc<Specification>,
    store: &dyn SourceStore,
    options: EngineOptions,
) -> Result<DataFrame> {
    let sources = SourceNamespace::load(&spec, store, &options)?;
    DerivationEngine::new(spec, sources)
        .with_options(options)
        .build()
}
