//! Source namespace loading.
//!
//! Every domain a specification reads is loaded once per run. Non-key
//! columns are renamed `DOMAIN.column` so that tables from several domains
//! can sit side by side; key columns keep their names so they stay joinable.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use adam_model::Specification;
use polars::prelude::*;
use tracing::{debug, info};

use crate::error::{DeriveError, Result};
use crate::options::{EngineOptions, SourceFormat};

/// Domain that seeds the key tuples when nothing else names one.
pub const DEFAULT_KEY_DOMAIN: &str = "DM";

/// Backing storage for source tables.
pub trait SourceStore: Send + Sync {
    /// Loads the raw table for `domain`, with its original column names.
    fn load(&self, domain: &str) -> Result<DataFrame>;

    /// Where the store reads from, for messages.
    fn describe(&self) -> String;
}

/// One file per domain in a directory: `dm.parquet`, `DM.csv`, ...
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
    format: SourceFormat,
}

impl DirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            format: SourceFormat::Auto,
        }
    }

    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = format;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `domain`, if any. Parquet is preferred in auto mode.
    pub fn locate(&self, domain: &str) -> Option<PathBuf> {
        let stems = [domain.to_lowercase(), domain.to_uppercase()];
        self.format.extensions().iter().find_map(|extension| {
            stems
                .iter()
                .map(|stem| self.dir.join(format!("{stem}.{extension}")))
                .find(|path| path.is_file())
        })
    }
}

impl SourceStore for DirectoryStore {
    fn load(&self, domain: &str) -> Result<DataFrame> {
        let path = self.locate(domain).ok_or_else(|| DeriveError::MissingSource {
            domain: domain.to_string(),
            reason: format!(
                "no {} file in {}",
                self.format.extensions().join(" or "),
                self.dir.display()
            ),
        })?;
        debug!(domain, path = %path.display(), "reading source table");
        read_table(&path)
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

/// Reads a Parquet or CSV file by extension.
pub fn read_table(path: &Path) -> Result<DataFrame> {
    let read_error = |message: String| DeriveError::SourceRead {
        location: path.display().to_string(),
        message,
    };
    let is_parquet = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("parquet"));

    if is_parquet {
        let file = File::open(path).map_err(|e| read_error(e.to_string()))?;
        ParquetReader::new(file)
            .finish()
            .map_err(|e| read_error(e.to_string()))
    } else {
        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(100))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .map_err(|e| read_error(e.to_string()))?
            .finish()
            .map_err(|e| read_error(e.to_string()))
    }
}

/// Tables held in memory, keyed by domain.
#[derive(Debug, Clone, Default)]
pub struct FrameStore {
    tables: HashMap<String, DataFrame>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, domain: impl Into<String>, frame: DataFrame) {
        self.tables.insert(domain.into().to_uppercase(), frame);
    }

    pub fn with_table(mut self, domain: impl Into<String>, frame: DataFrame) -> Self {
        self.insert(domain, frame);
        self
    }
}

impl SourceStore for FrameStore {
    fn load(&self, domain: &str) -> Result<DataFrame> {
        self.tables
            .get(&domain.to_uppercase())
            .cloned()
            .ok_or_else(|| DeriveError::MissingSource {
                domain: domain.to_string(),
                reason: "no table registered".to_string(),
            })
    }

    fn describe(&self) -> String {
        "in-memory tables".to_string()
    }
}

/// Domain whose distinct key tuples seed the derived dataset.
pub fn key_domain(spec: &Specification, options: &EngineOptions) -> String {
    spec.key_domain()
        .map(str::to_string)
        .or_else(|| options.key_domain.clone())
        .unwrap_or_else(|| DEFAULT_KEY_DOMAIN.to_string())
        .to_uppercase()
}

/// Read-only source tables for one run, keyed by domain.
#[derive(Debug, Clone)]
pub struct SourceNamespace {
    key: Vec<String>,
    tables: BTreeMap<String, Arc<DataFrame>>,
}

impl SourceNamespace {
    /// Loads every domain `spec` reads, plus the key domain.
    pub fn load(
        spec: &Specification,
        store: &dyn SourceStore,
        options: &EngineOptions,
    ) -> Result<Self> {
        let start = Instant::now();
        let required = spec.source_columns();
        let mut domains: BTreeSet<String> = required.keys().map(|d| d.to_uppercase()).collect();
        domains.insert(key_domain(spec, options));

        let loaded = load_all(store, &domains, options.parallel_load);

        let mut tables = BTreeMap::new();
        for (domain, frame) in loaded {
            let frame = frame?;
            let columns = required
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&domain))
                .map(|(_, columns)| columns.clone())
                .unwrap_or_default();
            let frame = namespace_frame(&domain, frame, &spec.key, &columns)?;
            debug!(
                domain = %domain,
                rows = frame.height(),
                columns = frame.width(),
                "source domain loaded"
            );
            tables.insert(domain, Arc::new(frame));
        }

        info!(
            source = %store.describe(),
            domains = tables.len(),
            rows = tables.values().map(|t| t.height()).sum::<usize>(),
            duration_ms = start.elapsed().as_millis(),
            "source namespace loaded"
        );
        Ok(Self {
            key: spec.key.clone(),
            tables,
        })
    }

    /// Builds a namespace from raw tables without a store.
    pub fn from_tables(
        key: Vec<String>,
        tables: impl IntoIterator<Item = (String, DataFrame)>,
    ) -> Result<Self> {
        let mut out = BTreeMap::new();
        for (domain, frame) in tables {
            let domain = domain.to_uppercase();
            let frame = namespace_frame(&domain, frame, &key, &BTreeSet::new())?;
            out.insert(domain, Arc::new(frame));
        }
        Ok(Self { key, tables: out })
    }

    pub fn key(&self) -> &[String] {
        &self.key
    }

    pub fn get(&self, domain: &str) -> Option<&Arc<DataFrame>> {
        self.tables.get(&domain.to_uppercase())
    }

    /// The table for `domain`, or `MissingSource`.
    pub fn table(&self, domain: &str) -> Result<&DataFrame> {
        self.get(domain)
            .map(|table| &**table)
            .ok_or_else(|| DeriveError::MissingSource {
                domain: domain.to_string(),
                reason: "domain was not loaded".to_string(),
            })
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

fn load_all(
    store: &dyn SourceStore,
    domains: &BTreeSet<String>,
    parallel: bool,
) -> Vec<(String, Result<DataFrame>)> {
    if !parallel || domains.len() < 2 {
        return domains
            .iter()
            .map(|domain| (domain.clone(), store.load(domain)))
            .collect();
    }

    std::thread::scope(|scope| {
        let handles: Vec<_> = domains
            .iter()
            .map(|domain| (domain, scope.spawn(move || store.load(domain))))
            .collect();
        handles
            .into_iter()
            .map(|(domain, handle)| {
                let result = handle.join().unwrap_or_else(|_| {
                    Err(DeriveError::SourceRead {
                        location: domain.clone(),
                        message: "loader thread panicked".to_string(),
                    })
                });
                (domain.clone(), result)
            })
            .collect()
    })
}

/// Checks key and referenced columns, then renames non-key columns.
fn namespace_frame(
    domain: &str,
    mut frame: DataFrame,
    key: &[String],
    required: &BTreeSet<String>,
) -> Result<DataFrame> {
    let present: BTreeSet<String> = frame
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();

    if let Some(missing) = key.iter().find(|column| !present.contains(*column)) {
        return Err(DeriveError::MissingSource {
            domain: domain.to_string(),
            reason: format!("key column {missing} is missing"),
        });
    }
    let missing: Vec<&str> = required
        .iter()
        .filter(|column| !present.contains(*column) && !key.contains(*column))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(DeriveError::MissingSource {
            domain: domain.to_string(),
            reason: format!("referenced columns missing: {}", missing.join(", ")),
        });
    }

    let renamed: Vec<String> = frame
        .get_column_names()
        .into_iter()
        .map(|name| {
            if key.iter().any(|k| k == name.as_str()) {
                name.to_string()
            } else {
                format!("{domain}.{name}")
            }
        })
        .collect();
    frame.set_column_names(renamed)?;
    Ok(frame)
}
