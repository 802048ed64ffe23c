//! Engine configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// File format of source tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Parquet when present, CSV otherwise.
    #[default]
    Auto,
    Csv,
    Parquet,
}

impl SourceFormat {
    pub const ALL: [SourceFormat; 3] = [SourceFormat::Auto, SourceFormat::Csv, SourceFormat::Parquet];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Auto => "auto",
            SourceFormat::Csv => "csv",
            SourceFormat::Parquet => "parquet",
        }
    }

    /// File extensions to try, in order of preference.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            SourceFormat::Auto => &["parquet", "csv"],
            SourceFormat::Csv => &["csv"],
            SourceFormat::Parquet => &["parquet"],
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        SourceFormat::ALL
            .into_iter()
            .find(|format| format.as_str() == normalized)
            .ok_or_else(|| format!("Unknown source format: {s}"))
    }
}

/// Options controlling a derivation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Directory holding one table per source domain.
    pub source_dir: Option<PathBuf>,

    pub source_format: SourceFormat,

    /// Domain whose key tuples seed the dataset when no key column names
    /// one. Falls back to `DM`.
    pub key_domain: Option<String>,

    /// Load source domains on separate threads.
    pub parallel_load: bool,

    /// Convert each derived column to its declared type.
    pub coerce_types: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            source_dir: None,
            source_format: SourceFormat::default(),
            key_domain: None,
            parallel_load: true,
            coerce_types: true,
        }
    }
}

impl EngineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(dir.into());
        self
    }

    pub fn with_source_format(mut self, format: SourceFormat) -> Self {
        self.source_format = format;
        self
    }

    pub fn with_key_domain(mut self, domain: impl Into<String>) -> Self {
        self.key_domain = Some(domain.into());
        self
    }

    pub fn with_parallel_load(mut self, enable: bool) -> Self {
        self.parallel_load = enable;
        self
    }

    pub fn with_coerce_types(mut self, enable: bool) -> Self {
        self.coerce_types = enable;
        self
    }
}
