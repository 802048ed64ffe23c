//! Error types for dataset derivation.

use polars::prelude::PolarsError;
use thiserror::Error;

/// Errors raised while loading sources or deriving columns.
#[derive(Debug, Error)]
pub enum DeriveError {
    /// A referenced domain, column or key column is not available.
    #[error("source domain {domain} is not available: {reason}")]
    MissingSource { domain: String, reason: String },

    /// The rule cannot be executed as written.
    #[error("invalid derivation: {0}")]
    InvalidDerivationSpec(String),

    #[error("unknown function '{name}' (registered: {available})")]
    UnknownFunction { name: String, available: String },

    /// More than one distinct value resolved for a single key.
    #[error(
        "key {key} resolves to {} distinct values: {}",
        .values.len(),
        .values.join(", ")
    )]
    KeyUniquenessViolation { key: String, values: Vec<String> },

    #[error("value {value} in column {column} cannot be converted to {expected}")]
    TypeMismatch {
        column: String,
        value: String,
        expected: String,
    },

    #[error("function '{name}' failed: {message}")]
    Function { name: String, message: String },

    #[error("failed to read source {location}: {message}")]
    SourceRead { location: String, message: String },

    #[error(transparent)]
    Polars(#[from] PolarsError),

    /// Failure while deriving a specific column.
    #[error("column {column}: {source}")]
    Column {
        column: String,
        #[source]
        source: Box<DeriveError>,
    },
}

impl DeriveError {
    /// The underlying error when wrapped in [`DeriveError::Column`].
    pub fn root(&self) -> &DeriveError {
        match self {
            DeriveError::Column { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type for derivation operations.
pub type Result<T> = std::result::Result<T, DeriveError>;
