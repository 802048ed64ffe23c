use std::path::PathBuf;

use thiserror::Error;

use crate::schema::ValidationReport;

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("circular parent reference: {}", chain.join(" -> "))]
    MergeCycle { chain: Vec<String> },

    #[error("parent '{parent}' referenced by '{referenced_by}' was not found")]
    UnresolvedParent {
        parent: String,
        referenced_by: String,
    },

    #[error("specification document not found: {0}")]
    DocumentNotFound(String),

    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {document}: {source}")]
    YamlParse {
        document: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("cannot include '{path}': {message}")]
    Include { path: PathBuf, message: String },

    #[error(
        "specification failed schema validation ({} error(s), {} warning(s))",
        .0.error_count(),
        .0.warning_count()
    )]
    SchemaValidation(ValidationReport),

    #[error("invalid derivation for column {column}: {source}")]
    InvalidDerivation {
        column: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid specification document {document}: {message}")]
    InvalidDocument { document: String, message: String },
}

pub type Result<T> = std::result::Result<T, SpecError>;
