use thiserror::Error;

use crate::enums::DerivationKind;
use crate::expr::ExprError;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error(
        "derivation has no recognizable rule (expected one of: constant, source, aggregation, cut, condition, function)"
    )]
    UnknownKind,
    #[error("{kind} derivation is missing required field '{field}'")]
    MissingField {
        kind: DerivationKind,
        field: &'static str,
    },
    #[error("invalid column reference: {0}")]
    InvalidReference(String),
    #[error("invalid expression in '{field}': {source}")]
    Expression {
        field: String,
        #[source]
        source: ExprError,
    },
}

pub type Result<T> = std::result::Result<T, ModelError>;
