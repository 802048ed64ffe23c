//! Data model for ADaM dataset specifications.
//!
//! A [`Specification`] lists the columns of one analysis dataset, each with a
//! [`Derivation`] rule describing how its values are computed from source
//! domains. Filters, conditions and cut rules are written in a small
//! predicate language parsed by [`expr`].

pub mod column_ref;
pub mod derivation;
pub mod enums;
pub mod error;
pub mod expr;
pub mod spec;
pub mod value;

pub use column_ref::ColumnRef;
pub use derivation::{
    AggregationRule, Branch, CategorizationRule, ConditionalRule, CutRule, Derivation,
    FunctionArg, FunctionRule, RawDerivation, SourceRule, ValueMap, ValueSource,
};
pub use enums::{AggregationFunction, ColumnType, CoreDesignation, DerivationKind};
pub use error::{ModelError, Result};
pub use expr::{CompareOp, CutPredicate, Expr, ExprError, Expression, Operand};
pub use spec::{Column, LengthRule, Specification, ValidationRule};
pub use value::{Literal, OrderedMap};
