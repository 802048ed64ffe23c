//! Specification documents: loading, inheritance, validation and resolution.
//!
//! A leaf document names its ancestors in `parents`; [`merge_chain`] folds
//! the chain into one document, [`validate`] checks it against a
//! [`SchemaRules`] document and [`resolve`] turns it into the typed
//! [`adam_model::Specification`]. [`SpecBuilder`] runs the whole sequence for
//! a file on disk.

pub mod error;
pub mod merge;
pub mod resolve;
pub mod schema;
pub mod store;

pub use error::{Result, SpecError};
pub use merge::{deep_merge, derivation_kind, merge_chain, merge_documents, parent_references};
pub use resolve::{LoadedSpec, SpecBuilder, fingerprint, resolve};
pub use schema::{
    FieldRule, SchemaRules, Severity, TypeSpec, ValidationIssue, ValidationReport, validate,
};
pub use store::{DocumentStore, FileStore, MemoryStore, expand_includes};
