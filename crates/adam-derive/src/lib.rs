//! Derivation of ADaM datasets from SDTM source tables.
//!
//! # Pipeline
//!
//! 1. [`SourceNamespace::load`] reads every domain a [`Specification`] refers
//!    to, once, renaming non-key columns `DOMAIN.column`.
//! 2. [`DerivationEngine::build`] seeds the target table with the key tuples
//!    of the key domain.
//! 3. Each declared column is computed by [`dispatch`] in document order and
//!    converted to its declared type.
//!
//! Every derived column holds exactly one value per key tuple; a source that
//! resolves to more than one distinct value for a key fails the build with
//! [`DeriveError::KeyUniquenessViolation`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use adam_derive::{DirectoryStore, EngineOptions, derive};
//! # fn run(spec: adam_model::Specification) -> adam_derive::Result<()> {
//! let store = DirectoryStore::new("data/sdtm");
//! let adsl = derive(Arc::new(spec), &store, EngineOptions::default())?;
//! println!("{adsl}");
//! # Ok(())
//! # }
//! ```
//!
//! [`Specification`]: adam_model::Specification

pub mod coerce;
pub mod compile;
pub mod engine;
pub mod error;
pub mod executors;
pub mod frame;
pub mod functions;
pub mod options;
pub mod source;
pub mod temporal;

pub use coerce::coerce;
pub use engine::{DerivationEngine, NoProgress, ProgressObserver, derive};
pub use error::{DeriveError, Result};
pub use executors::{DerivationContext, dispatch};
pub use functions::{DeriveFn, FunctionArgs, FunctionRegistry};
pub use options::{EngineOptions, SourceFormat};
pub use source::{
    DEFAULT_KEY_DOMAIN, DirectoryStore, FrameStore, SourceNamespace, SourceStore, key_domain,
    read_table,
};
