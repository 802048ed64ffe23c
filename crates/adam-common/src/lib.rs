//! Shared utilities for the ADaM derivation crates.
//!
//! This crate provides Polars `AnyValue` helpers used across the workspace
//! for rendering key tuples, comparing values and parsing numbers.

pub mod polars;

pub use self::polars::{
    any_to_f64, any_to_string, any_to_string_non_empty, format_numeric, is_missing_value,
    parse_f64, parse_i64,
};
