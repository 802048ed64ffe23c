//! Column presence and key uniqueness.

use std::collections::HashSet;

use adam_common::any_to_string;
use adam_model::Specification;
use polars::prelude::{AnyValue, DataFrame};

use crate::checks::MAX_SAMPLES;
use crate::issue::Issue;

/// Declared and key columns absent from `df`.
pub fn check_columns(spec: &Specification, df: &DataFrame) -> Vec<Issue> {
    let mut issues = Vec::new();
    for key in &spec.key {
        if df.column(key).is_err() {
            issues.push(Issue::KeyColumnMissing {
                column: key.clone(),
            });
        }
    }
    for column in &spec.columns {
        if spec.is_key(&column.name) {
            continue;
        }
        if df.column(&column.name).is_err() {
            issues.push(Issue::ColumnMissing {
                column: column.name.clone(),
            });
        }
    }
    issues
}

/// Rows repeating an earlier key tuple. Skipped when a key column is absent.
pub fn check_keys(spec: &Specification, df: &DataFrame) -> Vec<Issue> {
    let Ok(columns) = spec
        .key
        .iter()
        .map(|name| df.column(name))
        .collect::<Result<Vec<_>, _>>()
    else {
        return Vec::new();
    };
    if columns.is_empty() {
        return Vec::new();
    }

    let mut seen = HashSet::with_capacity(df.height());
    let mut duplicate_count = 0u64;
    let mut samples = Vec::new();
    for idx in 0..df.height() {
        let tuple: Vec<String> = columns
            .iter()
            .map(|column| any_to_string(column.get(idx).unwrap_or(AnyValue::Null)))
            .collect();
        let rendered = tuple.join(", ");
        if !seen.insert(tuple) {
            duplicate_count += 1;
            if samples.len() < MAX_SAMPLES && !samples.contains(&rendered) {
                samples.push(rendered);
            }
        }
    }

    if duplicate_count == 0 {
        return Vec::new();
    }
    vec![Issue::DuplicateKey {
        key: spec.key.join(", "),
        duplicate_count,
        samples,
    }]
}
