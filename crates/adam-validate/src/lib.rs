//! Checks of derived ADaM datasets against their specification.
//!
//! [`validate_dataset`] looks for missing declared and key columns, repeated
//! key tuples, and violations of each column's `validation` rule. All issues
//! are collected; nothing stops at the first finding.

pub mod checks;
pub mod issue;
pub mod report;

pub use issue::{Issue, Severity};
pub use report::DatasetReport;

use std::time::Instant;

use adam_model::Specification;
use polars::prelude::DataFrame;
use tracing::{debug, info};

/// Validates `df` against the columns and rules declared in `spec`.
pub fn validate_dataset(df: &DataFrame, spec: &Specification) -> DatasetReport {
    let start = Instant::now();
    let mut report = DatasetReport::new(&spec.domain, df.height());

    report.issues.extend(checks::structure::check_columns(spec, df));
    report.issues.extend(checks::structure::check_keys(spec, df));

    for column in &spec.columns {
        let Some(rule) = &column.validation else {
            continue;
        };
        let Ok(series) = df.column(&column.name) else {
            continue;
        };
        let found = checks::values::check(&column.name, rule, series);
        debug!(column = %column.name, issues = found.len(), "checked column");
        report.issues.extend(found);
    }

    info!(
        dataset = %spec.domain,
        rows = report.rows,
        errors = report.error_count(),
        warnings = report.warning_count(),
        duration_ms = start.elapsed().as_millis(),
        "dataset validation complete"
    );
    report
}
