//! Dataset issue types.
//!
//! Each variant carries only the data its message needs.

use serde::{Deserialize, Serialize};

/// Issue severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The dataset does not meet its specification
    Error,
    /// Should review
    Warning,
}

impl Severity {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warning" => Some(Self::Warning),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warning => "Warning",
        }
    }
}

/// Dataset issue - each variant carries only its needed data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
    // Structure checks
    /// Declared column is absent from the dataset
    ColumnMissing { column: String },
    /// Key column is absent from the dataset
    KeyColumnMissing { column: String },
    /// Key tuple occurs on more than one row
    DuplicateKey {
        key: String,
        duplicate_count: u64,
        samples: Vec<String>,
    },

    // Presence checks
    /// Column declared `not_null` has missing values
    NullValues { column: String, null_count: u64 },
    /// Share of missing values exceeds `maximum_missing_percentage`
    TooManyMissing {
        column: String,
        missing_percentage: f64,
        allowed_percentage: f64,
    },

    // Value checks
    /// Column declared `unique` repeats a value
    DuplicateValues {
        column: String,
        duplicate_count: u64,
        samples: Vec<String>,
    },
    /// Values outside `allowed_values`
    ValueNotAllowed {
        column: String,
        invalid_count: u64,
        invalid_values: Vec<String>,
    },
    /// Values below `min`
    BelowMinimum {
        column: String,
        count: u64,
        minimum: String,
        lowest: String,
    },
    /// Values above `max`
    AboveMaximum {
        column: String,
        count: u64,
        maximum: String,
        highest: String,
    },
    /// Values not matching `pattern`
    PatternMismatch {
        column: String,
        pattern: String,
        mismatch_count: u64,
        samples: Vec<String>,
    },
    /// `pattern` is not a valid regular expression
    InvalidPattern {
        column: String,
        pattern: String,
        message: String,
    },
    /// Text length outside `length`
    LengthOutOfRange {
        column: String,
        count: u64,
        min: Option<usize>,
        max: Option<usize>,
    },
}

impl Issue {
    /// Short identifier of the check that raised the issue.
    pub fn code(&self) -> &'static str {
        match self {
            Issue::ColumnMissing { .. } => "column_missing",
            Issue::KeyColumnMissing { .. } => "key_column_missing",
            Issue::DuplicateKey { .. } => "duplicate_key",
            Issue::NullValues { .. } => "not_null",
            Issue::TooManyMissing { .. } => "maximum_missing_percentage",
            Issue::DuplicateValues { .. } => "unique",
            Issue::ValueNotAllowed { .. } => "allowed_values",
            Issue::BelowMinimum { .. } => "min",
            Issue::AboveMaximum { .. } => "max",
            Issue::PatternMismatch { .. } | Issue::InvalidPattern { .. } => "pattern",
            Issue::LengthOutOfRange { .. } => "length",
        }
    }

    /// Column the issue is about; the key columns for duplicate keys.
    pub fn column(&self) -> &str {
        match self {
            Issue::ColumnMissing { column }
            | Issue::KeyColumnMissing { column }
            | Issue::NullValues { column, .. }
            | Issue::TooManyMissing { column, .. }
            | Issue::DuplicateValues { column, .. }
            | Issue::ValueNotAllowed { column, .. }
            | Issue::BelowMinimum { column, .. }
            | Issue::AboveMaximum { column, .. }
            | Issue::PatternMismatch { column, .. }
            | Issue::InvalidPattern { column, .. }
            | Issue::LengthOutOfRange { column, .. } => column,
            Issue::DuplicateKey { key, .. } => key,
        }
    }

    /// Count of offending rows (if applicable).
    pub fn count(&self) -> Option<u64> {
        match self {
            Issue::ColumnMissing { .. }
            | Issue::KeyColumnMissing { .. }
            | Issue::TooManyMissing { .. }
            | Issue::InvalidPattern { .. } => None,
            Issue::DuplicateKey {
                duplicate_count, ..
            }
            | Issue::DuplicateValues {
                duplicate_count, ..
            } => Some(*duplicate_count),
            Issue::NullValues { null_count, .. } => Some(*null_count),
            Issue::ValueNotAllowed { invalid_count, .. } => Some(*invalid_count),
            Issue::BelowMinimum { count, .. }
            | Issue::AboveMaximum { count, .. }
            | Issue::LengthOutOfRange { count, .. } => Some(*count),
            Issue::PatternMismatch { mismatch_count, .. } => Some(*mismatch_count),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Issue::TooManyMissing { .. }
            | Issue::InvalidPattern { .. }
            | Issue::LengthOutOfRange { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Issue::ColumnMissing { column } => format!("Column {column} is missing"),
            Issue::KeyColumnMissing { column } => format!("Key column {column} is missing"),
            Issue::DuplicateKey {
                key,
                duplicate_count,
                samples,
            } => format!(
                "Key ({key}) has {duplicate_count} duplicate rows{}",
                sample_suffix(samples)
            ),
            Issue::NullValues { column, null_count } => {
                format!("Column {column} has {null_count} missing values")
            }
            Issue::TooManyMissing {
                column,
                missing_percentage,
                allowed_percentage,
            } => format!(
                "Column {column} is {missing_percentage:.1}% missing (allowed {allowed_percentage}%)"
            ),
            Issue::DuplicateValues {
                column,
                duplicate_count,
                samples,
            } => format!(
                "Column {column} has {duplicate_count} repeated values{}",
                sample_suffix(samples)
            ),
            Issue::ValueNotAllowed {
                column,
                invalid_count,
                invalid_values,
            } => format!(
                "Column {column} has {invalid_count} values not allowed: {}",
                invalid_values.join(", ")
            ),
            Issue::BelowMinimum {
                column,
                count,
                minimum,
                lowest,
            } => format!("Column {column} has {count} values below {minimum} (lowest {lowest})"),
            Issue::AboveMaximum {
                column,
                count,
                maximum,
                highest,
            } => format!("Column {column} has {count} values above {maximum} (highest {highest})"),
            Issue::PatternMismatch {
                column,
                pattern,
                mismatch_count,
                samples,
            } => format!(
                "Column {column} has {mismatch_count} values not matching {pattern}{}",
                sample_suffix(samples)
            ),
            Issue::InvalidPattern {
                column,
                pattern,
                message,
            } => format!("Column {column} has an invalid pattern {pattern}: {message}"),
            Issue::LengthOutOfRange {
                column,
                count,
                min,
                max,
            } => {
                let bounds = match (min, max) {
                    (Some(min), Some(max)) => format!("{min}..={max}"),
                    (Some(min), None) => format!(">= {min}"),
                    (None, Some(max)) => format!("<= {max}"),
                    (None, None) => "any".to_string(),
                };
                format!("Column {column} has {count} values with length outside {bounds}")
            }
        }
    }
}

fn sample_suffix(samples: &[String]) -> String {
    if samples.is_empty() {
        String::new()
    } else {
        format!(" (e.g., {})", samples.join(", "))
    }
}
