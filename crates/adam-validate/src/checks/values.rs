//! Per-column value checks driven by a column's `validation` rule.
//!
//! Missing values (null, NaN, blank text) only count against `not_null` and
//! `maximum_missing_percentage`; every other check skips them.

use std::cmp::Ordering;
use std::collections::HashSet;

use adam_common::{any_to_f64, any_to_string, is_missing_value};
use adam_model::{Literal, ValidationRule};
use polars::prelude::{AnyValue, Column};
use regex::Regex;

use crate::checks::MAX_SAMPLES;
use crate::issue::Issue;

/// Distinct offending values listed for `allowed_values`.
const MAX_INVALID_VALUES: usize = 10;

/// Runs every check `rule` asks for against `column`.
pub fn check(name: &str, rule: &ValidationRule, column: &Column) -> Vec<Issue> {
    let values: Vec<AnyValue<'_>> = (0..column.len())
        .map(|idx| column.get(idx).unwrap_or(AnyValue::Null))
        .collect();
    let present: Vec<&AnyValue<'_>> = values
        .iter()
        .filter(|value| !is_missing_value(value))
        .collect();
    let missing = values.len() - present.len();

    let mut issues = Vec::new();
    if rule.not_null && missing > 0 {
        issues.push(Issue::NullValues {
            column: name.to_string(),
            null_count: missing as u64,
        });
    }
    if let Some(allowed) = rule.maximum_missing_percentage
        && !values.is_empty()
    {
        let percentage = missing as f64 * 100.0 / values.len() as f64;
        if percentage > allowed {
            issues.push(Issue::TooManyMissing {
                column: name.to_string(),
                missing_percentage: percentage,
                allowed_percentage: allowed,
            });
        }
    }
    if rule.unique {
        issues.extend(check_unique(name, &present));
    }
    if let Some(allowed) = &rule.allowed_values {
        issues.extend(check_allowed(name, allowed, &present));
    }
    if let Some(minimum) = &rule.min {
        issues.extend(check_bound(name, minimum, Ordering::Less, &present));
    }
    if let Some(maximum) = &rule.max {
        issues.extend(check_bound(name, maximum, Ordering::Greater, &present));
    }
    if let Some(pattern) = &rule.pattern {
        issues.extend(check_pattern(name, pattern, &present));
    }
    if let Some(length) = &rule.length {
        let count = present
            .iter()
            .map(|value| any_to_string((*value).clone()).chars().count())
            .filter(|len| {
                length.min.is_some_and(|min| *len < min) || length.max.is_some_and(|max| *len > max)
            })
            .count();
        if count > 0 {
            issues.push(Issue::LengthOutOfRange {
                column: name.to_string(),
                count: count as u64,
                min: length.min,
                max: length.max,
            });
        }
    }
    issues
}

fn check_unique(name: &str, present: &[&AnyValue<'_>]) -> Option<Issue> {
    let mut seen = HashSet::with_capacity(present.len());
    let mut duplicate_count = 0u64;
    let mut samples: Vec<String> = Vec::new();
    for value in present {
        let rendered = any_to_string((*value).clone());
        if seen.contains(&rendered) {
            duplicate_count += 1;
            if samples.len() < MAX_SAMPLES && !samples.contains(&rendered) {
                samples.push(rendered);
            }
        } else {
            seen.insert(rendered);
        }
    }
    (duplicate_count > 0).then(|| Issue::DuplicateValues {
        column: name.to_string(),
        duplicate_count,
        samples,
    })
}

fn check_allowed(name: &str, allowed: &[Literal], present: &[&AnyValue<'_>]) -> Option<Issue> {
    let allowed: HashSet<String> = allowed.iter().map(Literal::to_key).collect();
    let mut invalid_count = 0u64;
    let mut invalid_values: Vec<String> = Vec::new();
    for value in present {
        let rendered = any_to_string((*value).clone());
        if !allowed.contains(&rendered) {
            invalid_count += 1;
            if invalid_values.len() < MAX_INVALID_VALUES && !invalid_values.contains(&rendered) {
                invalid_values.push(rendered);
            }
        }
    }
    (invalid_count > 0).then(|| Issue::ValueNotAllowed {
        column: name.to_string(),
        invalid_count,
        invalid_values,
    })
}

/// Counts values on the wrong side of `bound`; `outside` is the ordering of
/// an offending value relative to the bound.
fn check_bound(
    name: &str,
    bound: &Literal,
    outside: Ordering,
    present: &[&AnyValue<'_>],
) -> Option<Issue> {
    let mut count = 0u64;
    let mut extreme: Option<&AnyValue<'_>> = None;
    for value in present {
        if compare(value, bound) != Some(outside) {
            continue;
        }
        count += 1;
        let further = extreme.is_none_or(|current| compare_values(value, current) == Some(outside));
        if further {
            extreme = Some(*value);
        }
    }
    let extreme = any_to_string(extreme?.clone());
    let bound = bound.to_key();
    Some(match outside {
        Ordering::Less => Issue::BelowMinimum {
            column: name.to_string(),
            count,
            minimum: bound,
            lowest: extreme,
        },
        _ => Issue::AboveMaximum {
            column: name.to_string(),
            count,
            maximum: bound,
            highest: extreme,
        },
    })
}

/// Numeric when the bound is a number, else by text (ISO dates order
/// correctly as text).
fn compare(value: &AnyValue<'_>, bound: &Literal) -> Option<Ordering> {
    if bound.is_numeric() {
        any_to_f64(value.clone())?.partial_cmp(&bound.as_f64()?)
    } else {
        Some(any_to_string(value.clone()).as_str().cmp(bound.to_key().as_str()))
    }
}

fn compare_values(a: &AnyValue<'_>, b: &AnyValue<'_>) -> Option<Ordering> {
    match (any_to_f64(a.clone()), any_to_f64(b.clone())) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => Some(any_to_string(a.clone()).cmp(&any_to_string(b.clone()))),
    }
}

/// The whole value must match.
fn check_pattern(name: &str, pattern: &str, present: &[&AnyValue<'_>]) -> Option<Issue> {
    let regex = match Regex::new(&format!("^(?:{pattern})$")) {
        Ok(regex) => regex,
        Err(error) => {
            return Some(Issue::InvalidPattern {
                column: name.to_string(),
                pattern: pattern.to_string(),
                message: error.to_string(),
            });
        }
    };
    let mut mismatch_count = 0u64;
    let mut samples: Vec<String> = Vec::new();
    for value in present {
        let rendered = any_to_string((*value).clone());
        if !regex.is_match(&rendered) {
            mismatch_count += 1;
            if samples.len() < MAX_SAMPLES && !samples.contains(&rendered) {
                samples.push(rendered);
            }
        }
    }
    (mismatch_count > 0).then(|| Issue::PatternMismatch {
        column: name.to_string(),
        pattern: pattern.to_string(),
        mismatch_count,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use adam_model::LengthRule;
    use polars::prelude::NamedFrom;

    fn ages() -> Column {
        Column::new("AGE".into(), &[Some(12i64), Some(40), None, Some(95), Some(40)])
    }

    #[test]
    fn missing_values() {
        let rule = ValidationRule {
            not_null: true,
            maximum_missing_percentage: Some(10.0),
            ..ValidationRule::default()
        };
        let issues = check("AGE", &rule, &ages());
        assert_eq!(
            issues,
            vec![
                Issue::NullValues {
                    column: "AGE".to_string(),
                    null_count: 1
                },
                Issue::TooManyMissing {
                    column: "AGE".to_string(),
                    missing_percentage: 20.0,
                    allowed_percentage: 10.0
                },
            ]
        );
    }

    #[test]
    fn numeric_bounds_report_extremes() {
        let rule = ValidationRule {
            min: Some(Literal::Int(18)),
            max: Some(Literal::Int(80)),
            ..ValidationRule::default()
        };
        let issues = check("AGE", &rule, &ages());
        assert_eq!(
            issues,
            vec![
                Issue::BelowMinimum {
                    column: "AGE".to_string(),
                    count: 1,
                    minimum: "18".to_string(),
                    lowest: "12".to_string()
                },
                Issue::AboveMaximum {
                    column: "AGE".to_string(),
                    count: 1,
                    maximum: "80".to_string(),
                    highest: "95".to_string()
                },
            ]
        );
    }

    #[test]
    fn date_bounds_compare_as_text() {
        let column = Column::new("TRTSDT".into(), &["2023-12-31", "2024-06-01"]);
        let rule = ValidationRule {
            min: Some(Literal::from("2024-01-01")),
            ..ValidationRule::default()
        };
        let issues = check("TRTSDT", &rule, &column);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].count(), Some(1));
    }

    #[test]
    fn unique_and_allowed_values() {
        let column = Column::new("SEX".into(), &["M", "F", "X", "M", ""]);
        let rule = ValidationRule {
            unique: true,
            allowed_values: Some(vec![Literal::from("M"), Literal::from("F")]),
            ..ValidationRule::default()
        };
        let issues = check("SEX", &rule, &column);
        assert_eq!(
            issues,
            vec![
                Issue::DuplicateValues {
                    column: "SEX".to_string(),
                    duplicate_count: 1,
                    samples: vec!["M".to_string()]
                },
                Issue::ValueNotAllowed {
                    column: "SEX".to_string(),
                    invalid_count: 1,
                    invalid_values: vec!["X".to_string()]
                },
            ]
        );
    }

    #[test]
    fn pattern_and_length() {
        let column = Column::new("USUBJID".into(), &["S1-001", "S1-02", "bad"]);
        let rule = ValidationRule {
            pattern: Some(r"S1-\d{3}".to_string()),
            length: Some(LengthRule {
                min: Some(5),
                max: Some(6),
            }),
            ..ValidationRule::default()
        };
        let issues = check("USUBJID", &rule, &column);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].count(), Some(2));
        assert_eq!(issues[1].code(), "length");
        assert_eq!(issues[1].count(), Some(1));

        let broken = ValidationRule {
            pattern: Some("(".to_string()),
            ..ValidationRule::default()
        };
        let issues = check("USUBJID", &broken, &column);
        assert_eq!(issues[0].code(), "pattern");
        assert!(matches!(issues[0], Issue::InvalidPattern { .. }));
    }
}
