//! Scalar access to Polars `AnyValue` cells.
//!
//! Key tuples, issue messages and type coercion all read cells through these
//! helpers so that `170.0` and `170` render the same way everywhere.

use polars::prelude::AnyValue;

/// Text form of a cell.
///
/// Nulls render empty, whole floats drop their fraction and booleans render
/// as `Y`/`N`.
///
/// ```
/// use adam_common::any_to_string;
/// use polars::prelude::AnyValue;
///
/// assert_eq!(any_to_string(AnyValue::Float64(170.0)), "170");
/// assert_eq!(any_to_string(AnyValue::UInt8(7)), "7");
/// assert_eq!(any_to_string(AnyValue::Null), "");
/// ```
pub fn any_to_string(value: AnyValue<'_>) -> String {
    if let Some(int) = integer(&value) {
        return int.to_string();
    }
    match value {
        AnyValue::Null => String::new(),
        AnyValue::Boolean(flag) => if flag { "Y" } else { "N" }.to_string(),
        AnyValue::String(text) => text.to_string(),
        AnyValue::StringOwned(text) => text.to_string(),
        AnyValue::Float32(v) => format_numeric(f64::from(v)),
        AnyValue::Float64(v) => format_numeric(v),
        other => other.to_string(),
    }
}

/// Like [`any_to_string`], but blank text counts as absent.
pub fn any_to_string_non_empty(value: AnyValue<'_>) -> Option<String> {
    Some(any_to_string(value)).filter(|text| !text.trim().is_empty())
}

/// Nulls, NaN and blank strings.
pub fn is_missing_value(value: &AnyValue<'_>) -> bool {
    match value {
        AnyValue::Null => true,
        AnyValue::String(text) => text.trim().is_empty(),
        AnyValue::StringOwned(text) => text.trim().is_empty(),
        AnyValue::Float32(v) => v.is_nan(),
        AnyValue::Float64(v) => v.is_nan(),
        _ => false,
    }
}

/// Renders whole numbers without a fractional part; `-0.0` becomes `"0"`.
///
/// ```
/// use adam_common::format_numeric;
///
/// assert_eq!(format_numeric(24.0), "24");
/// assert_eq!(format_numeric(24.25), "24.25");
/// ```
pub fn format_numeric(value: f64) -> String {
    let whole = value.trunc();
    if value == whole && whole.abs() < 1e15 {
        format!("{}", whole as i64)
    } else {
        value.to_string()
    }
}

/// Numeric value of a cell. Text is parsed; NaN and non-numeric values give
/// `None`.
pub fn any_to_f64(value: AnyValue<'_>) -> Option<f64> {
    if let Some(int) = integer(&value) {
        return Some(int as f64);
    }
    match value {
        AnyValue::UInt64(v) => Some(v as f64),
        AnyValue::Float32(v) => Some(f64::from(v)).filter(|v| !v.is_nan()),
        AnyValue::Float64(v) => Some(v).filter(|v| !v.is_nan()),
        AnyValue::String(text) => parse_f64(text),
        AnyValue::StringOwned(text) => parse_f64(&text),
        _ => None,
    }
}

/// Parses trimmed text as a float; blank text and `NaN` give `None`.
pub fn parse_f64(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Parses trimmed text as an integer.
pub fn parse_i64(text: &str) -> Option<i64> {
    text.trim().parse().ok()
}

fn integer(value: &AnyValue<'_>) -> Option<i64> {
    match *value {
        AnyValue::Int8(v) => Some(v.into()),
        AnyValue::Int16(v) => Some(v.into()),
        AnyValue::Int32(v) => Some(v.into()),
        AnyValue::Int64(v) => Some(v),
        AnyValue::UInt8(v) => Some(v.into()),
        AnyValue::UInt16(v) => Some(v.into()),
        AnyValue::UInt32(v) => Some(v.into()),
        AnyValue::UInt64(v) => i64::try_from(v).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_cells_for_keys_and_messages() {
        assert_eq!(any_to_string(AnyValue::Int64(-100)), "-100");
        assert_eq!(any_to_string(AnyValue::Float64(1.5)), "1.5");
        assert_eq!(any_to_string(AnyValue::Float32(-0.0)), "0");
        assert_eq!(any_to_string(AnyValue::Boolean(true)), "Y");
        assert_eq!(any_to_string(AnyValue::String("S1-001")), "S1-001");
        assert_eq!(any_to_string_non_empty(AnyValue::String("  ")), None);
    }

    #[test]
    fn missing_values() {
        assert!(is_missing_value(&AnyValue::Null));
        assert!(is_missing_value(&AnyValue::String(" ")));
        assert!(is_missing_value(&AnyValue::Float64(f64::NAN)));
        assert!(!is_missing_value(&AnyValue::Int64(0)));
        assert!(!is_missing_value(&AnyValue::String("N")));
    }

    #[test]
    fn numeric_reads() {
        assert_eq!(any_to_f64(AnyValue::Int32(42)), Some(42.0));
        assert_eq!(any_to_f64(AnyValue::UInt64(u64::MAX)), Some(u64::MAX as f64));
        assert_eq!(any_to_f64(AnyValue::String(" 2.5 ")), Some(2.5));
        assert_eq!(any_to_f64(AnyValue::String("NaN")), None);
        assert_eq!(any_to_f64(AnyValue::Boolean(true)), None);
        assert_eq!(parse_i64(" -7 "), Some(-7));
        assert_eq!(parse_i64("7.5"), None);
        assert_eq!(parse_f64(""), None);
    }

    #[test]
    fn format_handles_non_finite() {
        assert_eq!(format_numeric(f64::INFINITY), "inf");
        assert_eq!(format_numeric(1e20), "100000000000000000000");
    }
}
