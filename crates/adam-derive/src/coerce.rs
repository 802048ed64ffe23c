//! Conversion of derived columns to their declared type.
//!
//! Conversion is best effort: integral floats become integers, numeric text
//! is parsed, ISO text becomes dates. A non-null value that cannot be
//! represented in the declared type is a [`DeriveError::TypeMismatch`].

use adam_common::{any_to_f64, any_to_string, parse_f64, parse_i64};
use adam_model::ColumnType;
use polars::prelude::*;

use crate::error::{DeriveError, Result};
use crate::temporal::{any_to_datetime, epoch_days, epoch_millis};

/// Polars dtype a declared column type is stored as.
pub fn polars_dtype(column_type: ColumnType) -> DataType {
    match column_type {
        ColumnType::String => DataType::String,
        ColumnType::Integer => DataType::Int64,
        ColumnType::Float => DataType::Float64,
        ColumnType::Date => DataType::Date,
        ColumnType::Datetime => DataType::Datetime(TimeUnit::Milliseconds, None),
    }
}

/// True for integer and floating-point dtypes.
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Converts `column` to `column_type`.
pub fn coerce(column: &Column, column_type: ColumnType) -> Result<Column> {
    let target = polars_dtype(column_type);
    if column.dtype() == &target {
        return Ok(column.clone());
    }
    let name = column.name().clone();
    let series = column.as_materialized_series();
    let mismatch = |value: AnyValue<'_>| DeriveError::TypeMismatch {
        column: name.to_string(),
        value: describe(&value),
        expected: column_type.as_str().to_string(),
    };

    let converted = match column_type {
        ColumnType::String => {
            let values: Vec<Option<String>> = series
                .iter()
                .map(|value| match value {
                    AnyValue::Null => None,
                    AnyValue::Float64(v) if v.is_nan() => None,
                    other => Some(any_to_string(other)),
                })
                .collect();
            Column::new(name.clone(), values)
        }
        ColumnType::Integer => {
            let values = series
                .iter()
                .map(|value| to_integer(&value).map_err(|()| mismatch(value)))
                .collect::<Result<Vec<Option<i64>>>>()?;
            Column::new(name.clone(), values)
        }
        ColumnType::Float => {
            let values = series
                .iter()
                .map(|value| to_float(&value).map_err(|()| mismatch(value)))
                .collect::<Result<Vec<Option<f64>>>>()?;
            Column::new(name.clone(), values)
        }
        ColumnType::Date => {
            let values = series
                .iter()
                .map(|value| {
                    temporal(&value)
                        .map(|dt| dt.map(|dt| epoch_days(dt.date())))
                        .map_err(|()| mismatch(value))
                })
                .collect::<Result<Vec<Option<i32>>>>()?;
            Column::new(name.clone(), values).cast(&target)?
        }
        ColumnType::Datetime => {
            let values = series
                .iter()
                .map(|value| {
                    temporal(&value)
                        .map(|dt| dt.map(epoch_millis))
                        .map_err(|()| mismatch(value))
                })
                .collect::<Result<Vec<Option<i64>>>>()?;
            Column::new(name.clone(), values).cast(&target)?
        }
    };
    Ok(converted)
}

fn is_blank(value: &AnyValue<'_>) -> bool {
    match value {
        AnyValue::String(s) => s.trim().is_empty(),
        AnyValue::StringOwned(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn to_integer(value: &AnyValue<'_>) -> std::result::Result<Option<i64>, ()> {
    if value.is_null() || is_blank(value) {
        return Ok(None);
    }
    match value {
        AnyValue::Int8(v) => Ok(Some(i64::from(*v))),
        AnyValue::Int16(v) => Ok(Some(i64::from(*v))),
        AnyValue::Int32(v) => Ok(Some(i64::from(*v))),
        AnyValue::Int64(v) => Ok(Some(*v)),
        AnyValue::UInt8(v) => Ok(Some(i64::from(*v))),
        AnyValue::UInt16(v) => Ok(Some(i64::from(*v))),
        AnyValue::UInt32(v) => Ok(Some(i64::from(*v))),
        AnyValue::UInt64(v) => i64::try_from(*v).map(Some).map_err(|_| ()),
        AnyValue::Float32(v) => integral(f64::from(*v)),
        AnyValue::Float64(v) => integral(*v),
        AnyValue::String(s) => parse_integer(s),
        AnyValue::StringOwned(s) => parse_integer(s),
        _ => Err(()),
    }
}

fn integral(value: f64) -> std::result::Result<Option<i64>, ()> {
    if value.is_nan() {
        Ok(None)
    } else if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Ok(Some(value as i64))
    } else {
        Err(())
    }
}

fn parse_integer(text: &str) -> std::result::Result<Option<i64>, ()> {
    match parse_i64(text) {
        Some(v) => Ok(Some(v)),
        None => parse_f64(text).ok_or(()).and_then(integral),
    }
}

fn to_float(value: &AnyValue<'_>) -> std::result::Result<Option<f64>, ()> {
    if value.is_null() || is_blank(value) {
        return Ok(None);
    }
    match value {
        AnyValue::Float64(v) if v.is_nan() => Ok(None),
        AnyValue::Boolean(_) => Err(()),
        other => any_to_f64(other.clone()).map(Some).ok_or(()),
    }
}

fn temporal(value: &AnyValue<'_>) -> std::result::Result<Option<chrono::NaiveDateTime>, ()> {
    if value.is_null() || is_blank(value) {
        return Ok(None);
    }
    any_to_datetime(value.clone()).map(Some).ok_or(())
}

fn describe(value: &AnyValue<'_>) -> String {
    match value {
        AnyValue::String(s) => format!("'{s}'"),
        AnyValue::StringOwned(s) => format!("'{s}'"),
        other => any_to_string(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_floats_become_integers() {
        let column = Column::new("AGE".into(), &[Some(34.0), None, Some(58.0)]);
        let coerced = coerce(&column, ColumnType::Integer).expect("coerce");
        assert_eq!(coerced.dtype(), &DataType::Int64);
        let values: Vec<Option<i64>> = coerced.i64().expect("i64").into_iter().collect();
        assert_eq!(values, vec![Some(34), None, Some(58)]);
    }

    #[test]
    fn fractional_value_is_a_mismatch() {
        let column = Column::new("AGE".into(), &[34.5]);
        match coerce(&column, ColumnType::Integer) {
            Err(DeriveError::TypeMismatch {
                column,
                value,
                expected,
            }) => {
                assert_eq!(column, "AGE");
                assert_eq!(value, "34.5");
                assert_eq!(expected, "integer");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn text_to_numbers_and_back() {
        let text = Column::new("X".into(), &["1.5", " ", "2"]);
        let floats = coerce(&text, ColumnType::Float).expect("float");
        let values: Vec<Option<f64>> = floats.f64().expect("f64").into_iter().collect();
        assert_eq!(values, vec![Some(1.5), None, Some(2.0)]);

        let back = coerce(&floats, ColumnType::String).expect("string");
        let values: Vec<Option<&str>> = back.str().expect("str").into_iter().collect();
        assert_eq!(values, vec![Some("1.5"), None, Some("2")]);

        let bad = Column::new("X".into(), &["abc"]);
        assert!(coerce(&bad, ColumnType::Float).is_err());
    }

    #[test]
    fn iso_text_becomes_dates() {
        let column = Column::new("TRTSDT".into(), &[Some("2024-01-15"), Some("2024-02-01T09:00"), None]);
        let dates = coerce(&column, ColumnType::Date).expect("date");
        assert_eq!(dates.dtype(), &DataType::Date);
        assert_eq!(dates.null_count(), 1);

        let partial = Column::new("TRTSDT".into(), &["2024-01"]);
        assert!(coerce(&partial, ColumnType::Date).is_err());
    }

    #[test]
    fn matching_dtype_is_untouched() {
        let column = Column::new("N".into(), &[1i64, 2]);
        let coerced = coerce(&column, ColumnType::Integer).expect("coerce");
        assert!(
            coerced
                .as_materialized_series()
                .equals(column.as_materialized_series())
        );
    }
}
