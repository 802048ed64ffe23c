//! Key-tuple lookups and column construction.
//!
//! Every table taking part in a derivation carries the key columns under
//! their plain names. Rows are matched across tables by the rendered key
//! tuple, so a `USUBJID` stored as text in one table and as a category in
//! another still lines up.

use std::collections::{HashMap, HashSet};
use std::collections::hash_map::Entry;

use adam_common::any_to_string;
use adam_model::Literal;
use polars::prelude::*;

use crate::error::{DeriveError, Result};

/// Rendered key values of one row.
pub type KeyTuple = Vec<String>;

/// Key tuple of every row of `frame`, in row order.
pub fn frame_keys(frame: &DataFrame, key: &[String]) -> Result<Vec<KeyTuple>> {
    let columns = key
        .iter()
        .map(|name| frame.column(name))
        .collect::<PolarsResult<Vec<_>>>()?;
    (0..frame.height())
        .map(|row| {
            columns
                .iter()
                .map(|column| Ok(any_to_string(column.get(row)?)))
                .collect::<Result<KeyTuple>>()
        })
        .collect()
}

/// `USUBJID=01-001, PARAMCD=AGE` rendering used in messages.
pub fn describe_key(key: &[String], tuple: &[String]) -> String {
    key.iter()
        .zip(tuple)
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Maps each key tuple in `within` to its first row, checking that
/// `value_column` holds at most one distinct value per key.
///
/// Rows whose key is not in `within` are skipped unchecked. Null counts as a
/// value of its own, so a key with one null row and one populated row is
/// ambiguous too.
pub fn functional_index(
    frame: &DataFrame,
    key: &[String],
    value_column: &str,
    within: &[KeyTuple],
) -> Result<HashMap<KeyTuple, usize>> {
    let wanted: HashSet<&KeyTuple> = within.iter().collect();
    let keys = frame_keys(frame, key)?;
    let values = frame.column(value_column)?;
    let mut index: HashMap<KeyTuple, (usize, Option<String>)> =
        HashMap::with_capacity(wanted.len());

    for (row, tuple) in keys.into_iter().enumerate() {
        if !wanted.contains(&tuple) {
            continue;
        }
        let value = render(values.get(row)?);
        match index.entry(tuple) {
            Entry::Vacant(slot) => {
                slot.insert((row, value));
            }
            Entry::Occupied(slot) => {
                let (_, first) = slot.get();
                if *first != value {
                    return Err(DeriveError::KeyUniquenessViolation {
                        key: describe_key(key, slot.key()),
                        values: vec![display(first.as_deref()), display(value.as_deref())],
                    });
                }
            }
        }
    }

    Ok(index
        .into_iter()
        .map(|(tuple, (row, _))| (tuple, row))
        .collect())
}

/// First row of every key tuple, without a value check.
pub fn first_rows(frame: &DataFrame, key: &[String]) -> Result<HashMap<KeyTuple, usize>> {
    let mut index = HashMap::new();
    for (row, tuple) in frame_keys(frame, key)?.into_iter().enumerate() {
        index.entry(tuple).or_insert(row);
    }
    Ok(index)
}

/// Row of `index` matching each target key, `None` where the key is absent.
pub fn align(target_keys: &[KeyTuple], index: &HashMap<KeyTuple, usize>) -> Vec<Option<usize>> {
    target_keys
        .iter()
        .map(|tuple| index.get(tuple).copied())
        .collect()
}

/// Picks `rows` out of `column`; `None` rows become null.
pub fn gather(column: &Column, rows: &[Option<usize>], name: &str) -> Result<Column> {
    let indices = IdxCa::from_iter_options(
        "rows".into(),
        rows.iter().map(|row| row.map(|row| row as IdxSize)),
    );
    let taken = column.as_materialized_series().take(&indices)?;
    Ok(taken.with_name(name.into()).into_column())
}

/// Column of `height` copies of `value`.
pub fn literal_column(name: &str, value: &Literal, height: usize) -> Column {
    match value {
        Literal::Null => Column::full_null(name.into(), height, &DataType::String),
        Literal::Bool(v) => Column::new(name.into(), vec![*v; height]),
        Literal::Int(v) => Column::new(name.into(), vec![*v; height]),
        Literal::Float(v) => Column::new(name.into(), vec![*v; height]),
        Literal::Str(v) => Column::new(name.into(), vec![v.as_str(); height]),
    }
}

/// Column from row values of possibly mixed types; the dtype is their
/// common supertype.
pub fn values_column(name: &str, values: &[AnyValue<'static>]) -> Result<Column> {
    if values.iter().all(|value| matches!(value, AnyValue::Null)) {
        return Ok(Column::full_null(name.into(), values.len(), &DataType::String));
    }
    Ok(Series::from_any_values(name.into(), values, false)?.into_column())
}

pub fn literal_to_any(value: &Literal) -> AnyValue<'static> {
    match value {
        Literal::Null => AnyValue::Null,
        Literal::Bool(v) => AnyValue::Boolean(*v),
        Literal::Int(v) => AnyValue::Int64(*v),
        Literal::Float(v) => AnyValue::Float64(*v),
        Literal::Str(v) => AnyValue::StringOwned(v.as_str().into()),
    }
}

pub fn any_to_literal(value: AnyValue<'_>) -> Literal {
    match value {
        AnyValue::Null => Literal::Null,
        AnyValue::Boolean(v) => Literal::Bool(v),
        AnyValue::Int8(v) => Literal::Int(i64::from(v)),
        AnyValue::Int16(v) => Literal::Int(i64::from(v)),
        AnyValue::Int32(v) => Literal::Int(i64::from(v)),
        AnyValue::Int64(v) => Literal::Int(v),
        AnyValue::UInt8(v) => Literal::Int(i64::from(v)),
        AnyValue::UInt16(v) => Literal::Int(i64::from(v)),
        AnyValue::UInt32(v) => Literal::Int(i64::from(v)),
        AnyValue::UInt64(v) => i64::try_from(v).map_or(Literal::Float(v as f64), Literal::Int),
        AnyValue::Float32(v) => Literal::Float(f64::from(v)),
        AnyValue::Float64(v) if v.is_nan() => Literal::Null,
        AnyValue::Float64(v) => Literal::Float(v),
        AnyValue::String(v) => Literal::Str(v.to_string()),
        AnyValue::StringOwned(v) => Literal::Str(v.to_string()),
        other => Literal::Str(any_to_string(other)),
    }
}

/// Number of non-null values in a column.
pub fn non_null_count(column: &Column) -> usize {
    column.len() - column.null_count()
}

fn render(value: AnyValue<'_>) -> Option<String> {
    match value {
        AnyValue::Null => None,
        other => Some(any_to_string(other)),
    }
}

fn display(value: Option<&str>) -> String {
    match value {
        Some(value) => format!("'{value}'"),
        None => "null".to_string(),
    }
}
