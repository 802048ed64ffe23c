//! Rule executors.
//!
//! [`dispatch`] computes one column of the target table from its derivation
//! rule. Each rule kind has its own executor; all of them end by aligning a
//! per-row result on the target's key tuples, so a derived column always has
//! exactly one value per target row.
//!
//! Rules reading a source domain work on that domain's namespace table.
//! Columns of other domains, or already derived target columns, that a
//! filter or condition mentions are attached to the working frame by key
//! lookup first.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use adam_common::{any_to_f64, any_to_string};
use adam_model::{
    AggregationFunction, AggregationRule, CategorizationRule, Column as ColumnSpec, ColumnRef,
    ColumnType, ConditionalRule, Derivation, Expression, FunctionRule, Literal, SourceRule,
    Specification, ValueMap, ValueSource,
};
use polars::prelude::*;
use tracing::debug;

use crate::coerce::{coerce, is_numeric_dtype};
use crate::compile::{self, Scope};
use crate::error::{DeriveError, Result};
use crate::frame::{
    KeyTuple, align, any_to_literal, first_rows, frame_keys, functional_index, gather,
    literal_column, literal_to_any, values_column,
};
use crate::functions::{FunctionArgs, FunctionRegistry};
use crate::options::EngineOptions;
use crate::source::SourceNamespace;
use crate::temporal::any_to_datetime;

/// Working column holding per-row results before alignment.
const VALUE_COLUMN: &str = "__adam_value";
/// Working column holding non-null counts of a group.
const COUNT_COLUMN: &str = "__adam_count";

/// Everything an executor reads besides the target table.
#[derive(Clone, Copy)]
pub struct DerivationContext<'a> {
    spec: &'a Specification,
    sources: &'a SourceNamespace,
    registry: &'a FunctionRegistry,
    options: &'a EngineOptions,
}

impl<'a> DerivationContext<'a> {
    pub fn new(
        spec: &'a Specification,
        sources: &'a SourceNamespace,
        registry: &'a FunctionRegistry,
        options: &'a EngineOptions,
    ) -> Self {
        Self {
            spec,
            sources,
            registry,
            options,
        }
    }

    pub fn key(&self) -> &'a [String] {
        &self.spec.key
    }

    /// Upper-cased source domain of `reference`; `None` for target columns.
    pub fn source_domain(&self, reference: &ColumnRef) -> Option<String> {
        reference
            .domain
            .as_deref()
            .filter(|domain| !domain.eq_ignore_ascii_case(&self.spec.domain))
            .map(str::to_uppercase)
    }

    /// Name `reference` has in a working frame.
    pub fn column_name(&self, reference: &ColumnRef) -> String {
        match self.source_domain(reference) {
            Some(domain) if !self.spec.is_key(&reference.column) => {
                format!("{domain}.{}", reference.column)
            }
            _ => reference.column.clone(),
        }
    }

    /// The table `reference` lives in, checked to hold the column.
    fn base_frame(&self, reference: &ColumnRef, target: &DataFrame) -> Result<DataFrame> {
        let name = self.column_name(reference);
        match self.source_domain(reference) {
            Some(domain) => {
                let table = self.sources.table(&domain)?;
                if table.column(&name).is_err() {
                    return Err(missing_column(domain, &reference.column));
                }
                Ok(table.clone())
            }
            None => {
                require_target(target, &name)?;
                Ok(target.clone())
            }
        }
    }

    /// Adds every referenced column `frame` lacks, matched by key.
    ///
    /// Source tables must hold one value per key of `frame` for an attached
    /// column; rows for other keys are ignored.
    fn attach<'r>(
        &self,
        mut frame: DataFrame,
        references: impl IntoIterator<Item = &'r ColumnRef>,
        target: &DataFrame,
    ) -> Result<DataFrame> {
        let key = self.key();
        let mut keys: Option<Vec<KeyTuple>> = None;
        for reference in references {
            let name = self.column_name(reference);
            if frame.column(&name).is_ok() {
                continue;
            }
            if keys.is_none() {
                keys = Some(frame_keys(&frame, key)?);
            }
            let wanted = keys.as_deref().unwrap_or_default();
            let (table, index) = match self.source_domain(reference) {
                Some(domain) => {
                    let table = self.sources.table(&domain)?;
                    if table.column(&name).is_err() {
                        return Err(missing_column(domain, &reference.column));
                    }
                    (table, functional_index(table, key, &name, wanted)?)
                }
                None => {
                    require_target(target, &name)?;
                    (target, first_rows(target, key)?)
                }
            };
            let rows = align(wanted, &index);
            frame.with_column(gather(table.column(&name)?, &rows, &name)?)?;
            debug!(column = %name, "attached by key");
        }
        Ok(frame)
    }

    fn apply_filter(
        &self,
        frame: DataFrame,
        filter: Option<&Expression>,
        target: &DataFrame,
    ) -> Result<DataFrame> {
        let Some(expression) = filter else {
            return Ok(frame);
        };
        let frame = self.attach(frame, expression.references(), target)?;
        let names = |reference: &ColumnRef| self.column_name(reference);
        let predicate = compile::compile(expression.expr(), &Scope::new(&names))?;
        let filtered = compile::filter(&frame, predicate)?;
        debug!(
            filter = %expression,
            before = frame.height(),
            after = filtered.height(),
            "filter applied"
        );
        Ok(filtered)
    }

    /// Aligns per-row `values` of `frame` on the target keys, checking that
    /// each target key resolves to a single value.
    fn align_values(
        &self,
        frame: &DataFrame,
        values: Column,
        target: &DataFrame,
        name: &str,
    ) -> Result<Column> {
        let key = self.key();
        let mut keyed = frame.select(key.iter().map(String::as_str))?;
        keyed.with_column(values.with_name(VALUE_COLUMN.into()))?;
        let target_keys = frame_keys(target, key)?;
        let index = functional_index(&keyed, key, VALUE_COLUMN, &target_keys)?;
        let rows = align(&target_keys, &index);
        gather(keyed.column(VALUE_COLUMN)?, &rows, name)
    }

    /// A string literal naming an existing target column reads that column.
    fn resolve_value(&self, value: &ValueSource, target: &DataFrame) -> ValueSource {
        match value {
            ValueSource::Literal(Literal::Str(text))
                if ColumnRef::parse(text).is_ok() && target.column(text.trim()).is_ok() =>
            {
                ValueSource::Column(ColumnRef::target(text.trim()))
            }
            other => other.clone(),
        }
    }
}

fn missing_column(domain: String, column: &str) -> DeriveError {
    DeriveError::MissingSource {
        domain,
        reason: format!("column {column} is missing"),
    }
}

fn require_target(target: &DataFrame, name: &str) -> Result<()> {
    if target.column(name).is_ok() {
        Ok(())
    } else {
        Err(DeriveError::InvalidDerivationSpec(format!(
            "column {name} is referenced before it is derived"
        )))
    }
}

/// Computes `column` and returns `target` with it added or replaced.
pub fn dispatch(
    column: &ColumnSpec,
    ctx: &DerivationContext<'_>,
    target: &DataFrame,
) -> Result<DataFrame> {
    let name = column.name.as_str();
    let values = match &column.derivation {
        Derivation::Constant(value) => literal_column(name, value, target.height()),
        Derivation::Source(rule) => derive_source(rule, name, ctx, target)?,
        Derivation::Aggregation(rule) => derive_aggregation(rule, name, ctx, target)?,
        Derivation::Categorization(rule) => derive_categorization(rule, name, ctx, target)?,
        Derivation::Conditional(rule) => derive_conditional(rule, name, ctx, target)?,
        Derivation::Function(rule) => derive_function(rule, name, ctx, target)?,
    };
    let values = if ctx.options.coerce_types {
        coerce(&values, column.data_type)?
    } else {
        values
    };

    let mut out = target.clone();
    out.with_column(values)?;
    Ok(out)
}

fn derive_source(
    rule: &SourceRule,
    name: &str,
    ctx: &DerivationContext<'_>,
    target: &DataFrame,
) -> Result<Column> {
    let frame = ctx.base_frame(&rule.source, target)?;
    let frame = ctx.apply_filter(frame, rule.filter.as_ref(), target)?;
    let mut values = frame.column(&ctx.column_name(&rule.source))?.clone();
    if let Some(mapping) = rule.mapping.as_ref().filter(|mapping| !mapping.is_empty()) {
        values = recode(&values, mapping)?;
    }
    ctx.align_values(&frame, values, target, name)
}

/// Replaces each value by its mapping entry; unmapped values become null.
fn recode(values: &Column, mapping: &ValueMap) -> Result<Column> {
    let lookup = mapping.to_lookup();
    let recoded: Vec<AnyValue<'static>> = values
        .as_materialized_series()
        .iter()
        .map(|value| {
            if value.is_null() {
                return AnyValue::Null;
            }
            lookup
                .get(&any_to_string(value))
                .map_or(AnyValue::Null, literal_to_any)
        })
        .collect();
    values_column(values.name().as_str(), &recoded)
}

fn derive_aggregation(
    rule: &AggregationRule,
    name: &str,
    ctx: &DerivationContext<'_>,
    target: &DataFrame,
) -> Result<Column> {
    let key = ctx.key();
    let source = ctx.column_name(&rule.source);
    let frame = ctx.base_frame(&rule.source, target)?;

    match rule.function {
        AggregationFunction::Count => {
            let frame = ctx.apply_filter(frame, rule.filter.as_ref(), target)?;
            let mut counts: HashMap<KeyTuple, i64> = HashMap::new();
            for tuple in frame_keys(&frame, key)? {
                *counts.entry(tuple).or_default() += 1;
            }
            let values: Vec<i64> = frame_keys(target, key)?
                .iter()
                .map(|tuple| counts.get(tuple).copied().unwrap_or(0))
                .collect();
            Ok(Column::new(name.into(), values))
        }
        AggregationFunction::Closest => closest(rule, name, &source, frame, ctx, target),
        function => {
            let frame = ctx.apply_filter(frame, rule.filter.as_ref(), target)?;
            let mut values = frame.column(&source)?.clone();
            if function.requires_numeric() && !is_numeric_dtype(values.dtype()) {
                values = coerce(&values, ColumnType::Float)?;
            }
            reduce_groups(function, &frame, values, name, ctx, target)
        }
    }
}

/// Group-wise reduction in source order. Groups without a non-null value
/// reduce to null.
fn reduce_groups(
    function: AggregationFunction,
    frame: &DataFrame,
    values: Column,
    name: &str,
    ctx: &DerivationContext<'_>,
    target: &DataFrame,
) -> Result<Column> {
    let key = ctx.key();
    let value = col(VALUE_COLUMN);
    let reduced = match function {
        AggregationFunction::First => value.clone().drop_nulls().first(),
        AggregationFunction::Last => value.clone().drop_nulls().last(),
        AggregationFunction::Mean => value.clone().mean(),
        AggregationFunction::Median => value.clone().median(),
        AggregationFunction::Min => value.clone().min(),
        AggregationFunction::Max => value.clone().max(),
        AggregationFunction::Sum => value.clone().sum(),
        AggregationFunction::Count | AggregationFunction::Closest => {
            return Err(DeriveError::InvalidDerivationSpec(format!(
                "{function} is not a group reduction"
            )));
        }
    };

    let mut working = frame.select(key.iter().map(String::as_str))?;
    working.with_column(values.with_name(VALUE_COLUMN.into()))?;
    let grouped = working
        .lazy()
        .group_by_stable(key.iter().map(|k| col(k.as_str())).collect::<Vec<_>>())
        .agg([reduced.alias(VALUE_COLUMN), value.count().alias(COUNT_COLUMN)])
        .collect()?;

    let counts = grouped.column(COUNT_COLUMN)?.cast(&DataType::UInt64)?;
    let counts = counts.u64()?;
    let index = first_rows(&grouped, key)?;
    let rows: Vec<Option<usize>> = align(&frame_keys(target, key)?, &index)
        .into_iter()
        .map(|row| row.filter(|&row| counts.get(row).unwrap_or(0) > 0))
        .collect();
    gather(grouped.column(VALUE_COLUMN)?, &rows, name)
}

/// Value of the row whose comparison column is nearest the reference.
/// Ties keep the earliest row; rows with a null value are skipped.
fn closest(
    rule: &AggregationRule,
    name: &str,
    source: &str,
    frame: DataFrame,
    ctx: &DerivationContext<'_>,
    target: &DataFrame,
) -> Result<Column> {
    let key = ctx.key();
    let reference = match &rule.reference {
        Some(reference) => ctx.resolve_value(reference, target),
        None => {
            return Err(DeriveError::InvalidDerivationSpec(format!(
                "closest aggregation of {} needs a reference",
                rule.source
            )));
        }
    };
    let by = match &rule.by {
        Some(by) => by.clone(),
        None => default_by(&frame, &rule.source, ctx)?,
    };

    let mut references = vec![&by];
    references.extend(reference.column());
    let frame = ctx.attach(frame, references, target)?;
    let frame = ctx.apply_filter(frame, rule.filter.as_ref(), target)?;

    let values = frame.column(source)?;
    let by_values = frame.column(&ctx.column_name(&by))?;
    let anchors = match &reference {
        ValueSource::Column(column) => Some(frame.column(&ctx.column_name(column))?),
        ValueSource::Literal(_) => None,
    };
    let constant = match &reference {
        ValueSource::Literal(value) => literal_to_any(value),
        ValueSource::Column(_) => AnyValue::Null,
    };

    let mut best: HashMap<KeyTuple, (f64, usize)> = HashMap::new();
    for (row, tuple) in frame_keys(&frame, key)?.into_iter().enumerate() {
        if values.get(row)?.is_null() {
            continue;
        }
        let anchor = match anchors {
            Some(anchors) => anchors.get(row)?,
            None => constant.clone(),
        };
        let Some(distance) = distance(by_values.get(row)?, anchor) else {
            continue;
        };
        match best.entry(tuple) {
            Entry::Vacant(slot) => {
                slot.insert((distance, row));
            }
            Entry::Occupied(mut slot) => {
                if distance < slot.get().0 {
                    slot.insert((distance, row));
                }
            }
        }
    }

    let index: HashMap<KeyTuple, usize> = best
        .into_iter()
        .map(|(tuple, (_, row))| (tuple, row))
        .collect();
    let rows = align(&frame_keys(target, key)?, &index);
    gather(values, &rows, name)
}

/// First `*DTC` column of the domain `source` belongs to.
fn default_by(frame: &DataFrame, source: &ColumnRef, ctx: &DerivationContext<'_>) -> Result<ColumnRef> {
    let names = frame.get_column_names();
    let column = match ctx.source_domain(source) {
        Some(domain) => {
            let prefix = format!("{domain}.");
            names.into_iter().find_map(|name| {
                name.as_str()
                    .strip_prefix(&prefix)
                    .filter(|column| column.ends_with("DTC"))
                    .map(str::to_string)
            })
        }
        None => names
            .into_iter()
            .find(|name| name.ends_with("DTC"))
            .map(|name| name.to_string()),
    };
    column
        .map(|column| ColumnRef {
            domain: source.domain.clone(),
            column,
        })
        .ok_or_else(|| {
            DeriveError::InvalidDerivationSpec(format!(
                "closest aggregation of {source} needs `by`: the domain has no DTC column"
            ))
        })
}

/// Absolute distance, numeric when both sides are numbers, else in
/// milliseconds between the parsed dates.
fn distance(value: AnyValue<'_>, anchor: AnyValue<'_>) -> Option<f64> {
    if is_numeric_dtype(&value.dtype()) && is_numeric_dtype(&anchor.dtype()) {
        return Some((any_to_f64(value)? - any_to_f64(anchor)?).abs());
    }
    let value = any_to_datetime(value)?;
    let anchor = any_to_datetime(anchor)?;
    Some((value - anchor).num_milliseconds().unsigned_abs() as f64)
}

fn derive_categorization(
    rule: &CategorizationRule,
    name: &str,
    ctx: &DerivationContext<'_>,
    target: &DataFrame,
) -> Result<Column> {
    let frame = ctx.base_frame(&rule.source, target)?;
    let cut_references = rule
        .cuts
        .iter()
        .flat_map(|cut| cut.predicate.expr().references());
    let frame = ctx.attach(frame, cut_references, target)?;
    let frame = ctx.apply_filter(frame, rule.filter.as_ref(), target)?;

    let subject = ctx.column_name(&rule.source);
    let names = |reference: &ColumnRef| ctx.column_name(reference);
    let scope = Scope::new(&names).with_subject(&subject);

    let mut labels: Vec<Option<&Literal>> = vec![None; frame.height()];
    for cut in &rule.cuts {
        let predicate = compile::compile(cut.predicate.expr(), &scope)?;
        let mask = compile::evaluate(&frame, predicate)?;
        for (label, matched) in labels.iter_mut().zip(mask) {
            if matched && label.is_none() {
                *label = Some(&cut.label);
            }
        }
    }

    let default = rule.default.as_ref().map_or(AnyValue::Null, literal_to_any);
    let values: Vec<AnyValue<'static>> = labels
        .into_iter()
        .map(|label| label.map_or_else(|| default.clone(), literal_to_any))
        .collect();
    let values = values_column(name, &values)?;
    ctx.align_values(&frame, values, target, name)
}

fn derive_conditional(
    rule: &ConditionalRule,
    name: &str,
    ctx: &DerivationContext<'_>,
    target: &DataFrame,
) -> Result<Column> {
    let outcomes: Vec<ValueSource> = rule
        .branches
        .iter()
        .map(|branch| ctx.resolve_value(&branch.then, target))
        .collect();
    let default = rule
        .default
        .as_ref()
        .map(|value| ctx.resolve_value(value, target));

    let mut references = Vec::new();
    for (branch, outcome) in rule.branches.iter().zip(&outcomes) {
        references.extend(branch.when.references());
        references.extend(outcome.column());
    }
    references.extend(default.as_ref().and_then(ValueSource::column));
    let frame = ctx.attach(target.clone(), references, target)?;

    let names = |reference: &ColumnRef| ctx.column_name(reference);
    let scope = Scope::new(&names);
    let mut chosen: Vec<Option<&ValueSource>> = vec![None; frame.height()];
    for (branch, outcome) in rule.branches.iter().zip(&outcomes) {
        let predicate = compile::compile(branch.when.expr(), &scope)?;
        let mask = compile::evaluate(&frame, predicate)?;
        for (choice, matched) in chosen.iter_mut().zip(mask) {
            if matched && choice.is_none() {
                *choice = Some(outcome);
            }
        }
    }

    let values = chosen
        .into_iter()
        .enumerate()
        .map(|(row, choice)| -> Result<AnyValue<'static>> {
            Ok(match choice.or(default.as_ref()) {
                None => AnyValue::Null,
                Some(ValueSource::Literal(value)) => literal_to_any(value),
                Some(ValueSource::Column(column)) => frame
                    .column(&ctx.column_name(column))?
                    .get(row)?
                    .into_static(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    values_column(name, &values)
}

fn derive_function(
    rule: &FunctionRule,
    name: &str,
    ctx: &DerivationContext<'_>,
    target: &DataFrame,
) -> Result<Column> {
    let function = ctx
        .registry
        .get(&rule.name)
        .ok_or_else(|| DeriveError::UnknownFunction {
            name: rule.name.clone(),
            available: ctx.registry.names().collect::<Vec<_>>().join(", "),
        })?;

    let args: Vec<(Option<String>, ValueSource)> = rule
        .args
        .iter()
        .map(|arg| (arg.name.clone(), ctx.resolve_value(&arg.value, target)))
        .collect();
    let frame = ctx.attach(
        target.clone(),
        args.iter().filter_map(|(_, value)| value.column()),
        target,
    )?;
    let columns = args
        .iter()
        .map(|(_, value)| {
            value
                .column()
                .map(|column| frame.column(&ctx.column_name(column)))
                .transpose()
        })
        .collect::<PolarsResult<Vec<Option<&Column>>>>()?;

    let mut row_args: Vec<(Option<String>, Literal)> = args
        .iter()
        .map(|(arg_name, value)| {
            let literal = match value {
                ValueSource::Literal(literal) => literal.clone(),
                ValueSource::Column(_) => Literal::Null,
            };
            (arg_name.clone(), literal)
        })
        .collect();

    let mut values = Vec::with_capacity(frame.height());
    for row in 0..frame.height() {
        for ((_, slot), column) in row_args.iter_mut().zip(&columns) {
            if let Some(column) = column {
                *slot = any_to_literal(column.get(row)?);
            }
        }
        let value = function(FunctionArgs::new(&row_args)).map_err(|message| {
            DeriveError::Function {
                name: rule.name.clone(),
                message,
            }
        })?;
        values.push(literal_to_any(&value));
    }
    values_column(name, &values)
}
