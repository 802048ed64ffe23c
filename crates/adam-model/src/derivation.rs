//! Derivation rules: the closed set of ways a column can be computed.
//!
//! Documents describe a rule as a loose mapping (`source:`, `cut:`,
//! `condition:` ...). [`Derivation`] is the typed form; it deserializes
//! through [`RawDerivation`], which detects the rule kind from the keys
//! present unless an explicit `kind:` is given.

use std::collections::HashMap;

use serde::de::{Deserializer, IgnoredAny};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::column_ref::ColumnRef;
use crate::enums::{AggregationFunction, DerivationKind};
use crate::error::{ModelError, Result};
use crate::expr::{CutPredicate, Expression};
use crate::value::{Literal, OrderedMap};

/// Where a value comes from: a column or a written literal.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSource {
    Column(ColumnRef),
    Literal(Literal),
}

impl ValueSource {
    /// Classifies a written value: upper-case `DOMAIN.COLUMN` text is a
    /// column reference, anything else a literal.
    pub fn classify(value: Literal) -> Self {
        match &value {
            Literal::Str(text) => match ColumnRef::parse_qualified(text) {
                Some(column) => ValueSource::Column(column),
                None => ValueSource::Literal(value),
            },
            _ => ValueSource::Literal(value),
        }
    }

    pub fn column(&self) -> Option<&ColumnRef> {
        match self {
            ValueSource::Column(column) => Some(column),
            ValueSource::Literal(_) => None,
        }
    }
}

/// Recode table applied after selecting a source column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValueMap {
    entries: Vec<(Literal, Literal)>,
}

impl ValueMap {
    pub fn new(entries: Vec<(Literal, Literal)>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[(Literal, Literal)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookup table keyed by the rendered source value.
    pub fn to_lookup(&self) -> HashMap<String, Literal> {
        self.entries
            .iter()
            .map(|(from, to)| (from.to_key(), to.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceRule {
    pub source: ColumnRef,
    pub mapping: Option<ValueMap>,
    pub filter: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationRule {
    pub source: ColumnRef,
    pub function: AggregationFunction,
    pub filter: Option<Expression>,
    /// Reference value for `closest`.
    pub reference: Option<ValueSource>,
    /// Comparison column for `closest`.
    pub by: Option<ColumnRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CutRule {
    pub predicate: CutPredicate,
    pub label: Literal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategorizationRule {
    pub source: ColumnRef,
    pub filter: Option<Expression>,
    pub cuts: Vec<CutRule>,
    pub default: Option<Literal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub when: Expression,
    pub then: ValueSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalRule {
    pub branches: Vec<Branch>,
    pub default: Option<ValueSource>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionArg {
    /// Keyword name; `None` for positional arguments.
    pub name: Option<String>,
    pub value: ValueSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionRule {
    pub name: String,
    pub args: Vec<FunctionArg>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDerivation", into = "RawDerivation")]
pub enum Derivation {
    Constant(Literal),
    Source(SourceRule),
    Aggregation(AggregationRule),
    Categorization(CategorizationRule),
    Conditional(ConditionalRule),
    Function(FunctionRule),
}

impl Derivation {
    pub fn kind(&self) -> DerivationKind {
        match self {
            Derivation::Constant(_) => DerivationKind::Constant,
            Derivation::Source(_) => DerivationKind::Source,
            Derivation::Aggregation(_) => DerivationKind::Aggregation,
            Derivation::Categorization(_) => DerivationKind::Categorization,
            Derivation::Conditional(_) => DerivationKind::Conditional,
            Derivation::Function(_) => DerivationKind::Function,
        }
    }

    /// The primary source column, for kinds that have one.
    pub fn source(&self) -> Option<&ColumnRef> {
        match self {
            Derivation::Source(rule) => Some(&rule.source),
            Derivation::Aggregation(rule) => Some(&rule.source),
            Derivation::Categorization(rule) => Some(&rule.source),
            _ => None,
        }
    }

    /// Every column the rule reads, in order of appearance.
    pub fn references(&self) -> Vec<&ColumnRef> {
        let mut refs = Vec::new();
        match self {
            Derivation::Constant(_) => {}
            Derivation::Source(rule) => {
                refs.push(&rule.source);
                if let Some(filter) = &rule.filter {
                    refs.extend(filter.references());
                }
            }
            Derivation::Aggregation(rule) => {
                refs.push(&rule.source);
                if let Some(filter) = &rule.filter {
                    refs.extend(filter.references());
                }
                refs.extend(rule.reference.as_ref().and_then(ValueSource::column));
                refs.extend(rule.by.as_ref());
            }
            Derivation::Categorization(rule) => {
                refs.push(&rule.source);
                if let Some(filter) = &rule.filter {
                    refs.extend(filter.references());
                }
                for cut in &rule.cuts {
                    refs.extend(cut.predicate.expr().references());
                }
            }
            Derivation::Conditional(rule) => {
                for branch in &rule.branches {
                    refs.extend(branch.when.references());
                    refs.extend(branch.then.column());
                }
                refs.extend(rule.default.as_ref().and_then(ValueSource::column));
            }
            Derivation::Function(rule) => {
                refs.extend(rule.args.iter().filter_map(|arg| arg.value.column()));
            }
        }
        refs
    }
}

// ---------------------------------------------------------------------------
// Document form
// ---------------------------------------------------------------------------

/// A result or argument as written: `{source: DM.ARM}`, `{constant: X}` or a
/// bare scalar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Source { source: String },
    Constant { constant: Literal },
    Literal(Literal),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawAggregation {
    Function(AggregationFunction),
    Detailed {
        function: AggregationFunction,
        #[serde(default, alias = "target", skip_serializing_if = "Option::is_none")]
        reference: Option<RawValue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        by: Option<String>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBranch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub then: Option<RawValue>,
    #[serde(
        rename = "else",
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub otherwise: Option<RawValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawArgs {
    Named(OrderedMap<String, RawValue>),
    Positional(Vec<RawValue>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ExtraValue {
    Scalar(Literal),
    Other(#[allow(dead_code)] IgnoredAny),
}

impl Serialize for ExtraValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ExtraValue::Scalar(literal) => literal.serialize(serializer),
            ExtraValue::Other(_) => serializer.serialize_unit(),
        }
    }
}

/// Keys that may sit on a function derivation without being arguments.
const NON_ARGUMENT_KEYS: &[&str] = &["description", "comment", "note"];

/// Loose document form of a derivation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDerivation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<DerivationKind>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub constant: Option<Literal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<OrderedMap<Literal, Literal>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<RawAggregation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cut: Option<OrderedMap<Literal, Literal>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub default: Option<RawValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Vec<RawBranch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<RawArgs>,
    #[serde(flatten)]
    extra: OrderedMap<String, ExtraValue>,
}

/// Keeps an explicit `null` as `Some(..)` instead of collapsing it to `None`.
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl RawDerivation {
    /// Kind given by `kind:` or detected from the keys present.
    pub fn detect_kind(&self) -> Option<DerivationKind> {
        if self.kind.is_some() {
            return self.kind;
        }
        let mut keys = Vec::new();
        if self.condition.is_some() {
            keys.push("condition");
        }
        if self.constant.is_some() {
            keys.push("constant");
        }
        if self.function.is_some() {
            keys.push("function");
        }
        if self.cut.is_some() {
            keys.push("cut");
        }
        if self.aggregation.is_some() {
            keys.push("aggregation");
        }
        if self.source.is_some() {
            keys.push("source");
        }
        DerivationKind::detect(keys)
    }
}

fn column_ref(text: &str) -> Result<ColumnRef> {
    ColumnRef::parse(text).map_err(ModelError::InvalidReference)
}

fn expression(field: &str, text: Option<&str>) -> Result<Option<Expression>> {
    text.map(|text| {
        Expression::parse(text).map_err(|source| ModelError::Expression {
            field: field.to_string(),
            source,
        })
    })
    .transpose()
}

fn value_source(raw: RawValue) -> Result<ValueSource> {
    match raw {
        RawValue::Source { source } => Ok(ValueSource::Column(column_ref(&source)?)),
        RawValue::Constant { constant } => Ok(ValueSource::Literal(constant)),
        RawValue::Literal(literal) => Ok(ValueSource::Literal(literal)),
    }
}

fn raw_value(value: &ValueSource) -> RawValue {
    match value {
        ValueSource::Column(column) => RawValue::Source {
            source: column.to_string(),
        },
        ValueSource::Literal(literal) => RawValue::Literal(literal.clone()),
    }
}

fn required<T>(value: Option<T>, kind: DerivationKind, field: &'static str) -> Result<T> {
    value.ok_or(ModelError::MissingField { kind, field })
}

impl TryFrom<RawDerivation> for Derivation {
    type Error = ModelError;

    fn try_from(raw: RawDerivation) -> Result<Self> {
        let kind = raw.detect_kind().ok_or(ModelError::UnknownKind)?;
        let filter = expression("filter", raw.filter.as_deref())?;
        match kind {
            DerivationKind::Constant => Ok(Derivation::Constant(required(
                raw.constant,
                kind,
                "constant",
            )?)),
            DerivationKind::Source => Ok(Derivation::Source(SourceRule {
                source: column_ref(&required(raw.source, kind, "source")?)?,
                mapping: raw
                    .mapping
                    .map(|mapping| ValueMap::new(mapping.into_inner())),
                filter,
            })),
            DerivationKind::Aggregation => {
                let source = column_ref(&required(raw.source, kind, "source")?)?;
                let (function, reference, by) =
                    match required(raw.aggregation, kind, "aggregation")? {
                        RawAggregation::Function(function) => (function, None, None),
                        RawAggregation::Detailed {
                            function,
                            reference,
                            by,
                        } => (function, reference, by),
                    };
                let reference = reference
                    .map(|raw| match raw {
                        RawValue::Literal(literal) => Ok(ValueSource::classify(literal)),
                        other => value_source(other),
                    })
                    .transpose()?;
                let by = by.as_deref().map(column_ref).transpose()?;
                Ok(Derivation::Aggregation(AggregationRule {
                    source,
                    function,
                    filter,
                    reference,
                    by,
                }))
            }
            DerivationKind::Categorization => {
                let source = column_ref(&required(raw.source, kind, "source")?)?;
                let cut = required(raw.cut, kind, "cut")?;
                if cut.is_empty() {
                    return Err(ModelError::MissingField { kind, field: "cut" });
                }
                let cuts = cut
                    .into_inner()
                    .into_iter()
                    .map(|(predicate, label)| {
                        let text = predicate.to_key();
                        CutPredicate::parse(&text)
                            .map(|predicate| CutRule { predicate, label })
                            .map_err(|source| ModelError::Expression {
                                field: format!("cut '{text}'"),
                                source,
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let default = match raw.default {
                    None => None,
                    Some(RawValue::Literal(literal) | RawValue::Constant { constant: literal }) => {
                        Some(literal)
                    }
                    Some(RawValue::Source { source }) => Some(Literal::Str(source)),
                };
                Ok(Derivation::Categorization(CategorizationRule {
                    source,
                    filter,
                    cuts,
                    default,
                }))
            }
            DerivationKind::Conditional => {
                let condition = required(raw.condition, kind, "condition")?;
                let mut branches = Vec::new();
                let mut default = raw.default.map(value_source).transpose()?;
                for branch in condition {
                    if let Some(otherwise) = branch.otherwise {
                        default = Some(value_source(otherwise)?);
                        continue;
                    }
                    let when = expression(
                        "condition.when",
                        Some(required(branch.when, kind, "when")?.as_str()),
                    )?
                    .ok_or(ModelError::MissingField { kind, field: "when" })?;
                    let then = value_source(required(branch.then, kind, "then")?)?;
                    branches.push(Branch { when, then });
                }
                if branches.is_empty() {
                    return Err(ModelError::MissingField {
                        kind,
                        field: "condition",
                    });
                }
                Ok(Derivation::Conditional(ConditionalRule { branches, default }))
            }
            DerivationKind::Function => {
                let name = required(raw.function, kind, "function")?;
                let args = match raw.args {
                    Some(RawArgs::Named(named)) => named
                        .into_inner()
                        .into_iter()
                        .map(|(name, value)| function_arg(Some(name), value))
                        .collect::<Result<Vec<_>>>()?,
                    Some(RawArgs::Positional(values)) => values
                        .into_iter()
                        .map(|value| function_arg(None, value))
                        .collect::<Result<Vec<_>>>()?,
                    // Older documents put arguments directly on the derivation.
                    None => raw
                        .extra
                        .into_inner()
                        .into_iter()
                        .filter(|(name, _)| !NON_ARGUMENT_KEYS.contains(&name.as_str()))
                        .filter_map(|(name, value)| match value {
                            ExtraValue::Scalar(literal) => Some(FunctionArg {
                                name: Some(name),
                                value: ValueSource::classify(literal),
                            }),
                            ExtraValue::Other(_) => None,
                        })
                        .collect(),
                };
                Ok(Derivation::Function(FunctionRule { name, args }))
            }
        }
    }
}

fn function_arg(name: Option<String>, value: RawValue) -> Result<FunctionArg> {
    let value = match value {
        RawValue::Literal(literal) => ValueSource::classify(literal),
        other => value_source(other)?,
    };
    Ok(FunctionArg { name, value })
}

impl From<Derivation> for RawDerivation {
    fn from(derivation: Derivation) -> Self {
        let mut raw = RawDerivation::default();
        match derivation {
            Derivation::Constant(value) => raw.constant = Some(value),
            Derivation::Source(rule) => {
                raw.source = Some(rule.source.to_string());
                raw.mapping = rule
                    .mapping
                    .map(|mapping| OrderedMap(mapping.entries().to_vec()));
                raw.filter = rule.filter.map(String::from);
            }
            Derivation::Aggregation(rule) => {
                raw.source = Some(rule.source.to_string());
                raw.filter = rule.filter.map(String::from);
                raw.aggregation = Some(RawAggregation::Detailed {
                    function: rule.function,
                    reference: rule.reference.as_ref().map(raw_value),
                    by: rule.by.map(String::from),
                });
            }
            Derivation::Categorization(rule) => {
                raw.source = Some(rule.source.to_string());
                raw.filter = rule.filter.map(String::from);
                raw.cut = Some(OrderedMap(
                    rule.cuts
                        .into_iter()
                        .map(|cut| (Literal::Str(cut.predicate.text().to_string()), cut.label))
                        .collect(),
                ));
                raw.default = rule.default.map(RawValue::Literal);
            }
            Derivation::Conditional(rule) => {
                raw.condition = Some(
                    rule.branches
                        .iter()
                        .map(|branch| RawBranch {
                            when: Some(branch.when.text().to_string()),
                            then: Some(raw_value(&branch.then)),
                            otherwise: None,
                        })
                        .collect(),
                );
                raw.default = rule.default.as_ref().map(raw_value);
            }
            Derivation::Function(rule) => {
                raw.function = Some(rule.name);
                if rule.args.iter().all(|arg| arg.name.is_some()) {
                    raw.args = Some(RawArgs::Named(OrderedMap(
                        rule.args
                            .iter()
                            .map(|arg| {
                                (arg.name.clone().unwrap_or_default(), raw_value(&arg.value))
                            })
                            .collect(),
                    )));
                } else {
                    raw.args = Some(RawArgs::Positional(
                        rule.args.iter().map(|arg| raw_value(&arg.value)).collect(),
                    ));
                }
            }
        }
        raw
    }
}
