//! Schema validation of merged specification documents.
//!
//! Validation runs over the raw merged mapping so that every problem can be
//! reported at once, with the path of the offending field, before the
//! document is converted into the typed model.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

use adam_model::{AggregationFunction, ColumnRef, ColumnType, DerivationKind, Expr};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::error::{Result, SpecError};
use crate::merge::{COLUMNS_KEY, DROP_KEY, derivation_kind};
use crate::store::kind_of;

const DEFAULT_RULES: &str = include_str!("../schema/default.yaml");

/// Issue severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks resolution of the specification.
    Error,
    /// Should be reviewed.
    Warning,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warning => "Warning",
        }
    }
}

/// A single schema finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub rule: String,
    pub severity: Severity,
    /// Path of the offending field, e.g. `columns[3].derivation.cut`.
    pub field: String,
    pub message: String,
}

/// Every issue found in one document, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity == Severity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn is_valid(&self) -> bool {
        self.error_count() == 0
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Short multi-line summary listing up to five errors and warnings.
    pub fn summary(&self) -> String {
        const SHOWN: usize = 5;
        let mut lines = vec![
            format!(
                "{} error(s), {} warning(s)",
                self.error_count(),
                self.warning_count()
            ),
            format!("Valid: {}", self.is_valid()),
        ];
        for (title, issues) in [
            ("Errors", self.errors().collect::<Vec<_>>()),
            ("Warnings", self.warnings().collect::<Vec<_>>()),
        ] {
            if issues.is_empty() {
                continue;
            }
            lines.push(format!("{title}:"));
            for issue in issues.iter().take(SHOWN) {
                lines.push(format!("  [{}] {}: {}", issue.rule, issue.field, issue.message));
            }
            if issues.len() > SHOWN {
                lines.push(format!("  ... and {} more", issues.len() - SHOWN));
            }
        }
        lines.join("\n")
    }

    fn push(
        &mut self,
        rule: &str,
        severity: Severity,
        field: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.issues.push(ValidationIssue {
            rule: rule.to_string(),
            severity,
            field: field.into(),
            message: message.into(),
        });
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

// ---------------------------------------------------------------------------
// Rule document
// ---------------------------------------------------------------------------

/// A rule-set document describing what a valid specification looks like.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaRules {
    pub root: RootRules,
    pub fields: BTreeMap<String, FieldRule>,
    pub column: ColumnRules,
    pub derivation: DerivationRules,
    /// Key columns that may be omitted from `columns`; they are carried
    /// through from the key domain.
    pub identifiers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootRules {
    pub required: Vec<String>,
    pub optional: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnRules {
    pub required: Vec<String>,
    pub optional: Vec<String>,
    pub fields: BTreeMap<String, FieldRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivationRules {
    /// Accepted aggregation function names.
    pub functions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeSpec {
    One(String),
    AnyOf(Vec<String>),
}

impl TypeSpec {
    fn matches(&self, value: &Value) -> bool {
        match self {
            TypeSpec::One(name) => type_matches(name, value),
            TypeSpec::AnyOf(names) => names.iter().any(|name| type_matches(name, value)),
        }
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::One(name) => f.write_str(name),
            TypeSpec::AnyOf(names) => f.write_str(&names.join(" or ")),
        }
    }
}

fn type_matches(name: &str, value: &Value) -> bool {
    match name {
        "str" | "string" => value.is_string(),
        "int" | "integer" => value.is_i64() || value.is_u64(),
        "float" | "number" => value.is_number(),
        "bool" | "boolean" => value.is_bool(),
        "list" => value.is_sequence(),
        "dict" | "mapping" => value.is_mapping(),
        _ => true,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldRule {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<TypeSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_type: Option<TypeSpec>,
    /// Raises `min_items` findings from warning to error.
    pub required: bool,
    pub required_fields: Vec<String>,
    pub fields: BTreeMap<String, FieldRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Severity of `allowed_values` findings; warning when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl SchemaRules {
    /// The rule set compiled into the library.
    pub fn embedded() -> Self {
        // The embedded document is covered by a unit test.
        Self::from_yaml(DEFAULT_RULES).unwrap_or_default()
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|source| SpecError::YamlParse {
            document: "schema rules".to_string(),
            source,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| SpecError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| SpecError::YamlParse {
            document: path.display().to_string(),
            source,
        })
    }

    fn is_identifier(&self, name: &str) -> bool {
        self.identifiers.iter().any(|id| id == name)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validates a merged document. Never fails; every finding is collected.
pub fn validate(document: &Mapping, rules: &SchemaRules) -> ValidationReport {
    let mut validator = Validator {
        rules,
        report: ValidationReport::default(),
        patterns: HashSet::new(),
    };
    validator.root(document);
    validator.columns(document);
    validator.key(document);
    validator.report
}

struct Validator<'a> {
    rules: &'a SchemaRules,
    report: ValidationReport,
    /// Rule-set patterns already reported as invalid.
    patterns: HashSet<String>,
}

impl Validator<'_> {
    fn root(&mut self, document: &Mapping) {
        let rules = self.rules;
        for name in &rules.root.required {
            if document.get(name.as_str()).is_none_or(Value::is_null) {
                self.report.push(
                    "required_field",
                    Severity::Error,
                    name.as_str(),
                    format!("Required field '{name}' is missing"),
                );
            }
        }
        for (name, rule) in &rules.fields {
            if let Some(value) = document.get(name.as_str()) {
                self.field(name, value, rule, None);
            }
        }
    }

    fn field(&mut self, path: &str, value: &Value, rule: &FieldRule, column: Option<&str>) {
        if value.is_null() {
            return;
        }
        let subject = match column {
            Some(column) => format!("Column '{column}' field '{path}'"),
            None => format!("Field '{path}'"),
        };

        if let Some(expected) = &rule.value_type
            && !expected.matches(value)
        {
            self.report.push(
                "invalid_type",
                Severity::Error,
                path,
                format!("{subject} should be {expected}, found {}", kind_of(value)),
            );
            return;
        }

        match value {
            Value::String(text) => {
                if let Some(pattern) = &rule.pattern
                    && let Some(regex) = self.compile(pattern, path)
                    && !regex.is_match(text)
                {
                    self.report.push(
                        "invalid_pattern",
                        Severity::Error,
                        path,
                        format!("{subject} value '{text}' does not match pattern {pattern}"),
                    );
                }
                if let Some(max) = rule.max_length
                    && text.chars().count() > max
                {
                    self.report.push(
                        "max_length_exceeded",
                        Severity::Warning,
                        path,
                        format!(
                            "{subject} exceeds max length of {max} (actual: {})",
                            text.chars().count()
                        ),
                    );
                }
                if let Some(allowed) = &rule.allowed_values
                    && !allowed.iter().any(|candidate| candidate == text)
                {
                    self.report.push(
                        "invalid_value",
                        rule.severity.unwrap_or(Severity::Warning),
                        path,
                        format!(
                            "{subject} has non-standard value '{text}' (allowed: {})",
                            allowed.join(", ")
                        ),
                    );
                }
            }
            Value::Sequence(items) => {
                if let Some(min) = rule.min_items
                    && items.len() < min
                {
                    self.report.push(
                        "min_items",
                        if rule.required {
                            Severity::Error
                        } else {
                            Severity::Warning
                        },
                        path,
                        format!("{subject} has {} item(s), minimum is {min}", items.len()),
                    );
                }
                if let Some(max) = rule.max_items
                    && items.len() > max
                {
                    self.report.push(
                        "max_items",
                        Severity::Warning,
                        path,
                        format!("{subject} has {} item(s), maximum is {max}", items.len()),
                    );
                }
                if let Some(item_type) = &rule.item_type {
                    for (index, item) in items.iter().enumerate() {
                        if !item_type.matches(item) {
                            self.report.push(
                                "invalid_item_type",
                                Severity::Error,
                                format!("{path}[{index}]"),
                                format!("Item {index} of {subject} should be {item_type}"),
                            );
                        }
                    }
                }
            }
            Value::Mapping(mapping) => {
                for required in &rule.required_fields {
                    if mapping.get(required.as_str()).is_none_or(Value::is_null) {
                        self.report.push(
                            "required_field",
                            Severity::Error,
                            format!("{path}.{required}"),
                            format!("{subject} is missing required field '{required}'"),
                        );
                    }
                }
                for (name, nested) in &rule.fields {
                    if let Some(child) = mapping.get(name.as_str()) {
                        self.field(&format!("{path}.{name}"), child, nested, column);
                    }
                }
            }
            Value::Number(number) => {
                if let Some(value) = number.as_f64() {
                    if let Some(min) = rule.min
                        && value < min
                    {
                        self.report.push(
                            "below_minimum",
                            Severity::Error,
                            path,
                            format!("{subject} value {value} is below minimum {min}"),
                        );
                    }
                    if let Some(max) = rule.max
                        && value > max
                    {
                        self.report.push(
                            "above_maximum",
                            Severity::Error,
                            path,
                            format!("{subject} value {value} is above maximum {max}"),
                        );
                    }
                }
            }
            _ => {}
        }
    }

    fn compile(&mut self, pattern: &str, path: &str) -> Option<Regex> {
        // Patterns match from the start of the value, like a `^` anchor.
        match Regex::new(&format!("^(?:{pattern})")) {
            Ok(regex) => Some(regex),
            Err(err) => {
                if self.patterns.insert(pattern.to_string()) {
                    self.report.push(
                        "invalid_schema_pattern",
                        Severity::Error,
                        path,
                        format!("Rule-set pattern {pattern} does not compile: {err}"),
                    );
                }
                None
            }
        }
    }

    fn columns(&mut self, document: &Mapping) {
        let Some(Value::Sequence(columns)) = document.get(COLUMNS_KEY) else {
            return;
        };
        let mut seen: Vec<&str> = Vec::new();
        let mut duplicates: Vec<&str> = Vec::new();

        for (index, column) in columns.iter().enumerate() {
            let path = format!("columns[{index}]");
            let Value::Mapping(column) = column else {
                self.report.push(
                    "invalid_column",
                    Severity::Error,
                    path,
                    format!("Column entry should be a mapping, found {}", kind_of(column)),
                );
                continue;
            };
            let name = column.get("name").and_then(Value::as_str);
            let display = name.map_or_else(|| format!("column_{index}"), str::to_string);

            if let Some(name) = name {
                if seen.contains(&name) && !duplicates.contains(&name) {
                    duplicates.push(name);
                }
                seen.push(name);
            }

            for required in &self.rules.column.required {
                if column.get(required.as_str()).is_none_or(Value::is_null) {
                    self.report.push(
                        "required_column_field",
                        Severity::Error,
                        format!("{path}.{required}"),
                        format!("Column '{display}' is missing required field '{required}'"),
                    );
                }
            }

            if column.get(DROP_KEY).is_some() {
                self.report.push(
                    "unresolved_tombstone",
                    Severity::Error,
                    format!("{path}.{DROP_KEY}"),
                    format!("Column '{display}' still carries a drop marker after merging"),
                );
            }

            let rules = self.rules;
            for (field, rule) in &rules.column.fields {
                if let Some(value) = column.get(field.as_str()) {
                    self.field(&format!("{path}.{field}"), value, rule, Some(&display));
                }
            }

            if let Some(Value::Mapping(derivation)) = column.get("derivation") {
                self.derivation(&format!("{path}.derivation"), &display, derivation);
            }
            if let Some(Value::Mapping(validation)) = column.get("validation") {
                let column_type = column
                    .get("type")
                    .and_then(Value::as_str)
                    .and_then(|text| text.parse::<ColumnType>().ok());
                self.validation_rule(&format!("{path}.validation"), &display, column_type, validation);
            }
        }

        if !duplicates.is_empty() {
            self.report.push(
                "duplicate_columns",
                Severity::Error,
                COLUMNS_KEY,
                format!("Duplicate column names found: {}", duplicates.join(", ")),
            );
        }
    }

    fn derivation(&mut self, path: &str, column: &str, derivation: &Mapping) {
        if let Some(kind) = derivation.get("kind").and_then(Value::as_str)
            && kind.parse::<DerivationKind>().is_err()
        {
            self.report.push(
                "invalid_derivation",
                Severity::Error,
                format!("{path}.kind"),
                format!("Column '{column}' declares unknown derivation kind '{kind}'"),
            );
            return;
        }
        let Some(kind) = derivation_kind(derivation) else {
            self.report.push(
                "invalid_derivation",
                Severity::Error,
                path,
                format!(
                    "Column '{column}' derivation must declare one of: constant, source, aggregation, cut, condition, function"
                ),
            );
            return;
        };

        let needs_source = matches!(
            kind,
            DerivationKind::Source | DerivationKind::Aggregation | DerivationKind::Categorization
        );
        if needs_source {
            match derivation.get("source") {
                Some(Value::String(source)) => {
                    if ColumnRef::parse(source).is_err() {
                        self.report.push(
                            "invalid_reference",
                            Severity::Error,
                            format!("{path}.source"),
                            format!("Column '{column}' has invalid source reference '{source}'"),
                        );
                    }
                }
                _ => self.missing(path, column, kind, "source"),
            }
        }

        if let Some(Value::String(filter)) = derivation.get("filter") {
            self.expression(&format!("{path}.filter"), column, filter, Expr::parse);
        }

        match kind {
            DerivationKind::Constant => {
                if derivation.get("constant").is_none() {
                    self.missing(path, column, kind, "constant");
                }
            }
            DerivationKind::Aggregation => self.aggregation(path, column, derivation),
            DerivationKind::Categorization => match derivation.get("cut") {
                Some(Value::Mapping(cuts)) if !cuts.is_empty() => {
                    for (predicate, _) in cuts {
                        let text = scalar_text(predicate);
                        self.expression(
                            &format!("{path}.cut"),
                            column,
                            &text,
                            Expr::parse_cut,
                        );
                    }
                }
                _ => self.missing(path, column, kind, "cut"),
            },
            DerivationKind::Conditional => match derivation.get("condition") {
                Some(Value::Sequence(branches)) if !branches.is_empty() => {
                    for (index, branch) in branches.iter().enumerate() {
                        let branch_path = format!("{path}.condition[{index}]");
                        if branch.get("else").is_some() {
                            continue;
                        }
                        match branch.get("when") {
                            Some(Value::String(when)) => {
                                self.expression(&branch_path, column, when, Expr::parse);
                            }
                            _ => self.missing(&branch_path, column, kind, "when"),
                        }
                        if branch.get("then").is_none() {
                            self.missing(&branch_path, column, kind, "then");
                        }
                    }
                }
                _ => self.missing(path, column, kind, "condition"),
            },
            DerivationKind::Function => match derivation.get("function") {
                Some(Value::String(name)) if !name.trim().is_empty() => {}
                _ => self.missing(path, column, kind, "function"),
            },
            DerivationKind::Source => {}
        }
    }

    fn aggregation(&mut self, path: &str, column: &str, derivation: &Mapping) {
        let function = match derivation.get("aggregation") {
            Some(Value::String(name)) => Some(name.as_str()),
            Some(Value::Mapping(aggregation)) => {
                aggregation.get("function").and_then(Value::as_str)
            }
            _ => None,
        };
        let Some(function) = function else {
            self.missing(path, column, DerivationKind::Aggregation, "aggregation.function");
            return;
        };
        let listed = &self.rules.derivation.functions;
        let known = if listed.is_empty() {
            function.parse::<AggregationFunction>().is_ok()
        } else {
            listed.iter().any(|name| name == function)
                && function.parse::<AggregationFunction>().is_ok()
        };
        if !known {
            self.report.push(
                "invalid_aggregation_function",
                Severity::Error,
                format!("{path}.aggregation.function"),
                format!("Column '{column}' uses unknown aggregation function '{function}'"),
            );
        }
    }

    fn expression(
        &mut self,
        path: &str,
        column: &str,
        text: &str,
        parse: fn(&str) -> std::result::Result<Expr, adam_model::ExprError>,
    ) {
        if let Err(err) = parse(text) {
            self.report.push(
                "invalid_expression",
                Severity::Error,
                path,
                format!("Column '{column}' has an invalid expression: {err}"),
            );
        }
    }

    fn missing(&mut self, path: &str, column: &str, kind: DerivationKind, field: &str) {
        self.report.push(
            "missing_derivation_field",
            Severity::Error,
            format!("{path}.{field}"),
            format!("Column '{column}' {kind} derivation requires '{field}'"),
        );
    }

    fn validation_rule(
        &mut self,
        path: &str,
        column: &str,
        column_type: Option<ColumnType>,
        rule: &Mapping,
    ) {
        let number = |key: &str| rule.get(key).and_then(Value::as_f64);

        if let (Some(min), Some(max)) = (number("min"), number("max"))
            && min > max
        {
            self.report.push(
                "invalid_range",
                Severity::Error,
                path,
                format!("Column '{column}' validation min {min} is greater than max {max}"),
            );
        }

        if let Some(Value::Mapping(length)) = rule.get("length") {
            let min = length.get("min").and_then(Value::as_u64);
            let max = length.get("max").and_then(Value::as_u64);
            if let (Some(min), Some(max)) = (min, max)
                && min > max
            {
                self.report.push(
                    "invalid_range",
                    Severity::Error,
                    format!("{path}.length"),
                    format!("Column '{column}' length min {min} is greater than max {max}"),
                );
            }
        }

        if let Some(percentage) = number("maximum_missing_percentage")
            && !(0.0..=100.0).contains(&percentage)
        {
            self.report.push(
                "invalid_range",
                Severity::Error,
                format!("{path}.maximum_missing_percentage"),
                format!(
                    "Column '{column}' maximum_missing_percentage {percentage} is outside 0..100"
                ),
            );
        }

        match column_type {
            Some(column_type) if column_type.is_numeric() => {
                let string_rules: Vec<&str> = ["pattern", "length", "min_length", "max_length"]
                    .into_iter()
                    .filter(|key| rule.get(*key).is_some())
                    .collect();
                if !string_rules.is_empty() {
                    self.report.push(
                        "type_consistency",
                        Severity::Warning,
                        path,
                        format!(
                            "Numeric column '{column}' has string validation rules: {}",
                            string_rules.join(", ")
                        ),
                    );
                }
            }
            Some(ColumnType::String) => {
                for key in ["min", "max"] {
                    if rule.get(key).is_some_and(Value::is_number) {
                        self.report.push(
                            "type_consistency",
                            Severity::Warning,
                            format!("{path}.{key}"),
                            format!("String column '{column}' has numeric {key} validation"),
                        );
                    }
                }
            }
            _ => {}
        }
    }

    fn key(&mut self, document: &Mapping) {
        let Some(Value::Sequence(key)) = document.get("key") else {
            return;
        };
        let declared: HashSet<&str> = document
            .get(COLUMNS_KEY)
            .and_then(Value::as_sequence)
            .map(|columns| {
                columns
                    .iter()
                    .filter_map(|column| column.get("name").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();

        for name in key.iter().filter_map(Value::as_str) {
            if !declared.contains(name) && !self.rules.is_identifier(name) {
                self.report.push(
                    "key_variable_not_found",
                    Severity::Error,
                    "key",
                    format!("Key variable '{name}' is neither a declared column nor a known identifier"),
                );
            }
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => String::new(),
    }
}
