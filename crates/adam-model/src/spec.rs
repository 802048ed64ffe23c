//! Resolved specification: the typed form of a merged document.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::column_ref::ColumnRef;
use crate::derivation::Derivation;
use crate::enums::{ColumnType, CoreDesignation};
use crate::value::Literal;

/// A fully resolved ADaM dataset specification.
///
/// Built once per run from the merged document chain and shared read-only
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specification {
    /// Dataset name, e.g. `ADSL`.
    pub domain: String,
    /// Columns identifying one output row.
    pub key: Vec<String>,
    /// Directory holding the source tables, relative to the document.
    #[serde(default, alias = "sdtm_dir", skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,
    /// Rule-set document used for schema validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<PathBuf>,
    pub columns: Vec<Column>,
}

impl Specification {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    pub fn is_key(&self, name: &str) -> bool {
        self.key.iter().any(|key| key == name)
    }

    /// Source columns read by every derivation, grouped by domain.
    ///
    /// References to the specification's own domain point at the table being
    /// derived and are left out.
    pub fn source_columns(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut by_domain: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for column in &self.columns {
            for reference in column.derivation.references() {
                if let Some(domain) = self.source_domain(reference) {
                    by_domain
                        .entry(domain.to_string())
                        .or_default()
                        .insert(reference.column.clone());
                }
            }
        }
        by_domain
    }

    /// Source domains referenced anywhere in the specification.
    pub fn referenced_domains(&self) -> BTreeSet<String> {
        self.source_columns().into_keys().collect()
    }

    /// Domain the key columns are copied from, if any key column has a
    /// plain source derivation.
    pub fn key_domain(&self) -> Option<&str> {
        self.key.iter().find_map(|key| {
            let column = self.column(key)?;
            match &column.derivation {
                Derivation::Source(rule) => self.source_domain(&rule.source),
                _ => None,
            }
        })
    }

    fn source_domain<'a>(&self, reference: &'a ColumnRef) -> Option<&'a str> {
        reference
            .domain
            .as_deref()
            .filter(|domain| !domain.eq_ignore_ascii_case(&self.domain))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: ColumnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core: Option<CoreDesignation>,
    pub derivation: Derivation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRule>,
}

impl Column {
    /// Label, falling back to the column name.
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// Value checks run against a derived column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<Literal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<Literal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Literal>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub not_null: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_missing_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<LengthRule>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LengthRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,
}
