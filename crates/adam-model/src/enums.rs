//! Type-safe enumerations for ADaM specification fields.
//!
//! Every enum accepts the legacy spellings found in older specification
//! documents through serde aliases and [`FromStr`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declared data type of a derived column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[serde(alias = "str")]
    String,
    #[serde(alias = "int")]
    Integer,
    Float,
    Date,
    Datetime,
}

impl ColumnType {
    pub const ALL: [ColumnType; 5] = [
        ColumnType::String,
        ColumnType::Integer,
        ColumnType::Float,
        ColumnType::Date,
        ColumnType::Datetime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Date => "date",
            ColumnType::Datetime => "datetime",
        }
    }

    /// True for integer and float columns.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, ColumnType::Date | ColumnType::Datetime)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "string" | "str" => Ok(ColumnType::String),
            "integer" | "int" => Ok(ColumnType::Integer),
            "float" => Ok(ColumnType::Float),
            "date" => Ok(ColumnType::Date),
            "datetime" => Ok(ColumnType::Datetime),
            _ => Err(format!("Unknown column type: {s}")),
        }
    }
}

/// Core designation of an analysis variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoreDesignation {
    /// Required by the CDISC ADaM standard.
    CdiscRequired,
    /// Required by the sponsoring organization.
    #[serde(alias = "company-required")]
    OrgRequired,
    Expected,
    Permissible,
}

impl CoreDesignation {
    pub const ALL: [CoreDesignation; 4] = [
        CoreDesignation::CdiscRequired,
        CoreDesignation::OrgRequired,
        CoreDesignation::Expected,
        CoreDesignation::Permissible,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CoreDesignation::CdiscRequired => "cdisc-required",
            CoreDesignation::OrgRequired => "org-required",
            CoreDesignation::Expected => "expected",
            CoreDesignation::Permissible => "permissible",
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(self, CoreDesignation::CdiscRequired | CoreDesignation::OrgRequired)
    }
}

impl fmt::Display for CoreDesignation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoreDesignation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cdisc-required" => Ok(CoreDesignation::CdiscRequired),
            "org-required" | "company-required" => Ok(CoreDesignation::OrgRequired),
            "expected" => Ok(CoreDesignation::Expected),
            "permissible" => Ok(CoreDesignation::Permissible),
            _ => Err(format!("Unknown core designation: {s}")),
        }
    }
}

/// Reduction applied by an aggregation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationFunction {
    First,
    Last,
    Mean,
    Median,
    Min,
    Max,
    Sum,
    Count,
    /// Value whose comparison column is nearest the reference.
    Closest,
}

impl AggregationFunction {
    pub const ALL: [AggregationFunction; 9] = [
        AggregationFunction::First,
        AggregationFunction::Last,
        AggregationFunction::Mean,
        AggregationFunction::Median,
        AggregationFunction::Min,
        AggregationFunction::Max,
        AggregationFunction::Sum,
        AggregationFunction::Count,
        AggregationFunction::Closest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationFunction::First => "first",
            AggregationFunction::Last => "last",
            AggregationFunction::Mean => "mean",
            AggregationFunction::Median => "median",
            AggregationFunction::Min => "min",
            AggregationFunction::Max => "max",
            AggregationFunction::Sum => "sum",
            AggregationFunction::Count => "count",
            AggregationFunction::Closest => "closest",
        }
    }

    /// Functions that only accept numeric input.
    pub fn requires_numeric(&self) -> bool {
        matches!(
            self,
            AggregationFunction::Mean | AggregationFunction::Median | AggregationFunction::Sum
        )
    }
}

impl fmt::Display for AggregationFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        AggregationFunction::ALL
            .into_iter()
            .find(|function| function.as_str() == normalized)
            .ok_or_else(|| format!("Unknown aggregation function: {s}"))
    }
}

/// The six derivation rule kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivationKind {
    Constant,
    Source,
    Aggregation,
    Categorization,
    Conditional,
    Function,
}

impl DerivationKind {
    pub const ALL: [DerivationKind; 6] = [
        DerivationKind::Constant,
        DerivationKind::Source,
        DerivationKind::Aggregation,
        DerivationKind::Categorization,
        DerivationKind::Conditional,
        DerivationKind::Function,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DerivationKind::Constant => "constant",
            DerivationKind::Source => "source",
            DerivationKind::Aggregation => "aggregation",
            DerivationKind::Categorization => "categorization",
            DerivationKind::Conditional => "conditional",
            DerivationKind::Function => "function",
        }
    }

    /// Detects the kind from the keys present on a derivation mapping.
    ///
    /// Checks run in a fixed order: `condition`, `constant`, `function`,
    /// `cut`, `source` with `aggregation`, then `source`. Returns `None`
    /// when no discriminating key is present.
    pub fn detect<'a>(keys: impl IntoIterator<Item = &'a str>) -> Option<DerivationKind> {
        let keys: Vec<&str> = keys.into_iter().collect();
        let has = |name: &str| keys.iter().any(|key| *key == name);
        if has("condition") {
            Some(DerivationKind::Conditional)
        } else if has("constant") {
            Some(DerivationKind::Constant)
        } else if has("function") {
            Some(DerivationKind::Function)
        } else if has("cut") {
            Some(DerivationKind::Categorization)
        } else if has("source") && has("aggregation") {
            Some(DerivationKind::Aggregation)
        } else if has("source") {
            Some(DerivationKind::Source)
        } else {
            None
        }
    }
}

impl fmt::Display for DerivationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DerivationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        DerivationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("Unknown derivation kind: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_type_accepts_legacy_aliases() {
        let parsed: Vec<ColumnType> =
            serde_yaml::from_str("[str, int, float, date, datetime]").expect("parse types");
        assert_eq!(parsed, ColumnType::ALL.to_vec());
        assert_eq!("Int".parse::<ColumnType>(), Ok(ColumnType::Integer));
    }

    #[test]
    fn core_designation_alias() {
        let core: CoreDesignation =
            serde_yaml::from_str("company-required").expect("parse core");
        assert_eq!(core, CoreDesignation::OrgRequired);
        assert_eq!(core.to_string(), "org-required");
        assert!(core.is_required());
    }

    #[test]
    fn aggregation_function_round_trip() {
        for function in AggregationFunction::ALL {
            assert_eq!(function.as_str().parse::<AggregationFunction>(), Ok(function));
        }
        assert!("average".parse::<AggregationFunction>().is_err());
    }

    #[test]
    fn derivation_kind_detection_order() {
        assert_eq!(
            DerivationKind::detect(["source", "condition"]),
            Some(DerivationKind::Conditional)
        );
        assert_eq!(
            DerivationKind::detect(["source", "aggregation", "filter"]),
            Some(DerivationKind::Aggregation)
        );
        assert_eq!(
            DerivationKind::detect(["source", "cut"]),
            Some(DerivationKind::Categorization)
        );
        assert_eq!(DerivationKind::detect(["source"]), Some(DerivationKind::Source));
        assert_eq!(DerivationKind::detect(["filter"]), None);
    }
}
