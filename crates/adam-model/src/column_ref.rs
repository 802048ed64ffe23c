//! Domain-qualified column references (`DM.AGE`).

use std::fmt;

use serde::{Deserialize, Serialize};

/// A reference to a column, optionally qualified by its domain.
///
/// `DM.AGE` names column `AGE` of source domain `DM`. An unqualified name
/// refers to a column of the table being derived.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColumnRef {
    pub domain: Option<String>,
    pub column: String,
}

impl ColumnRef {
    pub fn new(domain: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            column: column.into(),
        }
    }

    /// Reference to a column of the target table.
    pub fn target(column: impl Into<String>) -> Self {
        Self {
            domain: None,
            column: column.into(),
        }
    }

    /// Parses `DOMAIN.COLUMN` or `COLUMN`.
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        let (domain, column) = match text.split_once('.') {
            Some((domain, column)) => (Some(domain), column),
            None => (None, text),
        };
        if let Some(domain) = domain
            && !is_identifier(domain)
        {
            return Err(format!("invalid domain in column reference '{text}'"));
        }
        if !is_identifier(column) {
            return Err(format!("invalid column reference '{text}'"));
        }
        Ok(Self {
            domain: domain.map(str::to_string),
            column: column.to_string(),
        })
    }

    /// Parses text only when it looks like an upper-case `DOMAIN.COLUMN`
    /// reference; anything else is treated as a literal by callers.
    pub fn parse_qualified(text: &str) -> Option<Self> {
        let (domain, column) = text.trim().split_once('.')?;
        if is_upper_identifier(domain) && is_upper_identifier(column) {
            Some(Self::new(domain, column))
        } else {
            None
        }
    }

    /// True when the reference points at a source domain rather than the
    /// table derived for `target_domain`.
    pub fn is_source(&self, target_domain: &str) -> bool {
        self.domain
            .as_deref()
            .is_some_and(|domain| !domain.eq_ignore_ascii_case(target_domain))
    }

    /// Column name the reference has in a namespace frame: `DM.AGE` for
    /// source columns, the bare name for target columns.
    pub fn frame_name(&self, target_domain: &str) -> String {
        if self.is_source(target_domain) {
            self.to_string()
        } else {
            self.column.clone()
        }
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_upper_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.domain {
            Some(domain) => write!(f, "{domain}.{}", self.column),
            None => f.write_str(&self.column),
        }
    }
}

impl TryFrom<String> for ColumnRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ColumnRef> for String {
    fn from(value: ColumnRef) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_qualified_and_bare() {
        assert_eq!(ColumnRef::parse("DM.AGE"), Ok(ColumnRef::new("DM", "AGE")));
        assert_eq!(ColumnRef::parse("TRTSDT"), Ok(ColumnRef::target("TRTSDT")));
        assert!(ColumnRef::parse("DM.").is_err());
        assert!(ColumnRef::parse("1X").is_err());
    }

    #[test]
    fn qualified_detection_is_strict() {
        assert!(ColumnRef::parse_qualified("VS.VSSTRESN").is_some());
        assert!(ColumnRef::parse_qualified("3.5").is_none());
        assert!(ColumnRef::parse_qualified("HEIGHT").is_none());
        assert!(ColumnRef::parse_qualified("e.g. text").is_none());
    }

    #[test]
    fn frame_name_depends_on_domain() {
        assert_eq!(ColumnRef::new("DM", "AGE").frame_name("ADSL"), "DM.AGE");
        assert_eq!(ColumnRef::new("ADSL", "AGE").frame_name("ADSL"), "AGE");
        assert_eq!(ColumnRef::target("AGE").frame_name("ADSL"), "AGE");
    }
}
