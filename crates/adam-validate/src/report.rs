use std::fmt;

use serde::Serialize;

use crate::issue::{Issue, Severity};

/// Issues found in one derived dataset.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatasetReport {
    pub domain: String,
    pub rows: usize,
    pub issues: Vec<Issue>,
}

impl DatasetReport {
    pub fn new(domain: &str, rows: usize) -> Self {
        Self {
            domain: domain.to_string(),
            rows,
            issues: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|issue| issue.severity() == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity() == severity)
            .count()
    }

    /// Issues ordered errors first, keeping check order within a severity.
    pub fn sorted_issues(&self) -> Vec<&Issue> {
        let mut issues: Vec<&Issue> = self.issues.iter().collect();
        issues.sort_by_key(|issue| issue.severity());
        issues
    }
}

impl fmt::Display for DatasetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} rows, {} errors, {} warnings",
            self.domain,
            self.rows,
            self.error_count(),
            self.warning_count()
        )?;
        for issue in self.sorted_issues() {
            writeln!(
                f,
                "  [{}] {}: {}",
                issue.severity().label(),
                issue.code(),
                issue.message()
            )?;
        }
        Ok(())
    }
}
