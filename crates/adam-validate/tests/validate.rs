use adam_model::Specification;
use adam_validate::{Issue, Severity, validate_dataset};
use polars::prelude::*;

const SPEC: &str = r"
domain: ADSL
key: [USUBJID]
columns:
  - name: USUBJID
    type: string
    derivation:
      source: DM.USUBJID
    validation:
      pattern: 'S1-\d{3}'
  - name: AGE
    type: integer
    derivation:
      source: DM.AGE
    validation:
      not_null: true
      maximum_missing_percentage: 10
      min: 18
      max: 80
  - name: SEX
    type: string
    derivation:
      source: DM.SEX
    validation:
      allowed_values: [M, F]
  - name: SAFFL
    type: string
    derivation:
      source: DM.SAFFL
";

fn spec() -> Specification {
    serde_yaml::from_str(SPEC).expect("parse specification")
}

fn adsl() -> DataFrame {
    DataFrame::new(vec![
        Column::new("USUBJID".into(), &["S1-001", "S1-002", "S1-002", "X9"]),
        Column::new("AGE".into(), &[Some(17i64), Some(40), None, Some(85)]),
        Column::new("SEX".into(), &["M", "F", "F", "U"]),
    ])
    .expect("frame")
}

#[test]
fn report_lists_every_finding() {
    let report = validate_dataset(&adsl(), &spec());

    assert!(report.has_errors());
    assert_eq!(report.error_count(), 7);
    assert_eq!(report.warning_count(), 1);
    insta::assert_snapshot!(report.to_string(), @r"
    ADSL: 4 rows, 7 errors, 1 warnings
      [Error] column_missing: Column SAFFL is missing
      [Error] duplicate_key: Key (USUBJID) has 1 duplicate rows (e.g., S1-002)
      [Error] pattern: Column USUBJID has 1 values not matching S1-\d{3} (e.g., X9)
      [Error] not_null: Column AGE has 1 missing values
      [Error] min: Column AGE has 1 values below 18 (lowest 17)
      [Error] max: Column AGE has 1 values above 80 (highest 85)
      [Error] allowed_values: Column SEX has 1 values not allowed: U
      [Warning] maximum_missing_percentage: Column AGE is 25.0% missing (allowed 10%)
    ");
}

#[test]
fn clean_dataset_has_no_issues() {
    let df = DataFrame::new(vec![
        Column::new("USUBJID".into(), &["S1-001", "S1-002"]),
        Column::new("AGE".into(), &[30i64, 41]),
        Column::new("SEX".into(), &["M", "F"]),
        Column::new("SAFFL".into(), &["Y", "N"]),
    ])
    .expect("frame");

    let report = validate_dataset(&df, &spec());

    assert!(report.is_clean());
    assert!(!report.has_errors());
    let json = serde_json::to_value(&report).expect("json");
    assert_eq!(json["domain"], "ADSL");
    assert_eq!(json["rows"], 2);
    assert_eq!(json["issues"].as_array().map(Vec::len), Some(0));
}

#[test]
fn missing_key_column_skips_duplicate_check() {
    let df = DataFrame::new(vec![Column::new("AGE".into(), &[30i64, 30])]).expect("frame");

    let report = validate_dataset(&df, &spec());

    assert_eq!(
        report.issues.first(),
        Some(&Issue::KeyColumnMissing {
            column: "USUBJID".to_string()
        })
    );
    assert!(
        !report
            .issues
            .iter()
            .any(|issue| matches!(issue, Issue::DuplicateKey { .. }))
    );
    assert!(
        report
            .issues
            .iter()
            .all(|issue| issue.severity() == Severity::Error)
    );
}
