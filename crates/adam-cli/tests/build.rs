use std::fs;
use std::path::Path;

use adam_cli::output::{OutputFormat, write_dataset};
use adam_cli::pipeline::{BuildRequest, build, default_output_path, load_spec};
use adam_cli::progress::BarProgress;
use adam_derive::{EngineOptions, read_table};
use adam_validate::Issue;
use polars::prelude::*;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).expect("write fixture");
}

fn study() -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(dir.path().join("sdtm")).expect("create sdtm dir");
    write(
        &dir.path().join("sdtm"),
        "dm.csv",
        "USUBJID,AGE,SEX\nS1-001,17,F\nS1-002,54,M\nS1-003,61,F\n",
    );
    write(
        &dir.path().join("sdtm"),
        "vs.csv",
        "USUBJID,VSTESTCD,VSSTRESN\n\
         S1-001,WEIGHT,60.0\nS1-001,WEIGHT,62.0\nS1-002,WEIGHT,80.5\nS1-002,HEIGHT,180.0\n",
    );
    write(
        dir.path(),
        "base.yaml",
        r"
domain: ADSL
key: [USUBJID]
source_dir: sdtm
columns:
  - name: USUBJID
    type: str
    derivation: {source: DM.USUBJID}
  - name: AGE
    type: int
    derivation: {source: DM.AGE}
    validation: {min: 18}
  - name: SEX
    type: str
    derivation: {source: DM.SEX}
",
    );
    write(
        dir.path(),
        "adsl.yaml",
        r"
parents: [base.yaml]
columns:
  - name: WEIGHT
    type: float
    derivation:
      source: VS.VSSTRESN
      filter: VS.VSTESTCD == 'WEIGHT'
      aggregation: mean
  - name: SEX
    drop: true
",
    );
    dir
}

#[test]
fn build_writes_dataset_next_to_specification() {
    let dir = study();
    let request = BuildRequest::new(dir.path().join("adsl.yaml"))
        .with_options(EngineOptions::default().with_parallel_load(false))
        .with_check(true);

    let outcome = build(&request, &BarProgress::hidden()).expect("build");

    let expected = dir.path().join("adsl.parquet");
    assert_eq!(outcome.output.as_deref(), Some(expected.as_path()));
    assert_eq!(outcome.source_dir, dir.path().join("sdtm"));
    let names: Vec<String> = outcome
        .dataset
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    assert_eq!(names, ["USUBJID", "AGE", "WEIGHT"]);

    let written = read_table(&expected).expect("read output");
    assert_eq!(written.height(), 3);
    let weights: Vec<Option<f64>> = written
        .column("WEIGHT")
        .expect("WEIGHT")
        .f64()
        .expect("float column")
        .into_iter()
        .collect();
    assert_eq!(weights, vec![Some(61.0), Some(80.5), None]);

    let report = outcome.report.as_ref().expect("dataset report");
    assert!(outcome.has_errors());
    assert_eq!(
        report.issues,
        vec![Issue::BelowMinimum {
            column: "AGE".to_string(),
            count: 1,
            minimum: "18".to_string(),
            lowest: "17".to_string(),
        }]
    );
}

#[test]
fn dry_run_writes_nothing_and_flags_override_document() {
    let dir = study();
    fs::create_dir_all(dir.path().join("other")).expect("create dir");
    write(
        &dir.path().join("other"),
        "dm.csv",
        "USUBJID,AGE,SEX\nS2-001,40,M\n",
    );
    write(
        &dir.path().join("other"),
        "vs.csv",
        "USUBJID,VSTESTCD,VSSTRESN\nS2-001,WEIGHT,70.0\n",
    );
    let request = BuildRequest::new(dir.path().join("adsl.yaml"))
        .with_source_dir(Some(dir.path().join("other")))
        .with_dry_run(true);

    let outcome = build(&request, &BarProgress::hidden()).expect("build");

    assert!(outcome.output.is_none());
    assert!(outcome.report.is_none());
    assert!(!outcome.has_errors());
    assert_eq!(outcome.dataset.height(), 1);
    assert!(!dir.path().join("adsl.parquet").exists());
}

#[test]
fn missing_source_domain_names_the_directory() {
    let dir = study();
    fs::remove_file(dir.path().join("sdtm").join("vs.csv")).expect("remove vs");
    let request = BuildRequest::new(dir.path().join("adsl.yaml")).with_dry_run(true);

    let error = build(&request, &BarProgress::hidden()).expect_err("missing VS");

    let message = format!("{error:#}");
    assert!(message.contains("load source domains"), "{message}");
    assert!(message.contains("VS"), "{message}");
}

#[test]
fn csv_output_follows_extension() {
    let dir = study();
    let loaded = load_spec(&dir.path().join("adsl.yaml"), None).expect("load");
    assert_eq!(
        default_output_path(&loaded, OutputFormat::Csv),
        dir.path().join("adsl.csv")
    );

    let output = dir.path().join("out").join("adsl.csv");
    let request = BuildRequest::new(dir.path().join("adsl.yaml")).with_output(Some(output), None);
    assert_eq!(request.output_format(), OutputFormat::Csv);

    let mut df = DataFrame::new(vec![
        Column::new("USUBJID".into(), &["S1-001"]),
        Column::new("AGE".into(), &[34i64]),
    ])
    .expect("frame");
    let path = dir.path().join("nested").join("adsl.csv");
    write_dataset(&mut df, &path, OutputFormat::Csv).expect("write csv");
    let text = fs::read_to_string(&path).expect("read csv");
    assert_eq!(text, "USUBJID,AGE\nS1-001,34\n");
}
