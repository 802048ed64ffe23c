use std::cell::Cell;
use std::sync::Arc;

use adam_derive::{
    DerivationEngine, DeriveError, EngineOptions, FrameStore, FunctionRegistry, ProgressObserver,
    SourceNamespace, derive,
};
use adam_model::{Literal, Specification};
use polars::prelude::*;

fn spec(yaml: &str) -> Arc<Specification> {
    Arc::new(serde_yaml::from_str(yaml).expect("parse specification"))
}

fn options() -> EngineOptions {
    EngineOptions::default().with_parallel_load(false)
}

fn frame(columns: Vec<Column>) -> DataFrame {
    DataFrame::new(columns).expect("frame")
}

fn strings(df: &DataFrame, name: &str) -> Vec<Option<String>> {
    df.column(name)
        .expect("column")
        .str()
        .expect("string column")
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect()
}

fn floats(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
    df.column(name)
        .expect("column")
        .f64()
        .expect("float column")
        .into_iter()
        .collect()
}

fn ints(df: &DataFrame, name: &str) -> Vec<Option<i64>> {
    df.column(name)
        .expect("column")
        .i64()
        .expect("integer column")
        .into_iter()
        .collect()
}

fn some(values: &[&str]) -> Vec<Option<String>> {
    values.iter().map(|v| Some((*v).to_string())).collect()
}

fn dm() -> DataFrame {
    frame(vec![
        Column::new("USUBJID".into(), &["01", "02", "03"]),
        Column::new("AGE".into(), &[10i64, 25, 18]),
        Column::new("SEX".into(), &["F", "M", "U"]),
        Column::new("ARMCD".into(), &["SCRNFAIL", "A", "B"]),
        Column::new("RFSTDTC".into(), &["2024-01-12", "2024-02-02", "2024-03-01"]),
    ])
}

const USUBJID: &str = "
  - name: USUBJID
    type: string
    derivation:
      source: DM.USUBJID
";

#[test]
fn mean_and_filtered_count_per_subject() {
    let dm = frame(vec![Column::new("USUBJID".into(), &["01", "02"])]);
    let vs = frame(vec![
        Column::new("USUBJID".into(), &["01", "01", "02"]),
        Column::new("VSSTRESN".into(), &[10.0, 20.0, 5.0]),
    ]);
    let store = FrameStore::new().with_table("DM", dm).with_table("VS", vs);
    let spec = spec(&format!(
        "domain: ADVS
key: [USUBJID]
columns:{USUBJID}
  - name: MEANVAL
    type: float
    derivation:
      source: VS.VSSTRESN
      aggregation: mean
  - name: NREC
    type: integer
    derivation:
      source: VS.VSSTRESN
      filter: VS.VSSTRESN != 20
      aggregation: count
"
    ));

    let out = derive(spec, &store, options()).expect("derive");
    assert_eq!(strings(&out, "USUBJID"), some(&["01", "02"]));
    assert_eq!(floats(&out, "MEANVAL"), vec![Some(15.0), Some(5.0)]);
    assert_eq!(ints(&out, "NREC"), vec![Some(1), Some(1)]);
}

#[test]
fn count_is_zero_and_mean_null_without_rows() {
    let vs = frame(vec![
        Column::new("USUBJID".into(), &["01", "03"]),
        Column::new("VSSTRESN".into(), &[Some(4.0), None]),
    ]);
    let store = FrameStore::new().with_table("DM", dm()).with_table("VS", vs);
    let spec = spec(&format!(
        "domain: ADVS
key: [USUBJID]
columns:{USUBJID}
  - name: NREC
    type: integer
    derivation:
      source: VS.VSSTRESN
      aggregation: count
  - name: TOTAL
    type: float
    derivation:
      source: VS.VSSTRESN
      aggregation: sum
"
    ));

    let out = derive(spec, &store, options()).expect("derive");
    assert_eq!(ints(&out, "NREC"), vec![Some(1), Some(0), Some(1)]);
    assert_eq!(floats(&out, "TOTAL"), vec![Some(4.0), None, None]);
}

#[test]
fn categorization_and_conditional_on_derived_column() {
    let store = FrameStore::new().with_table("DM", dm());
    let spec = spec(&format!(
        "domain: ADSL
key: [USUBJID]
columns:{USUBJID}
  - name: AGE
    type: integer
    derivation:
      source: DM.AGE
  - name: AGEGR1
    type: string
    derivation:
      source: DM.AGE
      cut:
        '<18': Young
        '>=18': Adult
  - name: ADULTFL
    type: string
    derivation:
      condition:
        - when: AGE >= 18
          then: Y
        - else: N
"
    ));

    let out = derive(spec, &store, options()).expect("derive");
    assert_eq!(strings(&out, "AGEGR1"), some(&["Young", "Adult", "Adult"]));
    assert_eq!(strings(&out, "ADULTFL"), some(&["N", "Y", "Y"]));
    let names: Vec<&str> = out.get_column_names().into_iter().map(|n| n.as_str()).collect();
    assert_eq!(names, vec!["USUBJID", "AGE", "AGEGR1", "ADULTFL"]);
}

#[test]
fn conditional_falls_back_to_default() {
    let store = FrameStore::new().with_table("DM", dm());
    let spec = spec(&format!(
        "domain: ADSL
key: [USUBJID]
columns:{USUBJID}
  - name: SAFFL
    type: string
    derivation:
      condition:
        - when: DM.ARMCD == 'SCRNFAIL'
          then: N
      default: Y
  - name: TRTFL
    type: string
    derivation:
      condition:
        - when: DM.ARMCD == 'A'
          then: {{source: DM.ARMCD}}
"
    ));

    let out = derive(spec, &store, options()).expect("derive");
    assert_eq!(strings(&out, "SAFFL"), some(&["N", "Y", "Y"]));
    assert_eq!(
        strings(&out, "TRTFL"),
        vec![None, Some("A".to_string()), None]
    );
}

#[test]
fn categorization_default_covers_missing_subject() {
    let dm = frame(vec![
        Column::new("USUBJID".into(), &["01", "02"]),
        Column::new("AGE".into(), &[Some(10i64), None]),
    ]);
    let store = FrameStore::new().with_table("DM", dm);
    let spec = spec(&format!(
        "domain: ADSL
key: [USUBJID]
columns:{USUBJID}
  - name: AGEGR1
    type: string
    derivation:
      source: DM.AGE
      cut:
        '<18': Young
        '>=18': Adult
      default: Unknown
  - name: AGEGR2
    type: string
    derivation:
      source: DM.AGE
      cut:
        '>=18': Adult
"
    ));

    let out = derive(spec, &store, options()).expect("derive");
    assert_eq!(strings(&out, "AGEGR1"), some(&["Young", "Unknown"]));
    assert_eq!(strings(&out, "AGEGR2"), vec![None, None]);
}

#[test]
fn conditional_outcome_reads_derived_column_by_name() {
    let store = FrameStore::new().with_table("DM", dm());
    let spec = spec(&format!(
        "domain: ADSL
key: [USUBJID]
columns:{USUBJID}
  - name: TRT01P
    type: string
    derivation:
      source: DM.ARMCD
  - name: TRT01A
    type: string
    derivation:
      condition:
        - when: DM.ARMCD != 'SCRNFAIL'
          then: TRT01P
      default: Untreated
"
    ));

    let out = derive(spec, &store, options()).expect("derive");
    assert_eq!(strings(&out, "TRT01A"), some(&["Untreated", "A", "B"]));
}

#[test]
fn subjects_outside_key_domain_do_not_need_unique_values() {
    let dm = frame(vec![Column::new("USUBJID".into(), &["01"])]);
    let vs = frame(vec![
        Column::new("USUBJID".into(), &["01", "99", "99"]),
        Column::new("VAL".into(), &[1.0, 2.0, 3.0]),
    ]);
    let store = FrameStore::new().with_table("DM", dm).with_table("VS", vs);
    let spec = spec(&format!(
        "domain: ADVS
key: [USUBJID]
columns:{USUBJID}
  - name: X
    type: float
    derivation:
      source: VS.VAL
  - name: XFL
    type: string
    derivation:
      condition:
        - when: VS.VAL > 0
          then: Y
      default: N
"
    ));

    let out = derive(spec, &store, options()).expect("derive");
    assert_eq!(strings(&out, "USUBJID"), some(&["01"]));
    assert_eq!(floats(&out, "X"), vec![Some(1.0)]);
    assert_eq!(strings(&out, "XFL"), some(&["Y"]));
}

#[test]
fn mapping_leaves_unmapped_values_null() {
    let store = FrameStore::new().with_table("DM", dm());
    let spec = spec(&format!(
        "domain: ADSL
key: [USUBJID]
columns:{USUBJID}
  - name: SEXN
    type: string
    derivation:
      source: DM.SEX
      mapping:
        M: Male
        F: Female
"
    ));

    let out = derive(spec, &store, options()).expect("derive");
    assert_eq!(
        strings(&out, "SEXN"),
        vec![Some("Female".to_string()), Some("Male".to_string()), None]
    );
}

#[test]
fn several_values_per_key_is_an_error() {
    let vs = frame(vec![
        Column::new("USUBJID".into(), &["01", "01"]),
        Column::new("VSSTRESN".into(), &[10.0, 20.0]),
    ]);
    let store = FrameStore::new().with_table("DM", dm()).with_table("VS", vs);
    let spec = spec(&format!(
        "domain: ADVS
key: [USUBJID]
columns:{USUBJID}
  - name: VAL
    type: float
    derivation:
      source: VS.VSSTRESN
"
    ));

    let err = derive(spec, &store, options()).expect_err("ambiguous source");
    match &err {
        DeriveError::Column { column, .. } => assert_eq!(column, "VAL"),
        other => panic!("expected column error, got {other:?}"),
    }
    match err.root() {
        DeriveError::KeyUniquenessViolation { key, values } => {
            assert_eq!(key, "USUBJID=01");
            assert_eq!(values.len(), 2);
        }
        other => panic!("expected uniqueness violation, got {other:?}"),
    }
}

#[test]
fn unknown_function_lists_registered_names() {
    let store = FrameStore::new().with_table("DM", dm());
    let spec = spec(&format!(
        "domain: ADSL
key: [USUBJID]
columns:{USUBJID}
  - name: X
    type: float
    derivation:
      function: not_registered
"
    ));

    let err = derive(spec, &store, options()).expect_err("unknown function");
    match err.root() {
        DeriveError::UnknownFunction { name, available } => {
            assert_eq!(name, "not_registered");
            assert!(available.contains("get_bmi"));
        }
        other => panic!("expected unknown function, got {other:?}"),
    }
}

#[test]
fn missing_domain_fails_loading() {
    let store = FrameStore::new().with_table("DM", dm());
    let spec = spec(&format!(
        "domain: ADLB
key: [USUBJID]
columns:{USUBJID}
  - name: LBVAL
    type: float
    derivation:
      source: LB.LBSTRESN
      aggregation: max
"
    ));

    let err = derive(spec, &store, options()).expect_err("LB is absent");
    assert!(
        matches!(&err, DeriveError::MissingSource { domain, .. } if domain == "LB"),
        "got {err:?}"
    );
}

#[test]
fn missing_column_fails_loading() {
    let store = FrameStore::new().with_table("DM", dm());
    let spec = spec(&format!(
        "domain: ADSL
key: [USUBJID]
columns:{USUBJID}
  - name: RACE
    type: string
    derivation:
      source: DM.RACE
"
    ));

    let err = derive(spec, &store, options()).expect_err("RACE is absent");
    assert!(err.to_string().contains("RACE"), "got {err}");
}

#[test]
fn closest_picks_nearest_date_and_first_on_ties() {
    let vs = frame(vec![
        Column::new("USUBJID".into(), &["01", "01", "01", "02", "02"]),
        Column::new(
            "VSDTC".into(),
            &["2024-01-01", "2024-01-10", "2024-01-20", "2024-02-01", "2024-02-03"],
        ),
        Column::new("VSSTRESN".into(), &[70.0, 72.0, 74.0, 60.0, 62.0]),
    ]);
    let store = FrameStore::new().with_table("DM", dm()).with_table("VS", vs);
    let spec = spec(&format!(
        "domain: ADSL
key: [USUBJID]
columns:{USUBJID}
  - name: WEIGHTBL
    type: float
    derivation:
      source: VS.VSSTRESN
      aggregation:
        function: closest
        target: DM.RFSTDTC
"
    ));

    let out = derive(spec, &store, options()).expect("derive");
    assert_eq!(floats(&out, "WEIGHTBL"), vec![Some(72.0), Some(60.0), None]);
}

#[test]
fn bmi_from_earlier_columns() {
    let vs = frame(vec![
        Column::new("USUBJID".into(), &["01", "01", "02", "02"]),
        Column::new("VSTESTCD".into(), &["HEIGHT", "WEIGHT", "HEIGHT", "WEIGHT"]),
        Column::new("VSSTRESN".into(), &[175.0, 70.0, 180.0, 81.0]),
    ]);
    let store = FrameStore::new().with_table("DM", dm()).with_table("VS", vs);
    let spec = spec(&format!(
        "domain: ADSL
key: [USUBJID]
columns:{USUBJID}
  - name: HEIGHTBL
    type: float
    derivation:
      source: VS.VSSTRESN
      filter: VS.VSTESTCD == 'HEIGHT'
      aggregation: first
  - name: WEIGHTBL
    type: float
    derivation:
      source: VS.VSSTRESN
      filter: VS.VSTESTCD == 'WEIGHT'
      aggregation: first
  - name: BMIBL
    type: float
    derivation:
      function: get_bmi
      args:
        height: HEIGHTBL
        weight: WEIGHTBL
"
    ));

    let out = derive(spec, &store, options()).expect("derive");
    assert_eq!(floats(&out, "BMIBL"), vec![Some(22.9), Some(25.0), None]);
}

#[test]
fn custom_functions_merge_into_builtins() {
    let mut custom = FunctionRegistry::new();
    custom.register("double", |args| {
        Ok(args
            .number("x", 0)?
            .map_or(Literal::Null, |x| Literal::Float(x * 2.0)))
    });
    let spec = spec(&format!(
        "domain: ADSL
key: [USUBJID]
columns:{USUBJID}
  - name: AGE2
    type: float
    derivation:
      function: double
      args: [DM.AGE]
"
    ));
    let store = FrameStore::new().with_table("DM", dm());
    let sources = SourceNamespace::load(&spec, &store, &options()).expect("sources");
    let out = DerivationEngine::new(spec, sources)
        .with_registry(FunctionRegistry::with_builtins().merge(custom))
        .build()
        .expect("build");
    assert_eq!(floats(&out, "AGE2"), vec![Some(20.0), Some(50.0), Some(36.0)]);
}

#[test]
fn forward_reference_is_rejected() {
    let store = FrameStore::new().with_table("DM", dm());
    let spec = spec(&format!(
        "domain: ADSL
key: [USUBJID]
columns:{USUBJID}
  - name: FLAG
    type: string
    derivation:
      condition:
        - when: LATER == 1
          then: Y
  - name: LATER
    type: integer
    derivation:
      constant: 1
"
    ));

    let err = derive(spec, &store, options()).expect_err("LATER is not derived yet");
    assert!(matches!(
        err.root(),
        DeriveError::InvalidDerivationSpec(message) if message.contains("LATER")
    ));
}

#[test]
fn progress_observer_sees_every_derived_column() {
    #[derive(Default)]
    struct Counter {
        started: Cell<usize>,
        finished: Cell<usize>,
    }

    impl ProgressObserver for Counter {
        fn column_started(&self, _index: usize, total: usize, _column: &str) {
            assert_eq!(total, 2);
            self.started.set(self.started.get() + 1);
        }

        fn column_finished(&self, _index: usize, _total: usize, _column: &str) {
            self.finished.set(self.finished.get() + 1);
        }
    }

    let spec = spec(&format!(
        "domain: ADSL
key: [USUBJID]
columns:{USUBJID}
  - name: STUDYID
    type: string
    derivation:
      constant: STUDY01
  - name: AGE
    type: integer
    derivation:
      source: DM.AGE
"
    ));
    let store = FrameStore::new().with_table("DM", dm());
    let sources = SourceNamespace::load(&spec, &store, &options()).expect("sources");
    let counter = Counter::default();
    let out = DerivationEngine::new(spec, sources)
        .build_with(&counter)
        .expect("build");

    assert_eq!(counter.started.get(), 2);
    assert_eq!(counter.finished.get(), 2);
    assert_eq!(strings(&out, "STUDYID"), some(&["STUDY01"; 3]));
}
