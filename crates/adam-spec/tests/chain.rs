use std::fs;
use std::path::Path;

use adam_model::{ColumnType, Derivation, Literal};
use adam_spec::{MemoryStore, SpecBuilder, SpecError, merge_chain};
use serde_yaml::{Mapping, Value};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).expect("write fixture");
}

fn column_names(document: &Mapping) -> Vec<String> {
    document["columns"]
        .as_sequence()
        .expect("columns")
        .iter()
        .filter_map(|column| column["name"].as_str().map(str::to_string))
        .collect()
}

/// Root (company) -> therapeutic area -> study.
fn three_level_chain(dir: &Path) {
    fs::create_dir_all(dir.join("common")).expect("create dir");
    write(
        &dir.join("common"),
        "company.yaml",
        r"
domain: ADSL
key: [USUBJID]
columns:
  - name: STUDYID
    type: str
    core: cdisc-required
    derivation: {source: DM.STUDYID}
  - name: USUBJID
    type: str
    derivation: {source: DM.USUBJID}
  - name: AGE
    type: int
    label: Age
    derivation: {source: DM.AGE}
  - name: RACE
    type: str
    derivation: {source: DM.RACE}
",
    );
    write(
        &dir.join("common"),
        "oncology.yaml",
        r"
parents: [company.yaml]
columns:
  - name: AGEGR1
    type: str
    derivation:
      source: DM.AGE
      cut:
        '<65': '<65'
        '>=65': '>=65'
  - name: RACE
    drop: true
",
    );
    write(
        dir,
        "study.yaml",
        r"
parents: [common/oncology.yaml]
sdtm_dir: sdtm
columns:
  - name: AGE
    label: Age at Screening
  - name: AGEGR1
    derivation:
      cut:
        '>=65': Senior
  - name: SAFFL
    type: str
    derivation:
      condition:
        - when: DM.ARMCD == 'SCRNFAIL'
          then: N
      default: Y
",
    );
}

#[test]
fn three_level_chain_round_trip() {
    let dir = TempDir::new().expect("tempdir");
    three_level_chain(dir.path());

    let loaded = SpecBuilder::new(dir.path().join("study.yaml"))
        .build()
        .expect("build specification");
    let spec = &loaded.specification;

    let names: Vec<&str> = spec.column_names().collect();
    assert_eq!(names, vec!["STUDYID", "USUBJID", "AGE", "AGEGR1", "SAFFL"]);
    assert_eq!(spec.domain, "ADSL");
    assert_eq!(spec.key, vec!["USUBJID"]);

    let age = spec.column("AGE").expect("AGE");
    assert_eq!(age.label(), "Age at Screening");
    assert_eq!(age.data_type, ColumnType::Integer);

    let Derivation::Categorization(rule) = &spec.column("AGEGR1").expect("AGEGR1").derivation
    else {
        panic!("AGEGR1 should stay a categorization");
    };
    // Cut mappings merge key by key.
    assert_eq!(rule.cuts.len(), 2);
    assert_eq!(rule.cuts[0].label, Literal::from("<65"));
    assert_eq!(rule.cuts[1].label, Literal::from("Senior"));

    assert!(loaded.merged.get("parents").is_none());
    assert_eq!(loaded.source_dir(), Some(dir.path().join("sdtm")));
}

#[test]
fn drop_applies_at_any_depth() {
    let dir = TempDir::new().expect("tempdir");
    three_level_chain(dir.path());
    let merged = SpecBuilder::new(dir.path().join("study.yaml"))
        .merged()
        .expect("merge");
    assert!(!column_names(&merged).contains(&"RACE".to_string()));

    // Dropping in the leaf removes a column defined two levels up.
    write(
        dir.path(),
        "study_nostudyid.yaml",
        "parents: [study.yaml]\ncolumns:\n  - {name: STUDYID, drop: true}\n",
    );
    let merged = SpecBuilder::new(dir.path().join("study_nostudyid.yaml"))
        .merged()
        .expect("merge");
    assert_eq!(
        column_names(&merged),
        vec!["USUBJID", "AGE", "AGEGR1", "SAFFL"]
    );
}

#[test]
fn include_tag_splices_columns() {
    let dir = TempDir::new().expect("tempdir");
    write(
        dir.path(),
        "identifiers.yaml",
        "- {name: STUDYID, type: str, derivation: {source: DM.STUDYID}}\n- {name: USUBJID, type: str, derivation: {source: DM.USUBJID}}\n",
    );
    write(
        dir.path(),
        "adsl.yaml",
        "domain: ADSL\nkey: [USUBJID]\ncolumns:\n  - !include identifiers.yaml\n  - {name: AGE, type: int, derivation: {source: DM.AGE}}\n",
    );
    let loaded = SpecBuilder::new(dir.path().join("adsl.yaml"))
        .build()
        .expect("build");
    let names: Vec<&str> = loaded.specification.column_names().collect();
    assert_eq!(names, vec!["STUDYID", "USUBJID", "AGE"]);
}

#[test]
fn cycle_is_reported_with_chain() {
    let mut store = MemoryStore::new();
    store
        .insert_yaml("a", "parents: [b]\ndomain: ADSL\n")
        .expect("insert");
    store.insert_yaml("b", "parents: [c]\n").expect("insert");
    store.insert_yaml("c", "parents: [a]\n").expect("insert");

    match merge_chain(&store, "a") {
        Err(SpecError::MergeCycle { chain }) => assert_eq!(chain, vec!["a", "b", "c", "a"]),
        other => panic!("expected a merge cycle, got {other:?}"),
    }
}

#[test]
fn missing_parent_names_referencing_document() {
    let mut store = MemoryStore::new();
    store
        .insert_yaml("study", "parents: [ta]\ndomain: ADSL\n")
        .expect("insert");
    store.insert_yaml("ta", "parents: [company]\n").expect("insert");

    match merge_chain(&store, "study") {
        Err(SpecError::UnresolvedParent {
            parent,
            referenced_by,
        }) => {
            assert_eq!(parent, "company");
            assert_eq!(referenced_by, "ta");
        }
        other => panic!("expected unresolved parent, got {other:?}"),
    }
}

#[test]
fn closest_parent_wins_over_later_parents() {
    let mut store = MemoryStore::new();
    store
        .insert_yaml("leaf", "parents: [near, far]\n")
        .expect("insert");
    store
        .insert_yaml("near", "domain: ADSL\nkey: [USUBJID]\n")
        .expect("insert");
    store
        .insert_yaml("far", "domain: ADAE\nkey: [STUDYID]\n")
        .expect("insert");

    let merged = merge_chain(&store, "leaf").expect("merge");
    assert_eq!(merged["domain"], Value::from("ADSL"));
}

#[test]
fn schema_errors_block_the_build() {
    let dir = TempDir::new().expect("tempdir");
    write(
        dir.path(),
        "bad.yaml",
        "domain: XX\nkey: [USUBJID]\ncolumns:\n  - {name: AGE, type: int}\n",
    );
    match SpecBuilder::new(dir.path().join("bad.yaml")).build() {
        Err(SpecError::SchemaValidation(report)) => {
            assert_eq!(report.error_count(), 2);
            assert!(report.to_string().contains("required_column_field"));
        }
        other => panic!("expected schema validation failure, got {other:?}"),
    }
}
