//! Document merger: folds a chain of parent documents into one.
//!
//! Ancestors are merged root first so that descendants win. Columns merge by
//! `name`, a column carrying `drop: true` removes the inherited column, and a
//! `derivation` whose rule kind changes replaces the inherited one instead of
//! blending two rules together.

use std::time::Instant;

use adam_model::DerivationKind;
use serde_yaml::{Mapping, Value};
use tracing::{debug, info};

use crate::error::{Result, SpecError};
use crate::store::DocumentStore;

pub const PARENTS_KEY: &str = "parents";
pub const COLUMNS_KEY: &str = "columns";
pub const DROP_KEY: &str = "drop";
const NAME_KEY: &str = "name";
const DERIVATION_KEY: &str = "derivation";

/// Loads `leaf` and every ancestor reachable through `parents`, and merges
/// them into one document.
pub fn merge_chain(store: &dyn DocumentStore, leaf: &str) -> Result<Mapping> {
    let start = Instant::now();
    let leaf_id = store.locate(leaf, None);
    let leaf_doc = store
        .load(&leaf_id)?
        .ok_or_else(|| SpecError::DocumentNotFound(leaf_id.clone()))?;

    let mut ordered: Vec<(String, Mapping)> = Vec::new();
    let mut in_progress: Vec<String> = Vec::new();
    collect_chain(store, leaf_id.clone(), leaf_doc, &mut in_progress, &mut ordered)?;

    let chain: Vec<&str> = ordered.iter().map(|(id, _)| id.as_str()).collect();
    debug!(leaf = %leaf_id, chain = ?chain, "resolved document chain");

    let documents: Vec<Mapping> = ordered.into_iter().map(|(_, doc)| doc).collect();
    let merged = merge_documents(&documents);

    info!(
        leaf = %leaf_id,
        documents = documents.len(),
        columns = column_count(&merged),
        duration_ms = start.elapsed().as_millis(),
        "specification merged"
    );
    Ok(merged)
}

/// Depth-first walk producing documents in root-to-leaf order.
///
/// `parents` lists the closest ancestor first, so parents are visited in
/// reverse and the first-listed parent is merged last among them. A document
/// reachable along two paths is merged once, at its first position.
fn collect_chain(
    store: &dyn DocumentStore,
    id: String,
    document: Mapping,
    in_progress: &mut Vec<String>,
    ordered: &mut Vec<(String, Mapping)>,
) -> Result<()> {
    in_progress.push(id.clone());
    let parents = parent_references(&document);
    for parent in parents.iter().rev() {
        let parent_id = store.locate(parent, Some(&id));
        if in_progress.contains(&parent_id) {
            let mut chain = in_progress.clone();
            chain.push(parent_id);
            return Err(SpecError::MergeCycle { chain });
        }
        if ordered.iter().any(|(seen, _)| *seen == parent_id) {
            continue;
        }
        let parent_doc = store
            .load(&parent_id)?
            .ok_or_else(|| SpecError::UnresolvedParent {
                parent: parent.clone(),
                referenced_by: id.clone(),
            })?;
        collect_chain(store, parent_id, parent_doc, in_progress, ordered)?;
    }
    in_progress.pop();
    ordered.push((id, document));
    Ok(())
}

/// `parents` entries of a document; a single string is accepted too.
pub fn parent_references(document: &Mapping) -> Vec<String> {
    match document.get(PARENTS_KEY) {
        Some(Value::String(single)) => vec![single.clone()],
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Merges documents given in root-to-leaf order. The result carries no
/// `parents` key and no tombstones.
pub fn merge_documents(documents: &[Mapping]) -> Mapping {
    let mut merged = Mapping::new();
    for document in documents {
        merge_root(&mut merged, document);
    }
    merged.remove(PARENTS_KEY);
    merged
}

fn merge_root(base: &mut Mapping, overlay: &Mapping) {
    for (key, value) in overlay {
        if key.as_str() == Some(COLUMNS_KEY) {
            let existing = base
                .entry(key.clone())
                .or_insert_with(|| Value::Sequence(Vec::new()));
            match (existing, value) {
                (Value::Sequence(base_columns), Value::Sequence(columns)) => {
                    merge_columns(base_columns, columns);
                }
                (slot, other) => *slot = strip_tombstones(other.clone()),
            }
            continue;
        }
        merge_entry(base, key, value);
    }
}

fn merge_entry(base: &mut Mapping, key: &Value, value: &Value) {
    match (base.get_mut(key), value) {
        (Some(Value::Mapping(existing)), Value::Mapping(incoming)) => {
            deep_merge(existing, incoming);
        }
        _ => {
            base.insert(key.clone(), value.clone());
        }
    }
}

/// Recursive mapping merge: nested mappings merge, everything else replaces.
pub fn deep_merge(base: &mut Mapping, overlay: &Mapping) {
    for (key, value) in overlay {
        merge_entry(base, key, value);
    }
}

fn merge_columns(base: &mut Vec<Value>, overlay: &[Value]) {
    for column in overlay {
        let Some(name) = column_name(column) else {
            // Nameless entries cannot be matched; keep them for the validator.
            base.push(column.clone());
            continue;
        };
        let position = base
            .iter()
            .position(|existing| column_name(existing) == Some(name));

        if is_tombstone(column) {
            if let Some(index) = position {
                debug!(column = name, "column dropped");
                base.remove(index);
            }
            continue;
        }

        match (position, column) {
            (Some(index), Value::Mapping(incoming)) => {
                if let Value::Mapping(existing) = &mut base[index] {
                    merge_column(existing, incoming);
                } else {
                    base[index] = strip_drop_key(column.clone());
                }
            }
            (Some(index), _) => base[index] = column.clone(),
            (None, _) => base.push(strip_drop_key(column.clone())),
        }
    }
}

fn merge_column(existing: &mut Mapping, incoming: &Mapping) {
    for (key, value) in incoming {
        match key.as_str() {
            Some(DROP_KEY) => {}
            Some(DERIVATION_KEY) => merge_derivation(existing, key, value),
            _ => merge_entry(existing, key, value),
        }
    }
}

fn merge_derivation(column: &mut Mapping, key: &Value, incoming: &Value) {
    let replace = match (column.get(key), incoming) {
        (Some(Value::Mapping(existing)), Value::Mapping(overlay)) => {
            match (derivation_kind(existing), derivation_kind(overlay)) {
                (Some(before), Some(after)) => before != after,
                // A partial override such as a lone `filter:` refines the
                // inherited rule.
                _ => false,
            }
        }
        _ => true,
    };
    if replace {
        column.insert(key.clone(), incoming.clone());
    } else {
        merge_entry(column, key, incoming);
    }
}

/// Rule kind of a raw derivation mapping: explicit `kind:` or detected.
pub fn derivation_kind(derivation: &Mapping) -> Option<DerivationKind> {
    if let Some(kind) = derivation.get("kind").and_then(Value::as_str) {
        return kind.parse().ok();
    }
    DerivationKind::detect(derivation.keys().filter_map(Value::as_str))
}

fn column_name(column: &Value) -> Option<&str> {
    column.get(NAME_KEY).and_then(Value::as_str)
}

fn is_tombstone(column: &Value) -> bool {
    column
        .get(DROP_KEY)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn strip_drop_key(mut column: Value) -> Value {
    if let Value::Mapping(mapping) = &mut column {
        mapping.remove(DROP_KEY);
    }
    column
}

fn strip_tombstones(columns: Value) -> Value {
    match columns {
        Value::Sequence(items) => Value::Sequence(
            items
                .into_iter()
                .filter(|column| !is_tombstone(column))
                .map(strip_drop_key)
                .collect(),
        ),
        other => other,
    }
}

fn column_count(document: &Mapping) -> usize {
    document
        .get(COLUMNS_KEY)
        .and_then(Value::as_sequence)
        .map_or(0, Vec::len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).expect("parse test document")
    }

    fn names(document: &Mapping) -> Vec<String> {
        document
            .get(COLUMNS_KEY)
            .and_then(Value::as_sequence)
            .map(|columns| {
                columns
                    .iter()
                    .filter_map(|c| column_name(c).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn child_scalars_win_and_new_columns_append() {
        let parent = doc(
            "domain: ADSL\nkey: [USUBJID]\ncolumns:\n  - {name: USUBJID, type: str}\n  - {name: AGE, type: int, label: Age}\n",
        );
        let child = doc(
            "domain: ADSL\ncolumns:\n  - {name: SEX, type: str}\n  - {name: AGE, label: Age in Years}\n",
        );
        let merged = merge_documents(&[parent, child]);
        assert_eq!(names(&merged), vec!["USUBJID", "AGE", "SEX"]);
        let age = &merged[COLUMNS_KEY][1];
        assert_eq!(age["label"].as_str(), Some("Age in Years"));
        assert_eq!(age["type"].as_str(), Some("int"));
    }

    #[test]
    fn tombstone_removes_inherited_column() {
        let parent = doc("columns:\n  - {name: A, type: str}\n  - {name: B, type: str}\n");
        let child = doc("columns:\n  - {name: A, drop: true}\n  - {name: C, drop: true}\n");
        let merged = merge_documents(&[parent, child]);
        assert_eq!(names(&merged), vec!["B"]);
    }

    #[test]
    fn derivation_kind_change_replaces_rule() {
        let parent = doc(
            "columns:\n  - name: AGEGR1\n    type: str\n    derivation:\n      source: DM.AGE\n      cut: {\"<65\": Young}\n",
        );
        let child = doc("columns:\n  - name: AGEGR1\n    derivation: {constant: ALL}\n");
        let merged = merge_documents(&[parent, child]);
        let derivation = merged[COLUMNS_KEY][0]["derivation"]
            .as_mapping()
            .expect("derivation mapping");
        assert_eq!(derivation.len(), 1);
        assert_eq!(derivation["constant"].as_str(), Some("ALL"));
    }

    #[test]
    fn partial_derivation_refines_inherited_rule() {
        let parent = doc(
            "columns:\n  - name: HEIGHTBL\n    derivation:\n      source: VS.VSSTRESN\n      aggregation: {function: first}\n",
        );
        let child = doc(
            "columns:\n  - name: HEIGHTBL\n    derivation:\n      filter: VS.VSTESTCD == 'HEIGHT'\n",
        );
        let merged = merge_documents(&[parent, child]);
        let derivation = &merged[COLUMNS_KEY][0]["derivation"];
        assert_eq!(derivation["source"].as_str(), Some("VS.VSSTRESN"));
        assert_eq!(
            derivation["filter"].as_str(),
            Some("VS.VSTESTCD == 'HEIGHT'")
        );
    }

    #[test]
    fn sequences_replace_and_parents_are_stripped() {
        let parent = doc("key: [STUDYID, USUBJID]\n");
        let child = doc("parents: [base.yaml]\nkey: [USUBJID]\n");
        let merged = merge_documents(&[parent, child]);
        assert_eq!(merged["key"], serde_yaml::from_str::<Value>("[USUBJID]").expect("yaml"));
        assert!(merged.get(PARENTS_KEY).is_none());
    }

    #[test]
    fn detects_kind_with_explicit_override() {
        assert_eq!(
            derivation_kind(&doc("kind: function\nsource: DM.AGE\n")),
            Some(DerivationKind::Function)
        );
        assert_eq!(
            derivation_kind(&doc("source: DM.AGE\naggregation: mean\n")),
            Some(DerivationKind::Aggregation)
        );
        assert_eq!(derivation_kind(&doc("filter: DM.AGE > 1\n")), None);
    }
}
