use adam_spec::merge_documents;
use proptest::prelude::*;
use serde_yaml::{Mapping, Value};

fn column_strategy(name: String) -> impl Strategy<Value = Value> {
    (
        prop_oneof![Just("str"), Just("int"), Just("float")],
        proptest::option::of("[A-Za-z ]{1,12}"),
        prop_oneof![
            "[A-Z]{2}\\.[A-Z]{3,6}".prop_map(|source| {
                let mut derivation = Mapping::new();
                derivation.insert("source".into(), source.into());
                derivation
            }),
            "[A-Z0-9]{1,4}".prop_map(|constant| {
                let mut derivation = Mapping::new();
                derivation.insert("constant".into(), constant.into());
                derivation
            }),
        ],
        any::<bool>(),
    )
        .prop_map(move |(data_type, label, derivation, drop)| {
            let mut column = Mapping::new();
            column.insert("name".into(), name.clone().into());
            if drop {
                column.insert("drop".into(), true.into());
                return Value::Mapping(column);
            }
            column.insert("type".into(), data_type.into());
            if let Some(label) = label {
                column.insert("label".into(), label.into());
            }
            column.insert("derivation".into(), Value::Mapping(derivation));
            Value::Mapping(column)
        })
}

fn document_strategy() -> impl Strategy<Value = Mapping> {
    (
        "AD[A-Z]{2}",
        proptest::collection::btree_set("[A-Z]{3,8}", 1..6),
    )
        .prop_flat_map(|(domain, names)| {
            let columns: Vec<_> = names.into_iter().map(column_strategy).collect();
            (Just(domain), columns)
        })
        .prop_map(|(domain, columns)| {
            let mut document = Mapping::new();
            document.insert("domain".into(), domain.into());
            document.insert(
                "key".into(),
                Value::Sequence(vec![Value::from("USUBJID")]),
            );
            document.insert("columns".into(), Value::Sequence(columns));
            document
        })
}

proptest! {
    #[test]
    fn merging_a_document_with_itself_is_idempotent(document in document_strategy()) {
        let once = merge_documents(std::slice::from_ref(&document));
        let twice = merge_documents(&[document.clone(), document]);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn child_fields_always_win(parent in document_strategy(), child in document_strategy()) {
        let merged = merge_documents(&[parent, child.clone()]);
        prop_assert_eq!(&merged["domain"], &child["domain"]);

        let merged_columns = merged["columns"].as_sequence().cloned().unwrap_or_default();
        for column in child["columns"].as_sequence().cloned().unwrap_or_default() {
            let name = column["name"].as_str().unwrap_or_default().to_string();
            let found = merged_columns
                .iter()
                .find(|candidate| candidate["name"].as_str() == Some(name.as_str()));
            if column.get("drop").is_some() {
                prop_assert!(found.is_none());
            } else {
                let found = found.expect("non-dropped child column is present");
                prop_assert_eq!(&found["type"], &column["type"]);
                prop_assert_eq!(&found["derivation"], &column["derivation"]);
            }
        }
    }
}
