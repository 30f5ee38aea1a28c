//! Configuration store integration tests: directory loading, merge
//! precedence, validation failures, and identity-preserving hot reload.

use sacks::error::ProcessingError;
use sacks::formats::{ConfigurationStore, MAIN_DOCUMENT};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, body: &str) {
    std::fs::write(dir.join(name), body).unwrap();
}

fn main_doc(dir: &Path) {
    write(
        dir,
        MAIN_DOCUMENT,
        r#"{
            "Version": "1.0",
            "Lookups": {
                "Gender": { "W": "Women", "m": "Men" }
            },
            "Suppliers": [
                { "Name": "Alpha", "Currency": "USD" }
            ]
        }"#,
    );
}

#[test]
fn later_files_replace_earlier_suppliers() {
    let dir = TempDir::new().unwrap();
    main_doc(dir.path());
    // lexicographic order: a_beta.json before b_beta.json
    write(dir.path(), "a_beta.json", r#"{ "Name": "Beta", "Currency": "USD" }"#);
    write(dir.path(), "b_beta.json", r#"{ "Name": "beta", "Currency": "CHF" }"#);

    let store = ConfigurationStore::load(dir.path()).unwrap();
    let snapshot = store.configuration().snapshot();
    assert_eq!(snapshot.suppliers.len(), 2);
    assert_eq!(snapshot.supplier_by_name("Beta").unwrap().currency, "CHF");
}

#[test]
fn lookup_tables_are_case_insensitive_from_json() {
    let dir = TempDir::new().unwrap();
    main_doc(dir.path());
    let store = ConfigurationStore::load(dir.path()).unwrap();
    let snapshot = store.configuration().snapshot();

    let gender = snapshot.lookups.get("gender").unwrap();
    for input in ["W", "w", " w "] {
        assert_eq!(gender.get(input), Some("Women"));
    }
    for input in ["M", "m"] {
        assert_eq!(gender.get(input), Some("Men"));
    }
}

#[test]
fn validation_error_carries_column_and_action() {
    let dir = TempDir::new().unwrap();
    main_doc(dir.path());
    write(
        dir.path(),
        "broken.json",
        r#"{
            "Name": "Broken", "Currency": "USD",
            "ParserConfig": { "ColumnRules": [{
                "Column": "B",
                "Actions": [
                    { "Op": "Assign", "Output": "Product.Name" },
                    { "Op": "Find", "Output": "X", "Parameters": { "Pattern": "(oops" } }
                ]
            }]}
        }"#,
    );

    let err = ConfigurationStore::load(dir.path()).unwrap_err();
    match err {
        ProcessingError::Validation { supplier, column, action, .. } => {
            assert_eq!(supplier, "Broken");
            assert_eq!(column, "B");
            assert_eq!(action, 1);
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn detection_patterns_must_compile() {
    let dir = TempDir::new().unwrap();
    main_doc(dir.path());
    write(
        dir.path(),
        "badglob.json",
        r#"{
            "Name": "BadGlob", "Currency": "USD",
            "FileStructure": { "Detection": { "FileNamePatterns": ["[unclosed"] } }
        }"#,
    );
    let err = ConfigurationStore::load(dir.path()).unwrap_err();
    assert_eq!(err.tag(), "ValidationError");
}

#[test]
fn reload_is_identity_preserving_for_readers() {
    let dir = TempDir::new().unwrap();
    main_doc(dir.path());
    let store = ConfigurationStore::load(dir.path()).unwrap();

    // A long-lived reader holds the aggregate, not a snapshot.
    let aggregate = store.configuration();
    assert_eq!(aggregate.snapshot().version, "1.0");

    write(
        dir.path(),
        MAIN_DOCUMENT,
        r#"{ "Version": "2.0", "Lookups": {}, "Suppliers": [] }"#,
    );
    store.reload().unwrap();

    // The same reference observes the new generation.
    assert!(Arc::ptr_eq(&aggregate, &store.configuration()));
    assert_eq!(aggregate.snapshot().version, "2.0");
    assert!(aggregate.snapshot().suppliers.is_empty());
}

#[test]
fn reload_failure_keeps_serving_the_old_snapshot() {
    let dir = TempDir::new().unwrap();
    main_doc(dir.path());
    let store = ConfigurationStore::load(dir.path()).unwrap();

    write(dir.path(), "bad.json", "{ not json at all");
    assert!(store.reload().is_err());

    let snapshot = store.configuration().snapshot();
    assert_eq!(snapshot.version, "1.0");
    assert!(snapshot.supplier_by_name("Alpha").is_some());
}

#[test]
fn reload_event_is_broadcast() {
    let dir = TempDir::new().unwrap();
    main_doc(dir.path());
    let store = ConfigurationStore::load(dir.path()).unwrap();
    let mut events = store.subscribe();

    write(
        dir.path(),
        MAIN_DOCUMENT,
        r#"{ "Version": "3.0", "Lookups": {}, "Suppliers": [] }"#,
    );
    store.reload().unwrap();

    let event = events.try_recv().unwrap();
    assert_eq!(event.version, "3.0");
    assert_eq!(event.supplier_count, 0);
}

#[test]
fn subtitle_configuration_is_validated_at_load() {
    let dir = TempDir::new().unwrap();
    main_doc(dir.path());
    write(
        dir.path(),
        "badsub.json",
        r#"{
            "Name": "BadSub", "Currency": "USD",
            "SubtitleHandling": { "Rules": [{
                "Name": "R", "Method": "pattern", "ValidationPatterns": ["(unclosed"]
            }]}
        }"#,
    );
    let err = ConfigurationStore::load(dir.path()).unwrap_err();
    assert_eq!(err.tag(), "ValidationError");
}
