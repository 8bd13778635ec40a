//! Registry loading, caching and validation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lifeline::core::config::EngineConfig;
use lifeline::lookup::TableError;
use lifeline::module::LoadError;
use lifeline::registry::ModuleRegistry;

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture_registry() -> ModuleRegistry {
    let registry = ModuleRegistry::new(EngineConfig::default());
    registry
        .load_lookup_tables(&fixtures().join("lookup_tables"))
        .unwrap();
    registry.load_directory(&fixtures().join("modules")).unwrap();
    registry
}

#[test]
fn test_load_directory_keys() {
    let registry = fixture_registry();
    assert_eq!(
        registry.keys(),
        vec![
            "diabetes_care".to_string(),
            "lookuptable_test".to_string(),
            "medications/insulin_course".to_string(),
        ]
    );
    assert_eq!(
        registry.top_level_keys(),
        vec!["diabetes_care".to_string(), "lookuptable_test".to_string()]
    );
    assert_eq!(registry.compile_count(), 0, "loading registers without compiling");
}

#[test]
fn test_concurrent_get_compiles_once() {
    let registry = fixture_registry();

    let modules: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| registry.get("lookuptable_test").unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(registry.compile_count(), 1);
    for module in &modules[1..] {
        assert!(Arc::ptr_eq(&modules[0], module));
    }
    assert_eq!(modules[0].name(), "Lookup Table Transition Test");
}

#[test]
fn test_preload_compiles_everything() {
    let registry = fixture_registry();
    let modules = registry.preload().unwrap();
    assert_eq!(modules.len(), 3);
    assert_eq!(registry.compile_count(), 3);

    registry.preload().unwrap();
    assert_eq!(registry.compile_count(), 3, "second preload hits the cache");
}

#[test]
fn test_preload_reports_missing_submodule() {
    let registry = ModuleRegistry::default();
    registry
        .register_json(
            "caller",
            r#"{"name": "Caller", "states": {
                "Initial": {"type": "Initial", "direct_transition": "Call"},
                "Call": {"type": "CallSubmodule", "submodule": "meds/absent", "direct_transition": "Terminal"},
                "Terminal": {"type": "Terminal"}
            }}"#,
        )
        .unwrap();

    // Lazily the caller compiles fine
    assert!(registry.get("caller").is_ok());

    let err = registry.preload().unwrap_err();
    assert_eq!(
        err,
        LoadError::Submodule {
            module: "caller".into(),
            state: "Call".into(),
            submodule: "meds/absent".into(),
            source: Box::new(LoadError::NotFound("meds/absent".into())),
        }
    );
}

#[test]
fn test_lookup_table_must_exist_at_compile() {
    let registry = ModuleRegistry::default();
    registry
        .register_json(
            "needs_table",
            r#"{"name": "Needs Table", "states": {
                "Initial": {"type": "Initial", "lookup_table_transition": [
                    {"transition": "A", "lookup_table_name": "missing.csv"},
                    {"transition": "B", "lookup_table_name": "missing.csv"}
                ]},
                "A": {"type": "Terminal"},
                "B": {"type": "Terminal"}
            }}"#,
        )
        .unwrap();

    let err = registry.get("needs_table").unwrap_err();
    assert!(matches!(
        err,
        LoadError::UnknownLookupTable { ref table, .. } if table == "missing.csv"
    ));
}

#[test]
fn test_lookup_columns_must_match_targets() {
    let registry = ModuleRegistry::default();
    registry
        .register_lookup_table_csv("risk.csv", "gender,A,C\nM,0.5,0.5\n")
        .unwrap();
    registry
        .register_json(
            "mismatch",
            r#"{"name": "Mismatch", "states": {
                "Initial": {"type": "Initial", "lookup_table_transition": [
                    {"transition": "A", "lookup_table_name": "risk.csv"},
                    {"transition": "B", "lookup_table_name": "risk.csv"}
                ]},
                "A": {"type": "Terminal"},
                "B": {"type": "Terminal"}
            }}"#,
        )
        .unwrap();

    let err = registry.get("mismatch").unwrap_err();
    match err {
        LoadError::LookupTable { source, .. } => {
            assert_eq!(source, TableError::MissingOutcome("B".into()))
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_unknown_state_type_is_a_load_error() {
    let registry = ModuleRegistry::default();
    registry
        .register_json(
            "odd",
            r#"{"name": "Odd", "states": {
                "Initial": {"type": "Initial", "direct_transition": "X"},
                "X": {"type": "Hologram", "direct_transition": "T"},
                "T": {"type": "Terminal"}
            }}"#,
        )
        .unwrap();
    assert!(matches!(
        registry.get("odd").unwrap_err(),
        LoadError::Parse { ref key, .. } if key == "odd"
    ));
}

#[test]
fn test_missing_directory_is_io_error() {
    let registry = ModuleRegistry::default();
    let err = registry
        .load_directory(&fixtures().join("no_such_dir"))
        .unwrap_err();
    assert!(matches!(err, LoadError::Io { .. }));
}

#[test]
fn test_unlisted_outcome_column_fails_at_load() {
    let registry = ModuleRegistry::default();
    registry
        .register_lookup_table_csv("risk.csv", "gender,A,B,C\nM,0.5,0.5,0\nF,0.4,0.6,0\n")
        .unwrap();
    registry
        .register_json(
            "partial",
            r#"{"name": "Partial", "states": {
                "Initial": {"type": "Initial", "lookup_table_transition": [
                    {"transition": "A", "lookup_table_name": "risk.csv"},
                    {"transition": "B", "lookup_table_name": "risk.csv"}
                ]},
                "A": {"type": "Terminal"},
                "B": {"type": "Terminal"}
            }}"#,
        )
        .unwrap();

    match registry.get("partial").unwrap_err() {
        LoadError::LookupTable { source, .. } => {
            assert_eq!(source, TableError::UnlistedOutcome("C".into()))
        }
        other => panic!("unexpected error {:?}", other),
    }
}
