//! Integration tests for the population driver
//!
//! These tests verify whole-population runs:
//! - Reports do not depend on the worker count
//! - Load failures abort before anyone is simulated
//! - Per-person failures stay in that person's outcome
//! - Cancellation is reported per person

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lifeline::core::config::{EngineConfig, Settings};
use lifeline::core::error::EngineError;
use lifeline::engine::CancelFlag;
use lifeline::module::LoadError;
use lifeline::population::{PersonStatus, Population, PopulationConfig};
use lifeline::registry::ModuleRegistry;

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn registry() -> Arc<ModuleRegistry> {
    let registry = ModuleRegistry::new(EngineConfig::default());
    registry
        .load_lookup_tables(&fixtures().join("lookup_tables"))
        .unwrap();
    registry.load_directory(&fixtures().join("modules")).unwrap();
    Arc::new(registry)
}

fn config(workers: usize, seed: u64) -> PopulationConfig {
    PopulationConfig {
        size: 60,
        seed,
        workers,
        ..PopulationConfig::default()
    }
}

#[test]
fn test_report_independent_of_worker_count() {
    let single = Population::new(registry(), config(1, 31))
        .run(&CancelFlag::new())
        .unwrap();
    let parallel = Population::new(registry(), config(4, 31))
        .run(&CancelFlag::new())
        .unwrap();

    assert_ne!(single.run_id, parallel.run_id);
    assert_eq!(single.summary, parallel.summary);
    assert_eq!(
        serde_json::to_value(&single.outcomes).unwrap(),
        serde_json::to_value(&parallel.outcomes).unwrap()
    );

    let other_seed = Population::new(registry(), config(4, 32))
        .run(&CancelFlag::new())
        .unwrap();
    assert_ne!(
        serde_json::to_value(&single.outcomes).unwrap(),
        serde_json::to_value(&other_seed.outcomes).unwrap()
    );
}

#[test]
fn test_all_top_level_modules_run_by_default() {
    let report = Population::new(registry(), config(2, 5))
        .run(&CancelFlag::new())
        .unwrap();
    assert_eq!(
        report.modules,
        vec!["diabetes_care".to_string(), "lookuptable_test".to_string()]
    );
    assert_eq!(report.outcomes.len(), 60);
    for (i, outcome) in report.outcomes.iter().enumerate() {
        assert_eq!(outcome.index, i as u64, "outcomes are ordered by index");
        assert_ne!(outcome.status, PersonStatus::Failed, "{:?}", outcome.error);
    }
    let summary = report.summary;
    assert_eq!(summary.alive + summary.finished + summary.died, 60);
}

#[test]
fn test_load_failure_aborts_run() {
    let registry = ModuleRegistry::default();
    registry
        .register_json("broken", r#"{"name": "Broken", "states": {}}"#)
        .unwrap();
    let population = Population::new(
        Arc::new(registry),
        PopulationConfig {
            modules: vec!["broken".into()],
            ..config(1, 1)
        },
    );
    match population.run(&CancelFlag::new()) {
        Err(EngineError::Load(LoadError::EmptyModule { module })) => assert_eq!(module, "broken"),
        other => panic!("unexpected result {:?}", other.map(|r| r.summary)),
    }
}

#[test]
fn test_person_failure_is_contained() {
    let registry = ModuleRegistry::default();
    registry
        .register_json(
            "men_only",
            r#"{"name": "Men Only", "states": {
                "Initial": {"type": "Initial", "conditional_transition": [
                    {"condition": {"condition_type": "Gender", "gender": "M"}, "transition": "Terminal"}
                ]},
                "Terminal": {"type": "Terminal"}
            }}"#,
        )
        .unwrap();
    let report = Population::new(Arc::new(registry), config(2, 11))
        .run(&CancelFlag::new())
        .unwrap();

    for outcome in &report.outcomes {
        let male = outcome.attributes.get("gender").and_then(|g| g.as_text()) == Some("M");
        if male {
            assert_eq!(outcome.status, PersonStatus::Finished);
        } else {
            assert_eq!(outcome.status, PersonStatus::Failed);
            assert!(outcome.error.as_deref().unwrap_or_default().contains("no branch matched"));
        }
    }
    assert!(report.summary.failed > 0 && report.summary.finished > 0);
}

#[test]
fn test_cancelled_run() {
    let cancel = CancelFlag::new();
    cancel.cancel();
    let report = Population::new(registry(), config(2, 3)).run(&cancel).unwrap();
    assert_eq!(report.summary.cancelled, 60);
    assert!(report.outcomes.iter().all(|o| o.record.is_empty()));
}

#[test]
fn test_settings_file_round_trip() {
    let settings = Settings::from_toml_str(
        r#"
[engine]
time_step_days = 14

[population]
size = 10
seed = 4
end_year = 2000
modules = ["lookuptable_test"]
"#,
    )
    .unwrap();
    let registry = ModuleRegistry::new(settings.engine.clone());
    registry
        .load_lookup_tables(&fixtures().join("lookup_tables"))
        .unwrap();
    registry.load_directory(&fixtures().join("modules")).unwrap();

    let report = Population::new(Arc::new(registry), settings.population)
        .run(&CancelFlag::new())
        .unwrap();
    assert_eq!(report.outcomes.len(), 10);
    assert_eq!(report.end_time, lifeline::core::calendar::timestamp(2000, 1, 1));
    let json = report.to_json().unwrap();
    assert!(json.contains("\"run_id\""));
}
