//! Sub-module calls: push, run to Terminal, pop and continue in the caller

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lifeline::core::calendar::{age_in_years, timestamp, MS_PER_DAY};
use lifeline::core::config::EngineConfig;
use lifeline::engine::{Executor, RunOutcome, RunStatus};
use lifeline::module::LoadError;
use lifeline::person::{AttrValue, EntryKind, Person};
use lifeline::registry::ModuleRegistry;

const DIABETES: &str = "44054006";

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn executor() -> Executor {
    let registry = ModuleRegistry::new(EngineConfig::default());
    registry
        .load_lookup_tables(&fixtures().join("lookup_tables"))
        .unwrap();
    registry.load_directory(&fixtures().join("modules")).unwrap();
    Executor::new(Arc::new(registry))
}

#[test]
fn test_submodule_round_trip() {
    let exec = executor();
    let birth = timestamp(1950, 3, 10);
    let mut person = Person::new(0, 42, birth);
    exec.enroll(&mut person, "diabetes_care").unwrap();

    let outcome = exec.run(&mut person, timestamp(2000, 1, 1)).unwrap();
    assert_eq!(outcome, RunOutcome::Finished);
    assert_eq!(person.runs()[0].status(), RunStatus::Finished);
    assert_eq!(person.runs()[0].call_depth(), 0);

    // Guard opens on the first tick at or after the 40th birthday
    let onset = person
        .record
        .conditions()
        .find(|e| e.primary_code() == Some(DIABETES))
        .expect("diabetes onset recorded");
    assert_eq!(age_in_years(birth, onset.start), 40);
    assert!(onset.start - timestamp(1990, 3, 10) < 7 * MS_PER_DAY);

    // The sub-module prescribes at onset, waits 30 days, then the caller
    // continues with its checkup and closes the condition
    let encounters: Vec<_> = person
        .record
        .entries()
        .iter()
        .filter(|e| e.kind == EntryKind::Encounter)
        .collect();
    assert_eq!(encounters.len(), 2);
    assert_eq!(encounters[0].start, onset.start);
    assert_eq!(encounters[1].start, onset.start + 30 * MS_PER_DAY);
    assert_eq!(onset.stop, Some(onset.start + 30 * MS_PER_DAY));
    assert!(!person.record.is_active(DIABETES));

    assert_eq!(person.attribute("insulin_courses"), Some(&AttrValue::Number(1.0)));
    assert_eq!(
        person.attribute("diabetes_code"),
        Some(&AttrValue::Text(DIABETES.into()))
    );
}

#[test]
fn test_history_interleaves_caller_and_callee() {
    let exec = executor();
    let mut person = Person::new(1, 42, timestamp(1950, 3, 10));
    exec.enroll(&mut person, "diabetes_care").unwrap();
    exec.run(&mut person, timestamp(2000, 1, 1)).unwrap();

    let trail: Vec<(&str, &str)> = person
        .history()
        .iter()
        .map(|v| (v.module.as_str(), v.state.as_str()))
        .collect();
    assert_eq!(
        trail,
        vec![
            ("diabetes_care", "Initial"),
            ("diabetes_care", "Age_Guard"),
            ("diabetes_care", "Diabetes"),
            ("diabetes_care", "Insulin"),
            ("medications/insulin_course", "Initial"),
            ("medications/insulin_course", "Prescribe"),
            ("medications/insulin_course", "Course"),
            ("medications/insulin_course", "Count_Course"),
            ("medications/insulin_course", "Terminal"),
            ("diabetes_care", "Checkup"),
            ("diabetes_care", "Resolved"),
            ("diabetes_care", "Terminal"),
        ]
    );

    // The calling state stays open for the whole sub-module run
    let call = &person.history()[3];
    let sub_terminal = &person.history()[8];
    assert_eq!(call.exited, Some(sub_terminal.entered));
}

#[test]
fn test_suspended_inside_submodule() {
    let exec = executor();
    let birth = timestamp(1950, 3, 10);
    let mut person = Person::new(2, 42, birth);
    exec.enroll(&mut person, "diabetes_care").unwrap();

    // Stop a few days into the 30-day course
    let outcome = exec.run(&mut person, timestamp(1990, 3, 25)).unwrap();
    assert_eq!(outcome, RunOutcome::HorizonReached);
    let run = &person.runs()[0];
    assert_eq!(run.call_depth(), 1);
    assert_eq!(run.current().module_key(), "medications/insulin_course");
    assert_eq!(run.current().state_name(), "Course");

    assert_eq!(exec.run(&mut person, timestamp(1991, 1, 1)).unwrap(), RunOutcome::Finished);
    assert_eq!(person.runs()[0].call_depth(), 0);
}

#[test]
fn test_missing_submodule_fails_on_call() {
    let registry = ModuleRegistry::new(EngineConfig::default());
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
    let exec = Executor::new(Arc::new(registry));
    let mut person = Person::new(0, 1, timestamp(2000, 1, 1));
    exec.enroll(&mut person, "caller").unwrap();

    let err = exec.run(&mut person, timestamp(2001, 1, 1)).unwrap_err();
    assert_eq!(err.module, "caller");
    assert_eq!(err.state, "Call");
    match err.kind {
        lifeline::engine::ExecutionErrorKind::Load(LoadError::Submodule { source, .. }) => {
            assert_eq!(*source, LoadError::NotFound("meds/absent".into()));
        }
        other => panic!("unexpected error {:?}", other),
    }
}
