//! The simulated individual: attribute bag, random stream, history and record

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::BTreeMap;

use super::attributes::{AttrValue, BIRTHDATE, ETHNICITY, GENDER, RACE};
use super::record::HealthRecord;
use crate::core::calendar::age_in_years;
use crate::core::types::{PersonIndex, Timestamp};
use crate::engine::ModuleRun;

/// One visit to a state, in the order the individual entered them
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateVisit {
    pub module: String,
    pub state: String,
    pub entered: Timestamp,
    pub exited: Option<Timestamp>,
}

/// Build the per-individual random stream.
///
/// Every individual gets its own ChaCha stream of the run seed, so draws
/// never depend on which worker ran which individual or in what order.
pub fn person_rng(run_seed: u64, index: PersonIndex) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(run_seed);
    rng.set_stream(index);
    rng
}

#[derive(Debug, Clone)]
pub struct Person {
    pub index: PersonIndex,
    /// Run seed this individual's stream was derived from
    pub seed: u64,
    pub birth: Timestamp,
    pub record: HealthRecord,
    attributes: BTreeMap<String, AttrValue>,
    /// symptom -> cause -> severity
    symptoms: BTreeMap<String, BTreeMap<String, f64>>,
    history: Vec<StateVisit>,
    runs: Vec<ModuleRun>,
    rng: ChaCha8Rng,
    /// Next tick the executor will process
    clock: Timestamp,
    death: Option<Timestamp>,
}

impl Person {
    pub fn new(index: PersonIndex, run_seed: u64, birth: Timestamp) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(BIRTHDATE.to_string(), AttrValue::Number(birth as f64));
        Self {
            index,
            seed: run_seed,
            birth,
            record: HealthRecord::new(),
            attributes,
            symptoms: BTreeMap::new(),
            history: Vec::new(),
            runs: Vec::new(),
            rng: person_rng(run_seed, index),
            clock: birth,
            death: None,
        }
    }

    /// Builder-style attribute seeding
    pub fn with_attribute(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.set_attribute(name, value.into());
        self
    }

    // === ATTRIBUTES ===

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    pub fn attribute_text(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(AttrValue::as_text)
    }

    pub fn set_attribute(&mut self, name: &str, value: AttrValue) {
        self.attributes.insert(name.to_string(), value);
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<AttrValue> {
        self.attributes.remove(name)
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttrValue> {
        &self.attributes
    }

    pub fn gender(&self) -> Option<&str> {
        self.attribute_text(GENDER)
    }

    pub fn ethnicity(&self) -> Option<&str> {
        self.attribute_text(ETHNICITY)
    }

    pub fn race(&self) -> Option<&str> {
        self.attribute_text(RACE)
    }

    pub fn age_in_years(&self, time: Timestamp) -> u32 {
        age_in_years(self.birth, time)
    }

    // === RANDOMNESS ===

    /// Uniform draw in [0, 1)
    pub fn rand(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Uniform draw in [low, high]; returns `low` for an empty range
    pub fn rand_between(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        low + (high - low) * self.rand()
    }

    pub fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    // === SYMPTOMS ===

    pub fn set_symptom(&mut self, symptom: &str, cause: &str, severity: f64) {
        self.symptoms
            .entry(symptom.to_string())
            .or_default()
            .insert(cause.to_string(), severity);
    }

    /// Highest severity reported for the symptom across all causes
    pub fn symptom_severity(&self, symptom: &str) -> Option<f64> {
        self.symptoms
            .get(symptom)
            .and_then(|causes| causes.values().copied().reduce(f64::max))
    }

    // === HISTORY ===

    pub fn history(&self) -> &[StateVisit] {
        &self.history
    }

    pub fn enter_state(&mut self, module: &str, state: &str, time: Timestamp) {
        self.history.push(StateVisit {
            module: module.to_string(),
            state: state.to_string(),
            entered: time,
            exited: None,
        });
    }

    /// Mark the most recent open visit of `state` in `module` as exited
    pub fn exit_state(&mut self, module: &str, state: &str, time: Timestamp) {
        if let Some(visit) = self
            .history
            .iter_mut()
            .rev()
            .find(|v| v.exited.is_none() && v.module == module && v.state == state)
        {
            visit.exited = Some(time);
        }
    }

    /// Most recent visit of a state with this name, in any module
    pub fn last_visit(&self, state: &str) -> Option<&StateVisit> {
        self.history.iter().rev().find(|v| v.state == state)
    }

    pub fn visit_count(&self, module: &str, state: &str) -> usize {
        self.history
            .iter()
            .filter(|v| v.module == module && v.state == state)
            .count()
    }

    // === LIFECYCLE ===

    pub fn clock(&self) -> Timestamp {
        self.clock
    }

    pub(crate) fn set_clock(&mut self, time: Timestamp) {
        self.clock = time;
    }

    pub fn death(&self) -> Option<Timestamp> {
        self.death
    }

    pub fn is_alive(&self, time: Timestamp) -> bool {
        self.death.map_or(true, |d| time < d)
    }

    pub(crate) fn die(&mut self, time: Timestamp) {
        if self.death.is_none() {
            self.death = Some(time);
        }
    }

    pub fn runs(&self) -> &[ModuleRun] {
        &self.runs
    }

    pub(crate) fn runs_mut(&mut self) -> &mut Vec<ModuleRun> {
        &mut self.runs
    }

    /// Swap the module runs out so the executor can drive them while
    /// mutating the rest of the person
    pub(crate) fn take_runs(&mut self) -> Vec<ModuleRun> {
        std::mem::take(&mut self.runs)
    }

    pub(crate) fn restore_runs(&mut self, runs: Vec<ModuleRun>) {
        self.runs = runs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calendar::timestamp;

    #[test]
    fn test_streams_are_reproducible() {
        let mut a = Person::new(7, 42, 0);
        let mut b = Person::new(7, 42, 0);
        let draws_a: Vec<f64> = (0..5).map(|_| a.rand()).collect();
        let draws_b: Vec<f64> = (0..5).map(|_| b.rand()).collect();
        assert_eq!(draws_a, draws_b);
    }

    #[test]
    fn test_streams_differ_per_index() {
        let mut a = Person::new(1, 42, 0);
        let mut b = Person::new(2, 42, 0);
        assert_ne!(a.rand(), b.rand());
    }

    #[test]
    fn test_birthdate_attribute_seeded() {
        let birth = timestamp(1970, 3, 1);
        let person = Person::new(0, 1, birth).with_attribute(GENDER, "F");
        assert_eq!(person.attribute(BIRTHDATE), Some(&AttrValue::Number(birth as f64)));
        assert_eq!(person.gender(), Some("F"));
        assert_eq!(person.age_in_years(timestamp(2000, 3, 1)), 30);
    }

    #[test]
    fn test_symptom_severity_takes_max() {
        let mut person = Person::new(0, 1, 0);
        person.set_symptom("cough", "flu", 20.0);
        person.set_symptom("cough", "asthma", 45.0);
        assert_eq!(person.symptom_severity("cough"), Some(45.0));
        assert_eq!(person.symptom_severity("fever"), None);
    }

    #[test]
    fn test_history_enter_exit() {
        let mut person = Person::new(0, 1, 0);
        person.enter_state("m", "Initial", 0);
        person.exit_state("m", "Initial", 5);
        person.enter_state("m", "Wait", 5);
        assert_eq!(person.history()[0].exited, Some(5));
        assert_eq!(person.last_visit("Wait").unwrap().entered, 5);
        assert_eq!(person.visit_count("m", "Initial"), 1);
    }

    #[test]
    fn test_death_stops_life() {
        let mut person = Person::new(0, 1, 0);
        assert!(person.is_alive(100));
        person.die(50);
        person.die(80);
        assert_eq!(person.death(), Some(50));
        assert!(!person.is_alive(50));
    }
}
