//! Population driver
//!
//! Generates individuals, enrolls them in the configured modules and runs
//! them to the horizon in parallel. Every individual is independent and
//! draws from its own random stream, so a report is fully determined by the
//! registry contents and the config, whatever the worker count.

pub mod config;
pub mod demographics;

pub use config::{DemographicsConfig, EthnicityWeight, PopulationConfig};

use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::error::Result;
use crate::core::types::{PersonIndex, Timestamp};
use crate::engine::{CancelFlag, Executor, RunOutcome};
use crate::person::{AttrValue, HealthRecord, Person};
use crate::registry::ModuleRegistry;

/// Final state of one individual
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PersonStatus {
    /// Alive at the horizon
    Alive,
    Died,
    /// Every module reached Terminal before the horizon
    Finished,
    Cancelled,
    Failed,
}

impl From<RunOutcome> for PersonStatus {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Finished => PersonStatus::Finished,
            RunOutcome::Died => PersonStatus::Died,
            RunOutcome::HorizonReached => PersonStatus::Alive,
            RunOutcome::Cancelled => PersonStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PersonOutcome {
    pub index: PersonIndex,
    pub seed: u64,
    pub birth: Timestamp,
    pub status: PersonStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub death: Option<Timestamp>,
    pub attributes: BTreeMap<String, AttrValue>,
    pub record: HealthRecord,
}

impl PersonOutcome {
    fn new(person: Person, status: PersonStatus, error: Option<String>) -> Self {
        Self {
            index: person.index,
            seed: person.seed,
            birth: person.birth,
            status,
            error,
            death: person.death(),
            attributes: person.attributes().clone(),
            record: person.record,
        }
    }
}

/// Counts per final status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PopulationSummary {
    pub alive: usize,
    pub died: usize,
    pub finished: usize,
    pub cancelled: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PopulationReport {
    pub run_id: Uuid,
    pub seed: u64,
    pub end_time: Timestamp,
    pub modules: Vec<String>,
    pub summary: PopulationSummary,
    /// Ordered by individual index
    pub outcomes: Vec<PersonOutcome>,
}

impl PopulationReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub struct Population {
    registry: Arc<ModuleRegistry>,
    config: PopulationConfig,
}

impl Population {
    pub fn new(registry: Arc<ModuleRegistry>, config: PopulationConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &PopulationConfig {
        &self.config
    }

    /// Module keys every individual is enrolled in
    pub fn module_keys(&self) -> Vec<String> {
        if self.config.modules.is_empty() {
            self.registry.top_level_keys()
        } else {
            self.config.modules.clone()
        }
    }

    /// Simulate the whole population. Module load failures abort before any
    /// individual starts; failures of one individual are reported in its
    /// outcome.
    pub fn run(&self, cancel: &CancelFlag) -> Result<PopulationReport> {
        self.config.validate()?;
        self.registry.config().validate()?;

        let keys = self.module_keys();
        for key in &keys {
            self.registry.get_with_submodules(key)?;
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()?;
        let executor = Executor::new(Arc::clone(&self.registry)).with_cancel(cancel.clone());
        let end_time = self.config.end_time();

        tracing::info!(
            "Simulating {} individuals in {} modules (seed {}, {} workers)",
            self.config.size,
            keys.len(),
            self.config.seed,
            pool.current_num_threads()
        );
        let start = std::time::Instant::now();

        let outcomes: Vec<PersonOutcome> = pool.install(|| {
            (0..self.config.size)
                .into_par_iter()
                .map(|i| self.simulate_one(&executor, i as PersonIndex, &keys, end_time))
                .collect()
        });

        let mut summary = PopulationSummary::default();
        for outcome in &outcomes {
            match outcome.status {
                PersonStatus::Alive => summary.alive += 1,
                PersonStatus::Died => summary.died += 1,
                PersonStatus::Finished => summary.finished += 1,
                PersonStatus::Cancelled => summary.cancelled += 1,
                PersonStatus::Failed => summary.failed += 1,
            }
        }
        tracing::info!(
            "Population done in {:.2?}: {} alive, {} died, {} finished, {} failed, {} cancelled",
            start.elapsed(),
            summary.alive,
            summary.died,
            summary.finished,
            summary.failed,
            summary.cancelled
        );

        Ok(PopulationReport {
            run_id: Uuid::new_v4(),
            seed: self.config.seed,
            end_time,
            modules: keys,
            summary,
            outcomes,
        })
    }

    fn simulate_one(
        &self,
        executor: &Executor,
        index: PersonIndex,
        keys: &[String],
        end_time: Timestamp,
    ) -> PersonOutcome {
        let mut person = demographics::generate(index, &self.config);

        for key in keys {
            if let Err(e) = executor.enroll(&mut person, key) {
                tracing::warn!("person {}: {}", index, e);
                return PersonOutcome::new(person, PersonStatus::Failed, Some(e.to_string()));
            }
        }

        match executor.run(&mut person, end_time) {
            Ok(outcome) => PersonOutcome::new(person, outcome.into(), None),
            Err(e) => {
                tracing::warn!("{}", e);
                PersonOutcome::new(person, PersonStatus::Failed, Some(e.to_string()))
            }
        }
    }
}
