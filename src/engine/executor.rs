//! State machine executor
//!
//! Drives every module run of one individual forward in fixed ticks of
//! `time_step_days`, starting from the individual's clock. Within a tick
//! the runs take one step at a time, earliest pending time first, and each
//! advances through as many states as it can:
//!
//! - entering a state applies its side effects at the entry time;
//! - a Guard is checked against the tick time and either exits at the
//!   tick or suspends the run until the next tick;
//! - a Delay computes its wake time on entry; if the wake time has passed
//!   by this tick the run continues at exactly the wake time;
//! - CallSubmodule pushes a frame and continues in the sub-module;
//!   Terminal pops it and the caller's transition is taken at that time;
//! - Death stops every run of the individual.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use super::context::{ModuleRun, RunStatus};
use super::resolver::{resolve, ResolveError};
use crate::core::config::EngineConfig;
use crate::core::types::{PersonIndex, Timestamp};
use crate::module::{ConditionTarget, LoadError, State, StateKind};
use crate::person::{AttrValue, Person, RecordError};
use crate::registry::ModuleRegistry;

/// Shared cancellation signal, observed at every state boundary
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a call to [`Executor::run`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    /// Every module run reached Terminal
    Finished,
    Died,
    /// Some runs are still active at the horizon
    HorizonReached,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionErrorKind {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("more than {limit} state visits within one tick")]
    RunawayLoop { limit: usize },
}

/// A failure while running one individual, with where and when it happened
#[derive(Debug, Clone, PartialEq, Error)]
#[error("person {person}: {module}/{state} at {time}: {kind}")]
pub struct ExecutionError {
    pub person: PersonIndex,
    pub module: String,
    pub state: String,
    pub time: Timestamp,
    #[source]
    pub kind: ExecutionErrorKind,
}

enum Step {
    /// Entered a state or took a transition
    Moved,
    Suspended,
    Finished,
    Died,
    Cancelled,
}

enum Entered {
    Continue,
    Called,
    Died,
}

pub struct Executor {
    registry: Arc<ModuleRegistry>,
    config: EngineConfig,
    cancel: CancelFlag,
}

impl Executor {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        let config = registry.config().clone();
        Self {
            registry,
            config,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Start `person` in module `key` at their current clock
    pub fn enroll(&self, person: &mut Person, key: &str) -> Result<(), LoadError> {
        let module = self.registry.get(key)?;
        tracing::debug!("person {}: enrolled in {}", person.index, key);
        let start = person.clock();
        person.runs_mut().push(ModuleRun::new(module, start));
        Ok(())
    }

    /// Advance every module run of `person` through all ticks up to and
    /// including `until`. Can be called again with a later horizon.
    pub fn run(&self, person: &mut Person, until: Timestamp) -> Result<RunOutcome, ExecutionError> {
        let mut runs = person.take_runs();
        let result = self.run_ticks(person, &mut runs, until);
        person.restore_runs(runs);
        result
    }

    fn run_ticks(
        &self,
        person: &mut Person,
        runs: &mut [ModuleRun],
        until: Timestamp,
    ) -> Result<RunOutcome, ExecutionError> {
        if person.death().is_some() {
            return Ok(RunOutcome::Died);
        }
        if !runs.iter().any(ModuleRun::is_active) {
            return Ok(RunOutcome::Finished);
        }

        let step = self.config.time_step_ms();
        let mut tick = person.clock();
        while tick <= until {
            // Runs interleave by the time of their next step, so nothing
            // happens in one module after a death in another
            let mut visits = vec![0usize; runs.len()];
            let mut parked = vec![false; runs.len()];
            loop {
                let next = runs
                    .iter()
                    .enumerate()
                    .filter(|(i, run)| run.is_active() && !parked[*i])
                    .min_by_key(|(i, run)| (Self::pending_at(run, tick), *i))
                    .map(|(i, _)| i);
                let Some(i) = next else { break };

                match self.step(person, &mut runs[i], tick, &mut visits[i]) {
                    Ok(Step::Moved) => {}
                    Ok(Step::Suspended) | Ok(Step::Finished) => parked[i] = true,
                    Ok(Step::Cancelled) => {
                        person.set_clock(tick);
                        return Ok(RunOutcome::Cancelled);
                    }
                    Ok(Step::Died) => {
                        for run in runs.iter_mut().filter(|r| r.is_active()) {
                            run.status = RunStatus::Halted;
                        }
                        person.set_clock(tick + step);
                        tracing::debug!("person {}: died during tick {}", person.index, tick);
                        return Ok(RunOutcome::Died);
                    }
                    Err(e) => {
                        runs[i].status = RunStatus::Failed;
                        person.set_clock(tick);
                        return Err(e);
                    }
                }
            }

            tick += step;
            person.set_clock(tick);
            if !runs.iter().any(ModuleRun::is_active) {
                return Ok(RunOutcome::Finished);
            }
        }
        Ok(RunOutcome::HorizonReached)
    }

    /// Simulated time at which `run` would take its next step during `tick`
    fn pending_at(run: &ModuleRun, tick: Timestamp) -> Timestamp {
        if !run.entered {
            return run.entered_at;
        }
        match &run.current.module.state(run.current.state).kind {
            StateKind::Guard { .. } => tick.max(run.entered_at),
            StateKind::Delay(_) => run.wake_at.unwrap_or(run.entered_at),
            _ => run.entered_at,
        }
    }

    fn error(
        &self,
        person: &Person,
        run: &ModuleRun,
        time: Timestamp,
        kind: ExecutionErrorKind,
    ) -> ExecutionError {
        ExecutionError {
            person: person.index,
            module: run.current().module_key().to_string(),
            state: run.current().state_name().to_string(),
            time,
            kind,
        }
    }

    /// Enter the current state, or leave it if already entered
    fn step(
        &self,
        person: &mut Person,
        run: &mut ModuleRun,
        tick: Timestamp,
        visits: &mut usize,
    ) -> Result<Step, ExecutionError> {
        if self.cancel.is_cancelled() {
            return Ok(Step::Cancelled);
        }

        let module = Arc::clone(&run.current.module);
        let state = module.state(run.current.state);

        if !run.entered {
            let limit = self.config.max_state_visits_per_tick;
            *visits += 1;
            if *visits > limit {
                return Err(self.error(
                    person,
                    run,
                    run.entered_at,
                    ExecutionErrorKind::RunawayLoop { limit },
                ));
            }
            let time = run.entered_at;
            person.enter_state(module.key(), &state.name, time);
            run.entered = true;
            tracing::trace!(
                "person {}: enter {}/{} ({}) at {}",
                person.index,
                module.key(),
                state.name,
                state.kind.label(),
                time
            );
            return match self.on_enter(person, run, state, time) {
                Ok(Entered::Continue) | Ok(Entered::Called) => Ok(Step::Moved),
                Ok(Entered::Died) => Ok(Step::Died),
                Err(kind) => Err(self.error(person, run, time, kind)),
            };
        }

        let exit_at = match &state.kind {
            StateKind::Guard { allow } => {
                if !allow.evaluate(person, tick) {
                    return Ok(Step::Suspended);
                }
                tick.max(run.entered_at)
            }
            StateKind::Delay(_) => match run.wake_at {
                Some(wake) if wake <= tick => wake,
                _ => return Ok(Step::Suspended),
            },
            StateKind::Terminal => {
                let time = run.entered_at;
                person.exit_state(module.key(), &state.name, time);
                if run.pop() {
                    tracing::debug!(
                        "person {}: returned from {} to {}/{}",
                        person.index,
                        module.key(),
                        run.current().module_key(),
                        run.current().state_name()
                    );
                    run.entered_at = time;
                    return Ok(Step::Moved);
                }
                run.status = RunStatus::Finished;
                return Ok(Step::Finished);
            }
            StateKind::Death { .. } => return Ok(Step::Died),
            _ => run.entered_at,
        };

        let Some(transition) = state.transition.as_ref() else {
            run.status = RunStatus::Finished;
            return Ok(Step::Finished);
        };
        let next = resolve(transition, person, exit_at)
            .map_err(|e| self.error(person, run, exit_at, e.into()))?;
        person.exit_state(module.key(), &state.name, exit_at);
        tracing::trace!(
            "person {}: {}/{} -> {} ({}) at {}",
            person.index,
            module.key(),
            state.name,
            module.state(next).name,
            transition.label(),
            exit_at
        );
        run.goto(next, exit_at);
        Ok(Step::Moved)
    }

    /// Apply the entry side effects of `state`
    fn on_enter(
        &self,
        person: &mut Person,
        run: &mut ModuleRun,
        state: &State,
        time: Timestamp,
    ) -> Result<Entered, ExecutionErrorKind> {
        match &state.kind {
            StateKind::Initial
            | StateKind::Simple
            | StateKind::Terminal
            | StateKind::Guard { .. } => {}

            StateKind::Delay(spec) => {
                run.wake_at = Some(time.saturating_add(spec.sample(person)));
            }

            StateKind::Encounter { class, codes } => {
                person.record.record_encounter(class, codes, time);
            }

            StateKind::ConditionOnset {
                codes,
                assign_to_attribute,
            } => {
                person.record.open_condition(codes, time)?;
                if let (Some(attribute), Some(code)) = (assign_to_attribute, codes.first()) {
                    person.set_attribute(attribute, AttrValue::Text(code.code.clone()));
                }
            }

            StateKind::ConditionEnd(target) => match target {
                ConditionTarget::Codes(codes) => {
                    for code in codes {
                        person.record.close_condition(&code.code, time);
                    }
                }
                ConditionTarget::Attribute(attribute) => {
                    if let Some(code) = person.attribute_text(attribute).map(str::to_string) {
                        person.record.close_condition(&code, time);
                    }
                }
            },

            StateKind::Symptom {
                symptom,
                cause,
                severity,
            } => {
                let value = severity.sample(person);
                person.set_symptom(symptom, cause, value);
                person.record.record_symptom(symptom, cause, value, time);
            }

            StateKind::SetAttribute { attribute, value } => match value {
                Some(value) => person.set_attribute(attribute, value.clone()),
                None => {
                    person.remove_attribute(attribute);
                }
            },

            StateKind::Counter { attribute, delta } => {
                let current = person
                    .attribute(attribute)
                    .and_then(AttrValue::as_number)
                    .unwrap_or(0.0);
                person.set_attribute(attribute, AttrValue::Number(current + delta));
            }

            StateKind::CallSubmodule { submodule } => {
                let callee = self
                    .registry
                    .submodule(&run.current.module, &state.name, submodule)?;
                tracing::debug!(
                    "person {}: {}/{} calls {}",
                    person.index,
                    run.current().module_key(),
                    state.name,
                    submodule
                );
                run.push(callee, time);
                return Ok(Entered::Called);
            }

            StateKind::Death { codes } => {
                person.record.record_death(codes, time);
                person.die(time);
                return Ok(Entered::Died);
            }
        }
        Ok(Entered::Continue)
    }
}
