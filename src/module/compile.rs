//! Definition -> Module compilation and validation
//!
//! Everything that can be checked without running an individual is checked
//! here: state variant payloads, the one-transition rule, target names,
//! distribution sums, logic trees, lookup-table binding and exit
//! reachability. A module that compiles can only fail at runtime on
//! data-dependent conditions (no matching branch, missing lookup bucket,
//! duplicate condition onset).

use ahash::AHashMap;
use std::sync::Arc;

use super::error::LoadError;
use super::graph::Module;
use super::schema::{
    ComplexEntryDef, ConditionalEntryDef, CounterAction, DistributedEntryDef, ExactDef,
    LookupEntryDef, ModuleDefinition, RangeDef, StateDefinition, StateKindDef,
};
use super::state::{Amount, ConditionTarget, DelaySpec, State, StateId, StateKind};
use super::transition::{
    ComplexBranch, ConditionalBranch, Distribution, LookupTransition, Transition,
};
use crate::core::calendar::{TimeSpan, TimeUnit, MS_PER_YEAR};
use crate::core::types::Code;
use crate::lookup::{CsvTable, LookupTable};

/// Longest delay a module may declare
const MAX_DELAY_YEARS: f64 = 1000.0;

/// Where the compiler finds parsed lookup-table CSVs by file name
pub trait TableSource {
    fn csv_table(&self, name: &str) -> Option<Arc<CsvTable>>;
}

impl TableSource for AHashMap<String, Arc<CsvTable>> {
    fn csv_table(&self, name: &str) -> Option<Arc<CsvTable>> {
        self.get(name).cloned()
    }
}

/// Compile and validate `definition` under registry key `key`.
pub fn compile(
    key: &str,
    definition: &ModuleDefinition,
    submodule: bool,
    tables: &dyn TableSource,
    tolerance: f64,
) -> Result<Module, LoadError> {
    if definition.states.is_empty() {
        return Err(LoadError::EmptyModule {
            module: key.to_string(),
        });
    }

    let index: AHashMap<String, StateId> = definition
        .states
        .keys()
        .enumerate()
        .map(|(i, name)| (name.clone(), StateId(i)))
        .collect();

    let initials: Vec<String> = definition
        .states
        .iter()
        .filter(|(_, s)| matches!(s.kind, StateKindDef::Initial))
        .map(|(name, _)| name.clone())
        .collect();
    let initial = match initials.len() {
        0 => {
            return Err(LoadError::MissingInitial {
                module: key.to_string(),
            })
        }
        1 => index[&initials[0]],
        _ => {
            return Err(LoadError::MultipleInitial {
                module: key.to_string(),
                states: initials,
            })
        }
    };

    let compiler = Compiler {
        key,
        definition,
        index: &index,
        tables,
        tolerance,
    };
    let states = definition
        .states
        .iter()
        .map(|(name, def)| compiler.state(name, def))
        .collect::<Result<Vec<_>, _>>()?;

    let module = Module {
        key: key.to_string(),
        name: definition.name.clone(),
        submodule,
        remarks: definition.remarks.clone(),
        states,
        index,
        initial,
    };
    module.check_exits()?;
    Ok(module)
}

struct Compiler<'a> {
    key: &'a str,
    definition: &'a ModuleDefinition,
    index: &'a AHashMap<String, StateId>,
    tables: &'a dyn TableSource,
    tolerance: f64,
}

impl Compiler<'_> {
    fn invalid(&self, state: &str, message: impl Into<String>) -> LoadError {
        LoadError::InvalidState {
            module: self.key.to_string(),
            state: state.to_string(),
            message: message.into(),
        }
    }

    fn state(&self, name: &str, def: &StateDefinition) -> Result<State, LoadError> {
        let kind = self.kind(name, &def.kind)?;
        let count = def.transition_count();

        let transition = if kind.is_terminal() {
            if count > 0 {
                return Err(LoadError::UnexpectedTransition {
                    module: self.key.to_string(),
                    state: name.to_string(),
                });
            }
            None
        } else {
            match count {
                0 => {
                    return Err(LoadError::MissingTransition {
                        module: self.key.to_string(),
                        state: name.to_string(),
                    })
                }
                1 => Some(self.transition(name, def)?),
                _ => {
                    return Err(LoadError::MultipleTransitions {
                        module: self.key.to_string(),
                        state: name.to_string(),
                    })
                }
            }
        };

        Ok(State {
            name: name.to_string(),
            kind,
            transition,
        })
    }

    fn kind(&self, name: &str, def: &StateKindDef) -> Result<StateKind, LoadError> {
        let kind = match def {
            StateKindDef::Initial => StateKind::Initial,
            StateKindDef::Terminal => StateKind::Terminal,
            StateKindDef::Simple => StateKind::Simple,
            StateKindDef::Guard { allow } => {
                allow.validate().map_err(|m| self.invalid(name, m))?;
                StateKind::Guard {
                    allow: allow.clone(),
                }
            }
            StateKindDef::Delay { exact, range } => {
                StateKind::Delay(self.delay(name, exact.as_ref(), range.as_ref())?)
            }
            StateKindDef::Encounter {
                encounter_class,
                codes,
            } => StateKind::Encounter {
                class: encounter_class.clone(),
                codes: codes.clone(),
            },
            StateKindDef::ConditionOnset {
                codes,
                assign_to_attribute,
            } => {
                if codes.is_empty() {
                    return Err(self.invalid(name, "ConditionOnset needs at least one code"));
                }
                StateKind::ConditionOnset {
                    codes: codes.clone(),
                    assign_to_attribute: assign_to_attribute.clone(),
                }
            }
            StateKindDef::ConditionEnd {
                codes,
                condition_onset,
                referenced_by_attribute,
            } => StateKind::ConditionEnd(self.condition_target(
                name,
                codes.as_ref(),
                condition_onset.as_deref(),
                referenced_by_attribute.as_deref(),
            )?),
            StateKindDef::Symptom {
                symptom,
                cause,
                exact,
                range,
            } => StateKind::Symptom {
                symptom: symptom.clone(),
                cause: cause.clone().unwrap_or_else(|| self.key.to_string()),
                severity: self.severity(name, exact.as_ref(), range.as_ref())?,
            },
            StateKindDef::SetAttribute { attribute, value } => StateKind::SetAttribute {
                attribute: attribute.clone(),
                value: value.clone(),
            },
            StateKindDef::Counter {
                attribute,
                action,
                amount,
            } => StateKind::Counter {
                attribute: attribute.clone(),
                delta: match action {
                    CounterAction::Increment => *amount,
                    CounterAction::Decrement => -*amount,
                },
            },
            StateKindDef::CallSubmodule { submodule } => {
                if submodule.is_empty() {
                    return Err(self.invalid(name, "CallSubmodule needs a sub-module key"));
                }
                if submodule == self.key {
                    return Err(self.invalid(name, "module calls itself"));
                }
                StateKind::CallSubmodule {
                    submodule: submodule.clone(),
                }
            }
            StateKindDef::Death { codes } => StateKind::Death {
                codes: codes.clone(),
            },
        };
        Ok(kind)
    }

    fn delay(
        &self,
        name: &str,
        exact: Option<&TimeSpan>,
        range: Option<&RangeDef>,
    ) -> Result<DelaySpec, LoadError> {
        match (exact, range) {
            (Some(span), None) => Ok(DelaySpec::Exact(self.delay_millis(
                name,
                span.quantity,
                span.unit,
            )?)),
            (None, Some(range)) => {
                let unit = range
                    .unit
                    .ok_or_else(|| self.invalid(name, "delay range needs a unit"))?;
                if range.low > range.high {
                    return Err(self.invalid(
                        name,
                        format!("bad delay range {}..{}", range.low, range.high),
                    ));
                }
                Ok(DelaySpec::Range {
                    low: self.delay_millis(name, range.low, unit)?,
                    high: self.delay_millis(name, range.high, unit)?,
                })
            }
            _ => Err(self.invalid(name, "Delay needs exactly one of exact or range")),
        }
    }

    /// Delay length in milliseconds, at most `MAX_DELAY_YEARS`
    fn delay_millis(&self, name: &str, quantity: f64, unit: TimeUnit) -> Result<i64, LoadError> {
        let years = quantity * unit.millis() as f64 / MS_PER_YEAR as f64;
        if !(0.0..=MAX_DELAY_YEARS).contains(&years) {
            return Err(self.invalid(
                name,
                format!("delay of {} {:?} is out of range", quantity, unit),
            ));
        }
        Ok(unit.to_millis(quantity))
    }

    fn severity(
        &self,
        name: &str,
        exact: Option<&ExactDef>,
        range: Option<&RangeDef>,
    ) -> Result<Amount, LoadError> {
        match (exact, range) {
            (Some(exact), None) => Ok(Amount::Exact(exact.quantity)),
            (None, Some(range)) if range.low <= range.high => Ok(Amount::Range {
                low: range.low,
                high: range.high,
            }),
            (None, Some(range)) => Err(self.invalid(
                name,
                format!("bad severity range {}..{}", range.low, range.high),
            )),
            _ => Err(self.invalid(name, "Symptom needs exactly one of exact or range")),
        }
    }

    fn condition_target(
        &self,
        name: &str,
        codes: Option<&Vec<Code>>,
        onset: Option<&str>,
        attribute: Option<&str>,
    ) -> Result<ConditionTarget, LoadError> {
        match (codes, onset, attribute) {
            (Some(codes), None, None) if !codes.is_empty() => {
                Ok(ConditionTarget::Codes(codes.clone()))
            }
            (None, Some(onset), None) => match self.definition.states.get(onset) {
                Some(StateDefinition {
                    kind: StateKindDef::ConditionOnset { codes, .. },
                    ..
                }) => Ok(ConditionTarget::Codes(codes.clone())),
                _ => Err(self.invalid(
                    name,
                    format!("'{}' is not a ConditionOnset state in this module", onset),
                )),
            },
            (None, None, Some(attribute)) => Ok(ConditionTarget::Attribute(attribute.to_string())),
            _ => Err(self.invalid(
                name,
                "ConditionEnd needs exactly one of codes, condition_onset or referenced_by_attribute",
            )),
        }
    }

    fn target(&self, name: &str, target: &str) -> Result<StateId, LoadError> {
        self.index
            .get(target)
            .copied()
            .ok_or_else(|| LoadError::DanglingTarget {
                module: self.key.to_string(),
                state: name.to_string(),
                target: target.to_string(),
            })
    }

    fn check_sum(&self, name: &str, sum: f64) -> Result<(), LoadError> {
        if (sum - 1.0).abs() > self.tolerance {
            return Err(LoadError::BadDistribution {
                module: self.key.to_string(),
                state: name.to_string(),
                sum,
            });
        }
        Ok(())
    }

    fn transition(&self, name: &str, def: &StateDefinition) -> Result<Transition, LoadError> {
        if let Some(target) = &def.direct_transition {
            return Ok(Transition::Direct(self.target(name, target)?));
        }
        if let Some(entries) = &def.distributed_transition {
            return Ok(Transition::Distributed(self.distribution(name, entries)?));
        }
        if let Some(entries) = &def.conditional_transition {
            return self.conditional(name, entries);
        }
        if let Some(entries) = &def.complex_transition {
            return self.complex(name, entries);
        }
        if let Some(entries) = &def.lookup_table_transition {
            return self.lookup(name, entries);
        }
        Err(LoadError::MissingTransition {
            module: self.key.to_string(),
            state: name.to_string(),
        })
    }

    fn distribution(
        &self,
        name: &str,
        entries: &[DistributedEntryDef],
    ) -> Result<Distribution, LoadError> {
        if entries.is_empty() {
            return Err(self.invalid(name, "empty distribution"));
        }
        let mut compiled = Vec::with_capacity(entries.len());
        for entry in entries {
            if !(0.0..=1.0).contains(&entry.distribution) {
                return Err(self.invalid(
                    name,
                    format!(
                        "probability {} for '{}' is outside [0, 1]",
                        entry.distribution, entry.transition
                    ),
                ));
            }
            compiled.push((self.target(name, &entry.transition)?, entry.distribution));
        }
        let distribution = Distribution::new(compiled);
        self.check_sum(name, distribution.total())?;
        Ok(distribution)
    }

    fn conditional(
        &self,
        name: &str,
        entries: &[ConditionalEntryDef],
    ) -> Result<Transition, LoadError> {
        if entries.is_empty() {
            return Err(self.invalid(name, "empty conditional transition"));
        }
        let branches = entries
            .iter()
            .map(|entry| {
                if let Some(condition) = &entry.condition {
                    condition.validate().map_err(|m| self.invalid(name, m))?;
                }
                Ok(ConditionalBranch {
                    condition: entry.condition.clone(),
                    target: self.target(name, &entry.transition)?,
                })
            })
            .collect::<Result<Vec<_>, LoadError>>()?;
        Ok(Transition::Conditional(branches))
    }

    fn complex(&self, name: &str, entries: &[ComplexEntryDef]) -> Result<Transition, LoadError> {
        if entries.is_empty() {
            return Err(self.invalid(name, "empty complex transition"));
        }
        let branches = entries
            .iter()
            .map(|entry| {
                if let Some(condition) = &entry.condition {
                    condition.validate().map_err(|m| self.invalid(name, m))?;
                }
                Ok(ComplexBranch {
                    condition: entry.condition.clone(),
                    distribution: self.distribution(name, &entry.distributions)?,
                })
            })
            .collect::<Result<Vec<_>, LoadError>>()?;
        Ok(Transition::Complex(branches))
    }

    fn lookup(&self, name: &str, entries: &[LookupEntryDef]) -> Result<Transition, LoadError> {
        let table_name = match entries.first() {
            Some(entry) => entry.lookup_table_name.as_str(),
            None => return Err(self.invalid(name, "empty lookup table transition")),
        };
        if entries.iter().any(|e| e.lookup_table_name != table_name) {
            return Err(self.invalid(name, "all entries must name the same lookup table"));
        }

        let mut outcomes: Vec<String> = Vec::with_capacity(entries.len());
        let mut targets = Vec::with_capacity(entries.len());
        for entry in entries {
            if outcomes.contains(&entry.transition) {
                return Err(self.invalid(
                    name,
                    format!("'{}' listed twice in lookup transition", entry.transition),
                ));
            }
            targets.push(self.target(name, &entry.transition)?);
            outcomes.push(entry.transition.clone());
        }

        let fallback = match entries.iter().filter(|e| e.default_probability.is_some()).count() {
            0 => None,
            n if n == entries.len() => {
                let row: Vec<f64> = entries
                    .iter()
                    .map(|e| e.default_probability.unwrap_or_default())
                    .collect();
                if row.iter().any(|p| !(0.0..=1.0).contains(p)) {
                    return Err(self.invalid(name, "default_probability outside [0, 1]"));
                }
                self.check_sum(name, row.iter().sum())?;
                Some(row)
            }
            _ => {
                return Err(self.invalid(
                    name,
                    "default_probability must be given for every entry or none",
                ))
            }
        };

        let csv = self
            .tables
            .csv_table(table_name)
            .ok_or_else(|| LoadError::UnknownLookupTable {
                module: self.key.to_string(),
                state: name.to_string(),
                table: table_name.to_string(),
            })?;
        let table = LookupTable::bind(table_name, &csv, &outcomes, self.tolerance).map_err(
            |source| LoadError::LookupTable {
                module: self.key.to_string(),
                state: name.to_string(),
                table: table_name.to_string(),
                source,
            },
        )?;

        Ok(Transition::LookupTable(LookupTransition {
            table: Arc::new(table),
            targets,
            fallback,
        }))
    }
}
