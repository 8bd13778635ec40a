//! Compiled states

use serde::{Deserialize, Serialize};

use super::transition::Transition;
use crate::core::types::Code;
use crate::logic::Logic;
use crate::person::{AttrValue, Person};

/// Dense index of a state within its module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(pub usize);

/// How long a Delay state waits, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DelaySpec {
    Exact(i64),
    Range { low: i64, high: i64 },
}

impl DelaySpec {
    pub fn sample(&self, person: &mut Person) -> i64 {
        match *self {
            DelaySpec::Exact(ms) => ms,
            DelaySpec::Range { low, high } => person.rand_between(low as f64, high as f64).round() as i64,
        }
    }
}

/// A fixed or sampled number, such as symptom severity
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Amount {
    Exact(f64),
    Range { low: f64, high: f64 },
}

impl Amount {
    pub fn sample(&self, person: &mut Person) -> f64 {
        match *self {
            Amount::Exact(value) => value,
            Amount::Range { low, high } => person.rand_between(low, high),
        }
    }
}

/// Which open condition a ConditionEnd closes
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionTarget {
    /// Explicit codes, or the codes of a named ConditionOnset state
    Codes(Vec<Code>),
    /// An attribute holding the code, written by `assign_to_attribute`
    Attribute(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateKind {
    Initial,
    Terminal,
    Simple,
    Guard {
        allow: Logic,
    },
    Delay(DelaySpec),
    Encounter {
        class: String,
        codes: Vec<Code>,
    },
    ConditionOnset {
        codes: Vec<Code>,
        assign_to_attribute: Option<String>,
    },
    ConditionEnd(ConditionTarget),
    Symptom {
        symptom: String,
        cause: String,
        severity: Amount,
    },
    SetAttribute {
        attribute: String,
        value: Option<AttrValue>,
    },
    Counter {
        attribute: String,
        delta: f64,
    },
    CallSubmodule {
        submodule: String,
    },
    Death {
        codes: Vec<Code>,
    },
}

impl StateKind {
    /// Terminal and Death end a module and carry no transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, StateKind::Terminal | StateKind::Death { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            StateKind::Initial => "Initial",
            StateKind::Terminal => "Terminal",
            StateKind::Simple => "Simple",
            StateKind::Guard { .. } => "Guard",
            StateKind::Delay(_) => "Delay",
            StateKind::Encounter { .. } => "Encounter",
            StateKind::ConditionOnset { .. } => "ConditionOnset",
            StateKind::ConditionEnd(_) => "ConditionEnd",
            StateKind::Symptom { .. } => "Symptom",
            StateKind::SetAttribute { .. } => "SetAttribute",
            StateKind::Counter { .. } => "Counter",
            StateKind::CallSubmodule { .. } => "CallSubmodule",
            StateKind::Death { .. } => "Death",
        }
    }
}

#[derive(Debug, Clone)]
pub struct State {
    pub name: String,
    pub kind: StateKind,
    /// `None` exactly for terminal kinds
    pub transition: Option<Transition>,
}
