//! Module definition types for JSON deserialization.
//!
//! These mirror the authored module files one-to-one. A definition is
//! compiled into an immutable [`Module`](super::Module) by the registry;
//! nothing here is used at simulation time.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::core::calendar::{TimeSpan, TimeUnit};
use crate::core::types::Code;
use crate::logic::Logic;
use crate::person::AttrValue;

/// A complete module file
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleDefinition {
    /// Human-readable module name
    pub name: String,
    #[serde(default)]
    pub remarks: Vec<String>,
    /// State name -> state definition
    pub states: BTreeMap<String, StateDefinition>,
}

impl ModuleDefinition {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// One state: its variant payload plus at most one transition field
#[derive(Debug, Clone, Deserialize)]
pub struct StateDefinition {
    #[serde(flatten)]
    pub kind: StateKindDef,
    #[serde(default)]
    pub direct_transition: Option<String>,
    #[serde(default)]
    pub distributed_transition: Option<Vec<DistributedEntryDef>>,
    #[serde(default)]
    pub conditional_transition: Option<Vec<ConditionalEntryDef>>,
    #[serde(default)]
    pub complex_transition: Option<Vec<ComplexEntryDef>>,
    #[serde(default)]
    pub lookup_table_transition: Option<Vec<LookupEntryDef>>,
}

impl StateDefinition {
    /// Number of transition fields present
    pub fn transition_count(&self) -> usize {
        [
            self.direct_transition.is_some(),
            self.distributed_transition.is_some(),
            self.conditional_transition.is_some(),
            self.complex_transition.is_some(),
            self.lookup_table_transition.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

/// State variants, tagged by `type`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum StateKindDef {
    Initial,
    Terminal,
    Simple,
    Guard {
        allow: Logic,
    },
    Delay {
        #[serde(default)]
        exact: Option<TimeSpan>,
        #[serde(default)]
        range: Option<RangeDef>,
    },
    Encounter {
        #[serde(default = "default_encounter_class")]
        encounter_class: String,
        #[serde(default)]
        codes: Vec<Code>,
    },
    ConditionOnset {
        codes: Vec<Code>,
        #[serde(default)]
        assign_to_attribute: Option<String>,
    },
    ConditionEnd {
        #[serde(default)]
        codes: Option<Vec<Code>>,
        #[serde(default)]
        condition_onset: Option<String>,
        #[serde(default)]
        referenced_by_attribute: Option<String>,
    },
    Symptom {
        symptom: String,
        #[serde(default)]
        cause: Option<String>,
        #[serde(default)]
        exact: Option<ExactDef>,
        #[serde(default)]
        range: Option<RangeDef>,
    },
    SetAttribute {
        attribute: String,
        #[serde(default)]
        value: Option<AttrValue>,
    },
    Counter {
        attribute: String,
        action: CounterAction,
        #[serde(default = "default_amount")]
        amount: f64,
    },
    CallSubmodule {
        submodule: String,
    },
    Death {
        #[serde(default)]
        codes: Vec<Code>,
    },
}

fn default_encounter_class() -> String {
    "ambulatory".to_string()
}

fn default_amount() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterAction {
    Increment,
    Decrement,
}

/// `{"low": 1, "high": 3, "unit": "years"}`; the unit is required for delays
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RangeDef {
    pub low: f64,
    pub high: f64,
    #[serde(default)]
    pub unit: Option<TimeUnit>,
}

/// `{"quantity": 40}`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ExactDef {
    pub quantity: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DistributedEntryDef {
    pub transition: String,
    pub distribution: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConditionalEntryDef {
    #[serde(default)]
    pub condition: Option<Logic>,
    pub transition: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComplexEntryDef {
    #[serde(default)]
    pub condition: Option<Logic>,
    pub distributions: Vec<DistributedEntryDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LookupEntryDef {
    pub transition: String,
    pub lookup_table_name: String,
    #[serde(default)]
    pub default_probability: Option<f64>,
}
