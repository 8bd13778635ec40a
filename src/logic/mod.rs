//! Condition logic evaluated against an individual
//!
//! Logic trees appear in Guard states and in conditional/complex
//! transitions. They are deserialized straight from module JSON using the
//! `condition_type` tag, so an unknown condition kind fails when the module
//! is loaded rather than when an individual reaches it. Evaluation is a pure
//! function of the person and the evaluation time.

use serde::Deserialize;

use crate::core::calendar::{elapsed_in, year_of, TimeSpan, TimeUnit};
use crate::core::types::{Code, Operator, Timestamp};
use crate::person::{AttrValue, Person};

/// Logic tree node
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "condition_type")]
pub enum Logic {
    And {
        conditions: Vec<Logic>,
    },
    Or {
        conditions: Vec<Logic>,
    },
    Not {
        condition: Box<Logic>,
    },
    /// True when at least `minimum` children are true
    #[serde(rename = "At Least")]
    AtLeast {
        minimum: usize,
        conditions: Vec<Logic>,
    },
    /// True when at most `maximum` children are true
    #[serde(rename = "At Most")]
    AtMost {
        maximum: usize,
        conditions: Vec<Logic>,
    },
    Gender {
        gender: String,
    },
    Age {
        operator: Operator,
        quantity: f64,
        unit: TimeUnit,
    },
    /// Inclusive age window
    #[serde(rename = "Age Range")]
    AgeRange {
        low: f64,
        high: f64,
        unit: TimeUnit,
    },
    Attribute {
        attribute: String,
        operator: Operator,
        #[serde(default)]
        value: Option<AttrValue>,
    },
    #[serde(rename = "Active Condition")]
    ActiveCondition {
        #[serde(default)]
        codes: Vec<Code>,
        #[serde(default)]
        referenced_by_attribute: Option<String>,
    },
    /// The individual has visited the named state, optionally no longer
    /// ago than `within`
    PriorState {
        name: String,
        #[serde(default)]
        within: Option<TimeSpan>,
    },
    Symptom {
        symptom: String,
        operator: Operator,
        value: f64,
    },
    Date {
        operator: Operator,
        year: i32,
    },
    True,
    False,
}

impl Logic {
    /// Evaluate the tree for `person` at `time`. Never fails: a missing
    /// attribute makes its leaf false.
    pub fn evaluate(&self, person: &Person, time: Timestamp) -> bool {
        match self {
            Logic::And { conditions } => conditions.iter().all(|c| c.evaluate(person, time)),
            Logic::Or { conditions } => conditions.iter().any(|c| c.evaluate(person, time)),
            Logic::Not { condition } => !condition.evaluate(person, time),
            Logic::AtLeast {
                minimum,
                conditions,
            } => count_true(conditions, person, time) >= *minimum,
            Logic::AtMost {
                maximum,
                conditions,
            } => count_true(conditions, person, time) <= *maximum,
            Logic::Gender { gender } => person.gender() == Some(gender.as_str()),
            Logic::Age {
                operator,
                quantity,
                unit,
            } => {
                if time < person.birth {
                    return false;
                }
                operator.compare(elapsed_in(*unit, person.birth, time), *quantity)
            }
            Logic::AgeRange { low, high, unit } => {
                if time < person.birth {
                    return false;
                }
                let age = elapsed_in(*unit, person.birth, time);
                *low <= age && age <= *high
            }
            Logic::Attribute {
                attribute,
                operator,
                value,
            } => match (person.attribute(attribute), operator) {
                (None, op) => *op == Operator::IsNil,
                (Some(_), Operator::IsNil) => false,
                (Some(_), Operator::IsNotNil) => true,
                (Some(actual), op) => value
                    .as_ref()
                    .map_or(false, |expected| actual.matches(*op, expected)),
            },
            Logic::ActiveCondition {
                codes,
                referenced_by_attribute,
            } => {
                let by_code = codes.iter().any(|c| person.record.is_active(&c.code));
                let by_attribute = referenced_by_attribute
                    .as_deref()
                    .and_then(|attr| person.attribute_text(attr))
                    .map_or(false, |code| person.record.is_active(code));
                by_code || by_attribute
            }
            Logic::PriorState { name, within } => match person.last_visit(name) {
                None => false,
                Some(visit) if visit.entered > time => false,
                Some(visit) => match within {
                    None => true,
                    Some(span) => {
                        let last_seen = visit.exited.unwrap_or(time).min(time);
                        time - last_seen <= span.to_millis()
                    }
                },
            },
            Logic::Symptom {
                symptom,
                operator,
                value,
            } => match person.symptom_severity(symptom) {
                None => *operator == Operator::IsNil,
                Some(severity) => operator.compare(severity, *value),
            },
            Logic::Date { operator, year } => operator.compare(year_of(time) as f64, *year as f64),
            Logic::True => true,
            Logic::False => false,
        }
    }

    /// Structural checks that serde cannot express. Returns a description
    /// of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Logic::And { conditions } | Logic::Or { conditions } => {
                if conditions.is_empty() {
                    return Err("And/Or needs at least one condition".into());
                }
                validate_all(conditions)
            }
            Logic::Not { condition } => condition.validate(),
            Logic::AtLeast {
                minimum,
                conditions,
            } => {
                if *minimum > conditions.len() {
                    return Err(format!(
                        "At Least {} can never hold with {} conditions",
                        minimum,
                        conditions.len()
                    ));
                }
                validate_all(conditions)
            }
            Logic::AtMost { conditions, .. } => validate_all(conditions),
            Logic::AgeRange { low, high, .. } if low > high => {
                Err(format!("Age Range low ({}) exceeds high ({})", low, high))
            }
            Logic::Attribute {
                attribute,
                operator,
                value,
            } => {
                if !operator.is_nil_check() && value.is_none() {
                    return Err(format!(
                        "Attribute '{}' comparison needs a value",
                        attribute
                    ));
                }
                Ok(())
            }
            Logic::ActiveCondition {
                codes,
                referenced_by_attribute,
            } if codes.is_empty() && referenced_by_attribute.is_none() => {
                Err("Active Condition needs codes or referenced_by_attribute".into())
            }
            _ => Ok(()),
        }
    }
}

fn count_true(conditions: &[Logic], person: &Person, time: Timestamp) -> usize {
    conditions
        .iter()
        .filter(|c| c.evaluate(person, time))
        .count()
}

fn validate_all(conditions: &[Logic]) -> Result<(), String> {
    conditions.iter().try_for_each(Logic::validate)
}
