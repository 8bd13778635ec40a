//! Core type definitions used throughout the codebase

use serde::{Deserialize, Serialize};
use std::fmt;

/// Simulation time: milliseconds since the Unix epoch
pub type Timestamp = i64;

/// Index of an individual within a population run
pub type PersonIndex = u64;

/// A coded clinical concept (e.g. SNOMED-CT condition)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Code {
    pub system: String,
    pub code: String,
    #[serde(default)]
    pub display: String,
}

impl Code {
    pub fn new(system: &str, code: &str, display: &str) -> Self {
        Self {
            system: system.to_string(),
            code: code.to_string(),
            display: display.to_string(),
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.system, self.code)?;
        if !self.display.is_empty() {
            write!(f, " ({})", self.display)?;
        }
        Ok(())
    }
}

/// Comparison operators shared by logic leaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "!=")]
    Neq,
    #[serde(rename = "is nil")]
    IsNil,
    #[serde(rename = "is not nil")]
    IsNotNil,
}

impl Operator {
    /// Compare two numbers. Nil checks never hold for a present number.
    pub fn compare(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Operator::Lt => lhs < rhs,
            Operator::Lte => lhs <= rhs,
            Operator::Eq => lhs == rhs,
            Operator::Gte => lhs >= rhs,
            Operator::Gt => lhs > rhs,
            Operator::Neq => lhs != rhs,
            Operator::IsNil => false,
            Operator::IsNotNil => true,
        }
    }

    /// Compare two strings; ordering operators use lexical order
    pub fn compare_str(self, lhs: &str, rhs: &str) -> bool {
        match self {
            Operator::Lt => lhs < rhs,
            Operator::Lte => lhs <= rhs,
            Operator::Eq => lhs == rhs,
            Operator::Gte => lhs >= rhs,
            Operator::Gt => lhs > rhs,
            Operator::Neq => lhs != rhs,
            Operator::IsNil => false,
            Operator::IsNotNil => true,
        }
    }

    pub fn is_nil_check(self) -> bool {
        matches!(self, Operator::IsNil | Operator::IsNotNil)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_compare() {
        assert!(Operator::Lt.compare(1.0, 2.0));
        assert!(Operator::Lte.compare(2.0, 2.0));
        assert!(!Operator::Gt.compare(2.0, 2.0));
        assert!(Operator::Neq.compare(1.0, 2.0));
        assert!(!Operator::IsNil.compare(1.0, 0.0));
    }

    #[test]
    fn test_operator_deserialize() {
        let op: Operator = serde_json::from_str("\">=\"").unwrap();
        assert_eq!(op, Operator::Gte);
        let op: Operator = serde_json::from_str("\"is not nil\"").unwrap();
        assert!(op.is_nil_check());
    }

    #[test]
    fn test_code_display() {
        let code = Code::new("SNOMED-CT", "23502007", "Mild_Lookuptablitis");
        assert_eq!(code.to_string(), "SNOMED-CT 23502007 (Mild_Lookuptablitis)");
    }
}
