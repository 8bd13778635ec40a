//! Attribute bag values and the well-known demographic keys

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::types::Operator;

pub const GENDER: &str = "gender";
pub const ETHNICITY: &str = "ethnicity";
pub const RACE: &str = "race";
pub const BIRTHDATE: &str = "birthdate";

/// A single attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl AttrValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Compare against an expected value. Mismatched kinds never match,
    /// except `!=` which holds for them.
    pub fn matches(&self, op: Operator, expected: &AttrValue) -> bool {
        match (self, expected) {
            (AttrValue::Number(a), AttrValue::Number(b)) => op.compare(*a, *b),
            (AttrValue::Text(a), AttrValue::Text(b)) => op.compare_str(a, b),
            (AttrValue::Bool(a), AttrValue::Bool(b)) => match op {
                Operator::Eq => a == b,
                Operator::Neq => a != b,
                _ => false,
            },
            _ => op == Operator::Neq,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::Number(n) => write!(f, "{}", n),
            AttrValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Number(n)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Number(n as f64)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_deserialize() {
        let v: AttrValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, AttrValue::Bool(true));
        let v: AttrValue = serde_json::from_str("3").unwrap();
        assert_eq!(v, AttrValue::Number(3.0));
        let v: AttrValue = serde_json::from_str("\"english\"").unwrap();
        assert_eq!(v, AttrValue::Text("english".into()));
    }

    #[test]
    fn test_matches_by_kind() {
        assert!(AttrValue::from(5.0).matches(Operator::Gt, &AttrValue::from(3.0)));
        assert!(AttrValue::from("M").matches(Operator::Eq, &AttrValue::from("M")));
        assert!(!AttrValue::from(true).matches(Operator::Gt, &AttrValue::from(false)));
        assert!(!AttrValue::from("5").matches(Operator::Eq, &AttrValue::from(5.0)));
        assert!(AttrValue::from("5").matches(Operator::Neq, &AttrValue::from(5.0)));
    }
}
