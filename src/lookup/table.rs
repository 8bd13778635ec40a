//! Demographic lookup tables
//!
//! A table maps a demographic bucket (attribute columns plus an optional
//! `age` column of whole-year ranges) to a probability distribution over a
//! fixed, ordered list of outcome labels. Which header columns are outcomes
//! is decided by the transition that binds the table: columns named after
//! its target states are outcomes, every other column is a key.
//!
//! A key column whose cells are all probabilities is rejected: it is an
//! outcome the transition does not list.
//!
//! Rows are matched in file order and the first match wins. A row whose key
//! cells are all `*` is the table's default row. Any other `*` cell matches
//! every value in its column.

use thiserror::Error;

use super::parser::{parse_age_range, parse_probability, CsvTable};
use crate::core::types::Timestamp;
use crate::person::Person;

pub const AGE_COLUMN: &str = "age";
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("line {line}: expected {expected} cells, found {found}")]
    RaggedRow {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("table has no header")]
    Empty,

    #[error("no column for outcome '{0}'")]
    MissingOutcome(String),

    #[error("line {line}: invalid probability '{value}' for '{column}'")]
    BadProbability {
        line: usize,
        column: String,
        value: String,
    },

    #[error("line {line}: invalid age range '{value}'")]
    BadAgeRange { line: usize, value: String },

    #[error("line {line}: probabilities sum to {sum}, expected 1.0")]
    RowSum { line: usize, sum: f64 },

    #[error("column '{0}' holds probabilities but is not a transition target")]
    UnlistedOutcome(String),

    #[error("more than one default row (line {line})")]
    DuplicateDefault { line: usize },
}

/// Inclusive range of whole years
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeRange {
    pub low: u32,
    pub high: u32,
}

impl AgeRange {
    pub fn contains(&self, age: u32) -> bool {
        self.low <= age && age <= self.high
    }
}

#[derive(Debug, Clone, PartialEq)]
enum KeyColumn {
    Attribute(String),
    Age,
}

#[derive(Debug, Clone, PartialEq)]
enum KeyCell {
    Value(String),
    Ages(AgeRange),
    Any,
}

#[derive(Debug, Clone, PartialEq)]
struct Row {
    line: usize,
    keys: Vec<KeyCell>,
    probabilities: Vec<f64>,
}

/// The row serving one individual
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket<'a> {
    /// Source line in the CSV
    pub line: usize,
    pub probabilities: &'a [f64],
}

/// An immutable lookup table bound to an ordered outcome list
#[derive(Debug, Clone, PartialEq)]
pub struct LookupTable {
    name: String,
    key_columns: Vec<KeyColumn>,
    outcomes: Vec<String>,
    rows: Vec<Row>,
    default_row: Option<Row>,
}

impl LookupTable {
    /// Interpret `csv` with `outcomes` as the probability columns, in that order.
    pub fn bind(
        name: &str,
        csv: &CsvTable,
        outcomes: &[String],
        tolerance: f64,
    ) -> Result<Self, TableError> {
        let outcome_columns = outcomes
            .iter()
            .map(|label| {
                csv.column(label)
                    .ok_or_else(|| TableError::MissingOutcome(label.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let key_indices: Vec<usize> = (0..csv.header.len())
            .filter(|i| !outcome_columns.contains(i))
            .collect();
        let key_columns = key_indices
            .iter()
            .map(|&i| match csv.header[i].as_str() {
                AGE_COLUMN => KeyColumn::Age,
                other => KeyColumn::Attribute(other.to_string()),
            })
            .collect::<Vec<_>>();

        for (&col, column) in key_indices.iter().zip(&key_columns) {
            if let KeyColumn::Attribute(name) = column {
                let mut cells = csv
                    .rows
                    .iter()
                    .map(|(_, cells)| cells[col].as_str())
                    .filter(|cell| *cell != WILDCARD)
                    .peekable();
                let probability_like = cells.peek().is_some()
                    && cells.all(|cell| {
                        parse_probability(cell).map_or(false, |p| (0.0..=1.0).contains(&p))
                    });
                if probability_like {
                    return Err(TableError::UnlistedOutcome(name.clone()));
                }
            }
        }

        let mut rows = Vec::new();
        let mut default_row = None;

        for (line, cells) in &csv.rows {
            let line = *line;
            let mut probabilities = Vec::with_capacity(outcome_columns.len());
            for (&col, label) in outcome_columns.iter().zip(outcomes) {
                let value = parse_probability(&cells[col])
                    .filter(|p| (0.0..=1.0).contains(p))
                    .ok_or_else(|| TableError::BadProbability {
                        line,
                        column: label.clone(),
                        value: cells[col].clone(),
                    })?;
                probabilities.push(value);
            }
            let sum: f64 = probabilities.iter().sum();
            if (sum - 1.0).abs() > tolerance {
                return Err(TableError::RowSum { line, sum });
            }

            let mut keys = Vec::with_capacity(key_columns.len());
            for (&col, column) in key_indices.iter().zip(&key_columns) {
                let cell = cells[col].as_str();
                let key = match (cell, column) {
                    (WILDCARD, _) => KeyCell::Any,
                    (_, KeyColumn::Age) => KeyCell::Ages(parse_age_range(cell).ok_or_else(
                        || TableError::BadAgeRange {
                            line,
                            value: cell.to_string(),
                        },
                    )?),
                    (_, KeyColumn::Attribute(_)) => KeyCell::Value(cell.to_string()),
                };
                keys.push(key);
            }

            let is_default = !keys.is_empty() && keys.iter().all(|k| *k == KeyCell::Any);
            let row = Row {
                line,
                keys,
                probabilities,
            };
            if is_default {
                if default_row.is_some() {
                    return Err(TableError::DuplicateDefault { line });
                }
                default_row = Some(row);
            } else {
                rows.push(row);
            }
        }

        Ok(Self {
            name: name.to_string(),
            key_columns,
            outcomes: outcomes.to_vec(),
            rows,
            default_row,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn outcomes(&self) -> &[String] {
        &self.outcomes
    }

    pub fn has_default(&self) -> bool {
        self.default_row.is_some()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// The person's bucket at `time`, falling back to the default row.
    /// `None` means the bucket is missing and there is no default.
    pub fn lookup(&self, person: &Person, time: Timestamp) -> Option<Bucket<'_>> {
        let age = person.age_in_years(time);
        self.rows
            .iter()
            .find(|row| self.row_matches(row, person, age))
            .or(self.default_row.as_ref())
            .map(|row| Bucket {
                line: row.line,
                probabilities: &row.probabilities,
            })
    }

    /// Human-readable bucket key, for error reports
    pub fn bucket_key(&self, person: &Person, time: Timestamp) -> String {
        self.key_columns
            .iter()
            .map(|column| match column {
                KeyColumn::Age => format!("{}={}", AGE_COLUMN, person.age_in_years(time)),
                KeyColumn::Attribute(name) => format!(
                    "{}={}",
                    name,
                    person
                        .attribute(name)
                        .map_or_else(|| "<missing>".to_string(), |v| v.to_string())
                ),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn row_matches(&self, row: &Row, person: &Person, age: u32) -> bool {
        row.keys
            .iter()
            .zip(&self.key_columns)
            .all(|(cell, column)| match (cell, column) {
                (KeyCell::Any, _) => true,
                (KeyCell::Ages(range), KeyColumn::Age) => range.contains(age),
                (KeyCell::Value(expected), KeyColumn::Attribute(name)) => person
                    .attribute(name)
                    .map_or(false, |actual| actual.to_string() == *expected),
                _ => false,
            })
    }
}
