//! Compiled transitions
//!
//! Targets are already resolved to [`StateId`]s and probability rows are
//! validated, so resolving a transition at runtime only evaluates logic and
//! draws numbers.

use std::sync::Arc;

use super::state::StateId;
use crate::logic::Logic;
use crate::lookup::LookupTable;

/// Weighted choice over targets, in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    entries: Vec<(StateId, f64)>,
}

impl Distribution {
    pub fn new(entries: Vec<(StateId, f64)>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[(StateId, f64)] {
        &self.entries
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, w)| w).sum()
    }

    /// Pick the target whose cumulative interval contains `draw` (in [0, 1)).
    /// A draw past the accumulated total (rounding) selects the last
    /// target with positive weight.
    pub fn pick(&self, draw: f64) -> Option<StateId> {
        pick_weighted(self.entries.iter().map(|(id, w)| (*id, *w)), draw)
    }
}

/// Cumulative-interval selection shared by distributions and lookup rows
pub fn pick_weighted<T: Copy>(entries: impl IntoIterator<Item = (T, f64)>, draw: f64) -> Option<T> {
    let mut acc = 0.0;
    let mut fallback = None;
    for (item, weight) in entries {
        if weight <= 0.0 {
            continue;
        }
        acc += weight;
        if draw < acc {
            return Some(item);
        }
        fallback = Some(item);
    }
    fallback
}

#[derive(Debug, Clone)]
pub struct ConditionalBranch {
    /// `None` is the default branch
    pub condition: Option<Logic>,
    pub target: StateId,
}

#[derive(Debug, Clone)]
pub struct ComplexBranch {
    pub condition: Option<Logic>,
    pub distribution: Distribution,
}

#[derive(Debug, Clone)]
pub struct LookupTransition {
    pub table: Arc<LookupTable>,
    /// Aligned with `table.outcomes()`
    pub targets: Vec<StateId>,
    /// Row built from the entries' `default_probability` values
    pub fallback: Option<Vec<f64>>,
}

#[derive(Debug, Clone)]
pub enum Transition {
    Direct(StateId),
    Distributed(Distribution),
    Conditional(Vec<ConditionalBranch>),
    Complex(Vec<ComplexBranch>),
    LookupTable(LookupTransition),
}

impl Transition {
    /// Every state this transition can lead to
    pub fn targets(&self) -> Vec<StateId> {
        match self {
            Transition::Direct(id) => vec![*id],
            Transition::Distributed(d) => d.entries().iter().map(|(id, _)| *id).collect(),
            Transition::Conditional(branches) => branches.iter().map(|b| b.target).collect(),
            Transition::Complex(branches) => branches
                .iter()
                .flat_map(|b| b.distribution.entries().iter().map(|(id, _)| *id))
                .collect(),
            Transition::LookupTable(lookup) => lookup.targets.clone(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Transition::Direct(_) => "direct",
            Transition::Distributed(_) => "distributed",
            Transition::Conditional(_) => "conditional",
            Transition::Complex(_) => "complex",
            Transition::LookupTable(_) => "lookup_table",
        }
    }
}
