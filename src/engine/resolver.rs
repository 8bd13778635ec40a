//! Transition resolution
//!
//! Picks the next state for an individual leaving a state. All randomness
//! comes from the individual's own stream, one uniform draw per sampled
//! transition.

use thiserror::Error;

use crate::core::types::Timestamp;
use crate::module::{pick_weighted, StateId, Transition};
use crate::person::Person;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("no branch matched and no default branch is declared")]
    NoMatchingBranch,

    #[error("lookup table '{table}' has no row for [{key}] and no default")]
    MissingBucket { table: String, key: String },

    #[error("distribution has no positive weight")]
    EmptyDistribution,
}

/// Resolve `transition` for `person` at `time`
pub fn resolve(
    transition: &Transition,
    person: &mut Person,
    time: Timestamp,
) -> Result<StateId, ResolveError> {
    match transition {
        Transition::Direct(target) => Ok(*target),

        Transition::Distributed(distribution) => {
            let draw = person.rand();
            distribution
                .pick(draw)
                .ok_or(ResolveError::EmptyDistribution)
        }

        Transition::Conditional(branches) => branches
            .iter()
            .find(|b| b.condition.as_ref().map_or(true, |c| c.evaluate(person, time)))
            .map(|b| b.target)
            .ok_or(ResolveError::NoMatchingBranch),

        Transition::Complex(branches) => {
            let branch = branches
                .iter()
                .find(|b| b.condition.as_ref().map_or(true, |c| c.evaluate(person, time)))
                .ok_or(ResolveError::NoMatchingBranch)?;
            let draw = person.rand();
            branch
                .distribution
                .pick(draw)
                .ok_or(ResolveError::EmptyDistribution)
        }

        Transition::LookupTable(lookup) => {
            let (line, row) = match lookup.table.lookup(person, time) {
                Some(bucket) => (Some(bucket.line), bucket.probabilities),
                None => {
                    let fallback = lookup.fallback.as_deref().ok_or_else(|| {
                        ResolveError::MissingBucket {
                            table: lookup.table.name().to_string(),
                            key: lookup.table.bucket_key(person, time),
                        }
                    })?;
                    (None, fallback)
                }
            };
            tracing::trace!(
                "person {}: {} row {:?} -> {:?}",
                person.index,
                lookup.table.name(),
                line,
                row
            );
            let draw = person.rand();
            pick_weighted(lookup.targets.iter().copied().zip(row.iter().copied()), draw)
                .ok_or(ResolveError::EmptyDistribution)
        }
    }
}
