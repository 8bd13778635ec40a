use thiserror::Error;

use crate::lookup::TableError;

/// Errors raised while loading, compiling or validating modules and tables.
///
/// Load errors are cached by the registry alongside successful loads, so
/// they must be cheap to clone.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error("{key}: invalid module definition: {message}")]
    Parse { key: String, message: String },

    #[error("{path}: {message}")]
    Io { path: String, message: String },

    #[error("module '{0}' is not registered")]
    NotFound(String),

    #[error("lookup table '{0}' is not registered")]
    TableNotFound(String),

    #[error("'{0}' is already registered")]
    Duplicate(String),

    #[error("{module}: module has no states")]
    EmptyModule { module: String },

    #[error("{module}: no Initial state")]
    MissingInitial { module: String },

    #[error("{module}: more than one Initial state: {}", states.join(", "))]
    MultipleInitial { module: String, states: Vec<String> },

    #[error("{module}/{state}: {message}")]
    InvalidState {
        module: String,
        state: String,
        message: String,
    },

    #[error("{module}/{state}: non-terminal state has no transition")]
    MissingTransition { module: String, state: String },

    #[error("{module}/{state}: terminal state must not declare a transition")]
    UnexpectedTransition { module: String, state: String },

    #[error("{module}/{state}: more than one transition declared")]
    MultipleTransitions { module: String, state: String },

    #[error("{module}/{state}: transition target '{target}' does not exist")]
    DanglingTarget {
        module: String,
        state: String,
        target: String,
    },

    #[error("{module}/{state}: distribution sums to {sum}, expected 1.0")]
    BadDistribution {
        module: String,
        state: String,
        sum: f64,
    },

    #[error("{module}/{state}: lookup table '{table}' is not registered")]
    UnknownLookupTable {
        module: String,
        state: String,
        table: String,
    },

    #[error("{module}/{state}: lookup table '{table}': {source}")]
    LookupTable {
        module: String,
        state: String,
        table: String,
        source: TableError,
    },

    #[error("{module}/{state}: sub-module '{submodule}' failed to load: {source}")]
    Submodule {
        module: String,
        state: String,
        submodule: String,
        source: Box<LoadError>,
    },

    #[error("{module}/{state}: no Terminal or Death state is reachable from here")]
    NoExit { module: String, state: String },
}
