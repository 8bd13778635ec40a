//! Module definitions and their compiled graphs

pub mod compile;
pub mod error;
pub mod graph;
pub mod schema;
pub mod state;
pub mod transition;

pub use compile::{compile, TableSource};
pub use error::LoadError;
pub use graph::Module;
pub use schema::{ModuleDefinition, StateDefinition, StateKindDef};
pub use state::{Amount, ConditionTarget, DelaySpec, State, StateId, StateKind};
pub use transition::{
    pick_weighted, ComplexBranch, ConditionalBranch, Distribution, LookupTransition, Transition,
};
