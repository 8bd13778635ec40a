//! Module execution: transition resolution and the per-individual executor

pub mod context;
pub mod executor;
pub mod resolver;

pub use context::{Frame, ModuleRun, RunStatus};
pub use executor::{CancelFlag, ExecutionError, ExecutionErrorKind, Executor, RunOutcome};
pub use resolver::{resolve, ResolveError};
