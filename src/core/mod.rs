pub mod calendar;
pub mod config;
pub mod error;
pub mod types;

pub use calendar::{TimeSpan, TimeUnit};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use types::{Code, Operator, PersonIndex, Timestamp};
