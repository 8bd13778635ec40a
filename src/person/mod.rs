//! Individual timeline: the person being simulated and their health record

pub mod attributes;
#[allow(clippy::module_inception)]
pub mod person;
pub mod record;

pub use attributes::AttrValue;
pub use person::{person_rng, Person, StateVisit};
pub use record::{Entry, EntryKind, HealthRecord, RecordError};
