//! Lifeline - data-driven clinical module engine
//!
//! Modules are JSON state machines describing how a disease or care
//! pathway unfolds. The engine loads and validates them once, then walks
//! each synthetic individual through every module over simulated time,
//! writing coded events into the individual's health record.

pub mod core;
pub mod engine;
pub mod logic;
pub mod lookup;
pub mod module;
pub mod person;
pub mod population;
pub mod registry;
