//! Public API: the table engine and its builders.

pub mod builders;
pub mod engine;

pub use builders::{SelectBuilder, TableBuilder};
pub use engine::{EngineConfig, TableEngine};
