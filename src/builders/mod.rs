//! Builders to construct machines from configuration.

pub mod machine_builder;

pub use machine_builder::{build_in_memory_machine, build_machine};
