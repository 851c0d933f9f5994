//! Configuration models for machines and their backends.

pub mod machine;

pub use machine::{CacheBackendConfig, MachineConfig, PubSubBackendConfig};
