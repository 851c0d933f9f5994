//! Runtime adapters for driving machines.

pub mod tokio_spawner;

pub use tokio_spawner::TokioSpawner;
