//! Shared utilities.

pub mod clock;
pub mod id;
pub mod telemetry;

pub use clock::now_ms;
pub use id::generate_id;
pub use telemetry::init_tracing;
