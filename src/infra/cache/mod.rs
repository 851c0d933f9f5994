//! Side cache attached to a machine and shared with its routines.

pub mod memory;

pub use memory::InMemoryCache;

use serde_json::Value;

use crate::core::MachineError;

/// Abstraction for key/value cache backends.
///
/// Implementations must be safe for concurrent use by any number of
/// routines. The machine only calls [`Cache::close`] at teardown.
pub trait Cache: Send + Sync {
    /// Look up a value.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Closed`] once the cache has been closed.
    fn get(&self, key: &str) -> Result<Option<Value>, MachineError>;
    /// Insert or replace a value.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Closed`] once the cache has been closed.
    fn set(&self, key: &str, value: Value) -> Result<(), MachineError>;
    /// Remove a value, returning it if present.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Closed`] once the cache has been closed.
    fn delete(&self, key: &str) -> Result<Option<Value>, MachineError>;
    /// Release the backing storage. Idempotent.
    fn close(&self);
    /// Whether [`Cache::close`] has been called.
    fn is_closed(&self) -> bool;
}
