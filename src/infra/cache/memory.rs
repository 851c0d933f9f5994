//! In-memory cache backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde_json::Value;

use super::Cache;
use crate::core::MachineError;

/// Simple in-memory cache for development/testing and the default backend.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, Value>>,
    closed: AtomicBool,
}

impl InMemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn ensure_open(&self) -> Result<(), MachineError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MachineError::Closed);
        }
        Ok(())
    }
}

impl Cache for InMemoryCache {
    fn get(&self, key: &str) -> Result<Option<Value>, MachineError> {
        self.ensure_open()?;
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), MachineError> {
        self.ensure_open()?;
        self.entries.write().insert(key.to_owned(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<Option<Value>, MachineError> {
        self.ensure_open()?;
        Ok(self.entries.write().remove(key))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.entries.write().clear();
        tracing::debug!("cache closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
