//! Tokio runtime spawner implementation.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::core::{MachineError, Spawn};

/// Tokio-based spawner that executes routines on a tokio runtime.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
    /// Keeps a dedicated runtime alive for as long as any clone exists.
    runtime: Option<Arc<tokio::runtime::Runtime>>,
}

impl std::fmt::Debug for TokioSpawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioSpawner")
            .field("dedicated", &self.runtime.is_some())
            .finish()
    }
}

impl TokioSpawner {
    /// Create a new `TokioSpawner` from a tokio runtime handle.
    #[must_use]
    pub const fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle,
            runtime: None,
        }
    }

    /// Spawn onto the runtime the caller is currently running in.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::NoRuntime`] outside of a tokio runtime.
    pub fn current() -> Result<Self, MachineError> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|_| MachineError::NoRuntime)
    }

    /// Create a `TokioSpawner` owning a new multi-threaded runtime with the
    /// specified number of worker threads.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from building the runtime.
    pub fn with_worker_threads(worker_threads: usize) -> Result<Self, std::io::Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name("machine-routine")
            .enable_all()
            .build()?;
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(Arc::new(runtime)),
        })
    }

    /// The runtime handle routines are spawned on.
    #[must_use]
    pub const fn handle(&self) -> &tokio::runtime::Handle {
        &self.handle
    }
}

impl Spawn for TokioSpawner {
    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        self.handle.spawn(fut);
    }
}
