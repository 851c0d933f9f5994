//! The handle a running routine sees, and its bookkeeping entry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{Context, Machine, MachineError, RoutineStats};
use crate::infra::{Cache, Subscription};

/// Execution handle for one admitted unit of work.
///
/// Passed by value to the routine body. Cloning is cheap.
#[derive(Clone)]
pub struct Routine {
    id: Arc<str>,
    tags: Arc<[String]>,
    context: Context,
    start: Instant,
    started_at_ms: u128,
    machine: Machine,
}

impl std::fmt::Debug for Routine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Routine")
            .field("id", &self.id)
            .field("tags", &self.tags)
            .field("started_at_ms", &self.started_at_ms)
            .finish_non_exhaustive()
    }
}

impl Routine {
    pub(crate) fn new(entry: &RoutineEntry, machine: Machine) -> Self {
        Self {
            id: Arc::clone(&entry.id),
            tags: Arc::clone(&entry.tags),
            context: entry.context.clone(),
            start: entry.start,
            started_at_ms: entry.started_at_ms,
            machine,
        }
    }

    /// This routine's context. Once it is done the body should return.
    #[must_use]
    pub const fn context(&self) -> &Context {
        &self.context
    }

    /// Routine identifier, unique among the machine's active routines.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Tags supplied at submission.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Admission instant.
    #[must_use]
    pub const fn start(&self) -> Instant {
        self.start
    }

    /// Admission time in milliseconds since the Unix epoch.
    #[must_use]
    pub const fn started_at_ms(&self) -> u128 {
        self.started_at_ms
    }

    /// Time elapsed since admission.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.start.elapsed()
    }

    /// Publish `value` on `channel` of the owning machine's event bus.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Closed`] once the event bus has been released.
    pub async fn publish(&self, channel: &str, value: Value) -> Result<usize, MachineError> {
        self.machine.pubsub().publish(channel, value).await
    }

    /// Subscribe this routine to `channel`. Replaces an earlier lane on the
    /// same channel. The lane is dropped when the routine finishes.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Closed`] once the event bus has been released.
    pub fn subscribe(&self, channel: &str) -> Result<Subscription, MachineError> {
        self.machine.pubsub().subscribe(channel, &self.id)
    }

    /// The owning machine's cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn Cache> {
        self.machine.cache()
    }

    /// The owning machine, for nested submission or deriving children.
    #[must_use]
    pub const fn machine(&self) -> &Machine {
        &self.machine
    }
}

/// Routine-table entry kept while a routine is active.
pub(crate) struct RoutineEntry {
    pub(crate) id: Arc<str>,
    pub(crate) tags: Arc<[String]>,
    pub(crate) context: Context,
    pub(crate) start: Instant,
    pub(crate) started_at_ms: u128,
    /// Fired exactly once when the routine body has returned.
    pub(crate) finished: CancellationToken,
}

impl RoutineEntry {
    pub(crate) fn stats(&self) -> RoutineStats {
        RoutineStats {
            id: self.id.to_string(),
            tags: self.tags.to_vec(),
            started_at_ms: self.started_at_ms,
            duration: self.start.elapsed(),
        }
    }
}
