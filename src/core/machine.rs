//! The machine: a throttled routine scheduler with a cancellation tree.
//!
//! A [`Machine`] is a cheaply cloneable handle. It owns a root [`Context`],
//! the table of active routines, the dispatch loop that admits queued work
//! under the concurrency ceiling, a cache, an event bus, and any child
//! machines created with [`Machine::derive`].
//!
//! # Lifecycle
//!
//! - [`Machine::cancel`] cancels the root context and every child. Queued
//!   work is dropped, running routines see their context done.
//! - [`Machine::close`] cancels, stops the dispatch loop, and closes every
//!   child. Cache and event bus are released once in-flight routines have
//!   drained; [`Machine::closed`] resolves at that point.
//! - [`Machine::wait`] resolves once nothing is queued or running anywhere
//!   in the tree, then cancels.
//!
//! ```rust,ignore
//! let machine = Machine::new(MachineOptions::new().with_max_routines(8))?;
//! for i in 0..100 {
//!     machine
//!         .go(move |routine| async move {
//!             tokio::select! {
//!                 () = routine.context().done() => {}
//!                 () = do_work(i) => {}
//!             }
//!             Ok(())
//!         })
//!         .await;
//! }
//! let failures = machine.wait().await;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use super::dispatch::{self, Spawn};
use super::routine::RoutineEntry;
use super::work::{routine_fn, Work};
use super::{Context, GoOpts, MachineError, MachineState, Routine, RoutineFailure, RoutineResult, Stats};
use crate::config::MachineConfig;
use crate::infra::pubsub::memory::DEFAULT_PUBLISH_TIMEOUT;
use crate::infra::{Cache, InMemoryCache, InMemoryPubSub, PubSub};
use crate::runtime::TokioSpawner;

/// Default concurrency ceiling.
pub const DEFAULT_MAX_ROUTINES: usize = 10_000;

/// Construction options for a machine.
#[derive(Clone, Default)]
pub struct MachineOptions {
    name: Option<String>,
    max_routines: Option<usize>,
    cache: Option<Arc<dyn Cache>>,
    pubsub: Option<Arc<dyn PubSub>>,
    spawner: Option<Arc<dyn Spawn>>,
    publish_timeout: Option<Duration>,
}

impl fmt::Debug for MachineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineOptions")
            .field("name", &self.name)
            .field("max_routines", &self.max_routines)
            .field("cache", &self.cache.is_some())
            .field("pubsub", &self.pubsub.is_some())
            .field("spawner", &self.spawner.is_some())
            .field("publish_timeout", &self.publish_timeout)
            .finish()
    }
}

impl MachineOptions {
    /// Default options: 10000 routines, in-memory cache and event bus,
    /// spawning on the current tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options matching a validated [`MachineConfig`]. Backend selectors
    /// name in-memory backends only, which are the defaults.
    #[must_use]
    pub fn from_config(cfg: &MachineConfig) -> Self {
        let mut opts = Self::new()
            .with_max_routines(cfg.max_routines)
            .with_publish_timeout(Duration::from_millis(cfg.publish_timeout_ms));
        if let Some(name) = &cfg.name {
            opts = opts.with_name(name.clone());
        }
        opts
    }

    /// Name used in log fields.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Concurrency ceiling. Zero selects the default.
    #[must_use]
    pub const fn with_max_routines(mut self, max_routines: usize) -> Self {
        self.max_routines = Some(max_routines);
        self
    }

    /// Use a specific cache instance.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use a specific event bus instance.
    #[must_use]
    pub fn with_pubsub(mut self, pubsub: Arc<dyn PubSub>) -> Self {
        self.pubsub = Some(pubsub);
        self
    }

    /// Spawn the dispatch loop and routines with `spawner`.
    #[must_use]
    pub fn with_spawner(mut self, spawner: Arc<dyn Spawn>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Per-lane publish timeout for the default event bus.
    #[must_use]
    pub const fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = Some(timeout);
        self
    }
}

/// State shared by every handle of one machine.
pub(crate) struct Shared {
    pub(crate) name: String,
    pub(crate) max: usize,
    pub(crate) context: Context,
    pub(crate) routines: RwLock<HashMap<Arc<str>, RoutineEntry>>,
    pub(crate) total: AtomicU64,
    /// Submitted but not yet admitted or dropped.
    pub(crate) pending: AtomicUsize,
    children: RwLock<Vec<Machine>>,
    /// Non-owning; used for `has_parent` and capacity wake-ups only.
    parent: Option<Weak<Shared>>,
    cache: Arc<dyn Cache>,
    pubsub: Arc<dyn PubSub>,
    pub(crate) spawner: Arc<dyn Spawn>,
    failures: Mutex<Vec<RoutineFailure>>,
    /// Dropped on close so the dispatch loop drains and exits.
    queue: Mutex<Option<mpsc::UnboundedSender<Work>>>,
    /// Raised whenever capacity frees, work is dropped, or the machine is
    /// cancelled.
    pub(crate) changed: Notify,
    cancelled: AtomicBool,
    closed: AtomicBool,
    released: AtomicBool,
    released_signal: CancellationToken,
}

impl Shared {
    /// Close cache and event bus exactly once.
    pub(crate) fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cache.close();
        self.pubsub.close();
        self.released_signal.cancel();
        tracing::info!(machine = %self.name, "machine resources released");
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Last handle gone: nothing can observe this machine any more.
        self.context.cancel();
        self.release();
    }
}

/// Handle to a throttled routine scheduler.
#[derive(Clone)]
pub struct Machine {
    pub(crate) shared: Arc<Shared>,
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("name", &self.shared.name)
            .field("max", &self.shared.max)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Machine {
    /// Create a root machine and start its dispatch loop.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::NoRuntime`] if no spawner was supplied and the
    /// caller is not inside a tokio runtime.
    pub fn new(opts: MachineOptions) -> Result<Self, MachineError> {
        Self::build(opts, Context::new(), None)
    }

    fn build(
        opts: MachineOptions,
        context: Context,
        parent: Option<Weak<Shared>>,
    ) -> Result<Self, MachineError> {
        let spawner: Arc<dyn Spawn> = match opts.spawner {
            Some(spawner) => spawner,
            None => Arc::new(TokioSpawner::current()?),
        };
        let max = match opts.max_routines {
            Some(0) | None => DEFAULT_MAX_ROUTINES,
            Some(n) => n,
        };
        let name = opts.name.unwrap_or_else(|| "machine".to_owned());
        let cache = opts
            .cache
            .unwrap_or_else(|| Arc::new(InMemoryCache::new()));
        let pubsub = opts.pubsub.unwrap_or_else(|| {
            Arc::new(InMemoryPubSub::with_publish_timeout(
                opts.publish_timeout.unwrap_or(DEFAULT_PUBLISH_TIMEOUT),
            ))
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            name,
            max,
            context,
            routines: RwLock::new(HashMap::new()),
            total: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
            children: RwLock::new(Vec::new()),
            parent,
            cache,
            pubsub,
            spawner: Arc::clone(&spawner),
            failures: Mutex::new(Vec::new()),
            queue: Mutex::new(Some(tx)),
            changed: Notify::new(),
            cancelled: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            released: AtomicBool::new(false),
            released_signal: CancellationToken::new(),
        });

        spawner.spawn(Box::pin(dispatch::run(Arc::downgrade(&shared), rx)));

        tracing::info!(
            machine = %shared.name,
            max_routines = max,
            has_parent = shared.parent.is_some(),
            "machine started"
        );
        Ok(Self { shared })
    }

    /// Submit `f` with default options. See [`Machine::go_with`].
    pub async fn go<F, Fut>(&self, f: F)
    where
        F: FnOnce(Routine) -> Fut + Send + 'static,
        Fut: Future<Output = RoutineResult> + Send + 'static,
    {
        self.go_with(f, GoOpts::default()).await;
    }

    /// Submit `f` for execution as a routine.
    ///
    /// Never blocks: the queue is unbounded and the ceiling applies at
    /// admission, so routines may fan out into their own machine freely.
    /// Submissions to a cancelled or closed machine are silently dropped.
    #[allow(clippy::unused_async)]
    pub async fn go_with<F, Fut>(&self, f: F, opts: GoOpts)
    where
        F: FnOnce(Routine) -> Fut + Send + 'static,
        Fut: Future<Output = RoutineResult> + Send + 'static,
    {
        self.submit(Work::new(routine_fn(f), opts));
    }

    fn submit(&self, work: Work) {
        if self.shared.context.is_done() || self.is_closed() {
            tracing::debug!(machine = %self.shared.name, "submission rejected: machine not open");
            return;
        }
        let Some(tx) = self.shared.queue.lock().clone() else {
            tracing::debug!(machine = %self.shared.name, "submission rejected: queue closed");
            return;
        };

        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        if tx.send(work).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            self.notify_tree();
            tracing::debug!(machine = %self.shared.name, "submission rejected: dispatch loop gone");
        }
    }

    /// Create a child machine rooted under this machine's context.
    ///
    /// The child gets its own ceiling, cache, and event bus unless `opts`
    /// supplies them; it reuses this machine's spawner by default.
    ///
    /// # Errors
    ///
    /// Propagates construction errors from [`Machine::new`].
    pub fn derive(&self, mut opts: MachineOptions) -> Result<Self, MachineError> {
        if opts.spawner.is_none() {
            opts.spawner = Some(Arc::clone(&self.shared.spawner));
        }
        if opts.name.is_none() {
            let index = self.shared.children.read().len();
            opts.name = Some(format!("{}.{index}", self.shared.name));
        }

        let child = Self::build(
            opts,
            self.shared.context.child(),
            Some(Arc::downgrade(&self.shared)),
        )?;
        self.shared.children.write().push(child.clone());

        // Close may have snapshotted the child set before the push above.
        if self.is_closed() {
            child.close();
        }
        Ok(child)
    }

    /// Cancel the root context and every child machine. Idempotent.
    ///
    /// Running routines observe their context done; queued work is dropped.
    /// The dispatch loop keeps running and the cache and event bus stay open.
    pub fn cancel(&self) {
        if self.shared.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.context.cancel();
        tracing::info!(machine = %self.shared.name, "machine cancelled");
        for child in self.children() {
            child.cancel();
        }
        self.shared.changed.notify_waiters();
    }

    /// Cancel, stop the dispatch loop, and close every child. Idempotent.
    ///
    /// Does not wait for running routines; cache and event bus are released
    /// once they have drained. Await [`Machine::closed`] for that point.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(machine = %self.shared.name, "closing machine");
        self.cancel();
        self.shared.queue.lock().take();
        for child in self.children() {
            child.close();
        }
        self.shared.changed.notify_waiters();
    }

    /// Resolve once a closed machine has drained and released its cache and
    /// event bus.
    pub async fn closed(&self) {
        self.shared.released_signal.cancelled().await;
    }

    /// Resolve once nothing is queued or running in this machine or any
    /// descendant, then cancel. Returns the failures recorded so far.
    pub async fn wait(&self) -> Vec<RoutineFailure> {
        self.wait_until(|| self.outstanding() == 0).await;
        self.cancel();
        self.errors()
    }

    /// Resolve once the active routine `id` has finished. Returns
    /// immediately if no such routine is active.
    pub async fn wait_for(&self, id: &str) {
        let finished = self
            .shared
            .routines
            .read()
            .get(id)
            .map(|entry| entry.finished.clone());
        if let Some(finished) = finished {
            finished.cancelled().await;
        }
    }

    /// Active routines in this machine plus all descendants.
    #[must_use]
    pub fn current(&self) -> usize {
        let routines = self.shared.routines.read();
        let children = self.shared.children.read();
        routines.len() + children.iter().map(Self::current).sum::<usize>()
    }

    /// Routines ever admitted by this machine alone.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.shared.total.load(Ordering::Acquire)
    }

    /// Snapshot of this machine.
    #[must_use]
    pub fn stats(&self) -> Stats {
        let mut routines: Vec<_> = self
            .shared
            .routines
            .read()
            .values()
            .map(RoutineEntry::stats)
            .collect();
        routines.sort_by_key(|r| std::cmp::Reverse(r.duration));

        Stats {
            count: routines.len(),
            routines,
            children: self.shared.children.read().len(),
            has_parent: self.has_parent(),
            total: self.total(),
            state: self.state(),
        }
    }

    /// Failures recorded so far. Never blocks on running work.
    #[must_use]
    pub fn errors(&self) -> Vec<RoutineFailure> {
        self.shared.failures.lock().clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> MachineState {
        if self.is_closed() {
            MachineState::Closed
        } else if self.shared.context.is_done() {
            MachineState::Cancelling
        } else {
            MachineState::Open
        }
    }

    /// Whether [`Machine::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Whether a live parent machine exists.
    #[must_use]
    pub fn has_parent(&self) -> bool {
        self.shared
            .parent
            .as_ref()
            .is_some_and(|p| p.strong_count() > 0)
    }

    /// Snapshot of the child machines.
    #[must_use]
    pub fn children(&self) -> Vec<Self> {
        self.shared.children.read().clone()
    }

    /// Root context; routines run under children of it.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.shared.context
    }

    /// Concurrency ceiling.
    #[must_use]
    pub fn max_routines(&self) -> usize {
        self.shared.max
    }

    /// Name used in log fields.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Cache attached to this machine.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.shared.cache
    }

    /// Event bus attached to this machine.
    #[must_use]
    pub fn pubsub(&self) -> &Arc<dyn PubSub> {
        &self.shared.pubsub
    }

    pub(crate) fn record_failure(&self, failure: RoutineFailure) {
        self.shared.failures.lock().push(failure);
    }

    /// Queued plus active work across the tree.
    fn outstanding(&self) -> usize {
        let pending = self.shared.pending.load(Ordering::Acquire);
        let routines = self.shared.routines.read();
        let children = self.shared.children.read();
        pending + routines.len() + children.iter().map(Self::outstanding).sum::<usize>()
    }

    /// Wake waiters on this machine and every ancestor.
    pub(crate) fn notify_tree(&self) {
        self.shared.changed.notify_waiters();
        let mut parent = self.shared.parent.as_ref().and_then(Weak::upgrade);
        while let Some(shared) = parent {
            shared.changed.notify_waiters();
            parent = shared.parent.as_ref().and_then(Weak::upgrade);
        }
    }

    /// Block until `ready` holds, re-checking on every change notification.
    pub(crate) async fn wait_until(&self, mut ready: impl FnMut() -> bool) {
        loop {
            let notified = self.shared.changed.notified();
            tokio::pin!(notified);
            // Register before checking so a notify between check and await
            // is not lost.
            notified.as_mut().enable();
            if ready() {
                return;
            }
            notified.await;
        }
    }
}
