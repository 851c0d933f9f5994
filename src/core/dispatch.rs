//! Dispatch loop: the only place queued work becomes a running routine.
//!
//! # Design Principles
//!
//! - **No polling**: admission waits on a `Notify` raised when a routine in
//!   the machine's tree finishes or the machine is cancelled
//! - **FIFO**: one loop per machine, admitting in submission order
//! - **Tagged outcomes**: the launch wrapper is the single place that
//!   interprets success, failure, cancel, and panic

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::machine::Shared;
use super::routine::RoutineEntry;
use super::work::{apply_middleware, RoutineFn, Work};
use super::{FailureKind, Machine, Routine, RoutineError, RoutineFailure};
use crate::util::{generate_id, now_ms};

/// Abstraction for spawning routines and the dispatch loop on a runtime.
pub trait Spawn: Send + Sync {
    /// Spawn a future to run to completion in the background.
    fn spawn(&self, fut: BoxFuture<'static, ()>);
}

/// How a routine body ended.
#[derive(Debug)]
pub(crate) enum Outcome {
    Completed,
    Cancelled,
    Failed(anyhow::Error),
    Panicked(String),
}

impl Outcome {
    fn from_result(result: Result<Result<(), RoutineError>, Box<dyn Any + Send>>) -> Self {
        match result {
            Ok(Ok(())) => Self::Completed,
            Ok(Err(RoutineError::Cancel)) => Self::Cancelled,
            Ok(Err(RoutineError::Failed(err))) => Self::Failed(err),
            Err(payload) => Self::Panicked(panic_message(payload.as_ref())),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

/// Run the dispatch loop until the queue closes, then release resources
/// once the machine's own routines have drained.
pub(crate) async fn run(shared: Weak<Shared>, mut rx: mpsc::UnboundedReceiver<Work>) {
    while let Some(work) = rx.recv().await {
        let Some(strong) = shared.upgrade() else {
            break;
        };
        admit(Machine { shared: strong }, work).await;
    }

    let Some(strong) = shared.upgrade() else {
        // Dropped: Shared::drop already released everything.
        return;
    };
    let machine = Machine { shared: strong };
    tracing::debug!(machine = %machine.name(), "dispatch loop stopped, draining");
    machine
        .wait_until(|| machine.shared.routines.read().is_empty())
        .await;
    machine.shared.release();
}

/// Wait for capacity, then turn `work` into a running routine.
async fn admit(machine: Machine, work: Work) {
    if !wait_for_capacity(&machine).await {
        machine
            .shared
            .pending
            .fetch_sub(1, std::sync::atomic::Ordering::AcqRel);
        machine.notify_tree();
        tracing::debug!(machine = %machine.name(), "queued routine dropped: machine cancelled");
        return;
    }

    let Work { func, opts } = work;
    let func = apply_middleware(func, &opts.middlewares);
    let start = Instant::now();
    let root = &machine.shared.context;
    let context = opts
        .timeout
        .map_or_else(|| root.child(), |timeout| root.child_with_timeout(timeout));
    let finished = CancellationToken::new();

    let routine = {
        let mut routines = machine.shared.routines.write();
        let id: Arc<str> = match opts.id {
            Some(requested) if !routines.contains_key(requested.as_str()) => requested.into(),
            Some(requested) => {
                let replacement = unique_id(|id| routines.contains_key(id));
                tracing::warn!(
                    machine = %machine.name(),
                    requested = %requested,
                    replacement = %replacement,
                    "routine id already active, using replacement"
                );
                replacement.into()
            }
            None => unique_id(|id| routines.contains_key(id)).into(),
        };
        let entry = RoutineEntry {
            id: Arc::clone(&id),
            tags: opts.tags.into(),
            context,
            start,
            started_at_ms: now_ms(),
            finished: finished.clone(),
        };
        let routine = Routine::new(&entry, machine.clone());
        routines.insert(id, entry);
        routine
    };
    machine
        .shared
        .total
        .fetch_add(1, std::sync::atomic::Ordering::AcqRel);
    machine
        .shared
        .pending
        .fetch_sub(1, std::sync::atomic::Ordering::AcqRel);

    tracing::debug!(
        machine = %machine.name(),
        routine_id = %routine.id(),
        tags = ?routine.tags(),
        "routine admitted"
    );

    let spawner = Arc::clone(&machine.shared.spawner);
    if let Some(watch) = routine.context().deadline_watch() {
        spawner.spawn(Box::pin(watch));
    }
    spawner.spawn(Box::pin(launch(machine, routine, func, finished)));
}

/// Wait until the tree has room for one more routine. `false` if the
/// machine was cancelled first.
async fn wait_for_capacity(machine: &Machine) -> bool {
    let root = machine.context();
    let max = machine.max_routines();
    tokio::select! {
        () = machine.wait_until(|| root.is_done() || machine.current() < max) => {}
        () = root.done() => {}
    }
    !root.is_done()
}

fn unique_id(taken: impl Fn(&str) -> bool) -> String {
    loop {
        let id = generate_id();
        if !taken(&id) {
            return id;
        }
    }
}

/// Run one routine body and settle its bookkeeping.
async fn launch(machine: Machine, routine: Routine, func: RoutineFn, finished: CancellationToken) {
    let id = Arc::<str>::from(routine.id());
    let tags = routine.tags().to_vec();
    let context = routine.context().clone();

    // The body is invoked inside the future so a panic while building it is
    // caught as well.
    let body = async move { func(routine).await };
    let outcome = Outcome::from_result(AssertUnwindSafe(body).catch_unwind().await);

    match outcome {
        Outcome::Completed => {
            tracing::debug!(machine = %machine.name(), routine_id = %id, "routine completed");
        }
        Outcome::Cancelled => {
            tracing::info!(machine = %machine.name(), routine_id = %id, "routine requested machine cancel");
            machine.cancel();
        }
        Outcome::Failed(err) => {
            tracing::warn!(machine = %machine.name(), routine_id = %id, error = %err, "routine failed");
            machine.record_failure(RoutineFailure {
                routine_id: id.to_string(),
                tags,
                message: format!("{err:#}"),
                kind: FailureKind::Error,
                at_ms: now_ms(),
            });
        }
        Outcome::Panicked(message) => {
            tracing::error!(machine = %machine.name(), routine_id = %id, panic = %message, "routine panicked");
            machine.record_failure(RoutineFailure {
                routine_id: id.to_string(),
                tags,
                message,
                kind: FailureKind::Panic,
                at_ms: now_ms(),
            });
        }
    }

    // Stops the deadline watch, if any.
    context.cancel();
    // Lanes go before the entry so a successor reusing the id keeps its own.
    machine.pubsub().unsubscribe(&id);
    machine.shared.routines.write().remove(&id);
    finished.cancel();
    machine.notify_tree();
}
