//! Cancellable, optionally deadline-bound execution contexts.
//!
//! Every machine owns a root [`Context`]; every routine runs under a child of
//! its machine's root, and derived machines root themselves under their
//! parent's context. Cancelling a context cancels everything derived from it.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// A hierarchical cancellation signal with an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Create a new root context with no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a child context. Cancelling `self` cancels the child, never the
    /// other way round. The child inherits this context's deadline.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child context that is additionally bounded by `timeout`.
    ///
    /// The effective deadline is the earlier of the inherited deadline and
    /// `now + timeout`. The deadline is only enforced once the future from
    /// [`Context::deadline_watch`] is driven.
    #[must_use]
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let requested = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(inherited) if inherited < requested => inherited,
            _ => requested,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Request cancellation of this context and everything derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the context has been cancelled or its deadline has passed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.is_deadline_exceeded()
    }

    /// Whether a deadline is set and has already passed.
    #[must_use]
    pub fn is_deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolve once the context is cancelled.
    pub async fn done(&self) {
        self.token.cancelled().await;
    }

    /// The deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, if any.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// The underlying token, for interop with `tokio-util` based code.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// A future that cancels this context when its deadline passes, or
    /// returns early if the context is cancelled first. `None` without a
    /// deadline.
    pub(crate) fn deadline_watch(&self) -> Option<impl Future<Output = ()> + Send + 'static> {
        let deadline = self.deadline?;
        let token = self.token.clone();
        Some(async move {
            tokio::select! {
                () = tokio::time::sleep_until(deadline.into()) => {
                    tracing::debug!("context deadline exceeded");
                    token.cancel();
                }
                () = token.cancelled() => {}
            }
        })
    }
}
