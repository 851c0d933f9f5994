//! Work items, per-submission options, and middleware.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use super::{Routine, RoutineResult};

/// Boxed routine body as it travels through the dispatch queue.
pub type RoutineFn = Box<dyn FnOnce(Routine) -> BoxFuture<'static, RoutineResult> + Send>;

/// Wraps a routine body before execution.
///
/// Middleware registered on a submission is applied in registration order,
/// so the last one registered ends up outermost.
pub type Middleware = Arc<dyn Fn(RoutineFn) -> RoutineFn + Send + Sync>;

/// Box an async closure into a [`RoutineFn`].
pub fn routine_fn<F, Fut>(f: F) -> RoutineFn
where
    F: FnOnce(Routine) -> Fut + Send + 'static,
    Fut: Future<Output = RoutineResult> + Send + 'static,
{
    Box::new(move |routine| Box::pin(f(routine)))
}

/// Build a [`Middleware`] from a closure.
pub fn middleware<F>(f: F) -> Middleware
where
    F: Fn(RoutineFn) -> RoutineFn + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Options for a single submission.
#[derive(Clone, Default)]
pub struct GoOpts {
    pub(crate) id: Option<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) middlewares: Vec<Middleware>,
}

impl fmt::Debug for GoOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoOpts")
            .field("id", &self.id)
            .field("tags", &self.tags)
            .field("timeout", &self.timeout)
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

impl GoOpts {
    /// Default options: generated id, no tags, no timeout, no middleware.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an explicit routine identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a single tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add several tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Bound the routine's context by `timeout`. Siblings are unaffected.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Append a middleware.
    #[must_use]
    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }
}

/// A pending submission. Exists only between submission and admission.
pub(crate) struct Work {
    pub(crate) func: RoutineFn,
    pub(crate) opts: GoOpts,
}

impl Work {
    pub(crate) fn new(func: RoutineFn, opts: GoOpts) -> Self {
        Self { func, opts }
    }
}

/// Apply `middlewares` to `func` in registration order.
pub(crate) fn apply_middleware(func: RoutineFn, middlewares: &[Middleware]) -> RoutineFn {
    middlewares.iter().fold(func, |inner, wrap| wrap(inner))
}
