//! Error types for machine operations and routine outcomes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by machine components and their backends.
#[derive(Debug, Error)]
pub enum MachineError {
    /// The machine, cache, or event bus has been closed.
    #[error("closed")]
    Closed,
    /// No tokio runtime was available to drive the dispatch loop.
    #[error("no tokio runtime available")]
    NoRuntime,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Failure returned by a routine body.
///
/// [`RoutineError::Cancel`] is the distinguished signal that cancels the
/// whole owning machine. Anything else is recorded as a [`RoutineFailure`]
/// and leaves sibling routines untouched.
#[derive(Debug, Error)]
pub enum RoutineError {
    /// Cancel every routine of the owning machine.
    #[error("[machine] cancel")]
    Cancel,
    /// Ordinary failure, aggregated for later retrieval.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl RoutineError {
    /// Wrap any error as an ordinary failure.
    pub fn failed<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Failed(anyhow::Error::new(err))
    }

    /// Build an ordinary failure from a message.
    pub fn msg(message: impl std::fmt::Display) -> Self {
        Self::Failed(anyhow::anyhow!("{message}"))
    }

    /// Whether this is the distinguished cancel signal.
    #[must_use]
    pub const fn is_cancel(&self) -> bool {
        matches!(self, Self::Cancel)
    }
}

impl From<MachineError> for RoutineError {
    fn from(err: MachineError) -> Self {
        Self::Failed(anyhow::Error::new(err))
    }
}

/// Result type returned by routine bodies.
pub type RoutineResult = Result<(), RoutineError>;

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

/// How a routine failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The body returned an error.
    Error,
    /// The body panicked and was recovered at the launch boundary.
    Panic,
}

/// A recorded routine failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineFailure {
    /// Identifier of the failed routine.
    pub routine_id: String,
    /// Tags the routine was submitted with.
    pub tags: Vec<String>,
    /// Rendered error or panic message.
    pub message: String,
    /// Failure kind.
    pub kind: FailureKind,
    /// When the failure was recorded (ms since epoch).
    pub at_ms: u128,
}
