//! Core scheduling abstractions: machines, routines, contexts, and dispatch.

pub mod context;
pub mod dispatch;
pub mod error;
pub mod machine;
pub mod routine;
pub mod stats;
pub mod work;

pub use context::Context;
pub use dispatch::Spawn;
pub use error::{AppResult, FailureKind, MachineError, RoutineError, RoutineFailure, RoutineResult};
pub use machine::{Machine, MachineOptions, DEFAULT_MAX_ROUTINES};
pub use routine::Routine;
pub use stats::{MachineState, RoutineStats, Stats};
pub use work::{middleware, routine_fn, GoOpts, Middleware, RoutineFn};
