//! # Machine Lot
//!
//! A throttled routine scheduler for tokio with hierarchical cancellation.
//!
//! A [`Machine`](core::Machine) launches work as independent concurrent
//! units ("routines"), bounds how many run at once, and propagates
//! cancellation through a tree of machines. Running routines can inspect
//! their own lifecycle, exchange events over an in-process event bus, share a
//! cache, and be listed for diagnostics.
//!
//! ## Core Problem Solved
//!
//! Programs that fan out large numbers of short-lived tasks end up
//! hand-rolling the same pieces at every call site:
//!
//! - **Admission control**: a semaphore so the fan-out does not run away
//! - **Structured shutdown**: a cancellation tree so one stop reaches all work
//! - **Observability**: a registry of what is running and for how long
//!
//! ## Key Features
//!
//! - **Bounded concurrency**: work queues when the ceiling is reached and is
//!   admitted in submission order as routines finish (no polling)
//! - **Cancellation tree**: cancelling or closing a machine reaches every
//!   routine and every derived child machine
//! - **Cancel signal**: a routine returning [`RoutineError::Cancel`](core::RoutineError)
//!   stops its whole machine; other failures are recorded and retrievable
//! - **Panic isolation**: a panicking routine is recorded, never fatal
//! - **Per-routine timeouts, tags, and middleware**
//! - **Event bus and cache** scoped to each machine
//!
//! ## Example
//!
//! ```rust,ignore
//! use machine_lot::core::{GoOpts, Machine, MachineOptions};
//! use std::time::Duration;
//!
//! let machine = Machine::new(MachineOptions::new().with_max_routines(4))?;
//!
//! for i in 0..32 {
//!     machine
//!         .go_with(
//!             move |routine| async move {
//!                 tokio::select! {
//!                     () = routine.context().done() => {}
//!                     () = tokio::time::sleep(Duration::from_millis(i)) => {}
//!                 }
//!                 Ok(())
//!             },
//!             GoOpts::new().with_tag("sleeper").with_timeout(Duration::from_secs(1)),
//!         )
//!         .await;
//! }
//!
//! let failures = machine.wait().await;
//! assert!(failures.is_empty());
//! assert_eq!(machine.total(), 32);
//! machine.close();
//! ```
//!
//! For complete examples, see `tests/machine_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: machines, routines, contexts, dispatch.
pub mod core;
/// Configuration models for machines and backends.
pub mod config;
/// Builders to construct machines from configuration.
pub mod builders;
/// Infrastructure adapters for the cache and event bus.
pub mod infra;
/// Runtime adapters.
pub mod runtime;
/// Shared utilities.
pub mod util;

pub use crate::core::{
    Context, GoOpts, Machine, MachineError, MachineOptions, Routine, RoutineError, RoutineResult,
};
