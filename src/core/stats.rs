//! Point-in-time machine snapshots.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    /// Accepting and admitting work.
    Open,
    /// Root context is done; routines are draining.
    Cancelling,
    /// Closed for good.
    Closed,
}

/// Snapshot of one active routine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineStats {
    /// Routine identifier.
    pub id: String,
    /// Submission tags.
    pub tags: Vec<String>,
    /// Admission time (ms since epoch).
    pub started_at_ms: u128,
    /// Elapsed time at the moment of the snapshot.
    pub duration: Duration,
}

/// Snapshot of a machine. Owned copies only; nothing borrows the machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    /// Number of this machine's own active routines.
    pub count: usize,
    /// Active routines, oldest first.
    pub routines: Vec<RoutineStats>,
    /// Number of derived child machines.
    pub children: usize,
    /// Whether a live parent machine exists.
    pub has_parent: bool,
    /// Routines ever admitted by this machine alone.
    pub total: u64,
    /// Lifecycle state.
    pub state: MachineState,
}

impl Stats {
    /// Look up a routine in the snapshot by identifier.
    #[must_use]
    pub fn routine(&self, id: &str) -> Option<&RoutineStats> {
        self.routines.iter().find(|r| r.id == id)
    }

    /// Active routines carrying `tag`.
    pub fn tagged<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a RoutineStats> + 'a {
        self.routines
            .iter()
            .filter(move |r| r.tags.iter().any(|t| t == tag))
    }
}
