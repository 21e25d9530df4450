//! Engine state and sync outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use tasksync_common::Record;

/// Progress of the most recent fetch or drain.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum SyncStatus {
    /// Nothing attempted since the last terminal state was consumed.
    #[default]
    Idle,
    /// A fetch or drain is running.
    Syncing,
    /// The last attempt completed.
    Success,
    /// The last attempt failed or partially failed. Advisory only.
    Error(String),
}

impl SyncStatus {
    /// Whether this status ends an attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Success | SyncStatus::Error(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SyncStatus::Error(_))
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Idle => f.write_str("idle"),
            SyncStatus::Syncing => f.write_str("syncing"),
            SyncStatus::Success => f.write_str("success"),
            SyncStatus::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// In-memory state owned by the engine.
///
/// `records` is always the merged view of the stored canonical set and the
/// stored pending queue; it is recomputed from scratch on every change.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub records: Vec<Record>,
    /// Last connectivity value handled by the engine.
    pub is_online: bool,
    pub is_loading: bool,
    pub sync_status: SyncStatus,
}

impl EngineState {
    pub fn new(is_online: bool) -> Self {
        Self {
            is_online,
            ..Self::default()
        }
    }
}

/// Counts from one completed drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    /// Effective operations the remote accepted.
    pub synced: usize,
    /// Effective operations that stay queued.
    pub failed: usize,
    pub duration: Duration,
}

/// What a drain request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Not attempted: the engine is offline.
    Offline,
    /// Not attempted: another drain is running.
    InFlight,
    /// Nothing was queued.
    Empty,
    /// The queue was replayed.
    Completed(SyncResult),
}

impl DrainOutcome {
    /// The drain result, when the queue was replayed.
    pub fn result(&self) -> Option<&SyncResult> {
        match self {
            DrainOutcome::Completed(result) => Some(result),
            _ => None,
        }
    }
}
