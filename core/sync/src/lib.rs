//! tasksync Sync Engine
//!
//! This module provides offline-first synchronization for tasksync, including:
//! - Online/offline routing of reads and writes
//! - A durable queue of unconfirmed writes, replayed on reconnection
//! - Merging of the canonical set with queued writes
//! - Connectivity and timer driven triggering

pub mod config;
pub mod connectivity;
pub mod engine;
pub mod merge;
pub mod observe;
pub mod scheduler;
pub mod state;

// Re-export main types
pub use config::SyncConfig;
pub use connectivity::{probe_tcp, ConnectivityMonitor};
pub use engine::SyncEngine;
pub use merge::{compact, effective_operations, merge_view, EffectiveOperation};
pub use observe::EngineObservers;
pub use scheduler::{SyncScheduler, SyncSchedulerHandle, SyncTrigger};
pub use state::{DrainOutcome, EngineState, SyncResult, SyncStatus};
