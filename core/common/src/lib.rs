//! Common utilities and types shared across the tasksync crates.
//!
//! This module provides the record model synchronized between the local store
//! and the remote authority, the pending-operation queue entry, and the error
//! taxonomy used by every layer.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    current_timestamp, format_timestamp, Attachment, OperationKind, PendingOperation, Record,
    RecordDraft, RecordId, TIMESTAMP_FORMAT,
};
