//! Merging the canonical set with the pending queue.
//!
//! Queued writes always win over the canonical copy of the same record, and
//! the last queued write for an id wins over earlier ones. Output order is
//! the order in which each id was first seen: canonical order first, then
//! ids that only exist in the queue, in queue order.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use tasksync_common::{OperationKind, PendingOperation, Record, RecordId};

/// Overlay `pending` (oldest first) onto `canonical`.
///
/// Duplicate ids inside `canonical` collapse to their last value, kept at the
/// position of the first occurrence.
pub fn merge_view(canonical: &[Record], pending: &[PendingOperation]) -> Vec<Record> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut merged: Vec<Record> = Vec::with_capacity(canonical.len() + pending.len());

    let snapshots = canonical
        .iter()
        .chain(pending.iter().map(|op| &op.snapshot));

    for record in snapshots {
        match positions.get(record.id.as_str()) {
            Some(&index) => merged[index] = record.clone(),
            None => {
                positions.insert(record.id.as_str(), merged.len());
                merged.push(record.clone());
            }
        }
    }

    merged
}

/// One record's worth of queued writes, collapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveOperation {
    /// Every queued operation this entry stands for, oldest first.
    pub operation_ids: Vec<String>,
    /// Kind of the oldest covered operation.
    pub kind: OperationKind,
    /// Snapshot of the newest covered operation.
    pub snapshot: Record,
    /// When the oldest covered operation was queued.
    pub queued_at: DateTime<Utc>,
}

impl EffectiveOperation {
    pub fn record_id(&self) -> &str {
        &self.snapshot.id
    }

    /// Collapse back into a single queue entry.
    ///
    /// The entry keeps the newest covered operation id, so acknowledging the
    /// newest write still acknowledges the compacted entry.
    pub fn into_pending(self) -> PendingOperation {
        let operation_id = self
            .operation_ids
            .last()
            .cloned()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        PendingOperation {
            operation_id,
            kind: self.kind,
            snapshot: self.snapshot,
            queued_at: self.queued_at,
        }
    }
}

/// Collapse the queue to at most one entry per record id.
///
/// Each entry sits at the position of the id's first queued operation and
/// carries its last snapshot.
pub fn effective_operations(pending: &[PendingOperation]) -> Vec<EffectiveOperation> {
    let mut positions: HashMap<RecordId, usize> = HashMap::new();
    let mut effective: Vec<EffectiveOperation> = Vec::new();

    for op in pending {
        match positions.get(op.record_id()) {
            Some(&index) => {
                let entry = &mut effective[index];
                entry.operation_ids.push(op.operation_id.clone());
                entry.snapshot = op.snapshot.clone();
            }
            None => {
                positions.insert(op.snapshot.id.clone(), effective.len());
                effective.push(EffectiveOperation {
                    operation_ids: vec![op.operation_id.clone()],
                    kind: op.kind,
                    snapshot: op.snapshot.clone(),
                    queued_at: op.queued_at,
                });
            }
        }
    }

    effective
}

/// Rewrite the queue with one entry per record id.
pub fn compact(pending: &[PendingOperation]) -> Vec<PendingOperation> {
    effective_operations(pending)
        .into_iter()
        .map(EffectiveOperation::into_pending)
        .collect()
}
