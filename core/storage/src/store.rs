//! Local store trait definition.

use async_trait::async_trait;

use tasksync_common::{PendingOperation, Record, Result};

/// Durable storage for the canonical record set and the pending queue.
///
/// The canonical set is the collection last confirmed by the remote
/// authority. The pending queue is an ordered list of writes that the
/// authority has not confirmed yet, oldest first.
///
/// Every call is atomic from the caller's point of view: it either applies
/// completely or returns an error and leaves stored data untouched.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Get the store name (e.g., "memory", "file", "sqlite").
    fn name(&self) -> &str;

    /// Load the canonical record set in stored order.
    ///
    /// Returns an empty set when nothing has been saved yet.
    async fn load_canonical(&self) -> Result<Vec<Record>>;

    /// Replace the canonical record set.
    ///
    /// # Postconditions
    /// - A subsequent `load_canonical` returns `records` in the same order
    async fn save_canonical(&self, records: &[Record]) -> Result<()>;

    /// Load the pending queue, oldest first.
    async fn load_pending(&self) -> Result<Vec<PendingOperation>>;

    /// Append one operation at the end of the queue.
    async fn append_pending(&self, op: &PendingOperation) -> Result<()>;

    /// Replace the whole queue.
    async fn replace_pending(&self, ops: &[PendingOperation]) -> Result<()>;

    /// Remove every queued operation.
    async fn clear_pending(&self) -> Result<()>;

    /// Number of queued operations.
    async fn pending_count(&self) -> Result<usize> {
        Ok(self.load_pending().await?.len())
    }
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every store must share, run against each backend.

    use super::*;
    use tasksync_common::OperationKind;

    pub fn record(id: &str, name: &str) -> Record {
        Record::new(id, name, false, "2025-10-13 10:00:00")
    }

    pub async fn canonical_round_trip(store: &dyn LocalStore) {
        assert!(store.load_canonical().await.unwrap().is_empty());

        let records = vec![record("2", "second"), record("1", "first")];
        store.save_canonical(&records).await.unwrap();
        assert_eq!(store.load_canonical().await.unwrap(), records);

        let replaced = vec![record("3", "third")];
        store.save_canonical(&replaced).await.unwrap();
        assert_eq!(store.load_canonical().await.unwrap(), replaced);
    }

    pub async fn pending_queue_order(store: &dyn LocalStore) {
        assert_eq!(store.pending_count().await.unwrap(), 0);

        let first = PendingOperation::new(OperationKind::Create, record("a", "one"));
        let second = PendingOperation::new(OperationKind::Update, record("b", "two"));
        let third = PendingOperation::new(OperationKind::Create, record("c", "three"));

        store.append_pending(&first).await.unwrap();
        store.append_pending(&second).await.unwrap();
        store.append_pending(&third).await.unwrap();

        let loaded = store.load_pending().await.unwrap();
        assert_eq!(loaded, vec![first.clone(), second.clone(), third.clone()]);

        store
            .replace_pending(&[third.clone(), first.clone()])
            .await
            .unwrap();
        assert_eq!(
            store.load_pending().await.unwrap(),
            vec![third.clone(), first.clone()]
        );

        store.clear_pending().await.unwrap();
        assert!(store.load_pending().await.unwrap().is_empty());
    }

    pub async fn queue_and_canonical_are_independent(store: &dyn LocalStore) {
        let op = PendingOperation::new(OperationKind::Create, record("x", "queued"));
        store.append_pending(&op).await.unwrap();
        store.save_canonical(&[record("y", "synced")]).await.unwrap();

        store.clear_pending().await.unwrap();
        assert_eq!(store.load_canonical().await.unwrap().len(), 1);
    }
}
