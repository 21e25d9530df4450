//! In-memory local store for testing.

use async_trait::async_trait;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::store::LocalStore;
use tasksync_common::{Error, PendingOperation, Record, Result};

#[derive(Debug, Default)]
struct Contents {
    canonical: Vec<Record>,
    pending: Vec<PendingOperation>,
}

/// In-memory local store.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    contents: Arc<RwLock<Contents>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with a canonical set and a queue.
    pub fn with_contents(canonical: Vec<Record>, pending: Vec<PendingOperation>) -> Self {
        Self {
            contents: Arc::new(RwLock::new(Contents { canonical, pending })),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Contents>> {
        self.contents
            .read()
            .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Contents>> {
        self.contents
            .write()
            .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load_canonical(&self) -> Result<Vec<Record>> {
        Ok(self.read()?.canonical.clone())
    }

    async fn save_canonical(&self, records: &[Record]) -> Result<()> {
        self.write()?.canonical = records.to_vec();
        Ok(())
    }

    async fn load_pending(&self) -> Result<Vec<PendingOperation>> {
        Ok(self.read()?.pending.clone())
    }

    async fn append_pending(&self, op: &PendingOperation) -> Result<()> {
        self.write()?.pending.push(op.clone());
        Ok(())
    }

    async fn replace_pending(&self, ops: &[PendingOperation]) -> Result<()> {
        self.write()?.pending = ops.to_vec();
        Ok(())
    }

    async fn clear_pending(&self) -> Result<()> {
        self.write()?.pending.clear();
        Ok(())
    }

    async fn pending_count(&self) -> Result<usize> {
        Ok(self.read()?.pending.len())
    }
}
