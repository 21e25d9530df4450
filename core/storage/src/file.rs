//! JSON file local store.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::store::LocalStore;
use tasksync_common::{Error, PendingOperation, Record, Result};

/// File holding the canonical record set.
pub const CANONICAL_FILENAME: &str = "canonical.json";

/// File holding the pending queue.
pub const PENDING_FILENAME: &str = "pending.json";

/// Local store keeping two JSON documents in a directory.
///
/// Every write goes to a temporary file that is renamed over the target, so
/// a crash mid-write leaves the previous contents intact.
pub struct JsonFileStore {
    root: PathBuf,
    /// Serializes read-modify-write cycles on the queue file.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (or create) a store rooted at `root`.
    ///
    /// # Postconditions
    /// - Root directory exists
    ///
    /// # Errors
    /// - Permission denied
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        // Create root if it doesn't exist (sync for constructor)
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding the store files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn canonical_path(&self) -> PathBuf {
        self.root.join(CANONICAL_FILENAME)
    }

    fn pending_path(&self) -> PathBuf {
        self.root.join(PENDING_FILENAME)
    }

    async fn read_list<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
        match fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::Serialization(format!("Corrupt store file {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn write_list<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
        let json = serde_json::to_vec_pretty(items)?;
        let temp = path.with_extension("json.tmp");

        fs::write(&temp, json).await?;
        fs::rename(&temp, path).await?;
        debug!("Wrote {} entries to {}", items.len(), path.display());
        Ok(())
    }
}

#[async_trait]
impl LocalStore for JsonFileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load_canonical(&self) -> Result<Vec<Record>> {
        Self::read_list(&self.canonical_path()).await
    }

    async fn save_canonical(&self, records: &[Record]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        Self::write_list(&self.canonical_path(), records).await
    }

    async fn load_pending(&self) -> Result<Vec<PendingOperation>> {
        Self::read_list(&self.pending_path()).await
    }

    async fn append_pending(&self, op: &PendingOperation) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.pending_path();
        let mut ops: Vec<PendingOperation> = Self::read_list(&path).await?;
        ops.push(op.clone());
        Self::write_list(&path, &ops).await
    }

    async fn replace_pending(&self, ops: &[PendingOperation]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        Self::write_list(&self.pending_path(), ops).await
    }

    async fn clear_pending(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(self.pending_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;
    use tasksync_common::OperationKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_canonical_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::open(temp.path()).unwrap();
        contract::canonical_round_trip(&store).await;
    }

    #[tokio::test]
    async fn test_pending_queue_order() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::open(temp.path()).unwrap();
        contract::pending_queue_order(&store).await;
    }

    #[tokio::test]
    async fn test_queue_and_canonical_are_independent() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::open(temp.path()).unwrap();
        contract::queue_and_canonical_are_independent(&store).await;
    }

    #[tokio::test]
    async fn test_persistence() {
        let temp = TempDir::new().unwrap();

        // Write through one instance
        {
            let store = JsonFileStore::open(temp.path()).unwrap();
            store
                .save_canonical(&[contract::record("1", "synced")])
                .await
                .unwrap();
            store
                .append_pending(&PendingOperation::new(
                    OperationKind::Create,
                    contract::record("2", "queued"),
                ))
                .await
                .unwrap();
        }

        // Reload and verify
        {
            let store = JsonFileStore::open(temp.path()).unwrap();
            assert_eq!(store.load_canonical().await.unwrap().len(), 1);
            let pending = store.load_pending().await.unwrap();
            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].record_id(), "2");
        }
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::open(temp.path()).unwrap();
        tokio::fs::write(temp.path().join(CANONICAL_FILENAME), b"{ not json")
            .await
            .unwrap();

        let err = store.load_canonical().await.unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::open(temp.path()).unwrap();
        store
            .save_canonical(&[contract::record("1", "synced")])
            .await
            .unwrap();

        assert!(temp.path().join(CANONICAL_FILENAME).exists());
        assert!(!temp.path().join("canonical.json.tmp").exists());
    }
}
