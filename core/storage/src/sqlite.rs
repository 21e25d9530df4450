//! SQLite-based local store.
//!
//! Keeps the canonical set and the pending queue in two tables of one
//! database file, so both survive restarts and can be inspected with any
//! SQLite tool.

use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::store::LocalStore;
use tasksync_common::{Error, PendingOperation, Record, Result};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS canonical (
        position INTEGER PRIMARY KEY,
        id TEXT NOT NULL,
        body TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS pending (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        operation_id TEXT NOT NULL UNIQUE,
        kind TEXT NOT NULL,
        body TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_canonical_id ON canonical(id);
"#;

fn storage_err(err: rusqlite::Error) -> Error {
    Error::Storage(err.to_string())
}

/// Local store backed by a SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create or open a store database.
    ///
    /// # Errors
    /// - Database creation or migration failure
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref()).map_err(storage_err)?;
        conn.execute_batch(SCHEMA).map_err(storage_err)?;

        info!("SQLite store opened at {}", db_path.as_ref().display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        conn.execute_batch(SCHEMA).map_err(storage_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("SQLite connection lock poisoned".to_string()))
    }

    fn insert_pending(conn: &Connection, op: &PendingOperation) -> Result<()> {
        let body = serde_json::to_string(op)?;
        conn.execute(
            "INSERT INTO pending (operation_id, kind, body) VALUES (?1, ?2, ?3)",
            params![op.operation_id, op.kind.as_str(), body],
        )
        .map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load_canonical(&self) -> Result<Vec<Record>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT body FROM canonical ORDER BY position")
            .map_err(storage_err)?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(storage_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_err)?;

        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(Error::from))
            .collect()
    }

    async fn save_canonical(&self, records: &[Record]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(storage_err)?;
        tx.execute("DELETE FROM canonical", [])
            .map_err(storage_err)?;
        {
            let mut stmt = tx
                .prepare("INSERT INTO canonical (position, id, body) VALUES (?1, ?2, ?3)")
                .map_err(storage_err)?;
            for (position, record) in records.iter().enumerate() {
                let body = serde_json::to_string(record)?;
                stmt.execute(params![position as i64, record.id, body])
                    .map_err(storage_err)?;
            }
        }
        tx.commit().map_err(storage_err)?;

        debug!("Saved {} canonical records", records.len());
        Ok(())
    }

    async fn load_pending(&self) -> Result<Vec<PendingOperation>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT body FROM pending ORDER BY seq")
            .map_err(storage_err)?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(storage_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_err)?;

        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(Error::from))
            .collect()
    }

    async fn append_pending(&self, op: &PendingOperation) -> Result<()> {
        let conn = self.lock()?;
        Self::insert_pending(&conn, op)
    }

    async fn replace_pending(&self, ops: &[PendingOperation]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(storage_err)?;
        tx.execute("DELETE FROM pending", []).map_err(storage_err)?;
        for op in ops {
            Self::insert_pending(&tx, op)?;
        }
        tx.commit().map_err(storage_err)?;
        Ok(())
    }

    async fn clear_pending(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM pending", []).map_err(storage_err)?;
        Ok(())
    }

    async fn pending_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM pending", [], |row| row.get(0))
            .map_err(storage_err)?;
        Ok(count as usize)
    }
}
