//! Remote authority clients.
//!
//! The remote authority owns the truth about the record collection. Every
//! call returns the full collection as the authority sees it after the call.

mod http;
mod memory;

pub use http::HttpRemote;
pub use memory::MemoryRemote;

use async_trait::async_trait;

use tasksync_common::{Record, Result};

/// Client for the remote authority.
///
/// Errors are always one of the remote kinds (`Transport`, `Server`,
/// `Decoding`, `Encoding`); see [`tasksync_common::Error::is_remote`].
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Get the client name (e.g., "http", "memory").
    fn name(&self) -> &str;

    /// Fetch the full collection.
    async fn list(&self) -> Result<Vec<Record>>;

    /// Create a record and return the resulting collection.
    ///
    /// The authority may assign its own id; callers match the created record
    /// in the returned collection rather than assuming the id survived.
    async fn create(&self, record: &Record) -> Result<Vec<Record>>;

    /// Replace the record with the same id and return the resulting
    /// collection.
    async fn update(&self, record: &Record) -> Result<Vec<Record>>;
}
