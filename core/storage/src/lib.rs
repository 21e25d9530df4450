//! Local persistence and remote authority access for tasksync.
//!
//! This module provides the two narrow interfaces the sync engine consumes:
//! [`LocalStore`] for the canonical record set and the pending-operation
//! queue, and [`RemoteClient`] for the remote authority. Each comes with a
//! few concrete backends, plus a registry for resolving stores by name.
//!
//! # Design Principles
//! - Narrow interfaces: the engine never sees schemas, files or HTTP
//! - Async operations: every call is a potential suspension point
//! - Atomic calls: each store call either fully applies or leaves data intact
//! - Unified error semantics: remote failures map onto one error taxonomy

pub mod file;
pub mod memory;
pub mod registry;
pub mod remote;
pub mod sqlite;
pub mod store;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use registry::{create_default_registry, StoreFactory, StoreRegistry};
pub use remote::{HttpRemote, MemoryRemote, RemoteClient};
pub use sqlite::SqliteStore;
pub use store::LocalStore;
