//! Node Store Module
//!
//! Persistent mapping of users to their assigned storage nodes.

mod memory;
mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use memory::MemoryNodeStore;
pub use sqlite::SqliteNodeStore;

/// One user's resolved storage endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageNodeRecord {
    /// User identifier
    pub user: String,
    /// Absolute base URL of the user's storage node
    pub url: String,
}

impl StorageNodeRecord {
    pub fn new(user: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            url: url.into(),
        }
    }
}

/// Storage for user → node records.
///
/// Records are never updated or deleted through this interface.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Look up the record for `user`
    async fn get(&self, user: &str) -> Result<Option<StorageNodeRecord>>;

    /// Atomically insert `record` unless one already exists for its user.
    ///
    /// Returns the record held by the store afterwards, which is the
    /// existing one when another writer got there first.
    async fn insert_if_absent(&self, record: StorageNodeRecord) -> Result<StorageNodeRecord>;

    /// All records, ordered by user
    async fn list(&self) -> Result<Vec<StorageNodeRecord>>;
}
