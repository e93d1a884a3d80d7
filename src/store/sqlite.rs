//! SQLite Node Store
//!
//! Durable user → storage node records, one row per user.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use super::{NodeStore, StorageNodeRecord};
use crate::error::{Error, Result};

/// Node store backed by SQLite
pub struct SqliteNodeStore {
    /// Database connection
    conn: Mutex<Connection>,
}

impl SqliteNodeStore {
    /// Create or open the node database at `db_path`
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS storage_nodes (
                user TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl NodeStore for SqliteNodeStore {
    async fn get(&self, user: &str) -> Result<Option<StorageNodeRecord>> {
        let conn = self.conn.lock().await;
        let url: Option<String> = conn
            .query_row(
                "SELECT url FROM storage_nodes WHERE user = ?1",
                params![user],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Store(format!("Failed to look up node for {}: {}", user, e)))?;

        Ok(url.map(|url| StorageNodeRecord::new(user, url)))
    }

    async fn insert_if_absent(&self, record: StorageNodeRecord) -> Result<StorageNodeRecord> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO storage_nodes (user, url) VALUES (?1, ?2)
            ON CONFLICT(user) DO NOTHING
            "#,
            params![record.user, record.url],
        )?;

        // Read back under the same lock so a losing writer sees the winner
        let url: String = conn.query_row(
            "SELECT url FROM storage_nodes WHERE user = ?1",
            params![record.user],
            |row| row.get(0),
        )?;

        Ok(StorageNodeRecord::new(record.user, url))
    }

    async fn list(&self) -> Result<Vec<StorageNodeRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT user, url FROM storage_nodes ORDER BY user")?;
        let rows = stmt.query_map([], |row| {
            Ok(StorageNodeRecord::new(
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
            ))
        })?;

        let mut records = Vec::new();
        for result in rows {
            records.push(result?);
        }

        Ok(records)
    }
}
