//! In-memory node store

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{NodeStore, StorageNodeRecord};
use crate::error::Result;

/// Node store kept in process memory, selected with `storage.backend = "memory"`.
/// Contents are lost on restart.
#[derive(Default)]
pub struct MemoryNodeStore {
    nodes: RwLock<BTreeMap<String, String>>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn get(&self, user: &str) -> Result<Option<StorageNodeRecord>> {
        let nodes = self.nodes.read().await;
        Ok(nodes
            .get(user)
            .map(|url| StorageNodeRecord::new(user, url.clone())))
    }

    async fn insert_if_absent(&self, record: StorageNodeRecord) -> Result<StorageNodeRecord> {
        let mut nodes = self.nodes.write().await;
        let url = nodes
            .entry(record.user.clone())
            .or_insert(record.url)
            .clone();
        Ok(StorageNodeRecord::new(record.user, url))
    }

    async fn list(&self) -> Result<Vec<StorageNodeRecord>> {
        let nodes = self.nodes.read().await;
        Ok(nodes
            .iter()
            .map(|(user, url)| StorageNodeRecord::new(user.clone(), url.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_writer_wins() {
        let store = MemoryNodeStore::new();
        assert!(store.get("alice").await.unwrap().is_none());

        let first = store
            .insert_if_absent(StorageNodeRecord::new("alice", "https://node1.example.com"))
            .await
            .unwrap();
        let second = store
            .insert_if_absent(StorageNodeRecord::new("alice", "https://node2.example.com"))
            .await
            .unwrap();

        assert_eq!(first.url, "https://node1.example.com");
        assert_eq!(second, first);
        assert_eq!(store.get("alice").await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_list_ordered_by_user() {
        let store = MemoryNodeStore::new();
        store.insert_if_absent(StorageNodeRecord::new("zed", "https://z")).await.unwrap();
        store.insert_if_absent(StorageNodeRecord::new("amy", "https://a")).await.unwrap();

        let users: Vec<String> = store.list().await.unwrap().into_iter().map(|r| r.user).collect();
        assert_eq!(users, vec!["amy", "zed"]);
    }
}
