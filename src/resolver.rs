//! Storage Node Resolver
//!
//! Finds the storage node assigned to a user. The first lookup for a user
//! asks the authentication service; the answer is stored permanently and
//! every later lookup is served from the node store.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use tokio::sync::Mutex;

use crate::config::is_http_url;
use crate::error::{Error, Result};
use crate::fetch::{FetchRequest, HttpFetcher};
use crate::store::{NodeStore, StorageNodeRecord};

/// Resolves users to storage nodes, discovering unknown users upstream
pub struct NodeResolver {
    store: Arc<dyn NodeStore>,
    fetcher: Arc<dyn HttpFetcher>,
    /// Base address of the authentication service
    auth_server: String,
    /// Per-user locks held while a discovery is in flight
    in_flight: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// One task's claim on a user's discovery lock. Dropping it, including when
/// the resolving future is cancelled, removes the map entry once no other
/// task holds the lock.
struct InFlight<'a> {
    map: &'a std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    user: &'a str,
    lock: Arc<Mutex<()>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        // The map and this claim are the last two owners
        if map
            .get(self.user)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2)
        {
            map.remove(self.user);
        }
    }
}

impl NodeResolver {
    pub fn new(
        store: Arc<dyn NodeStore>,
        fetcher: Arc<dyn HttpFetcher>,
        auth_server: impl Into<String>,
    ) -> Self {
        let auth_server: String = auth_server.into();
        Self {
            store,
            fetcher,
            auth_server: auth_server.trim_end_matches('/').to_string(),
            in_flight: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// URL on the authentication service that names `user`'s node
    pub fn discovery_url(&self, user: &str) -> String {
        format!("{}/user/1.0/{}/node/weave", self.auth_server, user)
    }

    /// Get the storage node for `user`, discovering and storing it on first use
    pub async fn resolve(&self, user: &str) -> Result<StorageNodeRecord> {
        if let Some(node) = self.store.get(user).await? {
            return Ok(node);
        }

        let claim = self.claim(user);
        let _guard = claim.lock.lock().await;
        // Another task may have finished discovery while we waited
        match self.store.get(user).await? {
            Some(node) => Ok(node),
            None => self.discover(user).await,
        }
    }

    async fn discover(&self, user: &str) -> Result<StorageNodeRecord> {
        let url = self.discovery_url(user);
        let discovery_error = |reason: String| Error::Discovery {
            user: user.to_string(),
            reason,
        };

        let response = self
            .fetcher
            .fetch(FetchRequest::get(&url))
            .await
            .map_err(|e| discovery_error(e.to_string()))?;

        if !response.is_success() {
            return Err(discovery_error(format!(
                "{} returned status {}",
                url, response.status
            )));
        }

        let node_url = String::from_utf8(response.body.to_vec())
            .map_err(|_| discovery_error("node URL is not valid UTF-8".to_string()))?;
        if !is_http_url(&node_url) {
            return Err(discovery_error(format!(
                "{} returned {:?}, which is not a node URL",
                url, node_url
            )));
        }

        let node = self
            .store
            .insert_if_absent(StorageNodeRecord::new(user, node_url))
            .await?;
        tracing::debug!("Got storage node for user {}: {}", user, node.url);

        Ok(node)
    }

    fn claim<'a>(&'a self, user: &'a str) -> InFlight<'a> {
        let mut map = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = Arc::clone(map.entry(user.to_string()).or_default());
        InFlight {
            map: &self.in_flight,
            user,
            lock,
        }
    }
}
