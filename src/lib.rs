//! weaveproxy - Weave Storage Node Proxy
//!
//! An HTTP reverse proxy for Weave (Firefox Sync 1.0) clients. It learns each
//! user's storage node from the authentication service, remembers it in a
//! local store, and presents itself to the client as that node. Storage
//! requests are then forwarded to the real node with the client's
//! credentials passed through.
//!
//! # Architecture
//!
//! - [`resolver::NodeResolver`] maps users to storage nodes, asking the
//!   authentication service only on the first lookup
//! - [`api::Dispatcher`] classifies requests by path and answers discovery,
//!   forwards storage requests, or returns 404
//! - [`store::NodeStore`] and [`fetch::HttpFetcher`] are the persistence and
//!   outbound HTTP seams, injected so either can be replaced

pub mod api;
pub mod config;
pub mod error;
pub mod fetch;
pub mod resolver;
pub mod store;

pub use config::ProxyConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::{Dispatcher, ProxyServer, Route};
    pub use crate::config::ProxyConfig;
    pub use crate::error::{Error, Result};
    pub use crate::fetch::{FetchRequest, FetchResponse, HttpFetcher, ReqwestFetcher};
    pub use crate::resolver::NodeResolver;
    pub use crate::store::{MemoryNodeStore, NodeStore, SqliteNodeStore, StorageNodeRecord};
}
