//! HTTP API Module
//!
//! The proxy's inbound surface: path dispatch and the axum listener.

mod dispatch;
mod server;

pub use dispatch::{Dispatcher, Route};
pub use server::ProxyServer;
