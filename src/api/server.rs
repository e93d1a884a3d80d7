//! HTTP Proxy Server
//!
//! Binds the listener and hands every request to the dispatcher.

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::dispatch::Dispatcher;
use crate::config::ServerConfig;
use crate::error::{Error, Result};

/// HTTP proxy server
pub struct ProxyServer {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
}

impl ProxyServer {
    /// Create a new proxy server
    pub fn new(config: ServerConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self { config, dispatcher }
    }

    /// Create the router. Every path goes through the dispatcher.
    fn create_router(dispatcher: Arc<Dispatcher>) -> Router {
        Router::new()
            .fallback(handle_request)
            .with_state(dispatcher)
            .layer(TraceLayer::new_for_http())
    }

    /// Start the proxy and run until Ctrl+C
    pub async fn start(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("Weave proxy listening on {}", self.config.bind_address);

        self.serve(listener, async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
            }
        })
        .await
    }

    /// Serve on an already bound listener until `shutdown` completes
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = Self::create_router(Arc::clone(&self.dispatcher));

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

async fn handle_request(
    State(dispatcher): State<Arc<Dispatcher>>,
    request: Request<Body>,
) -> Response {
    dispatcher.dispatch(request).await
}
