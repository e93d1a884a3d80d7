//! reqwest-backed fetcher

use std::time::Duration;

use async_trait::async_trait;

use super::{FetchRequest, FetchResponse, HttpFetcher};
use crate::error::{Error, Result};

/// Fetcher that issues real HTTP requests through a shared reqwest client
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Create a fetcher whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        let fetch_error = |reason: String| Error::Fetch {
            url: request.url.clone(),
            reason,
        };

        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| fetch_error(format!("invalid method {}: {}", request.method, e)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        tracing::debug!("{} {}", request.method, request.url);

        let response = builder
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| fetch_error(format!("failed to read body: {}", e)))?;

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{header, HeaderMap, Method, StatusCode},
        routing::any,
        Router,
    };
    use bytes::Bytes;

    /// Echo server reporting the method, one header, and the body it received
    async fn spawn_echo_server() -> String {
        async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> impl axum::response::IntoResponse {
            let auth = headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
                .to_string();
            (
                StatusCode::CREATED,
                [(header::CONTENT_TYPE, "text/plain")],
                format!("{} {} {}", method, auth, String::from_utf8_lossy(&body)),
            )
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/*path", any(echo)))
                .await
                .unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_fetch_round_trip() {
        let base = spawn_echo_server().await;
        let fetcher = ReqwestFetcher::new(Duration::from_secs(5)).unwrap();

        let response = fetcher
            .fetch(FetchRequest {
                method: "PUT".to_string(),
                url: format!("{}/1.0/alice/storage/bookmarks", base),
                headers: vec![("Authorization".to_string(), "Basic xyz".to_string())],
                body: Bytes::from_static(b"payload"),
            })
            .await
            .unwrap();

        assert_eq!(response.status, 201);
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(&response.body[..], b"PUT Basic xyz payload");
    }

    #[tokio::test]
    async fn test_connection_failure_is_fetch_error() {
        // Bind then drop to get a port nobody is listening on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = ReqwestFetcher::new(Duration::from_secs(2)).unwrap();
        let result = fetcher
            .fetch(FetchRequest::get(format!("http://{}/user/1.0/alice/node/weave", addr)))
            .await;

        assert!(matches!(result, Err(Error::Fetch { .. })));
    }
}
