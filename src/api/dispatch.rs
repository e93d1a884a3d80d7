//! Request Dispatcher
//!
//! Classifies inbound requests by path and either answers node discovery,
//! forwards storage requests to the user's node, or rejects them.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use axum::{
    body::Body,
    http::{header, request::Parts, HeaderMap, HeaderValue, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
};

use crate::error::{Error, Result};
use crate::fetch::{FetchRequest, HttpFetcher};
use crate::resolver::NodeResolver;

/// Request headers copied to the storage node. Anything else is dropped.
const FORWARDED_REQUEST_HEADERS: [&str; 3] = ["Authorization", "Content-Type", "Accept"];

const DISCOVERY_PREFIX: &str = "/user/1.0/";
const DISCOVERY_SUFFIX: &str = "/node/weave";
const STORAGE_PREFIX: &str = "/1.0/";

/// Where an inbound request goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `/user/1.0/{user}/node/weave`
    Discovery { user: String },
    /// `/1.0/{user}/...`
    Storage { user: String },
    NotFound,
}

type Matcher = fn(&str) -> Option<Route>;

/// Matchers in priority order; the first one that matches decides the route
const MATCHERS: [Matcher; 2] = [match_discovery, match_storage];

impl Route {
    /// Classify a request path. Matching runs on the percent-decoded path.
    pub fn classify(path: &str) -> Route {
        let decoded = urlencoding::decode_binary(path.as_bytes());
        let path = String::from_utf8_lossy(&decoded);
        MATCHERS
            .iter()
            .find_map(|matcher| matcher(&*path))
            .unwrap_or(Route::NotFound)
    }
}

fn match_discovery(path: &str) -> Option<Route> {
    if !(path.starts_with(DISCOVERY_PREFIX) && path.ends_with(DISCOVERY_SUFFIX)) {
        return None;
    }
    Some(match path_segment(path, 3) {
        Some(user) => Route::Discovery { user },
        None => Route::NotFound,
    })
}

fn match_storage(path: &str) -> Option<Route> {
    if !path.starts_with(STORAGE_PREFIX) {
        return None;
    }
    Some(match path_segment(path, 2) {
        Some(user) => Route::Storage { user },
        None => Route::NotFound,
    })
}

/// Non-empty slash-delimited segment `index`, counting the empty segment
/// before the leading slash as 0
fn path_segment(path: &str, index: usize) -> Option<String> {
    path.split('/')
        .nth(index)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Handles every inbound request
pub struct Dispatcher {
    resolver: Arc<NodeResolver>,
    fetcher: Arc<dyn HttpFetcher>,
    /// Base URL reported to clients as their storage node
    public_url: Option<String>,
    max_body_bytes: usize,
}

impl Dispatcher {
    pub fn new(
        resolver: Arc<NodeResolver>,
        fetcher: Arc<dyn HttpFetcher>,
        public_url: Option<String>,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            public_url,
            max_body_bytes,
        }
    }

    /// Produce the response for one inbound request
    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let (parts, body) = request.into_parts();
        let route = Route::classify(parts.uri.path());
        tracing::debug!("{} {} -> {:?}", parts.method, parts.uri, route);

        let result = match route {
            Route::Discovery { user } => self.handle_discovery(&user, &parts).await,
            Route::Storage { user } => self.handle_storage(&user, parts, body).await,
            Route::NotFound => Ok((StatusCode::NOT_FOUND, "Not Found").into_response()),
        };

        result.unwrap_or_else(error_response)
    }

    /// Make sure the user's node is known, then present ourselves as the node
    async fn handle_discovery(&self, user: &str, parts: &Parts) -> Result<Response> {
        self.resolver.resolve(user).await?;
        Ok(self.base_url(&parts.headers, &parts.uri).into_response())
    }

    async fn handle_storage(&self, user: &str, parts: Parts, body: Body) -> Result<Response> {
        let node = self.resolver.resolve(user).await?;

        let authorized = parts
            .headers
            .get(header::AUTHORIZATION)
            .is_some_and(|value| !value.is_empty());
        if !authorized {
            return Ok(unauthorized());
        }

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| parts.uri.path());
        let url = format!("{}{}", node.url, path_and_query);

        let headers = FORWARDED_REQUEST_HEADERS
            .iter()
            .map(|name| {
                let value = parts
                    .headers
                    .get(*name)
                    .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                    .unwrap_or_default();
                (name.to_string(), value)
            })
            .collect();

        let body = read_body(body, self.max_body_bytes).await?;

        let upstream = self
            .fetcher
            .fetch(FetchRequest {
                method: parts.method.as_str().to_string(),
                url,
                headers,
                body,
            })
            .await?;

        let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
        // Only Content-Type is mirrored; X-Weave-* response headers are not
        let content_type = upstream
            .header("Content-Type")
            .and_then(|value| HeaderValue::from_str(value).ok())
            .unwrap_or_else(|| HeaderValue::from_static(""));

        Ok((status, [(header::CONTENT_TYPE, content_type)], upstream.body).into_response())
    }

    /// The proxy's own externally visible base URL
    fn base_url(&self, headers: &HeaderMap, uri: &Uri) -> String {
        if let Some(public_url) = &self.public_url {
            return public_url.trim_end_matches('/').to_string();
        }

        let scheme = headers
            .get("X-Forwarded-Proto")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or("http");
        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| uri.authority().map(|a| a.as_str()))
            .unwrap_or("localhost");

        format!("{}://{}", scheme, host)
    }
}

/// Collect the request body, failing once it grows past `limit` bytes
async fn read_body(body: Body, limit: usize) -> Result<Bytes> {
    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| Error::BadRequest(format!("Failed to read request body: {}", e)))?;
        if buf.len() + chunk.len() > limit {
            return Err(Error::PayloadTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(buf.freeze())
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"weave\"")],
        "Unauthorized",
    )
        .into_response()
}

fn error_response(error: Error) -> Response {
    let status = error.status_code();
    if error.is_upstream() || status.is_client_error() {
        tracing::warn!("{}", error);
    } else {
        tracing::error!("{}", error);
    }
    (status, status.canonical_reason().unwrap_or("Error")).into_response()
}
