//! Outbound HTTP Module
//!
//! The seam through which the proxy talks to the authentication service
//! and to storage nodes.

mod client;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub use client::ReqwestFetcher;

/// An outbound HTTP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl FetchRequest {
    /// A bodyless GET with no headers
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }
}

/// A response received from an upstream server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl FetchResponse {
    /// First value of header `name`, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Issues one HTTP request and returns the complete response.
///
/// Non-2xx statuses are returned as responses, not errors. Only transport
/// failures are errors.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse>;
}
