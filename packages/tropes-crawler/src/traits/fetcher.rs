//! Fetch and parse collaborators.

use async_trait::async_trait;
use url::Url;

use crate::error::{FetchError, PageResult};
use crate::types::config::FetchRequest;
use crate::types::page::Document;

/// Raw response from a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,

    /// Response body
    pub body: String,
}

impl FetchResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 403 and 429 mean the wiki wants us to back off.
    pub fn is_access_denied(&self) -> bool {
        matches!(self.status, 403 | 429)
    }
}

/// Network access. Implementations return any status they receive; the
/// caller decides what a status means.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a single URL.
    async fn fetch(&self, url: &Url, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// Turns a response body into an opaque document.
pub trait DocumentParser: Send + Sync {
    /// Parse a body fetched from `url`. Fails with `PageError::ParseFailure`.
    fn parse(&self, url: &Url, body: &str) -> PageResult<Document>;
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for std::sync::Arc<F> {
    async fn fetch(&self, url: &Url, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        (**self).fetch(url, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert!(FetchResponse::ok("").is_success());
        assert!(FetchResponse::new(204, "").is_success());
        assert!(!FetchResponse::new(404, "").is_success());
        assert!(FetchResponse::new(403, "").is_access_denied());
        assert!(FetchResponse::new(429, "").is_access_denied());
        assert!(!FetchResponse::new(500, "").is_access_denied());
    }
}
