//! HTTP fetcher backed by reqwest.

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::FetchError;
use crate::traits::fetcher::{FetchResponse, Fetcher};
use crate::types::config::{CrawlerConfig, FetchRequest};

/// Plain HTTP GET fetcher.
///
/// Returns whatever status the server sends; interpreting 403/429 and
/// other failures is left to the caller.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Build a client with connection settings taken from `config`.
    pub fn from_config(config: &CrawlerConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    /// Use a custom HTTP client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        debug!(url = %url, "HTTP fetch starting");

        let mut builder = self
            .client
            .get(url.clone())
            .timeout(request.timeout)
            .header(USER_AGENT, &request.user_agent);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| map_error(url, e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| map_error(url, e))?;

        debug!(url = %url, status, bytes = body.len(), "HTTP fetch finished");
        Ok(FetchResponse::new(status, body))
    }
}

fn map_error(url: &Url, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        warn!(url = %url, "HTTP request timed out");
        FetchError::Timeout { url: url.to_string() }
    } else {
        warn!(url = %url, error = %error, "HTTP request failed");
        FetchError::Network {
            url: url.to_string(),
            source: Box::new(error),
        }
    }
}
