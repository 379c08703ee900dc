//! Configuration types for the wiki layout and for crawl runs.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::trope::TropeCategory;

/// Placeholder substituted with the (URL-encoded) namespace in listing queries.
pub const CATEGORY_PLACEHOLDER: &str = "{category}";

/// Layout of the target wiki: where it lives and how its paths are shaped.
///
/// Classification of URLs into page types is driven entirely by these
/// prefixes. When several prefixes match a path, the longest one wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiConfig {
    /// URL scheme used when building URLs (usually "https")
    pub scheme: String,

    /// Hostname every admitted URL must carry
    pub host: String,

    /// Path prefix of work pages
    pub work_prefix: String,

    /// Path prefix of the topic index namespace
    pub topic_prefix: String,

    /// Path of the listing endpoint
    pub listing_prefix: String,

    /// Query string of the listing endpoint, with a `{category}` placeholder
    pub listing_query: String,

    /// Trope namespaces and the category their tropes belong to
    #[serde(default)]
    pub trope_namespaces: IndexMap<String, TropeCategory>,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self::tvtropes()
    }
}

impl WikiConfig {
    /// Layout of tvtropes.org.
    pub fn tvtropes() -> Self {
        let mut trope_namespaces = IndexMap::new();
        trope_namespaces.insert("Main".to_string(), TropeCategory::Narrative);
        trope_namespaces.insert("Genre".to_string(), TropeCategory::Genre);
        trope_namespaces.insert("Media".to_string(), TropeCategory::Medium);
        trope_namespaces.insert("Topical".to_string(), TropeCategory::Topical);

        Self {
            scheme: "https".to_string(),
            host: "tvtropes.org".to_string(),
            work_prefix: "/pmwiki/pmwiki.php/".to_string(),
            topic_prefix: "/pmwiki/pmwiki.php/Main/".to_string(),
            listing_prefix: "/pmwiki/pagelist_having_pagetype_in_namespace.php".to_string(),
            listing_query: format!("n={}&t=work", CATEGORY_PLACEHOLDER),
            trope_namespaces,
        }
    }

    /// A layout with the given host and empty prefixes; set them with the `with_*` methods.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            scheme: "https".to_string(),
            host: host.into(),
            work_prefix: String::new(),
            topic_prefix: String::new(),
            listing_prefix: String::new(),
            listing_query: String::new(),
            trope_namespaces: IndexMap::new(),
        }
    }

    /// Load the layout from the environment, falling back to tvtropes.org.
    ///
    /// Reads `TROPES_WIKI_HOST` and `TROPES_WIKI_SCHEME`.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let mut config = Self::tvtropes();
        if let Ok(host) = env::var("TROPES_WIKI_HOST") {
            config.host = host;
        }
        if let Ok(scheme) = env::var("TROPES_WIKI_SCHEME") {
            config.scheme = scheme;
        }
        config
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_work_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.work_prefix = prefix.into();
        self
    }

    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    /// Set the listing endpoint path and its query template.
    pub fn with_listing(mut self, prefix: impl Into<String>, query: impl Into<String>) -> Self {
        self.listing_prefix = prefix.into();
        self.listing_query = query.into();
        self
    }

    /// Map a trope namespace to a category.
    pub fn with_trope_namespace(mut self, namespace: impl Into<String>, category: TropeCategory) -> Self {
        self.trope_namespaces.insert(namespace.into(), category);
        self
    }

    /// Root URL of the wiki, e.g. `https://tvtropes.org`.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// Listing URL for a namespace such as "Film" or "VideoGame".
    pub fn listing_url(&self, category: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(category.as_bytes()).collect();
        let query = self.listing_query.replace(CATEGORY_PLACEHOLDER, &encoded);
        if query.is_empty() {
            format!("{}{}", self.base_url(), self.listing_prefix)
        } else {
            format!("{}{}?{}", self.base_url(), self.listing_prefix, query)
        }
    }

    /// Category of tropes found under `namespace`, if it is a trope namespace.
    pub fn trope_category(&self, namespace: &str) -> Option<TropeCategory> {
        self.trope_namespaces.get(namespace).copied()
    }
}

/// Per-request options handed to the fetch collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Upper bound for the whole request
    pub timeout: Duration,

    /// User agent header
    pub user_agent: String,

    /// Extra request headers
    pub headers: Vec<(String, String)>,
}

impl Default for FetchRequest {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: default_user_agent(),
            headers: Vec::new(),
        }
    }
}

impl FetchRequest {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

fn default_user_agent() -> String {
    format!("tropes-crawler/{}", env!("CARGO_PKG_VERSION"))
}

/// Settings for a crawl run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum candidates processed at once during discovery
    pub concurrency: usize,

    /// Timeout per request in seconds
    pub timeout_secs: u64,

    /// Sustained request rate against the wiki
    pub requests_per_second: u32,

    /// User agent sent with every request
    pub user_agent: String,

    /// Fetch sub-page documents during discovery (needed for extraction)
    pub fetch_subpages: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeout_secs: 30,
            requests_per_second: 2,
            user_agent: default_user_agent(),
            fetch_subpages: true,
        }
    }
}

impl CrawlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from environment variables (and `.env` if present).
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();
        if let Some(concurrency) = env_parse::<usize>("TROPES_CONCURRENCY")? {
            config.concurrency = concurrency;
        }
        if let Some(timeout) = env_parse::<u64>("TROPES_TIMEOUT_SECS")? {
            config.timeout_secs = timeout;
        }
        if let Some(rps) = env_parse::<u32>("TROPES_RPS")? {
            config.requests_per_second = rps;
        }
        if let Ok(user_agent) = env::var("TROPES_USER_AGENT") {
            config.user_agent = user_agent;
        }
        if let Some(fetch_subpages) = env_parse::<bool>("TROPES_FETCH_SUBPAGES")? {
            config.fetch_subpages = fetch_subpages;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject zero values for settings that must be positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Zero { key: "concurrency" });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Zero { key: "timeout_secs" });
        }
        if self.requests_per_second == 0 {
            return Err(ConfigError::Zero { key: "requests_per_second" });
        }
        Ok(())
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_fetch_subpages(mut self, fetch: bool) -> Self {
        self.fetch_subpages = fetch;
        self
    }

    /// Request options derived from this config.
    pub fn fetch_request(&self) -> FetchRequest {
        FetchRequest {
            timeout: Duration::from_secs(self.timeout_secs),
            user_agent: self.user_agent.clone(),
            headers: Vec::new(),
        }
    }
}

fn env_parse<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_url_encodes_category() {
        let config = WikiConfig::tvtropes();
        assert_eq!(
            config.listing_url("Film"),
            "https://tvtropes.org/pmwiki/pagelist_having_pagetype_in_namespace.php?n=Film&t=work"
        );
        assert!(config.listing_url("Web Original").contains("n=Web+Original"));
    }

    #[test]
    fn test_listing_url_without_query() {
        let config = WikiConfig::new("wiki.example").with_listing("/list", "");
        assert_eq!(config.listing_url("Film"), "https://wiki.example/list");
    }

    #[test]
    fn test_trope_namespace_lookup() {
        let config = WikiConfig::tvtropes();
        assert_eq!(config.trope_category("Main"), Some(TropeCategory::Narrative));
        assert_eq!(config.trope_category("Film"), None);
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = CrawlerConfig::new().with_concurrency(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero { key: "concurrency" })
        ));
        assert!(CrawlerConfig::new().validate().is_ok());
    }

    #[test]
    fn test_fetch_request_uses_timeout() {
        let request = CrawlerConfig::new().with_timeout_secs(5).fetch_request();
        assert_eq!(request.timeout, Duration::from_secs(5));
        assert!(request.user_agent.starts_with("tropes-crawler/"));
    }
}
