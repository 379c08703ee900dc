//! Typed errors for the crawler library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can branch
//! on the failure kind: skip, slow down, or abort.

use thiserror::Error;

/// Errors raised while constructing, fetching, or registering a page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    /// The URL string was empty
    #[error("empty URL")]
    EmptyUrl,

    /// The URL string could not be parsed
    #[error("malformed URL {url}: {reason}")]
    MalformedUrl { url: String, reason: String },

    /// The URL points outside the wiki
    #[error("URL {url} is not on host {expected}")]
    WrongHost { url: String, expected: String },

    /// The URL classifies as `Unknown` and cannot key a registry entry
    #[error("not a work, topic, or listing page: {url}")]
    NotPrimary { url: String },

    /// Non-success response, network failure, timeout, or unknown registry entry
    #[error("not found: {url}")]
    NotFound { url: String },

    /// The wiki answered 403 or 429
    #[error("access denied (HTTP {status}): {url}")]
    AccessDenied { url: String, status: u16 },

    /// The body could not be parsed into a document
    #[error("failed to parse {url}: {reason}")]
    ParseFailure { url: String, reason: String },

    /// The primary page is already registered
    #[error("page already registered: {url}")]
    DuplicatePage { url: String },
}

impl PageError {
    /// Expected during batch runs; the page should be skipped, not retried.
    pub fn is_skip_signal(&self) -> bool {
        matches!(self, Self::DuplicatePage { .. } | Self::ParseFailure { .. })
    }

    /// Network-layer failures where the caller owns retry and backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::AccessDenied { .. })
    }

    /// Caller errors detected before any network access.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyUrl
                | Self::MalformedUrl { .. }
                | Self::WrongHost { .. }
                | Self::NotPrimary { .. }
        )
    }
}

/// Validation failures for tropes and works.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A required field was empty
    #[error("missing required value: {field}")]
    MissingValues { field: &'static str },

    /// The release year token is not a numeric year
    #[error("invalid release year: {token:?}")]
    InvalidYear { token: String },

    /// The trope category is not a recognized member
    #[error("unknown trope category: {category}")]
    UnknownCategory { category: String },
}

/// Failures reported by a fetch collaborator.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, TLS, or body read failure
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The request did not complete in time
    #[error("timeout fetching {url}")]
    Timeout { url: String },
}

/// Failures reported by a dataset sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// A work with the same identity is already stored
    #[error("work already exists: {identity}")]
    AlreadyExists { identity: String },

    /// No work with this identity is stored
    #[error("work not found: {identity}")]
    NotFound { identity: String },

    /// Filesystem failure
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding failure
    #[error("sink JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    /// A numeric setting must be positive
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

/// Errors surfaced by crawler orchestration.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Page construction or registration failed
    #[error(transparent)]
    Page(#[from] PageError),

    /// Extraction produced an invalid work or trope
    #[error("extraction failed: {0}")]
    Model(#[from] ModelError),

    /// Dataset persistence failed
    #[error("sink failed: {0}")]
    Sink(#[from] SinkError),

    /// The page is registered but is not a work page
    #[error("not a work page: {url}")]
    NotAWorkPage { url: String },
}

/// Result type alias for page operations.
pub type PageResult<T> = std::result::Result<T, PageError>;

/// Result type alias for model construction.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Result type alias for sink operations.
pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Result type alias for crawler operations.
pub type CrawlResult<T> = std::result::Result<T, CrawlError>;
