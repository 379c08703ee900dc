//! Trope Wiki Crawler
//!
//! Discovers, classifies, and tracks the pages of a single trope wiki, then
//! assembles works and their tropes into a dataset.
//!
//! # Flow
//!
//! URL string → [`Page`] (validated against the wiki host, classified by
//! path prefix) → [`PageRegistry`] (dedup and last-seen timestamps) →
//! [`Extractor`] → [`Work`] and [`Trope`] values → [`Sink`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tropes_crawler::{
//!     Crawler, CrawlerConfig, DiscoveryLimit, FetcherExt, HtmlExtractor, HtmlParser,
//!     HttpFetcher, MemorySink, PageLoader, PageRegistry, WikiConfig,
//! };
//!
//! let wiki = WikiConfig::tvtropes();
//! let config = CrawlerConfig::from_env()?;
//! let fetcher = HttpFetcher::from_config(&config)?.rate_limited(config.requests_per_second);
//! let loader = PageLoader::new(wiki.clone(), fetcher, HtmlParser::new());
//! let registry = Arc::new(PageRegistry::new(loader));
//! let crawler = Crawler::new(registry, HtmlExtractor::new(wiki), config);
//!
//! let sink = MemorySink::new();
//! let report = crawler.harvest(DiscoveryLimit::AtMost(50), "Film", &sink).await?;
//! ```
//!
//! # Modules
//!
//! - [`types`] - Page, trope, work, and configuration types
//! - [`traits`] - Fetch, parse, extract, and sink collaborators
//! - [`loader`] - Page construction with optional fetch
//! - [`registry`] - The page registry
//! - [`crawler`] - Discovery and update orchestration
//! - [`fetchers`] - HTTP and rate-limited fetchers
//! - [`parsing`] - HTML parser and extractor
//! - [`sinks`] - In-memory and JSON file sinks
//! - [`testing`] - Scripted fetcher and HTML fixtures

pub mod crawler;
pub mod error;
pub mod fetchers;
pub mod loader;
pub mod parsing;
pub mod registry;
pub mod sinks;
pub mod testing;
pub mod traits;
pub mod types;

pub use crawler::{
    CandidateFailure, Crawler, DiscoveredWork, Discovery, DiscoveryLimit, ExtractionFailure,
    HarvestReport, RegistryDelta, WorkUpdate,
};
pub use error::{
    ConfigError, CrawlError, CrawlResult, FetchError, ModelError, ModelResult, PageError,
    PageResult, SinkError, SinkResult,
};
pub use fetchers::{FetcherExt, HttpFetcher, RateLimitedFetcher};
pub use loader::{FetchMode, PageLoader};
pub use parsing::{HtmlExtractor, HtmlParser};
pub use registry::{ChangeReport, ChangedPage, PageRegistry, RegistryEntry, RegistrySnapshot};
pub use sinks::{JsonFileSink, MemorySink};
pub use traits::{
    extractor::Extractor,
    fetcher::{DocumentParser, FetchResponse, Fetcher},
    sink::Sink,
};
pub use types::{
    config::{CrawlerConfig, FetchRequest, WikiConfig},
    page::{Document, Page, PageContent, PageType},
    trope::{Trope, TropeCategory, TropeKey},
    work::{ReleaseYear, Work},
};
