//! Page types - classified wiki URLs and their fetched documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use url::Url;

use crate::error::{PageError, PageResult};
use crate::types::config::WikiConfig;

/// What a wiki URL is, decided from its path alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    #[default]
    Unknown,
    WorkPage,
    TopicPage,
    ListingPage,
}

impl PageType {
    /// Classify a URL path against the wiki layout.
    ///
    /// Total: every path gets exactly one type. When several prefixes match,
    /// the longest wins, so a topic namespace nested inside the work
    /// namespace still classifies as a topic.
    pub fn classify(url: &Url, config: &WikiConfig) -> Self {
        let path = url.path();
        let candidates = [
            (config.work_prefix.as_str(), PageType::WorkPage),
            (config.topic_prefix.as_str(), PageType::TopicPage),
            (config.listing_prefix.as_str(), PageType::ListingPage),
        ];

        candidates
            .into_iter()
            .filter(|(prefix, _)| !prefix.is_empty() && path.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, page_type)| page_type)
            .unwrap_or(PageType::Unknown)
    }

    /// Types that may key a registry entry.
    pub fn is_primary(&self) -> bool {
        !matches!(self, PageType::Unknown)
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageType::Unknown => "unknown",
            PageType::WorkPage => "work",
            PageType::TopicPage => "topic",
            PageType::ListingPage => "listing",
        };
        f.write_str(name)
    }
}

/// Opaque handle to a fetched and parsed page.
///
/// Cheap to clone. Only extractors look inside; the registry uses the
/// content hash for change detection.
#[derive(Debug, Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

#[derive(Debug)]
struct DocumentInner {
    url: Url,
    html: String,
    title: Option<String>,
    content_hash: String,
    fetched_at: DateTime<Utc>,
}

impl Document {
    /// Create a document from the body fetched at `url`.
    pub fn new(url: Url, html: impl Into<String>, title: Option<String>) -> Self {
        let html = html.into();
        let content_hash = Self::hash_content(&html);
        Self {
            inner: Arc::new(DocumentInner {
                url,
                html,
                title,
                content_hash,
                fetched_at: Utc::now(),
            }),
        }
    }

    /// Calculate SHA-256 hash of content.
    pub fn hash_content(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// URL the body was fetched from; base for resolving relative links.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn html(&self) -> &str {
        &self.inner.html
    }

    pub fn title(&self) -> Option<&str> {
        self.inner.title.as_deref()
    }

    pub fn content_hash(&self) -> &str {
        &self.inner.content_hash
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.inner.fetched_at
    }
}

/// Whether a page's content has been retrieved.
#[derive(Debug, Clone, Default)]
pub enum PageContent {
    #[default]
    Unfetched,
    Fetched(Document),
}

/// One classified wiki URL.
///
/// Equality and hashing use the URL only; content does not take part.
#[derive(Debug, Clone)]
pub struct Page {
    url: Url,
    page_type: PageType,
    content: PageContent,
}

impl Page {
    /// Validate and classify a URL string without fetching it.
    pub fn parse(raw: &str, config: &WikiConfig) -> PageResult<Self> {
        if raw.is_empty() {
            return Err(PageError::EmptyUrl);
        }

        let url = Url::parse(raw).map_err(|e| PageError::MalformedUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        match url.host_str() {
            Some(host) if host.eq_ignore_ascii_case(&config.host) => {}
            _ => {
                return Err(PageError::WrongHost {
                    url: raw.to_string(),
                    expected: config.host.clone(),
                })
            }
        }

        let page_type = PageType::classify(&url, config);
        Ok(Self {
            url,
            page_type,
            content: PageContent::Unfetched,
        })
    }

    /// Attach fetched content, consuming the unfetched page.
    pub fn with_document(mut self, document: Document) -> Self {
        self.content = PageContent::Fetched(document);
        self
    }

    /// Same identity and type, content dropped.
    pub fn without_document(&self) -> Self {
        Self {
            url: self.url.clone(),
            page_type: self.page_type,
            content: PageContent::Unfetched,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn page_type(&self) -> PageType {
        self.page_type
    }

    pub fn content(&self) -> &PageContent {
        &self.content
    }

    /// The fetched document, if any.
    pub fn document(&self) -> Option<&Document> {
        match &self.content {
            PageContent::Fetched(document) => Some(document),
            PageContent::Unfetched => None,
        }
    }

    pub fn is_fetched(&self) -> bool {
        matches!(self.content, PageContent::Fetched(_))
    }

    /// Last path segment, e.g. "TheMatrix" for `.../Film/TheMatrix`.
    pub fn slug(&self) -> Option<&str> {
        self.url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
    }

    /// Path segment before the slug, e.g. "Film" for `.../Film/TheMatrix`.
    pub fn namespace(&self) -> Option<&str> {
        let segments: Vec<&str> = self
            .url
            .path_segments()?
            .filter(|s| !s.is_empty())
            .collect();
        if segments.len() < 2 {
            return None;
        }
        Some(segments[segments.len() - 2])
    }
}

impl PartialEq for Page {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for Page {}

impl Hash for Page {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.url, self.page_type)
    }
}
