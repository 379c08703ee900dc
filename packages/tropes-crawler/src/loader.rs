//! Page construction: validate, classify, and optionally fetch a URL.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{PageError, PageResult};
use crate::traits::fetcher::{DocumentParser, Fetcher};
use crate::types::config::{FetchRequest, WikiConfig};
use crate::types::page::Page;

/// Whether constructing a page should also retrieve its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchMode {
    /// Classify only; no network access
    Deferred,
    /// Fetch and parse with these request options
    Now(FetchRequest),
}

impl FetchMode {
    pub fn now(request: &FetchRequest) -> Self {
        Self::Now(request.clone())
    }

    /// `Now` when `should_fetch`, otherwise `Deferred`.
    pub fn when(should_fetch: bool, request: &FetchRequest) -> Self {
        if should_fetch {
            Self::now(request)
        } else {
            Self::Deferred
        }
    }
}

/// Builds `Page` values for one wiki.
///
/// Holds the wiki layout and the fetch/parse collaborators. Cheap to clone.
#[derive(Clone)]
pub struct PageLoader {
    config: Arc<WikiConfig>,
    fetcher: Arc<dyn Fetcher>,
    parser: Arc<dyn DocumentParser>,
}

impl PageLoader {
    pub fn new(
        config: WikiConfig,
        fetcher: impl Fetcher + 'static,
        parser: impl DocumentParser + 'static,
    ) -> Self {
        Self {
            config: Arc::new(config),
            fetcher: Arc::new(fetcher),
            parser: Arc::new(parser),
        }
    }

    pub fn config(&self) -> &WikiConfig {
        &self.config
    }

    /// Validate and classify without touching the network.
    pub fn classify(&self, raw: &str) -> PageResult<Page> {
        Page::parse(raw, &self.config)
    }

    /// Validate, classify, and fetch when asked to.
    pub async fn construct(&self, raw: &str, mode: &FetchMode) -> PageResult<Page> {
        let page = self.classify(raw)?;
        match mode {
            FetchMode::Deferred => Ok(page),
            FetchMode::Now(request) => self.fetch(page, request).await,
        }
    }

    /// Fetch and parse a page's content, bounded by `request.timeout`.
    ///
    /// 403/429 become `AccessDenied`; timeouts, network failures, and other
    /// non-2xx statuses become `NotFound`.
    pub async fn fetch(&self, page: Page, request: &FetchRequest) -> PageResult<Page> {
        let url = page.url().clone();
        debug!(url = %url, timeout_ms = request.timeout.as_millis() as u64, "Fetching page");

        let response = match tokio::time::timeout(request.timeout, self.fetcher.fetch(&url, request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(url = %url, error = %e, "Fetch failed");
                return Err(PageError::NotFound { url: url.to_string() });
            }
            Err(_) => {
                warn!(url = %url, "Fetch timed out");
                return Err(PageError::NotFound { url: url.to_string() });
            }
        };

        if response.is_access_denied() {
            warn!(url = %url, status = response.status, "Access denied by wiki");
            return Err(PageError::AccessDenied {
                url: url.to_string(),
                status: response.status,
            });
        }
        if !response.is_success() {
            debug!(url = %url, status = response.status, "Non-success status");
            return Err(PageError::NotFound { url: url.to_string() });
        }

        let document = self.parser.parse(&url, &response.body)?;
        Ok(page.with_document(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::HtmlParser;
    use crate::testing::{html_page, MockFetcher};
    use std::time::Duration;

    fn wiki() -> WikiConfig {
        WikiConfig::new("wiki.example")
            .with_work_prefix("/work/")
            .with_topic_prefix("/topic/")
    }

    fn loader(fetcher: MockFetcher) -> PageLoader {
        PageLoader::new(wiki(), fetcher, HtmlParser::new())
    }

    #[tokio::test]
    async fn test_deferred_mode_makes_no_request() {
        let fetcher = MockFetcher::new();
        let loader = loader(fetcher.clone());

        let page = loader
            .construct("https://wiki.example/work/Foo", &FetchMode::Deferred)
            .await
            .unwrap();

        assert!(!page.is_fetched());
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_attaches_document() {
        let fetcher = MockFetcher::new().with_page("https://wiki.example/work/Foo", html_page("Foo", ""));
        let loader = loader(fetcher.clone());

        let page = loader
            .construct("https://wiki.example/work/Foo", &FetchMode::now(&FetchRequest::default()))
            .await
            .unwrap();

        assert!(page.is_fetched());
        assert_eq!(page.document().unwrap().title(), Some("Foo"));
        assert_eq!(fetcher.calls(), vec!["https://wiki.example/work/Foo".to_string()]);
    }

    #[tokio::test]
    async fn test_access_denied_is_distinct_from_not_found() {
        let fetcher = MockFetcher::new()
            .with_status("https://wiki.example/work/Slow", 429)
            .with_status("https://wiki.example/work/Gone", 404);
        let loader = loader(fetcher);
        let mode = FetchMode::now(&FetchRequest::default());

        let denied = loader.construct("https://wiki.example/work/Slow", &mode).await;
        assert!(matches!(denied, Err(PageError::AccessDenied { status: 429, .. })));

        let missing = loader.construct("https://wiki.example/work/Gone", &mode).await;
        assert!(matches!(missing, Err(PageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_unparseable_body_is_parse_failure() {
        let fetcher = MockFetcher::new().with_page("https://wiki.example/work/Foo", "plain text");
        let loader = loader(fetcher);

        let result = loader
            .construct("https://wiki.example/work/Foo", &FetchMode::now(&FetchRequest::default()))
            .await;
        assert!(matches!(result, Err(PageError::ParseFailure { .. })));
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_not_found() {
        let fetcher = MockFetcher::new()
            .with_page("https://wiki.example/work/Foo", html_page("Foo", ""))
            .with_delay(Duration::from_millis(200));
        let loader = loader(fetcher);
        let request = FetchRequest::default().with_timeout(Duration::from_millis(20));

        let result = loader
            .construct("https://wiki.example/work/Foo", &FetchMode::now(&request))
            .await;
        assert!(matches!(result, Err(PageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_wrong_host_never_fetches() {
        let fetcher = MockFetcher::new();
        let loader = loader(fetcher.clone());

        let result = loader
            .construct("https://other.example/work/Foo", &FetchMode::now(&FetchRequest::default()))
            .await;
        assert!(matches!(result, Err(PageError::WrongHost { .. })));
        assert!(fetcher.calls().is_empty());
    }
}
