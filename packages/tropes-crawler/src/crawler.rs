//! Crawler: drives discovery, change detection, and harvesting through the
//! page registry.
//!
//! Discovery fetches the listing page up front, then hands back a lazy
//! stream. Candidates are fetched by a bounded pool of workers and yielded
//! in listing order; dropping the stream abandons any fetches in flight.

use futures::future::join_all;
use futures::stream::{self, Stream, StreamExt};
use futures::pin_mut;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{CrawlResult, ModelError, PageError, SinkError};
use crate::loader::{FetchMode, PageLoader};
use crate::registry::{ChangedPage, PageRegistry};
use crate::traits::extractor::Extractor;
use crate::traits::sink::Sink;
use crate::types::config::{CrawlerConfig, FetchRequest};
use crate::types::page::{Page, PageType};
use crate::types::work::Work;

pub use crate::registry::CandidateFailure;

/// How many listing candidates discovery may process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryLimit {
    #[default]
    All,
    AtMost(usize),
}

impl DiscoveryLimit {
    /// Negative values mean no cap.
    pub fn from_signed(limit: i64) -> Self {
        if limit < 0 {
            Self::All
        } else {
            Self::AtMost(usize::try_from(limit).unwrap_or(usize::MAX))
        }
    }

    fn cap(&self) -> usize {
        match self {
            Self::All => usize::MAX,
            Self::AtMost(n) => *n,
        }
    }
}

/// A primary page registered during discovery, with its sub-pages.
#[derive(Debug, Clone)]
pub struct DiscoveredWork {
    pub primary: Page,

    /// Registered sub-pages; fetched unless fetching failed or was disabled
    pub subpages: Vec<Page>,

    /// Sub-pages that were registered but could not be fetched
    pub subpage_failures: Vec<CandidateFailure>,
}

/// A fresh extraction of a changed work, and which sub-pages it saw.
#[derive(Debug, Clone)]
pub struct WorkUpdate {
    pub work: Work,

    /// Origins of the sub-pages refetched for this extraction. Stored
    /// tropes from any other origin are still current.
    pub refreshed_origins: Vec<String>,
}

/// A work that could not be assembled from its pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionFailure {
    pub url: String,
    pub error: ModelError,
}

/// Lazy, finite, single-pass sequence of discovered pages.
///
/// Each item is yielded only after the primary page and all of its
/// sub-pages are registered. Failed candidates are skipped and can be
/// inspected through [`Discovery::failures`]. A sub-page that cannot be
/// fetched does not fail its candidate; it is yielded unfetched and listed
/// in [`DiscoveredWork::subpage_failures`].
pub struct Discovery {
    session_id: Uuid,
    listing_url: String,
    candidates: usize,
    failures: Arc<Mutex<Vec<CandidateFailure>>>,
    inner: Pin<Box<dyn Stream<Item = DiscoveredWork> + Send>>,
}

impl Discovery {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn listing_url(&self) -> &str {
        &self.listing_url
    }

    /// Candidates taken from the listing after the limit was applied.
    pub fn candidates(&self) -> usize {
        self.candidates
    }

    /// Candidates skipped so far.
    pub fn failures(&self) -> Vec<CandidateFailure> {
        self.failures.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl Stream for Discovery {
    type Item = DiscoveredWork;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Result of an incremental update pass.
#[derive(Debug, Clone, Default)]
pub struct RegistryDelta {
    /// Primary pages whose content moved on
    pub changed: Vec<ChangedPage>,

    /// Fresh extractions for the changed work pages
    pub works: Vec<WorkUpdate>,

    /// Pages checked and found unchanged
    pub unchanged: usize,

    /// Primary pages and sub-pages that could not be fetched
    pub failures: Vec<CandidateFailure>,

    /// Changed pages whose re-extraction failed
    pub extraction_failures: Vec<ExtractionFailure>,
}

/// Result of a discover-extract-append run.
#[derive(Debug, Clone, Default)]
pub struct HarvestReport {
    pub session_id: Uuid,
    pub candidates: usize,
    pub appended: usize,
    pub already_stored: usize,
    pub skipped_non_work: usize,
    pub failures: Vec<CandidateFailure>,

    /// Sub-pages left unfetched; their works were still extracted
    pub subpage_failures: Vec<CandidateFailure>,
    pub extraction_failures: Vec<ExtractionFailure>,
}

/// Orchestrates discovery over a shared registry.
pub struct Crawler {
    registry: Arc<PageRegistry>,
    extractor: Arc<dyn Extractor>,
    config: CrawlerConfig,
}

impl Crawler {
    pub fn new(registry: Arc<PageRegistry>, extractor: impl Extractor + 'static, config: CrawlerConfig) -> Self {
        Self {
            registry,
            extractor: Arc::new(extractor),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<PageRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    /// Fetch the listing for `category` and return the discovery stream.
    ///
    /// Fails only if the listing itself cannot be fetched or parsed.
    pub async fn discover(&self, limit: DiscoveryLimit, category: &str) -> CrawlResult<Discovery> {
        let session_id = Uuid::now_v7();
        let loader = self.registry.loader();
        let listing_url = loader.config().listing_url(category);
        let request = self.config.fetch_request();

        info!(session = %session_id, category = %category, url = %listing_url, "Discovery starting");

        let listing = loader
            .construct(&listing_url, &FetchMode::now(&request))
            .await?;
        let document = listing.document().ok_or_else(|| PageError::ParseFailure {
            url: listing_url.clone(),
            reason: "listing has no document".to_string(),
        })?;

        let links: Vec<String> = self
            .extractor
            .listing_links(document)
            .into_iter()
            .take(limit.cap())
            .collect();
        let candidates = links.len();
        info!(session = %session_id, candidates, "Listing enumerated");

        let failures = Arc::new(Mutex::new(Vec::new()));
        let span = info_span!("discovery", session = %session_id, category = %category);

        let registry = Arc::clone(&self.registry);
        let extractor = Arc::clone(&self.extractor);
        let fetch_subpages = self.config.fetch_subpages;
        let concurrency = self.config.concurrency.max(1);
        let recorded = Arc::clone(&failures);

        let inner = async_stream::stream! {
            let outcomes = stream::iter(links)
                .map(|link| {
                    let registry = Arc::clone(&registry);
                    let extractor = Arc::clone(&extractor);
                    let request = request.clone();
                    async move {
                        discover_candidate(&registry, extractor.as_ref(), link, &request, fetch_subpages).await
                    }
                    .instrument(span.clone())
                })
                .buffered(concurrency);
            pin_mut!(outcomes);

            while let Some(outcome) = outcomes.next().await {
                match outcome {
                    Ok(found) => yield found,
                    Err(failure) => {
                        if let Ok(mut list) = recorded.lock() {
                            list.push(failure);
                        }
                    }
                }
            }
        };

        Ok(Discovery {
            session_id,
            listing_url,
            candidates,
            failures,
            inner: Box::pin(inner),
        })
    }

    /// Re-check previously crawled primary pages and re-extract the changed
    /// work pages.
    pub async fn detect_updates<S: AsRef<str>>(&self, previously_crawled: &[S]) -> CrawlResult<RegistryDelta> {
        let request = self.config.fetch_request();
        let report = self
            .registry
            .detect_changes(previously_crawled, self.extractor.as_ref(), &request)
            .await?;

        let mut delta = RegistryDelta {
            unchanged: report.unchanged,
            failures: report.failed,
            ..Default::default()
        };

        for changed in &report.changed {
            if changed.primary.page_type() != PageType::WorkPage {
                debug!(url = %changed.primary.url(), "Changed page is not a work page, nothing to extract");
                continue;
            }

            let (subpages, refreshed_origins) = self.refetch_subpages(changed, &request, &mut delta.failures).await;
            match self.extractor.extract_work(&changed.primary, &subpages) {
                Ok(work) => delta.works.push(WorkUpdate {
                    work,
                    refreshed_origins,
                }),
                Err(error) => {
                    warn!(url = %changed.primary.url(), error = %error, "Re-extraction failed");
                    delta.extraction_failures.push(ExtractionFailure {
                        url: changed.primary.url().to_string(),
                        error,
                    });
                }
            }
        }
        delta.changed = report.changed;

        info!(
            changed = delta.changed.len(),
            works = delta.works.len(),
            unchanged = delta.unchanged,
            "Update detection complete"
        );
        Ok(delta)
    }

    /// Write re-extracted works to the sink, appending any it does not hold yet.
    ///
    /// A stored work takes the fresh primary fields and primary tropes, and
    /// the fresh tropes of each refreshed sub-page. Tropes from sub-pages
    /// that were not refetched stay as stored.
    pub async fn apply_delta(&self, delta: &RegistryDelta, sink: &dyn Sink) -> CrawlResult<usize> {
        for update in &delta.works {
            let identity = update.work.url();
            match sink.get(identity).await? {
                Some(mut stored) => {
                    stored.apply_partial_update(update.work.clone(), &update.refreshed_origins);
                    sink.update(identity, &stored).await?;
                    debug!(url = %identity, refreshed = ?update.refreshed_origins, "Work updated");
                }
                None => {
                    sink.append(&update.work).await?;
                    debug!(url = %identity, "Work appended during update");
                }
            }
        }
        Ok(delta.works.len())
    }

    /// Discover, extract, and append every new work page in `category`.
    pub async fn harvest(&self, limit: DiscoveryLimit, category: &str, sink: &dyn Sink) -> CrawlResult<HarvestReport> {
        let mut discovery = self.discover(limit, category).await?;
        let mut report = HarvestReport {
            session_id: discovery.session_id(),
            candidates: discovery.candidates(),
            ..Default::default()
        };

        while let Some(found) = discovery.next().await {
            report.subpage_failures.extend(found.subpage_failures);
            if found.primary.page_type() != PageType::WorkPage {
                report.skipped_non_work += 1;
                continue;
            }

            let work = match self.extractor.extract_work(&found.primary, &found.subpages) {
                Ok(work) => work,
                Err(error) => {
                    warn!(url = %found.primary.url(), error = %error, "Extraction failed");
                    report.extraction_failures.push(ExtractionFailure {
                        url: found.primary.url().to_string(),
                        error,
                    });
                    continue;
                }
            };

            match sink.append(&work).await {
                Ok(()) => report.appended += 1,
                Err(SinkError::AlreadyExists { identity }) => {
                    debug!(url = %identity, "Work already in dataset");
                    report.already_stored += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        report.failures = discovery.failures();
        info!(
            session = %report.session_id,
            appended = report.appended,
            failed = report.failures.len() + report.extraction_failures.len(),
            subpages_unfetched = report.subpage_failures.len(),
            "Harvest complete"
        );
        Ok(report)
    }

    /// Refetch a changed work's sub-pages. Returns every registered
    /// sub-page, fetched where possible, and the origins that were refreshed.
    async fn refetch_subpages(
        &self,
        changed: &ChangedPage,
        request: &FetchRequest,
        failures: &mut Vec<CandidateFailure>,
    ) -> (Vec<Page>, Vec<String>) {
        if !self.config.fetch_subpages {
            return (changed.subpages.clone(), Vec::new());
        }

        let (subpages, failed) = fetch_each(self.registry.loader(), changed.subpages.clone(), request).await;
        failures.extend(failed);
        self.registry
            .record_subpage_hashes(changed.primary.url().as_str(), &subpages)
            .await;

        let mut refreshed = Vec::new();
        for subpage in subpages.iter().filter(|p| p.is_fetched()) {
            let origin = self.extractor.subpage_origin(subpage);
            if !refreshed.contains(&origin) {
                refreshed.push(origin);
            }
        }
        (subpages, refreshed)
    }
}

/// Fetch each page, keeping the ones that fail in place, unfetched.
async fn fetch_each(
    loader: &PageLoader,
    pages: Vec<Page>,
    request: &FetchRequest,
) -> (Vec<Page>, Vec<CandidateFailure>) {
    let outcomes = join_all(pages.into_iter().map(|page| async move {
        let unfetched = page.without_document();
        loader
            .fetch(page, request)
            .await
            .map_err(|error| (unfetched, error))
    }))
    .await;

    let mut pages = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(page) => pages.push(page),
            Err((page, error)) => {
                warn!(url = %page.url(), error = %error, "Sub-page fetch failed, keeping it unfetched");
                failures.push(CandidateFailure {
                    url: page.url().to_string(),
                    error,
                });
                pages.push(page);
            }
        }
    }
    (pages, failures)
}

/// Register one listing candidate and its sub-pages.
async fn discover_candidate(
    registry: &PageRegistry,
    extractor: &dyn Extractor,
    link: String,
    request: &FetchRequest,
    fetch_subpages: bool,
) -> Result<DiscoveredWork, CandidateFailure> {
    let fail = |error: PageError| {
        if error.is_skip_signal() {
            debug!(url = %link, error = %error, "Candidate skipped");
        } else {
            warn!(url = %link, error = %error, "Candidate failed");
        }
        CandidateFailure {
            url: link.clone(),
            error,
        }
    };

    let primary = registry
        .register_primary(&link, &FetchMode::now(request))
        .await
        .map_err(fail)?;

    let loader = registry.loader();
    let sub_links: Vec<String> = primary
        .document()
        .map(|document| extractor.subpage_links(document))
        .unwrap_or_default()
        .into_iter()
        .filter(|sub| match loader.classify(sub) {
            Ok(_) => true,
            Err(error) => {
                debug!(url = %sub, error = %error, "Dropping sub-page link");
                false
            }
        })
        .collect();

    let registered = registry
        .register_subpages(&link, &sub_links, &FetchMode::Deferred)
        .await
        .map_err(fail)?;

    let (subpages, subpage_failures) = if fetch_subpages {
        let (subpages, failures) = fetch_each(loader, registered, request).await;
        registry.record_subpage_hashes(&link, &subpages).await;
        (subpages, failures)
    } else {
        (registered, Vec::new())
    };

    debug!(
        url = %link,
        subpages = subpages.len(),
        unfetched = subpage_failures.len(),
        "Candidate registered"
    );
    Ok(DiscoveredWork {
        primary,
        subpages,
        subpage_failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::{HtmlExtractor, HtmlParser};
    use crate::sinks::MemorySink;
    use crate::testing::{html_page, listing_html, work_html, MockFetcher, WorkFixture};
    use crate::types::config::WikiConfig;
    use crate::types::trope::TropeCategory;

    const LISTING: &str = "https://wiki.example/list?n=Film";
    const FOO: &str = "https://wiki.example/work/Foo";
    const BAR: &str = "https://wiki.example/work/Bar";
    const BAZ: &str = "https://wiki.example/work/Baz";

    fn wiki() -> WikiConfig {
        WikiConfig::new("wiki.example")
            .with_work_prefix("/work/")
            .with_topic_prefix("/topic/")
            .with_listing("/list", "n={category}")
            .with_trope_namespace("trope", TropeCategory::Narrative)
    }

    fn work_page(title: &str, topic: &str) -> String {
        WorkFixture::new(title)
            .year("1999")
            .modified("2001-01-01T00:00:00Z")
            .subpage(format!("/work/{}", title), true)
            .subpage(topic, false)
            .trope("/trope/ChekhovsGun")
            .to_html()
    }

    fn fetcher() -> MockFetcher {
        MockFetcher::new()
            .with_page(LISTING, listing_html(&["/work/Foo", "/work/Bar", "/work/Baz"]))
            .with_page(FOO, work_page("Foo", "/topic/Foo"))
            .with_page(BAR, work_page("Bar", "/topic/Bar"))
            .with_page(BAZ, work_page("Baz", "/topic/Baz"))
            .with_page("https://wiki.example/topic/Foo", work_html("Foo", &["/trope/BigBad"]))
            .with_page("https://wiki.example/topic/Bar", work_html("Bar", &[]))
            .with_page("https://wiki.example/topic/Baz", work_html("Baz", &[]))
    }

    fn crawler(fetcher: MockFetcher, config: CrawlerConfig) -> Crawler {
        let loader = PageLoader::new(wiki(), fetcher, HtmlParser::new());
        let registry = Arc::new(PageRegistry::new(loader));
        Crawler::new(registry, HtmlExtractor::new(wiki()), config)
    }

    #[test]
    fn test_limit_from_signed() {
        assert_eq!(DiscoveryLimit::from_signed(-1), DiscoveryLimit::All);
        assert_eq!(DiscoveryLimit::from_signed(0), DiscoveryLimit::AtMost(0));
        assert_eq!(DiscoveryLimit::from_signed(5), DiscoveryLimit::AtMost(5));
        assert_eq!(
            DiscoveryLimit::from_signed(i64::MAX),
            DiscoveryLimit::AtMost(usize::try_from(i64::MAX).unwrap_or(usize::MAX))
        );
    }

    #[tokio::test]
    async fn test_discover_yields_in_listing_order() {
        let crawler = crawler(fetcher(), CrawlerConfig::new().with_concurrency(3));

        let discovery = crawler.discover(DiscoveryLimit::All, "Film").await.unwrap();
        assert_eq!(discovery.candidates(), 3);
        let found: Vec<DiscoveredWork> = discovery.collect().await;

        let urls: Vec<_> = found.iter().map(|f| f.primary.url().to_string()).collect();
        assert_eq!(urls, vec![FOO, BAR, BAZ]);
        assert_eq!(found[0].subpages.len(), 1);
        assert_eq!(found[0].subpages[0].page_type(), PageType::TopicPage);
        assert!(found[0].subpages[0].is_fetched());

        assert_eq!(crawler.registry().len().await, 3);
        assert_eq!(crawler.registry().subpages(FOO).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_discover_respects_limit() {
        let crawler = crawler(fetcher(), CrawlerConfig::new());
        let found: Vec<_> = crawler
            .discover(DiscoveryLimit::AtMost(2), "Film")
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(found.len(), 2);
        assert!(!crawler.registry().contains(BAZ).await);
    }

    #[tokio::test]
    async fn test_failed_candidate_is_recorded_and_skipped() {
        let fetcher = fetcher();
        fetcher.remove_page(BAR);
        let crawler = crawler(fetcher, CrawlerConfig::new());

        let mut discovery = crawler.discover(DiscoveryLimit::All, "Film").await.unwrap();
        let mut urls = Vec::new();
        while let Some(found) = discovery.next().await {
            urls.push(found.primary.url().to_string());
        }

        assert_eq!(urls, vec![FOO, BAZ]);
        let failures = discovery.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].url, BAR);
        assert!(matches!(failures[0].error, PageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_repeated_listing_link_is_a_duplicate() {
        let fetcher = fetcher().with_page(LISTING, listing_html(&["/work/Foo", "/work/Foo"]));
        let crawler = crawler(fetcher, CrawlerConfig::new().with_concurrency(1));

        let mut discovery = crawler.discover(DiscoveryLimit::All, "Film").await.unwrap();
        let mut count = 0;
        while discovery.next().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
        assert!(discovery.failures()[0].error.is_skip_signal());
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_discovery() {
        let fetcher = fetcher();
        fetcher.remove_page(LISTING);
        let crawler = crawler(fetcher, CrawlerConfig::new());

        let result = crawler.discover(DiscoveryLimit::All, "Film").await;
        assert!(matches!(result, Err(crate::error::CrawlError::Page(PageError::NotFound { .. }))));
    }

    #[tokio::test]
    async fn test_dropping_discovery_stops_fetching() {
        let fetcher = fetcher();
        let crawler = crawler(fetcher.clone(), CrawlerConfig::new().with_concurrency(1));

        let mut discovery = crawler.discover(DiscoveryLimit::All, "Film").await.unwrap();
        let first = discovery.next().await.unwrap();
        assert_eq!(first.primary.url().as_str(), FOO);
        drop(discovery);

        assert_eq!(fetcher.call_count(BAR), 0);
        assert_eq!(fetcher.call_count(BAZ), 0);
        assert!(!crawler.registry().contains(BAR).await);
    }

    #[tokio::test]
    async fn test_harvest_appends_works() {
        let crawler = crawler(fetcher(), CrawlerConfig::new());
        let sink = MemorySink::new();

        let report = crawler.harvest(DiscoveryLimit::All, "Film", &sink).await.unwrap();
        assert_eq!(report.appended, 3);
        assert!(report.failures.is_empty());

        let foo = sink.get(FOO).await.unwrap().unwrap();
        assert_eq!(foo.title(), "Foo");
        assert_eq!(foo.primary_tropes().count(), 1);
        assert_eq!(foo.tropes_from("topic").count(), 1);
    }

    #[tokio::test]
    async fn test_harvest_records_extraction_failures() {
        let fetcher = fetcher().with_page(BAR, html_page("Bar", "no release date"));
        let crawler = crawler(fetcher, CrawlerConfig::new());
        let sink = MemorySink::new();

        let report = crawler.harvest(DiscoveryLimit::All, "Film", &sink).await.unwrap();
        assert_eq!(report.appended, 2);
        assert_eq!(report.extraction_failures.len(), 1);
        assert_eq!(report.extraction_failures[0].url, BAR);
    }

    #[tokio::test]
    async fn test_detect_updates_reextracts_only_changed() {
        let fetcher = fetcher();
        let crawler = crawler(fetcher.clone(), CrawlerConfig::new());
        let sink = MemorySink::new();
        crawler.harvest(DiscoveryLimit::All, "Film", &sink).await.unwrap();

        let edited = WorkFixture::new("Foo")
            .year("1999")
            .modified("2999-01-01T00:00:00Z")
            .subpage("/topic/Foo", false)
            .trope("/trope/ChekhovsGun")
            .trope("/trope/RedHerring")
            .to_html();
        fetcher.set_page(FOO, edited);

        let known = crawler.registry().primaries().await;
        let delta = crawler.detect_updates(&known).await.unwrap();
        assert_eq!(delta.changed.len(), 1);
        assert_eq!(delta.unchanged, 2);
        assert_eq!(delta.works.len(), 1);
        assert_eq!(delta.works[0].work.primary_tropes().count(), 2);
        assert_eq!(delta.works[0].refreshed_origins, vec!["topic".to_string()]);

        assert_eq!(crawler.apply_delta(&delta, &sink).await.unwrap(), 1);
        let foo = sink.get(FOO).await.unwrap().unwrap();
        assert_eq!(foo.primary_tropes().count(), 2);
        assert_eq!(foo.tropes_from("topic").count(), 1);
    }

    fn bump_foo(fetcher: &MockFetcher) {
        let edited = WorkFixture::new("Foo")
            .year("1999")
            .modified("2999-01-01T00:00:00Z")
            .subpage("/topic/Foo", false)
            .trope("/trope/ChekhovsGun")
            .trope("/trope/RedHerring")
            .to_html();
        fetcher.set_page(FOO, edited);
    }

    #[tokio::test]
    async fn test_dead_subpage_link_does_not_block_work() {
        let fetcher = fetcher();
        fetcher.remove_page("https://wiki.example/topic/Foo");
        let crawler = crawler(fetcher.clone(), CrawlerConfig::new());
        let sink = MemorySink::new();

        let report = crawler.harvest(DiscoveryLimit::All, "Film", &sink).await.unwrap();
        assert_eq!(report.appended, 3);
        assert!(report.failures.is_empty());
        assert_eq!(report.subpage_failures.len(), 1);
        assert_eq!(report.subpage_failures[0].url, "https://wiki.example/topic/Foo");
        assert!(matches!(report.subpage_failures[0].error, PageError::NotFound { .. }));

        let foo = sink.get(FOO).await.unwrap().unwrap();
        assert_eq!(foo.primary_tropes().count(), 1);
        assert_eq!(foo.tropes_from("topic").count(), 0);
        assert_eq!(crawler.registry().subpages(FOO).await.unwrap().len(), 1);

        fetcher.set_page("https://wiki.example/topic/Foo", work_html("Foo", &["/trope/BigBad"]));
        bump_foo(&fetcher);
        let known = crawler.registry().primaries().await;
        let delta = crawler.detect_updates(&known).await.unwrap();
        crawler.apply_delta(&delta, &sink).await.unwrap();

        let foo = sink.get(FOO).await.unwrap().unwrap();
        assert_eq!(foo.tropes_from("topic").count(), 1);
    }

    #[tokio::test]
    async fn test_discovery_without_subpage_fetch() {
        let fetcher = fetcher();
        let crawler = crawler(fetcher.clone(), CrawlerConfig::new().with_fetch_subpages(false));

        let found: Vec<DiscoveredWork> = crawler
            .discover(DiscoveryLimit::AtMost(1), "Film")
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(found[0].subpages.len(), 1);
        assert!(!found[0].subpages[0].is_fetched());
        assert!(found[0].subpage_failures.is_empty());
        assert_eq!(fetcher.call_count("https://wiki.example/topic/Foo"), 0);
    }

    #[tokio::test]
    async fn test_update_keeps_tropes_of_failed_subpage() {
        let fetcher = fetcher();
        let crawler = crawler(fetcher.clone(), CrawlerConfig::new());
        let sink = MemorySink::new();
        crawler.harvest(DiscoveryLimit::All, "Film", &sink).await.unwrap();
        assert_eq!(sink.get(FOO).await.unwrap().unwrap().tropes_from("topic").count(), 1);

        bump_foo(&fetcher);
        fetcher.remove_page("https://wiki.example/topic/Foo");

        let known = crawler.registry().primaries().await;
        let delta = crawler.detect_updates(&known).await.unwrap();
        assert_eq!(delta.failures.len(), 1);
        assert_eq!(delta.failures[0].url, "https://wiki.example/topic/Foo");
        assert_eq!(delta.works.len(), 1);
        assert!(delta.works[0].refreshed_origins.is_empty());

        crawler.apply_delta(&delta, &sink).await.unwrap();
        let foo = sink.get(FOO).await.unwrap().unwrap();
        assert_eq!(foo.primary_tropes().count(), 2);
        assert_eq!(foo.tropes_from("topic").count(), 1);
        assert_eq!(foo.subpages(), ["https://wiki.example/topic/Foo"]);
    }

    #[tokio::test]
    async fn test_update_without_subpage_fetch_keeps_subpage_tropes() {
        let fetcher = fetcher();
        let harvester = crawler(fetcher.clone(), CrawlerConfig::new());
        let sink = MemorySink::new();
        harvester.harvest(DiscoveryLimit::All, "Film", &sink).await.unwrap();

        let updater = Crawler::new(
            Arc::clone(harvester.registry()),
            HtmlExtractor::new(wiki()),
            CrawlerConfig::new().with_fetch_subpages(false),
        );
        bump_foo(&fetcher);
        fetcher.reset_calls();

        let known = updater.registry().primaries().await;
        let delta = updater.detect_updates(&known).await.unwrap();
        assert_eq!(delta.works.len(), 1);
        assert_eq!(fetcher.call_count("https://wiki.example/topic/Foo"), 0);

        assert_eq!(updater.apply_delta(&delta, &sink).await.unwrap(), 1);
        let foo = sink.get(FOO).await.unwrap().unwrap();
        assert_eq!(foo.primary_tropes().count(), 2);
        assert_eq!(foo.tropes_from("topic").count(), 1);
    }

    #[tokio::test]
    async fn test_apply_delta_appends_unknown_work() {
        let fetcher = fetcher();
        let crawler = crawler(fetcher.clone(), CrawlerConfig::new());
        crawler.harvest(DiscoveryLimit::All, "Film", &MemorySink::new()).await.unwrap();

        bump_foo(&fetcher);
        let known = crawler.registry().primaries().await;
        let delta = crawler.detect_updates(&known).await.unwrap();

        let empty = MemorySink::new();
        assert_eq!(crawler.apply_delta(&delta, &empty).await.unwrap(), 1);
        let foo = empty.get(FOO).await.unwrap().unwrap();
        assert_eq!(foo.tropes_from("topic").count(), 1);
    }
}
