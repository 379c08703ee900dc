//! Page registry: which primary pages we know, their sub-pages, and when
//! each was last seen.
//!
//! The registry is the only shared mutable state in a crawl. Every insertion
//! runs its duplicate check and insert inside one write-lock critical
//! section; network fetches happen before the lock is taken.

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{PageError, PageResult};
use crate::loader::{FetchMode, PageLoader};
use crate::traits::extractor::Extractor;
use crate::types::config::FetchRequest;
use crate::types::page::Page;

/// A page plus what the registry remembers about it.
#[derive(Debug, Clone)]
pub struct TrackedPage {
    /// Classified page; documents are not retained
    pub page: Page,

    /// When the page was registered or last found changed
    pub last_seen: DateTime<Utc>,

    /// SHA-256 of the last fetched body, if the page was ever fetched
    pub content_hash: Option<String>,
}

impl TrackedPage {
    fn new(page: &Page) -> Self {
        Self {
            page: page.without_document(),
            last_seen: Utc::now(),
            content_hash: page.document().map(|d| d.content_hash().to_string()),
        }
    }
}

/// One primary page and the sub-pages registered under it.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub primary: TrackedPage,

    /// Keyed by the sub-page URL string as supplied
    pub subpages: IndexMap<String, TrackedPage>,
}

impl RegistryEntry {
    fn new(primary: &Page) -> Self {
        Self {
            primary: TrackedPage::new(primary),
            subpages: IndexMap::new(),
        }
    }

    pub fn subpage_pages(&self) -> Vec<Page> {
        self.subpages.values().map(|t| t.page.clone()).collect()
    }
}

/// A page that failed during a batch operation and was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFailure {
    pub url: String,
    pub error: PageError,
}

/// A known primary page whose content has moved on since it was last seen.
#[derive(Debug, Clone)]
pub struct ChangedPage {
    /// Freshly fetched primary page
    pub primary: Page,

    /// Registered sub-pages (unfetched), in registration order
    pub subpages: Vec<Page>,

    /// Stored timestamp before this pass
    pub previous_seen: DateTime<Utc>,

    /// Last-updated signal read from the page; `None` when the content hash decided
    pub signal: Option<DateTime<Utc>>,
}

/// Outcome of a change-detection pass.
#[derive(Debug, Clone, Default)]
pub struct ChangeReport {
    pub changed: Vec<ChangedPage>,
    pub unchanged: usize,
    pub failed: Vec<CandidateFailure>,
}

impl ChangeReport {
    pub fn checked(&self) -> usize {
        self.changed.len() + self.unchanged
    }
}

/// Registry of known primary pages, keyed by exact URL string.
pub struct PageRegistry {
    loader: PageLoader,
    entries: RwLock<IndexMap<String, RegistryEntry>>,
}

impl PageRegistry {
    pub fn new(loader: PageLoader) -> Self {
        Self {
            loader,
            entries: RwLock::new(IndexMap::new()),
        }
    }

    pub fn loader(&self) -> &PageLoader {
        &self.loader
    }

    /// Register a primary page.
    ///
    /// Fails with `DuplicatePage` when the exact URL string is already
    /// registered; callers treat that as "skip", not as a fault. Returns the
    /// page with its document attached when `mode` fetched it.
    pub async fn register_primary(&self, raw: &str, mode: &FetchMode) -> PageResult<Page> {
        let page = self.loader.classify(raw)?;
        if !page.page_type().is_primary() {
            return Err(PageError::NotPrimary { url: raw.to_string() });
        }

        // Cheap early exit so duplicates are not fetched again.
        if self.entries.read().await.contains_key(raw) {
            return Err(PageError::DuplicatePage { url: raw.to_string() });
        }

        let page = match mode {
            FetchMode::Deferred => page,
            FetchMode::Now(request) => self.loader.fetch(page, request).await?,
        };

        let mut entries = self.entries.write().await;
        if entries.contains_key(raw) {
            return Err(PageError::DuplicatePage { url: raw.to_string() });
        }
        entries.insert(raw.to_string(), RegistryEntry::new(&page));
        debug!(url = %raw, page_type = %page.page_type(), total = entries.len(), "Registered primary page");

        Ok(page)
    }

    /// Register sub-pages under an already registered primary page.
    ///
    /// All-or-nothing: the first invalid or unfetchable sub-URL aborts the
    /// call with its error and nothing is registered. An empty list is
    /// valid. Re-registering a known sub-page refreshes its timestamp.
    pub async fn register_subpages<S: AsRef<str>>(
        &self,
        primary: &str,
        subpages: &[S],
        mode: &FetchMode,
    ) -> PageResult<Vec<Page>> {
        if !self.entries.read().await.contains_key(primary) {
            return Err(PageError::NotFound { url: primary.to_string() });
        }

        let pages = subpages
            .iter()
            .map(|raw| self.loader.classify(raw.as_ref()))
            .collect::<PageResult<Vec<_>>>()?;

        let pages = match mode {
            FetchMode::Deferred => pages,
            FetchMode::Now(request) => {
                try_join_all(pages.into_iter().map(|page| self.loader.fetch(page, request))).await?
            }
        };

        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(primary)
            .ok_or_else(|| PageError::NotFound { url: primary.to_string() })?;
        for (raw, page) in subpages.iter().zip(&pages) {
            entry
                .subpages
                .insert(raw.as_ref().to_string(), TrackedPage::new(page));
        }
        debug!(url = %primary, added = pages.len(), subpages = entry.subpages.len(), "Registered sub-pages");

        Ok(pages)
    }

    /// Remember the content hashes of sub-pages fetched after registration.
    ///
    /// Unfetched pages and pages not registered under `primary` are ignored.
    pub async fn record_subpage_hashes(&self, primary: &str, pages: &[Page]) {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(primary) else {
            return;
        };
        for page in pages {
            let Some(document) = page.document() else {
                continue;
            };
            if let Some(tracked) = entry.subpages.get_mut(page.url().as_str()) {
                tracked.content_hash = Some(document.content_hash().to_string());
            }
        }
    }

    /// Re-fetch known primary pages and report those that changed.
    ///
    /// A page has changed when its last-updated signal is later than the
    /// stored timestamp, or, for pages without a signal, when its content
    /// hash differs from the stored one. A page registered without a fetch
    /// has no stored hash; its first check only records the baseline and is
    /// reported unchanged. Every URL must already be
    /// registered (`NotFound` otherwise, checked before any fetch).
    /// `AccessDenied` aborts the pass; other fetch failures are recorded
    /// and the page is skipped. Changed pages get a fresh timestamp; nothing
    /// is written unless the pass completes.
    pub async fn detect_changes<S: AsRef<str>>(
        &self,
        known: &[S],
        extractor: &dyn Extractor,
        request: &FetchRequest,
    ) -> PageResult<ChangeReport> {
        let mut targets = Vec::with_capacity(known.len());
        {
            let entries = self.entries.read().await;
            for raw in known {
                let raw = raw.as_ref();
                let page = self.loader.classify(raw)?;
                let entry = entries
                    .get(raw)
                    .ok_or_else(|| PageError::NotFound { url: raw.to_string() })?;
                targets.push((raw.to_string(), page, entry.clone()));
            }
        }

        let mut report = ChangeReport::default();
        let mut hashes = Vec::new();

        for (raw, page, entry) in targets {
            let fresh = match self.loader.fetch(page, request).await {
                Ok(fresh) => fresh,
                Err(error @ PageError::AccessDenied { .. }) => {
                    warn!(url = %raw, "Access denied during change detection, aborting pass");
                    return Err(error);
                }
                Err(error) => {
                    warn!(url = %raw, error = %error, "Skipping page during change detection");
                    report.failed.push(CandidateFailure { url: raw, error });
                    continue;
                }
            };

            let Some(document) = fresh.document() else {
                continue;
            };
            let stored = &entry.primary;
            let signal = extractor.last_updated(document);
            let changed = match signal {
                Some(updated) => updated > stored.last_seen,
                None => stored
                    .content_hash
                    .as_deref()
                    .is_some_and(|hash| hash != document.content_hash()),
            };
            hashes.push((raw.clone(), document.content_hash().to_string(), changed));

            if changed {
                debug!(url = %raw, previous = %stored.last_seen, ?signal, "Page changed");
                report.changed.push(ChangedPage {
                    primary: fresh.clone(),
                    subpages: entry.subpage_pages(),
                    previous_seen: stored.last_seen,
                    signal,
                });
            } else {
                report.unchanged += 1;
            }
        }

        let now = Utc::now();
        let mut entries = self.entries.write().await;
        for (raw, hash, changed) in hashes {
            if let Some(entry) = entries.get_mut(&raw) {
                entry.primary.content_hash = Some(hash);
                if changed {
                    entry.primary.last_seen = now;
                }
            }
        }

        info!(
            checked = report.checked(),
            changed = report.changed.len(),
            failed = report.failed.len(),
            "Change detection complete"
        );
        Ok(report)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn contains(&self, raw: &str) -> bool {
        self.entries.read().await.contains_key(raw)
    }

    pub async fn entry(&self, raw: &str) -> Option<RegistryEntry> {
        self.entries.read().await.get(raw).cloned()
    }

    /// Sub-pages registered under `primary`, in registration order.
    pub async fn subpages(&self, primary: &str) -> Option<Vec<Page>> {
        self.entries.read().await.get(primary).map(RegistryEntry::subpage_pages)
    }

    pub async fn last_seen(&self, raw: &str) -> Option<DateTime<Utc>> {
        self.entries.read().await.get(raw).map(|e| e.primary.last_seen)
    }

    /// Registered primary URLs, in registration order.
    pub async fn primaries(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    /// Serializable copy of the registry state.
    pub async fn snapshot(&self) -> RegistrySnapshot {
        let entries = self.entries.read().await;
        RegistrySnapshot {
            saved_at: Utc::now(),
            entries: entries
                .iter()
                .map(|(url, entry)| EntrySnapshot {
                    url: url.clone(),
                    last_seen: entry.primary.last_seen,
                    content_hash: entry.primary.content_hash.clone(),
                    subpages: entry
                        .subpages
                        .iter()
                        .map(|(url, tracked)| SubpageSnapshot {
                            url: url.clone(),
                            last_seen: tracked.last_seen,
                            content_hash: tracked.content_hash.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    /// Rebuild a registry from a snapshot.
    ///
    /// Every URL is re-validated against the loader's wiki layout; a
    /// repeated primary URL fails with `DuplicatePage`.
    pub fn restore(loader: PageLoader, snapshot: RegistrySnapshot) -> PageResult<Self> {
        let mut entries = IndexMap::with_capacity(snapshot.entries.len());

        for saved in snapshot.entries {
            if entries.contains_key(&saved.url) {
                return Err(PageError::DuplicatePage { url: saved.url });
            }
            let primary = loader.classify(&saved.url)?;
            if !primary.page_type().is_primary() {
                return Err(PageError::NotPrimary { url: saved.url });
            }

            let mut subpages = IndexMap::with_capacity(saved.subpages.len());
            for sub in saved.subpages {
                let page = loader.classify(&sub.url)?;
                subpages.insert(
                    sub.url,
                    TrackedPage {
                        page,
                        last_seen: sub.last_seen,
                        content_hash: sub.content_hash,
                    },
                );
            }

            entries.insert(
                saved.url,
                RegistryEntry {
                    primary: TrackedPage {
                        page: primary,
                        last_seen: saved.last_seen,
                        content_hash: saved.content_hash,
                    },
                    subpages,
                },
            );
        }

        info!(entries = entries.len(), "Registry restored from snapshot");
        Ok(Self {
            loader,
            entries: RwLock::new(entries),
        })
    }
}

/// Persistable registry state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub saved_at: DateTime<Utc>,
    pub entries: Vec<EntrySnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub url: String,
    pub last_seen: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub subpages: Vec<SubpageSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubpageSnapshot {
    pub url: String,
    pub last_seen: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}
