//! Testing utilities: a scripted fetcher and HTML fixture builders.
//!
//! Lets registry and crawler code run end to end without touching the
//! network.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use url::Url;

use crate::error::FetchError;
use crate::traits::fetcher::{FetchResponse, Fetcher};
use crate::types::config::FetchRequest;

/// Fetcher that serves canned responses by exact URL.
///
/// Unknown URLs get a 404. Clones share pages and call history, so a test
/// can hand one clone to the loader and keep another for assertions or
/// for changing pages between crawls.
#[derive(Default, Clone)]
pub struct MockFetcher {
    responses: Arc<RwLock<HashMap<String, FetchResponse>>>,
    failures: Arc<RwLock<HashMap<String, String>>>,
    calls: Arc<RwLock<Vec<String>>>,
    delay: Option<Duration>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with status 200 for `url`.
    pub fn with_page(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.set_page(url, body);
        self
    }

    /// Serve an empty body with `status` for `url`.
    pub fn with_status(self, url: impl Into<String>, status: u16) -> Self {
        self.responses
            .write()
            .unwrap()
            .insert(url.into(), FetchResponse::new(status, ""));
        self
    }

    /// Fail requests for `url` with a network error.
    pub fn with_network_error(self, url: impl Into<String>, reason: impl Into<String>) -> Self {
        self.failures.write().unwrap().insert(url.into(), reason.into());
        self
    }

    /// Sleep this long before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace (or add) the page served for `url`.
    pub fn set_page(&self, url: impl Into<String>, body: impl Into<String>) {
        self.responses
            .write()
            .unwrap()
            .insert(url.into(), FetchResponse::ok(body));
    }

    /// Stop serving `url`; later requests get a 404.
    pub fn remove_page(&self, url: &str) {
        self.responses.write().unwrap().remove(url);
    }

    /// URLs requested so far, in request order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    /// How many times `url` was requested.
    pub fn call_count(&self, url: &str) -> usize {
        self.calls.read().unwrap().iter().filter(|c| *c == url).count()
    }

    pub fn reset_calls(&self) {
        self.calls.write().unwrap().clear();
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &Url, _request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        self.calls.write().unwrap().push(url.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(reason) = self.failures.read().unwrap().get(url.as_str()) {
            return Err(FetchError::Network {
                url: url.to_string(),
                source: reason.clone().into(),
            });
        }

        let response = self
            .responses
            .read()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .unwrap_or_else(|| FetchResponse::new(404, ""));
        Ok(response)
    }
}

/// Minimal HTML page with a `<title>` and the given body markup.
pub fn html_page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{}</title></head>\n<body>\n{}\n</body>\n</html>",
        title, body
    )
}

/// Listing page linking to each href, in order.
pub fn listing_html(hrefs: &[&str]) -> String {
    let items: String = hrefs
        .iter()
        .map(|href| format!("<li><a class=\"twikilink\" href=\"{}\">{}</a></li>\n", href, href))
        .collect();
    html_page("Page List", &format!("<ul>\n{}</ul>", items))
}

/// Plain page linking to each trope href.
pub fn work_html(title: &str, trope_hrefs: &[&str]) -> String {
    let mut fixture = WorkFixture::new(title);
    for href in trope_hrefs {
        fixture = fixture.trope(*href);
    }
    fixture.to_html()
}

/// Builder for a wiki work page.
#[derive(Debug, Clone, Default)]
pub struct WorkFixture {
    title: String,
    year: Option<String>,
    modified: Option<String>,
    tropes: Vec<String>,
    subpages: Vec<(String, bool)>,
}

impl WorkFixture {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Publish date meta tag with this year.
    pub fn year(mut self, year: impl Into<String>) -> Self {
        self.year = Some(year.into());
        self
    }

    /// Last-modified meta tag (RFC 3339).
    pub fn modified(mut self, timestamp: impl Into<String>) -> Self {
        self.modified = Some(timestamp.into());
        self
    }

    pub fn trope(mut self, href: impl Into<String>) -> Self {
        self.tropes.push(href.into());
        self
    }

    /// Sub-page navigation link; `current` marks the page being viewed.
    pub fn subpage(mut self, href: impl Into<String>, current: bool) -> Self {
        self.subpages.push((href.into(), current));
        self
    }

    pub fn to_html(&self) -> String {
        let mut head = format!("<title>{}</title>\n", self.title);
        if let Some(modified) = &self.modified {
            head.push_str(&format!(
                "<meta property=\"article:modified_time\" content=\"{}\">\n",
                modified
            ));
        }
        if let Some(year) = &self.year {
            head.push_str(&format!("<meta itemprop=\"datePublished\" content=\"{}\">\n", year));
        }

        let mut body = format!("<h1 class=\"entry-title\">{}</h1>\n", self.title);
        if !self.subpages.is_empty() {
            body.push_str("<nav class=\"subpage-links\">\n");
            for (href, current) in &self.subpages {
                let class = if *current {
                    "subpage-link curr-subpage"
                } else {
                    "subpage-link"
                };
                body.push_str(&format!("<a class=\"{}\" href=\"{}\">{}</a>\n", class, href, href));
            }
            body.push_str("</nav>\n");
        }
        body.push_str("<div id=\"main-article\"><ul>\n");
        for href in &self.tropes {
            body.push_str(&format!("<li><a class=\"twikilink\" href=\"{}\">{}</a></li>\n", href, href));
        }
        body.push_str("</ul></div>\n");

        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n{}</head>\n<body>\n{}</body>\n</html>",
            head, body
        )
    }
}
