//! Regex-based HTML parsing and extraction for wiki pages.
//!
//! Markup conventions relied on:
//! - page title in `<h1 class="entry-title">`, falling back to `<title>`
//! - sub-page navigation anchors carry class `subpage-link`; the current
//!   sub-page also carries `curr-subpage`
//! - last edit time in `<meta property="article:modified_time" content="...">`
//! - release year in `<meta itemprop="datePublished" content="...">`, or the
//!   first plausible year in the page text
//! - tropes are anchors into a namespace listed in `WikiConfig::trope_namespaces`

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::debug;
use url::Url;

use crate::error::{ModelError, ModelResult, PageError, PageResult};
use crate::traits::extractor::Extractor;
use crate::traits::fetcher::DocumentParser;
use crate::types::config::WikiConfig;
use crate::types::page::{Document, Page, PageType};
use crate::types::trope::Trope;
use crate::types::work::Work;

/// Accepts any body that contains HTML markup.
pub struct HtmlParser {
    markup: Regex,
    title: Regex,
}

impl Default for HtmlParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlParser {
    pub fn new() -> Self {
        Self {
            markup: Regex::new(r"(?i)<(html|body|head)[\s>]").unwrap(),
            title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap(),
        }
    }
}

impl DocumentParser for HtmlParser {
    fn parse(&self, url: &Url, body: &str) -> PageResult<Document> {
        if !self.markup.is_match(body) {
            return Err(PageError::ParseFailure {
                url: url.to_string(),
                reason: "response has no HTML markup".to_string(),
            });
        }

        let title = self
            .title
            .captures(body)
            .and_then(|cap| cap.get(1))
            .map(|m| decode_entities(m.as_str().trim()))
            .filter(|t| !t.is_empty());

        Ok(Document::new(url.clone(), body, title))
    }
}

/// Anchor found in a document: resolved target plus its class attribute.
#[derive(Debug, Clone)]
struct Anchor {
    href: String,
    class: String,
}

/// Extracts links, edit times, and works from wiki HTML.
pub struct HtmlExtractor {
    config: WikiConfig,
    anchor: Regex,
    href: Regex,
    class: Regex,
    heading: Regex,
    tag: Regex,
    modified: Regex,
    published: Regex,
    year: Regex,
}

impl HtmlExtractor {
    pub fn new(config: WikiConfig) -> Self {
        Self {
            config,
            anchor: Regex::new(r"(?is)<a\s([^>]*)>").unwrap(),
            href: Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#).unwrap(),
            class: Regex::new(r#"(?i)class\s*=\s*["']([^"']*)["']"#).unwrap(),
            heading: Regex::new(r#"(?is)<h1[^>]*class\s*=\s*["'][^"']*entry-title[^"']*["'][^>]*>(.*?)</h1>"#).unwrap(),
            tag: Regex::new(r"<[^>]+>").unwrap(),
            modified: Regex::new(
                r#"(?i)<meta\s+property\s*=\s*["']article:modified_time["']\s+content\s*=\s*["']([^"']+)["']"#,
            )
            .unwrap(),
            published: Regex::new(
                r#"(?i)<meta\s+itemprop\s*=\s*["']datePublished["']\s+content\s*=\s*["']([^"']*)["']"#,
            )
            .unwrap(),
            year: Regex::new(r"\b(1[89]\d{2}|20\d{2})\b").unwrap(),
        }
    }

    /// Anchors in document order, resolved against the document URL and
    /// restricted to the wiki host.
    fn anchors(&self, document: &Document) -> Vec<Anchor> {
        let base = document.url();
        self.anchor
            .captures_iter(document.html())
            .filter_map(|cap| {
                let attrs = cap.get(1)?.as_str();
                let href = self.href.captures(attrs)?.get(1)?.as_str();
                if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:") {
                    return None;
                }
                let resolved = base.join(&decode_entities(href)).ok()?;
                if !resolved
                    .host_str()
                    .is_some_and(|h| h.eq_ignore_ascii_case(&self.config.host))
                {
                    return None;
                }
                let class = self
                    .class
                    .captures(attrs)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                Some(Anchor {
                    href: resolved.to_string(),
                    class,
                })
            })
            .collect()
    }

    fn extract_title(&self, primary: &Page, document: &Document) -> Option<String> {
        let heading = self
            .heading
            .captures(document.html())
            .and_then(|cap| cap.get(1))
            .map(|m| self.tag.replace_all(m.as_str(), "").to_string());

        heading
            .or_else(|| document.title().map(str::to_string))
            .map(|t| strip_namespace(&decode_entities(t.trim())))
            .filter(|t| !t.is_empty())
            .or_else(|| primary.slug().map(str::to_string))
    }

    fn extract_year(&self, document: &Document) -> String {
        if let Some(token) = self
            .published
            .captures(document.html())
            .and_then(|cap| cap.get(1))
        {
            return token.as_str().chars().take_while(|c| *c != '-').collect();
        }

        let text = self.tag.replace_all(document.html(), " ");
        self.year
            .captures(&text)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }

    /// Tropes linked from `document`, tagged with `origin`.
    fn extract_tropes(&self, document: &Document, origin: &str) -> Vec<Trope> {
        self.anchors(document)
            .into_iter()
            .filter_map(|anchor| {
                let page = Page::parse(&anchor.href, &self.config).ok()?;
                let category = self.config.trope_category(page.namespace()?)?;
                Trope::new(page.slug()?, category, origin).ok()
            })
            .collect()
    }
}

impl Extractor for HtmlExtractor {
    fn listing_links(&self, listing: &Document) -> Vec<String> {
        self.anchors(listing)
            .into_iter()
            .filter(|anchor| {
                Page::parse(&anchor.href, &self.config)
                    .map(|p| p.page_type() == PageType::WorkPage)
                    .unwrap_or(false)
            })
            .map(|anchor| anchor.href)
            .collect()
    }

    fn subpage_links(&self, page: &Document) -> Vec<String> {
        let own = page.url().as_str();
        self.anchors(page)
            .into_iter()
            .filter(|anchor| {
                let classes: Vec<&str> = anchor.class.split_whitespace().collect();
                classes.contains(&"subpage-link") && !classes.contains(&"curr-subpage")
            })
            .map(|anchor| anchor.href)
            .filter(|href| href != own)
            .collect()
    }

    fn last_updated(&self, page: &Document) -> Option<DateTime<Utc>> {
        let raw = self.modified.captures(page.html())?.get(1)?.as_str();
        DateTime::parse_from_rfc3339(raw.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }

    fn extract_work(&self, primary: &Page, subpages: &[Page]) -> ModelResult<Work> {
        let document = primary
            .document()
            .ok_or(ModelError::MissingValues { field: "document" })?;

        let year = self.extract_year(document);
        let title = self.extract_title(primary, document).unwrap_or_default();
        let media_type = primary.namespace().unwrap_or_default().to_string();
        let last_updated = self
            .last_updated(document)
            .unwrap_or_else(|| document.fetched_at());

        let mut work = Work::new(primary.url().as_str(), title, media_type, &year, last_updated)?
            .with_tropes(self.extract_tropes(document, ""))
            .with_subpages(subpages.iter().map(|p| p.url().to_string()));

        for subpage in subpages {
            let Some(subdocument) = subpage.document() else {
                debug!(url = %subpage.url(), "Sub-page not fetched, no tropes taken from it");
                continue;
            };
            let origin = self.subpage_origin(subpage);
            for trope in self.extract_tropes(subdocument, &origin) {
                work.add_trope(trope);
            }
        }

        debug!(
            url = %primary.url(),
            title = %work.title(),
            tropes = work.trope_count(),
            "Work extracted"
        );
        Ok(work)
    }
}

/// "Film / The Matrix" -> "The Matrix".
fn strip_namespace(title: &str) -> String {
    match title.split_once(" / ") {
        Some((_, rest)) => rest.trim().to_string(),
        None => title.to_string(),
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{html_page, listing_html, work_html, WorkFixture};
    use crate::types::trope::TropeCategory;

    fn wiki() -> WikiConfig {
        WikiConfig::new("wiki.example")
            .with_work_prefix("/work/")
            .with_topic_prefix("/topic/")
            .with_listing("/list", "n={category}")
            .with_trope_namespace("trope", TropeCategory::Narrative)
            .with_trope_namespace("genre", TropeCategory::Genre)
    }

    fn document(url: &str, html: &str) -> Document {
        HtmlParser::new().parse(&Url::parse(url).unwrap(), html).unwrap()
    }

    #[test]
    fn test_parser_rejects_non_html() {
        let url = Url::parse("https://wiki.example/work/Foo").unwrap();
        assert!(matches!(
            HtmlParser::new().parse(&url, "{\"json\": true}"),
            Err(PageError::ParseFailure { .. })
        ));
    }

    #[test]
    fn test_parser_reads_title() {
        let doc = document("https://wiki.example/work/Foo", &html_page("Foo &amp; Bar", ""));
        assert_eq!(doc.title(), Some("Foo & Bar"));
    }

    #[test]
    fn test_listing_links_keep_order_and_only_work_pages() {
        let html = listing_html(&[
            "/work/Foo",
            "/topic/NotAWork",
            "https://elsewhere.example/work/Off",
            "/work/Bar",
            "/work/Foo",
        ]);
        let extractor = HtmlExtractor::new(wiki());
        let links = extractor.listing_links(&document("https://wiki.example/list?n=Film", &html));
        assert_eq!(
            links,
            vec![
                "https://wiki.example/work/Foo",
                "https://wiki.example/work/Bar",
                "https://wiki.example/work/Foo",
            ]
        );
    }

    #[test]
    fn test_subpage_links_skip_current() {
        let html = WorkFixture::new("Foo")
            .subpage("/work/Foo", true)
            .subpage("/topic/Foo", false)
            .to_html();
        let extractor = HtmlExtractor::new(wiki());
        let links = extractor.subpage_links(&document("https://wiki.example/work/Foo", &html));
        assert_eq!(links, vec!["https://wiki.example/topic/Foo"]);
    }

    #[test]
    fn test_last_updated_reads_meta() {
        let html = WorkFixture::new("Foo").modified("2024-03-01T12:00:00Z").to_html();
        let extractor = HtmlExtractor::new(wiki());
        let updated = extractor
            .last_updated(&document("https://wiki.example/work/Foo", &html))
            .unwrap();
        assert_eq!(updated.to_rfc3339(), "2024-03-01T12:00:00+00:00");

        let bare = document("https://wiki.example/work/Bar", &html_page("Bar", ""));
        assert!(extractor.last_updated(&bare).is_none());
    }

    #[test]
    fn test_extract_work_collects_primary_and_subpage_tropes() {
        let config = wiki();
        let extractor = HtmlExtractor::new(config.clone());

        let primary = Page::parse("https://wiki.example/work/Foo", &config).unwrap();
        let primary_html = WorkFixture::new("Film / Foo")
            .year("1999")
            .trope("/trope/ChekhovsGun")
            .trope("/genre/Noir")
            .trope("/work/SomeOtherWork")
            .to_html();
        let primary = primary.clone().with_document(document(primary.url().as_str(), &primary_html));

        let sub = Page::parse("https://wiki.example/topic/Foo", &config).unwrap();
        let sub_html = work_html("Foo topics", &["/trope/ChekhovsGun", "/trope/BigBad"]);
        let sub = sub.clone().with_document(document(sub.url().as_str(), &sub_html));

        let work = extractor.extract_work(&primary, &[sub]).unwrap();
        assert_eq!(work.title(), "Foo");
        assert_eq!(work.release_year().value(), 1999);
        assert_eq!(work.media_type(), "work");

        let primary_titles: Vec<_> = work.primary_tropes().map(|t| t.title()).collect();
        assert_eq!(primary_titles, vec!["ChekhovsGun", "Noir"]);

        let sub_titles: Vec<_> = work.tropes_from("topic").map(|t| t.title()).collect();
        assert_eq!(sub_titles, vec!["ChekhovsGun", "BigBad"]);
        assert_eq!(work.subpages(), &["https://wiki.example/topic/Foo".to_string()]);
    }

    #[test]
    fn test_extract_work_requires_document() {
        let config = wiki();
        let extractor = HtmlExtractor::new(config.clone());
        let primary = Page::parse("https://wiki.example/work/Foo", &config).unwrap();
        assert_eq!(
            extractor.extract_work(&primary, &[]),
            Err(ModelError::MissingValues { field: "document" })
        );
    }

    #[test]
    fn test_extract_work_without_year_fails() {
        let config = wiki();
        let extractor = HtmlExtractor::new(config.clone());
        let primary = Page::parse("https://wiki.example/work/Foo", &config).unwrap();
        let primary = primary
            .clone()
            .with_document(document(primary.url().as_str(), &html_page("Foo", "no dates here")));
        assert!(matches!(
            extractor.extract_work(&primary, &[]),
            Err(ModelError::InvalidYear { .. })
        ));
    }

    #[test]
    fn test_strip_namespace() {
        assert_eq!(strip_namespace("Film / The Matrix"), "The Matrix");
        assert_eq!(strip_namespace("The Matrix"), "The Matrix");
    }
}
