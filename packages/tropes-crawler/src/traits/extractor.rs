//! Extraction collaborator: reads fields out of fetched documents.

use chrono::{DateTime, Utc};

use crate::error::ModelResult;
use crate::types::page::{Document, Page};
use crate::types::work::Work;

/// Reads links, change signals, and works out of documents.
///
/// The crawler never looks inside a `Document` itself; everything it needs
/// from page content comes through this trait.
pub trait Extractor: Send + Sync {
    /// Candidate primary-page links on a listing page, in page order.
    fn listing_links(&self, listing: &Document) -> Vec<String>;

    /// Sub-page links on a work page, in page order.
    fn subpage_links(&self, page: &Document) -> Vec<String>;

    /// When the page says it was last edited, if it says so.
    fn last_updated(&self, page: &Document) -> Option<DateTime<Utc>>;

    /// Assemble a work from a fetched primary page and its sub-pages.
    ///
    /// Unfetched sub-pages contribute no tropes.
    fn extract_work(&self, primary: &Page, subpages: &[Page]) -> ModelResult<Work>;

    /// Origin label given to tropes found on `subpage`.
    fn subpage_origin(&self, subpage: &Page) -> String {
        subpage.namespace().unwrap_or_default().to_string()
    }
}
