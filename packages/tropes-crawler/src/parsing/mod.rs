//! HTML parsing and extraction collaborators.

mod html;

pub use html::{HtmlExtractor, HtmlParser};
