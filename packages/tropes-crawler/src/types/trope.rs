//! Tropes - reusable tagged attributes attached to works.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, ModelResult};

/// Fixed set of trope categories.
///
/// `Unknown` is the sentinel produced when parsing fails; it is never a
/// valid category for a constructed trope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TropeCategory {
    #[default]
    Unknown,
    Genre,
    Medium,
    Narrative,
    Topical,
}

impl TropeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TropeCategory::Unknown => "unknown",
            TropeCategory::Genre => "genre",
            TropeCategory::Medium => "medium",
            TropeCategory::Narrative => "narrative",
            TropeCategory::Topical => "topical",
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, TropeCategory::Unknown)
    }
}

impl fmt::Display for TropeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TropeCategory {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "genre" => Ok(TropeCategory::Genre),
            "medium" => Ok(TropeCategory::Medium),
            "narrative" => Ok(TropeCategory::Narrative),
            "topical" => Ok(TropeCategory::Topical),
            _ => Err(ModelError::UnknownCategory {
                category: s.to_string(),
            }),
        }
    }
}

/// Identity of a trope within one work: title plus the sub-page it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TropeKey {
    pub title: String,
    pub subpage_origin: String,
}

/// A tagged attribute found on a work's primary page or one of its sub-pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trope {
    title: String,
    category: TropeCategory,
    subpage_origin: String,
}

impl Trope {
    /// Build a trope. An empty `subpage_origin` marks a primary-page trope.
    ///
    /// Fails with `MissingValues` when the title is empty and with
    /// `UnknownCategory` when the category is the sentinel.
    pub fn new(
        title: impl Into<String>,
        category: TropeCategory,
        subpage_origin: impl Into<String>,
    ) -> ModelResult<Self> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(ModelError::MissingValues { field: "title" });
        }
        if !category.is_recognized() {
            return Err(ModelError::UnknownCategory {
                category: category.to_string(),
            });
        }

        Ok(Self {
            title,
            category,
            subpage_origin: subpage_origin.into(),
        })
    }

    /// Primary-page trope.
    pub fn primary(title: impl Into<String>, category: TropeCategory) -> ModelResult<Self> {
        Self::new(title, category, "")
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn category(&self) -> TropeCategory {
        self.category
    }

    pub fn subpage_origin(&self) -> &str {
        &self.subpage_origin
    }

    pub fn is_primary(&self) -> bool {
        self.subpage_origin.is_empty()
    }

    pub fn key(&self) -> TropeKey {
        TropeKey {
            title: self.title.clone(),
            subpage_origin: self.subpage_origin.clone(),
        }
    }
}
