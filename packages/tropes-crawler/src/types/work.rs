//! Works - one tracked content item and the tropes found on its pages.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ModelError, ModelResult};
use crate::types::trope::{Trope, TropeKey};

/// Four-digit release year, validated from a text token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseYear(u16);

impl ReleaseYear {
    /// Parse a token such as "1999".
    ///
    /// Surrounding whitespace is ignored. Fails with `InvalidYear` unless
    /// what remains is exactly four ASCII digits, so "99", "12345" and
    /// "-199" are all rejected.
    pub fn parse(token: &str) -> ModelResult<Self> {
        let trimmed = token.trim();
        if trimmed.len() != 4 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ModelError::InvalidYear {
                token: token.to_string(),
            });
        }
        trimmed
            .parse()
            .map(Self)
            .map_err(|_| ModelError::InvalidYear {
                token: token.to_string(),
            })
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for ReleaseYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

/// One content item (film, series, game) and its tropes.
///
/// Primary-page tropes are keyed by title; sub-page tropes by
/// `(title, subpage_origin)`, so the same trope may appear once under
/// each sub-page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WorkRecord", try_from = "WorkRecord")]
pub struct Work {
    url: String,
    title: String,
    media_type: String,
    release_year: ReleaseYear,
    last_updated: DateTime<Utc>,
    primary_tropes: IndexMap<String, Trope>,
    sub_tropes: IndexMap<TropeKey, Trope>,
    subpages: Vec<String>,
}

impl Work {
    /// Build a work with no tropes.
    ///
    /// The year is validated first, then the required text fields. Nothing
    /// is returned unless every field is valid.
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        media_type: impl Into<String>,
        year_token: &str,
        last_updated: DateTime<Utc>,
    ) -> ModelResult<Self> {
        let release_year = ReleaseYear::parse(year_token)?;

        let url = url.into();
        let title = title.into();
        if url.trim().is_empty() {
            return Err(ModelError::MissingValues { field: "url" });
        }
        if title.trim().is_empty() {
            return Err(ModelError::MissingValues { field: "title" });
        }

        Ok(Self {
            url,
            title,
            media_type: media_type.into(),
            release_year,
            last_updated,
            primary_tropes: IndexMap::new(),
            sub_tropes: IndexMap::new(),
            subpages: Vec::new(),
        })
    }

    /// Add tropes while building (builder pattern).
    pub fn with_tropes(mut self, tropes: impl IntoIterator<Item = Trope>) -> Self {
        for trope in tropes {
            self.add_trope(trope);
        }
        self
    }

    /// Record the sub-page URLs this work was assembled from.
    pub fn with_subpages(mut self, subpages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.subpages = subpages.into_iter().map(Into::into).collect();
        self
    }

    /// Add a trope to the primary or sub-page set.
    ///
    /// Returns false when a trope with the same key was already present.
    pub fn add_trope(&mut self, trope: Trope) -> bool {
        if trope.is_primary() {
            if self.primary_tropes.contains_key(trope.title()) {
                return false;
            }
            self.primary_tropes.insert(trope.title().to_string(), trope);
        } else {
            let key = trope.key();
            if self.sub_tropes.contains_key(&key) {
                return false;
            }
            self.sub_tropes.insert(key, trope);
        }
        true
    }

    /// Replace this work's contents with a fresh extraction of the same page.
    ///
    /// Identity (URL) is kept; everything else comes from `fresh`.
    pub fn apply_update(&mut self, fresh: Work) {
        self.title = fresh.title;
        self.media_type = fresh.media_type;
        self.release_year = fresh.release_year;
        self.last_updated = fresh.last_updated;
        self.primary_tropes = fresh.primary_tropes;
        self.sub_tropes = fresh.sub_tropes;
        self.subpages = fresh.subpages;
    }

    /// Merge a re-extraction that only saw some of the sub-pages.
    ///
    /// Primary fields and primary tropes come from `fresh`. Sub-page tropes
    /// are replaced for each origin in `refreshed` and kept for every other
    /// origin.
    pub fn apply_partial_update(&mut self, fresh: Work, refreshed: &[String]) {
        for origin in refreshed {
            self.replace_subpage_tropes(origin, fresh.tropes_from(origin).cloned());
        }
        for subpage in &fresh.subpages {
            if !self.subpages.contains(subpage) {
                self.subpages.push(subpage.clone());
            }
        }
        self.title = fresh.title;
        self.media_type = fresh.media_type;
        self.release_year = fresh.release_year;
        self.last_updated = fresh.last_updated;
        self.primary_tropes = fresh.primary_tropes;
    }

    /// Replace only the tropes that came from one sub-page.
    pub fn replace_subpage_tropes(&mut self, origin: &str, tropes: impl IntoIterator<Item = Trope>) {
        self.sub_tropes.retain(|key, _| key.subpage_origin != origin);
        for trope in tropes.into_iter().filter(|t| t.subpage_origin() == origin) {
            self.sub_tropes.insert(trope.key(), trope);
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn release_year(&self) -> ReleaseYear {
        self.release_year
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn subpages(&self) -> &[String] {
        &self.subpages
    }

    pub fn primary_tropes(&self) -> impl Iterator<Item = &Trope> {
        self.primary_tropes.values()
    }

    pub fn sub_tropes(&self) -> impl Iterator<Item = &Trope> {
        self.sub_tropes.values()
    }

    /// Tropes found on one sub-page.
    pub fn tropes_from<'a>(&'a self, origin: &'a str) -> impl Iterator<Item = &'a Trope> + 'a {
        self.sub_tropes
            .values()
            .filter(move |t| t.subpage_origin() == origin)
    }

    pub fn trope_count(&self) -> usize {
        self.primary_tropes.len() + self.sub_tropes.len()
    }
}

/// Flat serialized form of a work.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkRecord {
    url: String,
    title: String,
    media_type: String,
    release_year: ReleaseYear,
    last_updated: DateTime<Utc>,
    #[serde(default)]
    subpages: Vec<String>,
    #[serde(default)]
    tropes: Vec<Trope>,
}

impl From<Work> for WorkRecord {
    fn from(work: Work) -> Self {
        let tropes = work
            .primary_tropes
            .into_values()
            .chain(work.sub_tropes.into_values())
            .collect();
        Self {
            url: work.url,
            title: work.title,
            media_type: work.media_type,
            release_year: work.release_year,
            last_updated: work.last_updated,
            subpages: work.subpages,
            tropes,
        }
    }
}

impl TryFrom<WorkRecord> for Work {
    type Error = ModelError;

    fn try_from(record: WorkRecord) -> Result<Self, Self::Error> {
        let mut work = Work::new(
            record.url,
            record.title,
            record.media_type,
            &record.release_year.to_string(),
            record.last_updated,
        )?;
        for trope in record.tropes {
            let trope = Trope::new(trope.title(), trope.category(), trope.subpage_origin())?;
            work.add_trope(trope);
        }
        work.subpages = record.subpages;
        Ok(work)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::trope::TropeCategory;

    fn work(year: &str) -> ModelResult<Work> {
        Work::new(
            "https://tvtropes.org/pmwiki/pmwiki.php/Film/TheMatrix",
            "The Matrix",
            "Film",
            year,
            Utc::now(),
        )
    }

    #[test]
    fn test_year_must_be_numeric() {
        assert!(work("1999").is_ok());
        assert!(matches!(work("19x9"), Err(ModelError::InvalidYear { .. })));
        assert!(matches!(work(""), Err(ModelError::InvalidYear { .. })));
        assert!(matches!(work("-199"), Err(ModelError::InvalidYear { .. })));
    }

    #[test]
    fn test_year_must_have_four_digits() {
        assert_eq!(work(" 0999 ").unwrap().release_year().value(), 999);
        assert!(matches!(work("99"), Err(ModelError::InvalidYear { .. })));
        assert!(matches!(work("1"), Err(ModelError::InvalidYear { .. })));
        assert!(matches!(work("12345"), Err(ModelError::InvalidYear { .. })));
    }

    #[test]
    fn test_invalid_year_reported_even_with_missing_title() {
        let err = Work::new("u", "", "Film", "abcd", Utc::now()).unwrap_err();
        assert!(matches!(err, ModelError::InvalidYear { .. }));
    }

    #[test]
    fn test_missing_title() {
        let err = Work::new("u", "  ", "Film", "1999", Utc::now()).unwrap_err();
        assert_eq!(err, ModelError::MissingValues { field: "title" });
    }

    #[test]
    fn test_trope_membership_is_keyed_by_title_and_origin() {
        let mut work = work("1999").unwrap();
        let gun = Trope::primary("ChekhovsGun", TropeCategory::Narrative).unwrap();
        assert!(work.add_trope(gun.clone()));
        assert!(!work.add_trope(gun));

        let on_characters = Trope::new("BigBad", TropeCategory::Narrative, "Characters").unwrap();
        let on_trivia = Trope::new("BigBad", TropeCategory::Narrative, "Trivia").unwrap();
        assert!(work.add_trope(on_characters.clone()));
        assert!(work.add_trope(on_trivia));
        assert!(!work.add_trope(on_characters));

        assert_eq!(work.primary_tropes().count(), 1);
        assert_eq!(work.sub_tropes().count(), 2);
        assert_eq!(work.tropes_from("Characters").count(), 1);
    }

    #[test]
    fn test_replace_subpage_tropes_is_scoped() {
        let mut work = work("1999").unwrap().with_tropes([
            Trope::new("BigBad", TropeCategory::Narrative, "Characters").unwrap(),
            Trope::new("CreatorCameo", TropeCategory::Topical, "Trivia").unwrap(),
        ]);

        work.replace_subpage_tropes(
            "Characters",
            [Trope::new("TheHero", TropeCategory::Narrative, "Characters").unwrap()],
        );

        let characters: Vec<_> = work.tropes_from("Characters").map(|t| t.title()).collect();
        assert_eq!(characters, vec!["TheHero"]);
        assert_eq!(work.tropes_from("Trivia").count(), 1);
    }

    #[test]
    fn test_partial_update_keeps_unrefreshed_origins() {
        let mut stored = work("1999").unwrap().with_subpages(["c", "t"]).with_tropes([
            Trope::primary("ChekhovsGun", TropeCategory::Narrative).unwrap(),
            Trope::new("BigBad", TropeCategory::Narrative, "Characters").unwrap(),
            Trope::new("CreatorCameo", TropeCategory::Topical, "Trivia").unwrap(),
        ]);
        let fresh = Work::new(stored.url(), "The Matrix (1999)", "Film", "1999", Utc::now())
            .unwrap()
            .with_subpages(["c", "t"])
            .with_tropes([
                Trope::primary("RedHerring", TropeCategory::Narrative).unwrap(),
                Trope::new("TheHero", TropeCategory::Narrative, "Characters").unwrap(),
            ]);

        stored.apply_partial_update(fresh, &["Characters".to_string()]);

        assert_eq!(stored.title(), "The Matrix (1999)");
        let primary: Vec<_> = stored.primary_tropes().map(|t| t.title()).collect();
        assert_eq!(primary, vec!["RedHerring"]);
        let characters: Vec<_> = stored.tropes_from("Characters").map(|t| t.title()).collect();
        assert_eq!(characters, vec!["TheHero"]);
        assert_eq!(stored.tropes_from("Trivia").count(), 1);
        assert_eq!(stored.subpages(), ["c", "t"]);
    }

    #[test]
    fn test_json_round_trip_keeps_tropes() {
        let work = work("1999").unwrap().with_tropes([
            Trope::primary("ChekhovsGun", TropeCategory::Narrative).unwrap(),
            Trope::new("BigBad", TropeCategory::Narrative, "Characters").unwrap(),
        ]);
        let json = serde_json::to_string(&work).unwrap();
        let back: Work = serde_json::from_str(&json).unwrap();
        assert_eq!(back, work);
        assert_eq!(back.release_year().to_string(), "1999");
    }
}
