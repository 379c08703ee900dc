//! In-memory sink for testing and short runs.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::RwLock;

use crate::error::{SinkError, SinkResult};
use crate::traits::sink::Sink;
use crate::types::work::Work;

/// Works kept in insertion order, keyed by URL.
///
/// Data is lost when the process exits.
#[derive(Default)]
pub struct MemorySink {
    works: RwLock<IndexMap<String, Work>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with existing works; later duplicates replace earlier ones.
    pub fn with_works(works: impl IntoIterator<Item = Work>) -> Self {
        let works = works
            .into_iter()
            .map(|w| (w.url().to_string(), w))
            .collect();
        Self {
            works: RwLock::new(works),
        }
    }

    pub fn len(&self) -> usize {
        self.works.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.works.read().unwrap().is_empty()
    }

    /// Every stored work, in insertion order.
    pub fn works(&self) -> Vec<Work> {
        self.works.read().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn append(&self, work: &Work) -> SinkResult<()> {
        let mut works = self.works.write().unwrap();
        if works.contains_key(work.url()) {
            return Err(SinkError::AlreadyExists {
                identity: work.url().to_string(),
            });
        }
        works.insert(work.url().to_string(), work.clone());
        Ok(())
    }

    async fn update(&self, identity: &str, work: &Work) -> SinkResult<()> {
        let mut works = self.works.write().unwrap();
        match works.get_mut(identity) {
            Some(existing) => {
                existing.apply_update(work.clone());
                Ok(())
            }
            None => Err(SinkError::NotFound {
                identity: identity.to_string(),
            }),
        }
    }

    async fn list_by_category(&self, category: &str) -> SinkResult<Vec<Work>> {
        Ok(self
            .works
            .read()
            .unwrap()
            .values()
            .filter(|w| w.media_type().eq_ignore_ascii_case(category))
            .cloned()
            .collect())
    }

    async fn get(&self, identity: &str) -> SinkResult<Option<Work>> {
        Ok(self.works.read().unwrap().get(identity).cloned())
    }
}
