//! JSON file sink: the whole dataset as one array, rewritten on every change.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{SinkError, SinkResult};
use crate::traits::sink::Sink;
use crate::types::work::Work;

/// Dataset stored as a JSON array of works.
///
/// The file is loaded once on open. Each mutation writes a sibling temp
/// file and renames it over the original, so readers never see a
/// half-written dataset.
pub struct JsonFileSink {
    path: PathBuf,
    works: Mutex<IndexMap<String, Work>>,
}

impl JsonFileSink {
    /// Open `path`, loading existing works. A missing file is an empty dataset.
    pub async fn open(path: impl AsRef<Path>) -> SinkResult<Self> {
        let path = path.as_ref().to_path_buf();

        let works = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => IndexMap::new(),
            Ok(bytes) => {
                let list: Vec<Work> = serde_json::from_slice(&bytes)?;
                list.into_iter().map(|w| (w.url().to_string(), w)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), works = works.len(), "Opened JSON dataset");
        Ok(Self {
            path,
            works: Mutex::new(works),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.works.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.works.lock().await.is_empty()
    }

    async fn persist(&self, works: &IndexMap<String, Work>) -> SinkResult<()> {
        let list: Vec<&Work> = works.values().collect();
        let json = serde_json::to_vec_pretty(&list)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), works = list.len(), "Dataset written");
        Ok(())
    }
}

#[async_trait]
impl Sink for JsonFileSink {
    async fn append(&self, work: &Work) -> SinkResult<()> {
        let mut works = self.works.lock().await;
        if works.contains_key(work.url()) {
            return Err(SinkError::AlreadyExists {
                identity: work.url().to_string(),
            });
        }
        works.insert(work.url().to_string(), work.clone());
        if let Err(e) = self.persist(&works).await {
            works.shift_remove(work.url());
            return Err(e);
        }
        Ok(())
    }

    async fn update(&self, identity: &str, work: &Work) -> SinkResult<()> {
        let mut works = self.works.lock().await;
        let Some(existing) = works.get(identity) else {
            return Err(SinkError::NotFound {
                identity: identity.to_string(),
            });
        };

        let mut updated = existing.clone();
        updated.apply_update(work.clone());
        let previous = works.insert(identity.to_string(), updated);
        if let Err(e) = self.persist(&works).await {
            if let Some(previous) = previous {
                works.insert(identity.to_string(), previous);
            }
            return Err(e);
        }
        Ok(())
    }

    async fn list_by_category(&self, category: &str) -> SinkResult<Vec<Work>> {
        Ok(self
            .works
            .lock()
            .await
            .values()
            .filter(|w| w.media_type().eq_ignore_ascii_case(category))
            .cloned()
            .collect())
    }

    async fn get(&self, identity: &str) -> SinkResult<Option<Work>> {
        Ok(self.works.lock().await.get(identity).cloned())
    }
}
