//! Key/value store for compacted summaries (search pipeline §4.E, critic
//! loop §4.F), same JSON-file-plus-cache shape as `FileCanaryStateRepo`.

use agentrt_domain::collab::SummaryStore;
use agentrt_domain::error::{CoreError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;

pub struct FileSummaryStore {
    path: PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

impl FileSummaryStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Result<Self> {
        let state_dir = state_dir.into();
        std::fs::create_dir_all(&state_dir)?;
        let path = state_dir.join("summaries.json");

        let cache = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        Ok(Self { path, cache: RwLock::new(cache) })
    }

    fn flush(&self) -> Result<()> {
        let cache = self.cache.read();
        let json = serde_json::to_string_pretty(&*cache)?;
        std::fs::write(&self.path, json)
            .map_err(|e| CoreError::Persistence(format!("writing summary store: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl SummaryStore for FileSummaryStore {
    async fn put(&self, key: &str, summary: String) -> Result<()> {
        self.cache.write().insert(key.to_string(), summary);
        self.flush()
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cache.read().get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSummaryStore::new(dir.path()).unwrap();
        store.put("turn-1", "the user asked about X".into()).await.unwrap();
        assert_eq!(store.get("turn-1").await.unwrap().as_deref(), Some("the user asked about X"));
    }

    #[tokio::test]
    async fn get_unknown_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSummaryStore::new(dir.path()).unwrap();
        assert!(store.get("ghost").await.unwrap().is_none());
    }
}
