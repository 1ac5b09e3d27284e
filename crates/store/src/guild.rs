//! Per-guild/workspace settings overlay (response formatting, routing
//! hints) -- same nested JSON-file shape as the tenant policy repo.

use agentrt_domain::collab::GuildSettingsRepo;
use agentrt_domain::error::{CoreError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;

pub struct FileGuildSettingsRepo {
    path: PathBuf,
    cache: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl FileGuildSettingsRepo {
    pub fn new(state_dir: impl Into<PathBuf>) -> Result<Self> {
        let state_dir = state_dir.into();
        std::fs::create_dir_all(&state_dir)?;
        let path = state_dir.join("guild_settings.json");

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
            .map_err(|e| CoreError::Persistence(format!("writing guild settings: {e}")))?;
        Ok(())
    }

    pub fn set(&self, guild_id: &str, key: &str, value: String) -> Result<()> {
        self.cache.write().entry(guild_id.to_string()).or_default().insert(key.to_string(), value);
        self.flush()
    }
}

#[async_trait]
impl GuildSettingsRepo for FileGuildSettingsRepo {
    async fn setting(&self, guild_id: &str, key: &str) -> Result<Option<String>> {
        Ok(self.cache.read().get(guild_id).and_then(|m| m.get(key)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_read_setting() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileGuildSettingsRepo::new(dir.path()).unwrap();
        repo.set("guild-1", "voice", "terse").unwrap();
        assert_eq!(repo.setting("guild-1", "voice").await.unwrap().as_deref(), Some("terse"));
    }

    #[tokio::test]
    async fn unknown_guild_or_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileGuildSettingsRepo::new(dir.path()).unwrap();
        assert!(repo.setting("ghost", "voice").await.unwrap().is_none());
    }
}
