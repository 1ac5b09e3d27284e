//! Single-state-file persistence for canary rollout state, keyed by route
//! (§4.A), mirroring the teacher's `gateway::workspace::bootstrap` pattern
//! of one JSON file under the state directory plus an in-process cache.

use agentrt_domain::canary::CanaryStateRecord;
use agentrt_domain::collab::CanaryStateRepo;
use agentrt_domain::error::{CoreError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;

pub struct FileCanaryStateRepo {
    path: PathBuf,
    cache: RwLock<HashMap<String, CanaryStateRecord>>,
}

impl FileCanaryStateRepo {
    pub fn new(state_dir: impl Into<PathBuf>) -> Result<Self> {
        let state_dir = state_dir.into();
        std::fs::create_dir_all(&state_dir)?;
        let path = state_dir.join("canary_state.json");

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
            .map_err(|e| CoreError::Persistence(format!("writing canary state: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl CanaryStateRepo for FileCanaryStateRepo {
    async fn load(&self, route: &str) -> Result<Option<CanaryStateRecord>> {
        Ok(self.cache.read().get(route).cloned())
    }

    async fn save(&self, state: &CanaryStateRecord) -> Result<()> {
        self.cache.write().insert(state.route.clone(), state.clone());
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrt_domain::canary::CanaryOutcome;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileCanaryStateRepo::new(dir.path()).unwrap();

        let mut state = CanaryStateRecord::new("chat", 10);
        state.record(CanaryOutcome::Success, vec![], 1000);
        repo.save(&state).await.unwrap();

        let loaded = repo.load("chat").await.unwrap().unwrap();
        assert_eq!(loaded.window.len(), 1);
    }

    #[tokio::test]
    async fn load_unknown_route_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileCanaryStateRepo::new(dir.path()).unwrap();
        assert!(repo.load("search").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn state_survives_repo_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let repo = FileCanaryStateRepo::new(dir.path()).unwrap();
            let mut state = CanaryStateRecord::new("chat", 10);
            state.record(CanaryOutcome::Failure, vec!["hard_gate_unmet".into()], 5);
            repo.save(&state).await.unwrap();
        }
        let repo2 = FileCanaryStateRepo::new(dir.path()).unwrap();
        let loaded = repo2.load("chat").await.unwrap().unwrap();
        assert_eq!(loaded.failure_rate(), 1.0);
    }
}
