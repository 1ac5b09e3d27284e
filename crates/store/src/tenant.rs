//! Per-tenant tool policy overlay (§4.B): allowlist/blocklist entries keyed
//! by tenant id, layered on top of the global JSON policy the same way
//! `domain::config::Config` layers TOML defaults and environment overrides.

use agentrt_domain::collab::TenantPolicyRepo;
use agentrt_domain::error::{CoreError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TenantPolicyEntry {
    #[serde(default)]
    allowlist: Vec<String>,
    #[serde(default)]
    blocklist: Vec<String>,
}

pub struct FileTenantPolicyRepo {
    path: PathBuf,
    cache: RwLock<HashMap<String, TenantPolicyEntry>>,
}

impl FileTenantPolicyRepo {
    pub fn new(state_dir: impl Into<PathBuf>) -> Result<Self> {
        let state_dir = state_dir.into();
        std::fs::create_dir_all(&state_dir)?;
        let path = state_dir.join("tenant_policy.json");

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
            .map_err(|e| CoreError::Persistence(format!("writing tenant policy: {e}")))?;
        Ok(())
    }

    /// Replace the allowlist/blocklist for a tenant and persist immediately.
    pub fn set(&self, tenant_id: &str, allowlist: Vec<String>, blocklist: Vec<String>) -> Result<()> {
        self.cache.write().insert(tenant_id.to_string(), TenantPolicyEntry { allowlist, blocklist });
        self.flush()
    }
}

#[async_trait]
impl TenantPolicyRepo for FileTenantPolicyRepo {
    async fn allowlist(&self, tenant_id: &str) -> Result<Vec<String>> {
        Ok(self.cache.read().get(tenant_id).map(|e| e.allowlist.clone()).unwrap_or_default())
    }

    async fn blocklist(&self, tenant_id: &str) -> Result<Vec<String>> {
        Ok(self.cache.read().get(tenant_id).map(|e| e.blocklist.clone()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_read_allowlist_and_blocklist() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileTenantPolicyRepo::new(dir.path()).unwrap();
        repo.set("tenant-a", vec!["web_search".into()], vec!["shell_exec".into()]).unwrap();

        assert_eq!(repo.allowlist("tenant-a").await.unwrap(), vec!["web_search".to_string()]);
        assert_eq!(repo.blocklist("tenant-a").await.unwrap(), vec!["shell_exec".to_string()]);
    }

    #[tokio::test]
    async fn unknown_tenant_returns_empty_lists() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileTenantPolicyRepo::new(dir.path()).unwrap();
        assert!(repo.allowlist("ghost").await.unwrap().is_empty());
        assert!(repo.blocklist("ghost").await.unwrap().is_empty());
    }
}
