//! Append-only JSONL trace sink, one file per trace id, mirroring the
//! teacher's `sessions::transcript::TranscriptWriter`.

use agentrt_domain::collab::TraceRepo;
use agentrt_domain::error::{CoreError, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;

pub struct FileTraceRepo {
    base_dir: PathBuf,
}

impl FileTraceRepo {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn path_for(&self, trace_id: &str) -> PathBuf {
        self.base_dir.join(format!("{trace_id}.jsonl"))
    }

    /// Read back every event line for a trace, in append order.
    pub fn read(&self, trace_id: &str) -> Result<Vec<String>> {
        let path = self.path_for(trace_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(raw.lines().filter(|l| !l.trim().is_empty()).map(String::from).collect())
    }
}

#[async_trait]
impl TraceRepo for FileTraceRepo {
    async fn append(&self, trace_id: &str, event_json: String) -> Result<()> {
        let path = self.path_for(trace_id);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| CoreError::Persistence(format!("opening trace file {}: {e}", path.display())))?;
        file.write_all(event_json.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .map_err(|e| CoreError::Persistence(format!("appending trace event: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_then_read_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileTraceRepo::new(dir.path()).unwrap();
        repo.append("trace-1", r#"{"kind":"graph_started"}"#.into()).await.unwrap();
        repo.append("trace-1", r#"{"kind":"graph_completed"}"#.into()).await.unwrap();

        let lines = repo.read("trace-1").unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("graph_started"));
        assert!(lines[1].contains("graph_completed"));
    }

    #[test]
    fn read_missing_trace_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileTraceRepo::new(dir.path()).unwrap();
        assert!(repo.read("ghost").unwrap().is_empty());
    }
}
