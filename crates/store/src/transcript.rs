//! Fixed-capacity, append-only transcript ring per conversation (§3),
//! grounded on `sessions::transcript::TranscriptWriter`'s JSONL-per-key
//! layout. Unlike the trace repo, reads are bounded to the last `limit`
//! lines rather than the whole file.

use agentrt_domain::collab::TranscriptRingBuffer;
use agentrt_domain::error::{CoreError, Result};
use agentrt_domain::tool::Message;
use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;

pub struct FileTranscriptRingBuffer {
    base_dir: PathBuf,
}

impl FileTranscriptRingBuffer {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn path_for(&self, conversation_id: &str) -> PathBuf {
        self.base_dir.join(format!("{conversation_id}.jsonl"))
    }
}

#[async_trait]
impl TranscriptRingBuffer for FileTranscriptRingBuffer {
    async fn append(&self, conversation_id: &str, message: Message) -> Result<()> {
        let path = self.path_for(conversation_id);
        let json = serde_json::to_string(&message)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| CoreError::Persistence(format!("opening transcript file {}: {e}", path.display())))?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .map_err(|e| CoreError::Persistence(format!("appending transcript message: {e}")))?;
        Ok(())
    }

    async fn recent(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>> {
        let path = self.path_for(conversation_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = raw.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(limit);

        let mut messages = Vec::new();
        for line in &lines[start..] {
            match serde_json::from_str::<Message>(line) {
                Ok(m) => messages.push(m),
                Err(e) => {
                    tracing::warn!(conversation_id, error = %e, "skipping malformed transcript line");
                }
            }
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrt_domain::tool::Message;

    #[tokio::test]
    async fn recent_returns_only_last_n_messages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let ring = FileTranscriptRingBuffer::new(dir.path()).unwrap();
        ring.append("conv-1", Message::user("one")).await.unwrap();
        ring.append("conv-1", Message::assistant("two")).await.unwrap();
        ring.append("conv-1", Message::user("three")).await.unwrap();

        let recent = ring.recent("conv-1", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content.extract_all_text(), "two");
        assert_eq!(recent[1].content.extract_all_text(), "three");
    }

    #[tokio::test]
    async fn recent_on_missing_conversation_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ring = FileTranscriptRingBuffer::new(dir.path()).unwrap();
        assert!(ring.recent("ghost", 10).await.unwrap().is_empty());
    }
}
