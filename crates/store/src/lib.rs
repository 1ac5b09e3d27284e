//! Default, swappable in-process implementations of the collaborator
//! traits named in §6.1: file-backed where the spec calls for persistence,
//! in-memory + file-flush for the rest, closely mirroring the teacher's
//! `sessions::{store, transcript}` split between a JSON-file index and
//! append-only JSONL logs.

pub mod canary;
pub mod guild;
pub mod summary;
pub mod tenant;
pub mod trace;
pub mod transcript;

pub use canary::FileCanaryStateRepo;
pub use guild::FileGuildSettingsRepo;
pub use summary::FileSummaryStore;
pub use tenant::FileTenantPolicyRepo;
pub use trace::FileTraceRepo;
pub use transcript::FileTranscriptRingBuffer;
