use crate::{AuditRequest, QueryRequest};

/// Name offered when the transcript is saved locally.
pub const TRANSCRIPT_FILENAME: &str = "chat_history.md";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    SendQuery(QueryRequest),
    OpenAuditStream { run: u64, request: AuditRequest },
    /// Best-effort client-side close; nothing is sent to the backend.
    CloseAuditStream { run: u64 },
    SaveTranscript { filename: String, content: String },
}
