use crate::{AuditPhase, ChatMessage};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppViewModel {
    pub messages: Vec<ChatMessage>,
    pub input: String,
    pub query_pending: bool,
    pub audit_phase: AuditPhase,
    pub audit_document: Option<String>,
    pub audit_sections: Vec<String>,
    pub transcript_len: usize,
    /// The start control is disabled outside `Idle` or without a document.
    pub start_enabled: bool,
    pub banner: Option<String>,
    pub dirty: bool,
}
