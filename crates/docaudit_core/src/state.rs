use crate::view_model::AppViewModel;
use crate::{AuditSession, Conversation};

/// Normalized error shape shared by every backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub received_at: String,
    pub status_code: Option<u16>,
    pub message: String,
}

/// Inline status line shown above the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Banner {
    Validation(String),
    RequestFailed(ErrorInfo),
    AuditCompleted,
    AuditFailed(String),
}

impl Banner {
    pub fn text(&self) -> String {
        match self {
            Banner::Validation(message) => message.clone(),
            Banner::RequestFailed(info) => match info.status_code {
                Some(code) => format!("Request failed ({code}): {}", info.message),
                None => format!("Request failed: {}", info.message),
            },
            Banner::AuditCompleted => "Audit complete.".to_string(),
            Banner::AuditFailed(reason) => format!("Audit stopped: {reason}"),
        }
    }
}

/// Page state for the chat + audit view.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    pub(crate) conversation: Conversation,
    pub(crate) audit: AuditSession,
    pub(crate) input: String,
    pub(crate) in_flight_query: Option<String>,
    pub(crate) banner: Option<Banner>,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn audit(&self) -> &AuditSession {
        &self.audit
    }

    pub fn banner(&self) -> Option<&Banner> {
        self.banner.as_ref()
    }

    pub fn query_pending(&self) -> bool {
        self.in_flight_query.is_some()
    }

    pub fn view(&self) -> AppViewModel {
        AppViewModel {
            messages: self.conversation.messages().to_vec(),
            input: self.input.clone(),
            query_pending: self.query_pending(),
            audit_phase: self.audit.phase().clone(),
            audit_document: self.audit.document().map(ToOwned::to_owned),
            audit_sections: self.audit.sections().to_vec(),
            transcript_len: self.audit.transcript().len(),
            start_enabled: self.audit.can_start(),
            banner: self.banner.as_ref().map(Banner::text),
            dirty: self.dirty,
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Returns whether anything changed since the last call, and resets the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}
