use crate::{AgentReply, AuditEvent, ErrorInfo};

/// Values copied out of the shared context at the moment of a user action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub identity_subject: String,
    pub file_names: Vec<String>,
    /// RFC 3339 timestamp supplied by the host clock.
    pub now: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// User edited the chat input box.
    InputChanged(String),
    /// User submitted the chat input. The modifier selects the alternate provider.
    QuerySubmitted {
        context: RequestContext,
        modifier_held: bool,
    },
    /// Conversational round trip finished.
    QueryReplied(AgentReply),
    QueryFailed(ErrorInfo),
    /// User picked (or cleared) the document to audit.
    DocumentSelected(Option<String>),
    /// User picked the style-guide sections; empty means all of them.
    SectionsSelected(Vec<String>),
    /// User clicked Start audit.
    StartAuditClicked {
        context: RequestContext,
        modifier_held: bool,
    },
    AuditStreamOpened { run: u64 },
    AuditEventReceived { run: u64, event: AuditEvent },
    AuditStreamEnded { run: u64 },
    AuditStreamFailed { run: u64, reason: String },
    /// User clicked Restart: clears the conversation and the audit.
    RestartClicked,
    /// User asked to save the chat history.
    DownloadClicked,
    DismissBanner,
}
