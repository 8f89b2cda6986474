//! Plain-text rendering of the page view and the shared file list.
use docaudit_core::{AppViewModel, AuditPhase, ChatMessage, Origin, UploadPhase, UploadSet};

pub fn render_messages(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|message| {
            let who = match message.origin {
                Origin::User => "you",
                Origin::Agent => "agent",
            };
            format!("[{who}] {}", message.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_audit_status(view: &AppViewModel) -> String {
    let phase = match &view.audit_phase {
        AuditPhase::Idle => "idle".to_string(),
        AuditPhase::Auditing => "auditing".to_string(),
        AuditPhase::StreamOpen => "streaming".to_string(),
        AuditPhase::Completed => "completed".to_string(),
        AuditPhase::StreamError(reason) => format!("stopped ({reason})"),
    };
    let document = view.audit_document.as_deref().unwrap_or("-");
    format!(
        "audit {phase}: {document}, {} result(s)",
        view.transcript_len
    )
}

pub fn render_banner(view: &AppViewModel) -> Option<String> {
    view.banner.as_ref().map(|text| format!("! {text}"))
}

pub fn render_files(files: &UploadSet) -> String {
    if files.is_empty() {
        return "No files uploaded.".to_string();
    }
    files
        .records()
        .enumerate()
        .map(|(position, record)| {
            let status = match record.phase {
                UploadPhase::Stored => "stored".to_string(),
                UploadPhase::Failed => format!(
                    "failed: {}",
                    record.error.as_deref().unwrap_or("unknown error")
                ),
                UploadPhase::Transferring => format!("{}%", record.progress),
                UploadPhase::Selected
                | UploadPhase::GrantRequested
                | UploadPhase::GrantReceived => "pending".to_string(),
            };
            format!("{position:>3}  {}  ({status})", record.display_name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
