use serde::{Deserialize, Serialize};

/// The style-guide corpus an audit can be restricted to.
pub const STYLE_GUIDE_SECTIONS: &[&str] = &[
    "accessible-and-inclusive-content_1",
    "accessible-and-inclusive-content_2",
    "referencing-and-attribution_1",
    "referencing-and-attribution_2",
    "referencing-and-attribution_3",
    "structuring-content_1",
    "structuring-content_2",
    "writing-and-designing-content_1",
    "writing-and-designing-content_2",
    "grammar-punctuation-and-conventions_1",
    "grammar-punctuation-and-conventions_2",
    "grammar-punctuation-and-conventions_3",
    "grammar-punctuation-and-conventions_4",
    "grammar-punctuation-and-conventions_5",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    DocAnalyst,
    DocAudit,
}

impl TemplateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateKind::DocAnalyst => "doc_analyst",
            TemplateKind::DocAudit => "doc_audit",
        }
    }
}

/// Backend model provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProviderHint {
    #[default]
    Primary,
    Alternate,
}

impl ProviderHint {
    /// Evaluated once, when the user action that builds a request happens.
    pub fn from_modifier(modifier_held: bool) -> Self {
        if modifier_held {
            ProviderHint::Alternate
        } else {
            ProviderHint::Primary
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderHint::Primary => "scoti",
            ProviderHint::Alternate => "openai",
        }
    }
}

/// Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRequest {
    pub submitted_at: String,
    pub identity_subject: String,
    pub target_file_name: String,
    /// Empty means "all sections"; expansion is the backend's job.
    pub selected_guide_sections: Vec<String>,
    pub template_kind: TemplateKind,
    pub provider_hint: ProviderHint,
}

/// One incremental unit of an audit stream. Its position is its arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub received_at: String,
    pub status: String,
    pub result_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuditPhase {
    #[default]
    Idle,
    Auditing,
    StreamOpen,
    Completed,
    StreamError(String),
}

impl AuditPhase {
    pub fn is_active(&self) -> bool {
        matches!(self, AuditPhase::Auditing | AuditPhase::StreamOpen)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AuditPhase::Completed | AuditPhase::StreamError(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditStartError {
    #[error("Select a document to audit first.")]
    NoDocument,
    #[error("Restart before running another audit.")]
    NotIdle,
}

/// Audit state machine: `Idle -> Auditing -> StreamOpen -> Completed | StreamError`.
///
/// Each started stream gets a fresh `run` number; notifications carrying any
/// other run number belong to a stream that was restarted away and are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuditSession {
    phase: AuditPhase,
    document: Option<String>,
    sections: Vec<String>,
    request: Option<AuditRequest>,
    transcript: Vec<AuditEvent>,
    run: u64,
}

impl AuditSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &AuditPhase {
        &self.phase
    }

    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    pub fn sections(&self) -> &[String] {
        &self.sections
    }

    pub fn request(&self) -> Option<&AuditRequest> {
        self.request.as_ref()
    }

    pub fn transcript(&self) -> &[AuditEvent] {
        &self.transcript
    }

    pub fn run(&self) -> u64 {
        self.run
    }

    pub fn can_start(&self) -> bool {
        self.phase == AuditPhase::Idle && self.document.is_some()
    }

    /// Selections are frozen while a stream is live.
    pub fn select_document(&mut self, name: Option<String>) -> bool {
        if self.phase.is_active() {
            return false;
        }
        self.document = name;
        true
    }

    /// Stores the sections as an ordered set (first occurrence wins).
    pub fn select_sections(&mut self, sections: Vec<String>) -> bool {
        if self.phase.is_active() {
            return false;
        }
        let mut ordered: Vec<String> = Vec::with_capacity(sections.len());
        for section in sections {
            if !ordered.contains(&section) {
                ordered.push(section);
            }
        }
        self.sections = ordered;
        true
    }

    pub fn begin(
        &mut self,
        identity_subject: String,
        submitted_at: String,
        provider_hint: ProviderHint,
    ) -> Result<(u64, AuditRequest), AuditStartError> {
        if self.phase != AuditPhase::Idle {
            return Err(AuditStartError::NotIdle);
        }
        let Some(target_file_name) = self.document.clone() else {
            return Err(AuditStartError::NoDocument);
        };
        let request = AuditRequest {
            submitted_at,
            identity_subject,
            target_file_name,
            selected_guide_sections: self.sections.clone(),
            template_kind: TemplateKind::DocAudit,
            provider_hint,
        };
        self.run += 1;
        self.phase = AuditPhase::Auditing;
        self.request = Some(request.clone());
        Ok((self.run, request))
    }

    fn accepts(&self, run: u64) -> bool {
        run == self.run && self.phase.is_active()
    }

    pub fn on_opened(&mut self, run: u64) -> bool {
        if !self.accepts(run) {
            return false;
        }
        self.phase = AuditPhase::StreamOpen;
        true
    }

    /// Appends in arrival order. An event can imply the open notification.
    pub fn on_event(&mut self, run: u64, event: AuditEvent) -> bool {
        if !self.accepts(run) {
            return false;
        }
        self.phase = AuditPhase::StreamOpen;
        self.transcript.push(event);
        true
    }

    pub fn on_completed(&mut self, run: u64) -> bool {
        if !self.accepts(run) {
            return false;
        }
        self.phase = AuditPhase::Completed;
        true
    }

    /// Terminal error; the partial transcript is kept.
    pub fn on_failed(&mut self, run: u64, reason: impl Into<String>) -> bool {
        if !self.accepts(run) {
            return false;
        }
        self.phase = AuditPhase::StreamError(reason.into());
        true
    }

    /// Back to `Idle` with an empty transcript. Returns whether a stream was live.
    pub fn restart(&mut self) -> bool {
        let was_active = self.phase.is_active();
        self.phase = AuditPhase::Idle;
        self.request = None;
        self.transcript.clear();
        was_active
    }
}
