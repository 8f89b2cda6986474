//! Document-audit client core: pure state machines, shared stores and the page reducer.
mod audit;
mod chat;
mod effect;
mod identity;
mod msg;
mod state;
mod store;
mod update;
mod uploads;
mod view_model;

pub use audit::{
    AuditEvent, AuditPhase, AuditRequest, AuditSession, AuditStartError, ProviderHint,
    TemplateKind, STYLE_GUIDE_SECTIONS,
};
pub use chat::{
    AgentReply, ChatMessage, Conversation, Origin, QueryRequest, AGENT_AVATAR, GREETING,
    USER_AVATAR,
};
pub use effect::{Effect, TRANSCRIPT_FILENAME};
pub use identity::{Identity, IdentitySource};
pub use msg::{Msg, RequestContext};
pub use state::{AppState, Banner, ErrorInfo};
pub use store::{ContextStore, Store, SubscriptionId};
pub use update::update;
pub use uploads::{
    content_type_for_name, is_content_type_allowed, progress_percent, FileCandidate,
    UnsupportedTypeError, UploadId, UploadPhase, UploadRecord, UploadSet, UploadSource,
    DEFAULT_ALLOWED_TYPES, DEFAULT_CONTENT_TYPE,
};
pub use view_model::AppViewModel;
