//! Document-audit engine: identity session, uploads, backend calls and audit streaming.
mod api;
mod audit;
mod engine;
mod oidc;
mod persist;
mod session;
mod settings;
mod sse;
mod storage;
mod types;
mod upload;

pub use api::{BackendApi, FeedbackAck, TokenSource, UploadGrant};
pub use audit::{AuditStreamer, ChannelEventSink, EventSink, SseAuditStreamer, END_EVENT, ERROR_EVENT};
pub use engine::EngineHandle;
pub use oidc::{
    pkce_challenge, remaining_lifetime, AuthCallbackError, OidcClient, ProviderEvent, StoredUser,
};
pub use persist::{ensure_state_dir, write_atomically, PersistError, StateFile};
pub use session::{
    CallbackOutcome, IdentitySessionManager, Navigation, SessionListeners, LOGOUT_BROADCAST_KEY,
};
pub use settings::{ClientSettings, Endpoints, OidcSettings, ProviderMetadata};
pub use sse::{SseDecoder, SseFrame, DEFAULT_EVENT};
pub use storage::{SharedStorage, StorageEvent, StorageEvents, StorageTab, TabId};
pub use types::{utc_clock, ApiError, AuditStreamEvent, Clock, EngineEvent, ErrorKind};
pub use upload::{UploadBatch, UploadPipeline};
