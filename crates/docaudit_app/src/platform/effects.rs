use std::path::PathBuf;
use std::sync::Arc;

use client_logging::{client_info, client_warn};
use docaudit_core::{Effect, Msg};
use docaudit_engine::{ApiError, AuditStreamEvent, BackendApi, EngineEvent, EngineHandle};

use super::persistence;

/// Executes reducer effects and turns engine events back into messages.
pub struct EffectRunner {
    engine: EngineHandle,
    download_dir: PathBuf,
}

impl EffectRunner {
    pub fn new(api: Arc<BackendApi>, download_dir: PathBuf) -> Self {
        Self {
            engine: EngineHandle::new(api),
            download_dir,
        }
    }

    pub fn set_download_dir(&mut self, dir: PathBuf) {
        self.download_dir = dir;
    }

    pub fn enqueue(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::SendQuery(query) => {
                    client_info!(
                        "SendQuery files={} provider={}",
                        query.context_file_names.len(),
                        query.provider_hint.as_str()
                    );
                    self.engine.send_query(query);
                }
                Effect::OpenAuditStream { run, request } => {
                    client_info!(
                        "OpenAuditStream run={} document={}",
                        run,
                        request.target_file_name
                    );
                    self.engine.open_audit_stream(run, request);
                }
                Effect::CloseAuditStream { run } => {
                    self.engine.close_audit_stream(run);
                }
                Effect::SaveTranscript { filename, content } => {
                    if let Err(err) =
                        persistence::save_transcript(&self.download_dir, &filename, &content)
                    {
                        client_warn!("transcript not saved: {}", err);
                    }
                }
            }
        }
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.engine.try_recv()
    }
}

/// The auth failure carried by an engine event, if any.
pub fn auth_failure(event: &EngineEvent) -> Option<&ApiError> {
    let err = match event {
        EngineEvent::QueryCompleted(Err(err)) => err,
        EngineEvent::Audit {
            event: AuditStreamEvent::Failed(err),
            ..
        } => err,
        _ => return None,
    };
    err.is_auth().then_some(err)
}

pub fn to_msg(event: EngineEvent) -> Msg {
    match event {
        EngineEvent::QueryCompleted(Ok(reply)) => Msg::QueryReplied(reply),
        EngineEvent::QueryCompleted(Err(err)) => {
            client_warn!("query failed: {}", err);
            Msg::QueryFailed(err.info())
        }
        EngineEvent::Audit { run, event } => match event {
            AuditStreamEvent::Opened => Msg::AuditStreamOpened { run },
            AuditStreamEvent::Event(event) => Msg::AuditEventReceived { run, event },
            AuditStreamEvent::Completed => Msg::AuditStreamEnded { run },
            AuditStreamEvent::Failed(err) => Msg::AuditStreamFailed {
                run,
                reason: err.message,
            },
        },
    }
}
