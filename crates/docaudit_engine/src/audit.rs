use std::sync::{mpsc, Arc};

use client_logging::{client_debug, client_info, client_warn};
use docaudit_core::{AuditEvent, AuditRequest};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::api::{BackendApi, ReplyEnvelope};
use crate::sse::{SseDecoder, SseFrame, DEFAULT_EVENT};
use crate::types::map_reqwest_error;
use crate::{ApiError, AuditStreamEvent, EngineEvent, ErrorKind};

/// Event name the backend sends after the last result.
pub const END_EVENT: &str = "end";
/// Event name carrying a backend-side failure.
pub const ERROR_EVENT: &str = "error";

pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelEventSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

#[async_trait::async_trait]
pub trait AuditStreamer: Send + Sync {
    /// Runs one audit stream to its end, reporting through `sink`.
    /// Once `cancel` fires nothing further is reported for `run`.
    async fn stream(
        &self,
        run: u64,
        request: &AuditRequest,
        sink: &dyn EventSink,
        cancel: CancellationToken,
    );
}

pub struct SseAuditStreamer {
    api: Arc<BackendApi>,
}

enum FrameOutcome {
    Event(AuditEvent),
    Completed,
    Failed(ApiError),
    Ignored,
}

impl SseAuditStreamer {
    pub fn new(api: Arc<BackendApi>) -> Self {
        Self { api }
    }

    fn classify(&self, frame: SseFrame) -> FrameOutcome {
        match frame.event.as_str() {
            END_EVENT => FrameOutcome::Completed,
            ERROR_EVENT => {
                let message = serde_json::from_str::<ReplyEnvelope>(&frame.data)
                    .ok()
                    .and_then(|envelope| envelope.message.or(envelope.ai_response))
                    .unwrap_or(frame.data);
                FrameOutcome::Failed(ApiError::new(ErrorKind::Stream, message))
            }
            DEFAULT_EVENT => match serde_json::from_str::<ReplyEnvelope>(&frame.data) {
                Ok(envelope) => {
                    let status = envelope.status_text();
                    FrameOutcome::Event(AuditEvent {
                        received_at: envelope.received.unwrap_or_else(|| self.api.now()),
                        status,
                        result_text: envelope.ai_response.unwrap_or_default(),
                    })
                }
                Err(err) => FrameOutcome::Failed(ApiError::new(
                    ErrorKind::Stream,
                    format!("malformed audit event: {err}"),
                )),
            },
            other => {
                client_debug!("ignoring audit stream event {:?}", other);
                FrameOutcome::Ignored
            }
        }
    }
}

#[async_trait::async_trait]
impl AuditStreamer for SseAuditStreamer {
    async fn stream(
        &self,
        run: u64,
        request: &AuditRequest,
        sink: &dyn EventSink,
        cancel: CancellationToken,
    ) {
        let emit = |event| sink.emit(EngineEvent::Audit { run, event });

        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            opened = self.api.open_audit_stream(request) => opened,
        };
        let response = match opened {
            Ok(response) => response,
            Err(err) => {
                client_warn!("audit run {} could not open: {}", run, err);
                emit(AuditStreamEvent::Failed(err));
                return;
            }
        };
        client_info!("audit run {} streaming {}", run, request.target_file_name);
        emit(AuditStreamEvent::Opened);

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => {
                    client_debug!("audit run {} closed by client", run);
                    return;
                }
                chunk = body.next() => chunk,
            };
            let bytes = match chunk {
                Some(Ok(bytes)) => bytes,
                Some(Err(err)) => {
                    let err = map_reqwest_error(err).with_kind(ErrorKind::Stream);
                    client_warn!("audit run {} transport error: {}", run, err);
                    emit(AuditStreamEvent::Failed(err));
                    return;
                }
                None => {
                    if decoder.has_partial_frame() {
                        client_debug!("audit run {} discarded an incomplete frame", run);
                    }
                    emit(AuditStreamEvent::Failed(ApiError::new(
                        ErrorKind::Stream,
                        "stream closed before the audit completed",
                    )));
                    return;
                }
            };
            for frame in decoder.push(&bytes) {
                match self.classify(frame) {
                    FrameOutcome::Event(event) => emit(AuditStreamEvent::Event(event)),
                    FrameOutcome::Ignored => {}
                    FrameOutcome::Completed => {
                        client_info!("audit run {} complete", run);
                        emit(AuditStreamEvent::Completed);
                        return;
                    }
                    FrameOutcome::Failed(err) => {
                        client_warn!("audit run {} failed: {}", run, err);
                        emit(AuditStreamEvent::Failed(err));
                        return;
                    }
                }
            }
        }
    }
}
