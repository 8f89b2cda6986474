use std::collections::HashMap;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use client_logging::{client_debug, client_error};
use docaudit_core::{AuditRequest, QueryRequest};
use tokio_util::sync::CancellationToken;

use crate::api::BackendApi;
use crate::audit::{AuditStreamer, ChannelEventSink, SseAuditStreamer};
use crate::EngineEvent;

enum EngineCommand {
    SendQuery(QueryRequest),
    OpenAuditStream { run: u64, request: AuditRequest },
    CloseAuditStream { run: u64 },
}

/// Runs queries and audit streams on a background runtime; results come back
/// as [`EngineEvent`]s through `try_recv`.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
}

impl EngineHandle {
    pub fn new(api: Arc<BackendApi>) -> Self {
        let streamer = Arc::new(SseAuditStreamer::new(Arc::clone(&api)));
        Self::with_streamer(api, streamer)
    }

    pub fn with_streamer(api: Arc<BackendApi>, streamer: Arc<dyn AuditStreamer>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();

        thread::spawn(move || {
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(runtime) => runtime,
                Err(err) => {
                    client_error!("engine runtime failed to start: {}", err);
                    return;
                }
            };
            let mut streams: HashMap<u64, CancellationToken> = HashMap::new();
            while let Ok(command) = cmd_rx.recv() {
                streams.retain(|_, token| !token.is_cancelled());
                match command {
                    EngineCommand::SendQuery(query) => {
                        let api = Arc::clone(&api);
                        let event_tx = event_tx.clone();
                        runtime.spawn(async move {
                            let result = api.send_query(&query).await;
                            let _ = event_tx.send(EngineEvent::QueryCompleted(result));
                        });
                    }
                    EngineCommand::OpenAuditStream { run, request } => {
                        let token = CancellationToken::new();
                        if let Some(previous) = streams.insert(run, token.clone()) {
                            previous.cancel();
                        }
                        let streamer = Arc::clone(&streamer);
                        let sink = ChannelEventSink::new(event_tx.clone());
                        runtime.spawn(async move {
                            streamer.stream(run, &request, &sink, token.clone()).await;
                            token.cancel();
                        });
                    }
                    EngineCommand::CloseAuditStream { run } => {
                        if let Some(token) = streams.remove(&run) {
                            client_debug!("closing audit run {}", run);
                            token.cancel();
                        }
                    }
                }
            }
        });

        Self { cmd_tx, event_rx }
    }

    pub fn send_query(&self, query: QueryRequest) {
        let _ = self.cmd_tx.send(EngineCommand::SendQuery(query));
    }

    pub fn open_audit_stream(&self, run: u64, request: AuditRequest) {
        let _ = self
            .cmd_tx
            .send(EngineCommand::OpenAuditStream { run, request });
    }

    pub fn close_audit_stream(&self, run: u64) {
        let _ = self.cmd_tx.send(EngineCommand::CloseAuditStream { run });
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }
}
