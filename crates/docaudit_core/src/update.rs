use crate::{
    AppState, Banner, Conversation, Effect, Msg, Origin, ProviderHint,
    QueryRequest, TemplateKind, TRANSCRIPT_FILENAME,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::InputChanged(text) => {
            state.input = text;
            state.mark_dirty();
            Vec::new()
        }
        Msg::QuerySubmitted {
            context,
            modifier_held,
        } => {
            let text = state.input.trim().to_string();
            if text.is_empty() {
                state.banner = Some(Banner::Validation("Type a question first.".to_string()));
                state.mark_dirty();
                return (state, Vec::new());
            }
            // One generative request at a time; resubmission is never implicit.
            if state.query_pending() {
                return (state, Vec::new());
            }
            state.conversation.push(Origin::User, text.clone());
            state.input.clear();
            state.banner = None;
            state.in_flight_query = Some(text.clone());
            state.mark_dirty();
            vec![Effect::SendQuery(QueryRequest {
                sent_at: context.now,
                identity_subject: context.identity_subject,
                context_file_names: context.file_names,
                user_text: text,
                template_kind: TemplateKind::DocAnalyst,
                provider_hint: ProviderHint::from_modifier(modifier_held),
            })]
        }
        Msg::QueryReplied(reply) => {
            if state.in_flight_query.take().is_some() {
                state.conversation.push(Origin::Agent, reply.reply_text);
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::QueryFailed(info) => {
            if let Some(text) = state.in_flight_query.take() {
                // Hand the text back so the user can retry it.
                if state.input.is_empty() {
                    state.input = text;
                }
                state.banner = Some(Banner::RequestFailed(info));
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::DocumentSelected(name) => {
            if state.audit.select_document(name) {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::SectionsSelected(sections) => {
            if state.audit.select_sections(sections) {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::StartAuditClicked {
            context,
            modifier_held,
        } => {
            // The start control is disabled while a stream is live.
            if state.audit.phase().is_active() {
                return (state, Vec::new());
            }
            let provider = ProviderHint::from_modifier(modifier_held);
            match state
                .audit
                .begin(context.identity_subject, context.now, provider)
            {
                Ok((run, request)) => {
                    let scope = if request.selected_guide_sections.is_empty() {
                        "all style guide sections".to_string()
                    } else {
                        request.selected_guide_sections.join(", ")
                    };
                    state.conversation.push(
                        Origin::User,
                        format!("Audit {} against {scope}.", request.target_file_name),
                    );
                    state.banner = None;
                    state.mark_dirty();
                    vec![Effect::OpenAuditStream { run, request }]
                }
                Err(err) => {
                    state.banner = Some(Banner::Validation(err.to_string()));
                    state.mark_dirty();
                    Vec::new()
                }
            }
        }
        Msg::AuditStreamOpened { run } => {
            if state.audit.on_opened(run) {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::AuditEventReceived { run, event } => {
            let text = event.result_text.clone();
            if state.audit.on_event(run, event) {
                state.conversation.push(Origin::Agent, text);
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::AuditStreamEnded { run } => {
            if state.audit.on_completed(run) {
                state.banner = Some(Banner::AuditCompleted);
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::AuditStreamFailed { run, reason } => {
            if state.audit.on_failed(run, reason.clone()) {
                state.banner = Some(Banner::AuditFailed(reason));
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::RestartClicked => {
            let run = state.audit.run();
            let was_streaming = state.audit.restart();
            state.conversation = Conversation::new();
            state.input.clear();
            state.in_flight_query = None;
            state.banner = None;
            state.mark_dirty();
            if was_streaming {
                vec![Effect::CloseAuditStream { run }]
            } else {
                Vec::new()
            }
        }
        Msg::DownloadClicked => vec![Effect::SaveTranscript {
            filename: TRANSCRIPT_FILENAME.to_string(),
            content: state.conversation.render_transcript(),
        }],
        Msg::DismissBanner => {
            if state.banner.take().is_some() {
                state.mark_dirty();
            }
            Vec::new()
        }
    };

    (state, effects)
}
