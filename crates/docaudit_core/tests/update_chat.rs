use std::sync::Once;

use docaudit_core::{
    update, AgentReply, AppState, Effect, ErrorInfo, Msg, Origin, ProviderHint, QueryRequest,
    RequestContext, TemplateKind, GREETING, TRANSCRIPT_FILENAME,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(client_logging::initialize_for_tests);
}

fn context() -> RequestContext {
    RequestContext {
        identity_subject: "user-1".to_string(),
        file_names: vec!["a.pdf".to_string(), "b.txt".to_string()],
        now: "2024-05-01T10:00:00Z".to_string(),
    }
}

fn submit(state: AppState, text: &str, modifier_held: bool) -> (AppState, Vec<Effect>) {
    let (state, _) = update(state, Msg::InputChanged(text.to_string()));
    update(
        state,
        Msg::QuerySubmitted {
            context: context(),
            modifier_held,
        },
    )
}

fn reply(text: &str) -> AgentReply {
    AgentReply {
        received_at: "2024-05-01T10:00:05Z".to_string(),
        status: "200".to_string(),
        reply_text: text.to_string(),
    }
}

#[test]
fn new_conversation_starts_with_greeting() {
    init_logging();
    let view = AppState::new().view();
    assert_eq!(view.messages.len(), 1);
    assert_eq!(view.messages[0].text, GREETING);
    assert_eq!(view.messages[0].origin, Origin::Agent);
}

#[test]
fn submit_appends_user_message_and_emits_query() {
    init_logging();
    let (mut state, effects) = submit(AppState::new(), "  what is wrong with a.pdf?  ", false);

    assert_eq!(
        effects,
        vec![Effect::SendQuery(QueryRequest {
            sent_at: "2024-05-01T10:00:00Z".to_string(),
            identity_subject: "user-1".to_string(),
            context_file_names: vec!["a.pdf".to_string(), "b.txt".to_string()],
            user_text: "what is wrong with a.pdf?".to_string(),
            template_kind: TemplateKind::DocAnalyst,
            provider_hint: ProviderHint::Primary,
        })]
    );
    let view = state.view();
    assert!(view.query_pending);
    assert_eq!(view.input, "");
    assert_eq!(view.messages.last().unwrap().origin, Origin::User);
    assert!(state.consume_dirty());
}

#[test]
fn modifier_selects_alternate_provider() {
    init_logging();
    let (_, effects) = submit(AppState::new(), "hello", true);
    match &effects[..] {
        [Effect::SendQuery(request)] => assert_eq!(request.provider_hint, ProviderHint::Alternate),
        other => panic!("unexpected effects {other:?}"),
    }
}

#[test]
fn reply_appends_agent_message_with_monotonic_ids() {
    init_logging();
    let (state, _) = submit(AppState::new(), "hello", false);
    let (state, effects) = update(state, Msg::QueryReplied(reply("hi there")));
    assert!(effects.is_empty());

    let view = state.view();
    assert!(!view.query_pending);
    let ids: Vec<u64> = view.messages.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(view.messages[2].text, "hi there");
    assert_eq!(view.messages[2].origin, Origin::Agent);
}

#[test]
fn failure_appends_nothing_and_restores_input() {
    init_logging();
    let (state, _) = submit(AppState::new(), "hello", false);
    let (state, effects) = update(
        state,
        Msg::QueryFailed(ErrorInfo {
            received_at: "2024-05-01T10:05:00Z".to_string(),
            status_code: None,
            message: "request timed out".to_string(),
        }),
    );
    assert!(effects.is_empty());

    let view = state.view();
    assert_eq!(view.messages.len(), 2);
    assert_eq!(view.input, "hello");
    assert!(!view.query_pending);
    assert_eq!(
        view.banner.as_deref(),
        Some("Request failed: request timed out")
    );
}

#[test]
fn empty_input_is_a_validation_banner_not_a_request() {
    init_logging();
    let (state, effects) = submit(AppState::new(), "   ", false);
    assert!(effects.is_empty());
    assert_eq!(state.view().banner.as_deref(), Some("Type a question first."));
    assert_eq!(state.view().messages.len(), 1);
}

#[test]
fn second_submit_while_pending_is_ignored() {
    init_logging();
    let (state, _) = submit(AppState::new(), "first", false);
    let (state, effects) = submit(state, "second", false);
    assert!(effects.is_empty());
    assert_eq!(state.view().messages.len(), 2);
    assert_eq!(state.view().input, "second");
}

#[test]
fn late_reply_after_restart_is_dropped() {
    init_logging();
    let (state, _) = submit(AppState::new(), "hello", false);
    let (state, _) = update(state, Msg::RestartClicked);
    let (state, _) = update(state, Msg::QueryReplied(reply("too late")));
    assert_eq!(state.view().messages.len(), 1);
}

#[test]
fn download_renders_all_turns_in_order() {
    init_logging();
    let (state, _) = submit(AppState::new(), "hello", false);
    let (state, _) = update(state, Msg::QueryReplied(reply("hi there")));
    let (_, effects) = update(state, Msg::DownloadClicked);

    assert_eq!(
        effects,
        vec![Effect::SaveTranscript {
            filename: TRANSCRIPT_FILENAME.to_string(),
            content: format!("**Bot**: {GREETING}\n\n**User**: hello\n\n**Bot**: hi there"),
        }]
    );
}
