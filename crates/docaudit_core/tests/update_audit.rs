use std::sync::Once;

use docaudit_core::{
    update, AppState, AuditEvent, AuditPhase, Effect, Msg, Origin, ProviderHint, RequestContext,
    TemplateKind,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(client_logging::initialize_for_tests);
}

fn context() -> RequestContext {
    RequestContext {
        identity_subject: "user-1".to_string(),
        file_names: vec!["report.pdf".to_string()],
        now: "2024-05-01T10:00:00Z".to_string(),
    }
}

fn event(n: u32) -> AuditEvent {
    AuditEvent {
        received_at: format!("2024-05-01T10:00:0{n}Z"),
        status: "200".to_string(),
        result_text: format!("finding {n}"),
    }
}

fn start(state: AppState, modifier_held: bool) -> (AppState, Vec<Effect>) {
    update(
        state,
        Msg::StartAuditClicked {
            context: context(),
            modifier_held,
        },
    )
}

fn started(sections: Vec<&str>) -> (AppState, u64) {
    let (state, _) = update(
        AppState::new(),
        Msg::DocumentSelected(Some("report.pdf".to_string())),
    );
    let (state, _) = update(
        state,
        Msg::SectionsSelected(sections.into_iter().map(String::from).collect()),
    );
    let (state, effects) = start(state, false);
    let run = match &effects[..] {
        [Effect::OpenAuditStream { run, .. }] => *run,
        other => panic!("unexpected effects {other:?}"),
    };
    (state, run)
}

#[test]
fn start_without_document_is_a_validation_error() {
    init_logging();
    let (state, effects) = start(AppState::new(), false);
    assert!(effects.is_empty());
    assert_eq!(state.view().audit_phase, AuditPhase::Idle);
    assert_eq!(
        state.view().banner.as_deref(),
        Some("Select a document to audit first.")
    );
}

#[test]
fn empty_section_set_is_sent_as_empty() {
    init_logging();
    let (state, _) = update(
        AppState::new(),
        Msg::DocumentSelected(Some("report.pdf".to_string())),
    );
    assert!(state.view().start_enabled);
    let (state, effects) = start(state, true);

    match &effects[..] {
        [Effect::OpenAuditStream { run, request }] => {
            assert_eq!(*run, 1);
            assert!(request.selected_guide_sections.is_empty());
            assert_eq!(request.target_file_name, "report.pdf");
            assert_eq!(request.identity_subject, "user-1");
            assert_eq!(request.template_kind, TemplateKind::DocAudit);
            assert_eq!(request.provider_hint, ProviderHint::Alternate);
        }
        other => panic!("unexpected effects {other:?}"),
    }
    let view = state.view();
    assert_eq!(view.audit_phase, AuditPhase::Auditing);
    assert!(!view.start_enabled);
    assert_eq!(
        view.messages.last().unwrap().text,
        "Audit report.pdf against all style guide sections."
    );
}

#[test]
fn sections_are_kept_as_an_ordered_set() {
    init_logging();
    let (state, _) = started(vec!["structuring-content_2", "structuring-content_1", "structuring-content_2"]);
    assert_eq!(
        state.audit().request().unwrap().selected_guide_sections,
        vec!["structuring-content_2", "structuring-content_1"]
    );
}

#[test]
fn start_is_guarded_while_streaming() {
    init_logging();
    let (state, run) = started(vec![]);
    let (state, _) = update(state, Msg::AuditStreamOpened { run });
    let (state, effects) = start(state, false);
    assert!(effects.is_empty());
    assert_eq!(state.view().audit_phase, AuditPhase::StreamOpen);

    let (state, _) = update(state, Msg::DocumentSelected(Some("other.pdf".to_string())));
    assert_eq!(state.view().audit_document.as_deref(), Some("report.pdf"));
}

#[test]
fn events_are_appended_in_arrival_order_and_projected_to_chat() {
    init_logging();
    let (state, run) = started(vec![]);
    let (state, _) = update(state, Msg::AuditStreamOpened { run });
    let mut state = state;
    for n in 1..=3 {
        let (next, effects) = update(state, Msg::AuditEventReceived { run, event: event(n) });
        assert!(effects.is_empty());
        state = next;
    }
    let (state, _) = update(state, Msg::AuditStreamEnded { run });

    assert_eq!(state.audit().transcript(), &[event(1), event(2), event(3)]);
    let view = state.view();
    assert_eq!(view.audit_phase, AuditPhase::Completed);
    assert_eq!(view.banner.as_deref(), Some("Audit complete."));
    let agent_texts: Vec<_> = view
        .messages
        .iter()
        .skip(2)
        .map(|m| (m.origin, m.text.as_str()))
        .collect();
    assert_eq!(
        agent_texts,
        vec![
            (Origin::Agent, "finding 1"),
            (Origin::Agent, "finding 2"),
            (Origin::Agent, "finding 3"),
        ]
    );
}

#[test]
fn stream_error_keeps_partial_transcript_and_is_terminal() {
    init_logging();
    let (state, run) = started(vec![]);
    let (state, _) = update(state, Msg::AuditEventReceived { run, event: event(1) });
    let (state, _) = update(state, Msg::AuditEventReceived { run, event: event(2) });
    let (state, _) = update(
        state,
        Msg::AuditStreamFailed {
            run,
            reason: "connection reset".to_string(),
        },
    );
    // A late end notification must not flip the error to completed.
    let (state, _) = update(state, Msg::AuditStreamEnded { run });

    assert_eq!(state.audit().transcript(), &[event(1), event(2)]);
    assert_eq!(
        state.view().audit_phase,
        AuditPhase::StreamError("connection reset".to_string())
    );
    assert_eq!(
        state.view().banner.as_deref(),
        Some("Audit stopped: connection reset")
    );

    // No automatic restart: starting again needs an explicit restart.
    let (state, effects) = start(state, false);
    assert!(effects.is_empty());
    assert_eq!(
        state.view().banner.as_deref(),
        Some("Restart before running another audit.")
    );
}

#[test]
fn restart_closes_live_stream_and_ignores_its_stragglers() {
    init_logging();
    let (state, run) = started(vec![]);
    let (state, _) = update(state, Msg::AuditEventReceived { run, event: event(1) });
    let (state, effects) = update(state, Msg::RestartClicked);
    assert_eq!(effects, vec![Effect::CloseAuditStream { run }]);

    let (state, _) = update(state, Msg::AuditEventReceived { run, event: event(2) });
    assert!(state.audit().transcript().is_empty());
    assert_eq!(state.view().messages.len(), 1);
    assert_eq!(state.view().audit_phase, AuditPhase::Idle);
    // Document selection survives a restart.
    assert!(state.view().start_enabled);

    let (_, effects) = start(state, false);
    match &effects[..] {
        [Effect::OpenAuditStream { run: next, .. }] => assert_eq!(*next, run + 1),
        other => panic!("unexpected effects {other:?}"),
    }
}

#[test]
fn restart_when_idle_emits_nothing() {
    init_logging();
    let (state, effects) = update(AppState::new(), Msg::RestartClicked);
    assert!(effects.is_empty());
    assert_eq!(state.view().messages.len(), 1);
}
