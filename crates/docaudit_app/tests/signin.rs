use std::sync::Arc;
use std::time::Duration;

use docaudit_app::platform::signin::{begin_sign_in, complete_sign_in, SignInStep, LANDING};
use docaudit_core::{ContextStore, Identity};
use docaudit_engine::{IdentitySessionManager, OidcClient, OidcSettings, SharedStorage};
use pretty_assertions::assert_eq;
use url::Url;

fn session(settings: OidcSettings) -> (Arc<IdentitySessionManager>, ContextStore) {
    let storage = SharedStorage::in_memory();
    let tab = storage.tab();
    let oidc = Arc::new(OidcClient::new(settings, tab.clone()).unwrap());
    let context = ContextStore::new();
    let home = Url::parse("http://localhost:8080/").unwrap();
    let manager = IdentitySessionManager::new(oidc, tab, context.clone(), home);
    (manager, context)
}

#[tokio::test]
async fn unknown_callback_state_falls_back_to_landing() {
    let (manager, context) = session(OidcSettings::default());
    let url = Url::parse("http://localhost:8080/callback?code=abc&state=zzz").unwrap();

    let step = complete_sign_in(&manager, url).await;
    assert_eq!(step, SignInStep::Landing);
    assert_eq!(step.describe(), LANDING);
    assert_eq!(context.identity.get(), None);
}

#[tokio::test]
async fn provider_error_on_callback_keeps_existing_identity() {
    let (manager, context) = session(OidcSettings::default());
    context.identity.set(Some(Identity::new("user-1")));
    let url =
        Url::parse("http://localhost:8080/callback?error=access_denied&error_description=no")
            .unwrap();

    assert_eq!(complete_sign_in(&manager, url).await, SignInStep::Landing);
    assert_eq!(
        context.identity.get().map(|identity| identity.subject),
        Some("user-1".to_string())
    );
}

#[tokio::test]
async fn unreachable_provider_on_login_falls_back_to_landing() {
    let settings = OidcSettings {
        authority: Url::parse("http://127.0.0.1:1/").unwrap(),
        request_timeout: Duration::from_secs(2),
        ..OidcSettings::default()
    };
    let (manager, _context) = session(settings);

    assert_eq!(begin_sign_in(&manager).await, SignInStep::Landing);
}
