use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use docaudit_core::{ContextStore, Identity};
use docaudit_engine::{
    pkce_challenge, AuthCallbackError, CallbackOutcome, IdentitySessionManager, Navigation,
    OidcClient, OidcSettings, ProviderMetadata, SharedStorage, StorageTab, StoredUser,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOME: &str = "http://localhost:8080/";

fn unix_now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
}

fn settings(server: &MockServer) -> OidcSettings {
    let base = Url::parse(&server.uri()).unwrap();
    OidcSettings {
        authority: base.clone(),
        client_id: "client-1".to_string(),
        redirect_uri: Url::parse("http://localhost:8080/callback").unwrap(),
        post_logout_redirect_uri: Url::parse("http://localhost:8080/logout").unwrap(),
        metadata: Some(ProviderMetadata::hosted_domain(server.uri(), &base).unwrap()),
        ..OidcSettings::default()
    }
}

fn user_key(server: &MockServer) -> String {
    format!("oidc.user:{}:client-1", server.uri().trim_end_matches('/'))
}

fn manager(
    server: &MockServer,
    tab: StorageTab,
    location: &str,
) -> (Arc<IdentitySessionManager>, ContextStore) {
    let oidc = Arc::new(OidcClient::new(settings(server), tab.clone()).unwrap());
    let context = ContextStore::new();
    let manager =
        IdentitySessionManager::new(oidc, tab, context.clone(), Url::parse(location).unwrap());
    (manager, context)
}

fn stored_user(subject: &str, expires_at: i64) -> StoredUser {
    let mut identity = Identity::new(subject);
    identity.email = Some(format!("{subject}@example.com"));
    identity.expires_at = Some(expires_at);
    StoredUser {
        identity,
        access_token: "access-1".to_string(),
        token_type: "Bearer".to_string(),
        id_token: None,
        refresh_token: Some("refresh-1".to_string()),
        scope: None,
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn mount_token_and_userinfo(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-new",
            "id_token": "id-new",
            "refresh_token": "refresh-new",
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/oauth2/userInfo"))
        .and(header("authorization", "Bearer access-new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "user-1",
            "email": "ada@example.com",
            "name": "Ada",
        })))
        .mount(server)
        .await;
}

fn query_map(url: &Url) -> HashMap<String, String> {
    url.query_pairs().into_owned().collect()
}

async fn login_state(manager: &IdentitySessionManager) -> (Url, HashMap<String, String>) {
    let Navigation::Redirect(url) = manager.login().await.unwrap();
    let params = query_map(&url);
    (url, params)
}

#[tokio::test]
async fn login_builds_pkce_authorization_redirect() {
    let server = MockServer::start().await;
    let storage = SharedStorage::in_memory();
    let tab = storage.tab();
    let (manager, context) = manager(&server, tab.clone(), HOME);

    let (url, params) = login_state(&manager).await;
    assert_eq!(url.path(), "/oauth2/authorize");
    assert_eq!(params["client_id"], "client-1");
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["redirect_uri"], "http://localhost:8080/callback");
    assert_eq!(params["scope"], "openid profile email");
    assert_eq!(params["code_challenge_method"], "S256");
    assert!(tab.get_item(&format!("oidc.{}", params["state"])).is_some());
    assert_eq!(context.identity.get(), None);
}

#[tokio::test]
async fn metadata_is_discovered_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": server.uri(),
            "authorization_endpoint": format!("{}/authorize", server.uri()),
            "token_endpoint": format!("{}/token", server.uri()),
            "userinfo_endpoint": format!("{}/userinfo", server.uri()),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut settings = settings(&server);
    settings.metadata = None;
    let oidc = OidcClient::new(settings, SharedStorage::in_memory().tab()).unwrap();
    let first = oidc.signin_redirect().await.unwrap();
    let second = oidc.signin_redirect().await.unwrap();
    assert_eq!(first.path(), "/authorize");
    assert_eq!(second.path(), "/authorize");

    let err = oidc.signout_redirect().await.unwrap_err();
    assert!(err.message.contains("end-session"));
}

#[tokio::test]
async fn callback_exchanges_code_once_and_replay_is_a_noop() {
    let server = MockServer::start().await;
    mount_token_and_userinfo(&server).await;
    let storage = SharedStorage::in_memory();
    let (manager, context) = manager(&server, storage.tab(), HOME);
    let (_, params) = login_state(&manager).await;

    let callback = Url::parse(&format!(
        "http://localhost:8080/callback?code=abc&state={}",
        params["state"]
    ))
    .unwrap();
    manager.set_location(callback.clone());
    let outcome = manager.handle_redirect_callback().await.unwrap();

    let CallbackOutcome::SignedIn(signed_in) = outcome else {
        panic!("expected sign-in, got {outcome:?}");
    };
    assert_eq!(signed_in.subject, "user-1");
    assert_eq!(signed_in.label(), "ada@example.com");
    assert_eq!(context.identity.get(), Some(signed_in.clone()));
    assert_eq!(manager.location().as_str(), HOME);

    manager.set_location(callback);
    let replay = manager.handle_redirect_callback().await.unwrap();
    assert_eq!(replay, CallbackOutcome::AlreadyConsumed);
    assert_eq!(context.identity.get(), Some(signed_in));

    let requests = server.received_requests().await.unwrap();
    let token_request = requests
        .iter()
        .find(|r| r.url.path() == "/oauth2/token")
        .unwrap();
    let form: HashMap<String, String> = url::form_urlencoded::parse(&token_request.body)
        .into_owned()
        .collect();
    assert_eq!(pkce_challenge(&form["code_verifier"]), params["code_challenge"]);
    assert_eq!(form["client_id"], "client-1");
}

#[tokio::test]
async fn startup_on_callback_location_signs_in() {
    let server = MockServer::start().await;
    mount_token_and_userinfo(&server).await;
    let storage = SharedStorage::in_memory();

    let (first_visit, _) = manager(&server, storage.tab(), HOME);
    let (_, params) = login_state(&first_visit).await;

    let location = format!("http://localhost:8080/callback?code=abc&state={}", params["state"]);
    let (manager, context) = manager(&server, storage.tab(), &location);
    let _listeners = manager.startup().await;

    assert_eq!(context.identity.get().map(|i| i.subject), Some("user-1".to_string()));
    assert!(!manager.is_callback_location());
}

#[tokio::test]
async fn callback_failures_leave_identity_untouched() {
    let server = MockServer::start().await;
    let storage = SharedStorage::in_memory();
    let (manager, context) = manager(&server, storage.tab(), HOME);

    let err = manager.handle_redirect_callback().await.unwrap_err();
    assert!(matches!(err, AuthCallbackError::NotCallback(_)));

    manager.set_location(Url::parse("http://localhost:8080/callback?code=zzz&state=unknown").unwrap());
    let err = manager.handle_redirect_callback().await.unwrap_err();
    assert!(matches!(err, AuthCallbackError::NoMatchingState));

    manager.set_location(
        Url::parse("http://localhost:8080/callback?error=access_denied&error_description=nope")
            .unwrap(),
    );
    let err = manager.handle_redirect_callback().await.unwrap_err();
    assert!(matches!(err, AuthCallbackError::Provider { ref error, .. } if error == "access_denied"));

    assert_eq!(context.identity.get(), None);
}

#[tokio::test]
async fn rejected_code_exchange_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "code expired",
        })))
        .mount(&server)
        .await;
    let storage = SharedStorage::in_memory();
    let (manager, context) = manager(&server, storage.tab(), HOME);
    let (_, params) = login_state(&manager).await;

    manager.set_location(
        Url::parse(&format!("http://localhost:8080/callback?code=abc&state={}", params["state"]))
            .unwrap(),
    );
    let err = manager.handle_redirect_callback().await.unwrap_err();
    let AuthCallbackError::TokenExchange(api) = err else {
        panic!("expected token exchange failure");
    };
    assert!(api.is_auth());
    assert_eq!(api.message, "invalid_grant: code expired");
    assert_eq!(context.identity.get(), None);
}

#[tokio::test]
async fn restore_discards_expired_sessions() {
    let server = MockServer::start().await;
    let storage = SharedStorage::in_memory();
    let tab = storage.tab();
    let expired = stored_user("old", unix_now() - 10);
    tab.set_item(&user_key(&server), serde_json::to_string(&expired).unwrap());

    let (manager, context) = manager(&server, tab.clone(), HOME);
    let _listeners = manager.startup().await;

    assert_eq!(context.identity.get(), None);
    assert_eq!(tab.get_item(&user_key(&server)), None);
}

#[tokio::test]
async fn logout_in_one_tab_clears_every_tab() {
    let server = MockServer::start().await;
    let storage = SharedStorage::in_memory();
    let user = stored_user("user-1", unix_now() + 3600);
    storage
        .tab()
        .set_item(&user_key(&server), serde_json::to_string(&user).unwrap());

    let (tab_a, context_a) = manager(&server, storage.tab(), HOME);
    let (tab_b, context_b) = manager(&server, storage.tab(), HOME);
    let _listeners_a = tab_a.startup().await;
    let _listeners_b = tab_b.startup().await;
    assert_eq!(context_a.identity.get(), Some(user.identity.clone()));
    assert_eq!(context_b.identity.get(), Some(user.identity.clone()));
    context_b
        .files
        .update(|prev| prev.with_remote_listing(&["secret.pdf".to_string()]));
    assert_eq!(context_b.stored_file_names(), vec!["secret.pdf"]);

    let Navigation::Redirect(end_session) = tab_a.logout().await.unwrap();
    assert_eq!(end_session.path(), "/logout");
    let params = query_map(&end_session);
    assert_eq!(params["client_id"], "client-1");
    assert_eq!(params["logout_uri"], "http://localhost:8080/logout");

    assert_eq!(context_a.identity.get(), None);
    eventually(|| context_b.identity.get().is_none()).await;
    eventually(|| context_b.files.get().is_empty()).await;
    assert_eq!(storage.tab().get_item(&user_key(&server)), None);
    assert_eq!(storage.tab().get_item("logout"), None);
}

#[tokio::test]
async fn silent_renew_keeps_refresh_token_and_auth_failure_expires() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-2",
            "expires_in": 3600,
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })))
        .mount(&server)
        .await;

    let storage = SharedStorage::in_memory();
    let tab = storage.tab();
    let user = stored_user("user-1", unix_now() + 60);
    tab.set_item(&user_key(&server), serde_json::to_string(&user).unwrap());
    let (manager, context) = manager(&server, tab, HOME);
    let _listeners = manager.startup().await;

    let renewed = manager.renew_silently().await.unwrap();
    assert_eq!(renewed.subject, "user-1");
    let stored = manager.oidc().get_user().unwrap();
    assert_eq!(stored.access_token, "access-2");
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
    eventually(|| context.identity.get().and_then(|i| i.expires_at) == renewed.expires_at).await;
    context
        .files
        .update(|prev| prev.with_remote_listing(&["draft.docx".to_string()]));

    let err = manager.renew_silently().await.unwrap_err();
    assert!(err.is_auth());
    assert_eq!(context.identity.get(), None);
    assert!(context.files.get().is_empty());
    assert_eq!(manager.oidc().get_user(), None);
}
