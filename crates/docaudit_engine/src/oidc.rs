//! Authorization-code-with-PKCE client for an OpenID Connect provider.
//!
//! Holds the signed-in user and pending sign-in state in [`StorageTab`], so a
//! session survives restarts and is shared by every tab of the same storage.
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use client_logging::{client_debug, client_info, client_warn};
use docaudit_core::Identity;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::{broadcast, OnceCell};
use url::Url;

use crate::api::TokenSource;
use crate::settings::{OidcSettings, ProviderMetadata};
use crate::storage::StorageTab;
use crate::types::{map_reqwest_error, unix_now};
use crate::{ApiError, ErrorKind};

const STATE_PREFIX: &str = "oidc.";
const USER_PREFIX: &str = "oidc.user:";
const DISCOVERY_PATH: &str = ".well-known/openid-configuration";
const STALE_STATE_AGE: i64 = 15 * 60;

#[derive(Debug, Error)]
pub enum AuthCallbackError {
    #[error("{0} is not the sign-in callback location")]
    NotCallback(String),
    #[error("callback is missing the `{0}` parameter")]
    MissingParameter(&'static str),
    #[error("provider refused sign-in: {error} {description}")]
    Provider { error: String, description: String },
    #[error("no pending sign-in matches this callback")]
    NoMatchingState,
    #[error("provider metadata unavailable: {0}")]
    Metadata(ApiError),
    #[error("code exchange failed: {0}")]
    TokenExchange(ApiError),
    #[error("user info request failed: {0}")]
    UserInfo(ApiError),
}

/// The signed-in user together with the tokens backing the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUser {
    pub identity: Identity,
    pub access_token: String,
    pub token_type: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

impl StoredUser {
    pub fn is_expired(&self) -> bool {
        self.identity.is_expired_at(unix_now())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    UserLoaded(StoredUser),
    UserUnloaded,
}

#[derive(Debug, Serialize, Deserialize)]
struct SigninState {
    code_verifier: String,
    nonce: String,
    redirect_uri: String,
    created_at: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "bearer")]
    token_type: String,
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
}

fn bearer() -> String {
    "Bearer".to_string()
}

#[derive(Deserialize)]
struct UserInfo {
    sub: String,
    name: Option<String>,
    preferred_username: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
struct TokenErrorBody {
    error: String,
    error_description: Option<String>,
}

pub struct OidcClient {
    settings: OidcSettings,
    http: reqwest::Client,
    storage: StorageTab,
    metadata: OnceCell<ProviderMetadata>,
    events: broadcast::Sender<ProviderEvent>,
}

impl OidcClient {
    pub fn new(settings: OidcSettings, storage: StorageTab) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ApiError::new(ErrorKind::Network, err.to_string()))?;
        let (events, _) = broadcast::channel(16);
        Ok(Self {
            settings,
            http,
            storage,
            metadata: OnceCell::new(),
            events,
        })
    }

    pub fn settings(&self) -> &OidcSettings {
        &self.settings
    }

    pub fn events(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    fn user_key(&self) -> String {
        format!(
            "{USER_PREFIX}{}:{}",
            self.settings.authority.as_str().trim_end_matches('/'),
            self.settings.client_id
        )
    }

    /// Configured metadata, or the discovery document fetched once and cached.
    pub async fn metadata(&self) -> Result<&ProviderMetadata, ApiError> {
        self.metadata
            .get_or_try_init(|| async {
                if let Some(configured) = &self.settings.metadata {
                    return Ok(configured.clone());
                }
                let url = discovery_url(&self.settings.authority)?;
                client_debug!("discovering provider metadata at {}", url);
                let response = self.http.get(url).send().await.map_err(map_reqwest_error)?;
                let status = response.status();
                if !status.is_success() {
                    return Err(ApiError::from_status(status.as_u16(), status.to_string()));
                }
                response
                    .json::<ProviderMetadata>()
                    .await
                    .map_err(map_reqwest_error)
            })
            .await
    }

    /// The persisted user, if any. Expired users are discarded.
    pub fn get_user(&self) -> Option<StoredUser> {
        let key = self.user_key();
        let raw = self.storage.get_item(&key)?;
        match serde_json::from_str::<StoredUser>(&raw) {
            Ok(user) if user.is_expired() => {
                client_info!("stored session for {} has expired", user.identity.label());
                self.storage.remove_item(&key);
                None
            }
            Ok(user) => Some(user),
            Err(err) => {
                client_warn!("discarding unreadable stored user: {}", err);
                self.storage.remove_item(&key);
                None
            }
        }
    }

    fn store_user(&self, user: &StoredUser) -> Result<(), ApiError> {
        let raw = serde_json::to_string(user)
            .map_err(|err| ApiError::new(ErrorKind::Validation, err.to_string()))?;
        self.storage.set_item(&self.user_key(), raw);
        Ok(())
    }

    /// Forgets the user in storage and announces it.
    pub fn remove_user(&self) {
        self.storage.remove_item(&self.user_key());
        let _ = self.events.send(ProviderEvent::UserUnloaded);
    }

    /// Builds the authorization URL and records the pending sign-in.
    pub async fn signin_redirect(&self) -> Result<Url, ApiError> {
        self.clear_stale_state();
        let metadata = self.metadata().await?;
        let state = random_token(16);
        let nonce = random_token(16);
        let code_verifier = random_token(32);
        let pending = SigninState {
            code_verifier: code_verifier.clone(),
            nonce: nonce.clone(),
            redirect_uri: self.settings.redirect_uri.to_string(),
            created_at: unix_now(),
        };
        let raw = serde_json::to_string(&pending)
            .map_err(|err| ApiError::new(ErrorKind::Validation, err.to_string()))?;
        self.storage.set_item(&format!("{STATE_PREFIX}{state}"), raw);

        let mut url = metadata.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("redirect_uri", self.settings.redirect_uri.as_str())
            .append_pair("response_type", &self.settings.response_type)
            .append_pair("scope", &self.settings.scope)
            .append_pair("state", &state)
            .append_pair("nonce", &nonce)
            .append_pair("code_challenge", &pkce_challenge(&code_verifier))
            .append_pair("code_challenge_method", "S256");
        Ok(url)
    }

    /// Completes sign-in from the provider's redirect back to the callback path.
    pub async fn signin_redirect_callback(
        &self,
        location: &Url,
    ) -> Result<StoredUser, AuthCallbackError> {
        let param = |name: &str| {
            location
                .query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };
        if let Some(error) = param("error") {
            return Err(AuthCallbackError::Provider {
                error,
                description: param("error_description").unwrap_or_default(),
            });
        }
        let code = param("code").ok_or(AuthCallbackError::MissingParameter("code"))?;
        let state = param("state").ok_or(AuthCallbackError::MissingParameter("state"))?;

        let state_key = format!("{STATE_PREFIX}{state}");
        let pending = self
            .storage
            .get_item(&state_key)
            .and_then(|raw| serde_json::from_str::<SigninState>(&raw).ok())
            .ok_or(AuthCallbackError::NoMatchingState)?;
        self.storage.remove_item(&state_key);

        let metadata = self.metadata().await.map_err(AuthCallbackError::Metadata)?;
        let tokens = self
            .token_request(
                &metadata.token_endpoint,
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code.as_str()),
                    ("redirect_uri", pending.redirect_uri.as_str()),
                    ("client_id", self.settings.client_id.as_str()),
                    ("code_verifier", pending.code_verifier.as_str()),
                ],
            )
            .await
            .map_err(AuthCallbackError::TokenExchange)?;
        let identity = self
            .user_info(&metadata.userinfo_endpoint, &tokens)
            .await
            .map_err(AuthCallbackError::UserInfo)?;

        let user = into_user(identity, tokens, None);
        self.store_user(&user).map_err(AuthCallbackError::TokenExchange)?;
        client_info!("signed in as {}", user.identity.label());
        let _ = self.events.send(ProviderEvent::UserLoaded(user.clone()));
        Ok(user)
    }

    /// Renews the session with the stored refresh token.
    pub async fn signin_silent(&self) -> Result<StoredUser, ApiError> {
        let current = self
            .storage
            .get_item(&self.user_key())
            .and_then(|raw| serde_json::from_str::<StoredUser>(&raw).ok())
            .ok_or_else(|| ApiError::new(ErrorKind::Auth, "no session to renew"))?;
        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or_else(|| ApiError::new(ErrorKind::Auth, "session has no refresh token"))?;
        let metadata = self.metadata().await?;
        let tokens = self
            .token_request(
                &metadata.token_endpoint,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token.as_str()),
                    ("client_id", self.settings.client_id.as_str()),
                ],
            )
            .await?;
        let mut identity = current.identity.clone();
        identity.expires_at = tokens.expires_in.map(|secs| unix_now() + secs);
        let user = into_user(identity, tokens, Some(refresh_token));
        self.store_user(&user)?;
        client_debug!("renewed session for {}", user.identity.label());
        let _ = self.events.send(ProviderEvent::UserLoaded(user.clone()));
        Ok(user)
    }

    /// Forgets the local user and returns the provider's end-session URL.
    pub async fn signout_redirect(&self) -> Result<Url, ApiError> {
        self.remove_user();
        let metadata = self.metadata().await?;
        let mut url = metadata.end_session_endpoint.clone().ok_or_else(|| {
            ApiError::new(ErrorKind::Validation, "provider has no end-session endpoint")
        })?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("logout_uri", self.settings.post_logout_redirect_uri.as_str());
        Ok(url)
    }

    /// Drops pending sign-ins that were never completed.
    pub fn clear_stale_state(&self) {
        let cutoff = unix_now() - STALE_STATE_AGE;
        for key in self.storage.keys_with_prefix(STATE_PREFIX) {
            if key.starts_with(USER_PREFIX) {
                continue;
            }
            let stale = self
                .storage
                .get_item(&key)
                .and_then(|raw| serde_json::from_str::<SigninState>(&raw).ok())
                .map_or(true, |state| state.created_at < cutoff);
            if stale {
                client_debug!("removing stale sign-in state {}", key);
                self.storage.remove_item(&key);
            }
        }
    }

    async fn token_request(
        &self,
        endpoint: &Url,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse, ApiError> {
        let response = self
            .http
            .post(endpoint.clone())
            .form(form)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<TokenErrorBody>(&text)
                .map(|body| match body.error_description {
                    Some(description) => format!("{}: {}", body.error, description),
                    None => body.error,
                })
                .unwrap_or_else(|_| status.to_string());
            return Err(ApiError::from_status(status.as_u16(), message).with_kind(ErrorKind::Auth));
        }
        response
            .json::<TokenResponse>()
            .await
            .map_err(map_reqwest_error)
    }

    async fn user_info(&self, endpoint: &Url, tokens: &TokenResponse) -> Result<Identity, ApiError> {
        let response = self
            .http
            .get(endpoint.clone())
            .bearer_auth(&tokens.access_token)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), status.to_string()));
        }
        let info = response.json::<UserInfo>().await.map_err(map_reqwest_error)?;
        let mut identity = Identity::new(info.sub);
        identity.display_name = info.name.or(info.preferred_username);
        identity.email = info.email;
        identity.expires_at = tokens.expires_in.map(|secs| unix_now() + secs);
        Ok(identity)
    }
}

impl TokenSource for OidcClient {
    fn access_token(&self) -> Option<String> {
        self.get_user().map(|user| user.access_token)
    }
}

fn into_user(identity: Identity, tokens: TokenResponse, previous_refresh: Option<String>) -> StoredUser {
    StoredUser {
        identity,
        access_token: tokens.access_token,
        token_type: tokens.token_type,
        id_token: tokens.id_token,
        refresh_token: tokens.refresh_token.or(previous_refresh),
        scope: tokens.scope,
    }
}

fn discovery_url(authority: &Url) -> Result<Url, ApiError> {
    let mut base = authority.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(DISCOVERY_PATH)
        .map_err(|err| ApiError::new(ErrorKind::Validation, err.to_string()))
}

fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `BASE64URL(SHA256(verifier))`, the S256 code challenge.
pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Seconds a session remains valid, for callers scheduling renewal.
pub fn remaining_lifetime(user: &StoredUser) -> Option<Duration> {
    user.identity
        .expires_at
        .map(|at| Duration::from_secs(at.saturating_sub(unix_now()).max(0) as u64))
}
