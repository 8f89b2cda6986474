//! Keeps the shared identity consistent with the provider, this tab's
//! location and logouts performed in other tabs.
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use client_logging::{client_debug, client_info, client_warn};
use docaudit_core::{ContextStore, Identity, IdentitySource};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use url::Url;

use crate::oidc::{AuthCallbackError, OidcClient, ProviderEvent};
use crate::storage::StorageTab;
use crate::types::unix_now;
use crate::ApiError;

/// Storage key another tab writes to announce a logout.
pub const LOGOUT_BROADCAST_KEY: &str = "logout";

/// Where the host must send the user next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Redirect(Url),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    SignedIn(Identity),
    /// The code was already exchanged; identity left untouched.
    AlreadyConsumed,
}

/// Background listeners started by [`IdentitySessionManager::startup`].
/// Dropping this detaches them.
pub struct SessionListeners {
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for SessionListeners {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

pub struct IdentitySessionManager {
    oidc: Arc<OidcClient>,
    storage: StorageTab,
    context: ContextStore,
    location: Mutex<Url>,
    consumed_codes: Mutex<HashSet<String>>,
}

impl IdentitySessionManager {
    pub fn new(
        oidc: Arc<OidcClient>,
        storage: StorageTab,
        context: ContextStore,
        location: Url,
    ) -> Arc<Self> {
        Arc::new(Self {
            oidc,
            storage,
            context,
            location: Mutex::new(location),
            consumed_codes: Mutex::new(HashSet::new()),
        })
    }

    pub fn oidc(&self) -> &Arc<OidcClient> {
        &self.oidc
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.context.identity.get()
    }

    pub fn location(&self) -> Url {
        lock(&self.location).clone()
    }

    /// Host navigation, e.g. the provider redirecting back to us.
    pub fn set_location(&self, location: Url) {
        *lock(&self.location) = location;
    }

    pub fn is_callback_location(&self) -> bool {
        self.location().path() == self.oidc.settings().callback_path()
    }

    /// Subscribes to provider and cross-tab events, restores any persisted
    /// session, then completes a pending callback if this tab is on one.
    pub async fn startup(self: &Arc<Self>) -> SessionListeners {
        let listeners = self.listen();
        let restored = self.oidc.get_user().map(|user| user.identity);
        self.settle(IdentitySource::Restored, restored);
        if self.is_callback_location() {
            if let Err(err) = self.handle_redirect_callback().await {
                client_warn!("sign-in callback failed: {}", err);
            }
        }
        listeners
    }

    fn listen(self: &Arc<Self>) -> SessionListeners {
        let mut provider_events = self.oidc.events();
        let manager = Arc::clone(self);
        let provider_task = tokio::spawn(async move {
            loop {
                match provider_events.recv().await {
                    Ok(ProviderEvent::UserLoaded(user)) => {
                        manager.settle(IdentitySource::ProviderLoaded, Some(user.identity));
                    }
                    Ok(ProviderEvent::UserUnloaded) => {
                        manager.settle(IdentitySource::ProviderUnloaded, None);
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let mut storage_events = self.storage.subscribe();
        let manager = Arc::clone(self);
        let storage_task = tokio::spawn(async move {
            while let Some(event) = storage_events.recv().await {
                if event.key == LOGOUT_BROADCAST_KEY && event.new_value.is_some() {
                    client_info!("logout announced by tab {}", event.origin);
                    manager.oidc.remove_user();
                    manager.settle(IdentitySource::CrossTabLogout, None);
                }
            }
        });

        SessionListeners {
            tasks: vec![provider_task, storage_task],
        }
    }

    /// Records the pending sign-in and returns the provider authorization URL.
    pub async fn login(&self) -> Result<Navigation, ApiError> {
        let url = self.oidc.signin_redirect().await?;
        client_debug!("redirecting to provider for sign-in");
        Ok(Navigation::Redirect(url))
    }

    /// Clears the local session, tells other tabs, and returns the provider
    /// end-session URL. The local session is cleared even if that URL fails.
    pub async fn logout(&self) -> Result<Navigation, ApiError> {
        let result = self.oidc.signout_redirect().await;
        self.settle(IdentitySource::Logout, None);
        self.storage
            .set_item(LOGOUT_BROADCAST_KEY, unix_now().to_string());
        self.storage.remove_item(LOGOUT_BROADCAST_KEY);
        result.map(Navigation::Redirect)
    }

    /// Exchanges the code in the current location. Replaying a consumed code
    /// is a no-op.
    pub async fn handle_redirect_callback(&self) -> Result<CallbackOutcome, AuthCallbackError> {
        let location = self.location();
        if !self.is_callback_location() {
            return Err(AuthCallbackError::NotCallback(location.to_string()));
        }
        if let Some(code) = location
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned())
        {
            if !lock(&self.consumed_codes).insert(code) {
                client_debug!("callback code already consumed");
                return Ok(CallbackOutcome::AlreadyConsumed);
            }
        }
        let user = self.oidc.signin_redirect_callback(&location).await?;
        self.replace_location_without_query();
        self.settle(IdentitySource::Callback, Some(user.identity.clone()));
        Ok(CallbackOutcome::SignedIn(user.identity))
    }

    /// Refresh-token renewal. An auth rejection ends the session.
    pub async fn renew_silently(&self) -> Result<Identity, ApiError> {
        match self.oidc.signin_silent().await {
            Ok(user) => Ok(user.identity),
            Err(err) => {
                client_warn!("silent renew failed: {}", err);
                if err.is_auth() {
                    self.expire_session();
                }
                Err(err)
            }
        }
    }

    /// Drops the session after the backend rejected its token.
    pub fn expire_session(&self) {
        self.oidc.remove_user();
        self.settle(IdentitySource::AuthError, None);
    }

    fn replace_location_without_query(&self) {
        let mut location = lock(&self.location);
        location.set_query(None);
        location.set_fragment(None);
        location.set_path("/");
    }

    /// Anonymous outcomes tear down the whole shared context, files included.
    fn settle(&self, source: IdentitySource, identity: Option<Identity>) {
        match identity.filter(|_| !source.clears()) {
            Some(user) => {
                client_debug!("identity settled from {:?}: {}", source, user.label());
                self.context.identity.set(Some(user));
            }
            None if source.clears() => {
                client_debug!("session torn down by {:?}", source);
                self.context.reset();
            }
            None => {
                client_debug!("no identity from {:?}", source);
                self.context.identity.set(None);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
