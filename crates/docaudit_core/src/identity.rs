use serde::{Deserialize, Serialize};

/// The resolved authenticated user. Absence (`None`) is the anonymous state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque subject identifier issued by the identity provider.
    pub subject: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    /// Access token expiry as unix seconds.
    pub expires_at: Option<i64>,
}

impl Identity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            display_name: None,
            email: None,
            expires_at: None,
        }
    }

    /// Label shown next to the logout control; falls back to the subject.
    pub fn label(&self) -> &str {
        self.email
            .as_deref()
            .or(self.display_name.as_deref())
            .unwrap_or(&self.subject)
    }

    pub fn is_expired_at(&self, now_unix: i64) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= now_unix)
    }
}

/// Where a settled identity value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Restored,
    Callback,
    ProviderLoaded,
    ProviderUnloaded,
    CrossTabLogout,
    Logout,
    AuthError,
}

impl IdentitySource {
    /// Sources that can only ever settle to anonymous.
    pub fn clears(self) -> bool {
        matches!(
            self,
            IdentitySource::ProviderUnloaded
                | IdentitySource::CrossTabLogout
                | IdentitySource::Logout
                | IdentitySource::AuthError
        )
    }
}

