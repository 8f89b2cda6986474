//! Sign-in steps the CLI drives. Failures are logged and fall back to the
//! anonymous landing message; they never end the process with an error.
use client_logging::client_warn;
use docaudit_engine::{CallbackOutcome, IdentitySessionManager, Navigation};
use url::Url;

pub const LANDING: &str = "Sign in to use the document auditor: run `docaudit login`.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInStep {
    /// Open this provider URL to continue.
    Redirect(Url),
    SignedIn(String),
    AlreadyUsed,
    /// Could not sign in; show the landing message.
    Landing,
}

impl SignInStep {
    pub fn describe(&self) -> String {
        match self {
            SignInStep::Redirect(url) => format!("Open this URL to sign in:\n{url}"),
            SignInStep::SignedIn(label) => format!("Signed in as {label}"),
            SignInStep::AlreadyUsed => "This sign-in link was already used.".to_string(),
            SignInStep::Landing => LANDING.to_string(),
        }
    }
}

pub async fn begin_sign_in(session: &IdentitySessionManager) -> SignInStep {
    match session.login().await {
        Ok(Navigation::Redirect(url)) => SignInStep::Redirect(url),
        Err(err) => {
            client_warn!("sign-in unavailable: {}", err);
            SignInStep::Landing
        }
    }
}

/// Completes the provider redirect that landed on `url`.
pub async fn complete_sign_in(session: &IdentitySessionManager, url: Url) -> SignInStep {
    session.set_location(url);
    match session.handle_redirect_callback().await {
        Ok(CallbackOutcome::SignedIn(identity)) => {
            SignInStep::SignedIn(identity.label().to_string())
        }
        Ok(CallbackOutcome::AlreadyConsumed) => SignInStep::AlreadyUsed,
        Err(err) => {
            client_warn!("sign-in callback failed: {}", err);
            SignInStep::Landing
        }
    }
}
