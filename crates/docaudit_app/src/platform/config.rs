//! Optional `ron` configuration file for the docaudit binary.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use client_logging::client_info;
use docaudit_engine::{ClientSettings, OidcSettings, ProviderMetadata};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "docaudit.ron";
pub const STORAGE_FILENAME: &str = "storage.ron";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base: Url,
    pub authority: Url,
    pub client_id: String,
    pub redirect_uri: Url,
    pub post_logout_redirect_uri: Url,
    pub scope: String,
    /// Cognito-style hosted sign-in domain; skips discovery when set.
    pub hosted_domain: Option<Url>,
    pub state_dir: PathBuf,
    pub query_timeout_secs: u64,
    pub allowed_content_types: Option<Vec<String>>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let client = ClientSettings::default();
        let oidc = OidcSettings::default();
        Self {
            api_base: client.api_base,
            authority: oidc.authority,
            client_id: oidc.client_id,
            redirect_uri: oidc.redirect_uri,
            post_logout_redirect_uri: oidc.post_logout_redirect_uri,
            scope: oidc.scope,
            hosted_domain: None,
            state_dir: PathBuf::from(".docaudit"),
            query_timeout_secs: client.query_timeout.as_secs(),
            allowed_content_types: None,
        }
    }
}

impl AppConfig {
    /// Reads `path`. Only the default file may be missing.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound && !explicit => {
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("reading config {}", path.display()))
            }
        };
        let config = Self::parse(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        client_info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(text)?)
    }

    pub fn storage_path(&self) -> PathBuf {
        self.state_dir.join(STORAGE_FILENAME)
    }

    pub fn client_settings(&self) -> ClientSettings {
        let mut settings = ClientSettings::with_api_base(self.api_base.clone());
        settings.query_timeout = Duration::from_secs(self.query_timeout_secs);
        if let Some(allowed) = &self.allowed_content_types {
            settings.allowed_content_types = allowed.clone();
        }
        settings
    }

    pub fn oidc_settings(&self) -> anyhow::Result<OidcSettings> {
        let metadata = self
            .hosted_domain
            .as_ref()
            .map(|domain| ProviderMetadata::hosted_domain(self.authority.as_str(), domain))
            .transpose()
            .context("building hosted-domain endpoints")?;
        Ok(OidcSettings {
            authority: self.authority.clone(),
            client_id: self.client_id.clone(),
            redirect_uri: self.redirect_uri.clone(),
            post_logout_redirect_uri: self.post_logout_redirect_uri.clone(),
            scope: self.scope.clone(),
            metadata,
            ..OidcSettings::default()
        })
    }

    /// Where this process "is": the origin the provider redirects back to.
    pub fn home_location(&self) -> Url {
        let mut home = self.redirect_uri.clone();
        home.set_path("/");
        home.set_query(None);
        home
    }
}
