use std::time::Duration;

use docaudit_core::DEFAULT_ALLOWED_TYPES;
use serde::Deserialize;
use url::Url;

use crate::{ApiError, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub presigned_url: String,
    pub uploaded_filenames: String,
    pub uploaded_files: String,
    pub ai_query: String,
    pub ai_doc_audit: String,
    pub feedback: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            presigned_url: "/api/presigned-url".to_string(),
            uploaded_filenames: "/api/uploaded-filenames".to_string(),
            uploaded_files: "/api/uploaded-files".to_string(),
            ai_query: "/api/ai-query".to_string(),
            ai_doc_audit: "/api/ai-doc-audit".to_string(),
            feedback: "/api/feedback".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_base: Url,
    pub connect_timeout: Duration,
    /// Ordinary calls: grants, listing, deletion, feedback.
    pub request_timeout: Duration,
    /// Conversational round trips wait on a generative model.
    pub query_timeout: Duration,
    /// Direct-to-storage transfers.
    pub transfer_timeout: Duration,
    pub transfer_chunk_size: usize,
    pub allowed_content_types: Vec<String>,
    pub endpoints: Endpoints,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base: Url::parse("http://localhost:8080/").expect("static url"),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            query_timeout: Duration::from_secs(5 * 60),
            transfer_timeout: Duration::from_secs(10 * 60),
            transfer_chunk_size: 64 * 1024,
            allowed_content_types: DEFAULT_ALLOWED_TYPES
                .iter()
                .map(|ct| ct.to_string())
                .collect(),
            endpoints: Endpoints::default(),
        }
    }
}

impl ClientSettings {
    pub fn with_api_base(api_base: Url) -> Self {
        Self {
            api_base,
            ..Self::default()
        }
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.api_base
            .join(path)
            .map_err(|err| ApiError::new(ErrorKind::Validation, format!("bad endpoint {path}: {err}")))
    }
}

/// Provider endpoints, either configured explicitly or discovered.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub userinfo_endpoint: Url,
    #[serde(default)]
    pub end_session_endpoint: Option<Url>,
}

impl ProviderMetadata {
    /// Endpoint layout of a Cognito hosted-UI domain.
    pub fn hosted_domain(issuer: impl Into<String>, domain: &Url) -> Result<Self, url::ParseError> {
        Ok(Self {
            issuer: issuer.into(),
            authorization_endpoint: domain.join("/oauth2/authorize")?,
            token_endpoint: domain.join("/oauth2/token")?,
            userinfo_endpoint: domain.join("/oauth2/userInfo")?,
            end_session_endpoint: Some(domain.join("/logout")?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct OidcSettings {
    pub authority: Url,
    pub client_id: String,
    pub redirect_uri: Url,
    pub post_logout_redirect_uri: Url,
    pub scope: String,
    pub response_type: String,
    /// `None` means discover from `{authority}/.well-known/openid-configuration`.
    pub metadata: Option<ProviderMetadata>,
    pub request_timeout: Duration,
}

impl Default for OidcSettings {
    fn default() -> Self {
        Self {
            authority: Url::parse("http://localhost:9000/").expect("static url"),
            client_id: "docaudit-client".to_string(),
            redirect_uri: Url::parse("http://localhost:8080/callback").expect("static url"),
            post_logout_redirect_uri: Url::parse("http://localhost:8080/logout")
                .expect("static url"),
            scope: "openid profile email".to_string(),
            response_type: "code".to_string(),
            metadata: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl OidcSettings {
    /// Path on which the provider redirects back with the one-time code.
    pub fn callback_path(&self) -> &str {
        self.redirect_uri.path()
    }
}
