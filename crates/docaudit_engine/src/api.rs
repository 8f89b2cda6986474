use std::sync::Arc;

use client_logging::{client_debug, client_warn};
use docaudit_core::{AgentReply, AuditRequest, QueryRequest};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::settings::ClientSettings;
use crate::types::{map_reqwest_error, Clock};
use crate::{ApiError, ErrorKind};

/// Supplies the bearer token attached to backend calls.
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// Short-lived permission to PUT one object directly into storage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadGrant {
    pub presigned_url: String,
    pub file_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackAck {
    pub received_at: String,
    pub status: String,
    pub message: String,
}

#[derive(Serialize)]
struct GrantBody<'a> {
    userid: &'a str,
    filename: &'a str,
    filetype: &'a str,
}

#[derive(Serialize)]
struct QueryBody<'a> {
    sent: &'a str,
    userid: &'a str,
    file_names: String,
    user_input: &'a str,
    template_name: &'a str,
    ai_provider: &'a str,
}

#[derive(Serialize)]
struct AuditBody<'a> {
    sent: &'a str,
    userid: &'a str,
    file_name: &'a str,
    style_guide_file_names: String,
    template_name: &'a str,
    ai_provider: &'a str,
}

#[derive(Serialize)]
struct FeedbackBody<'a> {
    created: &'a str,
    category: &'a str,
    feedback: &'a str,
    email: &'a str,
}

/// Reply envelope shared by the query, feedback and audit event payloads.
#[derive(Deserialize)]
pub(crate) struct ReplyEnvelope {
    #[serde(default)]
    pub received: Option<String>,
    #[serde(default)]
    pub status: Option<serde_json::Value>,
    #[serde(default)]
    pub ai_response: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ReplyEnvelope {
    pub(crate) fn status_text(&self) -> String {
        match &self.status {
            Some(serde_json::Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// HTTP client for the document-audit backend.
pub struct BackendApi {
    settings: ClientSettings,
    client: reqwest::Client,
    tokens: Option<Arc<dyn TokenSource>>,
    clock: Clock,
}

impl BackendApi {
    pub fn new(settings: ClientSettings, clock: Clock) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| ApiError::new(ErrorKind::Network, err.to_string()))?;
        Ok(Self {
            settings,
            client,
            tokens: None,
            clock,
        })
    }

    pub fn with_tokens(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn now(&self) -> String {
        (self.clock)()
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.tokens.as_ref().and_then(|t| t.access_token()) {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn request_grant(
        &self,
        subject: &str,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadGrant, ApiError> {
        let url = self.settings.endpoint(&self.settings.endpoints.presigned_url)?;
        let request = self
            .authorized(self.client.post(url))
            .timeout(self.settings.request_timeout)
            .json(&GrantBody {
                userid: subject,
                filename,
                filetype: content_type,
            });
        let response = send_checked(request).await?;
        response.json::<UploadGrant>().await.map_err(map_reqwest_error)
    }

    /// PUTs a body to a presigned URL. No bearer token: the URL carries its own authorization.
    pub async fn put_object(
        &self,
        presigned_url: &str,
        content_type: &str,
        content_length: u64,
        body: reqwest::Body,
    ) -> Result<(), ApiError> {
        let url = reqwest::Url::parse(presigned_url).map_err(|err| {
            ApiError::new(ErrorKind::Validation, format!("bad presigned url: {err}"))
        })?;
        let request = self
            .client
            .put(url)
            .timeout(self.settings.transfer_timeout)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, content_length)
            .body(body);
        send_checked(request).await?;
        Ok(())
    }

    pub async fn list_files(&self, subject: &str) -> Result<Vec<String>, ApiError> {
        let url = self.settings.endpoint(&self.settings.endpoints.uploaded_filenames)?;
        let request = self
            .authorized(self.client.get(url))
            .timeout(self.settings.request_timeout)
            .query(&[("userid", subject)]);
        let response = send_checked(request).await?;
        response.json::<Vec<String>>().await.map_err(map_reqwest_error)
    }

    pub async fn delete_file(&self, subject: &str, filename: &str) -> Result<(), ApiError> {
        let url = self.settings.endpoint(&self.settings.endpoints.uploaded_files)?;
        let request = self
            .authorized(self.client.delete(url))
            .timeout(self.settings.request_timeout)
            .query(&[("userid", subject), ("filename", filename)]);
        send_checked(request).await?;
        Ok(())
    }

    pub async fn send_query(&self, query: &QueryRequest) -> Result<AgentReply, ApiError> {
        let url = self.settings.endpoint(&self.settings.endpoints.ai_query)?;
        let body = QueryBody {
            sent: &query.sent_at,
            userid: &query.identity_subject,
            file_names: query.context_file_names.join(","),
            user_input: &query.user_text,
            template_name: query.template_kind.as_str(),
            ai_provider: query.provider_hint.as_str(),
        };
        client_debug!(
            "query with {} context files via {}",
            query.context_file_names.len(),
            body.ai_provider
        );
        let request = self
            .authorized(self.client.post(url))
            .timeout(self.settings.query_timeout)
            .json(&body);
        let response = send_checked(request).await?;
        let envelope = response
            .json::<ReplyEnvelope>()
            .await
            .map_err(map_reqwest_error)?;
        let status = envelope.status_text();
        Ok(AgentReply {
            received_at: envelope.received.unwrap_or_else(|| self.now()),
            status,
            reply_text: envelope.ai_response.unwrap_or_default(),
        })
    }

    pub async fn send_feedback(
        &self,
        category: &str,
        text: &str,
        email: &str,
    ) -> Result<FeedbackAck, ApiError> {
        let url = self.settings.endpoint(&self.settings.endpoints.feedback)?;
        let created = self.now();
        let request = self
            .authorized(self.client.post(url))
            .timeout(self.settings.request_timeout)
            .json(&FeedbackBody {
                created: &created,
                category,
                feedback: text,
                email,
            });
        let response = send_checked(request).await?;
        let envelope = response
            .json::<ReplyEnvelope>()
            .await
            .map_err(map_reqwest_error)?;
        let status = envelope.status_text();
        Ok(FeedbackAck {
            received_at: envelope.received.unwrap_or(created),
            status,
            message: envelope.message.or(envelope.ai_response).unwrap_or_default(),
        })
    }

    /// Opens the audit event stream. The request rides in the query string.
    pub async fn open_audit_stream(
        &self,
        audit: &AuditRequest,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.settings.endpoint(&self.settings.endpoints.ai_doc_audit)?;
        let body = AuditBody {
            sent: &audit.submitted_at,
            userid: &audit.identity_subject,
            file_name: &audit.target_file_name,
            style_guide_file_names: audit.selected_guide_sections.join(","),
            template_name: audit.template_kind.as_str(),
            ai_provider: audit.provider_hint.as_str(),
        };
        let encoded = serde_json::to_string(&body)
            .map_err(|err| ApiError::new(ErrorKind::Validation, err.to_string()))?;
        let request = self
            .authorized(self.client.get(url))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .query(&[("request", encoded.as_str())]);
        send_checked(request).await
    }
}

async fn send_checked(request: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
    let response = request.send().await.map_err(map_reqwest_error)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message.or(body.error))
        .unwrap_or_else(|| status.to_string());
    client_warn!("backend answered {}: {}", status.as_u16(), message);
    Err(ApiError::from_status(status.as_u16(), message))
}
