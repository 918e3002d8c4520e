//! Chat Request API
//!
//! The request/response half of the protocol. Sending a prompt is a single
//! `POST {base_url}/api/chat/message`; the answer itself arrives later over
//! the push channel, so the only thing this call returns is the server's
//! conversation ID.
//!
//! # Wire Format
//!
//! ```text
//! request:  {"message": "<text>", "sessionId": "<optional id>"}
//! success:  {"success": true,  "data": {"sessionId": "<id>", ...}}
//! failure:  {"success": false, "error": "<message>"}   (or any non-2xx)
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Path of the chat endpoint relative to the API base URL
pub const CHAT_MESSAGE_PATH: &str = "/api/chat/message";

/// Errors from the chat request API
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server refused the request (non-2xx or `success: false`)
    #[error("{0}")]
    Rejected(String),

    /// The request never got a response
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with something that is not a chat response
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The HTTP client could not be constructed
    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

/// What a successful send returns
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendReceipt {
    /// Server-side conversation ID, to pass on follow-up requests
    pub session_id: String,
}

/// Anything that can deliver a chat request
///
/// [`ChatApiClient`] is the HTTP implementation; tests substitute their own.
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    /// Send one user message, optionally continuing a conversation
    async fn send_request(
        &self,
        text: &str,
        session_id: Option<&str>,
    ) -> Result<SendReceipt, ApiError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequestBody<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<ChatResponseData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatResponseData {
    session_id: Option<String>,
}

/// HTTP client for the chat endpoint
#[derive(Clone, Debug)]
pub struct ChatApiClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl ChatApiClient {
    /// Create a client for `base_url` (e.g. `http://localhost:3001`)
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Client(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// Base URL without trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of the chat endpoint
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}{CHAT_MESSAGE_PATH}", self.base_url)
    }
}

#[async_trait]
impl ChatBackend for ChatApiClient {
    async fn send_request(
        &self,
        text: &str,
        session_id: Option<&str>,
    ) -> Result<SendReceipt, ApiError> {
        let url = self.endpoint();
        tracing::debug!(url = %url, session_id = ?session_id, "Sending chat request");

        let response = self
            .http_client
            .post(&url)
            .json(&ChatRequestBody {
                message: text,
                session_id,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        interpret_response(status, &body)
    }
}

/// Turn a raw HTTP status and body into a receipt or an error
pub fn interpret_response(status: StatusCode, body: &str) -> Result<SendReceipt, ApiError> {
    let parsed = serde_json::from_str::<ChatResponseBody>(body);

    if !status.is_success() {
        let message = parsed
            .ok()
            .and_then(|b| b.error)
            .unwrap_or_else(|| format!("Server returned {status}"));
        tracing::warn!(status = %status, error = %message, "Chat request rejected");
        return Err(ApiError::Rejected(message));
    }

    let parsed = parsed.map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
    if !parsed.success {
        let message = parsed
            .error
            .unwrap_or_else(|| "Request failed".to_string());
        tracing::warn!(error = %message, "Chat request rejected");
        return Err(ApiError::Rejected(message));
    }

    parsed
        .data
        .and_then(|data| data.session_id)
        .map(|session_id| SendReceipt { session_id })
        .ok_or_else(|| ApiError::InvalidResponse("missing data.sessionId".to_string()))
}
