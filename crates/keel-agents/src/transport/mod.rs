//! Provider transports.
//!
//! Each transport is a thin `reqwest` adapter behind an `async_trait` so the
//! model router and channel senders can be driven by fakes in tests. None of
//! them know about circuit breakers or simulation; callers add that.

pub mod mailgun;
pub mod openrouter;
pub mod twilio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::RetryCategory;

pub use mailgun::MailgunTransport;
pub use openrouter::OpenRouterTransport;
pub use twilio::TwilioTransport;

/// Provider call failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// 401/403: credentials missing or rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("provider returned {status}: {body}")]
    Server { status: u16, body: String },

    /// 4xx other than auth / rate limit.
    #[error("request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Map a non-success HTTP status and body.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => Self::Unauthorized(body),
            429 => Self::RateLimited(body),
            400..=499 => Self::Rejected { status, body },
            _ => Self::Server { status, body },
        }
    }

    /// Whether the failure says something about the provider's health.
    ///
    /// Credential and request-shape problems do not; they must not trip a breaker.
    pub fn counts_against_breaker(&self) -> bool {
        !matches!(self, Self::Unauthorized(_) | Self::Rejected { .. })
    }

    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::Unauthorized(_) => RetryCategory::Configuration,
            Self::RateLimited(_) => RetryCategory::RateLimit,
            _ => RetryCategory::Transient,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// Read a response, mapping non-2xx statuses to [`TransportError`].
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::from_status(status.as_u16(), body))
}

// ── LLM ─────────────────────────────────────────────────────────────────

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// Requested response encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Text,
    JsonObject,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub tokens_used: Option<u32>,
}

/// "Call model M with messages, get text back or failure."
#[async_trait]
pub trait LlmTransport: Send + Sync {
    async fn complete(&self, request: &CompletionRequest)
        -> Result<CompletionResponse, TransportError>;
}

// ── Email ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailPayload {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmailReceipt {
    pub id: String,
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send_email(&self, payload: &EmailPayload) -> Result<EmailReceipt, TransportError>;
}

// ── SMS ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmsPayload {
    pub to: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SmsReceipt {
    pub sid: String,
    #[serde(default)]
    pub status: String,
}

#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send_sms(&self, payload: &SmsPayload) -> Result<SmsReceipt, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            TransportError::from_status(401, "bad key"),
            TransportError::Unauthorized(_)
        ));
        assert!(matches!(
            TransportError::from_status(429, ""),
            TransportError::RateLimited(_)
        ));
        assert!(matches!(
            TransportError::from_status(422, "bad to"),
            TransportError::Rejected { status: 422, .. }
        ));
        assert!(matches!(
            TransportError::from_status(502, ""),
            TransportError::Server { status: 502, .. }
        ));
    }

    #[test]
    fn test_breaker_relevance() {
        assert!(!TransportError::Unauthorized("x".into()).counts_against_breaker());
        assert!(!TransportError::from_status(400, "x").counts_against_breaker());
        assert!(TransportError::Timeout("x".into()).counts_against_breaker());
        assert!(TransportError::from_status(503, "x").counts_against_breaker());
    }
}
