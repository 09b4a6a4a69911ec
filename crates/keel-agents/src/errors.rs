//! Outreach error taxonomy with retry classification.
//!
//! Callers branch on `retry_category()` instead of matching strings. Expected
//! per-message failures never reach [`OutreachError`]: senders return a
//! `DeliveryResult` tagged with a [`RetryCategory`] and the model router
//! returns fallback text.
//!
//! ## Retry categories
//!
//! | Category       | Retriable | Charges a step attempt |
//! |----------------|-----------|------------------------|
//! | Transient      | yes       | yes                    |
//! | RateLimit      | yes       | yes                    |
//! | CircuitOpen    | yes       | no (service-wide)      |
//! | Configuration  | no        | no (service-wide)      |
//! | NotFound       | no        | yes                    |
//! | Conflict       | no        | yes                    |

use std::fmt;

use coordination::{CampaignValidationError, IllegalTransition};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::TransportError;

/// Classification used to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryCategory {
    /// Network / provider error: safe to retry.
    Transient,
    /// Provider rate limit: retry with back-off.
    RateLimit,
    /// Breaker is open: retry once the reset timeout has elapsed.
    CircuitOpen,
    /// Missing or rejected credentials, bad model name: do not retry.
    Configuration,
    /// Referenced entity does not exist: do not retry.
    NotFound,
    /// Request conflicts with current state: do not retry.
    Conflict,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Transient | Self::RateLimit | Self::CircuitOpen)
    }

    /// Whether a failure in this category is held against the campaign step.
    ///
    /// An open breaker or rejected credentials affect every send to the
    /// service alike, so they never push an enrollment toward abandonment.
    pub fn charges_attempt(self) -> bool {
        !matches!(self, Self::CircuitOpen | Self::Configuration)
    }
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::CircuitOpen => write!(f, "circuit_open"),
            Self::Configuration => write!(f, "configuration"),
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
        }
    }
}

/// Unified error type for the outreach runtime.
#[derive(Debug, Error)]
pub enum OutreachError {
    // ── Retriable ─────────────────────────────────────────────────────────
    /// Provider request failed (network, timeout, 5xx).
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Provider rate limit.
    #[error("Rate limit: {0}")]
    RateLimit(String),

    // ── Non-retriable ─────────────────────────────────────────────────────
    /// Configuration is invalid, missing, or rejected by the provider.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Referenced lead / campaign / enrollment does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Campaign steps are unusable.
    #[error("Invalid campaign: {0}")]
    InvalidCampaign(#[from] CampaignValidationError),

    /// Lead already has an active enrollment in the campaign.
    #[error("Lead {lead_id} already has an active enrollment in campaign {campaign_id}")]
    DuplicateEnrollment {
        lead_id: String,
        campaign_id: String,
    },

    /// Enrollment state machine rejected a transition.
    #[error("{0}")]
    IllegalTransition(#[from] IllegalTransition),

    /// Repository backend failed.
    #[error("Repository error: {0}")]
    Repository(String),

    /// Any other error that doesn't fit the above categories.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OutreachError {
    /// Classify this error for retry logic.
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::Transport(_) => RetryCategory::Transient,
            Self::RateLimit(_) => RetryCategory::RateLimit,
            Self::Configuration(_) => RetryCategory::Configuration,
            Self::NotFound { .. } => RetryCategory::NotFound,
            Self::InvalidCampaign(_) => RetryCategory::Configuration,
            Self::DuplicateEnrollment { .. } => RetryCategory::Conflict,
            Self::IllegalTransition(_) => RetryCategory::Conflict,
            Self::Repository(_) => RetryCategory::Transient,
            Self::Internal(_) => RetryCategory::Transient,
        }
    }

    /// Returns `true` if the caller may retry after this error.
    pub fn is_retriable(&self) -> bool {
        self.retry_category().is_retriable()
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl From<TransportError> for OutreachError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unauthorized(msg) => Self::Configuration(msg),
            TransportError::RateLimited(msg) => Self::RateLimit(msg),
            other => Self::Transport(other.to_string()),
        }
    }
}
