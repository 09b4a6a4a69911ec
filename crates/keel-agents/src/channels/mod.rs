//! Outbound channel senders.
//!
//! A sender turns an [`OutboundMessage`] into a [`DeliveryResult`]. It never
//! returns an error. An unconfigured sender always simulates. A configured
//! one reports provider failures, an open breaker and a blank recipient as
//! `DeliveryStatus::Failed` with a [`RetryCategory`]. Every attempt, simulated
//! or not, is appended to the lead's decision log.
//!
//! | Sender        | Provider | Breaker  | Unconfigured      |
//! |---------------|----------|----------|-------------------|
//! | `EmailSender` | Mailgun  | mailgun  | simulated success |
//! | `SmsSender`   | Twilio   | twilio   | simulated success |

pub mod email;
pub mod sms;

use std::sync::Arc;

use async_trait::async_trait;
use coordination::{AgentType, Channel, NewDecision};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::errors::RetryCategory;
use crate::repository::LeadRepository;

pub use email::EmailSender;
pub use sms::SmsSender;

/// Campaign position of a message, when it comes from a scheduled step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepContext {
    pub campaign_id: String,
    pub enrollment_id: String,
    pub step_index: usize,
}

/// A message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub lead_id: String,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub step: Option<StepContext>,
}

impl OutboundMessage {
    pub fn new(
        lead_id: impl Into<String>,
        recipient: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            lead_id: lead_id.into(),
            recipient: recipient.into(),
            subject: None,
            body: body.into(),
            step: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_step(mut self, step: StepContext) -> Self {
        self.step = Some(step);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Simulated,
    Failed,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Simulated => write!(f, "simulated"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// Provider message id, or a `sim-` id for simulated sends.
    pub id: Option<String>,
    pub channel: Channel,
    pub recipient: String,
    pub status: DeliveryStatus,
    pub error: Option<String>,
    /// Why a failed attempt failed; `None` on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<RetryCategory>,
    /// Provider-specific extras (e.g. Twilio's queue status).
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl DeliveryResult {
    pub fn sent(channel: Channel, recipient: &str, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            channel,
            recipient: recipient.to_string(),
            status: DeliveryStatus::Sent,
            error: None,
            category: None,
            raw: serde_json::Value::Null,
        }
    }

    pub fn simulated(channel: Channel, message: &OutboundMessage) -> Self {
        Self {
            id: Some(simulated_id(channel, message)),
            channel,
            recipient: message.recipient.clone(),
            status: DeliveryStatus::Simulated,
            error: None,
            category: None,
            raw: serde_json::Value::Null,
        }
    }

    /// A failed attempt, classified as transient until told otherwise.
    pub fn failed(channel: Channel, recipient: &str, error: impl Into<String>) -> Self {
        Self {
            id: None,
            channel,
            recipient: recipient.to_string(),
            status: DeliveryStatus::Failed,
            error: Some(error.into()),
            category: Some(RetryCategory::Transient),
            raw: serde_json::Value::Null,
        }
    }

    pub fn with_category(mut self, category: RetryCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = raw;
        self
    }

    /// Sent or simulated.
    pub fn is_success(&self) -> bool {
        self.status != DeliveryStatus::Failed
    }

    pub fn is_simulated(&self) -> bool {
        self.status == DeliveryStatus::Simulated
    }
}

/// Deterministic id for a simulated send: `sim-<channel>-<hash prefix>`.
pub fn simulated_id(channel: Channel, message: &OutboundMessage) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(message.lead_id.as_bytes());
    hasher.update(&[0]);
    hasher.update(message.recipient.as_bytes());
    hasher.update(&[0]);
    hasher.update(message.subject.as_deref().unwrap_or_default().as_bytes());
    hasher.update(&[0]);
    hasher.update(message.body.as_bytes());
    if let Some(step) = &message.step {
        hasher.update(&[0]);
        hasher.update(step.enrollment_id.as_bytes());
        hasher.update(&step.step_index.to_le_bytes());
    }
    let hex = hasher.finalize().to_hex();
    format!("sim-{}-{}", channel, &hex.as_str()[..16])
}

/// Single-channel outbound delivery.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;

    async fn send(&self, message: OutboundMessage) -> DeliveryResult;
}

/// Append a delivery attempt to the lead's decision log.
///
/// Audit writes are best-effort; a repository failure is logged, not raised.
pub(crate) async fn record_delivery(
    repo: &Arc<dyn LeadRepository>,
    agent_type: AgentType,
    message: &OutboundMessage,
    result: &DeliveryResult,
) {
    let action = format!("send_{}", result.channel);
    let reasoning = match &message.step {
        Some(step) => format!(
            "campaign {} step {} ({})",
            step.campaign_id, step.step_index, result.status
        ),
        None => format!("direct send ({})", result.status),
    };
    let data = json!({
        "recipient": result.recipient,
        "status": result.status,
        "message_id": result.id,
        "error": result.error,
        "failure_category": result.category,
        "subject": message.subject,
        "body_preview": message.body.chars().take(120).collect::<String>(),
        "campaign_id": message.step.as_ref().map(|s| s.campaign_id.clone()),
        "enrollment_id": message.step.as_ref().map(|s| s.enrollment_id.clone()),
        "step_index": message.step.as_ref().map(|s| s.step_index),
    });

    let decision = NewDecision::new(&message.lead_id, agent_type, action, reasoning).with_data(data);
    if let Err(e) = repo.create_decision(decision).await {
        warn!(lead_id = %message.lead_id, error = %e, "Failed to record delivery decision");
    }
}
