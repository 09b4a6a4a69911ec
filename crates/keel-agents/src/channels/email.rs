//! Email sender over Mailgun.

use std::sync::Arc;

use async_trait::async_trait;
use coordination::{AgentType, BreakerError, Channel, CircuitBreaker, ServiceName};
use tracing::{info, warn};

use super::{record_delivery, ChannelSender, DeliveryResult, OutboundMessage};
use crate::errors::RetryCategory;
use crate::repository::LeadRepository;
use crate::transport::{EmailPayload, EmailTransport, TransportError};

pub struct EmailSender {
    transport: Option<Arc<dyn EmailTransport>>,
    breaker: Arc<CircuitBreaker>,
    repo: Arc<dyn LeadRepository>,
}

impl EmailSender {
    /// `transport: None` runs in simulation mode.
    pub fn new(
        transport: Option<Arc<dyn EmailTransport>>,
        breaker: Arc<CircuitBreaker>,
        repo: Arc<dyn LeadRepository>,
    ) -> Self {
        Self {
            transport,
            breaker,
            repo,
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.transport.is_none()
    }

    async fn deliver(&self, message: &OutboundMessage) -> DeliveryResult {
        let Some(transport) = &self.transport else {
            info!(lead_id = %message.lead_id, to = %message.recipient, "Email simulated (Mailgun not configured)");
            return DeliveryResult::simulated(Channel::Email, message);
        };

        if message.recipient.trim().is_empty() {
            return DeliveryResult::failed(Channel::Email, &message.recipient, "missing email address")
                .with_category(RetryCategory::NotFound);
        }

        let payload = EmailPayload {
            to: message.recipient.clone(),
            subject: message.subject.clone().unwrap_or_default(),
            text: message.body.clone(),
            html: None,
        };

        match self
            .breaker
            .execute_classified(
                || transport.send_email(&payload),
                TransportError::counts_against_breaker,
            )
            .await
        {
            Ok(receipt) => {
                info!(lead_id = %message.lead_id, message_id = %receipt.id, "Email sent");
                DeliveryResult::sent(Channel::Email, &message.recipient, receipt.id)
            }
            Err(BreakerError::Open { .. }) => {
                warn!(lead_id = %message.lead_id, "Mailgun circuit open, email not sent");
                DeliveryResult::failed(
                    Channel::Email,
                    &message.recipient,
                    ServiceName::Mailgun.fallback_message(),
                )
                .with_category(RetryCategory::CircuitOpen)
            }
            Err(BreakerError::Inner(err)) => {
                warn!(lead_id = %message.lead_id, error = %err, "Email send failed");
                DeliveryResult::failed(Channel::Email, &message.recipient, err.to_string())
                    .with_category(err.retry_category())
            }
        }
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, message: OutboundMessage) -> DeliveryResult {
        let result = self.deliver(&message).await;
        record_delivery(&self.repo, AgentType::Email, &message, &result).await;
        result
    }
}
