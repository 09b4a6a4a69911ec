//! SMS sender over Twilio.

use std::sync::Arc;

use async_trait::async_trait;
use coordination::{AgentType, BreakerError, Channel, CircuitBreaker, ServiceName};
use serde_json::json;
use tracing::{info, warn};

use super::{record_delivery, ChannelSender, DeliveryResult, OutboundMessage};
use crate::errors::RetryCategory;
use crate::repository::LeadRepository;
use crate::transport::{SmsPayload, SmsTransport, TransportError};

/// Longest body Twilio accepts (10 concatenated segments).
pub const MAX_SMS_CHARS: usize = 1600;

pub struct SmsSender {
    transport: Option<Arc<dyn SmsTransport>>,
    breaker: Arc<CircuitBreaker>,
    repo: Arc<dyn LeadRepository>,
}

impl SmsSender {
    /// `transport: None` runs in simulation mode.
    pub fn new(
        transport: Option<Arc<dyn SmsTransport>>,
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
            info!(lead_id = %message.lead_id, to = %message.recipient, "SMS simulated (Twilio not configured)");
            return DeliveryResult::simulated(Channel::Sms, message);
        };

        if message.recipient.trim().is_empty() {
            return DeliveryResult::failed(Channel::Sms, &message.recipient, "missing phone number")
                .with_category(RetryCategory::NotFound);
        }

        let payload = SmsPayload {
            to: message.recipient.clone(),
            body: truncate_body(&message.body),
        };

        match self
            .breaker
            .execute_classified(
                || transport.send_sms(&payload),
                TransportError::counts_against_breaker,
            )
            .await
        {
            Ok(receipt) => {
                info!(lead_id = %message.lead_id, sid = %receipt.sid, status = %receipt.status, "SMS sent");
                DeliveryResult::sent(Channel::Sms, &message.recipient, receipt.sid)
                    .with_raw(json!({ "status": receipt.status }))
            }
            Err(BreakerError::Open { .. }) => {
                warn!(lead_id = %message.lead_id, "Twilio circuit open, SMS not sent");
                DeliveryResult::failed(
                    Channel::Sms,
                    &message.recipient,
                    ServiceName::Twilio.fallback_message(),
                )
                .with_category(RetryCategory::CircuitOpen)
            }
            Err(BreakerError::Inner(err)) => {
                warn!(lead_id = %message.lead_id, error = %err, "SMS send failed");
                DeliveryResult::failed(Channel::Sms, &message.recipient, err.to_string())
                    .with_category(err.retry_category())
            }
        }
    }
}

fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_SMS_CHARS).collect()
}

#[async_trait]
impl ChannelSender for SmsSender {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, message: OutboundMessage) -> DeliveryResult {
        let result = self.deliver(&message).await;
        record_delivery(&self.repo, AgentType::Sms, &message, &result).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::DeliveryStatus;
    use crate::repository::InMemoryRepository;
    use crate::transport::SmsReceipt;
    use coordination::{BreakerConfig, CircuitState};
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingTwilio {
        bodies: Mutex<Vec<String>>,
        reply: Result<SmsReceipt, TransportError>,
    }

    #[async_trait]
    impl SmsTransport for RecordingTwilio {
        async fn send_sms(&self, payload: &SmsPayload) -> Result<SmsReceipt, TransportError> {
            self.bodies.lock().unwrap().push(payload.body.clone());
            self.reply.clone()
        }
    }

    #[test]
    fn test_truncate_body() {
        let long = "é".repeat(MAX_SMS_CHARS + 50);
        assert_eq!(truncate_body(&long).chars().count(), MAX_SMS_CHARS);
        assert_eq!(truncate_body("short"), "short");
    }

    #[tokio::test]
    async fn test_simulated_sms() {
        let repo = Arc::new(InMemoryRepository::new());
        let sender = SmsSender::new(
            None,
            Arc::new(CircuitBreaker::for_service(ServiceName::Twilio)),
            repo.clone(),
        );
        let result = sender
            .send(OutboundMessage::new("l-9", "+15550009", "hey"))
            .await;
        assert_eq!(result.status, DeliveryStatus::Simulated);
        assert!(result.id.unwrap().starts_with("sim-sms-"));
        assert_eq!(repo.list_decisions("l-9").await.unwrap()[0].action, "send_sms");
    }

    #[tokio::test]
    async fn test_open_breaker_reports_fallback_without_calling_twilio() {
        let twilio = Arc::new(RecordingTwilio {
            bodies: Mutex::new(Vec::new()),
            reply: Err(TransportError::Timeout("slow".into())),
        });
        let breaker = Arc::new(CircuitBreaker::new(
            ServiceName::Twilio,
            BreakerConfig::new(1, Duration::from_secs(30)),
        ));
        let sender = SmsSender::new(
            Some(twilio.clone()),
            breaker.clone(),
            Arc::new(InMemoryRepository::new()),
        );

        let first = sender.send(OutboundMessage::new("l-1", "+1555", "a")).await;
        assert_eq!(first.status, DeliveryStatus::Failed);
        assert_eq!(first.category, Some(RetryCategory::Transient));
        assert_eq!(breaker.state(), CircuitState::Open);

        let second = sender.send(OutboundMessage::new("l-1", "+1555", "b")).await;
        assert_eq!(second.status, DeliveryStatus::Failed);
        assert_eq!(
            second.error.as_deref(),
            Some(ServiceName::Twilio.fallback_message())
        );
        assert_eq!(second.category, Some(RetryCategory::CircuitOpen));
        assert_eq!(twilio.bodies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_blank_number_still_simulates() {
        let sender = SmsSender::new(
            None,
            Arc::new(CircuitBreaker::for_service(ServiceName::Twilio)),
            Arc::new(InMemoryRepository::new()),
        );
        let result = sender.send(OutboundMessage::new("l-1", "  ", "hey")).await;
        assert_eq!(result.status, DeliveryStatus::Simulated);
    }
}
