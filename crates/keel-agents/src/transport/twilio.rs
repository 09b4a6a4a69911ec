//! Twilio Messages API transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{check_status, SmsPayload, SmsReceipt, SmsTransport, TransportError};
use crate::config::TwilioSettings;

pub struct TwilioTransport {
    client: Client,
    settings: TwilioSettings,
}

impl TwilioTransport {
    pub fn new(settings: TwilioSettings, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, settings })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/Accounts/{}/Messages.json",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.account_sid
        )
    }
}

#[async_trait]
impl SmsTransport for TwilioTransport {
    async fn send_sms(&self, payload: &SmsPayload) -> Result<SmsReceipt, TransportError> {
        debug!(to = %payload.to, "Twilio send");
        let form = [
            ("To", payload.to.as_str()),
            ("From", self.settings.phone_number.as_str()),
            ("Body", payload.body.as_str()),
        ];
        let response = self
            .client
            .post(self.endpoint())
            .basic_auth(&self.settings.account_sid, Some(&self.settings.auth_token))
            .form(&form)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json::<SmsReceipt>().await?)
    }
}
