//! Mailgun messages API transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{check_status, EmailPayload, EmailReceipt, EmailTransport, TransportError};
use crate::config::MailgunSettings;

pub struct MailgunTransport {
    client: Client,
    settings: MailgunSettings,
}

impl MailgunTransport {
    pub fn new(settings: MailgunSettings, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, settings })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}/messages",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.domain
        )
    }

    fn form(&self, payload: &EmailPayload) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("from", self.settings.from.clone()),
            ("to", payload.to.clone()),
            ("subject", payload.subject.clone()),
            ("text", payload.text.clone()),
        ];
        if let Some(html) = &payload.html {
            form.push(("html", html.clone()));
        }
        form
    }
}

#[async_trait]
impl EmailTransport for MailgunTransport {
    async fn send_email(&self, payload: &EmailPayload) -> Result<EmailReceipt, TransportError> {
        debug!(to = %payload.to, domain = %self.settings.domain, "Mailgun send");
        let response = self
            .client
            .post(self.endpoint())
            .basic_auth("api", Some(&self.settings.api_key))
            .form(&self.form(payload))
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json::<EmailReceipt>().await?)
    }
}
