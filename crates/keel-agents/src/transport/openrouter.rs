//! OpenRouter chat-completions transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    check_status, ChatMessage, CompletionRequest, CompletionResponse, LlmTransport,
    ResponseFormat, TransportError,
};
use crate::config::OpenRouterSettings;

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ApiResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ApiResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    total_tokens: Option<u32>,
}

/// OpenRouter client
pub struct OpenRouterTransport {
    client: Client,
    settings: OpenRouterSettings,
}

impl OpenRouterTransport {
    pub fn new(settings: OpenRouterSettings, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, settings })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl LlmTransport for OpenRouterTransport {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, TransportError> {
        let body = ApiRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: match request.response_format {
                ResponseFormat::JsonObject => Some(ApiResponseFormat {
                    kind: "json_object",
                }),
                ResponseFormat::Text => None,
            },
        };

        debug!(model = %request.model, "OpenRouter completion request");
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;
        let parsed: ApiResponse = response.json().await?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TransportError::InvalidResponse("no choices in response".into()))?;

        Ok(CompletionResponse {
            content,
            model: parsed.model.unwrap_or_else(|| request.model.clone()),
            tokens_used: parsed.usage.and_then(|u| u.total_tokens),
        })
    }
}
