//! Complexity-tiered model router.
//!
//! ```text
//! RouteOptions ──► ComplexityScorer ──► tier ──► primary model
//!                                                   │
//!                       FallbackLadder [primary, alternates...]
//!                                                   │
//!                 OpenRouter breaker ──► walk ladder until one answers
//!                      │ open / all failed
//!                      ▼
//!                 fallback text (never an error)
//! ```
//!
//! With no transport configured the router answers deterministically so the
//! rest of the pipeline runs offline. Only configuration problems (empty
//! ladder, rejected credentials) surface as errors.

use std::sync::Arc;
use std::time::Instant;

use coordination::{
    AgentType, BreakerError, CircuitBreaker, ComplexityAssessment, ComplexityInput,
    ComplexityScorer, DecisionType, FallbackLadder, ModelPreference, ModelTier, ServiceName,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RouterSettings;
use crate::errors::OutreachError;
use crate::transport::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmTransport, ResponseFormat,
    TransportError,
};

/// Canned JSON returned in offline mode for JSON-format requests.
pub const MOCK_DECISION_JSON: &str = r#"{"action":"assign_channels","channels":["email"],"reasoning":"mock response","next_focus":"introduction"}"#;

/// Where a [`RouteResponse`]'s content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Provider,
    Mock,
    Fallback,
}

/// One routed completion request.
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub history: Vec<ChatMessage>,
    pub business_critical: bool,
    pub requires_reasoning: bool,
    pub agent_type: Option<AgentType>,
    pub decision_type: Option<DecisionType>,
    pub model: ModelPreference,
    pub response_format: ResponseFormat,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl RouteOptions {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    fn complexity_input(&self) -> ComplexityInput {
        ComplexityInput {
            prompt_chars: self.prompt.chars().count(),
            history_messages: self.history.len(),
            business_critical: self.business_critical,
            requires_reasoning: self.requires_reasoning,
            agent_type: self.agent_type,
            decision_type: self.decision_type,
        }
    }

    fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::user(self.prompt.clone()));
        messages
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteResponse {
    pub content: String,
    pub model: String,
    pub tokens_used: Option<u32>,
    pub execution_time_ms: u64,
    pub complexity: ComplexityAssessment,
    pub source: ResponseSource,
}

impl RouteResponse {
    pub fn tier(&self) -> ModelTier {
        self.complexity.tier
    }
}

pub struct ModelRouter {
    transport: Option<Arc<dyn LlmTransport>>,
    breaker: Arc<CircuitBreaker>,
    settings: RouterSettings,
}

impl ModelRouter {
    pub fn new(
        transport: Option<Arc<dyn LlmTransport>>,
        breaker: Arc<CircuitBreaker>,
        settings: RouterSettings,
    ) -> Self {
        Self {
            transport,
            breaker,
            settings,
        }
    }

    /// Router with no provider; every request gets the deterministic mock.
    pub fn offline(settings: RouterSettings) -> Self {
        Self::new(
            None,
            Arc::new(CircuitBreaker::for_service(ServiceName::OpenRouter)),
            settings,
        )
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Route one request.
    pub async fn route_request(&self, options: RouteOptions) -> Result<RouteResponse, OutreachError> {
        let start = Instant::now();
        let complexity = ComplexityScorer::score(&options.complexity_input());
        let primary = options
            .model
            .resolve(complexity.tier, &self.settings.tier_models);
        let ladder = FallbackLadder::new(primary, &self.settings.fallback_models);
        let Some(primary) = ladder.primary().map(str::to_string) else {
            return Err(OutreachError::Configuration(
                "no model resolved for request".into(),
            ));
        };

        debug!(
            score = complexity.score,
            tier = %complexity.tier,
            model = %primary,
            ladder = ladder.models().len(),
            "Routing request"
        );

        let Some(transport) = &self.transport else {
            let content = match options.response_format {
                ResponseFormat::JsonObject => MOCK_DECISION_JSON.to_string(),
                ResponseFormat::Text => format!(
                    "[mock {} response] {}",
                    complexity.tier,
                    preview(&options.prompt, 80)
                ),
            };
            return Ok(RouteResponse {
                content,
                model: primary,
                tokens_used: None,
                execution_time_ms: elapsed_ms(start),
                complexity,
                source: ResponseSource::Mock,
            });
        };

        let request = CompletionRequest {
            model: primary.clone(),
            messages: options.messages(),
            temperature: options.temperature.unwrap_or(self.settings.temperature),
            max_tokens: options.max_tokens.unwrap_or(self.settings.max_tokens),
            response_format: options.response_format,
        };

        let outcome = self
            .breaker
            .execute_classified(
                || walk_ladder(transport.as_ref(), &ladder, request),
                TransportError::counts_against_breaker,
            )
            .await;

        let fallback = |model: String| RouteResponse {
            content: ServiceName::OpenRouter.fallback_message().to_string(),
            model,
            tokens_used: None,
            execution_time_ms: elapsed_ms(start),
            complexity: complexity.clone(),
            source: ResponseSource::Fallback,
        };

        match outcome {
            Ok(response) => {
                let execution_time_ms = elapsed_ms(start);
                info!(
                    model = %response.model,
                    tier = %complexity.tier,
                    tokens = ?response.tokens_used,
                    execution_time_ms,
                    "Model response"
                );
                Ok(RouteResponse {
                    content: response.content,
                    model: response.model,
                    tokens_used: response.tokens_used,
                    execution_time_ms,
                    complexity,
                    source: ResponseSource::Provider,
                })
            }
            Err(BreakerError::Open { retry_in, .. }) => {
                warn!(
                    retry_in_ms = retry_in.as_millis() as u64,
                    "OpenRouter circuit open, returning fallback text"
                );
                Ok(fallback(primary))
            }
            Err(BreakerError::Inner(err)) if !err.counts_against_breaker() => {
                Err(OutreachError::Configuration(err.to_string()))
            }
            Err(BreakerError::Inner(err)) => {
                warn!(error = %err, "All models failed, returning fallback text");
                Ok(fallback(primary))
            }
        }
    }
}

/// Try each model in order. Configuration-class errors stop the walk.
async fn walk_ladder(
    transport: &dyn LlmTransport,
    ladder: &FallbackLadder,
    mut request: CompletionRequest,
) -> Result<CompletionResponse, TransportError> {
    let mut last_error = TransportError::Request("empty model ladder".into());
    for model in ladder.models() {
        request.model = model.clone();
        match transport.complete(&request).await {
            Ok(response) => return Ok(response),
            Err(err) if !err.counts_against_breaker() => return Err(err),
            Err(err) => {
                warn!(model = %model, error = %err, "Model call failed, trying next");
                last_error = err;
            }
        }
    }
    Err(last_error)
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedTransport {
        replies: Mutex<Vec<Result<CompletionResponse, TransportError>>>,
        seen_models: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<CompletionResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                seen_models: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmTransport for ScriptedTransport {
        async fn complete(
            &self,
            request: &CompletionRequest,
        ) -> Result<CompletionResponse, TransportError> {
            self.seen_models.lock().unwrap().push(request.model.clone());
            self.replies.lock().unwrap().remove(0)
        }
    }

    fn ok(model: &str) -> Result<CompletionResponse, TransportError> {
        Ok(CompletionResponse {
            content: "hello".into(),
            model: model.into(),
            tokens_used: Some(12),
        })
    }

    fn router(transport: Arc<ScriptedTransport>) -> ModelRouter {
        ModelRouter::new(
            Some(transport),
            Arc::new(CircuitBreaker::for_service(ServiceName::OpenRouter)),
            RouterSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_offline_json_mock_is_deterministic() {
        let router = ModelRouter::offline(RouterSettings::default());
        let mut opts = RouteOptions::new("pick channels");
        opts.response_format = ResponseFormat::JsonObject;
        let a = router.route_request(opts.clone()).await.unwrap();
        let b = router.route_request(opts).await.unwrap();
        assert_eq!(a.content, MOCK_DECISION_JSON);
        assert_eq!(a.content, b.content);
        assert_eq!(a.source, ResponseSource::Mock);
    }

    #[tokio::test]
    async fn test_ladder_walks_to_next_model() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Server {
                status: 502,
                body: String::new(),
            }),
            ok("anthropic/claude-3-haiku"),
        ]);
        let router = router(transport.clone());
        let resp = router.route_request(RouteOptions::new("hi")).await.unwrap();

        assert_eq!(resp.source, ResponseSource::Provider);
        assert_eq!(resp.model, "anthropic/claude-3-haiku");
        let seen = transport.seen_models.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], RouterSettings::default().tier_models.basic);
        // A ladder that recovered is a success for the breaker.
        assert_eq!(router.breaker().failure_count(), 0);
    }

    #[tokio::test]
    async fn test_ladder_exhausted_returns_fallback_text() {
        let failures = (0..4)
            .map(|_| Err(TransportError::Timeout("slow".into())))
            .collect();
        let router = router(ScriptedTransport::new(failures));
        let resp = router.route_request(RouteOptions::new("hi")).await.unwrap();
        assert_eq!(resp.source, ResponseSource::Fallback);
        assert_eq!(resp.content, ServiceName::OpenRouter.fallback_message());
        assert_eq!(router.breaker().failure_count(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_is_configuration_error() {
        let router = router(ScriptedTransport::new(vec![Err(
            TransportError::Unauthorized("bad key".into()),
        )]));
        let err = router.route_request(RouteOptions::new("hi")).await.unwrap_err();
        assert!(matches!(err, OutreachError::Configuration(_)));
        assert_eq!(router.breaker().failure_count(), 0);
    }

    #[tokio::test]
    async fn test_explicit_model_skips_tiering() {
        let transport = ScriptedTransport::new(vec![ok("mistral/large")]);
        let router = router(transport.clone());
        let mut opts = RouteOptions::new("hi");
        opts.model = ModelPreference::Explicit("mistral/large".into());
        opts.business_critical = true;
        router.route_request(opts).await.unwrap();
        assert_eq!(transport.seen_models.lock().unwrap()[0], "mistral/large");
    }

    #[tokio::test]
    async fn test_blank_explicit_model_with_no_alternates_is_rejected() {
        let settings = RouterSettings {
            fallback_models: vec![],
            ..RouterSettings::default()
        };
        let router = ModelRouter::offline(settings);
        let mut opts = RouteOptions::new("hi");
        opts.model = ModelPreference::Explicit("  ".into());
        let err = router.route_request(opts).await.unwrap_err();
        assert!(matches!(err, OutreachError::Configuration(_)));
    }

    #[test]
    fn test_messages_order() {
        let mut opts = RouteOptions::new("now");
        opts.system_prompt = Some("sys".into());
        opts.history = vec![ChatMessage::user("before"), ChatMessage::assistant("reply")];
        let roles: Vec<_> = opts.messages().into_iter().map(|m| m.role).collect();
        assert_eq!(roles, ["system", "user", "assistant", "user"]);
    }
}
