//! Complexity scoring and model tier selection
//!
//! A request's complexity is a weighted sum of a few cheap signals. The score
//! maps onto a fixed tier, and the tier onto a model through a configurable
//! table:
//!
//! ```text
//! Signal               | Contribution
//! ---------------------|---------------------------------
//! Prompt length        | min(chars / 100, 20)
//! History length       | min(2 × messages, 10)
//! Business critical    | +20
//! Requires reasoning   | +15
//! Agent type           | overlord 25, email/chat 10, sms 5
//! Decision type        | strategic 10, tactical 5
//!
//! Score   | Tier
//! --------|----------
//! < 30    | basic
//! < 50    | standard
//! < 70    | advanced
//! ≥ 70    | expert
//! ```

use serde::{Deserialize, Serialize};

use crate::decision::types::{AgentType, DecisionType};

/// Maximum contribution of prompt length.
pub const MAX_LENGTH_POINTS: f64 = 20.0;
/// Maximum contribution of conversation history.
pub const MAX_HISTORY_POINTS: f64 = 10.0;
pub const BUSINESS_CRITICAL_POINTS: f64 = 20.0;
pub const REQUIRES_REASONING_POINTS: f64 = 15.0;

/// Model name sent when the provider should pick the model itself.
pub const AUTO_MODEL: &str = "openrouter/auto";

/// Model tier for routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Cheapest, fastest model
    Basic,
    Standard,
    Advanced,
    /// Most capable model
    Expert,
}

impl ModelTier {
    /// Map a complexity score onto a tier.
    pub fn from_score(score: f64) -> Self {
        if score < 30.0 {
            Self::Basic
        } else if score < 50.0 {
            Self::Standard
        } else if score < 70.0 {
            Self::Advanced
        } else {
            Self::Expert
        }
    }
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Standard => write!(f, "standard"),
            Self::Advanced => write!(f, "advanced"),
            Self::Expert => write!(f, "expert"),
        }
    }
}

/// Signals used to score a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexityInput {
    pub prompt_chars: usize,
    pub history_messages: usize,
    pub business_critical: bool,
    pub requires_reasoning: bool,
    pub agent_type: Option<AgentType>,
    pub decision_type: Option<DecisionType>,
}

/// Per-signal contributions to the score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexityFactors {
    pub length: f64,
    pub history: f64,
    pub business_critical: f64,
    pub reasoning: f64,
    pub agent: f64,
    pub decision: f64,
}

impl ComplexityFactors {
    pub fn total(&self) -> f64 {
        self.length + self.history + self.business_critical + self.reasoning + self.agent
            + self.decision
    }
}

/// Score, tier and breakdown for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityAssessment {
    pub score: f64,
    pub tier: ModelTier,
    pub factors: ComplexityFactors,
}

/// Weighted-sum complexity scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplexityScorer;

impl ComplexityScorer {
    pub fn score(input: &ComplexityInput) -> ComplexityAssessment {
        let factors = ComplexityFactors {
            length: (input.prompt_chars as f64 / 100.0).min(MAX_LENGTH_POINTS),
            history: (input.history_messages as f64 * 2.0).min(MAX_HISTORY_POINTS),
            business_critical: if input.business_critical {
                BUSINESS_CRITICAL_POINTS
            } else {
                0.0
            },
            reasoning: if input.requires_reasoning {
                REQUIRES_REASONING_POINTS
            } else {
                0.0
            },
            agent: input.agent_type.map_or(0.0, AgentType::complexity_weight),
            decision: input
                .decision_type
                .map_or(0.0, DecisionType::complexity_weight),
        };
        let score = factors.total();
        ComplexityAssessment {
            score,
            tier: ModelTier::from_score(score),
            factors,
        }
    }
}

/// Tier → model mapping. Tunable policy, not a correctness property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierModelTable {
    pub basic: String,
    pub standard: String,
    pub advanced: String,
    pub expert: String,
}

impl Default for TierModelTable {
    fn default() -> Self {
        Self {
            basic: "openai/gpt-4o-mini".to_string(),
            standard: "anthropic/claude-3-haiku".to_string(),
            advanced: "anthropic/claude-3.5-sonnet".to_string(),
            expert: "anthropic/claude-3-opus".to_string(),
        }
    }
}

impl TierModelTable {
    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Basic => &self.basic,
            ModelTier::Standard => &self.standard,
            ModelTier::Advanced => &self.advanced,
            ModelTier::Expert => &self.expert,
        }
    }
}

/// How the caller wants the model chosen.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelPreference {
    /// Pick by complexity tier.
    #[default]
    Tiered,
    /// Use exactly this model.
    Explicit(String),
    /// Let the provider pick.
    Auto,
}

impl ModelPreference {
    /// Resolve the primary model. Explicit and Auto skip the tier table.
    pub fn resolve(&self, tier: ModelTier, table: &TierModelTable) -> String {
        match self {
            ModelPreference::Tiered => table.model_for(tier).to_string(),
            ModelPreference::Explicit(model) => model.clone(),
            ModelPreference::Auto => AUTO_MODEL.to_string(),
        }
    }
}

/// Ordered list of models tried within one guarded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackLadder {
    models: Vec<String>,
}

impl FallbackLadder {
    /// Primary model followed by `alternates`, deduplicated, empties dropped.
    pub fn new(primary: impl Into<String>, alternates: &[String]) -> Self {
        let mut models: Vec<String> = Vec::with_capacity(alternates.len() + 1);
        for model in std::iter::once(primary.into()).chain(alternates.iter().cloned()) {
            let model = model.trim().to_string();
            if !model.is_empty() && !models.contains(&model) {
                models.push(model);
            }
        }
        Self { models }
    }

    /// The ordered list of models.
    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn primary(&self) -> Option<&str> {
        self.models.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(ModelTier::from_score(0.0), ModelTier::Basic);
        assert_eq!(ModelTier::from_score(29.99), ModelTier::Basic);
        assert_eq!(ModelTier::from_score(30.0), ModelTier::Standard);
        assert_eq!(ModelTier::from_score(49.9), ModelTier::Standard);
        assert_eq!(ModelTier::from_score(50.0), ModelTier::Advanced);
        assert_eq!(ModelTier::from_score(69.9), ModelTier::Advanced);
        assert_eq!(ModelTier::from_score(70.0), ModelTier::Expert);
        assert_eq!(ModelTier::from_score(500.0), ModelTier::Expert);
    }

    #[test]
    fn test_length_and_history_capped() {
        let input = ComplexityInput {
            prompt_chars: 1_000_000,
            history_messages: 1_000,
            ..Default::default()
        };
        let a = ComplexityScorer::score(&input);
        assert_eq!(a.factors.length, MAX_LENGTH_POINTS);
        assert_eq!(a.factors.history, MAX_HISTORY_POINTS);
        assert_eq!(a.score, 30.0);
        assert_eq!(a.tier, ModelTier::Standard);
    }

    #[test]
    fn test_short_sms_is_basic() {
        let input = ComplexityInput {
            prompt_chars: 120,
            agent_type: Some(AgentType::Sms),
            decision_type: Some(DecisionType::Operational),
            ..Default::default()
        };
        let a = ComplexityScorer::score(&input);
        assert!((a.score - 6.2).abs() < 1e-9);
        assert_eq!(a.tier, ModelTier::Basic);
    }

    #[test]
    fn test_overlord_strategic_is_expert() {
        let input = ComplexityInput {
            prompt_chars: 0,
            business_critical: true,
            requires_reasoning: true,
            agent_type: Some(AgentType::Overlord),
            decision_type: Some(DecisionType::Strategic),
            ..Default::default()
        };
        let a = ComplexityScorer::score(&input);
        assert_eq!(a.score, 70.0);
        assert_eq!(a.tier, ModelTier::Expert);
    }

    #[test]
    fn test_model_preference_resolution() {
        let table = TierModelTable::default();
        assert_eq!(
            ModelPreference::Tiered.resolve(ModelTier::Expert, &table),
            "anthropic/claude-3-opus"
        );
        assert_eq!(
            ModelPreference::Explicit("x/y".into()).resolve(ModelTier::Expert, &table),
            "x/y"
        );
        assert_eq!(
            ModelPreference::Auto.resolve(ModelTier::Basic, &table),
            AUTO_MODEL
        );
    }

    #[test]
    fn test_fallback_ladder_dedup() {
        let ladder = FallbackLadder::new(
            "anthropic/claude-3-opus",
            &[
                "anthropic/claude-3.5-sonnet".to_string(),
                "anthropic/claude-3-opus".to_string(),
                "  ".to_string(),
                "openai/gpt-4o-mini".to_string(),
            ],
        );
        assert_eq!(
            ladder.models(),
            &[
                "anthropic/claude-3-opus".to_string(),
                "anthropic/claude-3.5-sonnet".to_string(),
                "openai/gpt-4o-mini".to_string(),
            ]
        );
        assert_eq!(ladder.primary(), Some("anthropic/claude-3-opus"));
    }

    #[test]
    fn test_empty_primary_ladder() {
        let ladder = FallbackLadder::new("", &[]);
        assert!(ladder.is_empty());
        assert_eq!(ladder.primary(), None);
    }
}
