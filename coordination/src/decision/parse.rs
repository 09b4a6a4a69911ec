//! Parsing and validation of model-produced decisions.
//!
//! Models are asked for a JSON object tagged by `action`. Anything that does
//! not deserialize into a known [`DecisionShape`] becomes
//! [`ParsedDecision::Invalid`], so callers have to pick a fallback explicitly.

use serde::{Deserialize, Serialize};

use crate::campaign::{Channel, Lead};

/// Known decision shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DecisionShape {
    /// Contact the lead on these channels.
    AssignChannels {
        channels: Vec<String>,
        #[serde(default)]
        reasoning: String,
        #[serde(default)]
        next_focus: Option<String>,
    },
    /// Lead is ready for handover.
    Qualify {
        #[serde(default)]
        channels: Vec<String>,
        #[serde(default)]
        reasoning: String,
    },
    /// Keep warming the lead up.
    Nurture {
        #[serde(default)]
        channels: Vec<String>,
        #[serde(default)]
        reasoning: String,
        #[serde(default)]
        next_focus: Option<String>,
    },
    /// Stop contacting the lead.
    Disqualify {
        #[serde(default)]
        reasoning: String,
    },
}

impl DecisionShape {
    /// Actions accepted in the `action` tag.
    pub const ACTIONS: &'static [&'static str] =
        &["assign_channels", "qualify", "nurture", "disqualify"];

    pub fn action(&self) -> &'static str {
        match self {
            DecisionShape::AssignChannels { .. } => "assign_channels",
            DecisionShape::Qualify { .. } => "qualify",
            DecisionShape::Nurture { .. } => "nurture",
            DecisionShape::Disqualify { .. } => "disqualify",
        }
    }

    pub fn reasoning(&self) -> &str {
        match self {
            DecisionShape::AssignChannels { reasoning, .. }
            | DecisionShape::Qualify { reasoning, .. }
            | DecisionShape::Nurture { reasoning, .. }
            | DecisionShape::Disqualify { reasoning } => reasoning,
        }
    }

    /// Raw channel names as the model wrote them.
    pub fn channels(&self) -> &[String] {
        match self {
            DecisionShape::AssignChannels { channels, .. }
            | DecisionShape::Qualify { channels, .. }
            | DecisionShape::Nurture { channels, .. } => channels,
            DecisionShape::Disqualify { .. } => &[],
        }
    }

    pub fn next_focus(&self) -> Option<&str> {
        match self {
            DecisionShape::AssignChannels { next_focus, .. }
            | DecisionShape::Nurture { next_focus, .. } => next_focus.as_deref(),
            _ => None,
        }
    }
}

/// Why a model response could not be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecisionParseError {
    #[error("empty response")]
    Empty,

    #[error("response is not JSON: {0}")]
    InvalidJson(String),

    #[error("response is not a JSON object")]
    NotAnObject,

    #[error("response has no action field")]
    MissingAction,

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("malformed {action} decision: {reason}")]
    InvalidShape { action: String, reason: String },
}

/// Result of interpreting a model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedDecision {
    Recognized(DecisionShape),
    Invalid {
        raw: String,
        error: DecisionParseError,
    },
}

impl ParsedDecision {
    pub fn from_response(raw: &str) -> Self {
        match parse_decision(raw) {
            Ok(shape) => ParsedDecision::Recognized(shape),
            Err(error) => ParsedDecision::Invalid {
                raw: raw.to_string(),
                error,
            },
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ParsedDecision::Recognized(_))
    }
}

/// Strip Markdown code fences and any prose around the outermost JSON object.
fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```").trim())
        .unwrap_or(trimmed);

    match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => &unfenced[start..=end],
        _ => unfenced,
    }
}

/// Parse a model response into a [`DecisionShape`].
pub fn parse_decision(raw: &str) -> Result<DecisionShape, DecisionParseError> {
    let body = extract_json(raw);
    if body.is_empty() {
        return Err(DecisionParseError::Empty);
    }

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| DecisionParseError::InvalidJson(e.to_string()))?;
    let object = value.as_object().ok_or(DecisionParseError::NotAnObject)?;
    let action = object
        .get("action")
        .and_then(|a| a.as_str())
        .ok_or(DecisionParseError::MissingAction)?;
    if !DecisionShape::ACTIONS.contains(&action) {
        return Err(DecisionParseError::UnknownAction(action.to_string()));
    }

    let action = action.to_string();
    serde_json::from_value(value).map_err(|e| DecisionParseError::InvalidShape {
        action,
        reason: e.to_string(),
    })
}

/// Keep the recognizable channels in `raw` that are also enabled, in order,
/// without duplicates.
pub fn filter_channels(raw: &[String], enabled: &[Channel]) -> Vec<Channel> {
    let mut out = Vec::new();
    for channel in raw.iter().filter_map(|c| Channel::parse(c)) {
        if enabled.contains(&channel) && !out.contains(&channel) {
            out.push(channel);
        }
    }
    out
}

/// Channels to use when the model's answer is unusable: the lead's reachable
/// channels that are enabled, else the first enabled channel, else email.
pub fn default_channels(lead: &Lead, enabled: &[Channel]) -> Vec<Channel> {
    let reachable: Vec<Channel> = lead
        .reachable_channels()
        .into_iter()
        .filter(|c| enabled.contains(c))
        .collect();
    if !reachable.is_empty() {
        return reachable;
    }
    match enabled.first() {
        Some(first) => vec![*first],
        None => vec![Channel::Email],
    }
}
