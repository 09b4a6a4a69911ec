//! Agent and decision record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::campaign::LeadId;

/// Agents that make or record decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Overlord,
    Email,
    Sms,
    Chat,
    Scheduler,
}

impl AgentType {
    /// Complexity weight: decision-making agents score higher than senders.
    pub fn complexity_weight(self) -> f64 {
        match self {
            AgentType::Overlord => 25.0,
            AgentType::Email | AgentType::Chat => 10.0,
            AgentType::Sms => 5.0,
            AgentType::Scheduler => 0.0,
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentType::Overlord => write!(f, "overlord"),
            AgentType::Email => write!(f, "email"),
            AgentType::Sms => write!(f, "sms"),
            AgentType::Chat => write!(f, "chat"),
            AgentType::Scheduler => write!(f, "scheduler"),
        }
    }
}

/// Breadth of the decision a model call feeds into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Strategic,
    Tactical,
    Operational,
}

impl DecisionType {
    pub fn complexity_weight(self) -> f64 {
        match self {
            DecisionType::Strategic => 10.0,
            DecisionType::Tactical => 5.0,
            DecisionType::Operational => 0.0,
        }
    }
}

impl std::fmt::Display for DecisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionType::Strategic => write!(f, "strategic"),
            DecisionType::Tactical => write!(f, "tactical"),
            DecisionType::Operational => write!(f, "operational"),
        }
    }
}

/// A decision to append to the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDecision {
    pub lead_id: LeadId,
    pub agent_type: AgentType,
    pub action: String,
    pub reasoning: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl NewDecision {
    pub fn new(
        lead_id: impl Into<LeadId>,
        agent_type: AgentType,
        action: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            lead_id: lead_id.into(),
            agent_type,
            action: action.into(),
            reasoning: reasoning.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// An immutable, persisted decision / delivery-attempt record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDecision {
    pub id: String,
    pub lead_id: LeadId,
    pub agent_type: AgentType,
    pub action: String,
    pub reasoning: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AgentDecision {
    /// Stamp a new decision with an id and creation time.
    pub fn from_new(new: NewDecision, created_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            lead_id: new.lead_id,
            agent_type: new.agent_type,
            action: new.action,
            reasoning: new.reasoning,
            data: new.data,
            created_at,
        }
    }
}
