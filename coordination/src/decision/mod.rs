//! Decision records and model-decision parsing

pub mod parse;
pub mod types;

pub use parse::{
    default_channels, filter_channels, parse_decision, DecisionParseError, DecisionShape,
    ParsedDecision,
};
pub use types::{AgentDecision, AgentType, DecisionType, NewDecision};
