//! Outbound Coordination Library
//!
//! Deterministic, I/O-free building blocks for the outbound lead
//! communication pipeline:
//!
//! - **Circuit breaking** per external service (Twilio, Mailgun, OpenRouter)
//! - **Complexity tiering**: score → tier → model, plus the fallback ladder
//! - **Campaigns**: leads, campaigns, steps, templates and the enrollment
//!   state machine that walks each lead through a campaign
//! - **Decisions**: audit records and parsing of model-produced decisions
//! - **Events**: broadcast bus for breaker transitions and step outcomes
//!
//! Transports, persistence and the scheduler loop live in `keel-agents`.

#![allow(clippy::uninlined_format_args)]

pub mod campaign;
pub mod decision;
pub mod events;
pub mod router;

// Re-export campaign types
pub use campaign::{
    Campaign, CampaignId, CampaignSettings, CampaignStatus, CampaignValidationError, Channel,
    Enrollment, EnrollmentId, EnrollmentState, FailureDisposition, IllegalTransition, Lead,
    LeadId, LeadStatus, QualificationCriteria, Step, TransitionRecord, MAX_STEP_DELAY_DAYS,
};
pub use campaign::{cumulative_offsets, earliest_fire_times, render, unresolved};

// Re-export decision types
pub use decision::{
    AgentDecision, AgentType, DecisionParseError, DecisionShape, DecisionType, NewDecision,
    ParsedDecision,
};
pub use decision::{default_channels, filter_channels, parse_decision};

// Re-export event types
pub use events::{EventBus, EventBusError, EventFilter, OutreachEvent, SharedEventBus};

// Re-export router types
pub use router::{
    BreakerConfig, BreakerError, BreakerRegistry, BreakerSnapshot, CircuitBreaker, CircuitState,
    ComplexityAssessment, ComplexityInput, ComplexityScorer, FallbackLadder, ModelPreference,
    ModelTier, ServiceName, TierModelTable,
};
