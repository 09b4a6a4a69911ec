//! Event types for outbound pipeline observation
//!
//! These events are broadcast on the [`EventBus`](super::EventBus) so that
//! telemetry sinks and tests can watch the pipeline without coupling to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::campaign::{CampaignId, Channel, EnrollmentId, LeadId};
use crate::router::circuit_breaker::{CircuitState, ServiceName};

/// All pipeline events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutreachEvent {
    /// A circuit breaker changed state
    BreakerTransition {
        service: ServiceName,
        from: CircuitState,
        to: CircuitState,
        failure_count: u32,
        timestamp: DateTime<Utc>,
    },

    /// A campaign step was delivered (or simulated)
    StepSent {
        enrollment_id: EnrollmentId,
        lead_id: LeadId,
        campaign_id: CampaignId,
        step_index: usize,
        channel: Channel,
        message_id: String,
        simulated: bool,
        timestamp: DateTime<Utc>,
    },

    /// A campaign step delivery failed and will be retried
    StepFailed {
        enrollment_id: EnrollmentId,
        lead_id: LeadId,
        step_index: usize,
        channel: Channel,
        attempts: u32,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// All steps of an enrollment were delivered
    EnrollmentCompleted {
        enrollment_id: EnrollmentId,
        lead_id: LeadId,
        campaign_id: CampaignId,
        timestamp: DateTime<Utc>,
    },

    /// An enrollment hit its per-step retry ceiling
    EnrollmentAbandoned {
        enrollment_id: EnrollmentId,
        lead_id: LeadId,
        step_index: usize,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// An enrollment could not be scheduled (missing campaign, step, lead, …)
    EnrollmentOrphaned {
        enrollment_id: EnrollmentId,
        lead_id: LeadId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The decision layer recorded a decision for a lead
    DecisionRecorded {
        lead_id: LeadId,
        action: String,
        valid: bool,
        timestamp: DateTime<Utc>,
    },

    /// A scheduler tick finished
    TickCompleted {
        due: usize,
        sent: usize,
        failed: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl OutreachEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            OutreachEvent::BreakerTransition { timestamp, .. } => *timestamp,
            OutreachEvent::StepSent { timestamp, .. } => *timestamp,
            OutreachEvent::StepFailed { timestamp, .. } => *timestamp,
            OutreachEvent::EnrollmentCompleted { timestamp, .. } => *timestamp,
            OutreachEvent::EnrollmentAbandoned { timestamp, .. } => *timestamp,
            OutreachEvent::EnrollmentOrphaned { timestamp, .. } => *timestamp,
            OutreachEvent::DecisionRecorded { timestamp, .. } => *timestamp,
            OutreachEvent::TickCompleted { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            OutreachEvent::BreakerTransition { .. } => "breaker_transition",
            OutreachEvent::StepSent { .. } => "step_sent",
            OutreachEvent::StepFailed { .. } => "step_failed",
            OutreachEvent::EnrollmentCompleted { .. } => "enrollment_completed",
            OutreachEvent::EnrollmentAbandoned { .. } => "enrollment_abandoned",
            OutreachEvent::EnrollmentOrphaned { .. } => "enrollment_orphaned",
            OutreachEvent::DecisionRecorded { .. } => "decision_recorded",
            OutreachEvent::TickCompleted { .. } => "tick_completed",
        }
    }

    /// Get the lead ID if this event is lead-scoped
    pub fn lead_id(&self) -> Option<&str> {
        match self {
            OutreachEvent::StepSent { lead_id, .. }
            | OutreachEvent::StepFailed { lead_id, .. }
            | OutreachEvent::EnrollmentCompleted { lead_id, .. }
            | OutreachEvent::EnrollmentAbandoned { lead_id, .. }
            | OutreachEvent::EnrollmentOrphaned { lead_id, .. }
            | OutreachEvent::DecisionRecorded { lead_id, .. } => Some(lead_id),
            OutreachEvent::BreakerTransition { .. } | OutreachEvent::TickCompleted { .. } => None,
        }
    }
}
