//! Overlord: per-lead channel assignment and qualification.
//!
//! ```text
//! lead + campaign ──► prompt ──► ModelRouter (overlord / strategic / JSON)
//!                                      │
//!                          ParsedDecision::{Recognized, Invalid}
//!                                      │
//!        channels ∩ enabled (or contact-based defaults) ──► lead updates
//!                                      │
//!                            decision log (always)
//! ```
//!
//! Neither a bad model answer nor a misconfigured provider fails the call:
//! the decision is recorded as invalid and the lead gets channels derived
//! from its own contact data. Only repository errors and an unknown lead
//! propagate.

use std::sync::Arc;

use chrono::Utc;
use coordination::{
    default_channels, filter_channels, AgentDecision, AgentType, Campaign, Channel,
    DecisionShape, DecisionType, Lead, LeadStatus, NewDecision, OutreachEvent, ParsedDecision,
    QualificationCriteria, SharedEventBus,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::errors::OutreachError;
use crate::model_router::{ModelRouter, ResponseSource, RouteOptions};
use crate::repository::LeadRepository;
use crate::transport::ResponseFormat;

const SYSTEM_PROMPT: &str = "You are the Overlord of an outbound sales team. \
Decide how to approach the lead. Answer with a single JSON object: \
{\"action\": \"assign_channels\" | \"qualify\" | \"nurture\" | \"disqualify\", \
\"channels\": [\"email\" | \"sms\" | \"chat\"], \"reasoning\": string, \"next_focus\": string}.";

/// What the Overlord decided, after validation and defaults.
#[derive(Debug, Clone, Serialize)]
pub struct OverlordDecision {
    pub action: String,
    pub channels: Vec<Channel>,
    pub next_focus: Option<String>,
    pub reasoning: String,
    /// `false` when the model answer was unusable and defaults were applied.
    pub valid: bool,
    /// `None` when routing failed before any model answered.
    pub model: Option<String>,
    pub source: Option<ResponseSource>,
    pub record: AgentDecision,
}

pub struct Overlord {
    router: Arc<ModelRouter>,
    repo: Arc<dyn LeadRepository>,
    bus: Option<SharedEventBus>,
}

impl Overlord {
    pub fn new(router: Arc<ModelRouter>, repo: Arc<dyn LeadRepository>) -> Self {
        Self {
            router,
            repo,
            bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: SharedEventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub async fn decide(
        &self,
        lead_id: &str,
        campaign_id: Option<&str>,
    ) -> Result<OverlordDecision, OutreachError> {
        let lead = self
            .repo
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| OutreachError::not_found("lead", lead_id))?;

        let campaign = match campaign_id {
            Some(id) => {
                let found = self.repo.get_campaign(id).await?;
                if found.is_none() {
                    warn!(lead_id, campaign_id = id, "Campaign not found, using defaults");
                }
                found
            }
            None => None,
        };
        let enabled = campaign
            .as_ref()
            .map(Campaign::enabled_channels)
            .unwrap_or_else(|| Channel::all().to_vec());

        let mut options = RouteOptions::new(build_prompt(&lead, campaign.as_ref(), &enabled));
        options.system_prompt = Some(SYSTEM_PROMPT.to_string());
        options.business_critical = true;
        options.requires_reasoning = true;
        options.agent_type = Some(AgentType::Overlord);
        options.decision_type = Some(DecisionType::Strategic);
        options.response_format = ResponseFormat::JsonObject;

        // Rejected credentials are not a reason to leave the lead undecided.
        let routed = match self.router.route_request(options).await {
            Ok(response) => Ok(response),
            Err(OutreachError::Configuration(reason)) => {
                warn!(lead_id, reason = %reason, "Model routing misconfigured, applying defaults");
                Err(reason)
            }
            Err(e) => return Err(e),
        };

        let (action, channels, next_focus, reasoning, failure) = match &routed {
            Ok(response) => match ParsedDecision::from_response(&response.content) {
                ParsedDecision::Recognized(shape) => {
                    let channels = match &shape {
                        DecisionShape::Disqualify { .. } => Vec::new(),
                        _ => {
                            let filtered = filter_channels(shape.channels(), &enabled);
                            if filtered.is_empty() {
                                default_channels(&lead, &enabled)
                            } else {
                                filtered
                            }
                        }
                    };
                    (
                        shape.action().to_string(),
                        channels,
                        shape.next_focus().map(str::to_string),
                        shape.reasoning().to_string(),
                        None,
                    )
                }
                ParsedDecision::Invalid { error, .. } => {
                    warn!(lead_id, error = %error, "Unusable Overlord response, applying defaults");
                    defaulted(
                        &lead,
                        &enabled,
                        format!("model response unusable ({error}); contact-based defaults applied"),
                        error.to_string(),
                    )
                }
            },
            Err(reason) => defaulted(
                &lead,
                &enabled,
                format!("model routing failed ({reason}); contact-based defaults applied"),
                reason.clone(),
            ),
        };
        let valid = failure.is_none();
        let model = routed.as_ref().ok().map(|r| r.model.clone());
        let source = routed.as_ref().ok().map(|r| r.source);

        self.apply(&lead, &action, &channels).await?;

        let data = json!({
            "channels": channels,
            "next_focus": next_focus,
            "valid": valid,
            "parse_error": failure,
            "model": model,
            "tier": routed.as_ref().ok().map(|r| r.complexity.tier),
            "score": routed.as_ref().ok().map(|r| r.complexity.score),
            "source": source,
            "campaign_id": campaign.as_ref().map(|c| c.id.clone()),
        });
        let record = self
            .repo
            .create_decision(
                NewDecision::new(&lead.id, AgentType::Overlord, &action, &reasoning).with_data(data),
            )
            .await?;

        if let Some(bus) = &self.bus {
            bus.publish(OutreachEvent::DecisionRecorded {
                lead_id: lead.id.clone(),
                action: action.clone(),
                valid,
                timestamp: Utc::now(),
            });
        }

        info!(
            lead_id,
            action = %action,
            channels = ?channels,
            valid,
            model = ?model,
            "Overlord decision"
        );

        Ok(OverlordDecision {
            action,
            channels,
            next_focus,
            reasoning,
            valid,
            model,
            source,
            record,
        })
    }

    async fn apply(
        &self,
        lead: &Lead,
        action: &str,
        channels: &[Channel],
    ) -> Result<(), OutreachError> {
        if let Some(primary) = channels.first() {
            self.repo.assign_channel(&lead.id, *primary).await?;
        }
        let status = match action {
            "qualify" => Some(LeadStatus::Qualified),
            "disqualify" => Some(LeadStatus::Rejected),
            _ if lead.status == LeadStatus::New && !channels.is_empty() => {
                Some(LeadStatus::Contacted)
            }
            _ => None,
        };
        if let Some(status) = status {
            self.repo.update_lead_status(&lead.id, status, None).await?;
        }
        Ok(())
    }
}

/// Contact-based `assign_channels` used whenever the model gives no usable answer.
fn defaulted(
    lead: &Lead,
    enabled: &[Channel],
    reasoning: String,
    failure: String,
) -> (String, Vec<Channel>, Option<String>, String, Option<String>) {
    (
        "assign_channels".to_string(),
        default_channels(lead, enabled),
        None,
        reasoning,
        Some(failure),
    )
}

fn build_prompt(lead: &Lead, campaign: Option<&Campaign>, enabled: &[Channel]) -> String {
    let criteria = campaign
        .map(|c| c.settings.qualification_criteria.clone())
        .unwrap_or_else(QualificationCriteria::default);
    let context = json!({
        "lead": {
            "name": lead.name,
            "status": lead.status,
            "source": lead.source,
            "has_email": lead.email.is_some(),
            "has_phone": lead.phone.is_some(),
            "qualification_score": lead.qualification_score,
            "metadata": lead.metadata,
        },
        "campaign": campaign.map(|c| json!({ "name": c.name, "goals": c.settings.goals })),
        "enabled_channels": enabled,
        "qualification_criteria": {
            "min_score": criteria.min_score,
            "required_fields": criteria.required_fields,
        },
    });
    format!("Decide the next outreach action for this lead.\n\n{context:#}")
}
