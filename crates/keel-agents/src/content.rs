//! Per-lead content personalization for campaign steps.

use std::sync::Arc;

use coordination::{render, AgentType, Channel, DecisionType, Lead, Step};
use tracing::debug;

use crate::channels::sms::MAX_SMS_CHARS;
use crate::model_router::{ModelRouter, ResponseSource, RouteOptions};

const SYSTEM_PROMPT: &str = "You write short, friendly outbound sales messages. \
Reply with the message body only: no subject line, no greeting placeholders, no commentary.";

/// Rewrites a step's rendered template for one lead.
pub struct ContentAgent {
    router: Arc<ModelRouter>,
}

impl ContentAgent {
    pub fn new(router: Arc<ModelRouter>) -> Self {
        Self { router }
    }

    /// Body for `step` addressed to `lead`.
    ///
    /// Only a real provider answer replaces the rendered template; mock,
    /// fallback and router errors all keep the template.
    pub async fn body_for(&self, lead: &Lead, step: &Step) -> String {
        let rendered = render(&step.content, lead);
        if !step.personalize {
            return rendered;
        }

        let mut options = RouteOptions::new(prompt(lead, step, &rendered));
        options.system_prompt = Some(SYSTEM_PROMPT.to_string());
        options.agent_type = Some(agent_for(step.channel));
        options.decision_type = Some(DecisionType::Operational);

        match self.router.route_request(options).await {
            Ok(resp) if resp.source == ResponseSource::Provider && !resp.content.trim().is_empty() => {
                let draft = resp.content.trim().to_string();
                match step.channel {
                    Channel::Sms => draft.chars().take(MAX_SMS_CHARS).collect(),
                    _ => draft,
                }
            }
            Ok(resp) => {
                debug!(lead_id = %lead.id, source = ?resp.source, "Keeping template body");
                rendered
            }
            Err(e) => {
                debug!(lead_id = %lead.id, error = %e, "Personalization failed, keeping template body");
                rendered
            }
        }
    }
}

fn agent_for(channel: Channel) -> AgentType {
    match channel {
        Channel::Email => AgentType::Email,
        Channel::Sms => AgentType::Sms,
        Channel::Chat => AgentType::Chat,
    }
}

fn prompt(lead: &Lead, step: &Step, rendered: &str) -> String {
    let mut out = format!(
        "Personalize this {} message for {} (source: {}).\n",
        step.channel, lead.name, lead.source
    );
    if !lead.metadata.is_empty() {
        out.push_str("Known details:\n");
        for (key, value) in &lead.metadata {
            out.push_str(&format!("- {key}: {value}\n"));
        }
    }
    if step.channel == Channel::Sms {
        out.push_str("Keep it under 320 characters.\n");
    }
    out.push_str("\nDraft:\n");
    out.push_str(rendered);
    out
}
