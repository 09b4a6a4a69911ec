//! Lead / campaign / decision persistence interface.
//!
//! The core only ever talks to [`LeadRepository`]. [`InMemoryRepository`]
//! backs the binary's seed-driven runs and the tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use coordination::{
    AgentDecision, Campaign, CampaignStatus, Channel, Lead, LeadStatus, NewDecision,
};
use tracing::debug;

use crate::errors::OutreachError;

/// Metadata key under which an external reference is stored on status updates.
pub const EXTERNAL_REF_KEY: &str = "external_ref";

#[async_trait]
pub trait LeadRepository: Send + Sync {
    async fn get_lead(&self, id: &str) -> Result<Option<Lead>, OutreachError>;

    async fn update_lead_status(
        &self,
        id: &str,
        status: LeadStatus,
        external_ref: Option<&str>,
    ) -> Result<Lead, OutreachError>;

    async fn assign_channel(&self, id: &str, channel: Channel) -> Result<Lead, OutreachError>;

    /// Append a decision to the audit log.
    async fn create_decision(&self, decision: NewDecision) -> Result<AgentDecision, OutreachError>;

    /// Decisions for a lead, oldest first.
    async fn list_decisions(&self, lead_id: &str) -> Result<Vec<AgentDecision>, OutreachError>;

    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>, OutreachError>;

    async fn update_campaign_status(
        &self,
        id: &str,
        status: CampaignStatus,
    ) -> Result<Campaign, OutreachError>;
}

#[derive(Debug, Default)]
struct Tables {
    leads: HashMap<String, Lead>,
    campaigns: HashMap<String, Campaign>,
    decisions: Vec<AgentDecision>,
}

/// Process-local repository.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_lead(&self, lead: Lead) {
        self.lock().leads.insert(lead.id.clone(), lead);
    }

    pub fn insert_campaign(&self, campaign: Campaign) {
        self.lock().campaigns.insert(campaign.id.clone(), campaign);
    }

    pub fn remove_campaign(&self, id: &str) -> Option<Campaign> {
        self.lock().campaigns.remove(id)
    }

    /// Every decision across all leads, oldest first.
    pub fn all_decisions(&self) -> Vec<AgentDecision> {
        self.lock().decisions.clone()
    }

    pub fn lead_count(&self) -> usize {
        self.lock().leads.len()
    }
}

#[async_trait]
impl LeadRepository for InMemoryRepository {
    async fn get_lead(&self, id: &str) -> Result<Option<Lead>, OutreachError> {
        Ok(self.lock().leads.get(id).cloned())
    }

    async fn update_lead_status(
        &self,
        id: &str,
        status: LeadStatus,
        external_ref: Option<&str>,
    ) -> Result<Lead, OutreachError> {
        let mut tables = self.lock();
        let lead = tables
            .leads
            .get_mut(id)
            .ok_or_else(|| OutreachError::not_found("lead", id))?;
        debug!(lead_id = %id, from = %lead.status, to = %status, "Lead status update");
        lead.status = status;
        if let Some(reference) = external_ref {
            lead.metadata.insert(
                EXTERNAL_REF_KEY.to_string(),
                serde_json::Value::String(reference.to_string()),
            );
        }
        lead.updated_at = Utc::now();
        Ok(lead.clone())
    }

    async fn assign_channel(&self, id: &str, channel: Channel) -> Result<Lead, OutreachError> {
        let mut tables = self.lock();
        let lead = tables
            .leads
            .get_mut(id)
            .ok_or_else(|| OutreachError::not_found("lead", id))?;
        lead.assigned_channel = Some(channel);
        lead.updated_at = Utc::now();
        Ok(lead.clone())
    }

    async fn create_decision(&self, decision: NewDecision) -> Result<AgentDecision, OutreachError> {
        let record = AgentDecision::from_new(decision, Utc::now());
        self.lock().decisions.push(record.clone());
        Ok(record)
    }

    async fn list_decisions(&self, lead_id: &str) -> Result<Vec<AgentDecision>, OutreachError> {
        Ok(self
            .lock()
            .decisions
            .iter()
            .filter(|d| d.lead_id == lead_id)
            .cloned()
            .collect())
    }

    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>, OutreachError> {
        Ok(self.lock().campaigns.get(id).cloned())
    }

    async fn update_campaign_status(
        &self,
        id: &str,
        status: CampaignStatus,
    ) -> Result<Campaign, OutreachError> {
        let mut tables = self.lock();
        let campaign = tables
            .campaigns
            .get_mut(id)
            .ok_or_else(|| OutreachError::not_found("campaign", id))?;
        campaign.status = status;
        Ok(campaign.clone())
    }
}
