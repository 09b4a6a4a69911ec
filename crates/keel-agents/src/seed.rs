//! JSON seed files for the in-memory repository.
//!
//! ```json
//! {
//!   "leads": [{ "id": "l-1", "name": "Ada Lovelace", "email": "ada@example.com" }],
//!   "campaigns": [{ "id": "c-1", "name": "Spring", "status": "active", "steps": [...] }],
//!   "enrollments": [{ "lead_id": "l-1", "campaign_id": "c-1" }]
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use coordination::{Campaign, Lead};
use serde::Deserialize;
use tracing::info;

use crate::repository::InMemoryRepository;
use crate::scheduler::CampaignScheduler;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeedData {
    pub leads: Vec<Lead>,
    pub campaigns: Vec<Campaign>,
    pub enrollments: Vec<SeedEnrollment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedEnrollment {
    pub lead_id: String,
    pub campaign_id: String,
    /// Defaults to the load time.
    #[serde(default)]
    pub enrolled_at: Option<DateTime<Utc>>,
}

impl SeedData {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid seed file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to parse seed JSON")
    }

    /// Insert leads and campaigns into `repo`.
    pub fn populate(&self, repo: &InMemoryRepository) {
        for lead in &self.leads {
            repo.insert_lead(lead.clone());
        }
        for campaign in &self.campaigns {
            repo.insert_campaign(campaign.clone());
        }
        info!(
            leads = self.leads.len(),
            campaigns = self.campaigns.len(),
            "Seed data loaded"
        );
    }

    /// Enroll the seeded leads. Returns the number of enrollments created.
    pub async fn enroll(&self, scheduler: &CampaignScheduler, now: DateTime<Utc>) -> Result<usize> {
        for entry in &self.enrollments {
            scheduler
                .enroll(
                    &entry.lead_id,
                    &entry.campaign_id,
                    entry.enrolled_at.unwrap_or(now),
                )
                .await
                .with_context(|| {
                    format!(
                        "Failed to enroll lead {} in campaign {}",
                        entry.lead_id, entry.campaign_id
                    )
                })?;
        }
        Ok(self.enrollments.len())
    }
}
