//! Lead, campaign and step types shared by the scheduler and decision layer.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for leads
pub type LeadId = String;

/// Unique identifier for campaigns
pub type CampaignId = String;

/// Delivery channel for outbound communication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Chat,
}

impl Channel {
    /// All channels in preference order.
    pub fn all() -> &'static [Channel] {
        &[Channel::Email, Channel::Sms, Channel::Chat]
    }

    /// Parse a channel name as it appears in LLM output or config files.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "email" | "e-mail" | "mail" => Some(Self::Email),
            "sms" | "text" => Some(Self::Sms),
            "chat" => Some(Self::Chat),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Chat => "chat",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Converted,
    Rejected,
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Contacted => write!(f, "contacted"),
            Self::Qualified => write!(f, "qualified"),
            Self::Converted => write!(f, "converted"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A prospective customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub status: LeadStatus,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub assigned_channel: Option<Channel>,
    #[serde(default)]
    pub campaign_id: Option<CampaignId>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub qualification_score: f64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Create a new lead with only a name; contact fields are set by the caller.
    pub fn new(id: impl Into<LeadId>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            phone: None,
            status: LeadStatus::New,
            source: String::new(),
            assigned_channel: None,
            campaign_id: None,
            metadata: serde_json::Map::new(),
            qualification_score: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// First whitespace-delimited token of the name.
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("")
    }

    /// The address this lead can be reached at on `channel`, if any.
    ///
    /// Chat has no stored address; the lead id doubles as the conversation key.
    pub fn contact_for(&self, channel: Channel) -> Option<&str> {
        let value = match channel {
            Channel::Email => self.email.as_deref(),
            Channel::Sms => self.phone.as_deref(),
            Channel::Chat => Some(self.id.as_str()),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    /// Channels for which this lead has usable contact data.
    pub fn reachable_channels(&self) -> Vec<Channel> {
        Channel::all()
            .iter()
            .copied()
            .filter(|c| *c != Channel::Chat && self.contact_for(*c).is_some())
            .collect()
    }
}

/// Lifecycle status of a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Criteria a lead must meet before handover.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualificationCriteria {
    /// Minimum qualification score (0–100).
    pub min_score: f64,
    /// Lead fields or metadata keys that must be present.
    #[serde(default)]
    pub required_fields: Vec<String>,
}

impl Default for QualificationCriteria {
    fn default() -> Self {
        Self {
            min_score: 70.0,
            required_fields: vec!["email".to_string()],
        }
    }
}

/// Campaign-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSettings {
    #[serde(default = "default_enabled_channels")]
    pub enabled_channels: Vec<Channel>,
    #[serde(default)]
    pub qualification_criteria: QualificationCriteria,
    #[serde(default)]
    pub goals: Vec<String>,
}

fn default_enabled_channels() -> Vec<Channel> {
    Channel::all().to_vec()
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            enabled_channels: default_enabled_channels(),
            qualification_criteria: QualificationCriteria::default(),
            goals: Vec::new(),
        }
    }
}

/// One scheduled communication unit within a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub channel: Channel,
    #[serde(default)]
    pub subject: Option<String>,
    /// Message template; see [`crate::campaign::template`].
    pub content: String,
    pub order: u32,
    /// Days after the previous step (or enrollment, for the first step).
    #[serde(default)]
    pub delay_days: u32,
    /// Ask the content agent to draft the body from the template.
    #[serde(default)]
    pub personalize: bool,
}

impl Step {
    pub fn new(channel: Channel, order: u32, delay_days: u32, content: impl Into<String>) -> Self {
        Self {
            channel,
            subject: None,
            content: content.into(),
            order,
            delay_days,
            personalize: false,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

/// Longest delay a single step may carry (about ten years).
pub const MAX_STEP_DELAY_DAYS: u32 = 3650;

/// Reasons a campaign's step list is unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CampaignValidationError {
    #[error("campaign {0} has no steps")]
    NoSteps(CampaignId),

    #[error("campaign {campaign}: step order {order} appears more than once")]
    DuplicateOrder { campaign: CampaignId, order: u32 },

    #[error("campaign {campaign}: step order {order} does not increase after {previous}")]
    NonIncreasingOrder {
        campaign: CampaignId,
        previous: u32,
        order: u32,
    },

    #[error("campaign {campaign}: step order {order} delays {delay_days} days (max {max})")]
    DelayTooLong {
        campaign: CampaignId,
        order: u32,
        delay_days: u32,
        max: u32,
    },
}

/// A multi-step outreach campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub status: CampaignStatus,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub settings: CampaignSettings,
}

impl Campaign {
    pub fn new(id: impl Into<CampaignId>, name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: CampaignStatus::Draft,
            steps,
            settings: CampaignSettings::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CampaignStatus::Active
    }

    /// Step at cursor position `index` (steps are kept in `order` sequence).
    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Check that steps exist, that `order` is unique and strictly increasing,
    /// and that no delay exceeds [`MAX_STEP_DELAY_DAYS`].
    pub fn validate_steps(&self) -> Result<(), CampaignValidationError> {
        if self.steps.is_empty() {
            return Err(CampaignValidationError::NoSteps(self.id.clone()));
        }
        let mut seen = BTreeSet::new();
        let mut previous: Option<u32> = None;
        for step in &self.steps {
            if !seen.insert(step.order) {
                return Err(CampaignValidationError::DuplicateOrder {
                    campaign: self.id.clone(),
                    order: step.order,
                });
            }
            if let Some(prev) = previous {
                if step.order <= prev {
                    return Err(CampaignValidationError::NonIncreasingOrder {
                        campaign: self.id.clone(),
                        previous: prev,
                        order: step.order,
                    });
                }
            }
            previous = Some(step.order);
            if step.delay_days > MAX_STEP_DELAY_DAYS {
                return Err(CampaignValidationError::DelayTooLong {
                    campaign: self.id.clone(),
                    order: step.order,
                    delay_days: step.delay_days,
                    max: MAX_STEP_DELAY_DAYS,
                });
            }
        }
        Ok(())
    }

    /// Enabled channels, or every channel when the settings list is empty.
    pub fn enabled_channels(&self) -> Vec<Channel> {
        if self.settings.enabled_channels.is_empty() {
            Channel::all().to_vec()
        } else {
            self.settings.enabled_channels.clone()
        }
    }
}
