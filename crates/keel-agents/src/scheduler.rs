//! Campaign step scheduler and executor.
//!
//! Each tick:
//!
//! ```text
//! scan (lock) ──► due enrollments in enrollment order
//!      │
//!      ├─► resolve campaign / step / lead / sender   (orphan on any gap)
//!      ├─► render or personalize body
//!      └─► ChannelSender::send        ── bounded by max_concurrent_sends
//!                 │
//! apply (lock) ◄──┘ results in scan order
//!      ├─ delivered ─► cursor+1, Pending(now + next delay) | Completed
//!      ├─ failed    ─► Failed (retried next tick) | Abandoned at ceiling
//!      ├─ deferred  ─► unchanged, retried next tick, no attempt charged
//!      └─ orphaned  ─► Orphaned
//! ```
//!
//! Failures are sorted by [`RetryCategory`]: an open breaker, rejected
//! credentials or a transient repository error defer the step instead of
//! counting toward `max_step_attempts`.
//!
//! Ticks never overlap: a tick that finds another one running returns a
//! `skipped` report and touches nothing. Lead status is never changed here.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use coordination::{
    render, AgentType, Campaign, CampaignStatus, Channel, Enrollment, EnrollmentState,
    FailureDisposition, NewDecision, OutreachEvent, SharedEventBus,
};
use futures::stream::{self, StreamExt};
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channels::{ChannelSender, DeliveryResult, OutboundMessage, StepContext};
use crate::config::SchedulerSettings;
use crate::content::ContentAgent;
use crate::errors::{OutreachError, RetryCategory};
use crate::repository::LeadRepository;
use crate::telemetry::{append_tick_report, TickReport};

/// What processing one due enrollment produced.
#[derive(Debug)]
enum StepOutcome {
    /// Campaign exists but is not active; leave the enrollment alone.
    Paused,
    Delivered {
        result: DeliveryResult,
        next_delay_days: Option<u32>,
    },
    Failed {
        channel: Channel,
        error: String,
        category: RetryCategory,
    },
    /// Nothing wrong with this step; try again next tick.
    Deferred {
        reason: String,
        category: RetryCategory,
    },
    Orphaned {
        reason: String,
    },
}

pub struct CampaignScheduler {
    repo: Arc<dyn LeadRepository>,
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
    content: Option<Arc<ContentAgent>>,
    bus: Option<SharedEventBus>,
    settings: SchedulerSettings,
    telemetry_path: Option<PathBuf>,
    enrollments: Mutex<Vec<Enrollment>>,
    tick_lock: Mutex<()>,
}

impl CampaignScheduler {
    pub fn new(repo: Arc<dyn LeadRepository>, settings: SchedulerSettings) -> Self {
        Self {
            repo,
            senders: HashMap::new(),
            content: None,
            bus: None,
            settings,
            telemetry_path: None,
            enrollments: Mutex::new(Vec::new()),
            tick_lock: Mutex::new(()),
        }
    }

    /// Register the sender for its channel, replacing any previous one.
    pub fn with_sender(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(sender.channel(), sender);
        self
    }

    pub fn with_content_agent(mut self, agent: Arc<ContentAgent>) -> Self {
        self.content = Some(agent);
        self
    }

    pub fn with_event_bus(mut self, bus: SharedEventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_telemetry_path(mut self, path: PathBuf) -> Self {
        self.telemetry_path = Some(path);
        self
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Enroll a lead; the first step fires `steps[0].delay_days` after `at`.
    pub async fn enroll(
        &self,
        lead_id: &str,
        campaign_id: &str,
        at: DateTime<Utc>,
    ) -> Result<String, OutreachError> {
        if self.repo.get_lead(lead_id).await?.is_none() {
            return Err(OutreachError::not_found("lead", lead_id));
        }
        let campaign = self
            .repo
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| OutreachError::not_found("campaign", campaign_id))?;
        campaign.validate_steps()?;
        let first_delay = campaign.steps.first().map_or(0, |s| s.delay_days);

        let mut enrollments = self.enrollments.lock().await;
        let duplicate = enrollments
            .iter()
            .any(|e| e.lead_id == lead_id && e.campaign_id == campaign_id && !e.is_terminal());
        if duplicate {
            return Err(OutreachError::DuplicateEnrollment {
                lead_id: lead_id.to_string(),
                campaign_id: campaign_id.to_string(),
            });
        }

        let enrollment = Enrollment::new(lead_id, campaign_id, at, first_delay);
        let id = enrollment.id.clone();
        info!(
            enrollment_id = %id,
            lead_id,
            campaign_id,
            first_fire_at = %enrollment.next_fire_at,
            "Lead enrolled"
        );
        enrollments.push(enrollment);
        Ok(id)
    }

    /// Snapshot of every enrollment, in enrollment order.
    pub async fn enrollments(&self) -> Vec<Enrollment> {
        self.enrollments.lock().await.clone()
    }

    pub async fn enrollment(&self, id: &str) -> Option<Enrollment> {
        self.enrollments
            .lock()
            .await
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    /// Tick using the wall clock.
    pub async fn tick(&self) -> TickReport {
        self.tick_at(Utc::now()).await
    }

    /// Process everything due at `now`.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickReport {
        let Ok(_tick) = self.tick_lock.try_lock() else {
            let report = TickReport::skipped(now);
            report.log();
            return report;
        };
        let start = Instant::now();
        let mut report = TickReport::new(now);

        let due: Vec<(usize, Enrollment)> = {
            let enrollments = self.enrollments.lock().await;
            enrollments
                .iter()
                .enumerate()
                .filter(|(_, e)| e.is_due(now))
                .map(|(pos, e)| (pos, e.clone()))
                .collect()
        };

        let mut outcomes: Vec<(usize, StepOutcome)> = stream::iter(due)
            .map(|(pos, enrollment)| async move {
                let outcome = self.process(&enrollment, now).await;
                (pos, outcome)
            })
            .buffer_unordered(self.settings.max_concurrent_sends.max(1))
            .collect()
            .await;
        outcomes.sort_by_key(|(pos, _)| *pos);

        let mut decisions = Vec::new();
        let mut events = Vec::new();
        let mut touched_campaigns = BTreeSet::new();
        {
            let mut enrollments = self.enrollments.lock().await;
            for (pos, outcome) in outcomes {
                let Some(enrollment) = enrollments.get_mut(pos) else {
                    continue;
                };
                if matches!(outcome, StepOutcome::Paused) {
                    report.paused += 1;
                    continue;
                }
                report.due += 1;
                if let Err(e) = self.apply(
                    enrollment,
                    outcome,
                    now,
                    &mut report,
                    &mut decisions,
                    &mut events,
                ) {
                    warn!(enrollment_id = %enrollment.id, error = %e, "Enrollment transition rejected");
                    continue;
                }
                if enrollment.state == EnrollmentState::Completed {
                    touched_campaigns.insert(enrollment.campaign_id.clone());
                }
            }

            for campaign_id in touched_campaigns {
                let all_terminal = enrollments
                    .iter()
                    .filter(|e| e.campaign_id == campaign_id)
                    .all(Enrollment::is_terminal);
                if all_terminal {
                    report.campaigns_completed.push(campaign_id);
                }
            }
        }

        for decision in decisions {
            if let Err(e) = self.repo.create_decision(decision).await {
                warn!(error = %e, "Failed to record scheduler decision");
            }
        }
        for campaign_id in &report.campaigns_completed {
            match self
                .repo
                .update_campaign_status(campaign_id, CampaignStatus::Completed)
                .await
            {
                Ok(_) => info!(campaign_id = %campaign_id, "Campaign completed"),
                Err(e) => warn!(campaign_id = %campaign_id, error = %e, "Failed to complete campaign"),
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report.log();
        if let Some(path) = &self.telemetry_path {
            append_tick_report(&report, path);
        }
        if let Some(bus) = &self.bus {
            for event in events {
                bus.publish(event);
            }
            bus.publish(report.to_event());
        }
        report
    }

    /// Tick every `tick_interval_secs` until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let period = Duration::from_secs(self.settings.tick_interval_secs.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval_secs = period.as_secs(), "Scheduler started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    // ── Per-enrollment work ─────────────────────────────────────────────

    async fn process(&self, enrollment: &Enrollment, now: DateTime<Utc>) -> StepOutcome {
        let campaign = match self.repo.get_campaign(&enrollment.campaign_id).await {
            Ok(Some(campaign)) => campaign,
            Ok(None) => {
                return StepOutcome::Orphaned {
                    reason: format!("campaign {} not found", enrollment.campaign_id),
                }
            }
            Err(e) => return read_failure("campaign", e),
        };
        if !campaign.is_active() {
            debug!(enrollment_id = %enrollment.id, status = %campaign.status, "Campaign not active, skipping");
            return StepOutcome::Paused;
        }
        // Steps may have been edited since enrollment.
        if let Err(e) = campaign.validate_steps() {
            return StepOutcome::Orphaned {
                reason: e.to_string(),
            };
        }

        let index = enrollment.current_step_index;
        let Some(step) = campaign.step(index) else {
            return StepOutcome::Orphaned {
                reason: format!("campaign {} has no step {index}", campaign.id),
            };
        };

        let lead = match self.repo.get_lead(&enrollment.lead_id).await {
            Ok(Some(lead)) => lead,
            Ok(None) => {
                return StepOutcome::Orphaned {
                    reason: format!("lead {} not found", enrollment.lead_id),
                }
            }
            Err(e) => return read_failure("lead", e),
        };

        let Some(sender) = self.senders.get(&step.channel) else {
            return StepOutcome::Orphaned {
                reason: format!("no sender for channel {}", step.channel),
            };
        };
        let Some(recipient) = lead.contact_for(step.channel) else {
            return StepOutcome::Orphaned {
                reason: format!("lead has no {} contact", step.channel),
            };
        };

        let body = match &self.content {
            Some(agent) => agent.body_for(&lead, step).await,
            None => render(&step.content, &lead),
        };
        let mut message = OutboundMessage::new(&lead.id, recipient, body).with_step(StepContext {
            campaign_id: campaign.id.clone(),
            enrollment_id: enrollment.id.clone(),
            step_index: index,
        });
        if let Some(subject) = &step.subject {
            message = message.with_subject(render(subject, &lead));
        }

        debug!(
            enrollment_id = %enrollment.id,
            step = index,
            channel = %step.channel,
            at = %now,
            "Sending campaign step"
        );
        let result = sender.send(message).await;
        if result.is_success() {
            StepOutcome::Delivered {
                result,
                next_delay_days: next_delay(&campaign, index),
            }
        } else {
            let category = result.category.unwrap_or(RetryCategory::Transient);
            let error = result
                .error
                .unwrap_or_else(|| "delivery failed".to_string());
            if category.charges_attempt() {
                StepOutcome::Failed {
                    channel: step.channel,
                    error,
                    category,
                }
            } else {
                StepOutcome::Deferred {
                    reason: error,
                    category,
                }
            }
        }
    }

    fn apply(
        &self,
        enrollment: &mut Enrollment,
        outcome: StepOutcome,
        now: DateTime<Utc>,
        report: &mut TickReport,
        decisions: &mut Vec<NewDecision>,
        events: &mut Vec<OutreachEvent>,
    ) -> Result<(), OutreachError> {
        let step_index = enrollment.current_step_index;
        match outcome {
            StepOutcome::Paused => {}
            StepOutcome::Delivered {
                result,
                next_delay_days,
            } => {
                enrollment.begin_attempt(now)?;
                enrollment.record_sent(now, next_delay_days)?;
                let simulated = result.is_simulated();
                if simulated {
                    report.simulated += 1;
                } else {
                    report.sent += 1;
                }
                events.push(OutreachEvent::StepSent {
                    enrollment_id: enrollment.id.clone(),
                    lead_id: enrollment.lead_id.clone(),
                    campaign_id: enrollment.campaign_id.clone(),
                    step_index,
                    channel: result.channel,
                    message_id: result.id.unwrap_or_default(),
                    simulated,
                    timestamp: now,
                });
                if enrollment.state == EnrollmentState::Completed {
                    report.completed += 1;
                    events.push(OutreachEvent::EnrollmentCompleted {
                        enrollment_id: enrollment.id.clone(),
                        lead_id: enrollment.lead_id.clone(),
                        campaign_id: enrollment.campaign_id.clone(),
                        timestamp: now,
                    });
                }
            }
            StepOutcome::Deferred { reason, category } => {
                report.deferred += 1;
                warn!(
                    enrollment_id = %enrollment.id,
                    step = step_index,
                    category = %category,
                    reason = %reason,
                    "Campaign step deferred"
                );
            }
            StepOutcome::Failed {
                channel,
                error,
                category,
            } => {
                enrollment.begin_attempt(now)?;
                match enrollment.record_failure(now, &error, self.settings.step_attempt_ceiling())? {
                    FailureDisposition::WillRetry { attempts } => {
                        report.failed += 1;
                        warn!(
                            enrollment_id = %enrollment.id,
                            step = step_index,
                            attempts,
                            category = %category,
                            error = %error,
                            "Campaign step failed, will retry"
                        );
                        events.push(OutreachEvent::StepFailed {
                            enrollment_id: enrollment.id.clone(),
                            lead_id: enrollment.lead_id.clone(),
                            step_index,
                            channel,
                            attempts,
                            error,
                            timestamp: now,
                        });
                    }
                    FailureDisposition::Abandoned { attempts } => {
                        report.abandoned += 1;
                        warn!(
                            enrollment_id = %enrollment.id,
                            step = step_index,
                            attempts,
                            "Enrollment abandoned at retry ceiling"
                        );
                        decisions.push(
                            NewDecision::new(
                                &enrollment.lead_id,
                                AgentType::Scheduler,
                                "abandon_enrollment",
                                format!("step {step_index} failed {attempts} times: {error}"),
                            )
                            .with_data(json!({
                                "enrollment_id": enrollment.id,
                                "campaign_id": enrollment.campaign_id,
                                "step_index": step_index,
                                "attempts": attempts,
                            })),
                        );
                        events.push(OutreachEvent::EnrollmentAbandoned {
                            enrollment_id: enrollment.id.clone(),
                            lead_id: enrollment.lead_id.clone(),
                            step_index,
                            attempts,
                            timestamp: now,
                        });
                    }
                }
            }
            StepOutcome::Orphaned { reason } => {
                enrollment.orphan(now, &reason)?;
                report.orphaned += 1;
                warn!(enrollment_id = %enrollment.id, reason = %reason, "Enrollment orphaned");
                decisions.push(
                    NewDecision::new(
                        &enrollment.lead_id,
                        AgentType::Scheduler,
                        "orphan_enrollment",
                        reason.clone(),
                    )
                    .with_data(json!({
                        "enrollment_id": enrollment.id,
                        "campaign_id": enrollment.campaign_id,
                        "step_index": step_index,
                    })),
                );
                events.push(OutreachEvent::EnrollmentOrphaned {
                    enrollment_id: enrollment.id.clone(),
                    lead_id: enrollment.lead_id.clone(),
                    reason,
                    timestamp: now,
                });
            }
        }
        Ok(())
    }
}

/// A repository read failed. Retriable errors leave the enrollment for the
/// next tick without charging an attempt; anything else orphans it.
fn read_failure(what: &str, err: OutreachError) -> StepOutcome {
    let category = err.retry_category();
    let reason = format!("failed to load {what}: {err}");
    if category.is_retriable() {
        StepOutcome::Deferred { reason, category }
    } else {
        StepOutcome::Orphaned { reason }
    }
}

/// Delay before the step after `index`, or `None` when `index` is the last.
fn next_delay(campaign: &Campaign, index: usize) -> Option<u32> {
    campaign.step(index + 1).map(|s| s.delay_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{DeliveryStatus, EmailSender};
    use crate::repository::InMemoryRepository;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use coordination::{CircuitBreaker, Lead, ServiceName, Step};

    /// Sender that fails the first `fail_first` calls.
    struct FlakySender {
        fail_first: std::sync::Mutex<u32>,
        calls: std::sync::Mutex<Vec<String>>,
    }

    impl FlakySender {
        fn new(fail_first: u32) -> Arc<Self> {
            Arc::new(Self {
                fail_first: std::sync::Mutex::new(fail_first),
                calls: std::sync::Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChannelSender for FlakySender {
        fn channel(&self) -> Channel {
            Channel::Email
        }

        async fn send(&self, message: OutboundMessage) -> DeliveryResult {
            self.calls.lock().unwrap().push(message.body.clone());
            let mut remaining = self.fail_first.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                DeliveryResult::failed(Channel::Email, &message.recipient, "provider down")
            } else {
                DeliveryResult::sent(Channel::Email, &message.recipient, "m-1")
            }
        }
    }

    /// Sender whose every attempt fails with the same category.
    struct FailingSender(RetryCategory);

    #[async_trait]
    impl ChannelSender for FailingSender {
        fn channel(&self) -> Channel {
            Channel::Email
        }

        async fn send(&self, message: OutboundMessage) -> DeliveryResult {
            DeliveryResult::failed(Channel::Email, &message.recipient, "unavailable")
                .with_category(self.0)
        }
    }

    /// Delegates to an in-memory repository; reads fail while `down` is set.
    struct OutageRepo {
        inner: Arc<InMemoryRepository>,
        down: std::sync::atomic::AtomicBool,
    }

    impl OutageRepo {
        fn check(&self) -> Result<(), OutreachError> {
            if self.down.load(std::sync::atomic::Ordering::SeqCst) {
                Err(OutreachError::Repository("connection reset".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl LeadRepository for OutageRepo {
        async fn get_lead(&self, id: &str) -> Result<Option<Lead>, OutreachError> {
            self.check()?;
            self.inner.get_lead(id).await
        }

        async fn update_lead_status(
            &self,
            id: &str,
            status: coordination::LeadStatus,
            external_ref: Option<&str>,
        ) -> Result<Lead, OutreachError> {
            self.inner.update_lead_status(id, status, external_ref).await
        }

        async fn assign_channel(&self, id: &str, channel: Channel) -> Result<Lead, OutreachError> {
            self.inner.assign_channel(id, channel).await
        }

        async fn create_decision(
            &self,
            decision: NewDecision,
        ) -> Result<coordination::AgentDecision, OutreachError> {
            self.inner.create_decision(decision).await
        }

        async fn list_decisions(
            &self,
            lead_id: &str,
        ) -> Result<Vec<coordination::AgentDecision>, OutreachError> {
            self.inner.list_decisions(lead_id).await
        }

        async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>, OutreachError> {
            self.check()?;
            self.inner.get_campaign(id).await
        }

        async fn update_campaign_status(
            &self,
            id: &str,
            status: CampaignStatus,
        ) -> Result<Campaign, OutreachError> {
            self.inner.update_campaign_status(id, status).await
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn repo_with(steps: Vec<Step>, status: CampaignStatus) -> Arc<InMemoryRepository> {
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert_lead(Lead::new("l-1", "Ada Lovelace").with_email("ada@example.com"));
        let mut campaign = Campaign::new("c-1", "Spring", steps);
        campaign.status = status;
        repo.insert_campaign(campaign);
        repo
    }

    fn email_steps(delays: &[u32]) -> Vec<Step> {
        delays
            .iter()
            .enumerate()
            .map(|(i, d)| Step::new(Channel::Email, i as u32 + 1, *d, format!("Step {i} for {{{{first_name}}}}")))
            .collect()
    }

    #[tokio::test]
    async fn test_enroll_rejects_duplicates_and_unknowns() {
        let repo = repo_with(email_steps(&[0]), CampaignStatus::Active);
        let scheduler = CampaignScheduler::new(repo, SchedulerSettings::default());

        scheduler.enroll("l-1", "c-1", t0()).await.unwrap();
        assert!(matches!(
            scheduler.enroll("l-1", "c-1", t0()).await,
            Err(OutreachError::DuplicateEnrollment { .. })
        ));
        assert!(matches!(
            scheduler.enroll("ghost", "c-1", t0()).await,
            Err(OutreachError::NotFound { kind: "lead", .. })
        ));
        assert!(matches!(
            scheduler.enroll("l-1", "c-9", t0()).await,
            Err(OutreachError::NotFound { kind: "campaign", .. })
        ));
    }

    #[tokio::test]
    async fn test_enroll_rejects_campaign_without_steps() {
        let repo = repo_with(vec![], CampaignStatus::Active);
        let scheduler = CampaignScheduler::new(repo, SchedulerSettings::default());
        assert!(matches!(
            scheduler.enroll("l-1", "c-1", t0()).await,
            Err(OutreachError::InvalidCampaign(_))
        ));
    }

    #[tokio::test]
    async fn test_paused_campaign_is_left_alone() {
        let repo = repo_with(email_steps(&[0]), CampaignStatus::Paused);
        let sender = FlakySender::new(0);
        let scheduler =
            CampaignScheduler::new(repo, SchedulerSettings::default()).with_sender(sender.clone());
        scheduler.enroll("l-1", "c-1", t0()).await.unwrap();

        let report = scheduler.tick_at(t0()).await;
        assert_eq!(report.paused, 1);
        assert_eq!(report.due, 0);
        assert!(sender.calls.lock().unwrap().is_empty());
        assert_eq!(scheduler.enrollments().await[0].state, EnrollmentState::Pending);
    }

    #[tokio::test]
    async fn test_failure_retries_then_abandons_at_ceiling() {
        let repo = repo_with(email_steps(&[0, 1]), CampaignStatus::Active);
        let sender = FlakySender::new(u32::MAX);
        let settings = SchedulerSettings {
            max_step_attempts: 2,
            ..SchedulerSettings::default()
        };
        let scheduler = CampaignScheduler::new(repo.clone(), settings).with_sender(sender);
        scheduler.enroll("l-1", "c-1", t0()).await.unwrap();

        let first = scheduler.tick_at(t0()).await;
        assert_eq!(first.failed, 1);
        let e = &scheduler.enrollments().await[0];
        assert_eq!(e.state, EnrollmentState::Failed);
        assert_eq!(e.current_step_index, 0);

        let second = scheduler.tick_at(t0() + chrono::Duration::minutes(1)).await;
        assert_eq!(second.abandoned, 1);
        assert_eq!(scheduler.enrollments().await[0].state, EnrollmentState::Abandoned);

        let log = repo.list_decisions("l-1").await.unwrap();
        assert_eq!(log.last().unwrap().action, "abandon_enrollment");
    }

    #[tokio::test]
    async fn test_missing_sender_orphans_without_aborting_tick() {
        let repo = repo_with(vec![Step::new(Channel::Sms, 1, 0, "hi")], CampaignStatus::Active);
        repo.insert_lead(Lead::new("l-2", "Bob").with_email("bob@example.com"));
        let mut email_campaign = Campaign::new("c-2", "Email", email_steps(&[0]));
        email_campaign.status = CampaignStatus::Active;
        repo.insert_campaign(email_campaign);

        let scheduler = CampaignScheduler::new(repo.clone(), SchedulerSettings::default())
            .with_sender(Arc::new(EmailSender::new(
                None,
                Arc::new(CircuitBreaker::for_service(ServiceName::Mailgun)),
                repo.clone(),
            )));
        scheduler.enroll("l-1", "c-1", t0()).await.unwrap();
        scheduler.enroll("l-2", "c-2", t0()).await.unwrap();

        let report = scheduler.tick_at(t0()).await;
        assert_eq!(report.orphaned, 1);
        assert_eq!(report.simulated, 1);
        assert_eq!(report.completed, 1);

        let enrollments = scheduler.enrollments().await;
        assert_eq!(enrollments[0].state, EnrollmentState::Orphaned);
        assert_eq!(enrollments[1].state, EnrollmentState::Completed);
        assert_eq!(
            repo.get_campaign("c-2").await.unwrap().unwrap().status,
            CampaignStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_deleted_campaign_orphans() {
        let repo = repo_with(email_steps(&[0]), CampaignStatus::Active);
        let scheduler = CampaignScheduler::new(repo.clone(), SchedulerSettings::default())
            .with_sender(FlakySender::new(0));
        scheduler.enroll("l-1", "c-1", t0()).await.unwrap();
        repo.remove_campaign("c-1");

        let report = scheduler.tick_at(t0()).await;
        assert_eq!(report.orphaned, 1);
        let e = &scheduler.enrollments().await[0];
        assert!(e.last_error.as_deref().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_concurrent_tick_is_skipped() {
        let repo = repo_with(email_steps(&[0]), CampaignStatus::Active);
        let scheduler = CampaignScheduler::new(repo, SchedulerSettings::default());
        let _held = scheduler.tick_lock.try_lock().unwrap();
        let report = scheduler.tick_at(t0()).await;
        assert!(report.skipped);
    }

    #[tokio::test]
    async fn test_subject_and_body_rendered() {
        let repo = repo_with(
            vec![Step::new(Channel::Email, 1, 0, "Hello {{first_name}}").with_subject("For {{name}}")],
            CampaignStatus::Active,
        );
        let scheduler = CampaignScheduler::new(repo.clone(), SchedulerSettings::default())
            .with_sender(Arc::new(EmailSender::new(
                None,
                Arc::new(CircuitBreaker::for_service(ServiceName::Mailgun)),
                repo.clone(),
            )));
        scheduler.enroll("l-1", "c-1", t0()).await.unwrap();
        scheduler.tick_at(t0()).await;

        let log = repo.list_decisions("l-1").await.unwrap();
        assert_eq!(log[0].data["subject"], "For Ada Lovelace");
        assert_eq!(log[0].data["body_preview"], "Hello Ada");
        assert_eq!(log[0].data["status"], DeliveryStatus::Simulated.to_string());
    }

    #[tokio::test]
    async fn test_service_wide_failures_defer_without_charging_attempts() {
        for category in [RetryCategory::CircuitOpen, RetryCategory::Configuration] {
            let repo = repo_with(email_steps(&[0]), CampaignStatus::Active);
            let settings = SchedulerSettings {
                max_step_attempts: 1,
                ..SchedulerSettings::default()
            };
            let scheduler = CampaignScheduler::new(repo, settings)
                .with_sender(Arc::new(FailingSender(category)));
            scheduler.enroll("l-1", "c-1", t0()).await.unwrap();

            for minute in 0..3 {
                let report = scheduler.tick_at(t0() + chrono::Duration::minutes(minute)).await;
                assert_eq!(report.deferred, 1, "{category}");
                assert_eq!(report.abandoned, 0, "{category}");
            }
            let e = &scheduler.enrollments().await[0];
            assert_eq!(e.state, EnrollmentState::Pending);
            assert_eq!(e.attempts, 0);
            assert!(e.transitions.is_empty());
        }
    }

    #[tokio::test]
    async fn test_step_specific_failure_charges_attempt() {
        let repo = repo_with(email_steps(&[0]), CampaignStatus::Active);
        let settings = SchedulerSettings {
            max_step_attempts: 1,
            ..SchedulerSettings::default()
        };
        let scheduler = CampaignScheduler::new(repo, settings)
            .with_sender(Arc::new(FailingSender(RetryCategory::RateLimit)));
        scheduler.enroll("l-1", "c-1", t0()).await.unwrap();

        let report = scheduler.tick_at(t0()).await;
        assert_eq!(report.abandoned, 1);
        assert_eq!(report.deferred, 0);
    }

    #[tokio::test]
    async fn test_repository_outage_does_not_abandon() {
        let inner = repo_with(email_steps(&[0]), CampaignStatus::Active);
        let repo = Arc::new(OutageRepo {
            inner,
            down: std::sync::atomic::AtomicBool::new(false),
        });
        let settings = SchedulerSettings {
            max_step_attempts: 1,
            ..SchedulerSettings::default()
        };
        let sender = FlakySender::new(0);
        let scheduler = CampaignScheduler::new(repo.clone(), settings).with_sender(sender.clone());
        scheduler.enroll("l-1", "c-1", t0()).await.unwrap();

        repo.down.store(true, std::sync::atomic::Ordering::SeqCst);
        for minute in 0..3 {
            let report = scheduler.tick_at(t0() + chrono::Duration::minutes(minute)).await;
            assert_eq!(report.deferred, 1);
        }
        let e = &scheduler.enrollments().await[0];
        assert_eq!(e.state, EnrollmentState::Pending);
        assert_eq!(e.attempts, 0);
        assert!(sender.calls.lock().unwrap().is_empty());

        repo.down.store(false, std::sync::atomic::Ordering::SeqCst);
        let report = scheduler.tick_at(t0() + chrono::Duration::minutes(5)).await;
        assert_eq!(report.sent, 1);
        assert_eq!(report.completed, 1);
    }

    #[tokio::test]
    async fn test_oversized_delay_rejected_at_enroll() {
        let repo = repo_with(email_steps(&[u32::MAX]), CampaignStatus::Active);
        let scheduler = CampaignScheduler::new(repo, SchedulerSettings::default());
        assert!(matches!(
            scheduler.enroll("l-1", "c-1", t0()).await,
            Err(OutreachError::InvalidCampaign(
                coordination::CampaignValidationError::DelayTooLong { .. }
            ))
        ));
        assert!(scheduler.enrollments().await.is_empty());
    }

    #[tokio::test]
    async fn test_campaign_edited_to_oversized_delay_orphans_without_aborting_tick() {
        let repo = repo_with(email_steps(&[0, 1]), CampaignStatus::Active);
        let scheduler = CampaignScheduler::new(repo.clone(), SchedulerSettings::default())
            .with_sender(FlakySender::new(0));
        scheduler.enroll("l-1", "c-1", t0()).await.unwrap();

        let mut edited = Campaign::new("c-1", "Spring", email_steps(&[0, u32::MAX]));
        edited.status = CampaignStatus::Active;
        repo.insert_campaign(edited);

        let report = scheduler.tick_at(t0()).await;
        assert_eq!(report.orphaned, 1);
        let e = &scheduler.enrollments().await[0];
        assert_eq!(e.state, EnrollmentState::Orphaned);
        assert!(e.last_error.as_deref().unwrap().contains("delays"));
    }
}
