//! Enrollment state machine: explicit states and legal transition guards.
//!
//! An enrollment ties one lead to one campaign and walks a cursor through the
//! campaign's ordered steps:
//!
//! ```text
//! Pending(i) → Due → Sent → Pending(i+1) → … → Completed
//!                 └─→ Failed(i) → Due            (retried next tick)
//!                          └─→ Abandoned         (retry ceiling reached)
//! any non-terminal → Orphaned                    (campaign/step/lead unusable)
//! ```
//!
//! Every transition is validated against the table in [`is_legal_transition`]
//! and appended to the enrollment's transition log.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{CampaignId, LeadId, Step};

/// Unique identifier for enrollments
pub type EnrollmentId = String;

/// The set of enrollment states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentState {
    /// Waiting for `next_fire_at` of the current step.
    Pending,
    /// Picked up by a tick; send in progress.
    Due,
    /// Current step delivered; cursor about to move.
    Sent,
    /// Last attempt at the current step failed; retried on a later tick.
    Failed,
    /// All steps delivered: terminal.
    Completed,
    /// Retry ceiling reached for a step: terminal.
    Abandoned,
    /// Campaign, step, lead, or sender no longer usable: terminal.
    Orphaned,
}

impl EnrollmentState {
    /// Whether this is a terminal state (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned | Self::Orphaned)
    }

    /// Whether a tick may pick this enrollment up once its fire time passes.
    pub fn is_schedulable(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl fmt::Display for EnrollmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Due => write!(f, "due"),
            Self::Sent => write!(f, "sent"),
            Self::Failed => write!(f, "failed"),
            Self::Completed => write!(f, "completed"),
            Self::Abandoned => write!(f, "abandoned"),
            Self::Orphaned => write!(f, "orphaned"),
        }
    }
}

/// Legal transitions between enrollment states.
fn is_legal_transition(from: EnrollmentState, to: EnrollmentState) -> bool {
    use EnrollmentState::*;

    if to == Orphaned && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Pending, Due)
            | (Failed, Due)
            | (Due, Sent)
            | (Due, Failed)
            | (Sent, Pending)
            | (Sent, Completed)
            | (Failed, Abandoned)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: EnrollmentState,
    pub to: EnrollmentState,
    /// Cursor position when the transition happened.
    pub step_index: usize,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: EnrollmentState,
    pub to: EnrollmentState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal enrollment transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Outcome of a failed delivery attempt as seen by the enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Step stays at the cursor and is retried on a later tick.
    WillRetry { attempts: u32 },
    /// Retry ceiling reached; enrollment is now `Abandoned`.
    Abandoned { attempts: u32 },
}

/// `base + n days`, saturating at the latest representable instant.
fn fire_time(base: DateTime<Utc>, n: u32) -> DateTime<Utc> {
    base.checked_add_signed(Duration::days(i64::from(n)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Cumulative day offsets from enrollment for each step.
///
/// `[0, 2, 5]` → `[0, 2, 7]`.
pub fn cumulative_offsets(steps: &[Step]) -> Vec<u32> {
    steps
        .iter()
        .scan(0u32, |acc, step| {
            *acc = acc.saturating_add(step.delay_days);
            Some(*acc)
        })
        .collect()
}

/// Earliest time each step may fire for an enrollment starting at `enrolled_at`.
pub fn earliest_fire_times(enrolled_at: DateTime<Utc>, steps: &[Step]) -> Vec<DateTime<Utc>> {
    cumulative_offsets(steps)
        .into_iter()
        .map(|offset| fire_time(enrolled_at, offset))
        .collect()
}

/// Association of one lead to one campaign with a step cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub lead_id: LeadId,
    pub campaign_id: CampaignId,
    pub enrolled_at: DateTime<Utc>,
    pub current_step_index: usize,
    pub next_fire_at: DateTime<Utc>,
    pub state: EnrollmentState,
    /// Failed attempts at the current step.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub transitions: Vec<TransitionRecord>,
}

impl Enrollment {
    /// Create a pending enrollment whose first step fires `first_delay_days` after `enrolled_at`.
    pub fn new(
        lead_id: impl Into<LeadId>,
        campaign_id: impl Into<CampaignId>,
        enrolled_at: DateTime<Utc>,
        first_delay_days: u32,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            lead_id: lead_id.into(),
            campaign_id: campaign_id.into(),
            enrolled_at,
            current_step_index: 0,
            next_fire_at: fire_time(enrolled_at, first_delay_days),
            state: EnrollmentState::Pending,
            attempts: 0,
            last_error: None,
            transitions: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether a tick at `now` should process this enrollment.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state.is_schedulable() && self.next_fire_at <= now
    }

    /// Attempt to move to `to`, recording the transition.
    pub fn advance(
        &mut self,
        to: EnrollmentState,
        at: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.state, to) {
            return Err(IllegalTransition {
                from: self.state,
                to,
            });
        }

        debug!(
            enrollment_id = %self.id,
            from = %self.state,
            to = %to,
            step = self.current_step_index,
            "Enrollment transition"
        );

        self.transitions.push(TransitionRecord {
            from: self.state,
            to,
            step_index: self.current_step_index,
            at,
            reason: reason.map(String::from),
        });
        self.state = to;
        Ok(())
    }

    /// `Pending`/`Failed` → `Due`.
    pub fn begin_attempt(&mut self, now: DateTime<Utc>) -> Result<(), IllegalTransition> {
        self.advance(EnrollmentState::Due, now, None)
    }

    /// Record a successful delivery of the current step.
    ///
    /// `next_delay_days` is the delay of the following step, or `None` when the
    /// delivered step was the last one.
    pub fn record_sent(
        &mut self,
        now: DateTime<Utc>,
        next_delay_days: Option<u32>,
    ) -> Result<(), IllegalTransition> {
        self.advance(EnrollmentState::Sent, now, None)?;
        self.current_step_index += 1;
        self.attempts = 0;
        self.last_error = None;
        match next_delay_days {
            Some(delay) => {
                self.next_fire_at = fire_time(now, delay);
                self.advance(EnrollmentState::Pending, now, None)
            }
            None => self.advance(EnrollmentState::Completed, now, Some("all steps sent")),
        }
    }

    /// Record a failed delivery of the current step. The cursor does not move.
    ///
    /// `max_attempts` of `None` retries forever.
    pub fn record_failure(
        &mut self,
        now: DateTime<Utc>,
        error: &str,
        max_attempts: Option<u32>,
    ) -> Result<FailureDisposition, IllegalTransition> {
        self.advance(EnrollmentState::Failed, now, Some(error))?;
        self.attempts += 1;
        self.last_error = Some(error.to_string());

        match max_attempts {
            Some(max) if self.attempts >= max => {
                self.advance(
                    EnrollmentState::Abandoned,
                    now,
                    Some("step retry ceiling reached"),
                )?;
                Ok(FailureDisposition::Abandoned {
                    attempts: self.attempts,
                })
            }
            _ => Ok(FailureDisposition::WillRetry {
                attempts: self.attempts,
            }),
        }
    }

    /// Mark the enrollment unusable.
    pub fn orphan(&mut self, now: DateTime<Utc>, reason: &str) -> Result<(), IllegalTransition> {
        self.last_error = Some(reason.to_string());
        self.advance(EnrollmentState::Orphaned, now, Some(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::types::Channel;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn steps(delays: &[u32]) -> Vec<Step> {
        delays
            .iter()
            .enumerate()
            .map(|(i, d)| Step::new(Channel::Email, i as u32 + 1, *d, "body"))
            .collect()
    }

    #[test]
    fn test_initial_state() {
        let e = Enrollment::new("l-1", "c-1", t0(), 0);
        assert_eq!(e.state, EnrollmentState::Pending);
        assert_eq!(e.current_step_index, 0);
        assert_eq!(e.next_fire_at, t0());
        assert!(e.is_due(t0()));
        assert!(e.transitions.is_empty());
    }

    #[test]
    fn test_cumulative_offsets() {
        assert_eq!(cumulative_offsets(&steps(&[0, 2, 5])), vec![0, 2, 7]);
        let times = earliest_fire_times(t0(), &steps(&[0, 2, 5]));
        assert_eq!(times[2], t0() + Duration::days(7));
    }

    #[test]
    fn test_happy_path_to_completed() {
        let mut e = Enrollment::new("l-1", "c-1", t0(), 0);
        e.begin_attempt(t0()).unwrap();
        e.record_sent(t0(), Some(3)).unwrap();
        assert_eq!(e.state, EnrollmentState::Pending);
        assert_eq!(e.current_step_index, 1);
        assert_eq!(e.next_fire_at, t0() + Duration::days(3));
        assert!(!e.is_due(t0() + Duration::days(2)));

        let later = t0() + Duration::days(3);
        e.begin_attempt(later).unwrap();
        e.record_sent(later, None).unwrap();
        assert_eq!(e.state, EnrollmentState::Completed);
        assert!(e.is_terminal());
        assert!(!e.is_due(later + Duration::days(30)));
        // Pending→Due, Due→Sent, Sent→Pending, Pending→Due, Due→Sent, Sent→Completed
        assert_eq!(e.transitions.len(), 6);
    }

    #[test]
    fn test_failure_keeps_cursor_and_retries() {
        let mut e = Enrollment::new("l-1", "c-1", t0(), 0);
        e.begin_attempt(t0()).unwrap();
        let d = e.record_failure(t0(), "502 from provider", Some(3)).unwrap();
        assert_eq!(d, FailureDisposition::WillRetry { attempts: 1 });
        assert_eq!(e.state, EnrollmentState::Failed);
        assert_eq!(e.current_step_index, 0);
        assert!(e.is_due(t0()));
        assert_eq!(e.last_error.as_deref(), Some("502 from provider"));

        e.begin_attempt(t0()).unwrap();
        e.record_sent(t0(), None).unwrap();
        assert_eq!(e.attempts, 0);
        assert!(e.last_error.is_none());
    }

    #[test]
    fn test_retry_ceiling_abandons() {
        let mut e = Enrollment::new("l-1", "c-1", t0(), 0);
        for _ in 0..2 {
            e.begin_attempt(t0()).unwrap();
            e.record_failure(t0(), "timeout", Some(3)).unwrap();
        }
        e.begin_attempt(t0()).unwrap();
        let d = e.record_failure(t0(), "timeout", Some(3)).unwrap();
        assert_eq!(d, FailureDisposition::Abandoned { attempts: 3 });
        assert_eq!(e.state, EnrollmentState::Abandoned);
        assert!(e.begin_attempt(t0()).is_err());
    }

    #[test]
    fn test_no_ceiling_retries_forever() {
        let mut e = Enrollment::new("l-1", "c-1", t0(), 0);
        for _ in 0..50 {
            e.begin_attempt(t0()).unwrap();
            e.record_failure(t0(), "timeout", None).unwrap();
        }
        assert_eq!(e.state, EnrollmentState::Failed);
        assert_eq!(e.attempts, 50);
    }

    #[test]
    fn test_orphan_from_any_non_terminal() {
        for state in [
            EnrollmentState::Pending,
            EnrollmentState::Due,
            EnrollmentState::Sent,
            EnrollmentState::Failed,
        ] {
            let mut e = Enrollment::new("l-1", "c-1", t0(), 0);
            e.state = state;
            assert!(e.orphan(t0(), "campaign deleted").is_ok());
            assert!(e.is_terminal());
        }
    }

    #[test]
    fn test_cannot_skip_due() {
        let mut e = Enrollment::new("l-1", "c-1", t0(), 0);
        let err = e.record_sent(t0(), None).unwrap_err();
        assert_eq!(err.from, EnrollmentState::Pending);
        assert_eq!(err.to, EnrollmentState::Sent);
        assert_eq!(e.current_step_index, 0);
    }

    #[test]
    fn test_cannot_leave_terminal() {
        let mut e = Enrollment::new("l-1", "c-1", t0(), 0);
        e.orphan(t0(), "gone").unwrap();
        assert!(e.orphan(t0(), "again").is_err());
        assert!(e.begin_attempt(t0()).is_err());
    }

    #[test]
    fn test_transition_record_has_reason() {
        let mut e = Enrollment::new("l-1", "c-1", t0(), 0);
        e.begin_attempt(t0()).unwrap();
        e.record_failure(t0(), "rate limited", None).unwrap();
        let record = e.transitions.last().unwrap();
        assert_eq!(record.from, EnrollmentState::Due);
        assert_eq!(record.to, EnrollmentState::Failed);
        assert_eq!(record.reason.as_deref(), Some("rate limited"));
    }

    #[test]
    fn test_huge_delay_saturates_instead_of_overflowing() {
        let e = Enrollment::new("l-1", "c-1", t0(), u32::MAX);
        assert_eq!(e.next_fire_at, DateTime::<Utc>::MAX_UTC);
        assert!(!e.is_due(t0() + Duration::days(365 * 100)));

        let mut e = Enrollment::new("l-1", "c-1", t0(), 0);
        e.begin_attempt(t0()).unwrap();
        e.record_sent(t0(), Some(u32::MAX)).unwrap();
        assert_eq!(e.state, EnrollmentState::Pending);
        assert_eq!(e.next_fire_at, DateTime::<Utc>::MAX_UTC);

        let times = earliest_fire_times(t0(), &steps(&[0, u32::MAX]));
        assert_eq!(times, vec![t0(), DateTime::<Utc>::MAX_UTC]);
    }
}
