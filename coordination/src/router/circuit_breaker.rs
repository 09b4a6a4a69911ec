//! Circuit breaker for external services.
//!
//! Each [`CircuitBreaker`] guards one named service (Twilio, Mailgun,
//! OpenRouter). After `failure_threshold` consecutive failures the circuit
//! *opens* and calls are short-circuited without touching the service. Once
//! `reset_timeout` has elapsed since the last failure a single trial call is
//! admitted (*half-open*); its outcome closes or re-opens the circuit.
//!
//! ```text
//!            failures ≥ threshold
//!   Closed ─────────────────────▶ Open ◀────────┐
//!     ▲                            │            │ trial failed
//!     │ trial ok       timeout     ▼            │ (or dropped)
//!     └──────────────────────── HalfOpen ───────┘
//! ```
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`; the half-open trial is gated by an in-flight flag so concurrent
//! callers are short-circuited while it runs.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::events::{OutreachEvent, SharedEventBus};

/// External services guarded by a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceName {
    Twilio,
    Mailgun,
    OpenRouter,
}

impl ServiceName {
    pub fn all() -> &'static [ServiceName] {
        &[ServiceName::Twilio, ServiceName::Mailgun, ServiceName::OpenRouter]
    }

    /// Canned message reported when this service's circuit is open.
    pub fn fallback_message(self) -> &'static str {
        match self {
            ServiceName::Twilio => "SMS service temporarily unavailable",
            ServiceName::Mailgun => "Email service temporarily unavailable",
            ServiceName::OpenRouter => {
                "AI service is temporarily unavailable. Please try again shortly."
            }
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceName::Twilio => write!(f, "twilio"),
            ServiceName::Mailgun => write!(f, "mailgun"),
            ServiceName::OpenRouter => write!(f, "openrouter"),
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Healthy: requests allowed.
    Closed,
    /// Tripped: requests blocked until the reset timeout expires.
    Open,
    /// Timeout expired: one trial request allowed.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Per-service breaker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Time after the last failure before a trial call is admitted.
    pub reset_timeout: Duration,
}

impl BreakerConfig {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
        }
    }

    /// Default tuning for a service.
    pub fn for_service(service: ServiceName) -> Self {
        match service {
            ServiceName::Twilio => Self::new(3, Duration::from_secs(30)),
            ServiceName::Mailgun => Self::new(5, Duration::from_secs(60)),
            ServiceName::OpenRouter => Self::new(3, Duration::from_secs(30)),
        }
    }
}

/// Error returned by a breaker-guarded call.
#[derive(Debug)]
pub enum BreakerError<E> {
    /// Circuit open (or a half-open trial already in flight); the operation was not invoked.
    Open {
        service: ServiceName,
        retry_in: Duration,
    },
    /// The operation ran and failed.
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// The operation's own error, if it ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(e) => Some(e),
            BreakerError::Open { .. } => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Open { service, retry_in } => write!(
                f,
                "{} circuit open; retry in {}ms",
                service,
                retry_in.as_millis()
            ),
            BreakerError::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BreakerError::Inner(e) => Some(e),
            BreakerError::Open { .. } => None,
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub service: ServiceName,
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

/// How a call was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

/// Outcome reported back to the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    /// Error that says nothing about service health (e.g. bad credentials).
    Neutral,
}

/// Failure isolation for one named service.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: ServiceName,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
    bus: Option<SharedEventBus>,
}

impl CircuitBreaker {
    pub fn new(service: ServiceName, config: BreakerConfig) -> Self {
        Self {
            service,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                last_failure_at: None,
                trial_in_flight: false,
            }),
            bus: None,
        }
    }

    /// Breaker with the service's default tuning.
    pub fn for_service(service: ServiceName) -> Self {
        Self::new(service, BreakerConfig::for_service(service))
    }

    /// Publish state transitions on `bus`.
    pub fn with_event_bus(mut self, bus: SharedEventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn service(&self) -> ServiceName {
        self.service
    }

    pub fn config(&self) -> BreakerConfig {
        self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // A poisoned lock only means another caller panicked mid-update; the
        // counters are still meaningful.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Consecutive failures counted so far.
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            service: self.service,
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure_at: inner.last_failure_at,
        }
    }

    /// Force the circuit closed and clear counters.
    pub fn reset(&self) {
        let transition = {
            let mut inner = self.lock();
            inner.failure_count = 0;
            inner.last_failure = None;
            inner.last_failure_at = None;
            inner.trial_in_flight = false;
            Self::set_state(&mut inner, CircuitState::Closed)
        };
        self.announce(transition);
    }

    /// Run `op` through the breaker. Every error counts as a failure.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_classified(op, |_| true).await
    }

    /// Run `op` through the breaker; errors for which `counts_as_failure`
    /// returns `false` are passed through without touching the failure count.
    pub async fn execute_classified<T, E, F, Fut, C>(
        &self,
        op: F,
        counts_as_failure: C,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnOnce(&E) -> bool,
    {
        let admission = self.admit().map_err(|retry_in| BreakerError::Open {
            service: self.service,
            retry_in,
        })?;

        let mut guard = CallGuard {
            breaker: self,
            admission,
            settled: false,
        };
        let result = op().await;
        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(e) => {
                if counts_as_failure(e) {
                    Outcome::Failure
                } else {
                    Outcome::Neutral
                }
            }
        };
        guard.settle(outcome);

        result.map_err(BreakerError::Inner)
    }

    /// Run `op` through the breaker, substituting `fallback()` when the
    /// circuit is open.
    pub async fn execute_or_fallback<T, E, F, Fut, G>(&self, op: F, fallback: G) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> T,
    {
        match self.execute(op).await {
            Ok(v) => Ok(v),
            Err(BreakerError::Open { .. }) => Ok(fallback()),
            Err(BreakerError::Inner(e)) => Err(e),
        }
    }

    /// Decide whether a call may proceed. `Err` carries the time until a trial
    /// could be admitted.
    fn admit(&self) -> Result<Admission, Duration> {
        let (admission, transition) = {
            let mut inner = self.lock();
            match inner.state {
                CircuitState::Closed => (Ok(Admission::Normal), None),
                CircuitState::Open => {
                    let elapsed = inner
                        .last_failure
                        .map(|t| t.elapsed())
                        .unwrap_or(self.config.reset_timeout);
                    if elapsed >= self.config.reset_timeout {
                        inner.trial_in_flight = true;
                        let t = Self::set_state(&mut inner, CircuitState::HalfOpen);
                        (Ok(Admission::Trial), t)
                    } else {
                        (Err(self.config.reset_timeout - elapsed), None)
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.trial_in_flight {
                        (Err(Duration::ZERO), None)
                    } else {
                        inner.trial_in_flight = true;
                        (Ok(Admission::Trial), None)
                    }
                }
            }
        };
        self.announce(transition);
        admission
    }

    fn record(&self, admission: Admission, outcome: Outcome) {
        let transition = {
            let mut inner = self.lock();
            if admission == Admission::Trial {
                inner.trial_in_flight = false;
            }
            match outcome {
                // A normal call admitted before the circuit opened does not
                // close it; only the trial may.
                Outcome::Success
                    if admission == Admission::Trial || inner.state == CircuitState::Closed =>
                {
                    inner.failure_count = 0;
                    Self::set_state(&mut inner, CircuitState::Closed)
                }
                Outcome::Success => None,
                Outcome::Failure => {
                    inner.failure_count = inner.failure_count.saturating_add(1);
                    inner.last_failure = Some(Instant::now());
                    inner.last_failure_at = Some(Utc::now());
                    let reopen = admission == Admission::Trial
                        || inner.state == CircuitState::HalfOpen
                        || inner.failure_count >= self.config.failure_threshold;
                    if reopen {
                        Self::set_state(&mut inner, CircuitState::Open)
                    } else {
                        None
                    }
                }
                Outcome::Neutral => None,
            }
        };
        self.announce(transition);
    }

    fn set_state(
        inner: &mut BreakerInner,
        to: CircuitState,
    ) -> Option<(CircuitState, CircuitState, u32)> {
        let from = inner.state;
        if from == to {
            return None;
        }
        inner.state = to;
        Some((from, to, inner.failure_count))
    }

    fn announce(&self, transition: Option<(CircuitState, CircuitState, u32)>) {
        let Some((from, to, failure_count)) = transition else {
            return;
        };
        match to {
            CircuitState::Open => warn!(
                service = %self.service,
                from = %from,
                to = %to,
                failure_count,
                "Circuit breaker opened"
            ),
            _ => info!(
                service = %self.service,
                from = %from,
                to = %to,
                failure_count,
                "Circuit breaker transition"
            ),
        }
        if let Some(bus) = &self.bus {
            bus.publish(OutreachEvent::BreakerTransition {
                service: self.service,
                from,
                to,
                failure_count,
                timestamp: Utc::now(),
            });
        }
    }
}

/// Reports the outcome of an admitted call; a call dropped before it settles
/// counts as a failure when it was the half-open trial.
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl CallGuard<'_> {
    fn settle(&mut self, outcome: Outcome) {
        self.settled = true;
        self.breaker.record(self.admission, outcome);
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.settled && self.admission == Admission::Trial {
            self.breaker.record(Admission::Trial, Outcome::Failure);
        }
    }
}

/// The three process-wide breakers, constructed once and shared.
#[derive(Debug, Clone)]
pub struct BreakerRegistry {
    twilio: Arc<CircuitBreaker>,
    mailgun: Arc<CircuitBreaker>,
    openrouter: Arc<CircuitBreaker>,
}

impl BreakerRegistry {
    /// Registry with default tuning, optionally publishing on `bus`.
    pub fn with_defaults(bus: Option<SharedEventBus>) -> Self {
        let make = |service| {
            let breaker = CircuitBreaker::for_service(service);
            Arc::new(match &bus {
                Some(bus) => breaker.with_event_bus(bus.clone()),
                None => breaker,
            })
        };
        Self {
            twilio: make(ServiceName::Twilio),
            mailgun: make(ServiceName::Mailgun),
            openrouter: make(ServiceName::OpenRouter),
        }
    }

    pub fn get(&self, service: ServiceName) -> Arc<CircuitBreaker> {
        match service {
            ServiceName::Twilio => self.twilio.clone(),
            ServiceName::Mailgun => self.mailgun.clone(),
            ServiceName::OpenRouter => self.openrouter.clone(),
        }
    }

    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        ServiceName::all()
            .iter()
            .map(|s| self.get(*s).snapshot())
            .collect()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::with_defaults(None)
    }
}
