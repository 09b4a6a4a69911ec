//! Per-tick scheduler telemetry.
//!
//! Every tick produces a [`TickReport`]. Reports are logged, published on the
//! event bus as `tick_completed`, and optionally appended to a JSONL file
//! (`telemetry_path` in config) so runs can be compared after the fact.

use std::path::Path;

use chrono::{DateTime, Utc};
use coordination::OutreachEvent;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// What one scheduler tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    /// Set when the tick did nothing because another tick held the lock.
    #[serde(default)]
    pub skipped: bool,
    /// Enrollments found due at scan time.
    pub due: usize,
    /// Steps delivered by a provider.
    pub sent: usize,
    /// Steps delivered in simulation mode.
    pub simulated: usize,
    /// Failed attempts that will be retried.
    pub failed: usize,
    /// Due steps retried next tick without charging an attempt.
    #[serde(default)]
    pub deferred: usize,
    pub abandoned: usize,
    pub orphaned: usize,
    /// Enrollments that delivered their final step this tick.
    pub completed: usize,
    /// Due enrollments left untouched because their campaign is not active.
    pub paused: usize,
    /// Campaigns marked completed this tick.
    #[serde(default)]
    pub campaigns_completed: Vec<String>,
    pub duration_ms: u64,
}

impl TickReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            ..Default::default()
        }
    }

    pub fn skipped(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            skipped: true,
            ..Default::default()
        }
    }

    /// Sent plus simulated.
    pub fn delivered(&self) -> usize {
        self.sent + self.simulated
    }

    /// Whether the tick changed any enrollment.
    pub fn is_noop(&self) -> bool {
        self.delivered() + self.failed + self.abandoned + self.orphaned == 0
    }

    pub fn to_event(&self) -> OutreachEvent {
        OutreachEvent::TickCompleted {
            due: self.due,
            sent: self.delivered(),
            failed: self.failed + self.abandoned,
            duration_ms: self.duration_ms,
            timestamp: self.started_at,
        }
    }

    pub fn log(&self) {
        if self.skipped {
            info!(at = %self.started_at, "Tick skipped: previous tick still running");
            return;
        }
        info!(
            due = self.due,
            sent = self.sent,
            simulated = self.simulated,
            failed = self.failed,
            deferred = self.deferred,
            abandoned = self.abandoned,
            orphaned = self.orphaned,
            completed = self.completed,
            paused = self.paused,
            duration_ms = self.duration_ms,
            "Tick complete"
        );
    }
}

/// Append a tick report as one JSON line. Failures are logged, not raised.
pub fn append_tick_report(report: &TickReport, path: &Path) {
    match serde_json::to_string(report) {
        Ok(json) => {
            use std::io::Write;
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(mut file) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        warn!("Failed to append tick telemetry: {e}");
                    }
                }
                Err(e) => warn!(path = %path.display(), "Failed to open telemetry file: {e}"),
            }
        }
        Err(e) => warn!("Failed to serialize tick telemetry: {e}"),
    }
}
