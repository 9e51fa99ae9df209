//! Breakdown alert board
//!
//! Alerts are transient: each one is shown for a fixed duration and then
//! dismissed exactly once by [`AlertBoard::sweep`]. At most one alert per
//! anchor is active; raising again for the same anchor replaces it and
//! restarts its timer.

use crate::data::{Breakdown, Severity};
use std::time::Duration;
use tokio::time::Instant;

/// Default time an alert stays on screen
pub const DEFAULT_DISPLAY_DURATION: Duration = Duration::from_millis(10_000);

/// An alert currently on screen
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveAlert {
    pub id: u64,
    pub anchor: String,
    pub severity: Severity,
    pub message: Option<String>,
    pub raised_at: Instant,
    pub dismiss_at: Instant,
}

impl ActiveAlert {
    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.dismiss_at
    }
}

/// Active alerts, oldest first
#[derive(Debug, Clone, Default)]
pub struct AlertBoard {
    alerts: Vec<ActiveAlert>,
    next_id: u64,
}

impl AlertBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show an alert for `display` starting at `now`, returning its id
    pub fn raise(&mut self, breakdown: &Breakdown, now: Instant, display: Duration) -> u64 {
        self.alerts.retain(|alert| alert.anchor != breakdown.anchor);

        self.next_id += 1;
        self.alerts.push(ActiveAlert {
            id: self.next_id,
            anchor: breakdown.anchor.clone(),
            severity: breakdown.severity,
            message: breakdown.message.clone(),
            raised_at: now,
            dismiss_at: now + display,
        });
        self.next_id
    }

    /// Remove and return every alert whose display time is over
    pub fn sweep(&mut self, now: Instant) -> Vec<ActiveAlert> {
        let (due, active): (Vec<_>, Vec<_>) = std::mem::take(&mut self.alerts)
            .into_iter()
            .partition(|alert| alert.is_due(now));
        self.alerts = active;
        due
    }

    /// Earliest pending dismissal, if any
    pub fn next_dismissal(&self) -> Option<Instant> {
        self.alerts.iter().map(|alert| alert.dismiss_at).min()
    }

    pub fn active(&self) -> &[ActiveAlert] {
        &self.alerts
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}
