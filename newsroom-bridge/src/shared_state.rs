//! Shared broadcast state with dirty tracking
//!
//! The connection task and the scheduler write here; the UI reads on its
//! timer and only redraws when something changed. Dirty flags are atomics,
//! data sits behind `RwLock`s, and every collection is bounded.

use crate::alerts::{ActiveAlert, AlertBoard};
use crate::bridge::ConnectionStatus;
use crate::data::{numeric_fields, InboundMessage};
use crate::dispatcher::ConnectionEvent;
use crate::scheduler::SchedulerEvent;
use crate::video_queue::JobState;
use chrono::{DateTime, Local};
use parking_lot::RwLock;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Maximum entries kept in the event timeline
pub const MAX_TIMELINE: usize = 200;

/// Single value with a dirty flag
#[derive(Debug, Default)]
pub struct DirtyValue<T> {
    value: RwLock<T>,
    dirty: AtomicBool,
}

impl<T: Clone> DirtyValue<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
            dirty: AtomicBool::new(true),
        }
    }

    pub fn set(&self, value: T) {
        *self.value.write() = value;
        self.dirty.store(true, Ordering::Release);
    }

    /// Mutate in place and mark dirty
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut *self.value.write());
        self.dirty.store(true, Ordering::Release);
        result
    }

    /// Current value, leaving the dirty flag alone
    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    /// Current value if it changed since the last call
    pub fn read_if_dirty(&self) -> Option<T> {
        if self.dirty.swap(false, Ordering::AcqRel) {
            Some(self.value.read().clone())
        } else {
            None
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }
}

/// Bounded collection with a dirty flag; oldest entries fall off the front
#[derive(Debug)]
pub struct DirtyVec<T> {
    items: RwLock<VecDeque<T>>,
    dirty: AtomicBool,
    max_len: usize,
}

impl<T: Clone> DirtyVec<T> {
    pub fn new(max_len: usize) -> Self {
        Self {
            items: RwLock::new(VecDeque::new()),
            dirty: AtomicBool::new(false),
            max_len: max_len.max(1),
        }
    }

    pub fn push(&self, item: T) {
        let mut items = self.items.write();
        if items.len() == self.max_len {
            items.pop_front();
        }
        items.push_back(item);
        self.dirty.store(true, Ordering::Release);
    }

    pub fn read_if_dirty(&self) -> Option<Vec<T>> {
        if self.dirty.swap(false, Ordering::AcqRel) {
            Some(self.items.read().iter().cloned().collect())
        } else {
            None
        }
    }

    /// Take every entry, leaving the collection empty
    pub fn drain(&self) -> Vec<T> {
        self.dirty.store(false, Ordering::Release);
        self.items.write().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

/// One line of the broadcast timeline
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl TimelineEntry {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            message: message.into(),
        }
    }
}

/// Everything the UI shows about the broadcast
#[derive(Debug, Clone, Default)]
pub struct BroadcastStatus {
    pub connection: ConnectionStatus,
    pub retry_count: u32,
    pub show_name: Option<String>,
    pub current_anchor: Option<String>,
    pub segment: Option<String>,
    pub metrics: BTreeMap<String, f64>,
    pub frames_received: u64,
    pub audio_chunks_received: u64,
    pub decode_errors: u64,
    pub dropped_chunks: u64,
    pub alerts: AlertBoard,
    pub last_error: Option<String>,
    pub queued_clips: usize,
    /// Anchor and state of the clip in progress
    pub now_playing: Option<(String, JobState)>,
}

impl BroadcastStatus {
    /// Fold a metadata message into the status, returning whether it applied
    ///
    /// Media and clip requests are handled by the controller and leave the
    /// status untouched here.
    pub fn apply_message(
        &mut self,
        message: &InboundMessage,
        now: Instant,
        alert_display: Duration,
    ) -> bool {
        match message {
            InboundMessage::Status(status) => {
                if let Some(anchor) = &status.current_anchor {
                    self.current_anchor = Some(anchor.clone());
                }
                if let Some(show) = &status.show_name {
                    self.show_name = Some(show.clone());
                }
                if let Some(segment) = &status.segment {
                    self.segment = Some(segment.clone());
                }
                if let Some(metrics) = &status.metrics {
                    self.metrics.extend(numeric_fields(metrics));
                }
                true
            }
            InboundMessage::Metrics(metrics) => {
                self.metrics.extend(metrics.gauges());
                true
            }
            InboundMessage::Breakdown(breakdown) => {
                self.alerts.raise(breakdown, now, alert_display);
                true
            }
            InboundMessage::ProgramChange(change) => {
                if let Some(anchor) = &change.anchor {
                    self.current_anchor = Some(anchor.clone());
                }
                if let Some(show) = &change.show_name {
                    self.show_name = Some(show.clone());
                }
                if let Some(segment) = &change.segment {
                    self.segment = Some(segment.clone());
                }
                true
            }
            InboundMessage::VideoFrame(_)
            | InboundMessage::AudioChunk(_)
            | InboundMessage::GenerateVideo(_)
            | InboundMessage::Unknown { .. } => false,
        }
    }

    pub fn apply_connection_event(&mut self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Status(status) => {
                if let ConnectionStatus::Error(reason) = status {
                    self.last_error = Some(reason.clone());
                }
                if status.is_connected() {
                    self.last_error = None;
                }
                self.connection = status.clone();
            }
            ConnectionEvent::Reconnecting { attempt, .. } => self.retry_count = *attempt,
            ConnectionEvent::RetriesReset => self.retry_count = 0,
        }
    }

    pub fn apply_scheduler_event(&mut self, event: &SchedulerEvent) {
        match event.state {
            JobState::Resolving | JobState::Playing => {
                self.now_playing = Some((event.anchor.clone(), event.state));
            }
            JobState::Done | JobState::Failed => {
                self.now_playing = None;
            }
            JobState::Queued | JobState::Expired => {}
        }
    }
}

/// State shared between the client tasks and the UI
pub struct SharedBroadcastState {
    pub status: DirtyValue<BroadcastStatus>,
    pub timeline: DirtyVec<TimelineEntry>,
}

impl Default for SharedBroadcastState {
    fn default() -> Self {
        Self {
            status: DirtyValue::new(BroadcastStatus::default()),
            timeline: DirtyVec::new(MAX_TIMELINE),
        }
    }
}

impl SharedBroadcastState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The single mutation point for the broadcast status
    pub fn update<R>(&self, f: impl FnOnce(&mut BroadcastStatus) -> R) -> R {
        self.status.update(f)
    }

    pub fn record(&self, message: impl Into<String>) {
        self.timeline.push(TimelineEntry::now(message));
    }

    /// Dismiss due alerts, logging each to the timeline
    pub fn sweep_alerts(&self, now: Instant) -> Vec<ActiveAlert> {
        // Avoid marking the status dirty when nothing is due
        let due = self
            .status
            .value
            .read()
            .alerts
            .active()
            .iter()
            .any(|alert| alert.is_due(now));
        if !due {
            return Vec::new();
        }

        let dismissed = self.update(|status| status.alerts.sweep(now));
        for alert in &dismissed {
            self.record(format!("Alert cleared for {}", alert.anchor));
        }
        dismissed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::DEFAULT_DISPLAY_DURATION;

    #[test]
    fn test_dirty_value_read_once() {
        let value = DirtyValue::new(1);
        assert_eq!(value.read_if_dirty(), Some(1));
        assert_eq!(value.read_if_dirty(), None);

        value.update(|v| *v += 1);
        assert!(value.is_dirty());
        assert_eq!(value.read_if_dirty(), Some(2));
    }

    #[test]
    fn test_dirty_vec_is_bounded() {
        let log = DirtyVec::new(3);
        for i in 0..5 {
            log.push(i);
        }
        assert_eq!(log.read_if_dirty(), Some(vec![2, 3, 4]));
        assert_eq!(log.read_if_dirty(), None);

        log.push(5);
        assert_eq!(log.drain(), vec![3, 4, 5]);
        assert!(log.is_empty());
    }

    #[test]
    fn test_apply_status_and_program_change() {
        let now = Instant::now();
        let mut status = BroadcastStatus::default();

        let update = InboundMessage::parse(
            r#"{"type":"state_update","anchor":"ray","show":"Late Night Panic","metrics":{"sanity":12}}"#,
        )
        .unwrap();
        assert!(status.apply_message(&update, now, DEFAULT_DISPLAY_DURATION));
        assert_eq!(status.current_anchor.as_deref(), Some("ray"));
        assert_eq!(status.show_name.as_deref(), Some("Late Night Panic"));
        assert_eq!(status.metrics.get("sanity"), Some(&12.0));

        let change = InboundMessage::parse(r#"{"type":"anchor_change","new_anchor":"kim"}"#).unwrap();
        assert!(status.apply_message(&change, now, DEFAULT_DISPLAY_DURATION));
        assert_eq!(status.current_anchor.as_deref(), Some("kim"));
        assert_eq!(status.show_name.as_deref(), Some("Late Night Panic"));

        let frame = InboundMessage::parse(r#"{"type":"frame","data":"00"}"#).unwrap();
        assert!(!status.apply_message(&frame, now, DEFAULT_DISPLAY_DURATION));
    }

    #[test]
    fn test_sweep_without_due_alerts_keeps_state_clean() {
        let state = SharedBroadcastState::new();
        let now = Instant::now();
        let breakdown = InboundMessage::parse(r#"{"type":"breakdown_alert","anchor":"ray"}"#).unwrap();
        state.update(|s| s.apply_message(&breakdown, now, DEFAULT_DISPLAY_DURATION));
        let _ = state.status.read_if_dirty();

        assert!(state.sweep_alerts(now + Duration::from_secs(1)).is_empty());
        assert!(!state.status.is_dirty());

        assert_eq!(state.sweep_alerts(now + DEFAULT_DISPLAY_DURATION).len(), 1);
        assert!(state.status.get().alerts.is_empty());
        assert_eq!(state.timeline.len(), 1);
    }

    #[test]
    fn test_connection_events_update_status() {
        let mut status = BroadcastStatus::default();
        status.apply_connection_event(&ConnectionEvent::Status(ConnectionStatus::Error("refused".into())));
        status.apply_connection_event(&ConnectionEvent::Reconnecting {
            attempt: 2,
            delay: Duration::from_secs(2),
        });
        assert_eq!(status.retry_count, 2);
        assert_eq!(status.last_error.as_deref(), Some("refused"));

        status.apply_connection_event(&ConnectionEvent::Status(ConnectionStatus::Connected));
        status.apply_connection_event(&ConnectionEvent::RetriesReset);
        assert!(status.connection.is_connected());
        assert_eq!(status.retry_count, 0);
        assert!(status.last_error.is_none());
    }
}
