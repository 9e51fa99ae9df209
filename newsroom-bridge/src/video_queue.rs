//! Video generation queue
//!
//! Requests for character clips are ordered by priority, not arrival:
//! urgent before high before normal, and within one priority the earlier
//! request first. Equal timestamps keep insertion order.

use crate::data::{GenerateVideoPayload, Priority};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Lifecycle of a clip request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Resolving,
    Playing,
    Done,
    /// Purged before it was popped
    Expired,
    /// Resolution or playback failed; dropped without retry
    Failed,
}

/// A request to synthesize and play a short anchor clip
#[derive(Debug, Clone)]
pub struct VideoJob {
    pub id: Uuid,
    /// Character who delivers the clip
    pub anchor: String,
    /// Line to be spoken
    pub text: String,
    pub priority: Priority,
    /// Orders jobs within a priority and drives expiry
    pub enqueued_at: Instant,
    /// Source article, used as the clip cache key
    pub article_id: Option<String>,
    /// Media URL, when already known
    pub resolved_url: Option<String>,
}

impl VideoJob {
    pub fn new(anchor: impl Into<String>, text: impl Into<String>, priority: Priority) -> Self {
        Self::with_timestamp(anchor, text, priority, Instant::now())
    }

    pub fn with_timestamp(
        anchor: impl Into<String>,
        text: impl Into<String>,
        priority: Priority,
        enqueued_at: Instant,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            anchor: anchor.into(),
            text: text.into(),
            priority,
            enqueued_at,
            article_id: None,
            resolved_url: None,
        }
    }

    pub fn from_request(request: &GenerateVideoPayload) -> Self {
        let priority = request
            .priority
            .as_deref()
            .map(Priority::parse)
            .unwrap_or_default();
        let mut job = Self::new(&request.anchor, &request.text, priority);
        job.article_id = request.article_id.clone();
        job.resolved_url = request.url.clone();
        job
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.enqueued_at)
    }

    pub fn is_expired(&self, now: Instant, max_age: Duration) -> bool {
        self.age(now) > max_age
    }

    /// Ordering key: higher priority first, then earlier timestamp
    fn runs_before(&self, other: &VideoJob) -> bool {
        self.priority > other.priority
            || (self.priority == other.priority && self.enqueued_at < other.enqueued_at)
    }
}

/// Priority-ordered job queue
#[derive(Debug, Default)]
pub struct VideoJobQueue {
    jobs: Vec<VideoJob>,
}

impl VideoJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping (priority desc, enqueued_at asc) order
    pub fn enqueue(&mut self, job: VideoJob) {
        // First position whose job must not run before the new one
        let index = self.jobs.partition_point(|queued| !job.runs_before(queued));
        self.jobs.insert(index, job);
    }

    /// Remove and return the job that runs next
    pub fn pop(&mut self) -> Option<VideoJob> {
        if self.jobs.is_empty() {
            None
        } else {
            Some(self.jobs.remove(0))
        }
    }

    pub fn peek(&self) -> Option<&VideoJob> {
        self.jobs.first()
    }

    /// Remove jobs older than `max_age`, returning them
    pub fn purge_expired(&mut self, now: Instant, max_age: Duration) -> Vec<VideoJob> {
        let (expired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.jobs)
            .into_iter()
            .partition(|job| job.is_expired(now, max_age));
        self.jobs = kept;
        expired
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VideoJob> {
        self.jobs.iter()
    }
}
