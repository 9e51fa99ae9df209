//! Clip scheduler
//!
//! Background task that plays queued character clips one at a time.
//!
//! ```text
//!  every poll_interval:                      every purge_interval:
//!    nothing playing && queue non-empty?       drop jobs older than max_job_age
//!      pop head ─▶ Resolving ─▶ Playing ─▶ Done
//!                     │            │
//!                     ▼            └─ ends on player return or play_timeout
//!                   Failed (dropped, no retry)
//! ```
//!
//! While a clip plays the scheduler holds the [`ClipLease`](crate::sink::ClipLease),
//! which pauses the live stream's drain. Progress is reported as
//! [`SchedulerEvent`]s that the UI polls.

use crate::error::{BridgeError, BridgeResult};
use crate::resolver::{ClipPlayer, ClipResolver};
use crate::sink::SinkArbiter;
use crate::video_queue::{JobState, VideoJob, VideoJobQueue};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Scheduler timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Run the background worker at all
    pub enabled: bool,
    /// How often an idle worker checks the queue
    pub poll_interval_ms: u64,
    /// How often stale jobs are purged
    pub purge_interval_secs: u64,
    /// Jobs older than this are never played
    pub max_job_age_secs: u64,
    /// Longest a single clip may hold the sink
    pub play_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 1_000,
            purge_interval_secs: 300,
            max_job_age_secs: 300,
            play_timeout_secs: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs.max(1))
    }

    pub fn max_job_age(&self) -> Duration {
        Duration::from_secs(self.max_job_age_secs)
    }

    pub fn play_timeout(&self) -> Duration {
        Duration::from_secs(self.play_timeout_secs.max(1))
    }
}

/// Job progress reported to the UI
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerEvent {
    pub job_id: Uuid,
    pub anchor: String,
    /// State the job just entered
    pub state: JobState,
    /// Error text, clip URL, or `timeout`
    pub detail: Option<String>,
}

/// The job currently resolving or playing
#[derive(Debug, Clone)]
pub struct CurrentJob {
    pub job: VideoJob,
    pub state: JobState,
}

struct SchedulerShared {
    /// Jobs waiting to play
    queue: Mutex<VideoJobQueue>,
    /// Job being resolved or played
    current: RwLock<Option<CurrentJob>>,
    /// Progress events for the UI
    events: Sender<SchedulerEvent>,
}

impl SchedulerShared {
    fn emit(&self, job: &VideoJob, state: JobState, detail: Option<String>) {
        let _ = self.events.send(SchedulerEvent {
            job_id: job.id,
            anchor: job.anchor.clone(),
            state,
            detail,
        });
    }

    fn set_current_state(&self, state: JobState) {
        if let Some(current) = self.current.write().as_mut() {
            current.state = state;
        }
    }
}

/// Plays queued clips, at most one at a time
pub struct VideoScheduler {
    /// Timing and enable flag
    config: SchedulerConfig,
    /// Queue and current job, shared with the worker
    shared: Arc<SchedulerShared>,
    /// Drained by `poll_events`
    events: Receiver<SchedulerEvent>,
    /// Turns a job into a playable URL
    resolver: Arc<dyn ClipResolver>,
    /// Plays a resolved clip to completion
    player: Arc<dyn ClipPlayer>,
    /// Grants the clip exclusive use of the sink
    arbiter: SinkArbiter,
    /// Worker cancel token and handle while running
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl VideoScheduler {
    pub fn new(
        config: SchedulerConfig,
        resolver: Arc<dyn ClipResolver>,
        player: Arc<dyn ClipPlayer>,
        arbiter: SinkArbiter,
    ) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            config,
            shared: Arc::new(SchedulerShared {
                queue: Mutex::new(VideoJobQueue::new()),
                current: RwLock::new(None),
                events: events_tx,
            }),
            events: events_rx,
            resolver,
            player,
            arbiter,
            task: Mutex::new(None),
        }
    }

    /// Queue a job; the background loop picks it up on its next poll
    pub fn enqueue(&self, job: VideoJob) {
        debug!(
            "Queued clip for {} ({:?}, job {})",
            job.anchor, job.priority, job.id
        );
        self.shared.emit(&job, JobState::Queued, None);
        self.shared.queue.lock().enqueue(job);
    }

    pub fn queued(&self) -> Vec<VideoJob> {
        self.shared.queue.lock().iter().cloned().collect()
    }

    pub fn current(&self) -> Option<CurrentJob> {
        self.shared.current.read().clone()
    }

    /// Drain pending job events
    pub fn poll_events(&self) -> Vec<SchedulerEvent> {
        self.events.try_iter().collect()
    }

    /// Start the background loop (no-op if already running or disabled)
    pub fn start(&self) -> BridgeResult<()> {
        if !self.config.enabled {
            info!("Clip scheduler disabled");
            return Ok(());
        }
        let runtime = Handle::try_current().map_err(|_| BridgeError::NoRuntime)?;

        let mut task = self.task.lock();
        if task.is_some() {
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let worker = SchedulerWorker {
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
            resolver: Arc::clone(&self.resolver),
            player: Arc::clone(&self.player),
            arbiter: self.arbiter.clone(),
            cancel: cancel.clone(),
        };
        let handle = runtime.spawn(worker.run());
        *task = Some((cancel, handle));
        Ok(())
    }

    /// Stop the loop; a clip in progress is abandoned
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some((cancel, handle)) = task {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!("Clip scheduler ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for VideoScheduler {
    fn drop(&mut self) {
        if let Some((cancel, _)) = self.task.get_mut().take() {
            cancel.cancel();
        }
    }
}

struct SchedulerWorker {
    config: SchedulerConfig,
    shared: Arc<SchedulerShared>,
    resolver: Arc<dyn ClipResolver>,
    player: Arc<dyn ClipPlayer>,
    arbiter: SinkArbiter,
    cancel: CancellationToken,
}

type InFlight<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

impl SchedulerWorker {
    async fn run(self) {
        info!(
            "Clip scheduler started (poll {:?}, purge every {:?})",
            self.config.poll_interval(),
            self.config.purge_interval()
        );

        let mut poll = interval(self.config.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let purge_every = self.config.purge_interval();
        let mut purge = interval_at(Instant::now() + purge_every, purge_every);
        purge.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The clip being resolved or played; purging continues meanwhile
        let mut in_flight: Option<InFlight<'_>> = None;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = purge.tick() => self.purge_expired(),
                _ = async {
                    if let Some(job) = in_flight.as_mut() {
                        job.await
                    }
                }, if in_flight.is_some() => {
                    in_flight = None;
                }
                _ = poll.tick(), if in_flight.is_none() => {
                    if let Some(job) = self.next_job() {
                        let running: InFlight<'_> = Box::pin(self.run_job(job));
                        in_flight = Some(running);
                    }
                }
            }
        }

        // Dropping an unfinished clip releases its lease
        drop(in_flight);
        *self.shared.current.write() = None;
        info!("Clip scheduler stopped");
    }

    fn purge_expired(&self) {
        let expired = self
            .shared
            .queue
            .lock()
            .purge_expired(Instant::now(), self.config.max_job_age());
        if !expired.is_empty() {
            info!("Purged {} stale clip request(s)", expired.len());
        }
        for job in &expired {
            self.shared.emit(job, JobState::Expired, None);
        }
    }

    /// Pop the next playable job and mark it current
    fn next_job(&self) -> Option<VideoJob> {
        let max_age = self.config.max_job_age();
        // Jobs that went stale while an earlier clip played are expired, not played
        let job = loop {
            let job = self.shared.queue.lock().pop()?;
            if job.is_expired(Instant::now(), max_age) {
                debug!("Clip for {} expired before playing", job.anchor);
                self.shared.emit(&job, JobState::Expired, None);
                continue;
            }
            break job;
        };

        *self.shared.current.write() = Some(CurrentJob {
            job: job.clone(),
            state: JobState::Resolving,
        });
        self.shared.emit(&job, JobState::Resolving, None);
        Some(job)
    }

    async fn run_job(&self, job: VideoJob) {
        let (state, detail) = self.resolve_and_play(&job).await;
        *self.shared.current.write() = None;
        self.shared.emit(&job, state, detail);
    }

    async fn resolve_and_play(&self, job: &VideoJob) -> (JobState, Option<String>) {
        let clip = match self.resolver.resolve(job).await {
            Ok(clip) => clip,
            Err(e) => {
                error!("Dropping clip for {}: {}", job.anchor, e);
                return (JobState::Failed, Some(e.to_string()));
            }
        };

        let Some(_lease) = self.arbiter.try_acquire_clip() else {
            // Only this worker takes clip leases
            warn!("Sink already held by a clip, dropping job {}", job.id);
            return (JobState::Failed, Some("sink busy".to_string()));
        };

        self.shared.set_current_state(JobState::Playing);
        self.shared.emit(job, JobState::Playing, Some(clip.url.clone()));
        info!("▶ Playing clip for {}: {}", job.anchor, clip.url);

        match timeout(self.config.play_timeout(), self.player.play(&clip)).await {
            Ok(Ok(())) => (JobState::Done, None),
            Ok(Err(e)) => {
                error!("Clip for {} failed during playback: {}", job.anchor, e);
                (JobState::Failed, Some(e.to_string()))
            }
            Err(_) => {
                warn!(
                    "Clip for {} hit the {:?} playback timeout",
                    job.anchor,
                    self.config.play_timeout()
                );
                (JobState::Done, Some("timeout".to_string()))
            }
        }
    }
}
