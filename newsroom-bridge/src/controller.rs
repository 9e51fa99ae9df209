//! Broadcast controller
//!
//! The one client object a viewer owns. It wires the connection, the
//! live playback path, the clip scheduler, and the shared status together:
//!
//! - metadata messages fold into [`SharedBroadcastState`]
//! - `video_frame`/`audio_chunk` are decoded and pushed to live playback
//! - `generate_character_video` becomes a [`VideoJob`] on the scheduler
//! - [`BroadcastController::tick`] is the UI timer hook: alert sweep,
//!   scheduler events, sink-ready drain

use crate::alerts::ActiveAlert;
use crate::bridge::{ConnectionStatus, Connector};
use crate::config::BroadcastConfig;
use crate::connection::ConnectionManager;
use crate::data::{
    InboundMessage, MediaChunk, MediaKind, MediaPayload, MessageKind, OutboundMessage, Severity,
};
use crate::decoder::{decode_payload, DecodeError, PayloadEncoding};
use crate::dispatcher::{ConnectionEvent, MessageDispatcher};
use crate::error::BridgeResult;
use crate::playback::{LivePlayback, PlaybackQueue, PushOutcome};
use crate::resolver::{ClipPlayer, ClipResolver, HttpClipResolver};
use crate::scheduler::VideoScheduler;
use crate::shared_state::SharedBroadcastState;
use crate::sink::{MediaSink, SinkArbiter};
use crate::video_cache::{now_millis, CacheStore, FileStore, VideoCache};
use crate::video_queue::VideoJob;
use crate::ws::WsConnector;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of one UI tick
#[derive(Debug, Default)]
pub struct TickSummary {
    /// Alerts whose display time ran out this tick
    pub dismissed_alerts: Vec<ActiveAlert>,
    /// Live chunks handed to the sink this tick
    pub delivered_chunks: usize,
}

/// Explicit broadcast client
pub struct BroadcastController {
    /// Loaded configuration
    config: BroadcastConfig,
    /// Live session and reconnect supervision
    connection: ConnectionManager,
    /// Live chunk queue feeding the sink
    live: Arc<Mutex<LivePlayback>>,
    /// Generated clip queue and worker
    scheduler: Arc<VideoScheduler>,
    /// Shared by live playback and the scheduler
    arbiter: SinkArbiter,
    /// Status and timeline read by the UI
    state: Arc<SharedBroadcastState>,
}

impl BroadcastController {
    pub fn new(
        config: BroadcastConfig,
        connector: Arc<dyn Connector>,
        sink: Box<dyn MediaSink>,
        resolver: Arc<dyn ClipResolver>,
        player: Arc<dyn ClipPlayer>,
    ) -> Self {
        let state = SharedBroadcastState::new();
        let arbiter = SinkArbiter::new();
        let live = Arc::new(Mutex::new(LivePlayback::new(
            PlaybackQueue::new(config.playback.capacity, config.playback.overflow),
            sink,
            arbiter.clone(),
        )));
        let scheduler = Arc::new(VideoScheduler::new(
            config.video.scheduler(),
            resolver,
            player,
            arbiter.clone(),
        ));

        let dispatcher = MessageDispatcher::new();
        let greeting = vec![
            OutboundMessage::StatusRequest,
            OutboundMessage::GetStream {
                quality: config.stream.quality.clone(),
                format: config.stream.format.clone(),
            },
        ];
        let connection = ConnectionManager::new(
            config.ws_url.clone(),
            config.reconnect.clone(),
            connector,
            Arc::clone(&dispatcher),
        )
        .with_greeting(greeting);

        let controller = Self {
            config,
            connection,
            live,
            scheduler,
            arbiter,
            state,
        };
        controller.register_handlers(&dispatcher);
        controller
    }

    /// Controller against the real backend: WebSocket transport and HTTP clip
    /// generation, with the on-disk clip cache when enabled
    pub fn with_backend(
        config: BroadcastConfig,
        sink: Box<dyn MediaSink>,
        player: Arc<dyn ClipPlayer>,
    ) -> BridgeResult<Self> {
        let mut resolver =
            HttpClipResolver::new(config.video.generate_url.clone(), config.video.request_timeout())?;

        if config.cache.enabled {
            match config.cache.path.clone().or_else(FileStore::default_path) {
                Some(path) => {
                    info!("Clip cache at {}", path.display());
                    let store: Box<dyn CacheStore> = Box::new(FileStore::new(path));
                    let cache = VideoCache::open(store, config.cache.max_age(), now_millis());
                    resolver = resolver.with_cache(Arc::new(Mutex::new(cache)));
                }
                None => warn!("No cache directory available, clip cache disabled"),
            }
        }

        Ok(Self::new(
            config,
            Arc::new(WsConnector),
            sink,
            Arc::new(resolver),
            player,
        ))
    }

    fn register_handlers(&self, dispatcher: &MessageDispatcher) {
        let display = self.config.alerts.display_duration();

        for kind in [MessageKind::Status, MessageKind::Metrics, MessageKind::ProgramChange] {
            let state = Arc::clone(&self.state);
            dispatcher.on_message(kind, move |message| {
                state.update(|status| status.apply_message(message, Instant::now(), display));
            });
        }

        let state = Arc::clone(&self.state);
        dispatcher.on_message(MessageKind::Breakdown, move |message| {
            if let InboundMessage::Breakdown(breakdown) = message {
                warn!(
                    "Breakdown ({}) for {}",
                    breakdown.severity.as_str(),
                    breakdown.anchor
                );
                state.update(|status| status.apply_message(message, Instant::now(), display));
                state.record(format!(
                    "{} breakdown: {}",
                    breakdown.severity.as_str(),
                    breakdown.anchor
                ));
            }
        });

        let sequence = Arc::new(AtomicU64::new(0));
        for (kind, media, default_encoding) in [
            (MessageKind::VideoFrame, MediaKind::Video, PayloadEncoding::Hex),
            (MessageKind::AudioChunk, MediaKind::Audio, PayloadEncoding::Base64),
        ] {
            let state = Arc::clone(&self.state);
            let live = Arc::clone(&self.live);
            let sequence = Arc::clone(&sequence);
            dispatcher.on_message(kind, move |message| {
                let payload = match message {
                    InboundMessage::VideoFrame(payload) | InboundMessage::AudioChunk(payload) => {
                        payload
                    }
                    _ => return,
                };
                match decode_media(payload, default_encoding) {
                    Ok(bytes) => {
                        let chunk =
                            MediaChunk::new(media, sequence.fetch_add(1, Ordering::Relaxed), bytes);
                        let outcome = live.lock().push(chunk);
                        state.update(|status| {
                            match media {
                                MediaKind::Video => status.frames_received += 1,
                                MediaKind::Audio => status.audio_chunks_received += 1,
                            }
                            if outcome != PushOutcome::Queued {
                                status.dropped_chunks += 1;
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Dropping undecodable {:?} payload: {}", media, e);
                        state.update(|status| status.decode_errors += 1);
                    }
                }
            });
        }

        let state = Arc::clone(&self.state);
        let scheduler = Arc::clone(&self.scheduler);
        dispatcher.on_message(MessageKind::GenerateVideo, move |message| {
            if let InboundMessage::GenerateVideo(request) = message {
                scheduler.enqueue(VideoJob::from_request(request));
                let queued = scheduler.queued().len();
                state.update(|status| status.queued_clips = queued);
            }
        });

        dispatcher.on_message(MessageKind::Unknown, |message| {
            if let InboundMessage::Unknown { type_name } = message {
                debug!("Ignoring message of type {}", type_name);
            }
        });

        let state = Arc::clone(&self.state);
        dispatcher.on_event(move |event| {
            state.update(|status| status.apply_connection_event(event));
            match event {
                ConnectionEvent::Status(ConnectionStatus::GaveUp) => {
                    state.record("Connection lost, manual reconnect required")
                }
                ConnectionEvent::Status(ConnectionStatus::Connected) => state.record("Connected"),
                ConnectionEvent::Reconnecting { attempt, delay } => state.record(format!(
                    "Reconnecting in {:?} (attempt {})",
                    delay, attempt
                )),
                _ => {}
            }
        });
    }

    /// Start the clip scheduler and connect
    pub fn start(&self) -> BridgeResult<()> {
        info!("Starting broadcast client for {}", self.connection.url());
        self.scheduler.start()?;
        self.connection.connect()
    }

    /// Manual reconnect affordance
    pub fn reconnect(&self) -> BridgeResult<()> {
        self.state.record("Manual reconnect");
        self.connection.reconnect()
    }

    pub fn request_status(&self) -> bool {
        self.connection.send(&OutboundMessage::StatusRequest)
    }

    pub fn trigger_breakdown(&self, anchor: Option<String>, severity: Option<Severity>) -> bool {
        self.connection
            .send(&OutboundMessage::TriggerBreakdown { anchor, severity })
    }

    pub fn request_stream(&self) -> bool {
        self.connection.send(&OutboundMessage::GetStream {
            quality: self.config.stream.quality.clone(),
            format: self.config.stream.format.clone(),
        })
    }

    pub fn change_quality(&self, quality: impl Into<String>) -> bool {
        self.connection.send(&OutboundMessage::ChangeQuality {
            quality: quality.into(),
        })
    }

    /// UI timer hook
    pub fn tick(&self, now: Instant) -> TickSummary {
        let dismissed_alerts = self.state.sweep_alerts(now);

        let events = self.scheduler.poll_events();
        if !events.is_empty() {
            let queued = self.scheduler.queued().len();
            self.state.update(|status| {
                for event in &events {
                    status.apply_scheduler_event(event);
                }
                status.queued_clips = queued;
            });
            for event in &events {
                self.state
                    .record(format!("Clip for {}: {:?}", event.anchor, event.state));
            }
        }

        // Sink-ready signal; also resumes live output after a clip ends
        let delivered_chunks = self.live.lock().on_sink_ready();

        TickSummary {
            dismissed_alerts,
            delivered_chunks,
        }
    }

    pub fn state(&self) -> &Arc<SharedBroadcastState> {
        &self.state
    }

    pub fn dispatcher(&self) -> &Arc<MessageDispatcher> {
        self.connection.dispatcher()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Whether a clip currently owns the sink
    pub fn clip_on_air(&self) -> bool {
        !self.arbiter.live_allowed()
    }

    pub fn scheduler(&self) -> &VideoScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    /// Close the session and stop the scheduler
    pub async fn shutdown(&self) {
        info!("Shutting down broadcast client");
        self.connection.shutdown().await;
        self.scheduler.stop().await;
        let pending = self.live.lock().queue().len();
        if pending > 0 {
            debug!("Discarding {} buffered chunks", pending);
        }
    }
}

fn decode_media(payload: &MediaPayload, default: PayloadEncoding) -> Result<Vec<u8>, DecodeError> {
    decode_payload(&payload.data, payload.encoding.unwrap_or(default))
}
