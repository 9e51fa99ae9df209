//! # Newsroom Bridge
//!
//! Broadcast stream client for the newsroom backend. Keeps one WebSocket
//! session alive, decodes the media it carries, feeds a playback sink, and
//! schedules synthesized anchor clips by priority.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                      BROADCAST BACKEND (WebSocket, JSON)                     │
//! └─────────────────────────────────────┬───────────────────────────────────────┘
//!                                       │ text frames
//!                                       ▼
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │  ConnectionManager (tokio task)   backoff ─ retry ─ GaveUp ─ manual reconnect│
//! │         └──▶ InboundMessage::parse ──▶ MessageDispatcher (by `type`)         │
//! └──────────┬──────────────────────┬──────────────────────┬────────────────────┘
//!            │ status / metrics     │ video_frame          │ generate_character
//!            │ breakdown / program  │ audio_chunk          │ _video
//!            ▼                      ▼                      ▼
//! ┌────────────────────┐  ┌───────────────────────┐  ┌────────────────────────────┐
//! │ SharedBroadcast-   │  │ decoder (hex/base64)  │  │ VideoJobQueue              │
//! │ State              │  │   ──▶ PlaybackQueue   │  │   ──▶ VideoScheduler task  │
//! │ DirtyValue<Status> │  │   ──▶ MediaSink       │  │   ──▶ ClipResolver/Player  │
//! │ AlertBoard         │  │        ▲              │  │        │                   │
//! └─────────┬──────────┘  └────────┼──────────────┘  └────────┼───────────────────┘
//!           │                      └──── SinkArbiter ◀────────┘ ClipLease
//!           │ read_if_dirty() on UI timer
//!           ▼
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │  Viewer: BroadcastController::tick() ─▶ StatusView::project() ─▶ render      │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Components
//!
//! - [`ConnectionManager`] - one parametrized live feed with bounded backoff
//! - [`MessageDispatcher`] - handler registration per [`MessageKind`]
//! - [`decoder`] - pure hex and base64 payload decoding
//! - [`PlaybackQueue`] / [`LivePlayback`] - bounded, ordered sink feeding
//! - [`VideoJobQueue`] / [`VideoScheduler`] - priority clip scheduling
//! - [`SharedBroadcastState`] - dirty-tracked status for the UI
//! - [`BroadcastController`] - owns all of the above for one viewer
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use newsroom_bridge::{BroadcastConfig, BroadcastController, StatusView};
//!
//! let config = BroadcastConfig::load()?;
//! let controller = BroadcastController::with_backend(config, sink, player)?;
//! controller.start()?;
//!
//! // UI timer
//! controller.tick(tokio::time::Instant::now());
//! if let Some(status) = controller.state().status.read_if_dirty() {
//!     println!("{}", StatusView::project(&status));
//! }
//! ```

pub mod alerts;
pub mod bridge;
pub mod config;
pub mod connection;
pub mod controller;
pub mod data;
pub mod decoder;
pub mod dispatcher;
pub mod error;
pub mod playback;
pub mod reconnect;
pub mod resolver;
pub mod scheduler;
pub mod shared_state;
pub mod sink;
pub mod video_cache;
pub mod video_queue;
pub mod view;
pub mod ws;

#[cfg(test)]
mod tests {
    mod fakes;

    mod connection_test;
    mod controller_test;
    mod scheduler_test;
}

// Re-exports
pub use alerts::{ActiveAlert, AlertBoard};
pub use bridge::{ConnectionStatus, Connector, WireSession};
pub use config::BroadcastConfig;
pub use connection::ConnectionManager;
pub use controller::{BroadcastController, TickSummary};
pub use data::{InboundMessage, MediaChunk, MediaKind, MessageKind, OutboundMessage, Priority, Severity};
pub use decoder::{DecodeError, PayloadEncoding};
pub use dispatcher::{ConnectionEvent, MessageDispatcher};
pub use error::{BridgeError, BridgeResult};
pub use playback::{LivePlayback, OverflowPolicy, PlaybackQueue};
pub use reconnect::{BackoffStrategy, ReconnectPolicy};
pub use resolver::{ClipPlayer, ClipResolver, HttpClipResolver, ResolvedClip};
pub use scheduler::{SchedulerConfig, SchedulerEvent, VideoScheduler};
pub use shared_state::{BroadcastStatus, DirtyValue, DirtyVec, SharedBroadcastState, TimelineEntry};
pub use sink::{ClipLease, MediaSink, SinkArbiter, SinkError};
pub use video_cache::{CachedVideo, VideoCache};
pub use video_queue::{JobState, VideoJob, VideoJobQueue};
pub use view::StatusView;
pub use ws::WsConnector;
