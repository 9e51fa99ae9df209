//! Playback sink and sink arbitration
//!
//! The live stream and the clip scheduler both want the same output. The
//! [`SinkArbiter`] decides who writes: a playing clip holds an exclusive
//! [`ClipLease`], and while it is held the live queue keeps buffering but
//! does not drain. Dropping the lease hands the sink back to the live
//! stream.
//!
//! Every live append runs inside a turn on the arbiter, and acquiring a
//! lease waits for the current turn to finish. A clip therefore starts
//! between two live appends, never during one.
//!
//! ```text
//!   live chunks ──▶ PlaybackQueue ──(live_allowed?)──┐
//!                                                    ├──▶ MediaSink
//!   VideoScheduler ──(ClipLease held)── clip ────────┘
//! ```

use crate::data::MediaChunk;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Failure to append a chunk
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("sink rejected chunk: {0}")]
    Rejected(String),
}

/// Rendering target for decoded media
pub trait MediaSink: Send {
    /// True while a previous append is still being processed
    fn is_busy(&self) -> bool;

    fn append(&mut self, chunk: &MediaChunk) -> Result<(), SinkError>;
}

/// Decides whether the live stream or a clip owns the sink
#[derive(Debug, Clone, Default)]
pub struct SinkArbiter {
    /// Set while a clip lease is alive
    clip_active: Arc<AtomicBool>,
    /// Held across each live append; reentrant so a sink may call back in
    turn: Arc<ReentrantMutex<()>>,
}

impl SinkArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the sink for a clip; `None` if another clip holds it
    pub fn try_acquire_clip(&self) -> Option<ClipLease> {
        let _turn = self.turn.lock();
        self.clip_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ClipLease {
                flag: Arc::clone(&self.clip_active),
            })
    }

    /// Whether the live stream may write to the sink
    pub fn live_allowed(&self) -> bool {
        !self.clip_active.load(Ordering::Acquire)
    }

    /// Lock out clip acquisition for one live append
    ///
    /// Returns `None` when a clip already owns the sink.
    pub fn live_turn(&self) -> Option<ReentrantMutexGuard<'_, ()>> {
        let turn = self.turn.lock();
        self.live_allowed().then_some(turn)
    }
}

/// Exclusive clip ownership of the sink, released on drop
#[derive(Debug)]
pub struct ClipLease {
    flag: Arc<AtomicBool>,
}

impl Drop for ClipLease {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_is_exclusive_and_released_on_drop() {
        let arbiter = SinkArbiter::new();
        assert!(arbiter.live_allowed());

        let lease = arbiter.try_acquire_clip().expect("first lease");
        assert!(!arbiter.live_allowed());
        assert!(arbiter.try_acquire_clip().is_none());

        drop(lease);
        assert!(arbiter.live_allowed());
        assert!(arbiter.try_acquire_clip().is_some());
    }

    #[test]
    fn test_live_turn_refused_while_clip_holds_sink() {
        let arbiter = SinkArbiter::new();
        assert!(arbiter.live_turn().is_some());

        let lease = arbiter.try_acquire_clip().unwrap();
        assert!(arbiter.live_turn().is_none());
        drop(lease);

        // Same-thread acquisition during a turn does not deadlock
        let turn = arbiter.live_turn().unwrap();
        let lease = arbiter.try_acquire_clip();
        assert!(lease.is_some());
        drop(turn);
        assert!(arbiter.live_turn().is_none());
    }
}
