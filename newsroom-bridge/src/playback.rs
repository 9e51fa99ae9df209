//! Playback queue
//!
//! Buffers decoded chunks in arrival order and feeds them to the sink one at
//! a time, only when the sink reports it is not busy. A failed append leaves
//! the chunk at the head of the queue for the next sink-ready signal.
//!
//! The queue is bounded. When it is full the overflow policy decides which
//! chunk goes: the oldest (default, keeps the stream close to live) or the
//! incoming one.

use crate::data::MediaChunk;
use crate::sink::{MediaSink, SinkArbiter, SinkError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Which chunk to drop when the queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    #[default]
    DropOldest,
    DropNewest,
}

/// Result of pushing a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queue was full; the chunk with this sequence was evicted
    EvictedOldest(u64),
    /// Queue was full; the incoming chunk was discarded
    Rejected,
}

/// Result of a single drain step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainStep {
    Empty,
    SinkBusy,
    Delivered(u64),
    Failed(SinkError),
}

/// Bounded FIFO of media chunks
#[derive(Debug)]
pub struct PlaybackQueue {
    chunks: VecDeque<MediaChunk>,
    capacity: usize,
    overflow: OverflowPolicy,
    dropped: u64,
    delivered: u64,
}

impl PlaybackQueue {
    pub fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            chunks: VecDeque::with_capacity(capacity),
            capacity,
            overflow,
            dropped: 0,
            delivered: 0,
        }
    }

    pub fn push(&mut self, chunk: MediaChunk) -> PushOutcome {
        if self.chunks.len() < self.capacity {
            self.chunks.push_back(chunk);
            return PushOutcome::Queued;
        }

        self.dropped += 1;
        match self.overflow {
            OverflowPolicy::DropOldest => {
                let evicted = self.chunks.pop_front().map(|c| c.sequence).unwrap_or_default();
                self.chunks.push_back(chunk);
                debug!("Playback queue full, evicted chunk #{}", evicted);
                PushOutcome::EvictedOldest(evicted)
            }
            OverflowPolicy::DropNewest => {
                debug!("Playback queue full, rejected chunk #{}", chunk.sequence);
                PushOutcome::Rejected
            }
        }
    }

    /// Hand the oldest chunk to the sink if it is ready
    pub fn drain_step(&mut self, sink: &mut dyn MediaSink) -> DrainStep {
        let Some(chunk) = self.chunks.front() else {
            return DrainStep::Empty;
        };
        if sink.is_busy() {
            return DrainStep::SinkBusy;
        }

        match sink.append(chunk) {
            Ok(()) => {
                let sequence = chunk.sequence;
                self.chunks.pop_front();
                self.delivered += 1;
                DrainStep::Delivered(sequence)
            }
            Err(e) => {
                warn!("Sink rejected chunk #{}: {}", chunk.sequence, e);
                DrainStep::Failed(e)
            }
        }
    }

    /// Deliver chunks until the queue empties, the sink is busy, or an append fails
    pub fn drain(&mut self, sink: &mut dyn MediaSink) -> usize {
        let mut delivered = 0;
        while let DrainStep::Delivered(_) = self.drain_step(sink) {
            delivered += 1;
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Chunks lost to the overflow policy
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

/// Live stream output: queue, sink, and the arbiter that may pause it
pub struct LivePlayback {
    /// Chunks waiting for the sink
    queue: PlaybackQueue,
    /// Output shared with clip playback
    sink: Box<dyn MediaSink>,
    /// Decides whether live chunks may be written
    arbiter: SinkArbiter,
}

impl LivePlayback {
    pub fn new(queue: PlaybackQueue, sink: Box<dyn MediaSink>, arbiter: SinkArbiter) -> Self {
        Self {
            queue,
            sink,
            arbiter,
        }
    }

    /// Enqueue a chunk and forward whatever the sink can take now
    pub fn push(&mut self, chunk: MediaChunk) -> PushOutcome {
        let outcome = self.queue.push(chunk);
        self.on_sink_ready();
        outcome
    }

    /// Sink-ready signal: drain until the sink is busy or a clip takes it
    ///
    /// The arbiter is consulted before every chunk, and a clip cannot be
    /// started while an append is in progress.
    pub fn on_sink_ready(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(_turn) = self.arbiter.live_turn() {
            match self.queue.drain_step(self.sink.as_mut()) {
                DrainStep::Delivered(_) => delivered += 1,
                DrainStep::Empty | DrainStep::SinkBusy | DrainStep::Failed(_) => break,
            }
        }
        delivered
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MediaKind;
    use crate::sink::ClipLease;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Sink that goes busy after each append until `ready()` is called
    #[derive(Default)]
    struct StepSink {
        busy: bool,
        fail_next: bool,
        received: Vec<u64>,
    }

    impl StepSink {
        fn ready(&mut self) {
            self.busy = false;
        }
    }

    impl MediaSink for StepSink {
        fn is_busy(&self) -> bool {
            self.busy
        }

        fn append(&mut self, chunk: &MediaChunk) -> Result<(), SinkError> {
            if self.fail_next {
                self.fail_next = false;
                return Err(SinkError::Rejected("quota".into()));
            }
            self.received.push(chunk.sequence);
            self.busy = true;
            Ok(())
        }
    }

    fn chunk(sequence: u64) -> MediaChunk {
        MediaChunk::new(MediaKind::Video, sequence, vec![sequence as u8])
    }

    #[test]
    fn test_drain_respects_busy_sink_and_order() {
        let mut queue = PlaybackQueue::new(16, OverflowPolicy::DropOldest);
        let mut sink = StepSink::default();
        for seq in 0..3 {
            queue.push(chunk(seq));
        }

        assert_eq!(queue.drain_step(&mut sink), DrainStep::Delivered(0));
        assert_eq!(queue.drain_step(&mut sink), DrainStep::SinkBusy);
        sink.ready();
        assert_eq!(queue.drain(&mut sink), 1);
        sink.ready();
        assert_eq!(queue.drain(&mut sink), 1);
        sink.ready();
        assert_eq!(queue.drain_step(&mut sink), DrainStep::Empty);

        assert_eq!(sink.received, vec![0, 1, 2]);
        assert_eq!(queue.delivered(), 3);
    }

    #[test]
    fn test_failed_append_keeps_chunk() {
        let mut queue = PlaybackQueue::new(4, OverflowPolicy::DropOldest);
        let mut sink = StepSink {
            fail_next: true,
            ..Default::default()
        };
        queue.push(chunk(7));

        assert!(matches!(queue.drain_step(&mut sink), DrainStep::Failed(_)));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain_step(&mut sink), DrainStep::Delivered(7));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_overflow_drop_oldest_keeps_newest() {
        let mut queue = PlaybackQueue::new(3, OverflowPolicy::DropOldest);
        for seq in 0..3 {
            assert_eq!(queue.push(chunk(seq)), PushOutcome::Queued);
        }
        assert_eq!(queue.push(chunk(3)), PushOutcome::EvictedOldest(0));
        assert_eq!(queue.push(chunk(4)), PushOutcome::EvictedOldest(1));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 2);

        let mut sink = StepSink::default();
        for _ in 0..3 {
            queue.drain_step(&mut sink);
            sink.ready();
        }
        assert_eq!(sink.received, vec![2, 3, 4]);
    }

    #[test]
    fn test_overflow_drop_newest_rejects_incoming() {
        let mut queue = PlaybackQueue::new(2, OverflowPolicy::DropNewest);
        queue.push(chunk(0));
        queue.push(chunk(1));
        assert_eq!(queue.push(chunk(2)), PushOutcome::Rejected);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn test_live_playback_paused_while_clip_holds_sink() {
        #[derive(Default)]
        struct CountingSink(std::sync::Arc<parking_lot::Mutex<Vec<u64>>>);
        impl MediaSink for CountingSink {
            fn is_busy(&self) -> bool {
                false
            }
            fn append(&mut self, chunk: &MediaChunk) -> Result<(), SinkError> {
                self.0.lock().push(chunk.sequence);
                Ok(())
            }
        }

        let arbiter = SinkArbiter::new();
        let sink = CountingSink::default();
        let received = std::sync::Arc::clone(&sink.0);
        let mut live = LivePlayback::new(
            PlaybackQueue::new(8, OverflowPolicy::DropOldest),
            Box::new(sink),
            arbiter.clone(),
        );

        live.push(chunk(0));
        let lease = arbiter.try_acquire_clip().unwrap();
        live.push(chunk(1));
        live.push(chunk(2));
        assert_eq!(*received.lock(), vec![0]);
        assert_eq!(live.queue().len(), 2);

        drop(lease);
        assert_eq!(live.on_sink_ready(), 2);
        assert_eq!(*received.lock(), vec![0, 1, 2]);
    }

    /// Sink that hands the output to a clip during its first append
    struct HandoverSink {
        arbiter: SinkArbiter,
        lease: Arc<Mutex<Option<ClipLease>>>,
        received: Arc<Mutex<Vec<u64>>>,
        while_clip_held: Arc<AtomicUsize>,
    }

    impl MediaSink for HandoverSink {
        fn is_busy(&self) -> bool {
            false
        }

        fn append(&mut self, chunk: &MediaChunk) -> Result<(), SinkError> {
            let mut lease = self.lease.lock();
            if lease.is_some() {
                self.while_clip_held.fetch_add(1, Ordering::SeqCst);
            } else {
                *lease = self.arbiter.try_acquire_clip();
            }
            self.received.lock().push(chunk.sequence);
            Ok(())
        }
    }

    #[test]
    fn test_clip_taking_sink_mid_drain_stops_live_chunks() {
        let arbiter = SinkArbiter::new();
        let lease = Arc::new(Mutex::new(None));
        let received = Arc::new(Mutex::new(Vec::new()));
        let while_clip_held = Arc::new(AtomicUsize::new(0));
        let sink = HandoverSink {
            arbiter: arbiter.clone(),
            lease: Arc::clone(&lease),
            received: Arc::clone(&received),
            while_clip_held: Arc::clone(&while_clip_held),
        };
        let mut live = LivePlayback::new(
            PlaybackQueue::new(8, OverflowPolicy::DropOldest),
            Box::new(sink),
            arbiter.clone(),
        );

        // Buffer a backlog behind an earlier clip
        let earlier = arbiter.try_acquire_clip().unwrap();
        for seq in 0..4 {
            live.push(chunk(seq));
        }
        drop(earlier);

        assert_eq!(live.on_sink_ready(), 1);
        assert_eq!(while_clip_held.load(Ordering::SeqCst), 0);
        assert_eq!(*received.lock(), vec![0]);
        assert_eq!(live.queue().len(), 3);

        // The rest follows once the clip releases the sink
        lease.lock().take();
        assert_eq!(live.on_sink_ready(), 1);
        lease.lock().take();
        assert_eq!(live.on_sink_ready(), 1);
        lease.lock().take();
        assert_eq!(live.on_sink_ready(), 1);
        assert_eq!(*received.lock(), vec![0, 1, 2, 3]);
        assert_eq!(while_clip_held.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clip_never_starts_during_a_live_append() {
        /// Records appends that happen while a clip owns the sink
        struct WatchingSink {
            arbiter: SinkArbiter,
            overlaps: Arc<AtomicUsize>,
        }

        impl MediaSink for WatchingSink {
            fn is_busy(&self) -> bool {
                false
            }

            fn append(&mut self, _chunk: &MediaChunk) -> Result<(), SinkError> {
                for _ in 0..4 {
                    if !self.arbiter.live_allowed() {
                        self.overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::yield_now();
                }
                Ok(())
            }
        }

        let arbiter = SinkArbiter::new();
        let overlaps = Arc::new(AtomicUsize::new(0));
        let mut live = LivePlayback::new(
            PlaybackQueue::new(1024, OverflowPolicy::DropOldest),
            Box::new(WatchingSink {
                arbiter: arbiter.clone(),
                overlaps: Arc::clone(&overlaps),
            }),
            arbiter.clone(),
        );

        std::thread::scope(|scope| {
            let clips = arbiter.clone();
            scope.spawn(move || {
                for _ in 0..200 {
                    if let Some(lease) = clips.try_acquire_clip() {
                        std::thread::yield_now();
                        drop(lease);
                    }
                }
            });
            for seq in 0..500 {
                live.push(chunk(seq));
            }
        });

        live.on_sink_ready();
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(live.queue().delivered(), 500);
    }
}
