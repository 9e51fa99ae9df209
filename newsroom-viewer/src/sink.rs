//! Metering sink
//!
//! Stands in for a media element: accepts every chunk and keeps running
//! byte totals per media kind for the status line.

use newsroom_bridge::{MediaChunk, MediaKind, MediaSink, SinkError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Meter {
    video_bytes: AtomicU64,
    audio_bytes: AtomicU64,
    chunks: AtomicU64,
}

impl Meter {
    pub fn summary(&self) -> String {
        format!(
            "sink: {} chunks, video {} KiB, audio {} KiB",
            self.chunks.load(Ordering::Relaxed),
            self.video_bytes.load(Ordering::Relaxed) / 1024,
            self.audio_bytes.load(Ordering::Relaxed) / 1024
        )
    }
}

pub struct MeteringSink {
    meter: Arc<Meter>,
}

impl MeteringSink {
    pub fn new() -> (Self, Arc<Meter>) {
        let meter = Arc::new(Meter::default());
        (
            Self {
                meter: Arc::clone(&meter),
            },
            meter,
        )
    }
}

impl MediaSink for MeteringSink {
    fn is_busy(&self) -> bool {
        false
    }

    fn append(&mut self, chunk: &MediaChunk) -> Result<(), SinkError> {
        let bytes = chunk.len() as u64;
        match chunk.kind {
            MediaKind::Video => self.meter.video_bytes.fetch_add(bytes, Ordering::Relaxed),
            MediaKind::Audio => self.meter.audio_bytes.fetch_add(bytes, Ordering::Relaxed),
        };
        self.meter.chunks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
