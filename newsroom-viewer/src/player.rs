//! Console clip player
//!
//! There is no video surface in the headless viewer. A clip "plays" for as
//! long as its anchor would take to read the text aloud.

use async_trait::async_trait;
use log::info;
use newsroom_bridge::{BridgeResult, ClipPlayer, ResolvedClip};
use std::time::Duration;

/// Shortest time a clip stays on air
const MIN_CLIP_SECS: f64 = 2.0;

pub struct ConsoleClipPlayer;

impl ConsoleClipPlayer {
    /// Reading time at 150 words per minute, at least two seconds
    fn estimate_duration(text: &str) -> Duration {
        let word_count = text.split_whitespace().count() as f64;
        let words_per_second = 150.0 / 60.0;
        Duration::from_secs_f64((word_count / words_per_second).max(MIN_CLIP_SECS))
    }
}

#[async_trait]
impl ClipPlayer for ConsoleClipPlayer {
    async fn play(&self, clip: &ResolvedClip) -> BridgeResult<()> {
        let duration = Self::estimate_duration(&clip.text);
        info!(
            "🎬 {} on air for {:.1}s: \"{}\" ({})",
            clip.anchor,
            duration.as_secs_f64(),
            clip.text,
            clip.url
        );
        tokio::time::sleep(duration).await;
        info!("🎬 {} clip ended", clip.anchor);
        Ok(())
    }
}
