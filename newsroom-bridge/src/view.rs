//! Text projection of the broadcast status

use crate::bridge::ConnectionStatus;
use crate::data::Severity;
use crate::shared_state::BroadcastStatus;
use crate::video_queue::JobState;
use std::fmt;

/// Connection indicator shown next to the headline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Live,
    Connecting,
    Reconnecting,
    Offline,
}

impl Indicator {
    fn from_status(status: &ConnectionStatus) -> Self {
        match status {
            ConnectionStatus::Connected => Indicator::Live,
            ConnectionStatus::Connecting => Indicator::Connecting,
            ConnectionStatus::Error(_) => Indicator::Reconnecting,
            ConnectionStatus::Disconnected | ConnectionStatus::GaveUp => Indicator::Offline,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Indicator::Live => "● LIVE",
            Indicator::Connecting => "◌ CONNECTING",
            Indicator::Reconnecting => "◐ RECONNECTING",
            Indicator::Offline => "○ OFFLINE",
        }
    }
}

/// What the viewer renders, derived from [`BroadcastStatus`] and nothing else
#[derive(Debug, Clone, PartialEq)]
pub struct StatusView {
    pub indicator: Indicator,
    pub headline: String,
    pub metric_line: Option<String>,
    pub alert_lines: Vec<String>,
    pub clip_line: Option<String>,
    pub counters: String,
    /// Offer the manual reconnect affordance
    pub show_reconnect: bool,
}

impl StatusView {
    pub fn project(status: &BroadcastStatus) -> Self {
        let show = status.show_name.as_deref().unwrap_or("Off air");
        let headline = match (&status.current_anchor, &status.segment) {
            (Some(anchor), Some(segment)) => format!("{} · {} · {}", show, anchor, segment),
            (Some(anchor), None) => format!("{} · {}", show, anchor),
            (None, Some(segment)) => format!("{} · {}", show, segment),
            (None, None) => show.to_string(),
        };

        let metric_line = if status.metrics.is_empty() {
            None
        } else {
            Some(
                status
                    .metrics
                    .iter()
                    .map(|(name, value)| format!("{}={}", name, format_gauge(*value)))
                    .collect::<Vec<_>>()
                    .join("  "),
            )
        };

        let alert_lines = status
            .alerts
            .active()
            .iter()
            .map(|alert| {
                let tag = match alert.severity {
                    Severity::Critical => "!!!",
                    Severity::Warning => "!!",
                    Severity::Minor => "!",
                };
                match &alert.message {
                    Some(message) => format!("{} {} is breaking down: {}", tag, alert.anchor, message),
                    None => format!("{} {} is breaking down", tag, alert.anchor),
                }
            })
            .collect();

        let clip_line = status.now_playing.as_ref().map(|(anchor, state)| match state {
            JobState::Resolving => format!("Preparing clip: {}", anchor),
            _ => format!("Now playing clip: {}", anchor),
        });

        let mut counters = format!(
            "frames {}  audio {}  dropped {}  decode errors {}  clips queued {}",
            status.frames_received,
            status.audio_chunks_received,
            status.dropped_chunks,
            status.decode_errors,
            status.queued_clips
        );
        if status.retry_count > 0 {
            counters.push_str(&format!("  retry {}", status.retry_count));
        }

        Self {
            indicator: Indicator::from_status(&status.connection),
            headline,
            metric_line,
            alert_lines,
            clip_line,
            counters,
            show_reconnect: status.connection.needs_manual_reconnect(),
        }
    }
}

fn format_gauge(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

impl fmt::Display for StatusView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}  {}", self.indicator.symbol(), self.headline)?;
        if let Some(metrics) = &self.metric_line {
            writeln!(f, "  {}", metrics)?;
        }
        for alert in &self.alert_lines {
            writeln!(f, "  {}", alert)?;
        }
        if let Some(clip) = &self.clip_line {
            writeln!(f, "  {}", clip)?;
        }
        write!(f, "  {}", self.counters)?;
        if self.show_reconnect {
            write!(f, "\n  Connection lost. Type `r` to reconnect.")?;
        }
        Ok(())
    }
}
