//! Wire message model
//!
//! Inbound messages arrive as JSON objects carrying a `type` field. Several
//! type names are synonyms left over from different backend revisions
//! (`state_update`/`status`, `video_frame`/`frame`, ...); [`MessageKind`]
//! folds them into one kind each so handlers are registered once.

use crate::decoder::PayloadEncoding;
use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio::time::Instant;

/// Kind of an inbound message, keyed by its `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `state_update` / `status` - broadcast metadata
    Status,
    /// `metrics_update` - numeric gauges for display
    Metrics,
    /// `breakdown_warning` / `breakdown_alert` - transient alert
    Breakdown,
    /// `anchor_change` / `segment_change` - programme change
    ProgramChange,
    /// `video_frame` / `frame` - encoded video payload
    VideoFrame,
    /// `audio_chunk` - encoded audio payload
    AudioChunk,
    /// `generate_character_video` - clip synthesis request
    GenerateVideo,
    /// Anything else
    Unknown,
}

impl MessageKind {
    /// Map a wire `type` value to its kind
    pub fn from_type(type_name: &str) -> Self {
        match type_name {
            "state_update" | "status" => MessageKind::Status,
            "metrics_update" => MessageKind::Metrics,
            "breakdown_warning" | "breakdown_alert" => MessageKind::Breakdown,
            "anchor_change" | "segment_change" => MessageKind::ProgramChange,
            "video_frame" | "frame" => MessageKind::VideoFrame,
            "audio_chunk" => MessageKind::AudioChunk,
            "generate_character_video" => MessageKind::GenerateVideo,
            _ => MessageKind::Unknown,
        }
    }
}

/// Clip priority, ordered `Normal < High < Urgent`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Parse a priority name; unknown names fall back to normal
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "urgent" | "critical" => Priority::Urgent,
            "high" => Priority::High,
            _ => Priority::Normal,
        }
    }
}

/// Breakdown alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Warning,
    Critical,
}

impl Severity {
    /// Parse a severity name; unknown names map to warning
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "critical" | "severe" | "meltdown" => Severity::Critical,
            "minor" | "low" | "info" => Severity::Minor,
            _ => Severity::Warning,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Minor => "minor",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// `state_update` / `status` payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusPayload {
    #[serde(default, alias = "anchor")]
    pub current_anchor: Option<String>,
    #[serde(default, alias = "show", alias = "current_show")]
    pub show_name: Option<String>,
    #[serde(default)]
    pub segment: Option<String>,
    #[serde(default)]
    pub metrics: Option<Map<String, Value>>,
}

/// `metrics_update` payload
///
/// Gauges either sit under a `metrics` object or directly on the envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsPayload {
    #[serde(default)]
    pub metrics: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl MetricsPayload {
    /// Numeric gauges carried by the message
    pub fn gauges(&self) -> BTreeMap<String, f64> {
        numeric_fields(self.metrics.as_ref().unwrap_or(&self.fields))
    }
}

/// Keep only the numeric members of a JSON object
pub fn numeric_fields(map: &Map<String, Value>) -> BTreeMap<String, f64> {
    map.iter()
        .filter(|(key, _)| key.as_str() != "type")
        .filter_map(|(key, value)| value.as_f64().map(|v| (key.clone(), v)))
        .collect()
}

/// `breakdown_warning` / `breakdown_alert` payload
#[derive(Debug, Clone, Deserialize)]
pub struct BreakdownPayload {
    #[serde(default, alias = "character")]
    pub anchor: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A breakdown alert with its severity resolved
#[derive(Debug, Clone, PartialEq)]
pub struct Breakdown {
    pub anchor: String,
    pub severity: Severity,
    pub message: Option<String>,
}

/// `anchor_change` / `segment_change` payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgramChangePayload {
    #[serde(default, alias = "new_anchor")]
    pub anchor: Option<String>,
    #[serde(default, alias = "show")]
    pub show_name: Option<String>,
    #[serde(default, alias = "new_segment")]
    pub segment: Option<String>,
}

/// `video_frame` / `frame` / `audio_chunk` payload
#[derive(Debug, Clone, Deserialize)]
pub struct MediaPayload {
    #[serde(alias = "frame", alias = "chunk", alias = "audio", alias = "payload")]
    pub data: String,
    #[serde(default)]
    pub encoding: Option<PayloadEncoding>,
}

/// `generate_character_video` payload
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateVideoPayload {
    #[serde(alias = "character", alias = "anchor_id")]
    pub anchor: String,
    #[serde(default, alias = "script", alias = "prompt")]
    pub text: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default, alias = "articleId")]
    pub article_id: Option<String>,
    #[serde(default, alias = "video_url")]
    pub url: Option<String>,
}

/// Parsed inbound message
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Status(StatusPayload),
    Metrics(MetricsPayload),
    Breakdown(Breakdown),
    ProgramChange(ProgramChangePayload),
    VideoFrame(MediaPayload),
    AudioChunk(MediaPayload),
    GenerateVideo(GenerateVideoPayload),
    Unknown { type_name: String },
}

impl InboundMessage {
    /// Parse a text frame from the backend
    pub fn parse(text: &str) -> BridgeResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Build a typed message from a JSON envelope
    pub fn from_value(value: Value) -> BridgeResult<Self> {
        let type_name = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| BridgeError::MalformedMessage("missing `type` field".to_string()))?
            .to_string();

        let message = match MessageKind::from_type(&type_name) {
            MessageKind::Status => InboundMessage::Status(serde_json::from_value(value)?),
            MessageKind::Metrics => InboundMessage::Metrics(serde_json::from_value(value)?),
            MessageKind::Breakdown => {
                let payload: BreakdownPayload = serde_json::from_value(value)?;
                let default_severity = if type_name == "breakdown_alert" {
                    Severity::Critical
                } else {
                    Severity::Warning
                };
                InboundMessage::Breakdown(Breakdown {
                    anchor: payload.anchor.unwrap_or_else(|| "unknown".to_string()),
                    severity: payload
                        .severity
                        .as_deref()
                        .map(Severity::parse)
                        .unwrap_or(default_severity),
                    message: payload.message,
                })
            }
            MessageKind::ProgramChange => {
                InboundMessage::ProgramChange(serde_json::from_value(value)?)
            }
            MessageKind::VideoFrame => InboundMessage::VideoFrame(serde_json::from_value(value)?),
            MessageKind::AudioChunk => InboundMessage::AudioChunk(serde_json::from_value(value)?),
            MessageKind::GenerateVideo => {
                InboundMessage::GenerateVideo(serde_json::from_value(value)?)
            }
            MessageKind::Unknown => InboundMessage::Unknown { type_name },
        };
        Ok(message)
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            InboundMessage::Status(_) => MessageKind::Status,
            InboundMessage::Metrics(_) => MessageKind::Metrics,
            InboundMessage::Breakdown(_) => MessageKind::Breakdown,
            InboundMessage::ProgramChange(_) => MessageKind::ProgramChange,
            InboundMessage::VideoFrame(_) => MessageKind::VideoFrame,
            InboundMessage::AudioChunk(_) => MessageKind::AudioChunk,
            InboundMessage::GenerateVideo(_) => MessageKind::GenerateVideo,
            InboundMessage::Unknown { .. } => MessageKind::Unknown,
        }
    }
}

/// Outbound control message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    StatusRequest,
    TriggerBreakdown {
        #[serde(skip_serializing_if = "Option::is_none")]
        anchor: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        severity: Option<Severity>,
    },
    GetStream {
        quality: String,
        format: String,
    },
    ChangeQuality {
        quality: String,
    },
}

impl OutboundMessage {
    pub fn to_json(&self) -> BridgeResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Kind of media carried by a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

/// One decoded unit of media
#[derive(Debug, Clone)]
pub struct MediaChunk {
    pub kind: MediaKind,
    /// Arrival order, assigned by the receiver
    pub sequence: u64,
    pub data: Vec<u8>,
    pub received_at: Instant,
}

impl MediaChunk {
    pub fn new(kind: MediaKind, sequence: u64, data: Vec<u8>) -> Self {
        Self {
            kind,
            sequence,
            data,
            received_at: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_kind_aliases() {
        assert_eq!(MessageKind::from_type("state_update"), MessageKind::Status);
        assert_eq!(MessageKind::from_type("status"), MessageKind::Status);
        assert_eq!(MessageKind::from_type("frame"), MessageKind::VideoFrame);
        assert_eq!(MessageKind::from_type("segment_change"), MessageKind::ProgramChange);
        assert_eq!(MessageKind::from_type("weather"), MessageKind::Unknown);
    }

    #[test]
    fn test_parse_breakdown_alert() {
        let msg = InboundMessage::parse(
            r#"{"type":"breakdown_alert","anchor":"ray","severity":"critical"}"#,
        )
        .unwrap();
        match msg {
            InboundMessage::Breakdown(b) => {
                assert_eq!(b.anchor, "ray");
                assert_eq!(b.severity, Severity::Critical);
            }
            other => panic!("Expected breakdown, got {:?}", other),
        }

        let warning = InboundMessage::parse(r#"{"type":"breakdown_warning","anchor":"ray"}"#).unwrap();
        match warning {
            InboundMessage::Breakdown(b) => assert_eq!(b.severity, Severity::Warning),
            other => panic!("Expected breakdown, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_frame_with_alias_field() {
        let msg = InboundMessage::parse(r#"{"type":"frame","frame":"0a0b","sequence":7}"#).unwrap();
        match msg {
            InboundMessage::VideoFrame(p) => {
                assert_eq!(p.data, "0a0b");
                assert_eq!(p.encoding, None);
            }
            other => panic!("Expected video frame, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_generate_video() {
        let msg = InboundMessage::parse(
            r#"{"type":"generate_character_video","character":"ray","text":"Good evening","priority":"urgent","articleId":"a1"}"#,
        )
        .unwrap();
        match msg {
            InboundMessage::GenerateVideo(p) => {
                assert_eq!(p.anchor, "ray");
                assert_eq!(p.article_id.as_deref(), Some("a1"));
                assert_eq!(p.priority.as_deref().map(Priority::parse), Some(Priority::Urgent));
            }
            other => panic!("Expected generate video, got {:?}", other),
        }
    }

    #[test]
    fn test_metrics_gauges_flat_and_nested() {
        let flat = InboundMessage::parse(r#"{"type":"metrics_update","hours_awake":72,"mood":"bad"}"#).unwrap();
        let nested =
            InboundMessage::parse(r#"{"type":"metrics_update","metrics":{"coffee":9.5}}"#).unwrap();

        match (flat, nested) {
            (InboundMessage::Metrics(flat), InboundMessage::Metrics(nested)) => {
                let g = flat.gauges();
                assert_eq!(g.len(), 1);
                assert_eq!(g["hours_awake"], 72.0);
                assert_eq!(nested.gauges()["coffee"], 9.5);
            }
            _ => panic!("Expected metrics"),
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            InboundMessage::parse("{not json"),
            Err(BridgeError::MalformedMessage(_))
        ));
        assert!(matches!(
            InboundMessage::parse(r#"{"anchor":"ray"}"#),
            Err(BridgeError::MalformedMessage(_))
        ));
        let unknown = InboundMessage::parse(r#"{"type":"weather"}"#).unwrap();
        assert_eq!(unknown.kind(), MessageKind::Unknown);
    }

    #[test]
    fn test_outbound_serialization() {
        assert_eq!(
            OutboundMessage::StatusRequest.to_json().unwrap(),
            r#"{"type":"status_request"}"#
        );
        assert_eq!(
            OutboundMessage::GetStream {
                quality: "high".into(),
                format: "webm".into()
            }
            .to_json()
            .unwrap(),
            r#"{"type":"get_stream","quality":"high","format":"webm"}"#
        );
        assert_eq!(
            OutboundMessage::TriggerBreakdown {
                anchor: Some("ray".into()),
                severity: None
            }
            .to_json()
            .unwrap(),
            r#"{"type":"trigger_breakdown","anchor":"ray"}"#
        );
    }
}
