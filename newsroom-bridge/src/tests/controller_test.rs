use super::fakes::{wait_until, Attempt, FakeConnector, FakePlayer, FakeResolver, RecordingSink};
use crate::config::BroadcastConfig;
use crate::controller::BroadcastController;
use crate::data::MediaKind;
use crate::sink::SinkArbiter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

struct Harness {
    controller: BroadcastController,
    connector: Arc<FakeConnector>,
    backend: mpsc::UnboundedSender<String>,
    sink: RecordingSink,
    player: Arc<FakePlayer>,
}

async fn connected_controller() -> Harness {
    let (backend, rx) = mpsc::unbounded_channel();
    let connector = FakeConnector::new(vec![Attempt::Live(rx)]);
    let sink = RecordingSink::default();
    let player = FakePlayer::new(Duration::from_secs(2), SinkArbiter::new());

    let controller = BroadcastController::new(
        BroadcastConfig::default(),
        connector.clone(),
        Box::new(sink.clone()),
        Arc::new(FakeResolver::default()),
        player.clone(),
    );
    controller.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || controller.connection_status().is_connected()).await);

    Harness {
        controller,
        connector,
        backend,
        sink,
        player,
    }
}

#[tokio::test(start_paused = true)]
async fn test_greeting_requests_status_and_stream() {
    let h = connected_controller().await;
    assert!(wait_until(Duration::from_secs(1), || h.connector.sent().len() == 2).await);
    assert_eq!(
        h.connector.sent(),
        vec![
            r#"{"type":"status_request"}"#.to_string(),
            r#"{"type":"get_stream","quality":"720p","format":"webm"}"#.to_string(),
        ]
    );

    assert!(h.controller.change_quality("1080p"));
    assert!(wait_until(Duration::from_secs(1), || h.connector.sent().len() == 3).await);
    h.controller.shutdown().await;
    assert!(!h.controller.request_status());
}

#[tokio::test(start_paused = true)]
async fn test_breakdown_alert_dismissed_exactly_once_after_ten_seconds() {
    let h = connected_controller().await;
    h.backend
        .send(r#"{"type":"breakdown_alert","anchor":"ray","message":"existential dread"}"#.into())
        .unwrap();

    let state = Arc::clone(h.controller.state());
    assert!(wait_until(Duration::from_secs(1), || state.status.get().alerts.len() == 1).await);

    let alert = state.status.get().alerts.active()[0].clone();
    assert_eq!(alert.dismiss_at - alert.raised_at, Duration::from_millis(10_000));

    let summary = h.controller.tick(alert.dismiss_at - Duration::from_millis(1));
    assert!(summary.dismissed_alerts.is_empty());
    assert_eq!(state.status.get().alerts.len(), 1);

    let summary = h.controller.tick(alert.dismiss_at);
    assert_eq!(summary.dismissed_alerts.len(), 1);
    assert_eq!(summary.dismissed_alerts[0].anchor, "ray");
    assert!(state.status.get().alerts.is_empty());

    let summary = h.controller.tick(alert.dismiss_at + Duration::from_secs(60));
    assert!(summary.dismissed_alerts.is_empty());
    h.controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_frames_are_decoded_into_the_sink() {
    let h = connected_controller().await;
    h.backend
        .send(r#"{"type":"video_frame","data":"48656C6C6F"}"#.into())
        .unwrap();
    h.backend.send(r#"{"type":"audio_chunk","data":"aGk="}"#.into()).unwrap();
    h.backend.send(r#"{"type":"frame","data":"zz"}"#.into()).unwrap();
    h.backend
        .send(r#"{"type":"frame","data":"AAE=","encoding":"base64"}"#.into())
        .unwrap();

    let state = Arc::clone(h.controller.state());
    assert!(wait_until(Duration::from_secs(1), || state.status.get().decode_errors == 1
        && h.sink.chunks.lock().len() == 3)
    .await);

    let chunks = h.sink.chunks.lock().clone();
    assert_eq!(chunks[0].kind, MediaKind::Video);
    assert_eq!(chunks[0].data, b"Hello".to_vec());
    assert_eq!(chunks[1].kind, MediaKind::Audio);
    assert_eq!(chunks[1].data, b"hi".to_vec());
    assert_eq!(chunks[2].data, vec![0x00, 0x01]);
    assert!(chunks.windows(2).all(|pair| pair[0].sequence < pair[1].sequence));

    let status = state.status.get();
    assert_eq!(status.frames_received, 2);
    assert_eq!(status.audio_chunks_received, 1);
    // A bad payload costs one message, not the session
    assert!(h.controller.connection_status().is_connected());
    h.controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_status_messages_update_state() {
    let h = connected_controller().await;
    h.backend
        .send(r#"{"type":"status","current_show":"The Doom Hour","anchor":"kim","segment":"weather"}"#.into())
        .unwrap();
    h.backend
        .send(r#"{"type":"metrics_update","metrics":{"viewers":1200,"panic":0.75}}"#.into())
        .unwrap();

    let state = Arc::clone(h.controller.state());
    assert!(wait_until(Duration::from_secs(1), || state.status.get().metrics.len() == 2).await);

    let status = state.status.get();
    assert_eq!(status.show_name.as_deref(), Some("The Doom Hour"));
    assert_eq!(status.current_anchor.as_deref(), Some("kim"));
    assert_eq!(status.metrics.get("panic"), Some(&0.75));
    h.controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_generate_request_plays_clip_and_pauses_live_stream() {
    let h = connected_controller().await;
    h.backend
        .send(r#"{"type":"generate_character_video","character":"ray","text":"We interrupt this broadcast","priority":"urgent"}"#.into())
        .unwrap();

    assert!(wait_until(Duration::from_secs(3), || h.controller.clip_on_air()).await);
    h.backend
        .send(r#"{"type":"video_frame","data":"0102"}"#.into())
        .unwrap();

    let state = Arc::clone(h.controller.state());
    assert!(wait_until(Duration::from_secs(1), || state.status.get().frames_received == 1).await);
    // Buffered while the clip owns the sink
    assert!(h.sink.chunks.lock().is_empty());

    assert!(wait_until(Duration::from_secs(5), || !h.controller.clip_on_air()).await);
    let summary = h.controller.tick(Instant::now());
    assert_eq!(summary.delivered_chunks, 1);
    assert_eq!(h.sink.chunks.lock().len(), 1);
    assert_eq!(h.player.played(), vec!["ray"]);
    assert!(state.status.get().now_playing.is_none());
    h.controller.shutdown().await;
}
