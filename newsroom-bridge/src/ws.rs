//! WebSocket transport backed by tokio-tungstenite

use crate::bridge::{Connector, WireSession};
use crate::error::{BridgeError, BridgeResult};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

/// Connector that opens real WebSocket sessions
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> BridgeResult<Box<dyn WireSession>> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| BridgeError::ConnectionFailed(e.to_string()))?;
        debug!("WebSocket handshake complete: {}", response.status());
        Ok(Box::new(WsSession { stream }))
    }
}

/// What a received WebSocket message means for the session
#[derive(Debug, PartialEq)]
enum Frame {
    Text(String),
    Skip,
    Closed,
}

/// Only text frames carry envelopes
fn classify(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(text),
        Message::Binary(bytes) => {
            warn!("Skipping {}-byte binary frame", bytes.len());
            Frame::Skip
        }
        Message::Close(frame) => {
            debug!("Peer closed session: {:?}", frame);
            Frame::Closed
        }
        // Pings are answered by tungstenite on the next write
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Frame::Skip,
    }
}

struct WsSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl WireSession for WsSession {
    async fn recv(&mut self) -> Option<BridgeResult<String>> {
        loop {
            match self.stream.next().await? {
                Ok(message) => match classify(message) {
                    Frame::Text(text) => return Some(Ok(text)),
                    Frame::Skip => continue,
                    Frame::Closed => return None,
                },
                Err(e) => return Some(Err(BridgeError::Transport(e.to_string()))),
            }
        }
    }

    async fn send(&mut self, text: String) -> BridgeResult<()> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Error while closing session: {}", e);
        }
    }
}
