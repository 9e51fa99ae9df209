//! Connection manager
//!
//! Owns the live session to the broadcast backend and keeps it alive.
//!
//! ```text
//! connect() ──▶ Connecting ──▶ Connected ──(close/error)──▶ Disconnected/Error
//!                   ▲                                            │
//!                   └──────── sleep(policy.delay_for(n)) ◀───────┘
//!                                      │ n > max_attempts
//!                                      ▼
//!                                   GaveUp  (manual reconnect() only)
//! ```
//!
//! Each call to [`ConnectionManager::connect`] spawns one supervision task.
//! The task's backoff sleep is the retry timer, so cancelling the previous
//! task before spawning a new one guarantees a single pending retry at any
//! time. Messages are routed through the [`MessageDispatcher`]; a malformed
//! message is logged and dropped without disturbing the session.

use crate::bridge::{ConnectionStatus, Connector, WireSession};
use crate::data::{InboundMessage, OutboundMessage};
use crate::dispatcher::{ConnectionEvent, MessageDispatcher};
use crate::error::{BridgeError, BridgeResult};
use crate::reconnect::ReconnectPolicy;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// State shared between the manager and its supervision task
#[derive(Default)]
struct ConnectionShared {
    /// Last published connection status
    status: RwLock<ConnectionStatus>,
    /// Retries since the last stable session; written only under this lock
    retries: Mutex<u32>,
}

/// The currently running supervision task
struct ActiveLoop {
    /// Stops the task and its pending retry timer
    cancel: CancellationToken,
    /// Control messages for the open session
    outbound: mpsc::UnboundedSender<String>,
    handle: JoinHandle<()>,
}

/// Parametrized connection manager, one per live feed
pub struct ConnectionManager {
    /// Backend WebSocket URL
    url: String,
    /// Backoff and give-up rules
    policy: ReconnectPolicy,
    /// Sent after every successful open
    greeting: Vec<OutboundMessage>,
    /// Opens sessions (WebSocket in production)
    connector: Arc<dyn Connector>,
    /// Routes inbound messages and connection events
    dispatcher: Arc<MessageDispatcher>,
    /// Status and retry counter, shared with the supervision task
    shared: Arc<ConnectionShared>,
    /// The running supervision task, if any
    active: Mutex<Option<ActiveLoop>>,
}

impl ConnectionManager {
    pub fn new(
        url: impl Into<String>,
        policy: ReconnectPolicy,
        connector: Arc<dyn Connector>,
        dispatcher: Arc<MessageDispatcher>,
    ) -> Self {
        Self {
            url: url.into(),
            policy,
            greeting: Vec::new(),
            connector,
            dispatcher,
            shared: Arc::new(ConnectionShared::default()),
            active: Mutex::new(None),
        }
    }

    /// Messages sent right after every successful open
    pub fn with_greeting(mut self, greeting: Vec<OutboundMessage>) -> Self {
        self.greeting = greeting;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn dispatcher(&self) -> &Arc<MessageDispatcher> {
        &self.dispatcher
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.status.read().clone()
    }

    /// Retries performed since the last stable session
    pub fn retry_count(&self) -> u32 {
        *self.shared.retries.lock()
    }

    /// Start connecting, replacing any running attempt or pending retry
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) -> BridgeResult<()> {
        self.start_loop(false)
    }

    /// Manual reconnect: clear the retry budget and connect again
    pub fn reconnect(&self) -> BridgeResult<()> {
        info!("Manual reconnect to {}", self.url);
        self.start_loop(true)
    }

    fn start_loop(&self, reset_retries: bool) -> BridgeResult<()> {
        let runtime = Handle::try_current().map_err(|_| BridgeError::NoRuntime)?;

        let mut active = self.active.lock();
        if let Some(previous) = active.take() {
            debug!("Cancelling previous connection task for {}", self.url);
            previous.cancel.cancel();
        }
        // After the cancel, so the old task cannot write the counter back
        if reset_retries {
            *self.shared.retries.lock() = 0;
        }

        let cancel = CancellationToken::new();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let ctx = LoopContext {
            url: self.url.clone(),
            policy: self.policy.clone(),
            greeting: self.greeting.clone(),
            connector: Arc::clone(&self.connector),
            dispatcher: Arc::clone(&self.dispatcher),
            shared: Arc::clone(&self.shared),
            cancel: cancel.clone(),
        };

        let handle = runtime.spawn(run_supervisor(ctx, outbound_rx));
        *active = Some(ActiveLoop {
            cancel,
            outbound: outbound_tx,
            handle,
        });
        Ok(())
    }

    /// Close the session and clear any pending retry
    pub fn disconnect(&self) {
        if let Some(active) = self.active.lock().take() {
            active.cancel.cancel();
        }
        *self.shared.status.write() = ConnectionStatus::Disconnected;
        self.dispatcher
            .notify(&ConnectionEvent::Status(ConnectionStatus::Disconnected));
    }

    /// Disconnect and wait for the supervision task to close its session
    pub async fn shutdown(&self) {
        let handle = self.active.lock().take().map(|active| {
            active.cancel.cancel();
            active.handle
        });
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Connection task for {} ended abnormally: {}", self.url, e);
            }
        }
        *self.shared.status.write() = ConnectionStatus::Disconnected;
        self.dispatcher
            .notify(&ConnectionEvent::Status(ConnectionStatus::Disconnected));
    }

    /// Send a control message
    ///
    /// Dropped (returns `false`) while the session is not open. Nothing is
    /// queued for later delivery.
    pub fn send(&self, message: &OutboundMessage) -> bool {
        if !self.status().is_connected() {
            debug!("Dropping {:?}: not connected", message);
            return false;
        }

        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode {:?}: {}", message, e);
                return false;
            }
        };

        match self.active.lock().as_ref() {
            Some(active) => active.outbound.send(text).is_ok(),
            None => false,
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.cancel.cancel();
        }
    }
}

struct LoopContext {
    url: String,
    policy: ReconnectPolicy,
    greeting: Vec<OutboundMessage>,
    connector: Arc<dyn Connector>,
    dispatcher: Arc<MessageDispatcher>,
    shared: Arc<ConnectionShared>,
    cancel: CancellationToken,
}

impl LoopContext {
    /// Publish a status change; a cancelled task no longer owns the status
    fn set_status(&self, status: ConnectionStatus) {
        if self.cancel.is_cancelled() {
            return;
        }
        *self.shared.status.write() = status.clone();
        self.dispatcher.notify(&ConnectionEvent::Status(status));
    }

    fn retries(&self) -> u32 {
        *self.shared.retries.lock()
    }

    /// Write the retry counter unless this task has been replaced
    fn store_retries(&self, retries: u32) -> bool {
        let mut current = self.shared.retries.lock();
        if self.cancel.is_cancelled() {
            return false;
        }
        *current = retries;
        true
    }

    fn handle_text(&self, text: &str) {
        match InboundMessage::parse(text) {
            Ok(message) => {
                self.dispatcher.dispatch(&message);
            }
            Err(e) => warn!("Dropping malformed message: {}", e),
        }
    }
}

enum SessionEnd {
    Cancelled,
    Closed,
    Failed(BridgeError),
}

enum Step {
    Cancelled,
    ResetRetries,
    Inbound(Option<BridgeResult<String>>),
    Outbound(Option<String>),
}

async fn run_supervisor(ctx: LoopContext, mut outbound: mpsc::UnboundedReceiver<String>) {
    info!("Starting connection loop for {}", ctx.url);

    loop {
        ctx.set_status(ConnectionStatus::Connecting);

        let connected = tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            result = ctx.connector.connect(&ctx.url) => result,
        };
        // Replaced while connecting; the retry counter belongs to the new task
        if ctx.cancel.is_cancelled() {
            return;
        }

        match connected {
            Ok(session) => {
                // Anything queued while closed is stale
                while outbound.try_recv().is_ok() {}

                info!("Connected to {}", ctx.url);
                ctx.set_status(ConnectionStatus::Connected);

                match run_session(&ctx, session, &mut outbound).await {
                    SessionEnd::Cancelled => return,
                    SessionEnd::Closed => {
                        info!("Session to {} closed", ctx.url);
                        ctx.set_status(ConnectionStatus::Disconnected);
                    }
                    SessionEnd::Failed(e) => {
                        warn!("Session to {} failed: {}", ctx.url, e);
                        ctx.set_status(ConnectionStatus::Error(e.to_string()));
                    }
                }
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", ctx.url, e);
                ctx.set_status(ConnectionStatus::Error(e.to_string()));
            }
        }

        let attempt = ctx.retries() + 1;
        if !ctx.policy.allows(attempt) {
            warn!(
                "Giving up on {} after {} reconnect attempts",
                ctx.url,
                attempt - 1
            );
            ctx.set_status(ConnectionStatus::GaveUp);
            return;
        }
        if !ctx.store_retries(attempt) {
            return;
        }

        let delay = ctx.policy.delay_for(attempt);
        info!(
            "Reconnecting to {} in {:?} (attempt {}/{})",
            ctx.url, delay, attempt, ctx.policy.max_attempts
        );
        ctx.dispatcher
            .notify(&ConnectionEvent::Reconnecting { attempt, delay });

        tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            _ = sleep(delay) => {}
        }
    }
}

async fn run_session(
    ctx: &LoopContext,
    mut session: Box<dyn WireSession>,
    outbound: &mut mpsc::UnboundedReceiver<String>,
) -> SessionEnd {
    for message in &ctx.greeting {
        match message.to_json() {
            Ok(text) => {
                if let Err(e) = session.send(text).await {
                    return SessionEnd::Failed(e);
                }
            }
            Err(e) => warn!("Failed to encode greeting {:?}: {}", message, e),
        }
    }

    let reset_at = Instant::now() + ctx.policy.reset_after();
    let mut reset_pending = ctx.retries() > 0;

    loop {
        let step = tokio::select! {
            _ = ctx.cancel.cancelled() => Step::Cancelled,
            _ = sleep_until(reset_at), if reset_pending => Step::ResetRetries,
            frame = session.recv() => Step::Inbound(frame),
            text = outbound.recv() => Step::Outbound(text),
        };

        match step {
            Step::Cancelled => {
                session.close().await;
                return SessionEnd::Cancelled;
            }
            Step::ResetRetries => {
                reset_pending = false;
                if !ctx.store_retries(0) {
                    continue;
                }
                debug!("Session to {} is stable, retry counter reset", ctx.url);
                ctx.dispatcher.notify(&ConnectionEvent::RetriesReset);
            }
            Step::Inbound(None) => return SessionEnd::Closed,
            Step::Inbound(Some(Err(e))) => return SessionEnd::Failed(e),
            Step::Inbound(Some(Ok(text))) => ctx.handle_text(&text),
            Step::Outbound(Some(text)) => {
                if let Err(e) = session.send(text).await {
                    return SessionEnd::Failed(e);
                }
            }
            Step::Outbound(None) => {
                session.close().await;
                return SessionEnd::Cancelled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl Connector for Unreachable {
        async fn connect(&self, url: &str) -> BridgeResult<Box<dyn WireSession>> {
            Err(BridgeError::ConnectionFailed(url.to_string()))
        }
    }

    fn context(shared: Arc<ConnectionShared>) -> LoopContext {
        LoopContext {
            url: "ws://test".into(),
            policy: ReconnectPolicy::default(),
            greeting: Vec::new(),
            connector: Arc::new(Unreachable),
            dispatcher: MessageDispatcher::new(),
            shared,
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn test_replaced_task_cannot_write_retry_counter() {
        let shared = Arc::new(ConnectionShared::default());
        let old = context(Arc::clone(&shared));
        assert!(old.store_retries(4));
        assert_eq!(*shared.retries.lock(), 4);

        // What a manual reconnect does: cancel first, then reset
        old.cancel.cancel();
        *shared.retries.lock() = 0;

        assert!(!old.store_retries(5));
        assert_eq!(*shared.retries.lock(), 0);

        let new = context(Arc::clone(&shared));
        assert!(new.store_retries(1));
        assert_eq!(*shared.retries.lock(), 1);
    }
}
