//! Message dispatcher
//!
//! Routes parsed inbound messages to the handlers registered for their
//! [`MessageKind`], and connection events to status listeners. One
//! dispatcher is shared between the connection task and whoever registers
//! handlers (normally the [`crate::controller::BroadcastController`]).

use crate::bridge::ConnectionStatus;
use crate::data::{InboundMessage, MessageKind};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Handler for one kind of inbound message
pub type MessageHandler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

/// Listener for connection events
pub type EventListener = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Connection lifecycle event
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Status changed
    Status(ConnectionStatus),
    /// A retry has been scheduled
    Reconnecting { attempt: u32, delay: Duration },
    /// Retry counter cleared after a stable session
    RetriesReset,
}

/// Dispatcher for inbound messages and connection events
#[derive(Default)]
pub struct MessageDispatcher {
    handlers: RwLock<HashMap<MessageKind, Vec<MessageHandler>>>,
    listeners: RwLock<Vec<EventListener>>,
}

impl MessageDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a handler for a message kind
    pub fn on_message<F>(&self, kind: MessageKind, handler: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Register a connection event listener
    pub fn on_event<F>(&self, listener: F)
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Deliver a message to its handlers, returning how many ran
    pub fn dispatch(&self, message: &InboundMessage) -> usize {
        // Clone the handler list so handlers may register more handlers
        let handlers = self
            .handlers
            .read()
            .get(&message.kind())
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            debug!("No handler for {:?} message", message.kind());
        }
        for handler in &handlers {
            handler(message);
        }
        handlers.len()
    }

    pub fn notify(&self, event: &ConnectionEvent) {
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            listener(event);
        }
    }

    pub fn handler_count(&self, kind: MessageKind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }
}
