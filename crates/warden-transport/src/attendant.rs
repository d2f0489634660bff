//! The attendant: a server-side handle to one live connection.
//!
//! Handlers never touch sockets. They get an [`Attendant`], which offers:
//! - `send(event, args)`: queue a message for the peer (never blocks)
//! - a key/value context for per-connection state (e.g. who is logged in)
//! - `close()`: ask the writer side to hang up
//!
//! Outgoing messages go through an unbounded channel to whoever holds
//! the matching [`Outbox`]: the WebSocket writer task in production, or
//! the test itself.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use warden_wire::{Arg, Message};

use crate::{ConnectionId, ServerId, TransportError};

type ContextValue = Arc<dyn Any + Send + Sync>;

/// Something queued for delivery to the peer.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// A message to encode and send.
    Message(Message),
    /// Close the connection after everything queued before it.
    Close,
}

/// Receiving end of an attendant's outbound queue.
#[derive(Debug)]
pub struct Outbox {
    rx: mpsc::UnboundedReceiver<Outbound>,
}

impl Outbox {
    /// Waits for the next queued item. `None` once every attendant
    /// handle has been dropped.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.rx.recv().await
    }

    /// Returns the next queued item without waiting.
    pub fn try_recv(&mut self) -> Option<Outbound> {
        self.rx.try_recv().ok()
    }

    /// Drains every queued message, skipping close markers.
    pub fn drain(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Some(item) = self.try_recv() {
            if let Outbound::Message(msg) = item {
                messages.push(msg);
            }
        }
        messages
    }
}

/// Server-side handle to one connection.
///
/// Shared as `Arc<Attendant>`: the connection task owns one reference,
/// and the session registry holds another while the connection is
/// logged in.
pub struct Attendant {
    id: ConnectionId,
    server: ServerId,
    outbound: mpsc::UnboundedSender<Outbound>,
    context: Mutex<HashMap<String, ContextValue>>,
}

impl Attendant {
    /// Creates an attendant and the outbox its messages are delivered to.
    pub fn channel(server: ServerId, id: ConnectionId) -> (Arc<Self>, Outbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        let attendant = Arc::new(Self {
            id,
            server,
            outbound: tx,
            context: Mutex::new(HashMap::new()),
        });
        (attendant, Outbox { rx })
    }

    /// Returns the connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the server this connection belongs to.
    pub fn server(&self) -> ServerId {
        self.server
    }

    /// Queues `(event, args)` for the peer.
    ///
    /// # Errors
    /// Returns [`TransportError::ConnectionClosed`] if the outbox is gone.
    pub fn send(&self, event: &str, args: Vec<Arg>) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Message(Message::new(event, args)))
            .map_err(|_| TransportError::ConnectionClosed(self.id.to_string()))
    }

    /// Asks the writer to close the connection once the queue drains.
    /// Does nothing if the connection is already gone.
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }

    /// Returns `true` once nothing can be delivered to the peer anymore.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    // -- Context ----------------------------------------------------------

    /// Stores `value` under `key`, replacing whatever was there.
    pub fn set_context<T: Any + Send + Sync>(&self, key: &str, value: T) {
        self.context.lock().insert(key.to_string(), Arc::new(value));
    }

    /// Returns the value under `key` if it exists and has type `T`.
    pub fn context<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.context.lock().get(key).cloned()?;
        value.downcast::<T>().ok()
    }

    /// Returns the value under `key`, inserting `init()` first if the
    /// key is absent or holds a different type.
    pub fn context_or_insert_with<T, F>(&self, key: &str, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let mut context = self.context.lock();
        if let Some(existing) = context.get(key).cloned() {
            if let Ok(value) = existing.downcast::<T>() {
                return value;
            }
        }
        let value = Arc::new(init());
        context.insert(key.to_string(), value.clone() as ContextValue);
        value
    }

    /// Removes the value under `key`. Returns `true` if there was one.
    pub fn remove_context(&self, key: &str) -> bool {
        self.context.lock().remove(key).is_some()
    }
}

impl fmt::Debug for Attendant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attendant")
            .field("id", &self.id)
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}
