//! Message handlers and the protocols that provide them.
//!
//! A [`Protocol`] contributes a table of named [`MessageHandler`]s plus
//! lifecycle hooks. A server runs a [`ProtocolStack`]: every protocol it
//! was given, together with their dependencies, flattened so that each
//! dependency comes before the protocols that need it.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use warden_transport::{Attendant, ServerId};
use warden_wire::Message;

use crate::WardenError;

/// Handles one command for one connection.
pub type MessageHandler = Arc<dyn Fn(ServerId, &Arc<Attendant>, &Message) + Send + Sync>;

/// Command name to handler.
pub type MessageHandlers = HashMap<String, MessageHandler>;

/// Boxes a closure as a [`MessageHandler`].
pub fn handler<F>(f: F) -> MessageHandler
where
    F: Fn(ServerId, &Arc<Attendant>, &Message) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Why a connection's handler loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The peer closed the connection.
    Closed,
    /// Nothing arrived within the idle timeout.
    TimedOut,
    /// The socket failed.
    Error(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("closed"),
            Self::TimedOut => f.write_str("timed out"),
            Self::Error(e) => write!(f, "error: {e}"),
        }
    }
}

/// A bundle of command handlers with lifecycle hooks.
///
/// Hooks default to doing nothing. They run synchronously on the task
/// that triggered them, so keep them short.
pub trait Protocol: Send + Sync + 'static {
    /// Protocols this one needs. They are set up first, and only once
    /// even if several protocols depend on them.
    fn dependencies(&self) -> Vec<Arc<dyn Protocol>> {
        Vec::new()
    }

    /// The commands this protocol answers.
    fn handlers(&self) -> MessageHandlers;

    fn started(&self, _server: ServerId, _addr: SocketAddr) {}

    fn attendant_started(&self, _server: ServerId, _attendant: &Arc<Attendant>) {}

    fn attendant_stopped(
        &self,
        _server: ServerId,
        _attendant: &Arc<Attendant>,
        _reason: &StopReason,
    ) {
    }

    fn stopped(&self, _server: ServerId) {}
}

/// A flattened, deduplicated set of protocols and their merged handlers.
pub struct ProtocolStack {
    protocols: Vec<Arc<dyn Protocol>>,
    handlers: MessageHandlers,
}

impl ProtocolStack {
    /// Flattens `roots` dependency-first and merges their handler tables.
    ///
    /// A protocol reachable through several paths is included once
    /// (compared by pointer). Dependency cycles are cut at the first
    /// repeated protocol.
    ///
    /// # Errors
    /// [`WardenError::DuplicateHandler`] if two distinct protocols
    /// register the same command.
    pub fn new(roots: Vec<Arc<dyn Protocol>>) -> Result<Self, WardenError> {
        let mut protocols = Vec::new();
        let mut seen = Vec::new();
        for root in roots {
            flatten(root, &mut seen, &mut protocols);
        }

        let mut handlers = MessageHandlers::new();
        for protocol in &protocols {
            for (command, handler) in protocol.handlers() {
                if handlers.contains_key(&command) {
                    return Err(WardenError::DuplicateHandler(command));
                }
                handlers.insert(command, handler);
            }
        }

        Ok(Self {
            protocols,
            handlers,
        })
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    /// Returns `true` if some protocol answers `command`.
    pub fn handles(&self, command: &str) -> bool {
        self.handlers.contains_key(command)
    }

    /// Runs the handler for `message.event`. Returns `false` if none exists.
    pub fn dispatch(
        &self,
        server: ServerId,
        attendant: &Arc<Attendant>,
        message: &Message,
    ) -> bool {
        match self.handlers.get(&message.event) {
            Some(handler) => {
                handler(server, attendant, message);
                true
            }
            None => false,
        }
    }

    pub fn started(&self, server: ServerId, addr: SocketAddr) {
        for protocol in &self.protocols {
            protocol.started(server, addr);
        }
    }

    pub fn attendant_started(&self, server: ServerId, attendant: &Arc<Attendant>) {
        for protocol in &self.protocols {
            protocol.attendant_started(server, attendant);
        }
    }

    /// Runs in reverse order, so dependents see the connection before
    /// their dependencies tear it down.
    pub fn attendant_stopped(
        &self,
        server: ServerId,
        attendant: &Arc<Attendant>,
        reason: &StopReason,
    ) {
        for protocol in self.protocols.iter().rev() {
            protocol.attendant_stopped(server, attendant, reason);
        }
    }

    pub fn stopped(&self, server: ServerId) {
        for protocol in self.protocols.iter().rev() {
            protocol.stopped(server);
        }
    }
}

fn flatten(
    protocol: Arc<dyn Protocol>,
    seen: &mut Vec<*const ()>,
    out: &mut Vec<Arc<dyn Protocol>>,
) {
    let addr = Arc::as_ptr(&protocol) as *const ();
    if seen.contains(&addr) {
        return;
    }
    seen.push(addr);
    for dependency in protocol.dependencies() {
        flatten(dependency, seen, out);
    }
    out.push(protocol);
}
