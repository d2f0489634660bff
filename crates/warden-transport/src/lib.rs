//! Transport layer for Warden.
//!
//! Provides the per-connection [`Attendant`] handle that every command
//! handler works with, the identifiers that key connections and server
//! instances, and a WebSocket listener that produces attendants.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket listener via `tokio-tungstenite`

mod attendant;
mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use attendant::{Attendant, Outbound, Outbox};
pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{Inbound, WebSocketListener};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique server IDs.
static NEXT_SERVER_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identity of one running server instance.
///
/// Session state is partitioned by this value, so one auth module can
/// serve several independent servers without their sessions mixing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerId(u64);

impl ServerId {
    /// Allocates a fresh, process-unique server id.
    pub fn next() -> Self {
        Self(NEXT_SERVER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates a `ServerId` from a raw `u64`.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "srv-{}", self.0)
    }
}
