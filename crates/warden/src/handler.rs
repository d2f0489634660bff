//! Per-connection handler: read, decode, dispatch.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Fire `attendant_started` on every protocol
//!   2. Loop: receive a frame → decode a `Message` → dispatch by event name
//!   3. On close, idle timeout or error: fire `attendant_stopped`
//!
//! Handlers run inline on this task. A connection's messages are handled
//! strictly one after another.

use std::sync::Arc;

use warden_transport::{Attendant, Inbound};
use warden_wire::{Codec, Message};

use crate::protocol::StopReason;
use crate::server::ServerState;

/// Drop guard that fires `attendant_stopped` when the handler exits.
///
/// Covers a panicking message handler too, so the auth protocol still
/// logs the connection out and nothing stays registered.
struct StopGuard {
    attendant: Arc<Attendant>,
    state: Arc<ServerState>,
    reason: StopReason,
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        let server = self.state.id;
        tracing::debug!(
            %server,
            conn_id = %self.attendant.id(),
            reason = %self.reason,
            "connection ended"
        );
        self.state
            .stack
            .attendant_stopped(server, &self.attendant, &self.reason);
        self.attendant.close();
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    attendant: Arc<Attendant>,
    mut inbound: Inbound,
    state: Arc<ServerState>,
) {
    let server = state.id;
    let conn_id = attendant.id();
    tracing::debug!(%server, %conn_id, "handling new connection");

    state.stack.attendant_started(server, &attendant);
    let mut guard = StopGuard {
        attendant: Arc::clone(&attendant),
        state: Arc::clone(&state),
        reason: StopReason::Error("handler panicked".into()),
    };

    guard.reason = loop {
        let data = match tokio::time::timeout(state.idle_timeout, inbound.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => break StopReason::Closed,
            Ok(Err(e)) => break StopReason::Error(e.to_string()),
            Err(_) => break StopReason::TimedOut,
        };

        let message: Message = match state.codec.decode(&data) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(%server, %conn_id, error = %e, "failed to decode message");
                let _ = attendant.send("invalid", vec!["".into(), e.to_string().into()]);
                continue;
            }
        };

        if !state.stack.dispatch(server, &attendant, &message) {
            tracing::debug!(%server, %conn_id, event = %message.event, "no handler for event");
        }
    };
    // guard drops here → attendant_stopped fires.
}
