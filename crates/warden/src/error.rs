//! Unified error type for the Warden framework.

use warden_session::SessionError;
use warden_transport::TransportError;
use warden_wire::WireError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A wire-level error (encode, decode, invalid message).
    #[error(transparent)]
    Wire(#[from] WireError),

    /// A session-domain error.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Two protocols registered a handler for the same command.
    #[error("command {0:?} is handled by more than one protocol")]
    DuplicateHandler(String),
}
