//! Error types for the wire layer.

/// Errors raised while turning messages into bytes and back.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes were not a valid message: malformed JSON, a missing
    /// `event` field, or a truncated frame.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded but is not acceptable, e.g. an empty event name.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
