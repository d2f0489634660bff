//! Codec trait and implementations for framing messages as bytes.
//!
//! The rest of Warden only handles [`Message`](crate::Message) values;
//! a [`Codec`] decides what those look like on a socket. [`JsonCodec`]
//! is the default and the only one shipped today.

use serde::{Serialize, de::DeserializeOwned};

use crate::WireError;

/// Encodes values to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because one codec instance is shared by the
/// accept loop and every per-connection reader and writer task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`WireError::Encode`] if the value can't be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, WireError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`WireError::Decode`] if the bytes are malformed or
    /// don't match the expected shape.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, WireError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// Behind the `json` feature (on by default).
///
/// ```rust
/// use warden_wire::{Codec, JsonCodec, Message};
///
/// let codec = JsonCodec;
/// let msg = Message::new("auth.login", vec!["alice".into(), "pw".into(), "main".into()]);
///
/// let bytes = codec.encode(&msg).unwrap();
/// let decoded: Message = codec.decode(&bytes).unwrap();
/// assert_eq!(msg, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(value).map_err(WireError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, WireError> {
        serde_json::from_slice(data).map_err(WireError::Decode)
    }
}
