//! Message model for Warden.
//!
//! Everything that travels between a client and a Warden server is an
//! `(event, positional args)` tuple:
//!
//! - **Types** ([`Message`], [`Arg`]): the tuple and its dynamically
//!   typed arguments.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how a tuple becomes bytes.
//! - **Errors** ([`WireError`]).
//!
//! ```text
//! Transport (bytes) → Wire (Message) → Handlers (commands)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::WireError;
pub use types::{Arg, Message};
