//! # Warden
//!
//! Authentication middleware for connection-oriented message servers.
//!
//! Warden turns `login` / `logout` / `change-password` commands into
//! authenticated sessions and lets other protocols guard their commands
//! behind "must be logged in" or "must hold permission X". Underneath, a
//! session [`Domain`](warden_session::Domain) decides what a second login
//! of the same person does: coexist, get rejected, or evict the first.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use warden::prelude::*;
//!
//! # async fn run() -> Result<(), WardenError> {
//! let realm = MemoryRealm::new().with_user("alice", "alice1");
//! let auth = AuthProtocol::builder()
//!     .realm("main", Arc::new(realm))
//!     .rule(DomainRule::SingleGhosting)
//!     .build();
//!
//! let server = WardenServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .protocol(Arc::new(auth))
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

pub mod auth;
mod error;
mod handler;
pub mod protocol;
mod server;

pub use error::WardenError;
pub use server::{ServerConfig, WardenServer, WardenServerBuilder};

/// Everything needed to write a protocol on top of Warden.
pub mod prelude {
    pub use std::sync::Arc;

    pub use warden_session::{
        CanonicalIdentity, Credential, Domain, DomainRule, KeyValue, LandingContext,
        LandingCriterion, LandingDecision, MaxSessions, MemoryCredential, MemoryRealm, Realm,
        RealmError, RuleKind,
    };
    pub use warden_transport::{Attendant, ConnectionId, ServerId};
    pub use warden_wire::{Arg, Message};

    pub use crate::auth::{
        AuthError, AuthProtocol, AuthorizationRequirement, Fallbacks, LoginEvent, LogoutEvent,
        LogoutKind, LogoutStage, PasswordChangeEvent, Permission, Superuser,
    };
    pub use crate::protocol::{
        MessageHandler, MessageHandlers, Protocol, ProtocolStack, StopReason, handler,
    };
    pub use crate::{ServerConfig, WardenError, WardenServer};
}
