//! Session domain for Warden.
//!
//! This crate knows who is logged in where:
//!
//! 1. **Realms**: verifying identifiers and secrets ([`Realm`] trait)
//! 2. **Identity unification**: mapping every login of the same person
//!    to one [`CanonicalIdentity`] per server
//! 3. **Session registry**: tracking each identity's live connections
//! 4. **Landing policy**: deciding what a repeated login does
//!    ([`DomainRule`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Auth protocol (above)  ← login/logout commands, events, authorization
//!     ↕
//! Session layer (this crate)  ← identities, sessions, landing rules
//!     ↕
//! Transport layer (below)  ← Attendant, ConnectionId, ServerId
//! ```

mod domain;
mod error;
mod identity;
mod landing;
mod memory;
mod realm;
mod registry;

pub use domain::{Domain, Ghost, Landing, LandingRequest};
pub use error::{RealmError, SessionError};
pub use identity::{CanonicalIdentity, IdentityId, KeyValue, QualifiedKey, RealmRef};
pub use landing::{
    DomainRule, LandingContext, LandingCriterion, LandingDecision, MaxSessions, RuleKind,
};
pub use memory::{MemoryCredential, MemoryRealm};
pub use realm::{Credential, Realm};
