//! Error types for the session layer.

use crate::IdentityId;

/// Errors raised by the session domain itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The identity handle was garbage-collected and its key has since
    /// been unified to a newer handle. Callers must unify again.
    #[error("identity {0} is stale")]
    StaleIdentity(IdentityId),
}

/// Errors a [`Realm`](crate::Realm) reports.
///
/// Only [`RealmError::Mismatch`] means "wrong identifier or secret";
/// every other variant is a realm-side fault as far as clients are told.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RealmError {
    /// Unknown identifier or wrong secret. Deliberately not told apart.
    #[error("login failed")]
    Mismatch,

    /// The account exists but may not log in.
    #[error("account is inactive")]
    Inactive,

    /// The realm was handed a credential it did not issue.
    #[error("credential not supported by this realm")]
    Unsupported,

    /// Anything else: storage errors, bad identifier types, and so on.
    #[error("realm failure: {0}")]
    Internal(String),
}
