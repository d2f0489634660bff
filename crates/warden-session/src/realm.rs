//! The realm interface: where identifiers and secrets get verified.
//!
//! Warden doesn't store accounts or hash passwords. A [`Realm`] does
//! that and hands back a [`Credential`] on success. The session domain
//! only needs two things from a credential: something stable to
//! recognise the same person by, and a way to check permissions.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use warden_wire::Arg;

use crate::{KeyValue, RealmError};

/// A verified identity record returned by a realm.
///
/// Every method except [`as_any`](Credential::as_any) has a default.
/// Implement [`identification`](Credential::identification) whenever the
/// record has a stable id: without it, sessions are keyed by whatever
/// identifier the client typed at login, so `Alice` and `alice` count
/// as different people unless the realm normalises case.
pub trait Credential: Send + Sync + fmt::Debug + 'static {
    /// A stable, unique identification value (e.g. a normalised username).
    fn identification(&self) -> Option<KeyValue> {
        None
    }

    /// A lookup index (e.g. a database primary key). Used when there is
    /// no [`identification`](Credential::identification).
    fn index(&self) -> Option<KeyValue> {
        None
    }

    /// Whether this credential holds the named permission.
    fn has_permission(&self, _permission: &str) -> bool {
        false
    }

    /// Whether this credential bypasses permission checks.
    fn is_superuser(&self) -> bool {
        false
    }

    /// Downcasting hook so handlers can reach their concrete credential type.
    fn as_any(&self) -> &dyn Any;
}

/// Verifies logins and updates secrets.
///
/// Calls are synchronous: the auth handlers run them inline on the
/// connection's task. A realm backed by slow storage should keep its
/// own cache or pool.
pub trait Realm: Send + Sync + 'static {
    /// Checks `identifier` / `secret` and returns the matching credential.
    ///
    /// # Errors
    /// [`RealmError::Mismatch`] for unknown identifiers or wrong secrets;
    /// any other variant for realm-side faults.
    fn login(&self, identifier: &Arg, secret: &str) -> Result<Arc<dyn Credential>, RealmError>;

    /// Replaces the secret of a credential previously issued by this realm.
    fn set_password(&self, credential: &dyn Credential, secret: &str) -> Result<(), RealmError>;
}
