//! Identity keys and canonical identity handles.
//!
//! Two logins belong to the same person when they produce the same
//! [`QualifiedKey`]: the credential's key value plus the realm it came
//! from. The registry maps each live key to exactly one
//! [`CanonicalIdentity`], and all of that person's sessions hang off it.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use warden_wire::Arg;

use crate::{Credential, Realm};

/// A credential's identifying value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&Arg> for KeyValue {
    fn from(arg: &Arg) -> Self {
        match arg {
            Arg::Int(n) => Self::Int(*n),
            Arg::Str(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<&str> for KeyValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for KeyValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

/// A realm together with the name it was registered under.
///
/// Equality and hashing go by name only: two realm refs are the same
/// realm when they were registered under the same name.
#[derive(Clone)]
pub struct RealmRef {
    name: Arc<str>,
    realm: Arc<dyn Realm>,
}

impl RealmRef {
    pub fn new(name: impl Into<Arc<str>>, realm: Arc<dyn Realm>) -> Self {
        Self {
            name: name.into(),
            realm,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn realm(&self) -> &Arc<dyn Realm> {
        &self.realm
    }
}

impl PartialEq for RealmRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for RealmRef {}

impl Hash for RealmRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for RealmRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RealmRef").field(&self.name).finish()
    }
}

/// The key the registry unifies sessions under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedKey {
    key: KeyValue,
    realm: RealmRef,
}

impl QualifiedKey {
    pub fn new(key: impl Into<KeyValue>, realm: RealmRef) -> Self {
        Self {
            key: key.into(),
            realm,
        }
    }

    /// Derives the key for a successful login.
    ///
    /// Prefers the credential's identification, then its index, and
    /// falls back to the identifier the client supplied.
    pub fn derive(credential: &dyn Credential, identifier: &Arg, realm: RealmRef) -> Self {
        let key = credential
            .identification()
            .or_else(|| credential.index())
            .unwrap_or_else(|| KeyValue::from(identifier));
        Self { key, realm }
    }

    pub fn key(&self) -> &KeyValue {
        &self.key
    }

    pub fn realm(&self) -> &RealmRef {
        &self.realm
    }
}

impl fmt::Display for QualifiedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.key, self.realm.name())
    }
}

/// Opaque id of one identity lifecycle.
///
/// Once an identity's last session ends its id is retired; the next
/// login with the same key gets a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityId(u64);

impl IdentityId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id-{}", self.0)
    }
}

struct IdentityInner {
    id: IdentityId,
    key: QualifiedKey,
}

/// Handle to a unified identity. Cheap to clone; compares by id.
#[derive(Clone)]
pub struct CanonicalIdentity(Arc<IdentityInner>);

impl CanonicalIdentity {
    pub(crate) fn new(id: IdentityId, key: QualifiedKey) -> Self {
        Self(Arc::new(IdentityInner { id, key }))
    }

    pub fn id(&self) -> IdentityId {
        self.0.id
    }

    pub fn key(&self) -> &QualifiedKey {
        &self.0.key
    }

    pub fn realm(&self) -> &RealmRef {
        self.0.key.realm()
    }
}

impl PartialEq for CanonicalIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for CanonicalIdentity {}

impl Hash for CanonicalIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for CanonicalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanonicalIdentity")
            .field("id", &self.0.id)
            .field("key", &self.0.key)
            .finish()
    }
}

impl fmt::Display for CanonicalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0.key, self.0.id)
    }
}
