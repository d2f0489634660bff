//! The per-server session registry.
//!
//! Tracks, for one server, which identities are logged in and through
//! which connections. Keeps two maps in sync:
//!
//! ```text
//! by_key:  QualifiedKey ──→ IdentityId
//! entries: IdentityId   ──→ { identity, sessions: ConnectionId ──→ Attendant }
//! ```
//!
//! An entry exists only while it has at least one session (or was just
//! unified and is about to get one). When the last session goes, both
//! map entries are dropped and the id is retired.
//!
//! # Concurrency note
//!
//! `Registry` is a plain struct. The [`Domain`](crate::Domain) wraps each
//! one in a mutex and performs every multi-step operation under a single
//! lock acquisition.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use warden_transport::{Attendant, ConnectionId};

use crate::{CanonicalIdentity, IdentityId, QualifiedKey, SessionError};

/// Counter for identity ids. Process-wide so ids never repeat across servers.
static NEXT_IDENTITY_ID: AtomicU64 = AtomicU64::new(1);

struct Entry {
    identity: CanonicalIdentity,
    sessions: HashMap<ConnectionId, Arc<Attendant>>,
}

#[derive(Default)]
pub(crate) struct Registry {
    by_key: HashMap<QualifiedKey, IdentityId>,
    entries: HashMap<IdentityId, Entry>,
    /// Set once the server's state has been handed off by
    /// [`retire`](Self::retire). A retired registry stays empty.
    retired: bool,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the live identity for `key`, if any.
    pub(crate) fn lookup(&self, key: &QualifiedKey) -> Option<&CanonicalIdentity> {
        let id = self.by_key.get(key)?;
        self.entries.get(id).map(|entry| &entry.identity)
    }

    /// Returns the identity for `key`, creating a fresh one if needed.
    pub(crate) fn unify(&mut self, key: &QualifiedKey) -> CanonicalIdentity {
        if let Some(identity) = self.lookup(key) {
            return identity.clone();
        }
        let id = IdentityId::new(NEXT_IDENTITY_ID.fetch_add(1, Ordering::Relaxed));
        let identity = CanonicalIdentity::new(id, key.clone());
        self.by_key.insert(key.clone(), id);
        self.entries.insert(
            id,
            Entry {
                identity: identity.clone(),
                sessions: HashMap::new(),
            },
        );
        tracing::debug!(%identity, "identity unified");
        identity
    }

    /// Adds a session under an identity obtained from [`unify`](Self::unify).
    ///
    /// If the identity was collected in the meantime and its key is still
    /// free, the identity is reinstated.
    ///
    /// # Errors
    /// [`SessionError::StaleIdentity`] if the key now belongs to a newer
    /// identity.
    pub(crate) fn add(
        &mut self,
        identity: &CanonicalIdentity,
        attendant: Arc<Attendant>,
    ) -> Result<(), SessionError> {
        match self.by_key.get(identity.key()) {
            Some(id) if *id != identity.id() => {
                return Err(SessionError::StaleIdentity(identity.id()));
            }
            Some(_) => {}
            None => {
                self.by_key.insert(identity.key().clone(), identity.id());
                self.entries.insert(
                    identity.id(),
                    Entry {
                        identity: identity.clone(),
                        sessions: HashMap::new(),
                    },
                );
            }
        }
        self.insert(identity, attendant);
        Ok(())
    }

    /// Inserts a session for an identity known to be current.
    pub(crate) fn insert(&mut self, identity: &CanonicalIdentity, attendant: Arc<Attendant>) {
        if let Some(entry) = self.entries.get_mut(&identity.id()) {
            entry.sessions.insert(attendant.id(), attendant);
        }
    }

    /// Removes one session. Drops the identity if that was its last one.
    ///
    /// Returns `false` if there was no such session.
    pub(crate) fn remove(&mut self, identity: &CanonicalIdentity, conn: ConnectionId) -> bool {
        let Some(entry) = self.entries.get_mut(&identity.id()) else {
            return false;
        };
        let removed = entry.sessions.remove(&conn).is_some();
        if removed && entry.sessions.is_empty() {
            self.collect(identity.id());
        }
        removed
    }

    /// Drops an identity that has no sessions. Returns `true` if it did.
    pub(crate) fn release(&mut self, identity: &CanonicalIdentity) -> bool {
        let empty = self
            .entries
            .get(&identity.id())
            .is_some_and(|entry| entry.sessions.is_empty());
        if empty {
            self.collect(identity.id());
        }
        empty
    }

    fn collect(&mut self, id: IdentityId) {
        if let Some(entry) = self.entries.remove(&id) {
            self.by_key.remove(entry.identity.key());
            tracing::debug!(identity = %entry.identity, "identity collected");
        }
    }

    /// Returns the sessions of `identity`. Empty for stale identities.
    pub(crate) fn sessions_of(&self, identity: &CanonicalIdentity) -> Vec<Arc<Attendant>> {
        self.entries
            .get(&identity.id())
            .map(|entry| entry.sessions.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns every `(identity, session)` pair, in no particular order.
    pub(crate) fn snapshot(&self) -> Vec<(CanonicalIdentity, Arc<Attendant>)> {
        self.entries
            .values()
            .flat_map(|entry| {
                entry
                    .sessions
                    .values()
                    .map(|attendant| (entry.identity.clone(), Arc::clone(attendant)))
            })
            .collect()
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired
    }

    /// Empties the registry for good and returns what it held.
    pub(crate) fn retire(&mut self) -> Vec<(CanonicalIdentity, Arc<Attendant>)> {
        let sessions = self.snapshot();
        self.by_key.clear();
        self.entries.clear();
        self.retired = true;
        sessions
    }

    pub(crate) fn session_count(&self) -> usize {
        self.entries.values().map(|entry| entry.sessions.len()).sum()
    }

    pub(crate) fn identity_count(&self) -> usize {
        self.entries.len()
    }
}
