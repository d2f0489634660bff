//! The session domain: every server's registry plus the landing rule.
//!
//! One [`Domain`] serves any number of servers. Each server gets its own
//! registry behind its own mutex, so logins on different servers never
//! contend and a server's state can be dropped wholesale when it stops.
//!
//! Every operation takes the server's lock exactly once. In particular
//! [`Domain::land`] checks the rule, inserts the session and runs the
//! caller's `attach` step in a single critical section, so two racing
//! logins for the same identity can't both pass a `SingleLocking` check.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use parking_lot::Mutex;
use warden_transport::{Attendant, ConnectionId, ServerId};

use crate::registry::Registry;
use crate::{
    CanonicalIdentity, Credential, DomainRule, LandingContext, LandingDecision, QualifiedKey,
    SessionError,
};

/// A login waiting for a landing decision.
pub struct LandingRequest<'a> {
    pub credential: &'a dyn Credential,
    pub key: QualifiedKey,
    pub attendant: &'a Arc<Attendant>,
}

/// An existing session the landing rule wants logged out.
///
/// Carries the identity the session was registered under when the rule
/// ran, so the logout can be skipped if the connection has moved on to
/// another session by the time it happens.
#[derive(Debug, Clone)]
pub struct Ghost {
    pub attendant: Arc<Attendant>,
    pub identity: CanonicalIdentity,
}

/// Result of [`Domain::land`].
#[derive(Debug)]
pub enum Landing {
    /// The session was added under `identity`.
    Accepted {
        identity: CanonicalIdentity,
        ghosts: Vec<Ghost>,
    },
    /// Nothing was added.
    Rejected { ghosts: Vec<Ghost> },
}

impl Landing {
    /// Existing sessions the rule wants logged out. The caller does that.
    pub fn ghosts(&self) -> &[Ghost] {
        match self {
            Self::Accepted { ghosts, .. } | Self::Rejected { ghosts } => ghosts,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Session state for all servers, under one landing rule.
pub struct Domain {
    rule: DomainRule,
    servers: Mutex<HashMap<ServerId, Arc<Mutex<Registry>>>>,
}

impl Domain {
    pub fn new(rule: DomainRule) -> Self {
        Self {
            rule,
            servers: Mutex::new(HashMap::new()),
        }
    }

    pub fn rule(&self) -> &DomainRule {
        &self.rule
    }

    fn registry(&self, server: ServerId) -> Arc<Mutex<Registry>> {
        let mut servers = self.servers.lock();
        Arc::clone(
            servers
                .entry(server)
                .or_insert_with(|| Arc::new(Mutex::new(Registry::new()))),
        )
    }

    fn existing_registry(&self, server: ServerId) -> Option<Arc<Mutex<Registry>>> {
        self.servers.lock().get(&server).cloned()
    }

    /// Runs `f` on the live registry of `server` under its lock.
    ///
    /// A registry retired by a concurrent [`forget_server`](Self::forget_server)
    /// is no longer in the map, so the retry locks the fresh one.
    fn with_registry<R>(&self, server: ServerId, f: impl FnOnce(&mut Registry) -> R) -> R {
        loop {
            let registry = self.registry(server);
            let mut registry = registry.lock();
            if !registry.is_retired() {
                return f(&mut registry);
            }
        }
    }

    /// Returns the identity for `key` on `server`, creating it if needed.
    ///
    /// A freshly unified identity has no sessions. Pair every call with
    /// [`add_session`](Self::add_session), or hand the identity back with
    /// [`release`](Self::release) if the session never materializes;
    /// otherwise the entry stays until the server is forgotten.
    /// [`land`](Self::land) does both steps itself and is the usual way in.
    #[must_use = "an unused identity stays registered until released"]
    pub fn unify(&self, server: ServerId, key: &QualifiedKey) -> CanonicalIdentity {
        self.with_registry(server, |registry| registry.unify(key))
    }

    /// Drops `identity` if it has no sessions. Returns `true` if it did.
    pub fn release(&self, server: ServerId, identity: &CanonicalIdentity) -> bool {
        self.existing_registry(server)
            .is_some_and(|registry| registry.lock().release(identity))
    }

    /// Adds a session for `identity`.
    ///
    /// # Errors
    /// [`SessionError::StaleIdentity`] if `identity` was collected and
    /// its key unified again since.
    pub fn add_session(
        &self,
        server: ServerId,
        identity: &CanonicalIdentity,
        attendant: Arc<Attendant>,
    ) -> Result<(), SessionError> {
        self.with_registry(server, |registry| registry.add(identity, attendant))
    }

    /// Removes a session, collecting the identity if it was the last one.
    ///
    /// Returns `false`, and changes nothing, if there was no such session.
    pub fn remove_session(
        &self,
        server: ServerId,
        identity: &CanonicalIdentity,
        conn: ConnectionId,
    ) -> bool {
        let Some(registry) = self.existing_registry(server) else {
            return false;
        };
        let removed = registry.lock().remove(identity, conn);
        if removed {
            tracing::debug!(%server, %identity, %conn, "session removed");
        }
        removed
    }

    pub fn sessions_of(
        &self,
        server: ServerId,
        identity: &CanonicalIdentity,
    ) -> Vec<Arc<Attendant>> {
        self.existing_registry(server)
            .map(|registry| registry.lock().sessions_of(identity))
            .unwrap_or_default()
    }

    /// Visits every `(identity, session)` pair on `server` until the
    /// visitor breaks.
    ///
    /// Works on a snapshot, so the visitor may call back into the domain.
    pub fn enumerate<F>(&self, server: ServerId, mut visitor: F)
    where
        F: FnMut(&CanonicalIdentity, &Arc<Attendant>) -> ControlFlow<()>,
    {
        let Some(registry) = self.existing_registry(server) else {
            return;
        };
        let snapshot = registry.lock().snapshot();
        for (identity, attendant) in &snapshot {
            if visitor(identity, attendant).is_break() {
                break;
            }
        }
    }

    /// Evaluates the landing rule without changing anything.
    pub fn check_landing(
        &self,
        server: ServerId,
        credential: &dyn Credential,
        key: &QualifiedKey,
        requesting: &Arc<Attendant>,
    ) -> LandingDecision {
        let existing = self
            .existing_registry(server)
            .map(|registry| {
                let registry = registry.lock();
                registry
                    .lookup(key)
                    .map(|identity| registry.sessions_of(identity))
                    .unwrap_or_default()
            })
            .unwrap_or_default();
        self.rule.check_landing(&LandingContext {
            server,
            credential,
            key,
            requesting,
            existing: &existing,
        })
    }

    /// Checks the rule and, if it allows, adds the session, all under one
    /// lock.
    ///
    /// `attach` runs inside that critical section once the session is in,
    /// so the caller can publish its own per-connection state before any
    /// other login on this server observes the new session. It must not
    /// call back into the domain.
    ///
    /// Ghosts are returned, not logged out: the caller runs its normal
    /// logout sequence for each of them after this returns.
    pub fn land<F>(&self, server: ServerId, request: LandingRequest<'_>, attach: F) -> Landing
    where
        F: FnOnce(&CanonicalIdentity),
    {
        self.with_registry(server, |registry| {
            let current = registry.lookup(&request.key).cloned();
            let existing = current
                .as_ref()
                .map(|identity| registry.sessions_of(identity))
                .unwrap_or_default();
            let decision = self.rule.check_landing(&LandingContext {
                server,
                credential: request.credential,
                key: &request.key,
                requesting: request.attendant,
                existing: &existing,
            });
            let ghosts: Vec<Ghost> = match &current {
                Some(identity) => existing
                    .into_iter()
                    .filter(|attendant| decision.ghost.contains(&attendant.id()))
                    .map(|attendant| Ghost {
                        attendant,
                        identity: identity.clone(),
                    })
                    .collect(),
                None => Vec::new(),
            };

            if decision.reject {
                tracing::info!(
                    %server,
                    key = %request.key,
                    conn = %request.attendant.id(),
                    ghosts = ghosts.len(),
                    "landing rejected"
                );
                return Landing::Rejected { ghosts };
            }

            let identity = registry.unify(&request.key);
            registry.insert(&identity, Arc::clone(request.attendant));
            attach(&identity);
            tracing::debug!(
                %server,
                %identity,
                conn = %request.attendant.id(),
                ghosts = ghosts.len(),
                "landing accepted"
            );
            Landing::Accepted { identity, ghosts }
        })
    }

    /// Drops all session state of `server` and returns the sessions it held.
    ///
    /// Attendants are not notified here. The caller owns the returned
    /// sessions and is expected to log each one out. A login racing with
    /// this call either lands in the old registry, and is returned, or in
    /// a fresh one.
    pub fn forget_server(&self, server: ServerId) -> Vec<(CanonicalIdentity, Arc<Attendant>)> {
        let Some(registry) = self.servers.lock().remove(&server) else {
            return Vec::new();
        };
        let sessions = registry.lock().retire();
        tracing::debug!(%server, sessions = sessions.len(), "server sessions forgotten");
        sessions
    }

    pub fn session_count(&self, server: ServerId) -> usize {
        self.existing_registry(server)
            .map(|registry| registry.lock().session_count())
            .unwrap_or(0)
    }

    pub fn identity_count(&self, server: ServerId) -> usize {
        self.existing_registry(server)
            .map(|registry| registry.lock().identity_count())
            .unwrap_or(0)
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self::new(DomainRule::default())
    }
}

impl std::fmt::Debug for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Domain")
            .field("rule", &self.rule)
            .field("servers", &self.servers.lock().len())
            .finish()
    }
}
