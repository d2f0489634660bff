//! The per-connection session slot.
//!
//! Stored in the attendant's context. Holds the credential and identity
//! of the connection's session, and moves through
//!
//! ```text
//! Vacant ──attach──→ Active ──begin_close──→ Closing ──finish_close──→ Vacant
//! ```
//!
//! `begin_close` is the single gate for logging out: of two racing
//! logouts for the same connection (its own, and a ghosting from another
//! login) exactly one gets the session. `begin_close_if` is the same gate
//! for a logout aimed at one particular session, which must leave any
//! later session on the connection alone.

use std::sync::Arc;

use parking_lot::Mutex;
use warden_session::{CanonicalIdentity, Credential};

enum SlotState {
    Vacant,
    Active {
        credential: Arc<dyn Credential>,
        identity: CanonicalIdentity,
    },
    /// Logout in progress. The credential stays visible to `Before`
    /// subscribers and wrapped handlers until the session is removed.
    Closing { credential: Arc<dyn Credential> },
}

pub(crate) struct SessionSlot {
    state: Mutex<SlotState>,
}

impl SessionSlot {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Vacant),
        }
    }

    pub(crate) fn is_vacant(&self) -> bool {
        matches!(*self.state.lock(), SlotState::Vacant)
    }

    pub(crate) fn attach(&self, credential: Arc<dyn Credential>, identity: CanonicalIdentity) {
        *self.state.lock() = SlotState::Active {
            credential,
            identity,
        };
    }

    pub(crate) fn credential(&self) -> Option<Arc<dyn Credential>> {
        match &*self.state.lock() {
            SlotState::Vacant => None,
            SlotState::Active { credential, .. } | SlotState::Closing { credential } => {
                Some(Arc::clone(credential))
            }
        }
    }

    /// Credential and identity of an active session, read in one go.
    /// `None` while vacant or closing.
    pub(crate) fn active(&self) -> Option<(Arc<dyn Credential>, CanonicalIdentity)> {
        match &*self.state.lock() {
            SlotState::Active {
                credential,
                identity,
            } => Some((Arc::clone(credential), identity.clone())),
            _ => None,
        }
    }

    /// Moves `Active` to `Closing` and hands over the session.
    /// `None` in any other state.
    pub(crate) fn begin_close(&self) -> Option<(Arc<dyn Credential>, CanonicalIdentity)> {
        self.close_where(|_| true)
    }

    /// Like [`begin_close`](Self::begin_close), but only if the active
    /// session belongs to `expected`.
    pub(crate) fn begin_close_if(
        &self,
        expected: &CanonicalIdentity,
    ) -> Option<(Arc<dyn Credential>, CanonicalIdentity)> {
        self.close_where(|identity| identity == expected)
    }

    fn close_where(
        &self,
        accept: impl Fn(&CanonicalIdentity) -> bool,
    ) -> Option<(Arc<dyn Credential>, CanonicalIdentity)> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, SlotState::Vacant) {
            SlotState::Active {
                credential,
                identity,
            } if accept(&identity) => {
                *state = SlotState::Closing {
                    credential: Arc::clone(&credential),
                };
                Some((credential, identity))
            }
            other => {
                *state = other;
                None
            }
        }
    }

    pub(crate) fn finish_close(&self) {
        *self.state.lock() = SlotState::Vacant;
    }
}

#[cfg(test)]
mod tests {
    use warden_session::{Domain, MemoryCredential, MemoryRealm, QualifiedKey, RealmRef};
    use warden_transport::ServerId;

    use super::*;

    fn identity_of(name: &str) -> CanonicalIdentity {
        let realm = RealmRef::new("main", Arc::new(MemoryRealm::new()));
        Domain::default().unify(ServerId::new(1), &QualifiedKey::new(name, realm))
    }

    fn identity() -> CanonicalIdentity {
        identity_of("alice")
    }

    #[test]
    fn test_slot_lifecycle() {
        let slot = SessionSlot::new();
        assert!(slot.is_vacant());
        assert!(slot.credential().is_none());

        slot.attach(Arc::new(MemoryCredential::new("alice")), identity());
        assert!(slot.credential().is_some());
        assert!(slot.active().is_some());

        let (_, taken) = slot.begin_close().expect("active slot should close");
        assert_eq!(taken.key().to_string(), "alice@main");
        assert!(slot.credential().is_some());
        assert!(slot.active().is_none());
        assert!(!slot.is_vacant());

        slot.finish_close();
        assert!(slot.is_vacant());
    }

    #[test]
    fn test_begin_close_only_once() {
        let slot = SessionSlot::new();
        assert!(slot.begin_close().is_none());

        slot.attach(Arc::new(MemoryCredential::new("alice")), identity());

        assert!(slot.begin_close().is_some());
        assert!(slot.begin_close().is_none());
    }

    #[test]
    fn test_begin_close_if_other_identity_keeps_session() {
        let slot = SessionSlot::new();
        let alice = identity();
        let bob = identity_of("bob");
        slot.attach(Arc::new(MemoryCredential::new("bob")), bob.clone());

        assert!(slot.begin_close_if(&alice).is_none());
        assert_eq!(slot.active().map(|(_, identity)| identity), Some(bob.clone()));

        let (_, taken) = slot.begin_close_if(&bob).expect("matching session should close");
        assert_eq!(taken, bob);
        assert!(slot.active().is_none());
    }

    #[test]
    fn test_active_while_closing_is_none() {
        let slot = SessionSlot::new();
        slot.attach(Arc::new(MemoryCredential::new("alice")), identity());
        slot.begin_close();

        assert!(slot.active().is_none());
        assert!(slot.credential().is_some());
    }
}
