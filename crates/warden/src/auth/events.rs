//! Audit events and the buses that deliver them.
//!
//! Every login attempt, logout and password change is published to
//! subscribers. A subscriber that returns an error or panics is skipped;
//! the rest still get the event and the auth flow carries on. The bus
//! reports how many subscribers failed and nothing more.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use warden_session::Credential;
use warden_transport::{Attendant, ServerId};
use warden_wire::Arg;

use super::AuthError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Subscriber<E> = Arc<dyn Fn(&E) -> Result<(), BoxError> + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A list of subscribers for one event type.
///
/// Subscribing and unsubscribing are safe while an event is being
/// emitted; an emission delivers to the subscribers present when it
/// started.
pub struct EventBus<E> {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriptionId, Subscriber<E>)>>,
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, subscriber: F) -> SubscriptionId
    where
        F: Fn(&E) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, Arc::new(subscriber)));
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    /// Delivers `event` to every subscriber in subscription order.
    ///
    /// Returns the number of subscribers that failed or panicked.
    pub fn emit(&self, event: &E) -> usize {
        let subscribers: Vec<Subscriber<E>> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, s)| Arc::clone(s))
            .collect();
        subscribers
            .iter()
            .filter(|subscriber| {
                let outcome = catch_unwind(AssertUnwindSafe(|| subscriber(event)));
                !matches!(outcome, Ok(Ok(())))
            })
            .count()
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.len())
            .finish()
    }
}

/// A login attempt, successful or not. Never carries the secret.
#[derive(Debug)]
pub struct LoginEvent {
    pub server: ServerId,
    pub attendant: Arc<Attendant>,
    pub identifier: Arg,
    pub realm: String,
    /// Present when the realm accepted the secret, even if the landing
    /// rule then rejected the login.
    pub credential: Option<Arc<dyn Credential>>,
    pub error: Option<AuthError>,
}

impl LoginEvent {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutStage {
    /// The session is still registered.
    Before,
    /// The session is gone.
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutKind {
    Graceful,
    Ghosted,
}

impl LogoutKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Graceful => "graceful",
            Self::Ghosted => "ghosted",
        }
    }
}

impl fmt::Display for LogoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stage of a logout. Each logout emits `Before` then `After`.
#[derive(Debug)]
pub struct LogoutEvent {
    pub server: ServerId,
    pub attendant: Arc<Attendant>,
    pub credential: Arc<dyn Credential>,
    pub stage: LogoutStage,
    pub kind: LogoutKind,
    pub reason: String,
}

/// A password change attempt. Never carries the new secret.
#[derive(Debug)]
pub struct PasswordChangeEvent {
    pub server: ServerId,
    pub attendant: Arc<Attendant>,
    pub credential: Arc<dyn Credential>,
    pub error: Option<AuthError>,
}
