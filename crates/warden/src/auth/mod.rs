//! The auth protocol: login, logout and change-password commands on top
//! of a session [`Domain`], plus the authorization wrapper other
//! protocols use to guard their own commands.
//!
//! # Commands
//!
//! With the default namespace `auth` every command and response is
//! prefixed with `auth.`; an empty namespace drops the prefix.
//!
//! | Request                            | Responses                                   |
//! |------------------------------------|---------------------------------------------|
//! | `login(identifier, secret, realm)` | `login.success`, `login.error(msg)`,        |
//! |                                    | `login.rejected`, `invalid(cmd, detail)`    |
//! | `logout()`                         | `logout.success(kind, reason)`              |
//! | `change-password(secret)`          | `change-password.success`,                  |
//! |                                    | `change-password.error`                     |
//!
//! Guarded commands answer `login-required` or `permission-denied`
//! (no arguments) unless other fallbacks are configured.

mod authorize;
mod commands;
mod error;
mod events;
mod requirement;
mod slot;

pub use authorize::Fallbacks;
pub use error::AuthError;
pub use events::{
    BoxError, EventBus, LoginEvent, LogoutEvent, LogoutKind, LogoutStage, PasswordChangeEvent,
    SubscriptionId,
};
pub use requirement::{AllOf, AnyOf, AuthorizationRequirement, Not, Permission, Superuser};

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use warden_session::{
    Credential, Domain, DomainRule, LandingCriterion, Realm, RealmRef, RuleKind,
};
use warden_transport::{Attendant, ServerId};

use crate::protocol::{MessageHandler, MessageHandlers, Protocol, StopReason, handler};
use slot::SessionSlot;

/// Shared state behind [`AuthProtocol`]; captured by every handler it hands out.
pub(crate) struct AuthCore {
    /// `"auth."`, or `""` for the empty namespace.
    prefix: String,
    /// Attendant context key of the session slot.
    slot_key: String,
    realms: HashMap<String, RealmRef>,
    domain: Domain,
    not_logged_in: MessageHandler,
    permission_denied: MessageHandler,
    login_events: EventBus<LoginEvent>,
    logout_events: EventBus<LogoutEvent>,
    password_events: EventBus<PasswordChangeEvent>,
}

impl AuthCore {
    /// Full event name for `name`, e.g. `"auth.login.success"`.
    fn event(&self, name: &str) -> String {
        format!("{}{name}", self.prefix)
    }

    fn slot(&self, attendant: &Attendant) -> Arc<SessionSlot> {
        attendant.context_or_insert_with(&self.slot_key, SessionSlot::new)
    }

    fn existing_slot(&self, attendant: &Attendant) -> Option<Arc<SessionSlot>> {
        attendant.context::<SessionSlot>(&self.slot_key)
    }

    fn current(&self, attendant: &Attendant) -> Option<Arc<dyn Credential>> {
        self.existing_slot(attendant)?.credential()
    }

    /// Sends `invalid(command, detail)`.
    fn invalid(&self, attendant: &Attendant, command: &str, detail: &str) {
        let _ = attendant.send(&self.event("invalid"), vec![command.into(), detail.into()]);
    }
}

/// Authentication protocol. Wrap it in an `Arc` to hand it to a server
/// or to list it as another protocol's dependency.
pub struct AuthProtocol {
    core: Arc<AuthCore>,
}

impl AuthProtocol {
    pub fn builder() -> AuthProtocolBuilder {
        AuthProtocolBuilder::new()
    }

    /// The response/command prefix, e.g. `"auth."`.
    pub fn prefix(&self) -> &str {
        &self.core.prefix
    }

    /// The credential logged in on `attendant`, if any.
    pub fn current(&self, attendant: &Attendant) -> Option<Arc<dyn Credential>> {
        self.core.current(attendant)
    }

    pub fn realms_count(&self) -> usize {
        self.core.realms.len()
    }

    pub fn domain_rule(&self) -> RuleKind {
        self.core.domain.rule().kind()
    }

    pub fn domain(&self) -> &Domain {
        &self.core.domain
    }

    pub fn on_login(&self) -> &EventBus<LoginEvent> {
        &self.core.login_events
    }

    pub fn on_logout(&self) -> &EventBus<LogoutEvent> {
        &self.core.logout_events
    }

    pub fn on_password_change(&self) -> &EventBus<PasswordChangeEvent> {
        &self.core.password_events
    }

    /// Logs `attendant` out, if it is logged in.
    ///
    /// Returns `false` and does nothing otherwise, so calling it twice is
    /// harmless.
    pub fn logout(
        &self,
        server: ServerId,
        attendant: &Arc<Attendant>,
        kind: LogoutKind,
        reason: &str,
    ) -> bool {
        self.core.logout(server, attendant, kind, reason)
    }
}

impl Protocol for AuthProtocol {
    fn handlers(&self) -> MessageHandlers {
        let login = {
            let core = Arc::clone(&self.core);
            handler(move |server, attendant, message| core.login(server, attendant, message))
        };
        let logout = {
            let core = Arc::clone(&self.core);
            handler(move |server, attendant, _| {
                core.logout(server, attendant, LogoutKind::Graceful, "");
            })
        };
        let change_password = {
            let core = Arc::clone(&self.core);
            handler(move |server, attendant, message| {
                core.change_password(server, attendant, message)
            })
        };

        let mut handlers = MessageHandlers::new();
        handlers.insert(self.core.event("login"), login);
        handlers.insert(
            self.core.event("logout"),
            self.require_authorization(None, logout, Fallbacks::default()),
        );
        handlers.insert(
            self.core.event("change-password"),
            self.require_authorization(None, change_password, Fallbacks::default()),
        );
        handlers
    }

    fn started(&self, server: ServerId, addr: SocketAddr) {
        tracing::info!(
            %server,
            %addr,
            rule = ?self.core.domain.rule(),
            realms = self.core.realms.len(),
            "auth protocol started"
        );
    }

    fn attendant_stopped(
        &self,
        server: ServerId,
        attendant: &Arc<Attendant>,
        _reason: &StopReason,
    ) {
        self.core
            .logout(server, attendant, LogoutKind::Graceful, "connection closed");
    }

    /// Logs out every session the server still holds. Connections may
    /// outlive the accept loop, so each one is told.
    fn stopped(&self, server: ServerId) {
        let sessions = self.core.domain.forget_server(server);
        tracing::info!(%server, sessions = sessions.len(), "logging out remaining sessions");
        for (identity, attendant) in sessions {
            self.core.logout_if(
                server,
                &attendant,
                &identity,
                LogoutKind::Graceful,
                "server stopped",
            );
        }
    }
}

impl std::fmt::Debug for AuthProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthProtocol")
            .field("prefix", &self.core.prefix)
            .field("realms", &self.core.realms.keys().collect::<Vec<_>>())
            .field("domain", &self.core.domain)
            .finish_non_exhaustive()
    }
}

/// Builder for [`AuthProtocol`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use warden::auth::AuthProtocol;
/// use warden_session::{DomainRule, MemoryRealm};
///
/// let auth = AuthProtocol::builder()
///     .realm("main", Arc::new(MemoryRealm::new().with_user("alice", "alice1")))
///     .namespace("my-auth")
///     .rule(DomainRule::SingleGhosting)
///     .build();
/// assert_eq!(auth.prefix(), "my-auth.");
/// ```
pub struct AuthProtocolBuilder {
    realms: HashMap<String, Arc<dyn Realm>>,
    namespace: String,
    rule: DomainRule,
    not_logged_in: Option<MessageHandler>,
    permission_denied: Option<MessageHandler>,
}

impl AuthProtocolBuilder {
    /// Defaults: no realms, namespace `"auth"`, rule `SingleLocking`.
    pub fn new() -> Self {
        Self {
            realms: HashMap::new(),
            namespace: "auth".to_string(),
            rule: DomainRule::default(),
            not_logged_in: None,
            permission_denied: None,
        }
    }

    /// Registers a realm under `name`, the value clients pass at login.
    pub fn realm(mut self, name: &str, realm: Arc<dyn Realm>) -> Self {
        self.realms.insert(name.to_string(), realm);
        self
    }

    /// Command namespace. `""` means unprefixed command names.
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn rule(mut self, rule: DomainRule) -> Self {
        self.rule = rule;
        self
    }

    /// Shorthand for `rule(DomainRule::custom(criterion))`.
    pub fn custom_rule(self, criterion: impl LandingCriterion) -> Self {
        self.rule(DomainRule::custom(criterion))
    }

    /// Replaces the default `login-required` response.
    pub fn not_logged_in(mut self, handler: MessageHandler) -> Self {
        self.not_logged_in = Some(handler);
        self
    }

    /// Replaces the default `permission-denied` response.
    pub fn permission_denied(mut self, handler: MessageHandler) -> Self {
        self.permission_denied = Some(handler);
        self
    }

    pub fn build(self) -> AuthProtocol {
        let prefix = if self.namespace.is_empty() {
            String::new()
        } else {
            format!("{}.", self.namespace)
        };
        let not_logged_in = self
            .not_logged_in
            .unwrap_or_else(|| notice(format!("{prefix}login-required")));
        let permission_denied = self
            .permission_denied
            .unwrap_or_else(|| notice(format!("{prefix}permission-denied")));
        let realms = self
            .realms
            .into_iter()
            .map(|(name, realm)| {
                let realm_ref = RealmRef::new(name.as_str(), realm);
                (name, realm_ref)
            })
            .collect();

        AuthProtocol {
            core: Arc::new(AuthCore {
                slot_key: format!("{prefix}session"),
                prefix,
                realms,
                domain: Domain::new(self.rule),
                not_logged_in,
                permission_denied,
                login_events: EventBus::new(),
                logout_events: EventBus::new(),
                password_events: EventBus::new(),
            }),
        }
    }
}

impl Default for AuthProtocolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A handler that sends `event` with no arguments.
fn notice(event: String) -> MessageHandler {
    handler(move |_, attendant, _| {
        let _ = attendant.send(&event, Vec::new());
    })
}
