//! The authorization wrapper.
//!
//! Wraps any [`MessageHandler`] so it only runs for a logged-in
//! connection whose credential satisfies an optional requirement.

use std::sync::Arc;

use super::{AuthCore, AuthProtocol, AuthorizationRequirement};
use crate::protocol::{MessageHandler, MessageHandlers, handler};

/// Per-wrap overrides for the not-logged-in and permission-denied
/// responses. Unset fields use the protocol's defaults.
#[derive(Clone, Default)]
pub struct Fallbacks {
    pub not_logged_in: Option<MessageHandler>,
    pub permission_denied: Option<MessageHandler>,
}

impl Fallbacks {
    pub fn not_logged_in(mut self, handler: MessageHandler) -> Self {
        self.not_logged_in = Some(handler);
        self
    }

    pub fn permission_denied(mut self, handler: MessageHandler) -> Self {
        self.permission_denied = Some(handler);
        self
    }
}

impl AuthCore {
    fn wrap(
        self: &Arc<Self>,
        requirement: Option<Arc<dyn AuthorizationRequirement>>,
        inner: MessageHandler,
        fallbacks: &Fallbacks,
    ) -> MessageHandler {
        let not_logged_in = fallbacks
            .not_logged_in
            .clone()
            .unwrap_or_else(|| Arc::clone(&self.not_logged_in));
        let permission_denied = fallbacks
            .permission_denied
            .clone()
            .unwrap_or_else(|| Arc::clone(&self.permission_denied));
        let core = Arc::clone(self);

        handler(move |server, attendant, message| {
            let Some(credential) = core.current(attendant) else {
                not_logged_in(server, attendant, message);
                return;
            };
            match &requirement {
                Some(req) if !req.satisfied_by(credential.as_ref()) => {
                    permission_denied(server, attendant, message);
                }
                _ => inner(server, attendant, message),
            }
        })
    }
}

impl AuthProtocol {
    /// Wraps `handler` so it runs only for logged-in connections that
    /// satisfy `requirement` (if given).
    pub fn require_authorization(
        &self,
        requirement: Option<Arc<dyn AuthorizationRequirement>>,
        handler: MessageHandler,
        fallbacks: Fallbacks,
    ) -> MessageHandler {
        self.core.wrap(requirement, handler, &fallbacks)
    }

    /// Wraps the handlers whose command name passes `only`. The rest are
    /// returned unchanged.
    pub fn require_authorization_where<P>(
        &self,
        requirement: Option<Arc<dyn AuthorizationRequirement>>,
        handlers: MessageHandlers,
        only: P,
        fallbacks: Fallbacks,
    ) -> MessageHandlers
    where
        P: Fn(&str) -> bool,
    {
        handlers
            .into_iter()
            .map(|(command, handler)| {
                let handler = if only(&command) {
                    self.core.wrap(requirement.clone(), handler, &fallbacks)
                } else {
                    handler
                };
                (command, handler)
            })
            .collect()
    }

    /// Wraps every handler in `handlers`.
    pub fn require_authorization_all(
        &self,
        requirement: Option<Arc<dyn AuthorizationRequirement>>,
        handlers: MessageHandlers,
        fallbacks: Fallbacks,
    ) -> MessageHandlers {
        self.require_authorization_where(requirement, handlers, |_| true, fallbacks)
    }
}
