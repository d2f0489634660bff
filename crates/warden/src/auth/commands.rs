//! Command handlers: login, logout and change-password.

use std::sync::Arc;

use warden_session::{CanonicalIdentity, Credential, Landing, LandingRequest, QualifiedKey};
use warden_transport::{Attendant, ServerId};
use warden_wire::Message;

use super::slot::SessionSlot;
use super::{
    AuthCore, AuthError, LoginEvent, LogoutEvent, LogoutKind, LogoutStage, PasswordChangeEvent,
};

impl AuthCore {
    /// `login(identifier, secret, realm)`.
    ///
    /// Malformed requests get `invalid` and touch nothing else. A realm
    /// failure gets `login.error`. A successful realm login goes to the
    /// domain: ghosts it returns are logged out first, then the client
    /// gets `login.success` or `login.rejected`. Every attempt that
    /// reaches the realm is published to `on_login`.
    pub(super) fn login(&self, server: ServerId, attendant: &Arc<Attendant>, message: &Message) {
        let command = self.event("login");
        let [identifier, secret, realm_name] = message.args.as_slice() else {
            self.invalid(attendant, &command, "expected 3 args: identifier, password, realm");
            return;
        };
        let Some(secret) = secret.as_str() else {
            self.invalid(attendant, &command, "password argument must be a string");
            return;
        };
        let Some(realm_name) = realm_name.as_str() else {
            self.invalid(attendant, &command, "realm argument must be a string");
            return;
        };
        let Some(realm) = self.realms.get(realm_name) else {
            self.invalid(attendant, &command, "realm is invalid");
            return;
        };
        let slot = self.slot(attendant);
        if !slot.is_vacant() {
            self.invalid(attendant, &command, "already logged in");
            return;
        }

        let credential = match realm.realm().login(identifier, secret) {
            Ok(credential) => credential,
            Err(error) => {
                tracing::info!(
                    %server,
                    conn_id = %attendant.id(),
                    realm = realm_name,
                    %error,
                    "login failed"
                );
                let text = AuthError::login_failure_text(&error);
                let _ = attendant.send(&self.event("login.error"), vec![text.into()]);
                self.login_events.emit(&LoginEvent {
                    server,
                    attendant: Arc::clone(attendant),
                    identifier: identifier.clone(),
                    realm: realm_name.to_string(),
                    credential: None,
                    error: Some(AuthError::Realm(error)),
                });
                return;
            }
        };

        let key = QualifiedKey::derive(credential.as_ref(), identifier, realm.clone());
        let request = LandingRequest {
            credential: credential.as_ref(),
            key,
            attendant,
        };
        let landing = self.domain.land(server, request, |identity| {
            slot.attach(Arc::clone(&credential), identity.clone());
        });

        // A ghost may have logged out and back in as someone else while
        // the earlier ghosts were being handled.
        for ghost in landing.ghosts() {
            self.logout_if(
                server,
                &ghost.attendant,
                &ghost.identity,
                LogoutKind::Ghosted,
                "",
            );
        }

        let error = match landing {
            Landing::Accepted { identity, .. } => {
                tracing::info!(%server, conn_id = %attendant.id(), %identity, "logged in");
                let _ = attendant.send(&self.event("login.success"), Vec::new());
                None
            }
            Landing::Rejected { .. } => {
                let _ = attendant.send(&self.event("login.rejected"), Vec::new());
                Some(AuthError::Rejected)
            }
        };
        self.login_events.emit(&LoginEvent {
            server,
            attendant: Arc::clone(attendant),
            identifier: identifier.clone(),
            realm: realm_name.to_string(),
            credential: Some(credential),
            error,
        });
    }

    /// The logout sequence. Shared by the `logout` command and connection
    /// teardown. Returns `false` if there was no session.
    pub(super) fn logout(
        &self,
        server: ServerId,
        attendant: &Arc<Attendant>,
        kind: LogoutKind,
        reason: &str,
    ) -> bool {
        let Some(slot) = self.existing_slot(attendant) else {
            return false;
        };
        let Some(session) = slot.begin_close() else {
            return false;
        };
        self.close(server, attendant, &slot, session, kind, reason);
        true
    }

    /// Logs `attendant` out only while its session still belongs to
    /// `identity`. Used for sessions picked out earlier, such as ghosts
    /// and the sessions of a stopping server.
    pub(super) fn logout_if(
        &self,
        server: ServerId,
        attendant: &Arc<Attendant>,
        identity: &CanonicalIdentity,
        kind: LogoutKind,
        reason: &str,
    ) -> bool {
        let Some(slot) = self.existing_slot(attendant) else {
            return false;
        };
        let Some(session) = slot.begin_close_if(identity) else {
            tracing::debug!(
                %server,
                conn_id = %attendant.id(),
                %identity,
                %kind,
                "logout skipped, session already gone"
            );
            return false;
        };
        self.close(server, attendant, &slot, session, kind, reason);
        true
    }

    /// Runs the rest of a logout once `begin_close` handed the session over.
    fn close(
        &self,
        server: ServerId,
        attendant: &Arc<Attendant>,
        slot: &SessionSlot,
        (credential, identity): (Arc<dyn Credential>, CanonicalIdentity),
        kind: LogoutKind,
        reason: &str,
    ) {
        let event = |stage| LogoutEvent {
            server,
            attendant: Arc::clone(attendant),
            credential: Arc::clone(&credential),
            stage,
            kind,
            reason: reason.to_string(),
        };

        self.logout_events.emit(&event(LogoutStage::Before));
        self.domain.remove_session(server, &identity, attendant.id());
        slot.finish_close();
        // The peer may already be gone.
        let _ = attendant.send(
            &self.event("logout.success"),
            vec![kind.as_str().into(), reason.into()],
        );
        tracing::info!(%server, conn_id = %attendant.id(), %identity, %kind, reason, "logged out");
        self.logout_events.emit(&event(LogoutStage::After));
    }

    /// `change-password(secret)`. Only reachable with a session attached.
    ///
    /// A session that started closing after the guard let the command
    /// through counts as logged out.
    pub(super) fn change_password(
        &self,
        server: ServerId,
        attendant: &Arc<Attendant>,
        message: &Message,
    ) {
        let secret = match message.args.as_slice() {
            [secret] => secret.as_str(),
            _ => None,
        };
        let Some(secret) = secret else {
            self.invalid(
                attendant,
                &self.event("change-password"),
                "exactly one string argument must be supplied",
            );
            return;
        };
        let Some((credential, identity)) = self
            .existing_slot(attendant)
            .and_then(|slot| slot.active())
        else {
            (self.not_logged_in)(server, attendant, message);
            return;
        };

        let result = match self.realms.get(identity.realm().name()) {
            Some(realm) => realm
                .realm()
                .set_password(credential.as_ref(), secret)
                .map_err(AuthError::from),
            None => {
                tracing::warn!(
                    %server,
                    conn_id = %attendant.id(),
                    %identity,
                    "session realm is not registered"
                );
                Err(AuthError::MissingQualifiedKey)
            }
        };

        let response = if result.is_ok() {
            "change-password.success"
        } else {
            "change-password.error"
        };
        let _ = attendant.send(&self.event(response), Vec::new());
        self.password_events.emit(&PasswordChangeEvent {
            server,
            attendant: Arc::clone(attendant),
            credential,
            error: result.err(),
        });
    }
}
