//! In-process tests for the auth protocol.
//!
//! Connections are channel-backed attendants; commands go through a
//! `ProtocolStack` exactly as the server would dispatch them.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use warden::prelude::*;
use warden_session::IdentityId;
use warden_transport::Outbox;

// =========================================================================
// Harness
// =========================================================================

const SERVER: ServerId = ServerId::new(42);

struct Client {
    att: Arc<Attendant>,
    outbox: Outbox,
}

impl Client {
    fn new(id: u64) -> Self {
        let (att, outbox) = Attendant::channel(SERVER, ConnectionId::new(id));
        Self { att, outbox }
    }

    fn received(&mut self) -> Vec<Message> {
        self.outbox.drain()
    }
}

struct Harness {
    realm: Arc<MemoryRealm>,
    auth: Arc<AuthProtocol>,
    stack: ProtocolStack,
}

impl Harness {
    fn new(rule: DomainRule) -> Self {
        let realm = Arc::new(
            MemoryRealm::new()
                .with_user("alice", "alice1")
                .with_user("bob", "bob1"),
        );
        let auth = Arc::new(
            AuthProtocol::builder()
                .realm("main", realm.clone())
                .rule(rule)
                .build(),
        );
        let stack = ProtocolStack::new(vec![auth.clone() as Arc<dyn Protocol>])
            .expect("auth alone has no conflicts");
        Self { realm, auth, stack }
    }

    fn send(&self, client: &Client, event: &str, args: Vec<Arg>) {
        let handled = self
            .stack
            .dispatch(SERVER, &client.att, &Message::new(event, args));
        assert!(handled, "no handler for {event}");
    }

    fn login(&self, client: &Client, user: &str, secret: &str) {
        self.send(
            client,
            "auth.login",
            vec![user.into(), secret.into(), "main".into()],
        );
    }

    fn disconnect(&self, client: &Client) {
        self.stack
            .attendant_stopped(SERVER, &client.att, &StopReason::Closed);
    }

    fn identity_ids(&self) -> Vec<IdentityId> {
        let mut ids = Vec::new();
        self.auth.domain().enumerate(SERVER, |identity, _| {
            ids.push(identity.id());
            ControlFlow::Continue(())
        });
        ids
    }
}

fn msg(event: &str, args: Vec<Arg>) -> Message {
    Message::new(event, args)
}

// =========================================================================
// Login
// =========================================================================

#[test]
fn test_login_valid_credentials_succeeds() {
    let h = Harness::new(DomainRule::SingleLocking);
    let mut alice = Client::new(1);

    h.login(&alice, "alice", "alice1");

    assert_eq!(alice.received(), vec![Message::bare("auth.login.success")]);
    assert!(h.auth.current(&alice.att).is_some());
    assert_eq!(h.auth.domain().session_count(SERVER), 1);
}

#[test]
fn test_login_wrong_secret_reports_mismatch_and_audits() {
    let h = Harness::new(DomainRule::SingleLocking);
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    h.auth.on_login().subscribe(move |event: &LoginEvent| {
        sink.lock().push(event.error.clone());
        Ok(())
    });
    let mut alice = Client::new(1);

    h.login(&alice, "alice", "wrong-pw");

    assert_eq!(
        alice.received(),
        vec![msg("auth.login.error", vec!["login failed: mismatch".into()])]
    );
    assert!(h.auth.current(&alice.att).is_none());
    assert_eq!(h.auth.domain().session_count(SERVER), 0);
    assert_eq!(
        *errors.lock(),
        vec![Some(AuthError::Realm(RealmError::Mismatch))]
    );
}

#[test]
fn test_login_inactive_account_reports_internal_error() {
    let h = Harness::new(DomainRule::SingleLocking);
    h.realm.set_active("alice", false);
    let mut alice = Client::new(1);

    h.login(&alice, "alice", "alice1");

    assert_eq!(
        alice.received(),
        vec![msg("auth.login.error", vec!["login failed: internal error".into()])]
    );
}

#[test]
fn test_login_malformed_requests_are_invalid_and_not_audited() {
    let h = Harness::new(DomainRule::SingleLocking);
    let audited = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&audited);
    h.auth.on_login().subscribe(move |_: &LoginEvent| {
        *counter.lock() += 1;
        Ok(())
    });
    let mut c = Client::new(1);

    h.send(&c, "auth.login", vec!["alice".into(), "alice1".into()]);
    h.send(&c, "auth.login", vec!["alice".into(), Arg::Int(1), "main".into()]);
    h.send(&c, "auth.login", vec!["alice".into(), "alice1".into(), Arg::Bool(true)]);
    h.send(&c, "auth.login", vec!["alice".into(), "alice1".into(), "nope".into()]);

    let invalid = |detail: &str| msg("auth.invalid", vec!["auth.login".into(), detail.into()]);
    assert_eq!(
        c.received(),
        vec![
            invalid("expected 3 args: identifier, password, realm"),
            invalid("password argument must be a string"),
            invalid("realm argument must be a string"),
            invalid("realm is invalid"),
        ]
    );
    assert_eq!(*audited.lock(), 0);
}

#[test]
fn test_login_twice_on_same_connection_is_invalid() {
    let h = Harness::new(DomainRule::Multiple);
    let mut alice = Client::new(1);
    h.login(&alice, "alice", "alice1");
    alice.received();

    h.login(&alice, "bob", "bob1");

    assert_eq!(
        alice.received(),
        vec![msg(
            "auth.invalid",
            vec!["auth.login".into(), "already logged in".into()]
        )]
    );
    assert_eq!(h.auth.domain().session_count(SERVER), 1);
}

// =========================================================================
// Landing rules
// =========================================================================

#[test]
fn test_single_locking_rejects_second_connection() {
    let h = Harness::new(DomainRule::SingleLocking);
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    h.auth.on_login().subscribe(move |event: &LoginEvent| {
        sink.lock().push((event.credential.is_some(), event.error.clone()));
        Ok(())
    });
    let mut first = Client::new(1);
    let mut second = Client::new(2);

    h.login(&first, "alice", "alice1");
    h.login(&second, "alice", "alice1");

    assert_eq!(first.received(), vec![Message::bare("auth.login.success")]);
    assert_eq!(second.received(), vec![Message::bare("auth.login.rejected")]);
    assert!(h.auth.current(&first.att).is_some());
    assert!(h.auth.current(&second.att).is_none());
    assert_eq!(h.auth.domain().session_count(SERVER), 1);
    assert_eq!(
        *errors.lock(),
        vec![(true, None), (true, Some(AuthError::Rejected))]
    );
}

#[test]
fn test_single_locking_treats_username_case_as_same_identity() {
    let h = Harness::new(DomainRule::SingleLocking);
    let mut first = Client::new(1);
    let mut second = Client::new(2);

    h.login(&first, "Alice", "alice1");
    h.login(&second, "ALICE", "alice1");

    assert_eq!(first.received(), vec![Message::bare("auth.login.success")]);
    assert_eq!(second.received(), vec![Message::bare("auth.login.rejected")]);
}

#[test]
fn test_single_ghosting_evicts_previous_connection() {
    let h = Harness::new(DomainRule::SingleGhosting);
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&kinds);
    h.auth.on_logout().subscribe(move |event: &LogoutEvent| {
        sink.lock().push((event.attendant.id(), event.stage, event.kind));
        Ok(())
    });
    let mut first = Client::new(1);
    let mut second = Client::new(2);
    h.login(&first, "alice", "alice1");
    first.received();

    h.login(&second, "alice", "alice1");

    assert_eq!(
        first.received(),
        vec![msg("auth.logout.success", vec!["ghosted".into(), "".into()])]
    );
    assert_eq!(second.received(), vec![Message::bare("auth.login.success")]);
    assert!(h.auth.current(&first.att).is_none());
    assert!(h.auth.current(&second.att).is_some());
    assert_eq!(h.auth.domain().session_count(SERVER), 1);
    assert_eq!(
        *kinds.lock(),
        vec![
            (ConnectionId::new(1), LogoutStage::Before, LogoutKind::Ghosted),
            (ConnectionId::new(1), LogoutStage::After, LogoutKind::Ghosted),
        ]
    );
}

#[test]
fn test_single_ghosting_keeps_identity_across_eviction() {
    let h = Harness::new(DomainRule::SingleGhosting);
    let first = Client::new(1);
    let second = Client::new(2);

    h.login(&first, "alice", "alice1");
    let before = h.identity_ids();
    h.login(&second, "alice", "alice1");

    assert_eq!(h.identity_ids(), before);
}

#[test]
fn test_multiple_rule_admits_every_connection() {
    let h = Harness::new(DomainRule::Multiple);
    let mut clients: Vec<Client> = (1..=5).map(Client::new).collect();

    for client in &clients {
        h.login(client, "alice", "alice1");
    }

    for client in &mut clients {
        assert_eq!(client.received(), vec![Message::bare("auth.login.success")]);
    }
    assert_eq!(h.auth.domain().session_count(SERVER), 5);
    assert_eq!(h.auth.domain().identity_count(SERVER), 1);
}

#[test]
fn test_custom_rule_caps_sessions() {
    let h = Harness::new(DomainRule::custom(MaxSessions(2)));
    let mut clients: Vec<Client> = (1..=3).map(Client::new).collect();

    for client in &clients {
        h.login(client, "bob", "bob1");
    }

    assert_eq!(clients[1].received(), vec![Message::bare("auth.login.success")]);
    assert_eq!(clients[2].received(), vec![Message::bare("auth.login.rejected")]);
    assert_eq!(h.auth.domain().session_count(SERVER), 2);
}

#[test]
fn test_custom_rule_can_ghost_while_rejecting() {
    let h = Harness::new(DomainRule::custom(|ctx: &LandingContext<'_>| {
        LandingDecision {
            reject: !ctx.existing.is_empty(),
            ghost: ctx.existing.iter().map(|a| a.id()).collect(),
        }
    }));
    let mut first = Client::new(1);
    let mut second = Client::new(2);
    h.login(&first, "alice", "alice1");
    first.received();

    h.login(&second, "alice", "alice1");

    assert_eq!(
        first.received(),
        vec![msg("auth.logout.success", vec!["ghosted".into(), "".into()])]
    );
    assert_eq!(second.received(), vec![Message::bare("auth.login.rejected")]);
    assert_eq!(h.auth.domain().session_count(SERVER), 0);
}

#[test]
fn test_concurrent_ghosting_logins_leave_exactly_one_session() {
    let h = Harness::new(DomainRule::SingleGhosting);
    let clients: Vec<Client> = (1..=12).map(Client::new).collect();

    std::thread::scope(|scope| {
        for client in &clients {
            let stack = &h.stack;
            let att = &client.att;
            scope.spawn(move || {
                let login = Message::new(
                    "auth.login",
                    vec!["alice".into(), "alice1".into(), "main".into()],
                );
                stack.dispatch(SERVER, att, &login);
            });
        }
    });

    assert_eq!(h.auth.domain().session_count(SERVER), 1);
    let logged_in = clients
        .iter()
        .filter(|c| h.auth.current(&c.att).is_some())
        .count();
    assert_eq!(logged_in, 1);
}

#[test]
fn test_ghost_logout_skips_connection_that_moved_to_another_session() {
    // Ghost every earlier session once two exist.
    let h = Harness::new(DomainRule::custom(|ctx: &LandingContext<'_>| {
        LandingDecision {
            reject: false,
            ghost: if ctx.existing.len() >= 2 {
                ctx.existing.iter().map(|a| a.id()).collect()
            } else {
                Vec::new()
            },
        }
    }));
    let mut first = Client::new(1);
    let mut second = Client::new(2);
    let newest = Client::new(3);
    h.login(&first, "alice", "alice1");
    h.login(&second, "alice", "alice1");
    first.received();
    second.received();

    // While the first ghost is logged out, the other one logs out on its
    // own and comes back as bob.
    let fired = AtomicBool::new(false);
    let moved = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&moved);
    let auth = Arc::clone(&h.auth);
    let login = h.auth.handlers()["auth.login"].clone();
    let pair = [Arc::clone(&first.att), Arc::clone(&second.att)];
    h.auth.on_logout().subscribe(move |event: &LogoutEvent| {
        if event.stage != LogoutStage::After || event.kind != LogoutKind::Ghosted {
            return Ok(());
        }
        if fired.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let Some(other) = pair.iter().find(|att| att.id() != event.attendant.id()) else {
            return Ok(());
        };
        auth.logout(SERVER, other, LogoutKind::Graceful, "");
        let as_bob = Message::new(
            "auth.login",
            vec!["bob".into(), "bob1".into(), "main".into()],
        );
        login(SERVER, other, &as_bob);
        *sink.lock() = Some(other.id());
        Ok(())
    });

    h.login(&newest, "alice", "alice1");

    let moved = (*moved.lock()).expect("one ghost should have been logged out");
    let (other, ghost) = if moved == first.att.id() {
        (&mut first, &mut second)
    } else {
        (&mut second, &mut first)
    };
    assert_eq!(
        other.received(),
        vec![
            msg("auth.logout.success", vec!["graceful".into(), "".into()]),
            Message::bare("auth.login.success"),
        ]
    );
    assert_eq!(
        ghost.received(),
        vec![msg("auth.logout.success", vec!["ghosted".into(), "".into()])]
    );
    let name = h
        .auth
        .current(&other.att)
        .and_then(|credential| credential.identification())
        .map(|key| key.to_string());
    assert_eq!(name.as_deref(), Some("bob"));
    assert_eq!(h.auth.domain().session_count(SERVER), 2);
    assert_eq!(h.auth.domain().identity_count(SERVER), 2);
}

// =========================================================================
// Logout
// =========================================================================

#[test]
fn test_logout_command_is_graceful_and_audited_in_order() {
    let h = Harness::new(DomainRule::SingleLocking);
    let stages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stages);
    let auth = Arc::clone(&h.auth);
    h.auth.on_logout().subscribe(move |event: &LogoutEvent| {
        let sessions = auth.domain().session_count(event.server);
        sink.lock().push((event.stage, sessions, event.reason.clone()));
        Ok(())
    });
    let mut alice = Client::new(1);
    h.login(&alice, "alice", "alice1");
    alice.received();

    h.send(&alice, "auth.logout", vec![]);

    assert_eq!(
        alice.received(),
        vec![msg("auth.logout.success", vec!["graceful".into(), "".into()])]
    );
    assert_eq!(
        *stages.lock(),
        vec![
            (LogoutStage::Before, 1, String::new()),
            (LogoutStage::After, 0, String::new()),
        ]
    );
}

#[test]
fn test_logout_twice_is_noop() {
    let h = Harness::new(DomainRule::SingleLocking);
    let count = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&count);
    h.auth.on_logout().subscribe(move |_: &LogoutEvent| {
        *counter.lock() += 1;
        Ok(())
    });
    let mut alice = Client::new(1);
    h.login(&alice, "alice", "alice1");

    assert!(h.auth.logout(SERVER, &alice.att, LogoutKind::Graceful, ""));
    assert!(!h.auth.logout(SERVER, &alice.att, LogoutKind::Graceful, ""));
    alice.received();
    h.send(&alice, "auth.logout", vec![]);

    assert_eq!(alice.received(), vec![Message::bare("auth.login-required")]);
    assert_eq!(*count.lock(), 2);
}

#[test]
fn test_logout_then_login_allocates_new_identity() {
    let h = Harness::new(DomainRule::SingleLocking);
    let alice = Client::new(1);

    h.login(&alice, "alice", "alice1");
    let first = h.identity_ids();
    h.send(&alice, "auth.logout", vec![]);
    assert!(h.identity_ids().is_empty());
    h.login(&alice, "alice", "alice1");
    let second = h.identity_ids();

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_ne!(first, second);
}

#[test]
fn test_disconnect_runs_logout_sequence() {
    let h = Harness::new(DomainRule::SingleLocking);
    let reasons = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reasons);
    h.auth.on_logout().subscribe(move |event: &LogoutEvent| {
        sink.lock().push((event.kind, event.reason.clone()));
        Ok(())
    });
    let alice = Client::new(1);
    let bob = Client::new(2);
    h.login(&alice, "alice", "alice1");

    h.disconnect(&alice);
    h.disconnect(&bob);

    assert_eq!(h.auth.domain().session_count(SERVER), 0);
    assert_eq!(
        *reasons.lock(),
        vec![(LogoutKind::Graceful, "connection closed".to_string())]
    );
}

#[test]
fn test_logout_to_dropped_connection_still_cleans_up() {
    let h = Harness::new(DomainRule::SingleGhosting);
    let first = Client::new(1);
    let mut second = Client::new(2);
    h.login(&first, "alice", "alice1");
    drop(first.outbox);

    h.login(&second, "alice", "alice1");

    assert_eq!(second.received(), vec![Message::bare("auth.login.success")]);
    assert_eq!(h.auth.domain().session_count(SERVER), 1);
}

#[test]
fn test_server_stop_logs_out_open_sessions() {
    let h = Harness::new(DomainRule::SingleLocking);
    let reasons = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reasons);
    h.auth.on_logout().subscribe(move |event: &LogoutEvent| {
        if event.stage == LogoutStage::After {
            sink.lock().push((event.kind, event.reason.clone()));
        }
        Ok(())
    });
    let mut alice = Client::new(1);
    h.login(&alice, "alice", "alice1");
    alice.received();

    h.stack.stopped(SERVER);

    assert_eq!(
        alice.received(),
        vec![msg(
            "auth.logout.success",
            vec!["graceful".into(), "server stopped".into()]
        )]
    );
    assert!(h.auth.current(&alice.att).is_none());
    assert_eq!(h.auth.domain().session_count(SERVER), 0);
    assert_eq!(
        *reasons.lock(),
        vec![(LogoutKind::Graceful, "server stopped".to_string())]
    );
}

#[test]
fn test_server_stop_then_login_keeps_locking_consistent() {
    let h = Harness::new(DomainRule::SingleLocking);
    let mut alice = Client::new(1);
    let mut again = Client::new(2);
    let mut third = Client::new(3);
    h.login(&alice, "alice", "alice1");
    h.stack.stopped(SERVER);
    alice.received();

    h.login(&again, "alice", "alice1");
    h.login(&third, "alice", "alice1");
    h.send(&alice, "auth.logout", vec![]);

    assert_eq!(again.received(), vec![Message::bare("auth.login.success")]);
    assert_eq!(third.received(), vec![Message::bare("auth.login.rejected")]);
    assert_eq!(alice.received(), vec![Message::bare("auth.login-required")]);
    assert_eq!(h.auth.domain().session_count(SERVER), 1);
}

// =========================================================================
// Change password
// =========================================================================

#[test]
fn test_change_password_updates_realm() {
    let h = Harness::new(DomainRule::SingleLocking);
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&outcomes);
    h.auth
        .on_password_change()
        .subscribe(move |event: &PasswordChangeEvent| {
            sink.lock().push(event.error.clone());
            Ok(())
        });
    let mut alice = Client::new(1);
    h.login(&alice, "alice", "alice1");
    alice.received();

    h.send(&alice, "auth.change-password", vec!["alice2".into()]);

    assert_eq!(
        alice.received(),
        vec![Message::bare("auth.change-password.success")]
    );
    assert!(h.realm.verify("alice", "alice2"));
    assert_eq!(*outcomes.lock(), vec![None]);
}

#[test]
fn test_change_password_requires_login() {
    let h = Harness::new(DomainRule::SingleLocking);
    let mut anon = Client::new(1);

    h.send(&anon, "auth.change-password", vec!["x".into()]);

    assert_eq!(anon.received(), vec![Message::bare("auth.login-required")]);
    assert!(h.realm.verify("alice", "alice1"));
}

#[test]
fn test_change_password_during_logout_requires_login() {
    let h = Harness::new(DomainRule::SingleLocking);
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&outcomes);
    h.auth
        .on_password_change()
        .subscribe(move |event: &PasswordChangeEvent| {
            sink.lock().push(event.error.clone());
            Ok(())
        });
    // Lands while the session is closing: the guard still sees the
    // credential, the session itself is already on its way out.
    let change_password = h.auth.handlers()["auth.change-password"].clone();
    h.auth.on_logout().subscribe(move |event: &LogoutEvent| {
        if event.stage == LogoutStage::Before {
            let request = Message::new("auth.change-password", vec!["alice2".into()]);
            change_password(event.server, &event.attendant, &request);
        }
        Ok(())
    });
    let mut alice = Client::new(1);
    h.login(&alice, "alice", "alice1");
    alice.received();

    h.send(&alice, "auth.logout", vec![]);

    assert_eq!(
        alice.received(),
        vec![
            Message::bare("auth.login-required"),
            msg("auth.logout.success", vec!["graceful".into(), "".into()]),
        ]
    );
    assert!(outcomes.lock().is_empty());
    assert!(h.realm.verify("alice", "alice1"));
}

#[test]
fn test_change_password_bad_args_are_invalid() {
    let h = Harness::new(DomainRule::SingleLocking);
    let mut alice = Client::new(1);
    h.login(&alice, "alice", "alice1");
    alice.received();

    h.send(&alice, "auth.change-password", vec![]);
    h.send(&alice, "auth.change-password", vec![Arg::Int(5)]);

    let expected = msg(
        "auth.invalid",
        vec![
            "auth.change-password".into(),
            "exactly one string argument must be supplied".into(),
        ],
    );
    assert_eq!(alice.received(), vec![expected.clone(), expected]);
}

// =========================================================================
// Audit isolation
// =========================================================================

#[test]
fn test_failing_subscribers_do_not_break_login() {
    let h = Harness::new(DomainRule::SingleLocking);
    h.auth
        .on_login()
        .subscribe(|_: &LoginEvent| Err("audit store offline".into()));
    h.auth
        .on_login()
        .subscribe(|_: &LoginEvent| panic!("subscriber bug"));
    let reached = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&reached);
    h.auth.on_login().subscribe(move |_: &LoginEvent| {
        *flag.lock() = true;
        Ok(())
    });
    let mut alice = Client::new(1);

    h.login(&alice, "alice", "alice1");

    assert_eq!(alice.received(), vec![Message::bare("auth.login.success")]);
    assert!(*reached.lock());
}
