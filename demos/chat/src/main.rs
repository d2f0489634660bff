//! A small chat server where each account may be logged in once.
//!
//! Connect with any WebSocket client and send JSON messages:
//!
//! ```text
//! {"event":"my-auth.login","args":["alice","alice1","main"]}
//! {"event":"chat.msg","args":["hello everyone"]}
//! {"event":"chat.pmsg","args":["bob","hi bob"]}
//! {"event":"chat.who"}
//! {"event":"chat.kick","args":["carl"]}
//! ```

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;
use warden::prelude::*;

// ---------------------------------------------------------------------------
// Setup errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
enum SetupError {
    #[error("chat needs exactly one login realm, got {0}")]
    Realms(usize),

    #[error("chat needs a single-login rule, got {0}")]
    Rule(RuleKind),
}

// ---------------------------------------------------------------------------
// Chat protocol
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Member {
    name: String,
    attendant: Arc<Attendant>,
}

type Rooms = HashMap<ServerId, HashMap<ConnectionId, Member>>;

/// State shared by the chat handlers and the auth event subscribers.
struct ChatState {
    auth: Arc<AuthProtocol>,
    rooms: Mutex<Rooms>,
}

impl ChatState {
    fn member(&self, server: ServerId, attendant: &Attendant) -> Option<Member> {
        self.rooms
            .lock()
            .get(&server)
            .and_then(|room| room.get(&attendant.id()))
            .cloned()
    }

    fn find(&self, server: ServerId, name: &str) -> Option<Member> {
        self.rooms
            .lock()
            .get(&server)?
            .values()
            .find(|m| m.name == name)
            .cloned()
    }

    fn everyone(&self, server: ServerId) -> Vec<Member> {
        self.rooms
            .lock()
            .get(&server)
            .map(|room| room.values().cloned().collect())
            .unwrap_or_default()
    }

    fn joined(&self, event: &LoginEvent) {
        let Some(credential) = event.credential.as_ref().filter(|_| event.succeeded()) else {
            return;
        };
        let name = display_name(credential.as_ref());
        let others = {
            let mut rooms = self.rooms.lock();
            let room = rooms.entry(event.server).or_default();
            let others = recipients(room);
            room.insert(
                event.attendant.id(),
                Member {
                    name: name.clone(),
                    attendant: Arc::clone(&event.attendant),
                },
            );
            others
        };
        broadcast(&others, "chat.join", vec![name.into()]);
    }

    fn parted(&self, event: &LogoutEvent) {
        if event.stage != LogoutStage::After {
            return;
        }
        let (left, others) = {
            let mut rooms = self.rooms.lock();
            let Some(room) = rooms.get_mut(&event.server) else {
                return;
            };
            let left = room.remove(&event.attendant.id());
            (left, recipients(room))
        };
        if let Some(member) = left {
            broadcast(
                &others,
                "chat.part",
                vec![member.name.into(), event.kind.as_str().into()],
            );
        }
    }
}

struct ChatProtocol {
    state: Arc<ChatState>,
}

impl ChatProtocol {
    /// Builds the protocol on top of `auth` and subscribes to its login
    /// and logout events to keep the member list. The subscribers only
    /// hold a weak reference to the chat state.
    fn new(auth: Arc<AuthProtocol>) -> Result<Self, SetupError> {
        if auth.realms_count() != 1 {
            return Err(SetupError::Realms(auth.realms_count()));
        }
        match auth.domain_rule() {
            RuleKind::SingleLocking | RuleKind::SingleGhosting => {}
            other => return Err(SetupError::Rule(other)),
        }

        let state = Arc::new(ChatState {
            auth: Arc::clone(&auth),
            rooms: Mutex::default(),
        });

        let weak = Arc::downgrade(&state);
        auth.on_login().subscribe(move |event: &LoginEvent| {
            if let Some(state) = weak.upgrade() {
                state.joined(event);
            }
            Ok(())
        });
        let weak = Arc::downgrade(&state);
        auth.on_logout().subscribe(move |event: &LogoutEvent| {
            if let Some(state) = weak.upgrade() {
                state.parted(event);
            }
            Ok(())
        });

        Ok(Self { state })
    }
}

fn display_name(credential: &dyn Credential) -> String {
    credential
        .identification()
        .or_else(|| credential.index())
        .map(|key| key.to_string())
        .unwrap_or_else(|| "anonymous".to_string())
}

fn recipients(room: &HashMap<ConnectionId, Member>) -> Vec<Arc<Attendant>> {
    room.values().map(|m| Arc::clone(&m.attendant)).collect()
}

fn broadcast(to: &[Arc<Attendant>], event: &str, args: Vec<Arg>) {
    for attendant in to {
        let _ = attendant.send(event, args.clone());
    }
}

fn text_arg(message: &Message, index: usize) -> Option<&str> {
    message.arg(index).and_then(Arg::as_str)
}

impl Protocol for ChatProtocol {
    fn dependencies(&self) -> Vec<Arc<dyn Protocol>> {
        vec![self.state.auth.clone() as Arc<dyn Protocol>]
    }

    fn handlers(&self) -> MessageHandlers {
        let mut handlers = MessageHandlers::new();

        let state = Arc::clone(&self.state);
        handlers.insert(
            "chat.msg".into(),
            handler(move |server, attendant, message| {
                let (Some(me), Some(text)) = (state.member(server, attendant), text_arg(message, 0))
                else {
                    let _ = attendant.send("chat.invalid", vec!["chat.msg".into()]);
                    return;
                };
                let everyone = recipients_of(state.everyone(server));
                broadcast(&everyone, "chat.msg", vec![me.name.into(), text.into()]);
            }),
        );

        let state = Arc::clone(&self.state);
        handlers.insert(
            "chat.pmsg".into(),
            handler(move |server, attendant, message| {
                let (Some(me), Some(to), Some(text)) = (
                    state.member(server, attendant),
                    text_arg(message, 0),
                    text_arg(message, 1),
                ) else {
                    let _ = attendant.send("chat.invalid", vec!["chat.pmsg".into()]);
                    return;
                };
                match state.find(server, to) {
                    Some(target) => {
                        let _ = target
                            .attendant
                            .send("chat.pmsg", vec![me.name.into(), text.into()]);
                    }
                    None => {
                        let _ = attendant.send("chat.unknown", vec![to.into()]);
                    }
                }
            }),
        );

        let state = Arc::clone(&self.state);
        handlers.insert(
            "chat.who".into(),
            handler(move |server, attendant, _| {
                let mut names: Vec<String> =
                    state.everyone(server).into_iter().map(|m| m.name).collect();
                names.sort();
                let _ = attendant.send("chat.who", names.into_iter().map(Arg::from).collect());
            }),
        );

        let auth = &self.state.auth;
        let mut handlers = auth.require_authorization_all(None, handlers, Fallbacks::default());

        let state = Arc::clone(&self.state);
        let kick = handler(move |server, attendant, message| {
            let Some(name) = text_arg(message, 0) else {
                let _ = attendant.send("chat.invalid", vec!["chat.kick".into()]);
                return;
            };
            let Some(target) = state.find(server, name) else {
                let _ = attendant.send("chat.unknown", vec![name.into()]);
                return;
            };
            let by = state
                .member(server, attendant)
                .map(|m| m.name)
                .unwrap_or_default();
            let reason = format!("kicked by {by}");
            state
                .auth
                .logout(server, &target.attendant, LogoutKind::Graceful, &reason);
        });
        let can_kick: Arc<dyn AuthorizationRequirement> = Arc::new(Permission::new("kick"));
        handlers.insert(
            "chat.kick".into(),
            auth.require_authorization(Some(can_kick), kick, Fallbacks::default()),
        );
        handlers
    }

    /// Drops the server's room. Runs before auth logs the remaining
    /// sessions out, so nobody is told about the others leaving.
    fn stopped(&self, server: ServerId) {
        if let Some(room) = self.state.rooms.lock().remove(&server) {
            tracing::info!(%server, members = room.len(), "chat room closed");
        }
    }
}

fn recipients_of(members: Vec<Member>) -> Vec<Arc<Attendant>> {
    members.into_iter().map(|m| m.attendant).collect()
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let auth = Arc::new(
        AuthProtocol::builder()
            .realm("main", Arc::new(accounts()))
            .namespace("my-auth")
            .rule(DomainRule::SingleGhosting)
            .build(),
    );
    let chat = Arc::new(ChatProtocol::new(auth)?);

    let server = WardenServer::builder()
        .bind("0.0.0.0:8080")
        .protocol(chat)
        .build()
        .await?;

    tracing::info!(addr = %server.local_addr()?, "chat server listening");
    server.run().await?;
    Ok(())
}

fn accounts() -> MemoryRealm {
    let realm = MemoryRealm::new()
        .with_user("alice", "alice1")
        .with_user("bob", "bob1")
        .with_user("carl", "carl1")
        .with_user("danny", "danny1");
    realm.grant("alice", "kick");
    realm
}
