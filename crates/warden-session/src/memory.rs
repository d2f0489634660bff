//! An in-memory realm for development and tests.
//!
//! Usernames are case-insensitive: they are stored lowercased and the
//! issued credential identifies itself by the lowercased name, so
//! `Alice` and `alice` land on the same identity.
//!
//! Secrets are kept in plain text. Don't put this in front of real users.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use warden_wire::Arg;

use crate::{Credential, KeyValue, Realm, RealmError};

/// Credential issued by [`MemoryRealm`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCredential {
    username: String,
    permissions: HashSet<String>,
    superuser: bool,
}

impl MemoryCredential {
    /// Creates a credential with no permissions. Mostly useful in tests.
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_lowercase(),
            permissions: HashSet::new(),
            superuser: false,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl Credential for MemoryCredential {
    fn identification(&self) -> Option<KeyValue> {
        Some(KeyValue::Text(self.username.clone()))
    }

    fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    fn is_superuser(&self) -> bool {
        self.superuser
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
struct Account {
    secret: String,
    active: bool,
    superuser: bool,
    permissions: HashSet<String>,
}

/// A realm backed by a hash map.
#[derive(Debug, Default)]
pub struct MemoryRealm {
    accounts: RwLock<HashMap<String, Account>>,
}

impl MemoryRealm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`add_user`](Self::add_user).
    pub fn with_user(self, username: &str, secret: &str) -> Self {
        self.add_user(username, secret);
        self
    }

    /// Adds an active account, replacing any existing one with that name.
    pub fn add_user(&self, username: &str, secret: &str) {
        self.accounts.write().insert(
            username.to_lowercase(),
            Account {
                secret: secret.to_string(),
                active: true,
                superuser: false,
                permissions: HashSet::new(),
            },
        );
    }

    /// Grants a permission. Returns `false` if there's no such user.
    pub fn grant(&self, username: &str, permission: &str) -> bool {
        self.with_account(username, |account| {
            account.permissions.insert(permission.to_string());
        })
    }

    pub fn set_superuser(&self, username: &str, superuser: bool) -> bool {
        self.with_account(username, |account| account.superuser = superuser)
    }

    /// Inactive accounts can't log in.
    pub fn set_active(&self, username: &str, active: bool) -> bool {
        self.with_account(username, |account| account.active = active)
    }

    /// Returns `true` if `secret` is the user's current secret.
    pub fn verify(&self, username: &str, secret: &str) -> bool {
        self.accounts
            .read()
            .get(&username.to_lowercase())
            .is_some_and(|account| account.secret == secret)
    }

    fn with_account(&self, username: &str, f: impl FnOnce(&mut Account)) -> bool {
        match self.accounts.write().get_mut(&username.to_lowercase()) {
            Some(account) => {
                f(account);
                true
            }
            None => false,
        }
    }
}

impl Realm for MemoryRealm {
    fn login(&self, identifier: &Arg, secret: &str) -> Result<Arc<dyn Credential>, RealmError> {
        let Some(username) = identifier.as_str() else {
            return Err(RealmError::Internal(format!(
                "identifier must be a string, got {}",
                identifier.type_name()
            )));
        };
        let username = username.to_lowercase();
        let accounts = self.accounts.read();
        let account = accounts.get(&username).ok_or(RealmError::Mismatch)?;
        if account.secret != secret {
            return Err(RealmError::Mismatch);
        }
        if !account.active {
            return Err(RealmError::Inactive);
        }
        Ok(Arc::new(MemoryCredential {
            username,
            permissions: account.permissions.clone(),
            superuser: account.superuser,
        }))
    }

    fn set_password(&self, credential: &dyn Credential, secret: &str) -> Result<(), RealmError> {
        let credential = credential
            .as_any()
            .downcast_ref::<MemoryCredential>()
            .ok_or(RealmError::Unsupported)?;
        let mut accounts = self.accounts.write();
        let account = accounts.get_mut(&credential.username).ok_or_else(|| {
            RealmError::Internal(format!("no account for {}", credential.username))
        })?;
        account.secret = secret.to_string();
        Ok(())
    }
}
