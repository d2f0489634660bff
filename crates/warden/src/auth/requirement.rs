//! Authorization requirements: predicates over a logged-in credential.

use std::sync::Arc;

use warden_session::Credential;

/// Something a credential must satisfy before a wrapped handler runs.
///
/// Closures taking `&dyn Credential` implement this directly.
pub trait AuthorizationRequirement: Send + Sync + 'static {
    fn satisfied_by(&self, credential: &dyn Credential) -> bool;
}

impl<F> AuthorizationRequirement for F
where
    F: Fn(&dyn Credential) -> bool + Send + Sync + 'static,
{
    fn satisfied_by(&self, credential: &dyn Credential) -> bool {
        self(credential)
    }
}

/// Satisfied by superusers only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Superuser;

impl AuthorizationRequirement for Superuser {
    fn satisfied_by(&self, credential: &dyn Credential) -> bool {
        credential.is_superuser()
    }
}

/// Satisfied by credentials holding the named permission, and by superusers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission(pub String);

impl Permission {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl AuthorizationRequirement for Permission {
    fn satisfied_by(&self, credential: &dyn Credential) -> bool {
        credential.is_superuser() || credential.has_permission(&self.0)
    }
}

/// Satisfied when every inner requirement is. Empty means always.
#[derive(Clone, Default)]
pub struct AllOf(pub Vec<Arc<dyn AuthorizationRequirement>>);

impl AuthorizationRequirement for AllOf {
    fn satisfied_by(&self, credential: &dyn Credential) -> bool {
        self.0.iter().all(|r| r.satisfied_by(credential))
    }
}

/// Satisfied when at least one inner requirement is. Empty means never.
#[derive(Clone, Default)]
pub struct AnyOf(pub Vec<Arc<dyn AuthorizationRequirement>>);

impl AuthorizationRequirement for AnyOf {
    fn satisfied_by(&self, credential: &dyn Credential) -> bool {
        self.0.iter().any(|r| r.satisfied_by(credential))
    }
}

#[derive(Clone)]
pub struct Not(pub Arc<dyn AuthorizationRequirement>);

impl AuthorizationRequirement for Not {
    fn satisfied_by(&self, credential: &dyn Credential) -> bool {
        !self.0.satisfied_by(credential)
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::collections::HashSet;

    use super::*;

    #[derive(Debug, Default)]
    struct Fake {
        superuser: bool,
        permissions: HashSet<&'static str>,
    }

    impl Credential for Fake {
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

    fn with_perms(perms: &[&'static str]) -> Fake {
        Fake {
            superuser: false,
            permissions: perms.iter().copied().collect(),
        }
    }

    #[test]
    fn test_permission_checks_credential_or_superuser() {
        let post = Permission::new("chat.post");

        assert!(post.satisfied_by(&with_perms(&["chat.post"])));
        assert!(!post.satisfied_by(&with_perms(&["chat.read"])));
        assert!(post.satisfied_by(&Fake {
            superuser: true,
            ..Fake::default()
        }));
    }

    #[test]
    fn test_combinators() {
        let read: Arc<dyn AuthorizationRequirement> = Arc::new(Permission::new("read"));
        let write: Arc<dyn AuthorizationRequirement> = Arc::new(Permission::new("write"));
        let reader = with_perms(&["read"]);

        assert!(!AllOf(vec![read.clone(), write.clone()]).satisfied_by(&reader));
        assert!(AnyOf(vec![read.clone(), write.clone()]).satisfied_by(&reader));
        assert!(Not(write).satisfied_by(&reader));
        assert!(AllOf(Vec::new()).satisfied_by(&reader));
        assert!(!AnyOf(Vec::new()).satisfied_by(&reader));
    }

    #[test]
    fn test_closure_requirement() {
        let never = |_: &dyn Credential| false;
        assert!(!never.satisfied_by(&Fake::default()));
        assert!(!Superuser.satisfied_by(&Fake::default()));
    }
}
