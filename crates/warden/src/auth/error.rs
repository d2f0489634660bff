//! Errors reported to auth event subscribers.

use warden_session::RealmError;

/// Why a login or password change did not go through.
///
/// These reach audit subscribers only. Clients get a fixed response
/// event instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The landing rule refused the login.
    #[error("rejected - already logged in")]
    Rejected,

    /// An active session had no qualified identity. Indicates a bug.
    #[error("missing qualified key in session")]
    MissingQualifiedKey,

    /// The realm refused or failed.
    #[error(transparent)]
    Realm(#[from] RealmError),
}

impl AuthError {
    /// The client-facing text for a failed realm login.
    pub(crate) fn login_failure_text(error: &RealmError) -> &'static str {
        match error {
            RealmError::Mismatch => "login failed: mismatch",
            _ => "login failed: internal error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_display() {
        assert_eq!(AuthError::Rejected.to_string(), "rejected - already logged in");
    }

    #[test]
    fn test_login_failure_text_only_mismatch_is_specific() {
        assert_eq!(
            AuthError::login_failure_text(&RealmError::Mismatch),
            "login failed: mismatch"
        );
        for error in [
            RealmError::Inactive,
            RealmError::Unsupported,
            RealmError::Internal("db down".into()),
        ] {
            assert_eq!(
                AuthError::login_failure_text(&error),
                "login failed: internal error"
            );
        }
    }
}
