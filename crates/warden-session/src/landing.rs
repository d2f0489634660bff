//! Landing policies: what happens when someone logs in while already
//! logged in elsewhere.
//!
//! | Rule             | Existing sessions | New login          |
//! |------------------|-------------------|--------------------|
//! | `Multiple`       | kept              | accepted           |
//! | `SingleLocking`  | kept              | rejected           |
//! | `SingleGhosting` | logged out        | accepted           |
//! | `Custom`         | criterion decides | criterion decides  |

use std::fmt;
use std::sync::Arc;

use warden_transport::{Attendant, ConnectionId, ServerId};

use crate::{Credential, QualifiedKey};

/// Everything a landing criterion gets to look at.
pub struct LandingContext<'a> {
    pub server: ServerId,
    pub credential: &'a dyn Credential,
    pub key: &'a QualifiedKey,
    /// The connection trying to log in.
    pub requesting: &'a Arc<Attendant>,
    /// Sessions the same identity already has on this server.
    pub existing: &'a [Arc<Attendant>],
}

/// Outcome of a landing check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LandingDecision {
    /// Refuse the new login.
    pub reject: bool,
    /// Existing sessions to log out. Applied whether or not the login
    /// is rejected.
    pub ghost: Vec<ConnectionId>,
}

impl LandingDecision {
    pub fn accept() -> Self {
        Self::default()
    }

    pub fn reject() -> Self {
        Self {
            reject: true,
            ghost: Vec::new(),
        }
    }

    pub fn ghosting(ghost: Vec<ConnectionId>) -> Self {
        Self {
            reject: false,
            ghost,
        }
    }
}

/// A user-supplied landing policy.
///
/// Runs while the server's registry is locked, so it must not call back
/// into the [`Domain`](crate::Domain).
///
/// Closures implement this directly:
///
/// ```
/// use warden_session::{LandingContext, LandingDecision};
///
/// let at_most_two = |ctx: &LandingContext<'_>| {
///     if ctx.existing.len() >= 2 {
///         LandingDecision::reject()
///     } else {
///         LandingDecision::accept()
///     }
/// };
/// # let _ = warden_session::DomainRule::custom(at_most_two);
/// ```
pub trait LandingCriterion: Send + Sync + 'static {
    fn decide(&self, ctx: &LandingContext<'_>) -> LandingDecision;
}

impl<F> LandingCriterion for F
where
    F: Fn(&LandingContext<'_>) -> LandingDecision + Send + Sync + 'static,
{
    fn decide(&self, ctx: &LandingContext<'_>) -> LandingDecision {
        self(ctx)
    }
}

/// Caps an identity at a fixed number of concurrent sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxSessions(pub usize);

impl LandingCriterion for MaxSessions {
    fn decide(&self, ctx: &LandingContext<'_>) -> LandingDecision {
        if ctx.existing.len() >= self.0 {
            LandingDecision::reject()
        } else {
            LandingDecision::accept()
        }
    }
}

/// The landing policy of a domain.
#[derive(Clone)]
pub enum DomainRule {
    Multiple,
    SingleLocking,
    SingleGhosting,
    Custom(Arc<dyn LandingCriterion>),
}

/// Field-less mirror of [`DomainRule`], for comparisons and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Multiple,
    SingleLocking,
    SingleGhosting,
    Custom,
}

impl DomainRule {
    pub fn custom(criterion: impl LandingCriterion) -> Self {
        Self::Custom(Arc::new(criterion))
    }

    pub fn kind(&self) -> RuleKind {
        match self {
            Self::Multiple => RuleKind::Multiple,
            Self::SingleLocking => RuleKind::SingleLocking,
            Self::SingleGhosting => RuleKind::SingleGhosting,
            Self::Custom(_) => RuleKind::Custom,
        }
    }

    /// Evaluates the rule. Pure: never touches the registry.
    ///
    /// The returned ghost list only names connections from
    /// `ctx.existing`, never the requesting one, and has no duplicates.
    pub fn check_landing(&self, ctx: &LandingContext<'_>) -> LandingDecision {
        let mut decision = match self {
            Self::Multiple => LandingDecision::accept(),
            Self::SingleLocking if ctx.existing.is_empty() => LandingDecision::accept(),
            Self::SingleLocking => LandingDecision::reject(),
            Self::SingleGhosting => {
                LandingDecision::ghosting(ctx.existing.iter().map(|a| a.id()).collect())
            }
            Self::Custom(criterion) => criterion.decide(ctx),
        };
        let requesting = ctx.requesting.id();
        decision.ghost.retain(|id| {
            *id != requesting && ctx.existing.iter().any(|attendant| attendant.id() == *id)
        });
        decision.ghost.sort_unstable();
        decision.ghost.dedup();
        decision
    }
}

impl Default for DomainRule {
    fn default() -> Self {
        Self::SingleLocking
    }
}

impl fmt::Debug for DomainRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.kind(), f)
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Multiple => "multiple",
            Self::SingleLocking => "single-locking",
            Self::SingleGhosting => "single-ghosting",
            Self::Custom => "custom",
        };
        f.write_str(name)
    }
}
