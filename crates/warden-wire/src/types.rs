//! The abstract message model every Warden connection speaks.
//!
//! A message is an event name plus a list of positional arguments:
//!
//! ```text
//! ("auth.login", ["alice", "alice1", "main"])
//! ("auth.logout.success", ["ghosted", ""])
//! ```
//!
//! How these tuples are framed on a socket is the codec's business
//! (see [`Codec`](crate::Codec)), not this module's.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Arg: one positional argument
// ---------------------------------------------------------------------------

/// A single positional argument.
///
/// Commands receive arguments whose types are only known at runtime
/// (a login identifier can be a username or a numeric account id), so
/// this is a small dynamically-typed value, shaped after JSON.
///
/// `#[serde(untagged)]` means no discriminator travels on the wire:
/// `"alice"` decodes to `Arg::Str`, `42` to `Arg::Int`, `4.2` to
/// `Arg::Float`. Variant order matters here, serde tries them top-down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Arg {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Arg>),
}

impl Arg {
    /// Returns the string payload, if this is a string argument.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer payload, if this is an integer argument.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// A short type name, used when reporting malformed arguments.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
        }
    }
}

/// Strings print bare (`alice`, not `"alice"`); everything else prints
/// the way it would look in JSON.
impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// An `(event, args)` tuple, in either direction.
///
/// `args` may be omitted on the wire; it decodes as an empty list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The command or notification name, e.g. `"auth.login"`.
    pub event: String,

    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Arg>,
}

impl Message {
    /// Creates a message with the given event name and arguments.
    pub fn new(event: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            event: event.into(),
            args,
        }
    }

    /// Creates a message with no arguments.
    pub fn bare(event: impl Into<String>) -> Self {
        Self::new(event, Vec::new())
    }

    /// Returns the argument at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&Arg> {
        self.args.get(index)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.event, Arg::List(self.args.clone()))
    }
}

// =========================================================================
// Tests
// =========================================================================
