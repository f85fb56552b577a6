//! Cross-crate error taxonomy.

use serde::{Deserialize, Serialize};

/// The category an error belongs to, independent of which crate raised it.
///
/// Crate-level error enums expose a `kind()` method returning one of these so
/// callers at process boundaries can decide how to surface a failure without
/// matching on every concrete variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// An entity, account or configuration key does not exist.
    NotFound,
    /// A uniqueness or emptiness rule was violated.
    Conflict,
    /// Malformed type path, id or command argument.
    InvalidInput,
    /// A domain rule raised deliberately by a command; shown verbatim.
    Command,
    /// The peer process did not answer a remote call.
    Unreachable,
    /// I/O, codec or other failures that are not the caller's fault.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::Command => "command error",
            ErrorKind::Unreachable => "unreachable",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}
