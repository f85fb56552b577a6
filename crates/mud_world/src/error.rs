//! World-process error types.

use std::path::PathBuf;

use mud_entity::{EntityId, ErrorKind, InvalidEntityId};
use mud_net::messages::RemoteError;

/// Failures of the persistence collaborator.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed document {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no stored record for {0}")]
    Missing(EntityId),

    /// The background writer task is gone; nothing more can be persisted.
    #[error("persistence writer has stopped")]
    WriterStopped,
}

/// Errors raised by the entity store, type resolver and command tables.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("no such entity {0}")]
    NoSuchEntity(EntityId),

    #[error("'{0}' does not name a known type")]
    InvalidType(String),

    #[error("type '{0}' is already registered")]
    DuplicateType(String),

    #[error(transparent)]
    InvalidId(#[from] InvalidEntityId),

    #[error("{zone} is the zone master of {members} entities; clear them first")]
    ZoneNotEmpty { zone: EntityId, members: usize },

    #[error("a command named or aliased '{0}' already exists in this table")]
    DuplicateCommand(String),

    #[error("{0} is a room and cannot have a location")]
    RoomHasNoLocation(EntityId),

    #[error("{0} cannot be placed inside itself")]
    SelfContainment(EntityId),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl WorldError {
    /// The taxonomy category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorldError::NoSuchEntity(_) => ErrorKind::NotFound,
            WorldError::InvalidType(_)
            | WorldError::InvalidId(_)
            | WorldError::RoomHasNoLocation(_)
            | WorldError::SelfContainment(_) => ErrorKind::InvalidInput,
            WorldError::DuplicateType(_)
            | WorldError::ZoneNotEmpty { .. }
            | WorldError::DuplicateCommand(_) => ErrorKind::Conflict,
            WorldError::Persistence(_) => ErrorKind::Internal,
        }
    }
}

impl From<WorldError> for RemoteError {
    fn from(err: WorldError) -> Self {
        RemoteError {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Failure of a single command.
///
/// [`CommandError::Fail`] is the only variant a handler raises on purpose: its
/// text is shown verbatim to the invoker. Anything else is logged and the
/// invoker sees a generic message.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    Fail(String),

    #[error(transparent)]
    World(#[from] WorldError),
}

impl CommandError {
    pub fn fail(message: impl Into<String>) -> Self {
        CommandError::Fail(message.into())
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::Fail(_) => ErrorKind::Command,
            CommandError::World(err) => err.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy() {
        assert_eq!(
            WorldError::NoSuchEntity(EntityId(1)).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            WorldError::ZoneNotEmpty {
                zone: EntityId(1),
                members: 2
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            WorldError::DuplicateCommand("look".into()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            WorldError::InvalidType("nope".into()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(CommandError::fail("no").kind(), ErrorKind::Command);
    }

    #[test]
    fn test_remote_error_carries_kind() {
        let remote: RemoteError = WorldError::NoSuchEntity(EntityId(3)).into();
        assert_eq!(remote.kind, ErrorKind::NotFound);
        assert!(remote.message.contains("#3"));
    }
}
