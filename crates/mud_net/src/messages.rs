//! Request and reply payloads exchanged between the proxy and the world.
//!
//! Every remote call is a request/reply pair. Replies are wrapped in
//! [`RpcReply`] so a handler failure on the far side arrives as a typed error
//! rather than a timeout.

use mud_entity::{EntityId, ErrorKind};
use serde::{Deserialize, Serialize};

// ── Proxy → World ───────────────────────────────────────────────────────────

/// Create the player entity for a freshly registered account.
///
/// Idempotent: if the account already has an entity the world returns it.
/// Published on [`subjects::WORLD_CREATE_ENTITY`](crate::subjects::WORLD_CREATE_ENTITY).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEntityForAccount {
    pub username: String,
}

/// Reply to [`CreateEntityForAccount`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityCreated {
    pub entity_id: EntityId,
}

/// One line of player input, executed as if typed by `entity_id`.
///
/// The reply is sent once the command has run and its writes are durable;
/// the proxy holds back further input from the same session until then.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendInputThroughEntity {
    pub entity_id: EntityId,
    pub text: String,
}

/// The first session bound to `entity_id` has connected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyFirstSessionConnected {
    pub entity_id: EntityId,
}

/// The last session controlling `entity_id` has disconnected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyLastSessionDisconnected {
    pub entity_id: EntityId,
}

/// Stop the world process after flushing pending writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownWorld;

// ── World → Proxy ───────────────────────────────────────────────────────────

/// Deliver a line of text to every session controlling `entity_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitToEntity {
    pub entity_id: EntityId,
    pub text: String,
}

/// Ask the proxy who is connected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhoConnected;

/// An authenticated account with at least one live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedAccount {
    pub username: String,
    pub entity_id: Option<EntityId>,
}

/// Reply to [`WhoConnected`], sorted by username.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhoConnectedReply {
    pub accounts: Vec<ConnectedAccount>,
}

/// Drop every session controlling `entity_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisconnectSessionsOnEntity {
    pub entity_id: EntityId,
}

/// Reply to [`DisconnectSessionsOnEntity`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsDisconnected {
    pub count: usize,
}

/// Restart the proxy's listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartProxy;

// ── Replies ─────────────────────────────────────────────────────────────────

/// Empty successful reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack;

/// An error reported by the serving side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Envelope for every reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RpcReply<T> {
    Ok(T),
    Err(RemoteError),
}

impl<T> RpcReply<T> {
    pub fn ok(value: T) -> Self {
        RpcReply::Ok(value)
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        RpcReply::Err(RemoteError {
            kind,
            message: message.into(),
        })
    }

    /// Convert into a plain `Result`.
    ///
    /// # Errors
    ///
    /// Returns the [`RemoteError`] carried by an error reply.
    pub fn into_result(self) -> Result<T, RemoteError> {
        match self {
            RpcReply::Ok(value) => Ok(value),
            RpcReply::Err(err) => Err(err),
        }
    }
}

impl<T, E> From<Result<T, E>> for RpcReply<T>
where
    E: Into<RemoteError>,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => RpcReply::Ok(value),
            Err(err) => RpcReply::Err(err.into()),
        }
    }
}
