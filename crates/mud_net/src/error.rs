//! Network-layer error types.

use mud_entity::ErrorKind;

/// Errors that can occur while talking across the proxy/world boundary.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Failed to encode a message to MessagePack.
    #[error("failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a message from MessagePack.
    #[error("failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// NATS subscription error.
    #[error("NATS subscribe error: {0}")]
    Subscribe(#[from] async_nats::SubscribeError),

    /// NATS publish error.
    #[error("NATS publish error: {0}")]
    Publish(#[from] async_nats::PublishError),

    /// NATS connection error.
    #[error("NATS connection error: {0}")]
    Connect(#[from] async_nats::ConnectError),

    /// Nobody answered a request on `subject` in time, or nobody is
    /// listening on it at all (the peer is reloading).
    #[error("no response on {subject}")]
    Unreachable { subject: String },

    /// Any other request failure reported by the client.
    #[error("NATS request error on {subject}: {message}")]
    Request { subject: String, message: String },

    /// The peer answered with an error.
    #[error("{message}")]
    Remote { kind: ErrorKind, message: String },

    /// A request arrived without a reply subject.
    #[error("request on {0} has no reply subject")]
    MissingReply(String),
}

impl NetError {
    /// The taxonomy category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            NetError::Unreachable { .. } => ErrorKind::Unreachable,
            NetError::Remote { kind, .. } => *kind,
            _ => ErrorKind::Internal,
        }
    }

    /// Returns `true` if the peer process did not answer.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        self.kind() == ErrorKind::Unreachable
    }
}
