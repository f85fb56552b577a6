//! One live connection.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use mud_entity::EntityId;
use tokio::sync::mpsc;

/// Process-unique session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SessionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Sent to a connection's task by anyone holding its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Write a line to the client.
    Line(String),
    /// Close the connection.
    Close,
}

/// The proxy's record of one connection.
///
/// The transport itself belongs to the connection task; the session holds
/// the channel into it.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub peer: SocketAddr,
    /// Set once the login shell succeeds.
    pub username: Option<String>,
    pub entity: Option<EntityId>,
    pub commands_sent: u64,
    pub connected_at: Instant,
    /// Any line at all.
    pub last_activity: Instant,
    /// Lines routed to the world.
    pub last_visible_activity: Instant,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl Session {
    #[must_use]
    pub fn new(peer: SocketAddr, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        let now = Instant::now();
        Self {
            id: SessionId::next(),
            peer,
            username: None,
            entity: None,
            commands_sent: 0,
            connected_at: now,
            last_activity: now,
            last_visible_activity: now,
            tx,
        }
    }

    /// Returns `true` once an account is bound.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.username.is_some()
    }

    /// Queue a line for the client. Returns `false` if the connection is
    /// already gone.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.tx.send(SessionEvent::Line(text.into())).is_ok()
    }

    pub fn close(&self) -> bool {
        self.tx.send(SessionEvent::Close).is_ok()
    }

    #[must_use]
    pub fn idle_for(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.last_activity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(SessionId::next(), SessionId::next());
    }

    #[test]
    fn test_send_reports_closed_connection() {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new("127.0.0.1:9".parse().unwrap(), tx);
        assert!(!session.is_authenticated());
        assert!(session.send("hi"));
        drop(rx);
        assert!(!session.send("anyone?"));
    }
}
