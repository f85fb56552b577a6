//! Every live session, and which entities they control.
//!
//! Several sessions may control the same entity. The manager counts them so
//! the world hears about an entity's first connection and last disconnection
//! exactly once each. Callers hold the entity's [`presence_gate`] from the
//! bind or remove until the world has been told, so those notices reach the
//! world in the order they were decided.
//!
//! [`presence_gate`]: SessionManager::presence_gate

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use mud_entity::EntityId;
use mud_net::messages::ConnectedAccount;
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use tracing::{debug, info};

use crate::session::{Session, SessionEvent, SessionId};

#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: DashMap<SessionId, Session>,
    controllers: DashMap<EntityId, usize>,
    gates: DashMap<EntityId, Arc<Mutex<()>>>,
}

impl SessionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new, unauthenticated connection.
    pub fn add(&self, peer: SocketAddr, tx: mpsc::UnboundedSender<SessionEvent>) -> SessionId {
        let session = Session::new(peer, tx);
        let id = session.id;
        self.sessions.insert(id, session);
        debug!(session = %id, %peer, "session added");
        id
    }

    /// Exclusive right to change and report whether `entity` is connected.
    pub async fn presence_gate(&self, entity: EntityId) -> OwnedMutexGuard<()> {
        let gate = Arc::clone(&self.gates.entry(entity).or_default());
        gate.lock_owned().await
    }

    /// The entity a session controls, if any.
    #[must_use]
    pub fn entity_of(&self, id: SessionId) -> Option<EntityId> {
        self.sessions.get(&id).and_then(|s| s.entity)
    }

    /// Forget a session. Returns the entity it controlled if no other
    /// session still controls it.
    pub fn remove(&self, id: SessionId) -> Option<EntityId> {
        let (_, session) = self.sessions.remove(&id)?;
        debug!(session = %id, "session removed");
        let entity = session.entity?;
        self.release(entity).then_some(entity)
    }

    /// Bind an authenticated account and its entity to a session. Returns
    /// `Some(true)` if this is the first session controlling `entity`, and
    /// `None` if the session is gone.
    pub fn bind(&self, id: SessionId, username: &str, entity: EntityId) -> Option<bool> {
        let previous = {
            let mut session = self.sessions.get_mut(&id)?;
            session.username = Some(username.to_string());
            session.entity.replace(entity)
        };
        if previous == Some(entity) {
            return Some(false);
        }
        if let Some(old) = previous {
            self.release(old);
        }

        let first = match self.controllers.entry(entity) {
            Entry::Occupied(mut slot) => {
                *slot.get_mut() += 1;
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(1);
                true
            }
        };
        info!(session = %id, account = username, entity = %entity, first, "session bound");
        Some(first)
    }

    /// Returns `true` if `entity` lost its last controller.
    fn release(&self, entity: EntityId) -> bool {
        match self.controllers.entry(entity) {
            Entry::Occupied(mut slot) => {
                *slot.get_mut() -= 1;
                if *slot.get() == 0 {
                    slot.remove();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Note a line from the client. `routed` lines count as commands and as
    /// visible activity.
    pub fn touch(&self, id: SessionId, routed: bool) {
        self.touch_at(id, routed, Instant::now());
    }

    pub fn touch_at(&self, id: SessionId, routed: bool, now: Instant) {
        if let Some(mut session) = self.sessions.get_mut(&id) {
            session.last_activity = now;
            if routed {
                session.last_visible_activity = now;
                session.commands_sent += 1;
            }
        }
    }

    /// Read a session.
    pub fn with_session<R>(&self, id: SessionId, f: impl FnOnce(&Session) -> R) -> Option<R> {
        self.sessions.get(&id).map(|s| f(&s))
    }

    pub fn send(&self, id: SessionId, text: impl Into<String>) -> bool {
        self.sessions.get(&id).is_some_and(|s| s.send(text))
    }

    #[must_use]
    pub fn sessions_controlling(&self, entity: EntityId) -> Vec<SessionId> {
        let mut ids: Vec<_> = self
            .sessions
            .iter()
            .filter(|s| s.entity == Some(entity))
            .map(|s| s.id)
            .collect();
        ids.sort();
        ids
    }

    /// Send `text` to every session controlling `entity`. Returns how many
    /// were reached.
    pub fn emit_to_entity(&self, entity: EntityId, text: &str) -> usize {
        self.sessions
            .iter()
            .filter(|s| s.entity == Some(entity))
            .filter(|s| s.send(text))
            .count()
    }

    /// Close every session controlling `entity`.
    pub fn disconnect_entity(&self, entity: EntityId) -> usize {
        let count = self
            .sessions
            .iter()
            .filter(|s| s.entity == Some(entity))
            .filter(|s| s.close())
            .count();
        info!(entity = %entity, sessions = count, "disconnecting sessions");
        count
    }

    /// Send `text` to every session, logged in or not.
    pub fn broadcast(&self, text: &str) -> usize {
        self.sessions.iter().filter(|s| s.send(text)).count()
    }

    pub fn close_all(&self) -> usize {
        self.sessions.iter().filter(|s| s.close()).count()
    }

    /// Logged-in accounts, one entry per account, sorted by username.
    #[must_use]
    pub fn who(&self) -> Vec<ConnectedAccount> {
        let mut accounts: Vec<ConnectedAccount> = self
            .sessions
            .iter()
            .filter_map(|s| {
                s.username.as_ref().map(|username| ConnectedAccount {
                    username: username.clone(),
                    entity_id: s.entity,
                })
            })
            .collect();
        accounts.sort_by_key(|a| a.username.to_lowercase());
        accounts.dedup_by(|a, b| a.username.eq_ignore_ascii_case(&b.username));
        accounts
    }

    /// Close every session idle for longer than `timeout`.
    pub fn sweep_idle(&self, timeout: Duration) -> Vec<SessionId> {
        self.sweep_idle_at(Instant::now(), timeout)
    }

    /// [`sweep_idle`](Self::sweep_idle) as of `now`.
    pub fn sweep_idle_at(&self, now: Instant, timeout: Duration) -> Vec<SessionId> {
        let mut idle: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|s| s.idle_for(now) > timeout)
            .map(|s| {
                s.send("You have been idle too long. Goodbye.");
                s.close();
                s.id
            })
            .collect();
        idle.sort();
        if !idle.is_empty() {
            info!(sessions = idle.len(), "idle sessions disconnected");
        }
        idle
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
