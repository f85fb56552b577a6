//! What a command handler can see and do.

use std::collections::BTreeSet;

use mud_entity::{Entity, EntityId};

use crate::command::resolve;
use crate::error::CommandError;
use crate::store::EntityStore;
use crate::types::TypeRegistry;

/// A side effect to be carried out once the dispatch has finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send a line to every session controlling the entity.
    Emit { entity: EntityId, text: String },
    /// Drop every session controlling the entity.
    Disconnect(EntityId),
    RestartProxy,
    Shutdown,
}

/// The invoker, the world and the outbound queue for one dispatch.
pub struct CommandContext<'w> {
    pub store: &'w mut EntityStore,
    connected: &'w BTreeSet<EntityId>,
    invoker: EntityId,
    outbound: &'w mut Vec<Outbound>,
}

impl<'w> CommandContext<'w> {
    pub fn new(
        store: &'w mut EntityStore,
        connected: &'w BTreeSet<EntityId>,
        invoker: EntityId,
        outbound: &'w mut Vec<Outbound>,
    ) -> Self {
        Self {
            store,
            connected,
            invoker,
            outbound,
        }
    }

    #[must_use]
    pub fn invoker(&self) -> EntityId {
        self.invoker
    }

    /// # Errors
    ///
    /// Fails if the invoker was destroyed during this dispatch.
    pub fn invoker_entity(&self) -> Result<&Entity, CommandError> {
        Ok(self.store.get(self.invoker)?)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.store.get(self.invoker).is_ok_and(|e| e.admin)
    }

    /// The invoker's location, if it has one.
    #[must_use]
    pub fn location(&self) -> Option<EntityId> {
        self.store.get(self.invoker).ok().and_then(Entity::location)
    }

    #[must_use]
    pub fn types(&self) -> &TypeRegistry {
        self.store.types()
    }

    #[must_use]
    pub fn connected(&self) -> &BTreeSet<EntityId> {
        self.connected
    }

    #[must_use]
    pub fn is_connected(&self, entity: EntityId) -> bool {
        self.connected.contains(&entity)
    }

    /// Turn free text into an entity the invoker can see.
    #[must_use]
    pub fn resolve(&self, text: &str) -> Option<EntityId> {
        resolve::resolve_reference(&*self.store, self.invoker, text)
    }

    /// [`CommandContext::resolve`], failing with a message the invoker sees.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError::Fail`] when nothing matches.
    pub fn resolve_or_fail(&self, text: &str) -> Result<EntityId, CommandError> {
        self.resolve(text)
            .ok_or_else(|| CommandError::fail(format!("I don't see '{text}' here.")))
    }

    /// Send a line to the invoker.
    pub fn msg(&mut self, text: impl Into<String>) {
        self.outbound.push(Outbound::Emit {
            entity: self.invoker,
            text: text.into(),
        });
    }

    /// Send a line to `entity` if anyone is controlling it.
    pub fn emit(&mut self, entity: EntityId, text: impl Into<String>) {
        if entity == self.invoker || self.connected.contains(&entity) {
            self.outbound.push(Outbound::Emit {
                entity,
                text: text.into(),
            });
        }
    }

    /// Send a line to every connected player inside `container`, skipping
    /// `exclude`.
    pub fn emit_to_contents(&mut self, container: EntityId, text: &str, exclude: &[EntityId]) {
        let listeners: Vec<EntityId> = self
            .store
            .contents_of(container)
            .iter()
            .filter(|e| e.kind().is_player())
            .filter_map(|e| e.id())
            .filter(|id| !exclude.contains(id))
            .collect();
        for listener in listeners {
            self.emit(listener, text);
        }
    }

    pub fn push(&mut self, item: Outbound) {
        self.outbound.push(item);
    }
}
