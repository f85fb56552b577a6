//! The world: entity store, command tables and who is connected, owned by a
//! single task.

use std::collections::BTreeSet;
use std::sync::Arc;

use mud_entity::{Attributes, EntityId};
use mud_net::messages::ConnectedAccount;
use tracing::{debug, info, warn};

use crate::command::builtin::describe;
use crate::command::{CommandContext, CommandTables, Dispatch, Outbound, handle_input};
use crate::error::WorldError;
use crate::persistence::{Persistence, WriteTicket};
use crate::store::{ACCOUNT_ATTR, EntityStore};
use crate::types::{PLAYER, ROOM, TypeRegistry};

/// Shown when a line matches neither an exit nor a command.
pub const NO_MATCH: &str = "Huh? That isn't a command.";

/// Name of the room created in an empty world.
pub const LIMBO: &str = "Limbo";

/// Everything a dispatch produced.
#[derive(Debug)]
pub struct InputOutcome {
    pub dispatch: Dispatch,
    /// Effects to deliver, in order.
    pub outbound: Vec<Outbound>,
    /// Resolves once the dispatch's writes are durable.
    pub ticket: WriteTicket,
}

impl InputOutcome {
    /// Returns `true` if a command asked for the world to stop.
    #[must_use]
    pub fn wants_shutdown(&self) -> bool {
        self.outbound.contains(&Outbound::Shutdown)
    }
}

#[derive(Debug)]
pub struct World {
    store: EntityStore,
    tables: CommandTables,
    connected: BTreeSet<EntityId>,
    start_room: EntityId,
}

impl World {
    /// Load the world from `persistence`.
    ///
    /// New players are placed in `start_room` if it names a room; otherwise
    /// in the lowest-numbered room, and an empty world gets a [`LIMBO`] room.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError`] if loading or bootstrapping fails.
    pub async fn load(
        persistence: Arc<dyn Persistence>,
        types: Arc<TypeRegistry>,
        tables: CommandTables,
        start_room: Option<EntityId>,
    ) -> Result<Self, WorldError> {
        let mut store = EntityStore::load(persistence, types).await?;

        let configured = start_room.filter(|id| {
            let ok = store.get(*id).is_ok_and(|e| e.kind().is_room());
            if !ok {
                warn!(room = %id, "configured start room is not a room, ignoring");
            }
            ok
        });
        let start_room = match configured.or_else(|| store.rooms().find_map(|r| r.id())) {
            Some(room) => room,
            None => {
                let limbo = store.create(ROOM, LIMBO, Attributes::new()).await?;
                info!(room = %limbo, "bootstrapped empty world");
                limbo
            }
        };
        info!(start_room = %start_room, entities = store.len(), "world loaded");

        Ok(Self {
            store,
            tables,
            connected: BTreeSet::new(),
            start_room,
        })
    }

    #[must_use]
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    #[must_use]
    pub fn start_room(&self) -> EntityId {
        self.start_room
    }

    #[must_use]
    pub fn connected(&self) -> &BTreeSet<EntityId> {
        &self.connected
    }

    fn with_context<R>(
        &mut self,
        invoker: EntityId,
        f: impl FnOnce(&mut CommandContext<'_>, &CommandTables) -> R,
    ) -> (R, Vec<Outbound>) {
        let mut outbound = Vec::new();
        let result = {
            let mut ctx =
                CommandContext::new(&mut self.store, &self.connected, invoker, &mut outbound);
            f(&mut ctx, &self.tables)
        };
        (result, outbound)
    }

    /// Run one line of input as `invoker`.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::NoSuchEntity`] if the invoker does not exist.
    /// Command failures are reported to the invoker, not returned.
    pub fn execute_command(&mut self, invoker: EntityId, text: &str) -> Result<InputOutcome, WorldError> {
        self.store.get(invoker)?;
        debug!(entity = %invoker, input = text, "input");

        let (dispatch, outbound) = self.with_context(invoker, |ctx, tables| {
            let dispatch = handle_input(tables, ctx, text);
            if dispatch == Dispatch::NoMatch && !text.trim().is_empty() {
                ctx.msg(NO_MATCH);
            }
            dispatch
        });
        Ok(InputOutcome {
            dispatch,
            outbound,
            ticket: self.store.commit(),
        })
    }

    /// The player entity for `username`, created in the start room if the
    /// account has none yet. The first player of a world is an admin.
    ///
    /// The new player is in the world at once; the returned ticket resolves
    /// when it is durable.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError`] if the player type or the start room is missing.
    pub fn create_player_for_account(
        &mut self,
        username: &str,
    ) -> Result<(EntityId, WriteTicket), WorldError> {
        if let Some(id) = self
            .store
            .find_player_by_account(username)
            .and_then(|e| e.id())
        {
            debug!(account = username, entity = %id, "account already has a player");
            return Ok((id, self.store.commit()));
        }

        let first = !self.store.iter().any(|e| e.kind().is_player());
        let mut player = self.store.types().resolve(PLAYER)?.construct(username);
        player
            .attributes
            .insert(ACCOUNT_ATTR.to_string(), serde_json::Value::from(username));
        player.set_location(Some(self.start_room));
        player.admin = first;
        let id = self.store.insert_staged(player)?;
        info!(account = username, entity = %id, admin = first, "player created");
        Ok((id, self.store.commit()))
    }

    /// The first session for `entity` connected: mark it, announce it and
    /// show it where it is.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::NoSuchEntity`] for an unknown entity.
    pub fn at_connect(&mut self, entity: EntityId) -> Result<InputOutcome, WorldError> {
        let player = self.store.get(entity)?;
        let name = player.name.clone();
        if player.location().is_none() && !player.kind().is_room() {
            let start = self.start_room;
            self.store.move_to(entity, Some(start))?;
        }
        self.connected.insert(entity);
        info!(entity = %entity, "connected");

        let (result, outbound) = self.with_context(entity, |ctx, _| -> Result<(), WorldError> {
            if let Some(here) = ctx.location() {
                ctx.emit_to_contents(here, &format!("{name} has connected."), &[entity]);
                let view = describe(&*ctx.store, entity, here, false)?;
                ctx.msg(view);
            }
            Ok(())
        });
        result?;
        Ok(InputOutcome {
            dispatch: Dispatch::Handled,
            outbound,
            ticket: self.store.commit(),
        })
    }

    /// The last session for `entity` went away.
    ///
    /// An entity that no longer exists is simply forgotten.
    pub fn at_disconnect(&mut self, entity: EntityId) -> InputOutcome {
        self.connected.remove(&entity);
        info!(entity = %entity, "disconnected");

        let name = self.store.get(entity).ok().map(|e| e.name.clone());
        let (_, outbound) = self.with_context(entity, |ctx, _| {
            if let (Some(name), Some(here)) = (name, ctx.location()) {
                ctx.emit_to_contents(here, &format!("{name} has disconnected."), &[entity]);
            }
        });
        InputOutcome {
            dispatch: Dispatch::Handled,
            outbound,
            ticket: self.store.commit(),
        }
    }

    /// Rebuild the connected set from the proxy's view.
    pub fn resync_connected(&mut self, accounts: &[ConnectedAccount]) {
        self.connected = accounts
            .iter()
            .filter_map(|a| a.entity_id)
            .filter(|id| self.store.contains(*id))
            .collect();
        info!(connected = self.connected.len(), "connected set resynchronised");
    }

    /// Submit anything still staged.
    pub fn flush(&mut self) -> WriteTicket {
        self.store.commit()
    }
}
