//! Entity store.
//!
//! The in-memory world graph, keyed by [`EntityId`]. Every mutation goes
//! through the store so that invariants are checked before anything is
//! written, and every write is staged onto the [`PersistenceQueue`].
//!
//! Two flavours of mutation exist:
//!
//! - `create`, `save` and `destroy` are async and return once the write is
//!   durable.
//! - `insert_staged`, `modify`, `move_to` and `destroy_staged` apply to the
//!   map immediately and
//!   stage their writes; [`EntityStore::commit`] flushes the staged batch and
//!   hands back a [`WriteTicket`]. Command handlers use this flavour so a
//!   whole dispatch is written as one batch.

use std::collections::BTreeMap;
use std::sync::Arc;

use mud_entity::{Attributes, Entity, EntityId, IdAllocator};
use tracing::{debug, info, warn};

use crate::error::WorldError;
use crate::fuzzy;
use crate::persistence::{Persistence, PersistenceQueue, WriteOp, WriteTicket};
use crate::types::TypeRegistry;

/// Attribute holding the username of the account a player belongs to.
pub const ACCOUNT_ATTR: &str = "account";

/// The world graph.
#[derive(Debug)]
pub struct EntityStore {
    entities: BTreeMap<EntityId, Entity>,
    types: Arc<TypeRegistry>,
    queue: PersistenceQueue,
    staged: Vec<WriteOp>,
    ids: IdAllocator,
}

impl EntityStore {
    /// Rebuild the graph from everything `persistence` holds.
    ///
    /// Records whose type no longer resolves are skipped with a warning so a
    /// retired type cannot keep the world from starting.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::Persistence`] if the records cannot be read.
    pub async fn load(
        persistence: Arc<dyn Persistence>,
        types: Arc<TypeRegistry>,
    ) -> Result<Self, WorldError> {
        let records = persistence.load_all().await?;
        let mut ids = IdAllocator::starting_at(persistence.next_id().await?);
        let mut entities = BTreeMap::new();
        for (id, record) in records {
            ids.observe(id);
            match types.resolve(&record.type_path) {
                Ok(def) => {
                    entities.insert(id, Entity::from_record(id, def.kind(), record));
                }
                Err(err) => {
                    warn!(entity = %id, error = %err, "skipping entity of unknown type");
                }
            }
        }
        info!(entities = entities.len(), "entity store loaded");

        Ok(Self {
            entities,
            types,
            queue: PersistenceQueue::spawn(persistence),
            staged: Vec::new(),
            ids,
        })
    }

    #[must_use]
    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    // ── Durable operations ──────────────────────────────────────────────────

    /// Resolve `type_path`, construct an entity named `name` carrying `attrs`
    /// and persist it.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidType`] for an unknown type, or a
    /// persistence error.
    pub async fn create(
        &mut self,
        type_path: &str,
        name: &str,
        attrs: Attributes,
    ) -> Result<EntityId, WorldError> {
        let def = self.types.resolve(type_path)?;
        let mut entity = def.construct(name);
        entity.attributes.extend(attrs);
        self.save(entity).await
    }

    /// Persist `entity` and put it in the map.
    ///
    /// An entity without an id is inserted and assigned one; otherwise its
    /// stored record is overwritten. The id never changes once assigned.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation or a persistence error. The map is left
    /// untouched on error.
    pub async fn save(&mut self, mut entity: Entity) -> Result<EntityId, WorldError> {
        self.validate(&entity)?;
        let id = match entity.id() {
            Some(id) => id,
            None => {
                let id = self.ids.allocate();
                entity.assign_id(id);
                id
            }
        };
        let mut ops = std::mem::take(&mut self.staged);
        ops.push(WriteOp::Update(id, entity.to_record()));
        self.queue.submit(ops).wait().await?;
        debug!(entity = %id, kind = %entity.kind(), "saved");
        self.entities.insert(id, entity);
        Ok(id)
    }

    /// Destroy `id`, persisting the deletion before removing it from the map.
    ///
    /// See [`EntityStore::destroy_staged`] for the cascade rules.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::ZoneNotEmpty`] when `id` still has zone members
    /// and `cascade` is false.
    pub async fn destroy(&mut self, id: EntityId, cascade: bool) -> Result<(), WorldError> {
        let doomed = self.plan_destroy(id, cascade)?;
        self.commit().wait().await?;
        for gone in doomed {
            self.entities.remove(&gone);
        }
        info!(entity = %id, "destroyed");
        Ok(())
    }

    // ── Staged operations ───────────────────────────────────────────────────

    /// Give `entity` a fresh id, put it in the map and stage its write.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation, leaving the map untouched.
    pub fn insert_staged(&mut self, mut entity: Entity) -> Result<EntityId, WorldError> {
        self.validate(&entity)?;
        let id = self.ids.allocate();
        entity.assign_id(id);
        self.staged.push(WriteOp::Update(id, entity.to_record()));
        debug!(entity = %id, kind = %entity.kind(), "inserted");
        self.entities.insert(id, entity);
        Ok(id)
    }

    /// Destroy `id` in memory now and stage the deletions.
    ///
    /// - A zone master with members is refused unless `cascade` is set, in
    ///   which case the members' zone references are cleared first.
    /// - Destroying anything other than an exit or a player also destroys
    ///   every exit leading to it.
    /// - Whatever the entity contained is moved to the entity's own
    ///   location, or nowhere.
    ///
    /// Returns every id removed.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::NoSuchEntity`] or [`WorldError::ZoneNotEmpty`].
    pub fn destroy_staged(&mut self, id: EntityId, cascade: bool) -> Result<Vec<EntityId>, WorldError> {
        let doomed = self.plan_destroy(id, cascade)?;
        for gone in &doomed {
            self.entities.remove(gone);
        }
        info!(entity = %id, removed = doomed.len(), "destroyed");
        Ok(doomed)
    }

    fn plan_destroy(&mut self, id: EntityId, cascade: bool) -> Result<Vec<EntityId>, WorldError> {
        let target = self.get(id)?;
        let kind = target.kind();
        let parent = target.location();

        let members = self.members_of_zone(id);
        if !members.is_empty() && !cascade {
            return Err(WorldError::ZoneNotEmpty {
                zone: id,
                members: members.len(),
            });
        }
        for member in members {
            self.modify(member, |e| e.zone = None)?;
        }

        let mut doomed = if kind.is_exit() || kind.is_player() {
            Vec::new()
        } else {
            self.exits_linked_to(id)
        };
        doomed.retain(|exit| *exit != id);

        let contents: Vec<EntityId> = self
            .contents_of(id)
            .iter()
            .filter_map(|e| e.id())
            .filter(|c| !doomed.contains(c))
            .collect();
        for child in contents {
            self.modify(child, |e| {
                e.set_location(parent);
            })?;
        }

        doomed.push(id);
        for gone in &doomed {
            self.staged.retain(|op| op.entity() != *gone);
            self.staged.push(WriteOp::Delete(*gone));
        }
        Ok(doomed)
    }

    /// Apply `f` to a copy of entity `id`; if the result is valid, replace the
    /// stored entity and stage its write.
    ///
    /// The id and kind cannot be changed through `f`.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::NoSuchEntity`] or an invariant violation, leaving
    /// the entity untouched.
    pub fn modify<F>(&mut self, id: EntityId, f: F) -> Result<(), WorldError>
    where
        F: FnOnce(&mut Entity),
    {
        let mut updated = self.get(id)?.clone();
        f(&mut updated);
        self.validate(&updated)?;
        self.staged.push(WriteOp::Update(id, updated.to_record()));
        self.entities.insert(id, updated);
        Ok(())
    }

    /// Move `id` into `destination`, or out of everything.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RoomHasNoLocation`] when asked to place a room
    /// somewhere, or an invariant violation.
    pub fn move_to(&mut self, id: EntityId, destination: Option<EntityId>) -> Result<(), WorldError> {
        if destination.is_some() && self.get(id)?.kind().is_room() {
            return Err(WorldError::RoomHasNoLocation(id));
        }
        self.modify(id, |e| {
            e.set_location(destination);
        })
    }

    /// Submit every staged write as one batch.
    pub fn commit(&mut self) -> WriteTicket {
        let ops = std::mem::take(&mut self.staged);
        if !ops.is_empty() {
            debug!(ops = ops.len(), "committing staged writes");
        }
        self.queue.submit(ops)
    }

    #[must_use]
    pub fn has_staged(&self) -> bool {
        !self.staged.is_empty()
    }

    fn validate(&self, entity: &Entity) -> Result<(), WorldError> {
        let own = entity.id();
        if let Some(location) = entity.location() {
            if entity.kind().is_room() {
                return Err(WorldError::RoomHasNoLocation(own.unwrap_or(location)));
            }
            if Some(location) == own {
                return Err(WorldError::SelfContainment(location));
            }
            self.require(location)?;
            if let Some(own) = own
                && self.is_within(location, own)
            {
                return Err(WorldError::SelfContainment(own));
            }
        }
        for reference in [entity.zone, entity.destination].into_iter().flatten() {
            if Some(reference) != own {
                self.require(reference)?;
            }
        }
        Ok(())
    }

    /// Returns `true` if `container` appears on the location chain above `id`.
    fn is_within(&self, id: EntityId, container: EntityId) -> bool {
        let mut cursor = self.entities.get(&id).and_then(Entity::location);
        // Bounded in case a stored graph already loops.
        for _ in 0..self.entities.len() {
            match cursor {
                Some(at) if at == container => return true,
                Some(at) => cursor = self.entities.get(&at).and_then(Entity::location),
                None => return false,
            }
        }
        false
    }

    fn require(&self, id: EntityId) -> Result<(), WorldError> {
        if self.entities.contains_key(&id) {
            Ok(())
        } else {
            Err(WorldError::NoSuchEntity(id))
        }
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns [`WorldError::NoSuchEntity`] if `id` is not in the store.
    pub fn get(&self, id: EntityId) -> Result<&Entity, WorldError> {
        self.entities.get(&id).ok_or(WorldError::NoSuchEntity(id))
    }

    /// Parse `raw` (`12` or `#12`) as an id, then [`EntityStore::get`] it.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidId`] for text that is not an id.
    pub fn lookup(&self, raw: &str) -> Result<&Entity, WorldError> {
        let id: EntityId = raw.trim().parse()?;
        self.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Every entity whose location is `id`.
    #[must_use]
    pub fn contents_of(&self, id: EntityId) -> Vec<&Entity> {
        self.entities
            .values()
            .filter(|e| e.location() == Some(id))
            .collect()
    }

    /// Entities whose name partially matches `text`, in store order.
    pub fn fuzzy_name_search<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a Entity> + 'a {
        self.entities
            .values()
            .filter(move |e| fuzzy::is_match(text, &e.name))
    }

    /// Ids of every exit whose destination is `id`.
    #[must_use]
    pub fn exits_linked_to(&self, id: EntityId) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|(_, e)| e.kind().is_exit() && e.destination == Some(id))
            .map(|(exit, _)| *exit)
            .collect()
    }

    /// Ids of every entity whose zone master is `id`.
    #[must_use]
    pub fn members_of_zone(&self, id: EntityId) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|(_, e)| e.zone == Some(id))
            .map(|(member, _)| *member)
            .collect()
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(|e| e.kind().is_room())
    }

    /// The player bound to `username`, compared without case.
    #[must_use]
    pub fn find_player_by_account(&self, username: &str) -> Option<&Entity> {
        self.entities.values().find(|e| {
            e.kind().is_player()
                && e
                    .attr_str(ACCOUNT_ATTR)
                    .is_some_and(|a| a.eq_ignore_ascii_case(username))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryPersistence;
    use crate::types::{EXIT, ROOM, THING};

    async fn store() -> (EntityStore, Arc<MemoryPersistence>) {
        let backend = Arc::new(MemoryPersistence::new());
        let types = Arc::new(TypeRegistry::with_defaults().unwrap());
        let store = EntityStore::load(backend.clone(), types).await.unwrap();
        (store, backend)
    }

    async fn exit_to(store: &mut EntityStore, from: EntityId, to: EntityId, alias: &str) -> EntityId {
        let id = store.create(EXIT, alias, Attributes::new()).await.unwrap();
        store
            .modify(id, |e| {
                e.set_location(Some(from));
                e.destination = Some(to);
                e.aliases.push(alias.to_string());
            })
            .unwrap();
        store.commit().wait().await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_create_then_get_round_trip() {
        let (mut store, backend) = store().await;
        let id = store.create(THING, "X", Attributes::new()).await.unwrap();
        let entity = store.get(id).unwrap().clone();
        assert_eq!(entity.name, "X");
        assert_eq!(entity.type_path(), THING);

        let again = store.save(entity.clone()).await.unwrap();
        assert_eq!(again, id);
        let again = store.save(entity).await.unwrap();
        assert_eq!(again, id);
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_type() {
        let (mut store, _) = store().await;
        let err = store
            .create("game.objects.dragon", "Smaug", Attributes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorldError::InvalidType(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_and_lookup_validation() {
        let (store, _) = store().await;
        assert!(matches!(
            store.get(EntityId(42)),
            Err(WorldError::NoSuchEntity(_))
        ));
        assert!(matches!(store.lookup("#abc"), Err(WorldError::InvalidId(_))));
        assert!(matches!(
            store.lookup("#7"),
            Err(WorldError::NoSuchEntity(EntityId(7)))
        ));
    }

    #[tokio::test]
    async fn test_zone_master_destroy_conflict_then_success() {
        let (mut store, _) = store().await;
        let master = store.create(THING, "Zone", Attributes::new()).await.unwrap();
        let member = store.create(ROOM, "Hall", Attributes::new()).await.unwrap();
        store.modify(member, |e| e.zone = Some(master)).unwrap();
        store.commit().wait().await.unwrap();

        let err = store.destroy(master, false).await.unwrap_err();
        assert!(matches!(err, WorldError::ZoneNotEmpty { members: 1, .. }));
        assert!(store.contains(master));

        store.modify(member, |e| e.zone = None).unwrap();
        store.destroy(master, false).await.unwrap();
        assert!(!store.contains(master));
    }

    #[tokio::test]
    async fn test_cascade_clears_zone_members() {
        let (mut store, _) = store().await;
        let master = store.create(THING, "Zone", Attributes::new()).await.unwrap();
        let member = store.create(ROOM, "Hall", Attributes::new()).await.unwrap();
        store.modify(member, |e| e.zone = Some(master)).unwrap();

        store.destroy(master, true).await.unwrap();
        assert_eq!(store.get(member).unwrap().zone, None);
    }

    #[tokio::test]
    async fn test_destroy_removes_exits_to_target() {
        let (mut store, backend) = store().await;
        let hall = store.create(ROOM, "Hall", Attributes::new()).await.unwrap();
        let yard = store.create(ROOM, "Yard", Attributes::new()).await.unwrap();
        let out = exit_to(&mut store, hall, yard, "out").await;
        let back = exit_to(&mut store, yard, hall, "in").await;

        store.destroy(yard, false).await.unwrap();
        assert!(store.exits_linked_to(yard).is_empty());
        assert!(!store.contains(out));
        assert!(backend.record(out).await.is_none());
        // The exit that stood inside the yard survives but no longer has a location.
        assert_eq!(store.get(back).unwrap().location(), None);
    }

    #[tokio::test]
    async fn test_destroy_relocates_contents() {
        let (mut store, _) = store().await;
        let hall = store.create(ROOM, "Hall", Attributes::new()).await.unwrap();
        let chest = store.create(THING, "Chest", Attributes::new()).await.unwrap();
        let coin = store.create(THING, "Coin", Attributes::new()).await.unwrap();
        store.move_to(chest, Some(hall)).unwrap();
        store.move_to(coin, Some(chest)).unwrap();

        store.destroy(chest, false).await.unwrap();
        assert_eq!(store.get(coin).unwrap().location(), Some(hall));
    }

    #[tokio::test]
    async fn test_rooms_never_get_a_location() {
        let (mut store, _) = store().await;
        let hall = store.create(ROOM, "Hall", Attributes::new()).await.unwrap();
        let yard = store.create(ROOM, "Yard", Attributes::new()).await.unwrap();
        assert!(matches!(
            store.move_to(hall, Some(yard)),
            Err(WorldError::RoomHasNoLocation(_))
        ));
        assert_eq!(store.get(hall).unwrap().location(), None);
    }

    #[tokio::test]
    async fn test_move_into_own_contents_is_refused() {
        let (mut store, _) = store().await;
        let hall = store.create(ROOM, "Hall", Attributes::new()).await.unwrap();
        let chest = store.create(THING, "Chest", Attributes::new()).await.unwrap();
        let box_ = store.create(THING, "Box", Attributes::new()).await.unwrap();
        let coin = store.create(THING, "Coin", Attributes::new()).await.unwrap();
        store.move_to(chest, Some(hall)).unwrap();
        store.move_to(box_, Some(chest)).unwrap();
        store.move_to(coin, Some(box_)).unwrap();

        let err = store.move_to(chest, Some(coin)).unwrap_err();
        assert!(matches!(err, WorldError::SelfContainment(id) if id == chest));
        assert_eq!(store.get(chest).unwrap().location(), Some(hall));

        store.move_to(coin, Some(hall)).unwrap();
        store.move_to(box_, Some(coin)).unwrap();
    }

    #[tokio::test]
    async fn test_staged_insert_is_visible_before_it_is_durable() {
        let (mut store, backend) = store().await;
        let def = store.types().resolve(THING).unwrap();
        let id = store.insert_staged(def.construct("Lamp")).unwrap();
        assert_eq!(store.get(id).unwrap().name, "Lamp");
        assert!(backend.record(id).await.is_none());

        store.commit().wait().await.unwrap();
        assert_eq!(backend.record(id).await.unwrap().name, "Lamp");
        let next = store.create(THING, "Rock", Attributes::new()).await.unwrap();
        assert!(next > id);
    }

    #[tokio::test]
    async fn test_modify_rejects_dangling_location() {
        let (mut store, _) = store().await;
        let lamp = store.create(THING, "Lamp", Attributes::new()).await.unwrap();
        let err = store.move_to(lamp, Some(EntityId(999))).unwrap_err();
        assert!(matches!(err, WorldError::NoSuchEntity(EntityId(999))));
        assert!(!store.has_staged());
    }

    #[tokio::test]
    async fn test_contents_and_fuzzy_search() {
        let (mut store, _) = store().await;
        let hall = store.create(ROOM, "Hall", Attributes::new()).await.unwrap();
        let lamp = store.create(THING, "brass lamp", Attributes::new()).await.unwrap();
        store.create(THING, "rock", Attributes::new()).await.unwrap();
        store.move_to(lamp, Some(hall)).unwrap();

        let contents: Vec<_> = store.contents_of(hall).iter().filter_map(|e| e.id()).collect();
        assert_eq!(contents, vec![lamp]);

        let hits: Vec<_> = store.fuzzy_name_search("lamp").filter_map(|e| e.id()).collect();
        assert_eq!(hits, vec![lamp]);
        // Restartable.
        assert_eq!(store.fuzzy_name_search("lamp").count(), 1);
    }

    #[tokio::test]
    async fn test_reload_rebuilds_graph() {
        let backend = Arc::new(MemoryPersistence::new());
        let types = Arc::new(TypeRegistry::with_defaults().unwrap());
        let (hall, lamp) = {
            let mut store = EntityStore::load(backend.clone(), types.clone()).await.unwrap();
            let hall = store.create(ROOM, "Hall", Attributes::new()).await.unwrap();
            let lamp = store.create(THING, "Lamp", Attributes::new()).await.unwrap();
            store.move_to(lamp, Some(hall)).unwrap();
            store.commit().wait().await.unwrap();
            (hall, lamp)
        };

        let store = EntityStore::load(backend, types).await.unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(lamp).unwrap().location(), Some(hall));
        assert_eq!(store.rooms().count(), 1);
    }

    #[tokio::test]
    async fn test_find_player_by_account() {
        let (mut store, _) = store().await;
        let mut attrs = Attributes::new();
        attrs.insert(ACCOUNT_ATTR.to_string(), serde_json::json!("Alice"));
        let id = store
            .create(crate::types::PLAYER, "Alice", attrs)
            .await
            .unwrap();
        assert_eq!(
            store.find_player_by_account("alice").and_then(|e| e.id()),
            Some(id)
        );
        assert!(store.find_player_by_account("bob").is_none());
    }
}
