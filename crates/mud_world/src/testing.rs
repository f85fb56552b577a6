//! Shared fixture for command tests.
//!
//! Two rooms joined by exits, two players in the hall, Alice connected.

#![allow(dead_code)]

use std::sync::Arc;

use mud_entity::{Attributes, EntityId};

use crate::command::{Outbound, default_tables};
use crate::persistence::MemoryPersistence;
use crate::store::EntityStore;
use crate::types::{EXIT, PLAYER, ROOM, THING, TypeRegistry};
use crate::world::World;

pub struct Harness {
    pub world: World,
    pub hall: EntityId,
    pub yard: EntityId,
    pub north: EntityId,
    pub south: EntityId,
    pub alice: EntityId,
    pub bob: EntityId,
    last: Vec<Outbound>,
}

impl Harness {
    pub async fn new() -> Self {
        let types = Arc::new(TypeRegistry::with_defaults().unwrap());
        let mut world = World::load(
            Arc::new(MemoryPersistence::new()),
            types,
            default_tables().unwrap(),
            None,
        )
        .await
        .unwrap();

        let store = world.store_mut();
        let limbo = store.rooms().find_map(|r| r.id()).unwrap();
        store
            .modify(limbo, |e| e.name = "Great Hall".to_string())
            .unwrap();
        let hall = limbo;
        let yard = store.create(ROOM, "Yard", Attributes::new()).await.unwrap();
        let north = link(store, hall, yard, "north", "n").await;
        let south = link(store, yard, hall, "south", "s").await;
        let alice = store.create(PLAYER, "Alice", Attributes::new()).await.unwrap();
        let bob = store.create(PLAYER, "Bob", Attributes::new()).await.unwrap();
        store.move_to(alice, Some(hall)).unwrap();
        store.move_to(bob, Some(hall)).unwrap();
        store.commit().wait().await.unwrap();

        let mut harness = Self {
            world,
            hall,
            yard,
            north,
            south,
            alice,
            bob,
            last: Vec::new(),
        };
        harness.connect(alice);
        harness
    }

    pub fn store(&mut self) -> &mut EntityStore {
        self.world.store_mut()
    }

    pub async fn create(&mut self, type_path: &str, name: &str, attrs: Attributes) -> EntityId {
        self.store().create(type_path, name, attrs).await.unwrap()
    }

    /// A thing named `name` inside `location`.
    pub async fn thing(&mut self, name: &str, location: EntityId) -> EntityId {
        let id = self.create(THING, name, Attributes::new()).await;
        self.store().move_to(id, Some(location)).unwrap();
        id
    }

    pub fn connect(&mut self, entity: EntityId) {
        self.world.at_connect(entity).unwrap();
    }

    pub fn make_admin(&mut self, entity: EntityId) {
        self.store().modify(entity, |e| e.admin = true).unwrap();
    }

    pub fn location_of(&self, entity: EntityId) -> Option<EntityId> {
        self.world.store().get(entity).ok().and_then(|e| e.location())
    }

    /// Run `text` as `who` and return the lines `who` received.
    pub fn input(&mut self, who: EntityId, text: &str) -> Vec<String> {
        let outcome = self.world.execute_command(who, text).unwrap();
        self.last = outcome.outbound;
        self.lines_for(who)
    }

    /// Lines addressed to `entity` by the last input.
    pub fn lines_for(&self, entity: EntityId) -> Vec<String> {
        self.last
            .iter()
            .filter_map(|o| match o {
                Outbound::Emit { entity: to, text } if *to == entity => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn outbound(&self) -> &[Outbound] {
        &self.last
    }
}

async fn link(store: &mut EntityStore, from: EntityId, to: EntityId, name: &str, alias: &str) -> EntityId {
    let exit = store.create(EXIT, name, Attributes::new()).await.unwrap();
    store
        .modify(exit, |e| {
            e.set_location(Some(from));
            e.destination = Some(to);
            e.aliases = vec![name.to_string(), alias.to_string()];
        })
        .unwrap();
    exit
}
