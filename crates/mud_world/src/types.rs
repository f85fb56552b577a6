//! Type resolver.
//!
//! Maps a type path such as `game.objects.room` onto a [`TypeDef`]: the
//! entity kind it constructs, its default description and any command tables
//! attached to entities of that type. Only registered types resolve.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use mud_entity::{Entity, EntityKind};

use crate::command::CommandTable;
use crate::command::local;
use crate::error::WorldError;

pub const ROOM: &str = "game.objects.room";
pub const THING: &str = "game.objects.thing";
pub const EXIT: &str = "game.objects.exit";
pub const PLAYER: &str = "game.objects.player";
pub const SHIP: &str = "game.space.ship";
pub const BRIDGE: &str = "game.space.bridge";
pub const HANGAR: &str = "game.space.hangar";

/// The behaviour set behind a type path.
#[derive(Debug, Clone)]
pub struct TypeDef {
    path: String,
    kind: EntityKind,
    default_description: String,
    local: Option<Arc<CommandTable>>,
    local_admin: Option<Arc<CommandTable>>,
}

impl TypeDef {
    #[must_use]
    pub fn new(path: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            path: path.into(),
            kind,
            default_description: String::new(),
            local: None,
            local_admin: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.default_description = description.into();
        self
    }

    /// Commands available to anyone standing inside an entity of this type.
    #[must_use]
    pub fn with_local_commands(mut self, table: CommandTable) -> Self {
        self.local = Some(Arc::new(table));
        self
    }

    /// Commands available to admins standing inside an entity of this type.
    #[must_use]
    pub fn with_local_admin_commands(mut self, table: CommandTable) -> Self {
        self.local_admin = Some(Arc::new(table));
        self
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    #[must_use]
    pub fn local_commands(&self) -> Option<&Arc<CommandTable>> {
        self.local.as_ref()
    }

    #[must_use]
    pub fn local_admin_commands(&self) -> Option<&Arc<CommandTable>> {
        self.local_admin.as_ref()
    }

    /// A fresh, unsaved entity of this type.
    #[must_use]
    pub fn construct(&self, name: impl Into<String>) -> Entity {
        let mut entity = Entity::new(self.path.clone(), self.kind, name);
        entity.description = self.default_description.clone();
        entity
    }
}

/// Registry of known types with a concurrent resolution cache.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<TypeDef>>,
    cache: DashMap<String, Arc<TypeDef>>,
}

impl TypeRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry populated with the built-in room, thing, exit, player and
    /// spacefaring types.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateCommand`] if a built-in local table is
    /// malformed.
    pub fn with_defaults() -> Result<Self, WorldError> {
        let mut registry = Self::new();
        registry.register(
            TypeDef::new(ROOM, EntityKind::Room)
                .with_description("A featureless room."),
        )?;
        registry.register(TypeDef::new(THING, EntityKind::Thing))?;
        registry.register(TypeDef::new(EXIT, EntityKind::Exit))?;
        registry.register(
            TypeDef::new(PLAYER, EntityKind::Player)
                .with_description("An unremarkable adventurer."),
        )?;
        registry.register(
            TypeDef::new(SHIP, EntityKind::Ship).with_description("A small spacecraft."),
        )?;
        registry.register(
            TypeDef::new(BRIDGE, EntityKind::Bridge)
                .with_description("Consoles line the walls of the bridge.")
                .with_local_commands(local::bridge_commands()?)
                .with_local_admin_commands(local::bridge_admin_commands()?),
        )?;
        registry.register(
            TypeDef::new(HANGAR, EntityKind::Hangar)
                .with_description("A cavernous hangar bay.")
                .with_local_commands(local::hangar_commands()?),
        )?;
        Ok(registry)
    }

    /// Register a type under its full path.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateType`] if the path (compared without
    /// case) is already taken.
    pub fn register(&mut self, def: TypeDef) -> Result<(), WorldError> {
        let key = def.path.to_ascii_lowercase();
        if self.types.contains_key(&key) {
            return Err(WorldError::DuplicateType(def.path));
        }
        self.types.insert(key, Arc::new(def));
        self.cache.clear();
        Ok(())
    }

    /// Resolve a type path, or its final segment, to a [`TypeDef`].
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidType`] if nothing matches, or if a bare
    /// segment matches more than one registered type.
    pub fn resolve(&self, type_path: &str) -> Result<Arc<TypeDef>, WorldError> {
        let key = type_path.trim().to_ascii_lowercase();
        if let Some(hit) = self.cache.get(&key) {
            return Ok(Arc::clone(hit.value()));
        }

        let def = self
            .lookup_uncached(&key)
            .ok_or_else(|| WorldError::InvalidType(type_path.to_string()))?;
        self.cache.insert(key, Arc::clone(&def));
        Ok(def)
    }

    fn lookup_uncached(&self, key: &str) -> Option<Arc<TypeDef>> {
        if key.is_empty() {
            return None;
        }
        if let Some(def) = self.types.get(key) {
            return Some(Arc::clone(def));
        }
        if key.contains('.') {
            return None;
        }

        let mut found = self
            .types
            .iter()
            .filter(|(path, _)| path.rsplit('.').next() == Some(key))
            .map(|(_, def)| def);
        let first = found.next()?;
        if found.next().is_some() {
            return None;
        }
        Some(Arc::clone(first))
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Number of cached resolutions.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
