//! Entity identity, the in-memory entity node and its persisted record.
//!
//! An [`EntityId`] is a lightweight `u64` identifier. Ids are assigned by the
//! persistence layer when an entity is first saved and are never reused after
//! the entity is destroyed.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::kind::EntityKind;

/// Open-ended user-defined key/value pairs carried by every entity.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// A unique entity identifier.
///
/// Rendered as `#<n>` in text, which is also the form players type to refer
/// to an entity by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Create an entity id from a raw `u64`.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` identifier.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Text that does not denote an entity id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a valid entity id")]
pub struct InvalidEntityId(pub String);

impl FromStr for EntityId {
    type Err = InvalidEntityId;

    /// Parses `12` or `#12`. Anything that is not a `u64` is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
        digits
            .parse::<u64>()
            .map(EntityId)
            .map_err(|_| InvalidEntityId(s.to_string()))
    }
}

/// Allocates monotonically increasing entity ids.
///
/// The allocator is seeded past the highest id ever handed out, so an id that
/// belonged to a destroyed entity is never reissued.
#[derive(Debug)]
pub struct IdAllocator {
    next_id: u64,
}

impl IdAllocator {
    /// Creates a new allocator. Ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Creates an allocator whose next id is `next_id` (clamped to at least 1).
    #[must_use]
    pub fn starting_at(next_id: u64) -> Self {
        Self {
            next_id: next_id.max(1),
        }
    }

    /// Allocates a fresh id.
    pub fn allocate(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        EntityId(id)
    }

    /// Ensures ids at or below `id` are never handed out.
    pub fn observe(&mut self, id: EntityId) {
        if id.0 >= self.next_id {
            self.next_id = id.0 + 1;
        }
    }

    /// The id the next call to [`IdAllocator::allocate`] will return.
    #[must_use]
    pub fn peek(&self) -> u64 {
        self.next_id
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// The persisted form of an entity: every field except the id (which is the
/// storage key) and the kind (which is re-derived from `type_path` on load).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub type_path: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_description: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<EntityId>,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub attributes: Attributes,
}

/// A node of the world graph.
///
/// Entities are heterogeneous: their behaviour is selected by [`EntityKind`],
/// which the type resolver derives from `type_path`. An entity that has not
/// been persisted yet has no id.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    id: Option<EntityId>,
    type_path: String,
    kind: EntityKind,
    /// Display name.
    pub name: String,
    pub description: String,
    /// Shown instead of `description` to observers inside the entity.
    pub internal_description: Option<String>,
    /// Alternative names, matched case-insensitively.
    pub aliases: Vec<String>,
    location: Option<EntityId>,
    /// The zone master this entity belongs to, if any.
    pub zone: Option<EntityId>,
    /// Where an exit leads.
    pub destination: Option<EntityId>,
    /// Admin rank. Only meaningful for players.
    pub admin: bool,
    pub attributes: Attributes,
}

impl Entity {
    /// Construct a fresh, unsaved entity.
    #[must_use]
    pub fn new(type_path: impl Into<String>, kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            id: None,
            type_path: type_path.into(),
            kind,
            name: name.into(),
            description: String::new(),
            internal_description: None,
            aliases: Vec::new(),
            location: None,
            zone: None,
            destination: None,
            admin: false,
            attributes: Attributes::new(),
        }
    }

    /// Rebuild an entity from its persisted record.
    ///
    /// A room-kind record that somehow carries a location has it dropped.
    #[must_use]
    pub fn from_record(id: EntityId, kind: EntityKind, record: EntityRecord) -> Self {
        Self {
            id: Some(id),
            type_path: record.type_path,
            kind,
            name: record.name,
            description: record.description,
            internal_description: record.internal_description,
            aliases: record.aliases,
            location: if kind.is_room() { None } else { record.location },
            zone: record.zone,
            destination: record.destination,
            admin: record.admin,
            attributes: record.attributes,
        }
    }

    /// The persisted form of this entity.
    #[must_use]
    pub fn to_record(&self) -> EntityRecord {
        EntityRecord {
            type_path: self.type_path.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            internal_description: self.internal_description.clone(),
            aliases: self.aliases.clone(),
            location: self.location,
            zone: self.zone,
            destination: self.destination,
            admin: self.admin,
            attributes: self.attributes.clone(),
        }
    }

    /// The id, or `None` if the entity has never been persisted.
    #[must_use]
    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    /// Assign the id handed out by the persistence layer.
    ///
    /// An entity's id never changes once assigned; later calls are ignored.
    pub fn assign_id(&mut self, id: EntityId) {
        if self.id.is_none() {
            self.id = Some(id);
        }
    }

    #[must_use]
    pub fn type_path(&self) -> &str {
        &self.type_path
    }

    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    #[must_use]
    pub fn location(&self) -> Option<EntityId> {
        self.location
    }

    /// Set the location. Rooms never have a location, so this returns `false`
    /// and leaves the entity untouched when asked to place a room somewhere.
    pub fn set_location(&mut self, location: Option<EntityId>) -> bool {
        if self.kind.is_room() && location.is_some() {
            return false;
        }
        self.location = location;
        true
    }

    /// Returns `true` if `text` equals one of the aliases, ignoring case.
    #[must_use]
    pub fn has_alias(&self, text: &str) -> bool {
        self.aliases.iter().any(|a| a.eq_ignore_ascii_case(text))
    }

    /// Read a string attribute.
    #[must_use]
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }

    /// `Name(#id)` for admin listings, or just the name for unsaved entities.
    #[must_use]
    pub fn display_with_id(&self) -> String {
        match self.id {
            Some(id) => format!("{}({})", self.name, id),
            None => self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_display_and_parse() {
        let id = EntityId::from_raw(42);
        assert_eq!(id.to_string(), "#42");
        assert_eq!("#42".parse::<EntityId>().unwrap(), id);
        assert_eq!("42".parse::<EntityId>().unwrap(), id);
    }

    #[test]
    fn test_entity_id_rejects_non_integer() {
        assert!("#abc".parse::<EntityId>().is_err());
        assert!("-3".parse::<EntityId>().is_err());
        assert!("#".parse::<EntityId>().is_err());
        assert!("99999999999999999999999".parse::<EntityId>().is_err());
    }

    #[test]
    fn test_allocator_never_reuses_observed_ids() {
        let mut alloc = IdAllocator::new();
        alloc.observe(EntityId(10));
        assert_eq!(alloc.allocate(), EntityId(11));
        alloc.observe(EntityId(3));
        assert_eq!(alloc.allocate(), EntityId(12));
        assert_eq!(alloc.peek(), 13);
    }

    #[test]
    fn test_room_refuses_location() {
        let mut room = Entity::new("game.objects.room", EntityKind::Room, "Limbo");
        assert!(!room.set_location(Some(EntityId(1))));
        assert_eq!(room.location(), None);
        assert!(room.set_location(None));
    }

    #[test]
    fn test_assign_id_is_sticky() {
        let mut thing = Entity::new("game.objects.thing", EntityKind::Thing, "rock");
        assert_eq!(thing.id(), None);
        thing.assign_id(EntityId(5));
        thing.assign_id(EntityId(6));
        assert_eq!(thing.id(), Some(EntityId(5)));
    }

    #[test]
    fn test_alias_match_ignores_case() {
        let mut exit = Entity::new("game.objects.exit", EntityKind::Exit, "North");
        exit.aliases = vec!["n".to_string(), "North".to_string()];
        assert!(exit.has_alias("N"));
        assert!(exit.has_alias("north"));
        assert!(!exit.has_alias("south"));
    }

    #[test]
    fn test_record_preserves_attributes() {
        let mut thing = Entity::new("game.objects.thing", EntityKind::Thing, "lamp");
        thing
            .attributes
            .insert("lit".to_string(), serde_json::json!(true));
        thing.description = "A brass lamp.".to_string();
        let record = thing.to_record();
        let restored = Entity::from_record(EntityId(3), EntityKind::Thing, record.clone());
        assert_eq!(restored.to_record(), record);
        assert_eq!(restored.id(), Some(EntityId(3)));
    }

    #[test]
    fn test_record_msgpack_roundtrip() {
        let record = Entity::new("game.objects.player", EntityKind::Player, "Bob").to_record();
        let bytes = rmp_serde::to_vec_named(&record).unwrap();
        let restored: EntityRecord = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(record, restored);
    }
}
