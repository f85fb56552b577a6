//! Entity variants and the capabilities attached to each.
//!
//! The world graph is heterogeneous, but the set of variants is closed per
//! deployment. Behaviour that other codebases express through class
//! inheritance (a ship is a thing, a bridge is a room that belongs to a ship,
//! a hangar is a room that can berth ships) is expressed here as capability
//! queries selected by tag.

use serde::{Deserialize, Serialize};

/// The variant of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A place. Rooms are roots: they never have a location.
    Room,
    /// A movable object.
    Thing,
    /// A thing that links its location to a destination.
    Exit,
    /// A thing controlled by an account.
    Player,
    /// A thing that can travel and be berthed in a hangar.
    Ship,
    /// A room that is the control deck of a ship.
    Bridge,
    /// A room that can berth ships.
    Hangar,
}

impl EntityKind {
    /// All variants, in declaration order.
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Room,
        EntityKind::Thing,
        EntityKind::Exit,
        EntityKind::Player,
        EntityKind::Ship,
        EntityKind::Bridge,
        EntityKind::Hangar,
    ];

    /// Returns `true` for room-like variants, which never have a location.
    #[must_use]
    pub const fn is_room(self) -> bool {
        matches!(self, EntityKind::Room | EntityKind::Bridge | EntityKind::Hangar)
    }

    /// Returns `true` for thing-like variants, which may have a location.
    #[must_use]
    pub const fn is_thing(self) -> bool {
        !self.is_room()
    }

    #[must_use]
    pub const fn is_exit(self) -> bool {
        matches!(self, EntityKind::Exit)
    }

    #[must_use]
    pub const fn is_player(self) -> bool {
        matches!(self, EntityKind::Player)
    }

    /// Returns `true` if this variant is a vessel that can be berthed.
    #[must_use]
    pub const fn is_vessel(self) -> bool {
        matches!(self, EntityKind::Ship)
    }

    /// Returns `true` if entities of this variant can berth vessels.
    #[must_use]
    pub const fn docks_vessels(self) -> bool {
        matches!(self, EntityKind::Hangar)
    }

    /// A short lowercase label, used in listings and log fields.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            EntityKind::Room => "room",
            EntityKind::Thing => "thing",
            EntityKind::Exit => "exit",
            EntityKind::Player => "player",
            EntityKind::Ship => "ship",
            EntityKind::Bridge => "bridge",
            EntityKind::Hangar => "hangar",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
