//! Contextual object resolution: free text → entity, as seen by the invoker.

use mud_entity::{Entity, EntityId};

use crate::fuzzy;
use crate::store::EntityStore;

/// Resolve `text` to an entity from the point of view of `invoker`.
///
/// In order:
///
/// 1. `#<id>`: any existing entity for admins; otherwise only something in
///    the invoker's location or the location itself.
/// 2. `me` and `here`.
/// 3. An exact alias among the location's contents, then the invoker's own.
/// 4. The best fuzzy name match among the location's contents, then the
///    invoker's own.
#[must_use]
pub fn resolve_reference(store: &EntityStore, invoker: EntityId, text: &str) -> Option<EntityId> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let me = store.get(invoker).ok()?;
    let here = me.location();

    if let Some(raw) = text.strip_prefix('#') {
        return by_id(store, me, raw);
    }
    if text.eq_ignore_ascii_case("me") {
        return Some(invoker);
    }
    if text.eq_ignore_ascii_case("here") {
        return here;
    }

    let mut scopes: Vec<Vec<&Entity>> = Vec::with_capacity(2);
    if let Some(location) = here {
        scopes.push(store.contents_of(location));
    }
    scopes.push(store.contents_of(invoker));

    for scope in &scopes {
        if let Some(hit) = scope.iter().find(|e| e.has_alias(text)) {
            return hit.id();
        }
    }
    scopes.iter().find_map(|scope| best_fuzzy(scope, text))
}

fn by_id(store: &EntityStore, me: &Entity, raw: &str) -> Option<EntityId> {
    let id: EntityId = raw.parse().ok()?;
    let target = store.get(id).ok()?;
    if me.admin {
        return Some(id);
    }
    let here = me.location()?;
    if id == here || target.location() == Some(here) {
        Some(id)
    } else {
        None
    }
}

fn best_fuzzy(scope: &[&Entity], text: &str) -> Option<EntityId> {
    let mut best: Option<(u8, EntityId)> = None;
    for entity in scope {
        let score = fuzzy::partial_ratio(text, &entity.name);
        if score <= fuzzy::FUZZY_THRESHOLD {
            continue;
        }
        if best.is_none_or(|(top, _)| score > top) {
            best = entity.id().map(|id| (score, id));
        }
    }
    best.map(|(_, id)| id)
}
