//! NATS subject hierarchy.
//!
//! All subjects are prefixed with `mud.` to namespace within a shared NATS
//! cluster. Requests served by the world process live under `mud.world.`,
//! requests served by the proxy under `mud.proxy.`.

/// Root prefix for all subjects.
pub const PREFIX: &str = "mud";

// ── Served by the world ─────────────────────────────────────────────────────

/// Wildcard the world subscribes to.
pub const WORLD_ALL: &str = "mud.world.>";

/// Prefix stripped from world subjects to obtain the operation name.
pub const WORLD_PREFIX: &str = "mud.world";

/// Create (or re-bind) the player entity for an account. Proxy → World.
pub const WORLD_CREATE_ENTITY: &str = "mud.world.create_entity";

/// Route a line of player input through an entity. Proxy → World.
pub const WORLD_INPUT: &str = "mud.world.input";

/// First session bound to an entity. Proxy → World.
pub const WORLD_SESSION_FIRST: &str = "mud.world.session.first";

/// Last session controlling an entity went away. Proxy → World.
pub const WORLD_SESSION_LAST: &str = "mud.world.session.last";

/// Stop the world process. Proxy → World.
pub const WORLD_SHUTDOWN: &str = "mud.world.shutdown";

// ── Served by the proxy ─────────────────────────────────────────────────────

/// Wildcard the proxy subscribes to.
pub const PROXY_ALL: &str = "mud.proxy.>";

/// Prefix stripped from proxy subjects to obtain the operation name.
pub const PROXY_PREFIX: &str = "mud.proxy";

/// Deliver text to every session controlling an entity. World → Proxy.
pub const PROXY_EMIT: &str = "mud.proxy.emit";

/// List connected accounts. World → Proxy.
pub const PROXY_WHO: &str = "mud.proxy.who";

/// Disconnect every session controlling an entity. World → Proxy.
pub const PROXY_DISCONNECT: &str = "mud.proxy.disconnect";

/// Ask the proxy to restart its listener. World → Proxy.
pub const PROXY_RESTART: &str = "mud.proxy.restart";

/// Strip `prefix` and the following dot from `subject`, yielding the
/// operation name (e.g. `"session.first"`).
#[must_use]
pub fn operation<'a>(prefix: &str, subject: &'a str) -> Option<&'a str> {
    subject.strip_prefix(prefix)?.strip_prefix('.')
}
