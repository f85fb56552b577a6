//! # mud_world
//!
//! The world side of the MUD: the entity graph and everything that reads or
//! changes it.
//!
//! This crate provides:
//!
//! - [`store`]: the in-memory entity graph and its persistence contract.
//! - [`persistence`]: storage backends and the ordered write queue.
//! - [`types`]: the type registry that turns type paths into entity kinds.
//! - [`command`]: parsing, dispatch and the built-in commands.
//! - [`world`]: the single-owner world that ties them together.
//! - [`api`] and [`outbox`]: the NATS boundary with the proxy.

pub mod api;
pub mod command;
pub mod config;
pub mod error;
pub mod fuzzy;
pub mod outbox;
pub mod persistence;
pub mod store;
pub mod types;
pub mod world;

#[cfg(test)]
mod testing;

pub use error::{CommandError, PersistenceError, WorldError};
pub use store::EntityStore;
pub use types::TypeRegistry;
pub use world::World;
