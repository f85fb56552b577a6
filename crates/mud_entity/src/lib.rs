//! # mud_entity
//!
//! The data model of the world graph, shared by the proxy and the world
//! process.
//!
//! This crate provides:
//!
//! - [`EntityId`]: stable integer identity assigned on first persistence.
//! - [`IdAllocator`]: monotonically increasing, never-reused id source.
//! - [`EntityKind`]: the closed set of entity variants and their capabilities.
//! - [`Entity`] / [`EntityRecord`]: the in-memory node and its persisted form.
//! - [`ErrorKind`]: the error taxonomy every crate maps its errors onto.

pub mod entity;
pub mod error;
pub mod kind;

pub use entity::{Attributes, Entity, EntityId, EntityRecord, IdAllocator, InvalidEntityId};
pub use error::ErrorKind;
pub use kind::EntityKind;
