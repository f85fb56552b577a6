//! # mud_net
//!
//! NATS transport for the boundary between the connection proxy and the
//! world process.
//!
//! The proxy owns player connections and never touches the entity graph; the
//! world owns the graph and never touches sockets. Everything that crosses
//! between them is a named request/reply pair defined here, so the world can
//! be restarted without dropping a single connection.
//!
//! This crate provides:
//!
//! - [`subjects`]: subject names for each remote call.
//! - [`messages`]: request and reply payloads.
//! - [`codec`]: MessagePack serialisation helpers.
//! - [`connection`]: NATS connection with typed request/reply.
//! - [`rpc`]: typed clients for each side of the boundary.
//! - [`error`]: network-layer error types.

pub mod codec;
pub mod connection;
pub mod error;
pub mod messages;
pub mod rpc;
pub mod subjects;

pub use codec::{decode, encode};
pub use connection::NatsConnection;
pub use error::NetError;
pub use rpc::{ProxyClient, WorldClient};
