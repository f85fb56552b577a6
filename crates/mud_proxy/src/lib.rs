//! # mud_proxy
//!
//! The long-lived half of the MUD. The proxy owns every player connection
//! and every account, and forwards authenticated input to the world process
//! over NATS. The world can be restarted underneath it without dropping a
//! connection.
//!
//! This crate provides:
//!
//! - [`account`]: the account store and keyed password hashing.
//! - [`shell`]: the login and registration dialogue.
//! - [`session`] and [`manager`]: live connections and who controls what.
//! - [`connection`]: the per-connection task.
//! - [`server`]: the accept loop, idle sweeper and restart handling.
//! - [`api`]: requests the world sends to the proxy.
//! - [`mail`]: delivery of generated passwords.

pub mod account;
pub mod api;
pub mod config;
pub mod connection;
pub mod error;
pub mod link;
pub mod mail;
pub mod manager;
pub mod server;
pub mod session;
pub mod shell;

#[cfg(test)]
mod testing;

pub use account::{Account, AccountStore, PasswordHasher};
pub use error::{AccountError, ProxyError};
pub use manager::SessionManager;
pub use server::ProxyExit;
