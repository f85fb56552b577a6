//! Shared fixtures for connection and server tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mud_entity::EntityId;
use mud_net::NetError;
use tokio::sync::Semaphore;

use crate::account::{AccountStore, test_hasher};
use crate::connection::ProxyContext;
use crate::link::WorldLink;
use crate::mail::LogMailer;
use crate::manager::SessionManager;

/// Records every call. New accounts always get entity `#9`.
#[derive(Debug, Default)]
pub struct MockWorld {
    pub calls: Mutex<Vec<String>>,
    /// Fail input with [`NetError::Unreachable`].
    pub unreachable: bool,
    /// Each last-session notice waits for a permit before it is recorded.
    pub hold_last: Option<Arc<Semaphore>>,
}

impl MockWorld {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl WorldLink for MockWorld {
    async fn create_entity_for_account(&self, username: &str) -> Result<EntityId, NetError> {
        self.record(format!("create {username}"));
        Ok(EntityId(9))
    }

    async fn send_input(&self, entity: EntityId, text: &str) -> Result<(), NetError> {
        self.record(format!("input {entity} {text}"));
        if self.unreachable {
            return Err(NetError::Unreachable {
                subject: "mud.world.input".into(),
            });
        }
        Ok(())
    }

    async fn first_session_connected(&self, entity: EntityId) -> Result<(), NetError> {
        self.record(format!("first {entity}"));
        Ok(())
    }

    async fn last_session_disconnected(&self, entity: EntityId) -> Result<(), NetError> {
        if let Some(hold) = &self.hold_last {
            hold.acquire().await.unwrap().forget();
        }
        self.record(format!("last {entity}"));
        Ok(())
    }

    async fn shutdown_world(&self) -> Result<(), NetError> {
        self.record("shutdown".to_string());
        Ok(())
    }
}

/// A context with one account, `dave` / `letmein`.
pub async fn context(world: Arc<MockWorld>) -> ProxyContext {
    let accounts = AccountStore::in_memory(test_hasher());
    accounts
        .create_account("dave", "letmein", "d@x.com")
        .await
        .unwrap();
    ProxyContext {
        manager: Arc::new(SessionManager::new()),
        accounts: Arc::new(accounts),
        mailer: Arc::new(LogMailer),
        world,
        max_line_len: 64,
    }
}
