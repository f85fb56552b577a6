//! The world-facing calls a connection makes.

use async_trait::async_trait;
use mud_entity::EntityId;
use mud_net::{NetError, WorldClient};

#[async_trait]
pub trait WorldLink: Send + Sync + std::fmt::Debug {
    async fn create_entity_for_account(&self, username: &str) -> Result<EntityId, NetError>;
    async fn send_input(&self, entity: EntityId, text: &str) -> Result<(), NetError>;
    async fn first_session_connected(&self, entity: EntityId) -> Result<(), NetError>;
    async fn last_session_disconnected(&self, entity: EntityId) -> Result<(), NetError>;
    async fn shutdown_world(&self) -> Result<(), NetError>;
}

#[async_trait]
impl WorldLink for WorldClient {
    async fn create_entity_for_account(&self, username: &str) -> Result<EntityId, NetError> {
        WorldClient::create_entity_for_account(self, username).await
    }

    async fn send_input(&self, entity: EntityId, text: &str) -> Result<(), NetError> {
        WorldClient::send_input(self, entity, text).await
    }

    async fn first_session_connected(&self, entity: EntityId) -> Result<(), NetError> {
        self.notify_first_session_connected(entity).await
    }

    async fn last_session_disconnected(&self, entity: EntityId) -> Result<(), NetError> {
        self.notify_last_session_disconnected(entity).await
    }

    async fn shutdown_world(&self) -> Result<(), NetError> {
        WorldClient::shutdown_world(self).await
    }
}
