//! Typed clients for both directions of the boundary.
//!
//! Each method is one remote call; the `.await` at the call site is the
//! suspension point.

use mud_entity::EntityId;

use crate::connection::NatsConnection;
use crate::error::NetError;
use crate::messages::{
    Ack, ConnectedAccount, CreateEntityForAccount, DisconnectSessionsOnEntity, EmitToEntity,
    EntityCreated, NotifyFirstSessionConnected, NotifyLastSessionDisconnected, RestartProxy,
    SendInputThroughEntity, SessionsDisconnected, ShutdownWorld, WhoConnected, WhoConnectedReply,
};
use crate::subjects;

/// Calls served by the world process. Used by the proxy.
#[derive(Debug, Clone)]
pub struct WorldClient {
    conn: NatsConnection,
}

impl WorldClient {
    #[must_use]
    pub fn new(conn: NatsConnection) -> Self {
        Self { conn }
    }

    /// Create, or look up, the player entity for `username`.
    pub async fn create_entity_for_account(&self, username: &str) -> Result<EntityId, NetError> {
        let reply: EntityCreated = self
            .conn
            .request(
                subjects::WORLD_CREATE_ENTITY,
                &CreateEntityForAccount {
                    username: username.to_string(),
                },
            )
            .await?;
        Ok(reply.entity_id)
    }

    /// Execute one line of input as `entity_id`.
    pub async fn send_input(&self, entity_id: EntityId, text: &str) -> Result<(), NetError> {
        let _: Ack = self
            .conn
            .request(
                subjects::WORLD_INPUT,
                &SendInputThroughEntity {
                    entity_id,
                    text: text.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    pub async fn notify_first_session_connected(&self, entity_id: EntityId) -> Result<(), NetError> {
        let _: Ack = self
            .conn
            .request(
                subjects::WORLD_SESSION_FIRST,
                &NotifyFirstSessionConnected { entity_id },
            )
            .await?;
        Ok(())
    }

    pub async fn notify_last_session_disconnected(
        &self,
        entity_id: EntityId,
    ) -> Result<(), NetError> {
        let _: Ack = self
            .conn
            .request(
                subjects::WORLD_SESSION_LAST,
                &NotifyLastSessionDisconnected { entity_id },
            )
            .await?;
        Ok(())
    }

    pub async fn shutdown_world(&self) -> Result<(), NetError> {
        let _: Ack = self
            .conn
            .request(subjects::WORLD_SHUTDOWN, &ShutdownWorld)
            .await?;
        Ok(())
    }
}

/// Calls served by the proxy process. Used by the world.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    conn: NatsConnection,
}

impl ProxyClient {
    #[must_use]
    pub fn new(conn: NatsConnection) -> Self {
        Self { conn }
    }

    pub async fn emit_to_entity(&self, entity_id: EntityId, text: &str) -> Result<(), NetError> {
        let _: Ack = self
            .conn
            .request(
                subjects::PROXY_EMIT,
                &EmitToEntity {
                    entity_id,
                    text: text.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    pub async fn who_connected(&self) -> Result<Vec<ConnectedAccount>, NetError> {
        let reply: WhoConnectedReply = self
            .conn
            .request(subjects::PROXY_WHO, &WhoConnected)
            .await?;
        Ok(reply.accounts)
    }

    /// Returns how many sessions were dropped.
    pub async fn disconnect_sessions_on_entity(
        &self,
        entity_id: EntityId,
    ) -> Result<usize, NetError> {
        let reply: SessionsDisconnected = self
            .conn
            .request(
                subjects::PROXY_DISCONNECT,
                &DisconnectSessionsOnEntity { entity_id },
            )
            .await?;
        Ok(reply.count)
    }

    pub async fn restart_proxy(&self) -> Result<(), NetError> {
        let _: Ack = self
            .conn
            .request(subjects::PROXY_RESTART, &RestartProxy)
            .await?;
        Ok(())
    }
}
