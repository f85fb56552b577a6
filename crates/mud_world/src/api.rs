//! NATS API served by the world process.
//!
//! Subjects (see [`mud_net::subjects`]):
//!
//!   Request/Reply:
//!     mud.world.create_entity   player entity for an account
//!     mud.world.input           run a line of input as an entity
//!     mud.world.session.first   first session bound to an entity
//!     mud.world.session.last    last session for an entity went away
//!     mud.world.shutdown        flush and stop
//!
//! Requests are handled one at a time on this task, which is the only owner
//! of the [`World`]. No request waits on storage here: replies that depend on
//! durable writes are sent from a spawned task once the write batch lands.
//! Only `shutdown` waits for the final flush.

use futures::StreamExt;
use mud_entity::ErrorKind;
use mud_net::messages::{
    Ack, CreateEntityForAccount, EntityCreated, NotifyFirstSessionConnected,
    NotifyLastSessionDisconnected, RemoteError, RpcReply, SendInputThroughEntity,
};
use mud_net::subjects::{WORLD_ALL, WORLD_PREFIX, operation};
use mud_net::{NatsConnection, NetError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::error::WorldError;
use crate::outbox::Outbox;
use crate::persistence::WriteTicket;
use crate::world::{InputOutcome, World};

/// A handled request whose reply waits on a write batch.
#[derive(Debug)]
pub struct Accepted {
    pub ticket: WriteTicket,
    /// A command asked the world to stop.
    pub shutdown: bool,
}

/// The world plus its delivery queue, independent of the transport.
#[derive(Debug)]
pub struct WorldService {
    world: World,
    outbox: Outbox,
}

impl WorldService {
    #[must_use]
    pub fn new(world: World, outbox: Outbox) -> Self {
        Self { world, outbox }
    }

    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The player for an account, with the ticket for its write.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError`] if the player cannot be constructed.
    pub fn create_entity(
        &mut self,
        req: CreateEntityForAccount,
    ) -> Result<(EntityCreated, WriteTicket), WorldError> {
        let (entity_id, ticket) = self.world.create_player_for_account(&req.username)?;
        Ok((EntityCreated { entity_id }, ticket))
    }

    /// # Errors
    ///
    /// Returns [`WorldError::NoSuchEntity`] if the entity is gone.
    pub fn input(&mut self, req: SendInputThroughEntity) -> Result<Accepted, WorldError> {
        let outcome = self.world.execute_command(req.entity_id, &req.text)?;
        Ok(self.deliver(outcome))
    }

    /// # Errors
    ///
    /// Returns [`WorldError::NoSuchEntity`] if the entity is gone.
    pub fn session_first(
        &mut self,
        req: NotifyFirstSessionConnected,
    ) -> Result<Accepted, WorldError> {
        let outcome = self.world.at_connect(req.entity_id)?;
        Ok(self.deliver(outcome))
    }

    pub fn session_last(&mut self, req: NotifyLastSessionDisconnected) -> Accepted {
        let outcome = self.world.at_disconnect(req.entity_id);
        self.deliver(outcome)
    }

    fn deliver(&self, outcome: InputOutcome) -> Accepted {
        let shutdown = outcome.wants_shutdown();
        self.outbox.send_all(outcome.outbound);
        Accepted {
            ticket: outcome.ticket,
            shutdown,
        }
    }

    /// Flush staged writes and wait for them to land.
    ///
    /// # Errors
    ///
    /// Returns the persistence error of the final batch.
    pub async fn flush(&mut self) -> Result<(), WorldError> {
        self.world.flush().wait().await?;
        Ok(())
    }

    /// Flush, then drain the outbox.
    pub async fn close(mut self) {
        if let Err(err) = self.flush().await {
            error!(error = %err, "final flush failed");
        }
        self.outbox.close().await;
    }
}

/// Serves [`WorldService`] over NATS.
#[derive(Debug)]
pub struct WorldApi {
    service: WorldService,
    conn: NatsConnection,
}

impl WorldApi {
    #[must_use]
    pub fn new(service: WorldService, conn: NatsConnection) -> Self {
        Self { service, conn }
    }

    /// Serve requests until a shutdown is requested or the subscription ends.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Subscribe`] if the subscription cannot be made.
    pub async fn run(mut self) -> Result<(), NetError> {
        info!(subject = WORLD_ALL, "subscribing to world subjects");
        let mut sub = self.conn.subscribe(WORLD_ALL).await?;
        info!("world ready, listening for requests");

        while let Some(msg) = sub.next().await {
            let subject = msg.subject.to_string();
            let Some(op) = operation(WORLD_PREFIX, &subject) else {
                continue;
            };
            debug!(op, "received request");

            let stop = match op {
                "create_entity" => {
                    let created = decode_request::<CreateEntityForAccount>(&msg)
                        .and_then(|req| self.service.create_entity(req).map_err(RemoteError::from));
                    self.reply_after_write(msg, created);
                    false
                }
                "input" => {
                    let accepted = decode_request::<SendInputThroughEntity>(&msg)
                        .and_then(|req| self.service.input(req).map_err(RemoteError::from));
                    self.ack_after_write(msg, accepted)
                }
                "session.first" => {
                    let accepted = decode_request::<NotifyFirstSessionConnected>(&msg)
                        .and_then(|req| self.service.session_first(req).map_err(RemoteError::from));
                    self.ack_after_write(msg, accepted)
                }
                "session.last" => {
                    let accepted = decode_request::<NotifyLastSessionDisconnected>(&msg)
                        .map(|req| self.service.session_last(req));
                    self.ack_after_write(msg, accepted)
                }
                "shutdown" => {
                    info!("shutdown requested by proxy");
                    let reply: RpcReply<Ack> = self.service.flush().await.map(|()| Ack).into();
                    self.reply(&msg, &reply).await;
                    true
                }
                _ => {
                    warn!(op, "unknown operation");
                    let reply: RpcReply<Ack> =
                        RpcReply::error(ErrorKind::InvalidInput, format!("unknown operation: {op}"));
                    self.reply(&msg, &reply).await;
                    false
                }
            };
            if stop {
                break;
            }
        }

        info!("world stopping");
        self.service.close().await;
        Ok(())
    }

    async fn reply<T: Serialize>(&self, msg: &async_nats::Message, reply: &RpcReply<T>) {
        if let Err(err) = self.conn.respond(msg, reply).await {
            error!(error = %err, "failed to publish reply");
        }
    }

    /// Acknowledge once the write batch is durable. Returns `true` if the
    /// request asked the world to stop.
    fn ack_after_write(
        &self,
        msg: async_nats::Message,
        accepted: Result<Accepted, RemoteError>,
    ) -> bool {
        let shutdown = accepted.as_ref().is_ok_and(|a| a.shutdown);
        self.reply_after_write(msg, accepted.map(|a| (Ack, a.ticket)));
        shutdown
    }

    /// Send `value` once its write batch is durable, or the error straight away.
    fn reply_after_write<T>(
        &self,
        msg: async_nats::Message,
        pending: Result<(T, WriteTicket), RemoteError>,
    ) where
        T: Serialize + Send + Sync + 'static,
    {
        let conn = self.conn.clone();
        tokio::spawn(async move {
            let reply: RpcReply<T> = match pending {
                Ok((value, ticket)) => ticket
                    .wait()
                    .await
                    .map(|()| value)
                    .map_err(WorldError::from)
                    .into(),
                Err(err) => RpcReply::Err(err),
            };
            if let RpcReply::Err(err) = &reply
                && err.kind == ErrorKind::Internal
            {
                error!(message = %err.message, "request failed");
            }
            if let Err(err) = conn.respond(&msg, &reply).await {
                error!(error = %err, "failed to publish reply");
            }
        });
    }
}

fn decode_request<T: DeserializeOwned>(msg: &async_nats::Message) -> Result<T, RemoteError> {
    mud_net::decode(msg.payload.as_ref()).map_err(|err| RemoteError {
        kind: ErrorKind::InvalidInput,
        message: format!("invalid request: {err}"),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use mud_entity::{EntityId, EntityRecord};

    use super::*;
    use crate::command::default_tables;
    use crate::error::PersistenceError;
    use crate::outbox::ProxySink;
    use crate::persistence::{MemoryPersistence, Persistence};
    use crate::types::TypeRegistry;

    #[derive(Default, Clone)]
    struct Recorder {
        lines: Arc<Mutex<Vec<(EntityId, String)>>>,
    }

    #[async_trait]
    impl ProxySink for Recorder {
        async fn emit(&self, entity: EntityId, text: &str) -> Result<(), NetError> {
            self.lines.lock().unwrap().push((entity, text.to_string()));
            Ok(())
        }

        async fn disconnect(&self, _entity: EntityId) -> Result<usize, NetError> {
            Ok(1)
        }

        async fn restart(&self) -> Result<(), NetError> {
            Ok(())
        }
    }

    async fn service(recorder: Recorder) -> (WorldService, Arc<MemoryPersistence>) {
        let backend = Arc::new(MemoryPersistence::new());
        let world = World::load(
            backend.clone(),
            Arc::new(TypeRegistry::with_defaults().unwrap()),
            default_tables().unwrap(),
            None,
        )
        .await
        .unwrap();
        (WorldService::new(world, Outbox::spawn(recorder)), backend)
    }

    async fn create(service: &mut WorldService, username: &str) -> EntityId {
        let (created, ticket) = service
            .create_entity(CreateEntityForAccount {
                username: username.into(),
            })
            .unwrap();
        ticket.wait().await.unwrap();
        created.entity_id
    }

    /// Memory storage whose writes stall while `stall` is write-locked.
    #[derive(Debug, Default)]
    struct Stalling {
        inner: MemoryPersistence,
        stall: tokio::sync::RwLock<()>,
    }

    #[async_trait]
    impl Persistence for Stalling {
        async fn load_all(&self) -> Result<Vec<(EntityId, EntityRecord)>, PersistenceError> {
            self.inner.load_all().await
        }

        async fn insert(&self, record: &EntityRecord) -> Result<EntityId, PersistenceError> {
            let _open = self.stall.read().await;
            self.inner.insert(record).await
        }

        async fn update(&self, id: EntityId, record: &EntityRecord) -> Result<(), PersistenceError> {
            let _open = self.stall.read().await;
            self.inner.update(id, record).await
        }

        async fn delete(&self, id: EntityId) -> Result<(), PersistenceError> {
            let _open = self.stall.read().await;
            self.inner.delete(id).await
        }

        async fn next_id(&self) -> Result<u64, PersistenceError> {
            self.inner.next_id().await
        }
    }

    #[tokio::test]
    async fn test_create_entity_is_idempotent_per_account() {
        let (mut service, _) = service(Recorder::default()).await;
        let first = create(&mut service, "Alice").await;
        let again = create(&mut service, "alice").await;
        assert_eq!(first, again);
        service.close().await;
    }

    #[tokio::test]
    async fn test_create_entity_does_not_wait_for_storage() {
        let backend = Arc::new(Stalling::default());
        let world = World::load(
            backend.clone(),
            Arc::new(TypeRegistry::with_defaults().unwrap()),
            default_tables().unwrap(),
            None,
        )
        .await
        .unwrap();
        let mut service = WorldService::new(world, Outbox::spawn(Recorder::default()));
        let alice = create(&mut service, "alice").await;

        let stalled = backend.stall.write().await;
        let (created, ticket) = service
            .create_entity(CreateEntityForAccount {
                username: "bob".into(),
            })
            .unwrap();
        let bob = created.entity_id;
        assert!(service.world().store().contains(bob));
        service
            .input(SendInputThroughEntity {
                entity_id: alice,
                text: "look".into(),
            })
            .unwrap();

        let mut durable = Box::pin(ticket.wait());
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(50), &mut durable)
                .await
                .is_err()
        );
        assert!(backend.inner.record(bob).await.is_none());

        drop(stalled);
        durable.await.unwrap();
        assert_eq!(backend.inner.record(bob).await.unwrap().name, "bob");
        service.close().await;
    }

    #[tokio::test]
    async fn test_input_reaches_proxy_and_is_durable() {
        let recorder = Recorder::default();
        let (mut service, backend) = service(recorder.clone()).await;
        let alice = create(&mut service, "alice").await;

        let accepted = service
            .session_first(NotifyFirstSessionConnected { entity_id: alice })
            .unwrap();
        accepted.ticket.wait().await.unwrap();

        let accepted = service
            .input(SendInputThroughEntity {
                entity_id: alice,
                text: "say hello".into(),
            })
            .unwrap();
        assert!(!accepted.shutdown);
        accepted.ticket.wait().await.unwrap();
        service.close().await;

        let lines = recorder.lines.lock().unwrap().clone();
        assert!(lines.contains(&(alice, "You say, \"hello\"".to_string())));
        assert!(backend.record(alice).await.unwrap().location.is_some());
    }

    #[tokio::test]
    async fn test_input_for_missing_entity_is_not_found() {
        let (mut service, _) = service(Recorder::default()).await;
        let err = service
            .input(SendInputThroughEntity {
                entity_id: EntityId(999),
                text: "look".into(),
            })
            .unwrap_err();
        assert_eq!(RemoteError::from(err).kind, ErrorKind::NotFound);
        service.close().await;
    }

    #[tokio::test]
    async fn test_admin_shutdown_command_requests_stop() {
        let (mut service, _) = service(Recorder::default()).await;
        let admin = create(&mut service, "root").await;
        let accepted = service
            .input(SendInputThroughEntity {
                entity_id: admin,
                text: "@shutdown".into(),
            })
            .unwrap();
        assert!(accepted.shutdown);
        service.close().await;
    }
}
