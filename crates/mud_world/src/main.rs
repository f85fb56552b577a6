//! # mud_world
//!
//! The world process. Owns the entity graph and runs every command.
//!
//! ## Startup Sequence
//!
//! 1. Load entities from the data directory (or start empty in memory).
//! 2. Connect to NATS and ask the proxy who is already connected.
//! 3. Serve `mud.world.*` until shut down.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mud_net::{NatsConnection, ProxyClient};
use mud_world::api::{WorldApi, WorldService};
use mud_world::command::default_tables;
use mud_world::config::{Args, WorldConfig};
use mud_world::outbox::Outbox;
use mud_world::persistence::{JsonDirPersistence, MemoryPersistence, Persistence};
use mud_world::types::TypeRegistry;
use mud_world::world::World;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("mud_world=info".parse()?))
        .init();

    let config = WorldConfig::from(Args::parse());
    info!("world process starting");

    let persistence: Arc<dyn Persistence> = match &config.data_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "using on-disk entity storage");
            Arc::new(JsonDirPersistence::open(dir.clone()).await?)
        }
        None => {
            warn!("no data directory configured, the world will not survive a restart");
            Arc::new(MemoryPersistence::new())
        }
    };

    let types = Arc::new(TypeRegistry::with_defaults()?);
    let mut world = World::load(persistence, types, default_tables()?, config.start_room).await?;

    let conn = NatsConnection::connect_to(&config.nats_url)
        .await?
        .with_request_timeout(config.rpc_timeout);
    let proxy = ProxyClient::new(conn.clone());

    match proxy.who_connected().await {
        Ok(accounts) => world.resync_connected(&accounts),
        Err(err) if err.is_unreachable() => info!("proxy not running yet, nobody connected"),
        Err(err) => warn!(error = %err, "could not ask the proxy who is connected"),
    }

    let service = WorldService::new(world, Outbox::spawn(proxy));
    WorldApi::new(service, conn).run().await?;

    info!("world process shut down");
    Ok(())
}
