//! # mud_proxy
//!
//! The connection proxy.
//!
//! ## Startup Sequence
//!
//! 1. Load accounts and pick a mailer.
//! 2. Connect to NATS and start answering `mud.proxy.*`.
//! 3. Accept players until shut down, rebinding the listener whenever the
//!    world asks for a restart.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mud_net::{NatsConnection, WorldClient};
use mud_proxy::account::{AccountStore, PasswordHasher};
use mud_proxy::api::ProxyApi;
use mud_proxy::config::{Args, ProxyConfig};
use mud_proxy::connection::ProxyContext;
use mud_proxy::mail::{FileOutboxMailer, LogMailer, Mailer};
use mud_proxy::manager::SessionManager;
use mud_proxy::server::{ProxyExit, SweepSettings, serve};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("mud_proxy=info".parse()?))
        .init();

    let config = ProxyConfig::from(Args::parse());
    info!(?config, "proxy starting");

    if config.password_secret.is_empty() {
        warn!("no password secret configured; set MUD_PASSWORD_SECRET in production");
    }
    let hasher = PasswordHasher::new(config.password_secret.as_bytes());
    let accounts = match &config.accounts_file {
        Some(path) => AccountStore::open(path.clone(), hasher).await?,
        None => {
            warn!("no accounts file configured, accounts will not survive a restart");
            AccountStore::in_memory(hasher)
        }
    };
    let mailer: Arc<dyn Mailer> = match &config.mail_outbox {
        Some(dir) => Arc::new(FileOutboxMailer::new(dir.clone())),
        None => Arc::new(LogMailer),
    };

    let conn = NatsConnection::connect_to(&config.nats_url)
        .await?
        .with_request_timeout(config.rpc_timeout);
    let manager = Arc::new(SessionManager::new());

    let (exit_tx, mut exit_rx) = mpsc::unbounded_channel();
    let api = ProxyApi::new(manager.clone(), conn.clone(), exit_tx);
    tokio::spawn(async move {
        if let Err(err) = api.run().await {
            error!(error = %err, "proxy API stopped");
        }
    });

    let ctx = ProxyContext {
        manager,
        accounts: Arc::new(accounts),
        mailer,
        world: Arc::new(WorldClient::new(conn)),
        max_line_len: config.max_line_len,
    };
    let sweep = SweepSettings {
        idle_timeout: config.idle_timeout,
        interval: config.sweep_interval,
    };

    loop {
        let listener = TcpListener::bind(config.bind).await?;
        info!(bind = %config.bind, "accepting connections");
        match serve(listener, &ctx, sweep, &mut exit_rx).await {
            ProxyExit::Restart => info!(code = ProxyExit::Restart.code(), "restarting listener"),
            ProxyExit::Shutdown => break,
        }
    }

    info!("proxy shut down");
    Ok(())
}
