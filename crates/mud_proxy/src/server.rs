//! The accept loop and the idle sweeper.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::connection::{ProxyContext, handle_connection};

pub const SHUTDOWN_NOTICE: &str = "The server is shutting down. Goodbye.";
pub const RESTART_NOTICE: &str = "The server is restarting. Please reconnect in a moment.";

/// Why [`serve`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyExit {
    /// Stop the process.
    Shutdown,
    /// Rebind the listener and carry on.
    Restart,
}

impl ProxyExit {
    /// Process exit code for this outcome.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            ProxyExit::Shutdown => 0,
            ProxyExit::Restart => 3,
        }
    }
}

/// Timing for the idle sweep.
#[derive(Debug, Clone, Copy)]
pub struct SweepSettings {
    pub idle_timeout: Duration,
    pub interval: Duration,
}

/// Accept connections on `listener` until told to stop.
///
/// Idle sessions are swept every `sweep.interval`. A [`ProxyExit`] arriving on
/// `exits` or Ctrl-C ends the loop; every session is told why and closed.
pub async fn serve(
    listener: TcpListener,
    ctx: &ProxyContext,
    sweep: SweepSettings,
    exits: &mut mpsc::UnboundedReceiver<ProxyExit>,
) -> ProxyExit {
    let mut ticker = tokio::time::interval(sweep.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let exit = loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(handle_connection(stream, peer, ctx.clone()));
                }
                Err(err) => warn!(error = %err, "accept failed"),
            },
            _ = ticker.tick() => {
                ctx.manager.sweep_idle(sweep.idle_timeout);
            }
            exit = exits.recv() => break exit.unwrap_or(ProxyExit::Shutdown),
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(error = %err, "could not listen for Ctrl-C");
                    continue;
                }
                info!("interrupted");
                break ProxyExit::Shutdown;
            }
        }
    };

    match exit {
        ProxyExit::Restart => {
            ctx.manager.broadcast(RESTART_NOTICE);
        }
        ProxyExit::Shutdown => {
            ctx.manager.broadcast(SHUTDOWN_NOTICE);
            if let Err(err) = ctx.world.shutdown_world().await {
                warn!(error = %err, "could not ask the world to shut down");
            }
        }
    }
    let closed = ctx.manager.close_all();
    info!(?exit, sessions = closed, "listener stopped");
    exit
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpStream;

    use super::*;
    use crate::testing::{MockWorld, context};

    fn settings() -> SweepSettings {
        SweepSettings {
            idle_timeout: Duration::from_secs(3600),
            interval: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn test_restart_notifies_sessions_and_returns() {
        let world = Arc::new(MockWorld::default());
        let ctx = context(world.clone()).await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (exit_tx, mut exit_rx) = mpsc::unbounded_channel();

        let server_ctx = ctx.clone();
        let server =
            tokio::spawn(async move { serve(listener, &server_ctx, settings(), &mut exit_rx).await });

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        // Greeting proves the session is registered.
        lines.next_line().await.unwrap().unwrap();

        exit_tx.send(ProxyExit::Restart).unwrap();
        assert_eq!(server.await.unwrap(), ProxyExit::Restart);

        let mut seen = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            seen.push(line);
        }
        assert!(seen.contains(&RESTART_NOTICE.to_string()));
        assert!(!world.calls().contains(&"shutdown".to_string()));
    }

    #[tokio::test]
    async fn test_shutdown_asks_world_to_stop() {
        let world = Arc::new(MockWorld::default());
        let ctx = context(world.clone()).await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (exit_tx, mut exit_rx) = mpsc::unbounded_channel();
        exit_tx.send(ProxyExit::Shutdown).unwrap();

        let exit = serve(listener, &ctx, settings(), &mut exit_rx).await;
        assert_eq!(exit, ProxyExit::Shutdown);
        assert_eq!(exit.code(), 0);
        assert_eq!(world.calls(), vec!["shutdown"]);
    }
}
