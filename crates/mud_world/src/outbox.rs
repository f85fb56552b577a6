//! Ordered delivery of command side effects to the proxy.
//!
//! The world task never waits on the proxy. Effects are queued here and a
//! background task delivers them one at a time, in the order commands
//! produced them.

use async_trait::async_trait;
use mud_entity::EntityId;
use mud_net::{NetError, ProxyClient};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::command::Outbound;

/// The proxy-facing calls the outbox needs.
#[async_trait]
pub trait ProxySink: Send + Sync + 'static {
    async fn emit(&self, entity: EntityId, text: &str) -> Result<(), NetError>;
    async fn disconnect(&self, entity: EntityId) -> Result<usize, NetError>;
    async fn restart(&self) -> Result<(), NetError>;
}

#[async_trait]
impl ProxySink for ProxyClient {
    async fn emit(&self, entity: EntityId, text: &str) -> Result<(), NetError> {
        self.emit_to_entity(entity, text).await
    }

    async fn disconnect(&self, entity: EntityId) -> Result<usize, NetError> {
        self.disconnect_sessions_on_entity(entity).await
    }

    async fn restart(&self) -> Result<(), NetError> {
        self.restart_proxy().await
    }
}

/// Handle to the delivery task.
#[derive(Debug)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

impl Outbox {
    pub fn spawn<S: ProxySink>(sink: S) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(sink, rx));
        Self { tx, task }
    }

    /// Queue `items` for delivery. [`Outbound::Shutdown`] is not the proxy's
    /// business and is skipped.
    pub fn send_all(&self, items: impl IntoIterator<Item = Outbound>) {
        for item in items {
            if item == Outbound::Shutdown {
                continue;
            }
            if self.tx.send(item).is_err() {
                warn!("outbox task has stopped; dropping outbound effects");
                return;
            }
        }
    }

    /// Deliver everything queued so far, then stop.
    pub async fn close(self) {
        drop(self.tx);
        if let Err(err) = self.task.await {
            warn!(error = %err, "outbox task failed");
        }
    }
}

async fn run<S: ProxySink>(sink: S, mut rx: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(item) = rx.recv().await {
        let result = match &item {
            Outbound::Emit { entity, text } => sink.emit(*entity, text).await,
            Outbound::Disconnect(entity) => sink.disconnect(*entity).await.map(|count| {
                debug!(entity = %entity, sessions = count, "sessions disconnected");
            }),
            Outbound::RestartProxy => sink.restart().await,
            Outbound::Shutdown => Ok(()),
        };
        match result {
            Ok(()) => {}
            Err(err) if err.is_unreachable() => {
                debug!(error = %err, "proxy unreachable, effect dropped");
            }
            Err(err) => warn!(error = %err, "failed to deliver effect to proxy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default, Clone)]
    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ProxySink for Recorder {
        async fn emit(&self, entity: EntityId, text: &str) -> Result<(), NetError> {
            self.seen.lock().unwrap().push(format!("{entity}: {text}"));
            Ok(())
        }

        async fn disconnect(&self, entity: EntityId) -> Result<usize, NetError> {
            self.seen.lock().unwrap().push(format!("drop {entity}"));
            Err(NetError::Unreachable {
                subject: "mud.proxy.disconnect".into(),
            })
        }

        async fn restart(&self) -> Result<(), NetError> {
            self.seen.lock().unwrap().push("restart".into());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_delivers_in_order_and_skips_shutdown() {
        let recorder = Recorder::default();
        let outbox = Outbox::spawn(recorder.clone());
        outbox.send_all(vec![
            Outbound::Emit {
                entity: EntityId(1),
                text: "one".into(),
            },
            Outbound::Shutdown,
            Outbound::Disconnect(EntityId(1)),
            Outbound::RestartProxy,
            Outbound::Emit {
                entity: EntityId(2),
                text: "two".into(),
            },
        ]);
        outbox.close().await;

        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(seen, vec!["#1: one", "drop #1", "restart", "#2: two"]);
    }
}
