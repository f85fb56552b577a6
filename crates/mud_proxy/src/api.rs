//! NATS API served by the proxy.
//!
//! Subjects (see [`mud_net::subjects`]):
//!
//!   Request/Reply:
//!     mud.proxy.emit         text to every session controlling an entity
//!     mud.proxy.who          logged-in accounts
//!     mud.proxy.disconnect   close every session controlling an entity
//!     mud.proxy.restart      rebind the listener
//!
//! Every request is answered straight from the [`SessionManager`]; none of
//! them waits on a client socket.

use std::sync::Arc;

use futures::StreamExt;
use mud_entity::ErrorKind;
use mud_net::messages::{
    Ack, DisconnectSessionsOnEntity, EmitToEntity, RpcReply, SessionsDisconnected,
    WhoConnectedReply,
};
use mud_net::subjects::{PROXY_ALL, PROXY_PREFIX, operation};
use mud_net::{NatsConnection, NetError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::manager::SessionManager;
use crate::server::ProxyExit;

#[derive(Debug)]
pub struct ProxyApi {
    manager: Arc<SessionManager>,
    conn: NatsConnection,
    exits: mpsc::UnboundedSender<ProxyExit>,
}

impl ProxyApi {
    #[must_use]
    pub fn new(
        manager: Arc<SessionManager>,
        conn: NatsConnection,
        exits: mpsc::UnboundedSender<ProxyExit>,
    ) -> Self {
        Self {
            manager,
            conn,
            exits,
        }
    }

    /// Serve requests until the subscription ends.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Subscribe`] if the subscription cannot be made.
    pub async fn run(self) -> Result<(), NetError> {
        info!(subject = PROXY_ALL, "subscribing to proxy subjects");
        let mut sub = self.conn.subscribe(PROXY_ALL).await?;

        while let Some(msg) = sub.next().await {
            let subject = msg.subject.to_string();
            let Some(op) = operation(PROXY_PREFIX, &subject) else {
                continue;
            };
            debug!(op, "received request");

            let payload = match handle(&self.manager, &self.exits, op, msg.payload.as_ref()) {
                Ok(payload) => payload,
                Err(err) => {
                    error!(op, error = %err, "failed to encode reply");
                    continue;
                }
            };
            if let Some(reply_to) = msg.reply
                && let Err(err) = self.conn.client().publish(reply_to, payload.into()).await
            {
                error!(error = %err, "failed to publish reply");
            }
        }
        Ok(())
    }
}

/// Answer one request, returning the encoded reply.
///
/// # Errors
///
/// Returns [`NetError::Encode`] if the reply cannot be encoded.
pub fn handle(
    manager: &SessionManager,
    exits: &mpsc::UnboundedSender<ProxyExit>,
    op: &str,
    payload: &[u8],
) -> Result<Vec<u8>, NetError> {
    match op {
        "emit" => reply_with(payload, |req: EmitToEntity| {
            let reached = manager.emit_to_entity(req.entity_id, &req.text);
            debug!(entity = %req.entity_id, sessions = reached, "emit");
            Ack
        }),
        "who" => mud_net::encode(&RpcReply::ok(WhoConnectedReply {
            accounts: manager.who(),
        })),
        "disconnect" => reply_with(payload, |req: DisconnectSessionsOnEntity| {
            SessionsDisconnected {
                count: manager.disconnect_entity(req.entity_id),
            }
        }),
        "restart" => {
            info!("restart requested by world");
            let reply = if exits.send(ProxyExit::Restart).is_ok() {
                RpcReply::ok(Ack)
            } else {
                RpcReply::error(ErrorKind::Internal, "proxy is already stopping")
            };
            mud_net::encode(&reply)
        }
        _ => {
            warn!(op, "unknown operation");
            mud_net::encode(&RpcReply::<Ack>::error(
                ErrorKind::InvalidInput,
                format!("unknown operation: {op}"),
            ))
        }
    }
}

fn reply_with<Q, R>(payload: &[u8], f: impl FnOnce(Q) -> R) -> Result<Vec<u8>, NetError>
where
    Q: DeserializeOwned,
    R: Serialize,
{
    let reply = match mud_net::decode::<Q>(payload) {
        Ok(req) => RpcReply::ok(f(req)),
        Err(err) => RpcReply::error(ErrorKind::InvalidInput, format!("invalid request: {err}")),
    };
    mud_net::encode(&reply)
}
