//! NATS connection management.
//!
//! Provides a thin wrapper around `async-nats` with MessagePack payloads and
//! typed request/reply. A request that gets no answer (the peer is reloading,
//! or not started yet) is reported as [`NetError::Unreachable`] instead of
//! hanging the caller.

use std::time::Duration;

use async_nats::client::RequestErrorKind;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::NetError;
use crate::messages::RpcReply;

/// Default NATS server URL.
pub const DEFAULT_NATS_URL: &str = "nats://127.0.0.1:4222";

/// The environment variable used to override the NATS URL.
pub const NATS_URL_ENV: &str = "NATS_URL";

/// How long a request waits for its reply by default.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A wrapper around an `async-nats` client.
#[derive(Debug, Clone)]
pub struct NatsConnection {
    /// The underlying NATS client.
    client: async_nats::Client,
    /// Upper bound on the wait for a reply.
    request_timeout: Duration,
}

impl NatsConnection {
    /// Connect to NATS using the URL from the `NATS_URL` environment variable,
    /// falling back to [`DEFAULT_NATS_URL`].
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Connect`] if the connection cannot be established.
    pub async fn connect() -> Result<Self, NetError> {
        let url = std::env::var(NATS_URL_ENV).unwrap_or_else(|_| DEFAULT_NATS_URL.to_string());
        Self::connect_to(&url).await
    }

    /// Connect to NATS at the specified URL.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Connect`] if the connection cannot be established.
    pub async fn connect_to(url: &str) -> Result<Self, NetError> {
        info!(url, "connecting to NATS");
        let client = async_nats::connect(url).await?;
        info!("NATS connection established");
        Ok(Self {
            client,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Override how long requests wait for a reply.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Returns a reference to the underlying `async-nats` client.
    #[must_use]
    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }

    /// Publish a MessagePack-encoded message to a subject.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if encoding or publishing fails.
    pub async fn publish<T: Serialize>(&self, subject: &str, message: &T) -> Result<(), NetError> {
        let payload = crate::codec::encode(message)?;
        self.client
            .publish(subject.to_string(), payload.into())
            .await?;
        Ok(())
    }

    /// Subscribe to a subject.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Subscribe`] if the subscription fails.
    pub async fn subscribe(&self, subject: &str) -> Result<async_nats::Subscriber, NetError> {
        let sub = self.client.subscribe(subject.to_string()).await?;
        Ok(sub)
    }

    /// Send a request and wait for its typed reply.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Unreachable`] if nobody answers within the request
    /// timeout, [`NetError::Remote`] if the peer replied with an error, and
    /// codec errors for malformed payloads.
    pub async fn request<Q, R>(&self, subject: &str, request: &Q) -> Result<R, NetError>
    where
        Q: Serialize,
        R: DeserializeOwned,
    {
        let payload = crate::codec::encode(request)?;
        debug!(subject, bytes = payload.len(), "sending request");

        let pending = self.client.request(subject.to_string(), payload.into());
        let message = match tokio::time::timeout(self.request_timeout, pending).await {
            Err(_elapsed) => {
                return Err(NetError::Unreachable {
                    subject: subject.to_string(),
                });
            }
            Ok(Err(err)) => {
                return Err(match err.kind() {
                    RequestErrorKind::TimedOut | RequestErrorKind::NoResponders => {
                        NetError::Unreachable {
                            subject: subject.to_string(),
                        }
                    }
                    _ => NetError::Request {
                        subject: subject.to_string(),
                        message: err.to_string(),
                    },
                });
            }
            Ok(Ok(message)) => message,
        };

        let reply: RpcReply<R> = crate::codec::decode(message.payload.as_ref())?;
        reply.into_result().map_err(|err| NetError::Remote {
            kind: err.kind,
            message: err.message,
        })
    }

    /// Answer a request received on a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::MissingReply`] if the request carried no reply
    /// subject, or a publish/encode error.
    pub async fn respond<T: Serialize>(
        &self,
        request: &async_nats::Message,
        reply: &RpcReply<T>,
    ) -> Result<(), NetError> {
        let Some(reply_to) = request.reply.clone() else {
            return Err(NetError::MissingReply(request.subject.to_string()));
        };
        let payload = crate::codec::encode(reply)?;
        self.client.publish(reply_to, payload.into()).await?;
        Ok(())
    }
}
