// src/client/mod.rs
//! RPC correlation client.
//!
//! [`RpcClient`] turns the fire-and-forget publish/subscribe contract of a
//! [`Transport`](crate::Transport) into request/response calls.
//!
//! # Architecture
//!
//! At construction the client subscribes to its reply queue and spawns a
//! background reply reader. Each call:
//!
//! 1. generates a fresh correlation id and registers a one-shot waiter under
//!    it, before anything is published;
//! 2. publishes the request envelope to the configured routing key with the
//!    reply queue as `reply_to`;
//! 3. waits on its waiter until the reply reader resolves it or the deadline
//!    passes.
//!
//! The reply reader looks up each incoming correlation id and hands the
//! envelope to the waiter; replies for unknown or expired calls are dropped
//! and counted.
//!
//! # Concurrency
//!
//! Any number of calls may be in flight from any number of tasks. The pending
//! registry is a mutex-protected map and the lock is held only for the
//! insert/remove itself, never across the publish or the wait.

mod pending;
mod stats;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::{
    // ---
    create_transport,
    Address,
    CorrelationId,
    Envelope,
    Result,
    RpcConfig,
    RpcError,
    Subscription,
    SubscriptionHandle,
    TransportPtr,
};

use pending::{Completion, PendingCalls, PendingGuard, Registration};
use stats::ClientStats;
pub use stats::StatsSnapshot;

/// Running correlation client.
///
/// Cheap to clone (internally `Arc`-backed); clones share the registry and the
/// reply reader. The reader stops when the last clone is dropped.
///
/// ```no_run
/// # use route_gateway::{RpcClient, RpcConfig};
/// # use serde::{Deserialize, Serialize};
/// #[derive(Serialize)]
/// #[serde(rename_all = "PascalCase")]
/// struct GetRoute { id: String, user_id: String }
///
/// #[derive(Deserialize)]
/// #[serde(rename_all = "PascalCase")]
/// struct GetRouteReply { found_route: bool }
///
/// # async fn example() -> route_gateway::Result<()> {
/// let config = RpcConfig::with_broker("amqp://localhost:5672/%2f", "gateway-1", "route-service");
/// let client = RpcClient::new(config).await?;
///
/// let reply: GetRouteReply = client
///     .call("GetRoute", &GetRoute { id: "r1".into(), user_id: "u1".into() })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

struct Inner {
    // ---
    transport: TransportPtr,
    config: RpcConfig,
    request_address: Address,
    reply_address: Address,
    shared: Arc<Shared>,
    rx_task: JoinHandle<()>,
}

/// State shared between callers and the reply reader.
struct Shared {
    pending: PendingCalls,
    stats: ClientStats,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.rx_task.abort();
    }
}

impl RpcClient {
    // ---
    /// Create a client on an explicitly provided transport.
    ///
    /// The reply subscription is established before this returns, so no reply
    /// to a call made through the returned client can be missed.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Transport` if the reply subscription fails.
    pub async fn with_transport(transport: TransportPtr, config: RpcConfig) -> Result<Self> {
        // ---
        let reply_queue = config.reply_queue_name();
        let handle = transport
            .subscribe(Subscription::from(reply_queue.clone()))
            .await?;

        let shared = Arc::new(Shared {
            pending: PendingCalls::new(),
            stats: ClientStats::default(),
        });

        let rx_task = tokio::spawn(reply_loop(
            handle,
            Arc::clone(&shared),
            config.node_id.clone(),
        ));

        tracing::debug!(
            node_id = %config.node_id,
            reply_queue = %reply_queue,
            routing_key = %config.routing_key,
            "rpc client started"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                transport,
                request_address: Address::from(config.routing_key.clone()),
                reply_address: Address::from(reply_queue),
                config,
                shared,
                rx_task,
            }),
        })
    }

    /// Create a client on the transport selected by `config.transport_uri`.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Transport` if the transport cannot be created or the
    /// reply subscription fails.
    pub async fn new(config: RpcConfig) -> Result<Self> {
        // ---
        let transport = create_transport(&config).await?;
        Self::with_transport(transport, config).await
    }

    /// Call `method` with the configured request timeout.
    ///
    /// # Errors
    ///
    /// See [`call_with_timeout`](Self::call_with_timeout).
    pub async fn call<TReq, TResp>(&self, method: &str, req: &TReq) -> Result<TResp>
    where
        TReq: Serialize + ?Sized,
        TResp: DeserializeOwned,
    {
        self.call_with_timeout(method, req, self.inner.config.request_timeout)
            .await
    }

    /// Call `method`, waiting at most `timeout` for the reply.
    ///
    /// Dropping the returned future before it completes removes the pending
    /// call; a reply arriving afterwards is discarded.
    ///
    /// # Errors
    ///
    /// - `RpcError::Serialization` - request serialization or reply
    ///   deserialization fails
    /// - `RpcError::Transport` - publishing fails or the reply path is closed
    /// - `RpcError::Timeout` - no reply within `timeout`
    /// - `RpcError::Remote` - the responder replied with an error indicator
    pub async fn call_with_timeout<TReq, TResp>(
        &self,
        method: &str,
        req: &TReq,
        timeout: Duration,
    ) -> Result<TResp>
    where
        TReq: Serialize + ?Sized,
        TResp: DeserializeOwned,
    {
        let payload = Bytes::from(serde_json::to_vec(req)?);
        let reply = self.call_raw(method, payload, timeout).await?;

        if let Some(err) = reply.error {
            return Err(RpcError::Remote(err.to_string()));
        }

        Ok(serde_json::from_slice(&reply.payload)?)
    }

    /// Publish an already-serialized request and wait for its reply envelope.
    pub async fn call_raw(
        &self,
        method: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Envelope> {
        // ---
        let shared = &*self.inner.shared;
        let deadline = Instant::now() + timeout;

        let (correlation_id, rx) = loop {
            let id = CorrelationId::generate();
            match shared.pending.register(id.clone(), deadline) {
                Registration::Registered(rx) => break (id, rx),
                Registration::Duplicate => {
                    tracing::warn!(
                        correlation_id = %id,
                        "correlation id already pending, regenerating"
                    );
                }
                Registration::Closed => {
                    return Err(RpcError::Transport("reply subscription closed".into()));
                }
            }
        };

        let mut guard = PendingGuard::new(
            &shared.pending,
            correlation_id.clone(),
            &shared.stats.cancellations,
        );

        ClientStats::incr(&shared.stats.calls_started);

        let env = Envelope::request(
            self.inner.request_address.clone(),
            Arc::from(method),
            payload,
            &correlation_id,
            self.inner.reply_address.clone(),
        );

        tracing::debug!(%method, %correlation_id, "publishing request");

        if let Err(err) = self.inner.transport.publish(env).await {
            guard.settle();
            ClientStats::incr(&shared.stats.publish_failures);
            tracing::warn!(%method, %correlation_id, %err, "publish failed");
            return Err(err);
        }

        let outcome = time::timeout_at(deadline, rx).await;
        guard.settle();

        match outcome {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(RpcError::Transport(
                "reply subscription closed while waiting".into(),
            )),
            Err(_) => {
                ClientStats::incr(&shared.stats.timeouts);
                tracing::debug!(%method, %correlation_id, ?timeout, "request timed out");
                Err(RpcError::Timeout)
            }
        }
    }

    /// Number of calls currently awaiting a reply.
    pub fn pending_len(&self) -> usize {
        self.inner.shared.pending.len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.shared.stats.snapshot()
    }

    pub fn config(&self) -> &RpcConfig {
        &self.inner.config
    }

    /// Address replies to this client are published to.
    pub fn reply_address(&self) -> &Address {
        &self.inner.reply_address
    }

    /// Close the underlying transport.
    pub async fn shutdown(&self) -> Result<()> {
        // ---
        self.inner.transport.close().await
    }
}

impl Shared {
    /// Route one envelope from the reply queue to its waiter.
    fn dispatch(&self, env: Envelope) {
        // ---
        let Some(correlation_id) = env.correlation() else {
            ClientStats::incr(&self.stats.malformed_replies);
            tracing::warn!(address = %env.address.as_str(), "reply without correlation id dropped");
            return;
        };

        match self.pending.complete(&correlation_id, env) {
            Completion::Delivered => ClientStats::incr(&self.stats.replies_matched),
            Completion::Late => {
                ClientStats::incr(&self.stats.late_replies);
                tracing::debug!(%correlation_id, "late reply dropped");
            }
            Completion::Unmatched => {
                ClientStats::incr(&self.stats.unmatched_replies);
                tracing::debug!(%correlation_id, "no pending call for reply");
            }
        }
    }
}

/// Reply reader: runs until the reply subscription closes.
async fn reply_loop(mut handle: SubscriptionHandle, shared: Arc<Shared>, node_id: String) {
    // ---
    while let Some(env) = handle.inbox.recv().await {
        shared.dispatch(env);
    }

    let abandoned = shared.pending.drain();

    tracing::warn!(%node_id, abandoned, "reply subscription closed");
}
