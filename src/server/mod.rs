//! RPC responder: the serving side of the correlation protocol.
//!
//! [`RpcResponder`] consumes a request queue, dispatches each envelope by
//! method name to a registered typed handler, and publishes the reply to the
//! request's `reply_to` address under the request's correlation id. Handler
//! failures and unknown methods are answered with an error reply rather than
//! silence, so callers fail fast instead of waiting for their timeout.
//!
//! The gateway never serves requests itself; this is what hosts the backend
//! side in tests and in the `mock_route_service` demo.

mod handler;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::{
    // ---
    CorrelationId,
    Envelope,
    Result,
    Subscription,
    TransportPtr,
};

use handler::{Handler, HandlerFn};

type HandlerRegistry = Mutex<HashMap<String, Arc<dyn HandlerFn>>>;

fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Method dispatcher bound to one request queue.
///
/// Cheap to clone; handlers may be registered before or after [`spawn`](Self::spawn).
#[derive(Clone)]
pub struct RpcResponder {
    inner: Arc<Inner>,
}

struct Inner {
    transport: TransportPtr,
    queue: String,
    handlers: HandlerRegistry,
}

impl RpcResponder {
    /// Create a responder consuming `queue` (the routing key callers publish to).
    pub fn new(transport: TransportPtr, queue: impl Into<String>) -> Self {
        // ---
        Self {
            inner: Arc::new(Inner {
                transport,
                queue: queue.into(),
                handlers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a typed handler for `method`, replacing any previous one.
    pub fn register<TReq, TResp, F, Fut>(&self, method: &str, handler: F)
    where
        TReq: DeserializeOwned + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TReq) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        // ---
        lock_ignore_poison(&self.inner.handlers)
            .insert(method.to_string(), Arc::new(Handler::new(handler)));
    }

    /// Subscribe to the request queue and start serving.
    ///
    /// Once this returns, requests published to the queue are served. The
    /// returned task ends when the subscription closes.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Transport` if the subscription fails.
    pub async fn spawn(&self) -> Result<JoinHandle<()>> {
        // ---
        let mut handle = self
            .inner
            .transport
            .subscribe(Subscription::from(self.inner.queue.clone()))
            .await?;

        let inner = Arc::clone(&self.inner);

        Ok(tokio::spawn(async move {
            tracing::debug!(queue = %inner.queue, "responder started");

            while let Some(envelope) = handle.inbox.recv().await {
                inner.dispatch(envelope);
            }

            tracing::debug!(queue = %inner.queue, "responder stopped");
        }))
    }
}

impl Inner {
    /// Validate a request envelope and serve it on its own task.
    fn dispatch(self: &Arc<Self>, envelope: Envelope) {
        // ---
        let Some(method) = envelope.method.clone() else {
            tracing::warn!(queue = %self.queue, "request missing method");
            return;
        };

        let Some(reply_to) = envelope.reply_to.clone() else {
            tracing::warn!(%method, "request missing reply_to");
            return;
        };

        let Some(correlation_id) = envelope.correlation() else {
            tracing::warn!(%method, "request missing correlation_id");
            return;
        };

        let handler = lock_ignore_poison(&self.handlers).get(method.as_ref()).cloned();
        let inner = Arc::clone(self);

        tokio::spawn(async move {
            let reply = match handler {
                Some(handler) => match handler.call(envelope.payload).await {
                    Ok(payload) => Envelope::reply(reply_to, payload, &correlation_id),
                    Err(err) => {
                        tracing::error!(%method, %correlation_id, %err, "handler failed");
                        Envelope::error_reply(reply_to, &correlation_id, err.to_string())
                    }
                },
                None => {
                    tracing::warn!(%method, "no handler for method");
                    Envelope::error_reply(
                        reply_to,
                        &correlation_id,
                        format!("no handler for method: {method}"),
                    )
                }
            };

            inner.send_reply(reply, &correlation_id).await;
        });
    }

    async fn send_reply(&self, reply: Envelope, correlation_id: &CorrelationId) {
        // ---
        if let Err(err) = self.transport.publish(reply).await {
            tracing::error!(%correlation_id, %err, "failed to publish reply");
        }
    }
}
