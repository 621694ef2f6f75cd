//! In-memory transport implementation.
//!
//! A pure in-process stand-in for a broker, used by tests and local runs. It
//! defines the reference semantics other transports approximate:
//!
//! - Once `subscribe()` returns, envelopes published afterwards to a matching
//!   address are deliverable.
//! - Delivery is deterministic within a single process.
//! - Publishing through a closed transport fails; nothing is silently lost on
//!   the publish side.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::{mpsc, RwLock};

use crate::{
    // ---
    Envelope,
    Result,
    RpcError,
    Subscription,
    SubscriptionHandle,
    Transport,
    TransportPtr,
};

const INBOX_CAPACITY: usize = 64;

/// Shared message bus for the in-memory transport.
///
/// Every `MemoryTransport` attached to the same hub can publish to and receive
/// from the others, as nodes on one broker would. Tests construct their own
/// hub to stay isolated from each other.
pub struct MemoryHub {
    // ---
    subscriptions: RwLock<HashMap<Subscription, Vec<mpsc::Sender<Envelope>>>>,
}

impl MemoryHub {
    /// Create a new, empty hub.
    pub fn new() -> Arc<Self> {
        // ---
        Arc::new(Self::default())
    }

    async fn publish(&self, transport_id: &str, env: Envelope) {
        // ---
        let subs = self.subscriptions.read().await;

        let Some(senders) = subs.get(&Subscription(env.address.0.clone())) else {
            tracing::debug!(transport_id, address = %env.address.as_str(), "no subscriber");
            return;
        };

        for sender in senders {
            // A closed channel is a dropped SubscriptionHandle.
            if let Err(err) = sender.send(env.clone()).await {
                tracing::debug!(transport_id, %err, "subscriber inbox closed");
            }
        }
    }

    async fn subscribe(&self, transport_id: &str, sub: Subscription) -> SubscriptionHandle {
        // ---
        tracing::debug!(transport_id, subscription = %sub.0, "subscribe");

        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);

        let mut subs = self.subscriptions.write().await;
        let senders = subs.entry(sub).or_default();
        senders.retain(|s| !s.is_closed());
        senders.push(tx);

        SubscriptionHandle { inbox: rx }
    }

    /// Drop every subscription registered on this hub; their inboxes close.
    pub async fn clear(&self) {
        // ---
        self.subscriptions.write().await.clear();
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        // ---
        Self {
            subscriptions: RwLock::new(HashMap::new()),
        }
    }
}

/// Process-global hub used by [`create_memory_transport`].
static GLOBAL_HUB: OnceLock<Arc<MemoryHub>> = OnceLock::new();

fn global_hub() -> Arc<MemoryHub> {
    GLOBAL_HUB.get_or_init(MemoryHub::new).clone()
}

/// In-memory transport attached to a [`MemoryHub`].
struct MemoryTransport {
    // ---
    transport_id: String,
    hub: Arc<MemoryHub>,
    closed: AtomicBool,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn transport_id(&self) -> &str {
        &self.transport_id
    }

    /// Deliver to every subscriber whose subscription equals the address.
    async fn publish(&self, env: Envelope) -> Result<()> {
        // ---
        if self.closed.load(Ordering::Acquire) {
            return Err(RpcError::Transport(format!(
                "memory transport {} is closed",
                self.transport_id
            )));
        }

        self.hub.publish(&self.transport_id, env).await;
        Ok(())
    }

    async fn subscribe(&self, sub: Subscription) -> Result<SubscriptionHandle> {
        // ---
        if self.closed.load(Ordering::Acquire) {
            return Err(RpcError::Transport(format!(
                "memory transport {} is closed",
                self.transport_id
            )));
        }

        Ok(self.hub.subscribe(&self.transport_id, sub).await)
    }

    /// Close this transport. Other transports on the same hub are unaffected;
    /// inboxes opened through this transport stay open until their handles drop.
    async fn close(&self) -> Result<()> {
        // ---
        tracing::debug!(transport_id = %self.transport_id, "closing memory transport");
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Create an in-memory transport on the process-global hub.
pub async fn create_memory_transport(transport_id: &str) -> Result<TransportPtr> {
    // ---
    create_memory_transport_with_hub(transport_id, global_hub()).await
}

/// Create an in-memory transport on an explicitly constructed hub.
pub async fn create_memory_transport_with_hub(
    transport_id: &str,
    hub: Arc<MemoryHub>,
) -> Result<TransportPtr> {
    // ---
    tracing::debug!(transport_id, "create memory transport");

    Ok(Arc::new(MemoryTransport {
        transport_id: transport_id.to_string(),
        hub,
        closed: AtomicBool::new(false),
    }))
}
