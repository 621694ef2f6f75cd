// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! A transport delivers opaque envelopes between publishers and subscribers.
//! It knows nothing about RPC: correlation, timeouts, and method dispatch live
//! in the client and responder layers. Concrete implementations live under
//! `src/transport/`.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{CorrelationId, Result};

/// Content type stamped on every envelope produced by this crate.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A transport address.
///
/// For broker transports this is the routing key (and queue name) a message is
/// published with. Treated as opaque at the domain level.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Address(pub Arc<str>);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<T> From<T> for Address
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        // ---
        Address(value.into())
    }
}

/// A subscription identifier.
///
/// The in-memory transport matches a subscription against an address by exact
/// string equality; broker transports treat it as a queue name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Subscription(pub Arc<str>);

impl From<Address> for Subscription {
    fn from(address: Address) -> Self {
        // ---
        Subscription(address.0)
    }
}

impl<T> From<T> for Subscription
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        // ---
        Subscription(value.into())
    }
}

/// The unit of transport between producers and consumers.
///
/// Request envelopes carry a method, a correlation id and a reply address.
/// Reply envelopes carry the same correlation id and either a payload or an
/// error indicator.
///
/// ```
/// # use route_gateway::{Address, CorrelationId, Envelope};
/// # use bytes::Bytes;
/// let id = CorrelationId::generate();
/// let request = Envelope::request(
///     Address::from("route-service"),
///     "GetRoute".into(),
///     Bytes::from_static(b"{\"Id\":\"r1\"}"),
///     &id,
///     Address::from("responses/gateway-1"),
/// );
/// let reply = Envelope::reply(
///     request.reply_to.clone().unwrap(),
///     Bytes::from_static(b"{\"FoundRoute\":false}"),
///     &id,
/// );
/// assert_eq!(reply.correlation_id, request.correlation_id);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    // ---
    /// Delivery address used by the transport.
    pub address: Address,

    /// Remote operation name. `Some` on requests, `None` on replies.
    pub method: Option<Arc<str>>,

    /// Opaque payload bytes, JSON for everything this crate produces.
    pub payload: Bytes,

    /// Correlation identifier associating a reply with its request.
    pub correlation_id: Option<Arc<str>>,

    /// Where the reply to a request must be published.
    pub reply_to: Option<Address>,

    pub content_type: Option<Arc<str>>,

    /// Error indicator set by the responder when the call failed remotely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Arc<str>>,
}

impl Envelope {
    // ---
    /// Create a request envelope.
    pub fn request(
        address: Address,
        method: Arc<str>,
        payload: Bytes,
        correlation_id: &CorrelationId,
        reply_to: Address,
    ) -> Self {
        // ---
        Self {
            address,
            method: Some(method),
            payload,
            correlation_id: Some(correlation_id.as_arc()),
            reply_to: Some(reply_to),
            content_type: Some(Arc::from(JSON_CONTENT_TYPE)),
            error: None,
        }
    }

    /// Create a successful reply envelope.
    pub fn reply(address: Address, payload: Bytes, correlation_id: &CorrelationId) -> Self {
        // ---
        Self {
            address,
            method: None,
            payload,
            correlation_id: Some(correlation_id.as_arc()),
            reply_to: None,
            content_type: Some(Arc::from(JSON_CONTENT_TYPE)),
            error: None,
        }
    }

    /// Create a reply envelope reporting a remote failure.
    pub fn error_reply(
        address: Address,
        correlation_id: &CorrelationId,
        error: impl Into<Arc<str>>,
    ) -> Self {
        // ---
        Self {
            address,
            method: None,
            payload: Bytes::new(),
            correlation_id: Some(correlation_id.as_arc()),
            reply_to: None,
            content_type: None,
            error: Some(error.into()),
        }
    }

    /// The envelope's correlation id, if it carries one.
    pub fn correlation(&self) -> Option<CorrelationId> {
        self.correlation_id.clone().map(CorrelationId::from)
    }
}

/// Handle returned from a successful subscription.
///
/// Dropping the handle closes the inbox; the transport discards envelopes for
/// closed inboxes.
pub struct SubscriptionHandle {
    // ---
    pub inbox: mpsc::Receiver<Envelope>,
}

/// Transport abstraction.
///
/// Implementations must ensure that:
/// - once `subscribe()` returns, matching envelopes published afterwards are
///   deliverable to the returned inbox;
/// - `publish()` reports failure to hand the envelope to the underlying
///   system as an error and never retries on its own.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Identifier of this transport instance, used for logging.
    fn transport_id(&self) -> &str;

    /// Publish an envelope to its address.
    async fn publish(&self, env: Envelope) -> Result<()>;

    /// Register a subscription and return a handle for receiving envelopes.
    async fn subscribe(&self, sub: Subscription) -> Result<SubscriptionHandle>;

    /// Close the transport and release associated resources.
    async fn close(&self) -> Result<()>;
}

/// Shared transport pointer. Clones share one underlying connection.
pub type TransportPtr = Arc<dyn Transport>;
