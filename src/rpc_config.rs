//! Transport-agnostic configuration for the correlation client.
//!
//! Broker-specific interpretation (connection URI, exchange declaration)
//! happens in the transport layer.

use std::time::Duration;

/// Default time a call waits for its reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client configuration and connection parameters.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    // ---
    /// Transport connection URI.
    ///
    /// `amqp://` and `amqps://` select the broker transport. `None` or
    /// `memory://` selects the in-process transport.
    pub transport_uri: Option<String>,

    /// Unique identifier for this process, used for the default reply queue
    /// name and in logs.
    pub node_id: String,

    /// Exchange requests are published to. Empty means the broker default
    /// exchange.
    pub exchange: String,

    /// Routing key requests are published with.
    pub routing_key: String,

    /// Custom reply queue name. If `None`, derived from `node_id`.
    pub reply_queue: Option<String>,

    /// How long a call waits for its reply before failing with
    /// [`RpcError::Timeout`](crate::RpcError::Timeout).
    ///
    /// Default: 30 seconds
    pub request_timeout: Duration,
}

impl RpcConfig {
    /// Create a config for a broker at `transport_uri`.
    pub fn with_broker(
        transport_uri: impl Into<String>,
        node_id: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            transport_uri: Some(transport_uri.into()),
            ..Self::memory(node_id, routing_key)
        }
    }

    /// Create an in-memory transport config (no broker).
    pub fn memory(node_id: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            transport_uri: None,
            node_id: node_id.into(),
            exchange: String::new(),
            routing_key: routing_key.into(),
            reply_queue: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    pub fn with_reply_queue(mut self, name: impl Into<String>) -> Self {
        self.reply_queue = Some(name.into());
        self
    }

    /// Set the per-call reply timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The queue this node receives replies on.
    pub fn reply_queue_name(&self) -> String {
        // ---
        self.reply_queue
            .clone()
            .unwrap_or_else(|| format!("responses/{}", self.node_id))
    }
}
