//! Transport implementations.
//!
//! Concrete implementations of the domain-level `Transport` trait. Broker
//! transports are behind feature flags and exposed only through constructor
//! functions; domain code never depends on transport-specific types.

mod amqp;
mod memory;

#[cfg(feature = "transport_lapin")]
pub use amqp::create_lapin_transport;

pub use memory::{create_memory_transport, create_memory_transport_with_hub, MemoryHub};

use crate::{Result, RpcConfig, RpcError, TransportPtr};

/// Create the transport selected by `config.transport_uri`.
///
/// - `None` or `memory://...` - in-memory transport on the process-global hub
/// - `amqp://...` / `amqps://...` - lapin transport (feature `transport_lapin`)
///
/// # Errors
///
/// Returns [`RpcError::Transport`] for an unrecognized scheme, for an AMQP URI
/// when the broker transport is not compiled in, or when connecting fails.
pub async fn create_transport(config: &RpcConfig) -> Result<TransportPtr> {
    // ---
    let uri = config.transport_uri.as_deref().unwrap_or("memory://");

    match uri.split_once("://").map(|(scheme, _)| scheme) {
        Some("memory") => create_memory_transport(&config.node_id).await,

        #[cfg(feature = "transport_lapin")]
        Some("amqp") | Some("amqps") => create_lapin_transport(config).await,

        #[cfg(not(feature = "transport_lapin"))]
        Some("amqp") | Some("amqps") => Err(RpcError::Transport(
            "AMQP transport not compiled in; enable feature transport_lapin".into(),
        )),

        _ => Err(RpcError::Transport(format!(
            "unrecognized transport uri: {uri}, expected memory:// or amqp://"
        ))),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[tokio::test]
    async fn test_defaults_to_memory() {
        // ---
        let config = RpcConfig::memory("selector", "routes");
        let transport = create_transport(&config).await.unwrap();
        assert_eq!(transport.transport_id(), "selector");
    }

    #[tokio::test]
    async fn test_rejects_unknown_scheme() {
        // ---
        let config = RpcConfig::with_broker("mqtt://localhost:1883", "selector", "routes");
        let err = create_transport(&config).await.err().expect("expected error");
        assert!(matches!(err, RpcError::Transport(_)));
    }
}
