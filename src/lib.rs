//! HTTP gateway for route management over a message broker.
//!
//! The gateway authenticates HTTP callers, turns each route operation into a
//! request message for the route service, and waits for the correlated reply.
//! The request/response correlation lives in [`RpcClient`]; the HTTP surface
//! lives in [`gateway`].
//!

// Import all sub modules once...
mod client;
mod domain;
mod server;
mod transport;

mod rpc_config;

mod correlation;
mod error;

pub mod config;
pub mod gateway;

// Re-export main types
pub use client::{RpcClient, StatsSnapshot};
pub use server::RpcResponder;

pub use rpc_config::{RpcConfig, DEFAULT_REQUEST_TIMEOUT};

pub use correlation::CorrelationId;
pub use error::{Result, RpcError};

pub use transport::{
    // ---
    create_memory_transport,
    create_memory_transport_with_hub,
    create_transport,
    MemoryHub,
};

#[cfg(feature = "transport_lapin")]
pub use transport::create_lapin_transport;

// --- public re-exports
pub use domain::{
    //
    Address,
    Envelope,
    Subscription,
    SubscriptionHandle,
    Transport,
    TransportPtr,
    JSON_CONTENT_TYPE,
};
