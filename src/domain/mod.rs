//! Domain layer public interface.
//!
//! Transport-independent abstractions shared by the client, the responder,
//! and the concrete transports. Consumers import through this module.

mod transport;

// --- Transport domain re-exports ---

pub use transport::{
    //
    Address,
    Envelope,
    Subscription,
    SubscriptionHandle,
    Transport,
    TransportPtr,
    JSON_CONTENT_TYPE,
};
