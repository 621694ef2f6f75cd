//! AMQP protocol transports.
//!
//! - lapin - AMQP 0-9-1 (RabbitMQ)

#[cfg(feature = "transport_lapin")]
mod lapin;

#[cfg(feature = "transport_lapin")]
pub use lapin::create_transport as create_lapin_transport;
