//! RabbitMQ transport: connection lifecycle, topology naming and the bus.

mod bus;
mod connection;
mod topology;

pub use bus::RabbitEventBus;
pub use connection::ConnectionManager;
pub use topology::{TopologyNames, names_for};
