//! At-least-once event processing over RabbitMQ.
//!
//! The crate is built around four pieces:
//!
//! - [`EventEnvelope`]: the wire unit, carrying id, creation time and retry
//!   count next to the payload.
//! - [`SubscriptionRegistry`] plus [`EventHandler`] bindings: a static,
//!   process-wide map from event key to handlers, fixed at subscription
//!   time.
//! - [`RabbitEventBus`]: topology declaration, publishing and the consume
//!   loop with bounded concurrency and republish-based retries.
//! - [`RetryPolicy`]: the single retry ceiling a subscription runs under.
//!
//! Delivery is at least once; handlers own idempotency.

mod dispatch;
mod domain;
mod envelope;
mod error;
mod event;
mod handler;
mod in_memory;
mod policy;
mod publisher;
pub mod rabbit;
mod registry;

pub use dispatch::invoke_handlers;
pub use envelope::EventEnvelope;
pub use error::{BusError, HandlerError};
pub use event::Event;
pub use handler::{EventHandler, HandlerContext, SubscriptionBinding};
pub use in_memory::InMemoryEventBus;
pub use policy::{MAX_CONCURRENCY, RetryPolicy, clamp_concurrency};
pub use publisher::EventPublisher;
pub use rabbit::{ConnectionManager, RabbitEventBus};
pub use registry::{Removal, SubscriptionRegistry};
