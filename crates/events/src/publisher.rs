use std::sync::Arc;

use async_trait::async_trait;

use crate::envelope::EventEnvelope;
use crate::error::BusError;
use crate::event::Event;

/// Publishing seam between event producers and the broker.
///
/// Producers (the API, the retry path) depend on this trait rather than on
/// broker machinery, so tests can swap in the in-memory bus. Failure means
/// the caller must not assume the message was delivered; since enqueued work
/// is recorded durably before publishing, re-publishing is always safe.
#[async_trait]
pub trait EventPublisher<E: Event>: Send + Sync {
    async fn publish(&self, envelope: &EventEnvelope<E>) -> Result<(), BusError>;
}

#[async_trait]
impl<E, P> EventPublisher<E> for Arc<P>
where
    E: Event,
    P: EventPublisher<E> + ?Sized,
{
    async fn publish(&self, envelope: &EventEnvelope<E>) -> Result<(), BusError> {
        (**self).publish(envelope).await
    }
}
