//! In-memory publisher for tests/dev.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::envelope::EventEnvelope;
use crate::error::BusError;
use crate::event::Event;
use crate::publisher::EventPublisher;

/// Capture-style bus: records everything published, in order.
///
/// - No IO / no broker
/// - Envelopes are cloned on publish so callers keep ownership
/// - Tests inspect or drain the capture buffer
pub struct InMemoryEventBus<E> {
    published: Mutex<Vec<EventEnvelope<E>>>,
}

impl<E> InMemoryEventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E> Default for InMemoryEventBus<E> {
    fn default() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
        }
    }
}

impl<E: Clone> InMemoryEventBus<E> {
    /// Snapshot of everything published so far.
    pub fn published(&self) -> Vec<EventEnvelope<E>> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain the capture buffer.
    pub fn take_published(&self) -> Vec<EventEnvelope<E>> {
        std::mem::take(
            &mut *self
                .published
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}

#[async_trait]
impl<E> EventPublisher<E> for InMemoryEventBus<E>
where
    E: Event + Clone,
{
    async fn publish(&self, envelope: &EventEnvelope<E>) -> Result<(), BusError> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(envelope.clone());
        Ok(())
    }
}
