use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use certmill_core::EventId;

use crate::error::HandlerError;
use crate::event::Event;

/// Per-message context handed to a handler next to the payload.
///
/// Built fresh from the envelope metadata for every delivery and owned for
/// the duration of that one message, so nothing leaks between concurrent
/// deliveries. This replaces any notion of a shared per-message resolution
/// scope: whatever a handler needs beyond its own construction-time
/// dependencies arrives here.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub event_id: EventId,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub event_key: &'static str,
}

/// An event handler bound to one event type.
///
/// `NAME` identifies the handler for duplicate-subscription detection and
/// logging; it must be unique per handler type.
#[async_trait]
pub trait EventHandler<E: Event>: Send + Sync {
    const NAME: &'static str;

    async fn handle(&self, ctx: &HandlerContext, event: E) -> Result<(), HandlerError>;
}

/// Object-safe adapter over a typed handler.
///
/// Built once at registration time: the payload deserialization and the
/// typed call are captured here, so dispatch never looks up types at
/// runtime.
trait ErasedHandler: Send + Sync {
    fn invoke(
        &self,
        ctx: HandlerContext,
        payload: serde_json::Value,
    ) -> BoxFuture<'static, Result<(), HandlerError>>;
}

struct TypedHandler<E, H> {
    handler: Arc<H>,
    _event: PhantomData<fn(E)>,
}

impl<E, H> ErasedHandler for TypedHandler<E, H>
where
    E: Event,
    H: EventHandler<E> + 'static,
{
    fn invoke(
        &self,
        ctx: HandlerContext,
        payload: serde_json::Value,
    ) -> BoxFuture<'static, Result<(), HandlerError>> {
        let handler = Arc::clone(&self.handler);
        Box::pin(async move {
            let event: E = serde_json::from_value(payload).map_err(HandlerError::Malformed)?;
            handler.handle(&ctx, event).await
        })
    }
}

/// One registered (event, handler) pair.
#[derive(Clone)]
pub struct SubscriptionBinding {
    event_key: &'static str,
    handler_name: &'static str,
    handler: Arc<dyn ErasedHandler>,
}

impl SubscriptionBinding {
    pub fn new<E, H>(handler: Arc<H>) -> Self
    where
        E: Event,
        H: EventHandler<E> + 'static,
    {
        Self {
            event_key: E::KEY,
            handler_name: H::NAME,
            handler: Arc::new(TypedHandler {
                handler,
                _event: PhantomData,
            }),
        }
    }

    pub fn event_key(&self) -> &'static str {
        self.event_key
    }

    pub fn handler_name(&self) -> &'static str {
        self.handler_name
    }

    /// Deserialize the payload and run the handler.
    pub async fn invoke(
        &self,
        ctx: HandlerContext,
        payload: serde_json::Value,
    ) -> Result<(), HandlerError> {
        self.handler.invoke(ctx, payload).await
    }
}

impl core::fmt::Debug for SubscriptionBinding {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SubscriptionBinding")
            .field("event_key", &self.event_key)
            .field("handler_name", &self.handler_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Tick {
        n: u32,
    }

    impl Event for Tick {
        const KEY: &'static str = "TickEvent";
    }

    #[derive(Default)]
    struct Counter {
        seen: AtomicU32,
    }

    #[async_trait]
    impl EventHandler<Tick> for Counter {
        const NAME: &'static str = "Counter";

        async fn handle(&self, _ctx: &HandlerContext, event: Tick) -> Result<(), HandlerError> {
            self.seen.fetch_add(event.n, Ordering::SeqCst);
            Ok(())
        }
    }

    fn ctx() -> HandlerContext {
        HandlerContext {
            event_id: EventId::new(),
            created_at: Utc::now(),
            retry_count: 0,
            event_key: Tick::KEY,
        }
    }

    #[tokio::test]
    async fn binding_deserializes_and_invokes() {
        let handler = Arc::new(Counter::default());
        let binding = SubscriptionBinding::new::<Tick, Counter>(Arc::clone(&handler));

        assert_eq!(binding.event_key(), "TickEvent");
        assert_eq!(binding.handler_name(), "Counter");

        binding
            .invoke(ctx(), serde_json::json!({ "n": 5 }))
            .await
            .unwrap();
        assert_eq!(handler.seen.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn mismatched_payload_is_malformed() {
        let binding = SubscriptionBinding::new::<Tick, Counter>(Arc::new(Counter::default()));

        let err = binding
            .invoke(ctx(), serde_json::json!({ "n": "not-a-number" }))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Malformed(_)));
    }
}
