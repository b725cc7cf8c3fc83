//! Transport-agnostic handler dispatch.

use tracing::{debug, warn};

use crate::error::HandlerError;
use crate::handler::HandlerContext;
use crate::registry::SubscriptionRegistry;

/// Invoke every handler registered for the context's event key, in
/// registration order.
///
/// Stops at the first failing handler so the retry policy sees exactly one
/// error per delivery. Returns `Ok(false)` when nothing is registered for
/// the key; the caller acks and drops such deliveries.
pub async fn invoke_handlers(
    registry: &SubscriptionRegistry,
    ctx: &HandlerContext,
    payload: &serde_json::Value,
) -> Result<bool, HandlerError> {
    let bindings = registry.handlers_for(ctx.event_key);
    if bindings.is_empty() {
        warn!(
            event_key = ctx.event_key,
            event_id = %ctx.event_id,
            "no handlers registered for delivered event"
        );
        return Ok(false);
    }

    for binding in &bindings {
        debug!(
            event_key = ctx.event_key,
            handler = binding.handler_name(),
            event_id = %ctx.event_id,
            retry_count = ctx.retry_count,
            "invoking handler"
        );
        binding.invoke(ctx.clone(), payload.clone()).await?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use tokio::sync::Semaphore;

    use certmill_core::EventId;

    use crate::event::Event;
    use crate::handler::{EventHandler, SubscriptionBinding};

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Job;

    impl Event for Job {
        const KEY: &'static str = "JobEvent";
    }

    /// Handler that parks until the gate opens, tracking peak concurrency.
    struct Parking {
        gate: Semaphore,
        active: AtomicUsize,
        peak: AtomicUsize,
        completed: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler<Job> for Parking {
        const NAME: &'static str = "Parking";

        async fn handle(&self, _: &HandlerContext, _: Job) -> Result<(), HandlerError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let permit = self.gate.acquire().await.unwrap();
            permit.forget();

            self.active.fetch_sub(1, Ordering::SeqCst);
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn ctx() -> HandlerContext {
        HandlerContext {
            event_id: EventId::new(),
            created_at: Utc::now(),
            retry_count: 0,
            event_key: Job::KEY,
        }
    }

    #[tokio::test]
    async fn unknown_keys_are_reported_without_error() {
        let registry = SubscriptionRegistry::new();
        let ran = invoke_handlers(&registry, &ctx(), &serde_json::json!({}))
            .await
            .unwrap();
        assert!(!ran);
    }

    #[tokio::test]
    async fn concurrency_stays_within_the_semaphore_bound() {
        let handler = Arc::new(Parking {
            gate: Semaphore::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        });

        let registry = Arc::new(SubscriptionRegistry::new());
        registry
            .add(SubscriptionBinding::new::<Job, Parking>(Arc::clone(&handler)))
            .unwrap();

        // Same shape as the consume loop: acquire a slot, then spawn the
        // handler task which releases it when done.
        let slots = Arc::new(Semaphore::new(2));
        let mut tasks = Vec::new();
        for _ in 0..5 {
            let permit = Arc::clone(&slots).acquire_owned().await.unwrap();
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                invoke_handlers(&registry, &ctx(), &serde_json::json!({}))
                    .await
                    .unwrap();
                drop(permit);
            }));

            // With both slots taken the loop would be parked here; open the
            // gate for one handler so a slot frees up.
            if slots.available_permits() == 0 {
                handler.gate.add_permits(1);
            }
        }
        handler.gate.add_permits(5);
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(handler.completed.load(Ordering::SeqCst), 5);
        assert!(handler.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn all_deliveries_complete_once_released() {
        let handler = Arc::new(Parking {
            gate: Semaphore::new(5),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        });

        let registry = Arc::new(SubscriptionRegistry::new());
        registry
            .add(SubscriptionBinding::new::<Job, Parking>(Arc::clone(&handler)))
            .unwrap();

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                invoke_handlers(&registry, &ctx(), &serde_json::json!({})).await
            }));
        }
        for task in tasks {
            let ran = tokio::time::timeout(Duration::from_secs(1), task)
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            assert!(ran);
        }
        assert_eq!(handler.completed.load(Ordering::SeqCst), 5);
    }
}
