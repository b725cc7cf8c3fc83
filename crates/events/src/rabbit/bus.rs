use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::BasicProperties;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeleteOptions,
};
use lapin::types::FieldTable;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatch::invoke_handlers;
use crate::envelope::EventEnvelope;
use crate::error::BusError;
use crate::event::Event;
use crate::handler::{EventHandler, HandlerContext, SubscriptionBinding};
use crate::policy::{RetryPolicy, clamp_concurrency};
use crate::publisher::EventPublisher;
use crate::rabbit::connection::ConnectionManager;
use crate::rabbit::topology::{self, TopologyNames, names_for};
use crate::registry::{Removal, SubscriptionRegistry};

/// Where a message goes when it leaves this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PublishTarget {
    Primary,
    DeadLetter,
}

/// RabbitMQ-backed event bus: publishes envelopes and runs consumers that
/// dispatch deliveries through the subscription registry.
///
/// All topology (exchanges, queues, bindings, dead-letter pairs) is declared
/// on demand from the event key, so publishers and subscribers can start in
/// any order against a blank broker.
pub struct RabbitEventBus {
    connection: Arc<ConnectionManager>,
    registry: Arc<SubscriptionRegistry>,
    scope: String,
}

impl RabbitEventBus {
    /// Build a bus for one broker and one naming scope.
    ///
    /// Does not connect; call [`connect`](Self::connect) or let the first
    /// publish/subscribe establish the connection.
    pub fn new(uri: impl Into<String>, scope: impl Into<String>) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new());
        registry.set_on_event_removed(|event_key| {
            debug!(event_key, "last handler removed for event");
        });
        Self {
            connection: Arc::new(ConnectionManager::new(uri)),
            registry,
            scope: scope.into(),
        }
    }

    pub async fn connect(&self) -> Result<(), BusError> {
        self.connection.ensure_connected().await
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Start consuming `E` with `handler` until `shutdown` is cancelled.
    ///
    /// Declares the full topology, registers the binding if it is not
    /// already present, and spawns the consume loop. At most
    /// `max_concurrent` deliveries (clamped to the process-wide ceiling) are
    /// handled at once; a failing delivery is republished with its retry
    /// count incremented until `max_attempts` is exhausted, then
    /// dead-lettered.
    ///
    /// The returned handle resolves once the loop has drained and closed its
    /// channel.
    pub async fn subscribe<E, H>(
        &self,
        handler: Arc<H>,
        shutdown: CancellationToken,
        max_attempts: u32,
        max_concurrent: usize,
    ) -> Result<JoinHandle<()>, BusError>
    where
        E: Event,
        H: EventHandler<E> + 'static,
    {
        self.connection.ensure_connected().await?;
        let names = names_for(&self.scope, E::KEY);
        let channel = self.connection.open_channel().await?;
        let arguments = topology::declare_dead_letter(&channel, &names).await?;
        topology::declare_primary(&channel, &names, arguments).await?;

        if !self.registry.has_handler(E::KEY, H::NAME) {
            self.registry
                .add(SubscriptionBinding::new::<E, H>(handler))?;
        }

        let concurrency = clamp_concurrency(max_concurrent);
        channel
            .basic_qos(concurrency as u16, BasicQosOptions::default())
            .await?;
        let consumer_tag = format!("{}_consumer", names.queue);
        let mut consumer = channel
            .basic_consume(
                &names.queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        info!(
            queue = %names.queue,
            handler = H::NAME,
            concurrency,
            max_attempts,
            "consumer started"
        );

        let registry = Arc::clone(&self.registry);
        let connection = Arc::clone(&self.connection);
        let policy = RetryPolicy::new(max_attempts);
        let event_key = E::KEY;

        let handle = tokio::spawn(async move {
            let slots = Arc::new(Semaphore::new(concurrency));
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!(queue = %names.queue, "consumer shutting down");
                        break;
                    }
                    delivery = consumer.next() => match delivery {
                        Some(Ok(delivery)) => {
                            let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
                                break;
                            };
                            let registry = Arc::clone(&registry);
                            let connection = Arc::clone(&connection);
                            let names = names.clone();
                            tokio::spawn(async move {
                                handle_delivery(
                                    delivery,
                                    event_key,
                                    &registry,
                                    &connection,
                                    &names,
                                    policy,
                                )
                                .await;
                                drop(permit);
                            });
                        }
                        Some(Err(err)) => {
                            error!(error = %err, queue = %names.queue, "delivery error");
                        }
                        None => {
                            warn!(queue = %names.queue, "consume stream ended");
                            break;
                        }
                    }
                }
            }
            if let Err(err) = channel.close(200, "consumer stopped").await {
                debug!(error = %err, "channel close failed");
            }
        });
        Ok(handle)
    }

    /// Drop the (event, handler) binding and delete the queue.
    ///
    /// The queue is deleted even when the binding was not registered, so a
    /// restarted process can still clean up broker state it no longer wants.
    pub async fn unsubscribe<E, H>(&self) -> Result<(), BusError>
    where
        E: Event,
        H: EventHandler<E> + 'static,
    {
        if self.registry.remove(E::KEY, H::NAME) == Removal::NotRegistered {
            warn!(
                event_key = E::KEY,
                handler = H::NAME,
                "unsubscribe for a binding that was not registered"
            );
        }

        self.connection.ensure_connected().await?;
        let channel = self.connection.open_channel().await?;
        let names = names_for(&self.scope, E::KEY);
        channel
            .queue_delete(&names.queue, QueueDeleteOptions::default())
            .await?;
        info!(queue = %names.queue, "queue deleted");
        if let Err(err) = channel.close(200, "unsubscribe complete").await {
            debug!(error = %err, "channel close failed");
        }
        Ok(())
    }

    /// Drop all subscriptions and close the broker connection.
    pub async fn close(&self) {
        self.registry.clear();
        self.connection.close().await;
    }
}

impl std::fmt::Debug for RabbitEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RabbitEventBus")
            .field("scope", &self.scope)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<E: Event> EventPublisher<E> for RabbitEventBus {
    async fn publish(&self, envelope: &EventEnvelope<E>) -> Result<(), BusError> {
        let names = names_for(&self.scope, E::KEY);
        let body = serde_json::to_vec(envelope)?;
        publish_with_topology(&self.connection, &names, PublishTarget::Primary, &body).await
    }
}

/// Publish `body` after (re)declaring the topology it needs.
///
/// Opens a fresh channel, declares the dead-letter pair first and, for
/// primary publishes, the primary pair on top, then sends a persistent
/// JSON message and closes the channel. Dead-letter publishes go to the
/// dead-letter exchange with an empty routing key.
async fn publish_with_topology(
    connection: &ConnectionManager,
    names: &TopologyNames,
    target: PublishTarget,
    body: &[u8],
) -> Result<(), BusError> {
    connection.ensure_connected().await?;
    let channel = connection.open_channel().await?;
    let arguments = topology::declare_dead_letter(&channel, names).await?;
    let (exchange, routing_key) = match target {
        PublishTarget::Primary => {
            topology::declare_primary(&channel, names, arguments).await?;
            (names.exchange.as_str(), names.routing_key.as_str())
        }
        PublishTarget::DeadLetter => (names.dlq_exchange.as_str(), ""),
    };
    channel
        .basic_publish(
            exchange,
            routing_key,
            BasicPublishOptions::default(),
            body,
            BasicProperties::default()
                .with_delivery_mode(2)
                .with_content_type("application/json".into()),
        )
        .await?;
    debug!(exchange, routing_key, bytes = body.len(), "message published");
    if let Err(err) = channel.close(200, "publish complete").await {
        debug!(error = %err, "channel close failed");
    }
    Ok(())
}

/// Process one delivery end to end: parse, dispatch, settle.
///
/// Every path acknowledges exactly once. A malformed body is dead-lettered
/// as-is; a handler failure republishes the envelope with its retry count
/// incremented, to the primary exchange while attempts remain and the error
/// is retriable, to the dead-letter exchange otherwise. The original
/// delivery is then rejected without requeue.
async fn handle_delivery(
    delivery: Delivery,
    event_key: &'static str,
    registry: &SubscriptionRegistry,
    connection: &ConnectionManager,
    names: &TopologyNames,
    policy: RetryPolicy,
) {
    let mut envelope: EventEnvelope<serde_json::Value> =
        match serde_json::from_slice(&delivery.data) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, queue = %names.queue, "malformed body, dead-lettering");
                if let Err(err) = publish_with_topology(
                    connection,
                    names,
                    PublishTarget::DeadLetter,
                    &delivery.data,
                )
                .await
                {
                    error!(error = %err, queue = %names.queue, "dead-letter publish failed");
                }
                reject(&delivery, names).await;
                return;
            }
        };

    let ctx = HandlerContext {
        event_id: envelope.id(),
        created_at: envelope.created_at(),
        retry_count: envelope.retry_count(),
        event_key,
    };

    match invoke_handlers(registry, &ctx, envelope.payload()).await {
        Ok(_) => {
            if let Err(err) = delivery.ack(BasicAckOptions::default()).await {
                error!(error = %err, queue = %names.queue, "ack failed");
            }
        }
        Err(err) => {
            envelope.increment_retry();
            let attempt = envelope.retry_count();
            error!(
                error = %err,
                event_id = %ctx.event_id,
                attempt,
                "handler failed"
            );
            let target = if err.is_retriable() && policy.should_retry(attempt) {
                PublishTarget::Primary
            } else {
                info!(event_id = %ctx.event_id, attempt, "retries exhausted, dead-lettering");
                PublishTarget::DeadLetter
            };
            match serde_json::to_vec(&envelope) {
                Ok(body) => {
                    if let Err(err) =
                        publish_with_topology(connection, names, target, &body).await
                    {
                        error!(error = %err, event_id = %ctx.event_id, "republish failed");
                    }
                }
                Err(err) => {
                    error!(error = %err, event_id = %ctx.event_id, "envelope serialization failed");
                }
            }
            reject(&delivery, names).await;
        }
    }
}

async fn reject(delivery: &Delivery, names: &TopologyNames) {
    let options = BasicNackOptions {
        requeue: false,
        ..Default::default()
    };
    if let Err(err) = delivery.nack(options).await {
        error!(error = %err, queue = %names.queue, "nack failed");
    }
}
