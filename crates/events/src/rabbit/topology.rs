//! Broker topology naming and declaration.
//!
//! The naming convention is a deployment contract: existing queues and
//! exchanges were created with these exact strings, so the derivation must
//! stay bit-for-bit stable across releases.

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{Channel, ExchangeKind};

const PREFIX_QUEUE: &str = "queue";
const PREFIX_EXCHANGE: &str = "exchange";
const PREFIX_ROUTING_KEY: &str = "key_event";
const PREFIX_DLQ_QUEUE: &str = "dql_queue";
const PREFIX_DLQ_EXCHANGE: &str = "dql_exchange";
const EVENT_SUFFIX: &str = "Event";
const X_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";

/// The five broker names derived from one event key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyNames {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
    pub dlq_exchange: String,
    pub dlq_queue: String,
}

/// Derive the topology names for `event_key` within `scope`.
///
/// Pure and total: same inputs, same strings, no side effects. `{type}` is
/// the event key with one trailing `"Event"` stripped, then lower-cased;
/// `{scope}` is trimmed and lower-cased. The shapes are `queue_{type}`,
/// `exchange_{scope}_{type}`, `key_event_{type}`, `dql_queue_{type}` and
/// `dql_exchange_{scope}_{type}`.
pub fn names_for(scope: &str, event_key: &str) -> TopologyNames {
    let kind = normalize_event_key(event_key);
    let scope = scope.trim().to_lowercase();
    TopologyNames {
        exchange: format!("{PREFIX_EXCHANGE}_{scope}_{kind}"),
        queue: format!("{PREFIX_QUEUE}_{kind}"),
        routing_key: format!("{PREFIX_ROUTING_KEY}_{kind}"),
        dlq_exchange: format!("{PREFIX_DLQ_EXCHANGE}_{scope}_{kind}"),
        dlq_queue: format!("{PREFIX_DLQ_QUEUE}_{kind}"),
    }
}

fn normalize_event_key(event_key: &str) -> String {
    event_key
        .strip_suffix(EVENT_SUFFIX)
        .unwrap_or(event_key)
        .to_lowercase()
}

/// Declare the dead-letter exchange/queue pair and bind them.
///
/// The DLQ binds to its exchange with an empty routing key; dead-letter
/// publishes use the same empty key. Returns the queue arguments that point
/// a primary queue at this dead-letter exchange.
pub(crate) async fn declare_dead_letter(
    channel: &Channel,
    names: &TopologyNames,
) -> Result<FieldTable, lapin::Error> {
    channel
        .exchange_declare(
            &names.dlq_exchange,
            ExchangeKind::Direct,
            ExchangeDeclareOptions::default(),
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_declare(&names.dlq_queue, durable_queue(), FieldTable::default())
        .await?;
    channel
        .queue_bind(
            &names.dlq_queue,
            &names.dlq_exchange,
            "",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    let mut arguments = FieldTable::default();
    arguments.insert(
        ShortString::from(X_DEAD_LETTER_EXCHANGE),
        AMQPValue::LongString(names.dlq_exchange.clone().into()),
    );
    Ok(arguments)
}

/// Declare the primary exchange/queue and bind them via the routing key.
///
/// `arguments` comes from [`declare_dead_letter`] so rejected messages have
/// somewhere to go. Declarations are idempotent; repeating them against an
/// unchanged topology is a no-op, which is what lets every publish self-heal
/// missing topology.
pub(crate) async fn declare_primary(
    channel: &Channel,
    names: &TopologyNames,
    arguments: FieldTable,
) -> Result<(), lapin::Error> {
    channel
        .exchange_declare(
            &names.exchange,
            ExchangeKind::Direct,
            ExchangeDeclareOptions::default(),
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_declare(&names.queue, durable_queue(), arguments)
        .await?;
    channel
        .queue_bind(
            &names.queue,
            &names.exchange,
            &names.routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;
    Ok(())
}

fn durable_queue() -> QueueDeclareOptions {
    QueueDeclareOptions {
        durable: true,
        exclusive: false,
        auto_delete: false,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn certificate_event_names_match_the_deployed_topology() {
        let names = names_for("certmill", "CertificateEvent");
        assert_eq!(names.queue, "queue_certificate");
        assert_eq!(names.exchange, "exchange_certmill_certificate");
        assert_eq!(names.routing_key, "key_event_certificate");
        assert_eq!(names.dlq_queue, "dql_queue_certificate");
        assert_eq!(names.dlq_exchange, "dql_exchange_certmill_certificate");
    }

    #[test]
    fn scope_is_trimmed_and_lowered() {
        let names = names_for("  CertMill ", "CertificateEvent");
        assert_eq!(names.exchange, "exchange_certmill_certificate");
    }

    #[test]
    fn keys_without_the_suffix_pass_through() {
        let names = names_for("certmill", "Audit");
        assert_eq!(names.queue, "queue_audit");
        assert_eq!(names.routing_key, "key_event_audit");
    }

    #[test]
    fn only_one_trailing_suffix_is_stripped() {
        let names = names_for("certmill", "EventEvent");
        assert_eq!(names.queue, "queue_event");
    }

    proptest! {
        #[test]
        fn naming_is_deterministic(key in "[A-Za-z]{1,24}", scope in "[a-z]{1,12}") {
            prop_assert_eq!(names_for(&scope, &key), names_for(&scope, &key));
        }

        #[test]
        fn distinct_normalized_keys_never_collide(
            a in "[A-Za-z]{1,24}",
            b in "[A-Za-z]{1,24}",
            scope in "[a-z]{1,12}",
        ) {
            prop_assume!(normalize_event_key(&a) != normalize_event_key(&b));
            let left = names_for(&scope, &a);
            let right = names_for(&scope, &b);
            prop_assert_ne!(&left.queue, &right.queue);
            prop_assert_ne!(&left.exchange, &right.exchange);
            prop_assert_ne!(&left.routing_key, &right.routing_key);
            prop_assert_ne!(&left.dlq_queue, &right.dlq_queue);
            prop_assert_ne!(&left.dlq_exchange, &right.dlq_exchange);
        }
    }
}
