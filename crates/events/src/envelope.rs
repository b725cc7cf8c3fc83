use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use certmill_core::EventId;

/// Envelope for an event while it is in flight on the broker.
///
/// This is the unit that travels on the wire: a JSON object carrying the
/// delivery metadata next to the business payload.
///
/// Notes:
/// - `id` and `created_at` are assigned once at creation and never change.
/// - `retry_count` increments exactly once per failed delivery attempt; it
///   must travel with the message (retry is republish-based), which is why
///   it is part of the serialized form.
/// - The metadata never reaches business logic; handlers receive the payload
///   plus a [`HandlerContext`](crate::HandlerContext) built from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    id: EventId,
    created_at: DateTime<Utc>,
    retry_count: u32,
    payload: E,
}

impl<E> EventEnvelope<E> {
    /// Wrap a freshly produced payload.
    pub fn new(payload: E) -> Self {
        Self {
            id: EventId::new(),
            created_at: Utc::now(),
            retry_count: 0,
            payload,
        }
    }

    /// Rebuild an envelope from its parts (tests, redelivery tooling).
    pub fn from_parts(
        id: EventId,
        created_at: DateTime<Utc>,
        retry_count: u32,
        payload: E,
    ) -> Self {
        Self {
            id,
            created_at,
            retry_count,
            payload,
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }

    /// Record one failed delivery attempt.
    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
    }

    #[test]
    fn new_envelopes_start_with_zero_retries() {
        let envelope = EventEnvelope::new(Ping { seq: 7 });
        assert_eq!(envelope.retry_count(), 0);
        assert_eq!(envelope.payload().seq, 7);
    }

    #[test]
    fn retry_increments_do_not_touch_identity() {
        let mut envelope = EventEnvelope::new(Ping { seq: 1 });
        let id = envelope.id();
        let created = envelope.created_at();

        envelope.increment_retry();
        envelope.increment_retry();

        assert_eq!(envelope.retry_count(), 2);
        assert_eq!(envelope.id(), id);
        assert_eq!(envelope.created_at(), created);
    }

    #[test]
    fn wire_format_nests_the_payload() {
        let envelope = EventEnvelope::new(Ping { seq: 3 });
        let json = serde_json::to_value(&envelope).unwrap();

        assert!(json.get("id").is_some());
        assert!(json.get("created_at").is_some());
        assert_eq!(json["retry_count"], 0);
        assert_eq!(json["payload"]["seq"], 3);

        let back: EventEnvelope<Ping> = serde_json::from_value(json).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn metadata_survives_a_round_trip_through_raw_json() {
        // The dispatcher parses envelopes with an opaque payload before any
        // handler-specific typing happens; retry state must survive that.
        let mut envelope = EventEnvelope::new(Ping { seq: 9 });
        envelope.increment_retry();

        let body = serde_json::to_vec(&envelope).unwrap();
        let raw: EventEnvelope<serde_json::Value> = serde_json::from_slice(&body).unwrap();

        assert_eq!(raw.retry_count(), 1);
        assert_eq!(raw.id(), envelope.id());
        assert_eq!(raw.payload()["seq"], 9);
    }
}
