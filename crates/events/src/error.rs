//! Broker-facing error model.

use thiserror::Error;

use certmill_core::ProcessId;

/// Errors raised by the event bus and its supporting pieces.
#[derive(Debug, Error)]
pub enum BusError {
    /// No live connection and the caller required one.
    #[error("not connected to the broker")]
    NotConnected,

    /// Establishing the connection failed (broker unreachable, bad
    /// credentials). Surfaced immediately; the caller decides whether to
    /// retry.
    #[error("broker connection failed")]
    Connect(#[source] lapin::Error),

    /// A channel-level operation failed (declare, bind, publish, consume).
    #[error("broker operation failed")]
    Broker(#[from] lapin::Error),

    /// Envelope (de)serialization failed.
    #[error("event serialization failed")]
    Serialize(#[from] serde_json::Error),

    /// The exact (event, handler) pair is already registered.
    #[error("handler '{handler}' already subscribed for event '{event_key}'")]
    DuplicateSubscription {
        event_key: String,
        handler: &'static str,
    },
}

/// Errors raised by event handlers while processing one delivery.
///
/// The dispatcher keys its policy off the variant: `Malformed` goes straight
/// to the dead-letter queue (retrying cannot fix a bad payload), everything
/// else runs through the retry budget.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Idempotency conflict: the process is already being executed. Indicates
    /// duplicate delivery, not work failure; attempt counts stay untouched.
    #[error("process {0} is already in process")]
    AlreadyInProcess(ProcessId),

    /// The payload did not deserialize into the handler's event type.
    #[error("malformed event payload")]
    Malformed(#[source] serde_json::Error),

    /// Any other processing failure.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Wrap an arbitrary processing failure, keeping its display form for
    /// the ledger's error column.
    pub fn failed(err: impl core::fmt::Display) -> Self {
        Self::Failed(err.to_string())
    }

    /// Whether retrying can ever help with this error.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, Self::Malformed(_))
    }
}
