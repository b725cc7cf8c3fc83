//! Durable per-process ledger: status, attempt count and payload for every
//! queued certificate job.
//!
//! The ledger is what makes at-least-once delivery safe: the broker may hand
//! the same job to two consumers, but only one can win `begin_processing`,
//! and the attempt counter here survives process restarts where the broker's
//! redelivery metadata does not.

mod memory;
mod postgres;

pub use memory::InMemoryProcessLedger;
pub use postgres::PostgresProcessLedger;

use async_trait::async_trait;
use thiserror::Error;

use certmill_core::{ProcessId, ProcessRecord, ProcessStatus};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("process {0} not found")]
    NotFound(ProcessId),
    #[error("ledger error in {operation}: {message}")]
    Database { operation: String, message: String },
}

impl LedgerError {
    pub(crate) fn database(operation: &str, message: impl ToString) -> Self {
        Self::Database {
            operation: operation.to_string(),
            message: message.to_string(),
        }
    }
}

/// Transactional operations over the process table, keyed by process id.
///
/// Each call is a single statement against the backing store; there is no
/// session state to leak between concurrent handlers.
#[async_trait]
pub trait ProcessLedger: Send + Sync {
    /// Insert a new `Pending` row carrying `payload`; returns the generated
    /// process id.
    async fn create(&self, payload: &serde_json::Value) -> Result<ProcessId, LedgerError>;

    /// Whether the row currently holds the `Processing` status.
    async fn is_processing(&self, id: ProcessId) -> Result<bool, LedgerError>;

    /// Whether the recorded attempts have reached `max`.
    async fn max_attempts_reached(&self, id: ProcessId, max: u32) -> Result<bool, LedgerError>;

    /// The stored payload, for re-hydration on redelivery.
    async fn payload(&self, id: ProcessId) -> Result<serde_json::Value, LedgerError>;

    /// Set `status` and `finished`. A non-empty `error` is recorded and
    /// increments the attempt counter; an empty `error` leaves both the
    /// stored error and the counter untouched.
    async fn update(
        &self,
        id: ProcessId,
        status: ProcessStatus,
        error: &str,
        finished: bool,
    ) -> Result<(), LedgerError>;

    /// Atomically claim the row for processing. Returns false when another
    /// worker already holds the `Processing` status (or the row is missing);
    /// this is the idempotency guard, a single conditional update rather
    /// than a check followed by a write.
    async fn begin_processing(&self, id: ProcessId) -> Result<bool, LedgerError>;

    /// Full row fetch for status views and tests.
    async fn find(&self, id: ProcessId) -> Result<ProcessRecord, LedgerError>;
}
