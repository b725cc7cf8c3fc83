//! Process-ledger domain model.
//!
//! A *process* is one logical unit of certificate work. Its durable record
//! carries the idempotency and retry-ceiling state the event-processing
//! engine relies on:
//!
//! - `status` gates concurrent execution (at most one `Processing` window
//!   per process at a time),
//! - `attempts` counts failed executions only and never decreases,
//! - `finished` marks terminal records; terminal records are kept, never
//!   deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::ProcessId;

/// Lifecycle status of a process.
///
/// Persisted as the integer codes of the pre-existing ledger table, so the
/// discriminants are part of the storage contract: `Processing = 1`,
/// `Pending = 2`, `Succeeded = 3`, `Failed = 4`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    /// A worker currently holds the execution window.
    Processing,
    /// Waiting for a (re)delivery; also the initial state.
    Pending,
    /// Terminal: generation completed.
    Succeeded,
    /// Terminal: retry budget exhausted.
    Failed,
}

impl ProcessStatus {
    /// Storage code for this status.
    pub fn as_code(&self) -> i32 {
        match self {
            Self::Processing => 1,
            Self::Pending => 2,
            Self::Succeeded => 3,
            Self::Failed => 4,
        }
    }

    /// Inverse of [`as_code`](Self::as_code).
    pub fn from_code(code: i32) -> Result<Self, DomainError> {
        match code {
            1 => Ok(Self::Processing),
            2 => Ok(Self::Pending),
            3 => Ok(Self::Succeeded),
            4 => Ok(Self::Failed),
            other => Err(DomainError::UnknownStatusCode(other)),
        }
    }

    /// Whether the process has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl core::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::Processing => "processing",
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One durable ledger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub id: ProcessId,
    pub status: ProcessStatus,
    /// Failed executions so far. Incremented only when a failure is recorded.
    pub attempts: i32,
    /// Message of the most recent recorded failure, empty if none.
    pub error: String,
    /// The business payload as enqueued, for re-hydration on redelivery.
    pub payload: serde_json::Value,
    pub finished: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessRecord {
    /// Whether `finished` agrees with `status` (terminal iff finished).
    pub fn is_consistent(&self) -> bool {
        self.finished == self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for status in [
            ProcessStatus::Processing,
            ProcessStatus::Pending,
            ProcessStatus::Succeeded,
            ProcessStatus::Failed,
        ] {
            assert_eq!(ProcessStatus::from_code(status.as_code()).unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_code_is_rejected() {
        assert_eq!(
            ProcessStatus::from_code(9),
            Err(DomainError::UnknownStatusCode(9))
        );
    }

    #[test]
    fn only_succeeded_and_failed_are_terminal() {
        assert!(!ProcessStatus::Processing.is_terminal());
        assert!(!ProcessStatus::Pending.is_terminal());
        assert!(ProcessStatus::Succeeded.is_terminal());
        assert!(ProcessStatus::Failed.is_terminal());
    }
}
