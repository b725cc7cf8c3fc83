//! In-memory process ledger with the same semantics as the Postgres one.
//!
//! Intended for tests. The write lock gives `begin_processing` the same
//! atomicity the conditional `UPDATE` gives the Postgres implementation.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use certmill_core::{ProcessId, ProcessRecord, ProcessStatus};

use super::{LedgerError, ProcessLedger};

#[derive(Debug, Default)]
pub struct InMemoryProcessLedger {
    records: RwLock<HashMap<i64, ProcessRecord>>,
    next_id: AtomicI64,
}

impl InMemoryProcessLedger {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Insert a `Pending` row under a caller-chosen id.
    ///
    /// The Postgres ledger always generates ids; tests that need a known id
    /// seed it here.
    pub fn seed(&self, id: ProcessId, payload: serde_json::Value) {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        records.insert(id.as_i64(), fresh_record(id, payload));
        // Keep generated ids clear of seeded ones.
        self.next_id.fetch_max(id.as_i64() + 1, Ordering::SeqCst);
    }

    fn with_record<T>(
        &self,
        operation: &str,
        id: ProcessId,
        f: impl FnOnce(&mut ProcessRecord) -> T,
    ) -> Result<T, LedgerError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| LedgerError::database(operation, "lock poisoned"))?;
        let record = records
            .get_mut(&id.as_i64())
            .ok_or(LedgerError::NotFound(id))?;
        Ok(f(record))
    }
}

fn fresh_record(id: ProcessId, payload: serde_json::Value) -> ProcessRecord {
    let now = Utc::now();
    ProcessRecord {
        id,
        status: ProcessStatus::Pending,
        attempts: 0,
        error: String::new(),
        payload,
        finished: false,
        active: true,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl ProcessLedger for InMemoryProcessLedger {
    async fn create(&self, payload: &serde_json::Value) -> Result<ProcessId, LedgerError> {
        let id = ProcessId::from_i64(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut records = self
            .records
            .write()
            .map_err(|_| LedgerError::database("create", "lock poisoned"))?;
        records.insert(id.as_i64(), fresh_record(id, payload.clone()));
        Ok(id)
    }

    async fn is_processing(&self, id: ProcessId) -> Result<bool, LedgerError> {
        self.with_record("is_processing", id, |record| {
            record.status == ProcessStatus::Processing
        })
    }

    async fn max_attempts_reached(&self, id: ProcessId, max: u32) -> Result<bool, LedgerError> {
        self.with_record("max_attempts_reached", id, |record| {
            record.attempts >= max as i32
        })
    }

    async fn payload(&self, id: ProcessId) -> Result<serde_json::Value, LedgerError> {
        self.with_record("payload", id, |record| record.payload.clone())
    }

    async fn update(
        &self,
        id: ProcessId,
        status: ProcessStatus,
        error: &str,
        finished: bool,
    ) -> Result<(), LedgerError> {
        self.with_record("update", id, |record| {
            record.status = status;
            if !error.is_empty() {
                record.error = error.to_string();
                record.attempts += 1;
            }
            record.finished = finished;
            record.updated_at = Utc::now();
        })
    }

    async fn begin_processing(&self, id: ProcessId) -> Result<bool, LedgerError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| LedgerError::database("begin_processing", "lock poisoned"))?;
        let Some(record) = records.get_mut(&id.as_i64()) else {
            return Ok(false);
        };
        if record.status == ProcessStatus::Processing {
            return Ok(false);
        }
        record.status = ProcessStatus::Processing;
        record.updated_at = Utc::now();
        Ok(true)
    }

    async fn find(&self, id: ProcessId) -> Result<ProcessRecord, LedgerError> {
        self.with_record("find", id, |record| record.clone())
    }
}
