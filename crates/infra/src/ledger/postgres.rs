//! Postgres-backed process ledger.
//!
//! The table keeps the legacy column spellings (`proccess_event`, `attemps`)
//! so the same database can be shared with the deployment this system
//! replaces. All queries are parameterized; the idempotency guard is a
//! conditional `UPDATE` so two workers racing for one row resolve inside the
//! database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use certmill_core::{ProcessId, ProcessRecord, ProcessStatus};

use super::{LedgerError, ProcessLedger};

#[derive(Debug, Clone)]
pub struct PostgresProcessLedger {
    pool: PgPool,
}

impl PostgresProcessLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the ledger table when it does not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS proccess_event (
                code_proccess_event BIGSERIAL PRIMARY KEY,
                code_status INT NOT NULL,
                attemps INT NOT NULL DEFAULT 0,
                error TEXT NOT NULL DEFAULT '',
                json JSONB NOT NULL,
                finished BOOLEAN NOT NULL DEFAULT FALSE,
                active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl ProcessLedger for PostgresProcessLedger {
    #[instrument(skip(self, payload), err)]
    async fn create(&self, payload: &serde_json::Value) -> Result<ProcessId, LedgerError> {
        let row = sqlx::query(
            r#"
            INSERT INTO proccess_event (code_status, attemps, error, json, finished, active)
            VALUES ($1, 0, '', $2, FALSE, TRUE)
            RETURNING code_proccess_event
            "#,
        )
        .bind(ProcessStatus::Pending.as_code())
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create", e))?;

        let id: i64 = row
            .try_get("code_proccess_event")
            .map_err(|e| map_sqlx_error("create", e))?;
        Ok(ProcessId::from_i64(id))
    }

    #[instrument(skip(self), fields(process_id = %id), err)]
    async fn is_processing(&self, id: ProcessId) -> Result<bool, LedgerError> {
        let row = sqlx::query(
            "SELECT code_status FROM proccess_event WHERE code_proccess_event = $1",
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("is_processing", e))?
        .ok_or(LedgerError::NotFound(id))?;

        let code: i32 = row
            .try_get("code_status")
            .map_err(|e| map_sqlx_error("is_processing", e))?;
        Ok(code == ProcessStatus::Processing.as_code())
    }

    #[instrument(skip(self), fields(process_id = %id), err)]
    async fn max_attempts_reached(&self, id: ProcessId, max: u32) -> Result<bool, LedgerError> {
        let row = sqlx::query("SELECT attemps FROM proccess_event WHERE code_proccess_event = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("max_attempts_reached", e))?
            .ok_or(LedgerError::NotFound(id))?;

        let attempts: i32 = row
            .try_get("attemps")
            .map_err(|e| map_sqlx_error("max_attempts_reached", e))?;
        Ok(attempts >= max as i32)
    }

    #[instrument(skip(self), fields(process_id = %id), err)]
    async fn payload(&self, id: ProcessId) -> Result<serde_json::Value, LedgerError> {
        let row = sqlx::query("SELECT json FROM proccess_event WHERE code_proccess_event = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("payload", e))?
            .ok_or(LedgerError::NotFound(id))?;

        row.try_get("json").map_err(|e| map_sqlx_error("payload", e))
    }

    #[instrument(skip(self), fields(process_id = %id, status = %status), err)]
    async fn update(
        &self,
        id: ProcessId,
        status: ProcessStatus,
        error: &str,
        finished: bool,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE proccess_event
            SET code_status = $2,
                error = CASE WHEN $3::text <> '' THEN $3 ELSE error END,
                attemps = CASE WHEN $3::text <> '' THEN attemps + 1 ELSE attemps END,
                finished = $4,
                updated_at = NOW()
            WHERE code_proccess_event = $1
            "#,
        )
        .bind(id.as_i64())
        .bind(status.as_code())
        .bind(error)
        .bind(finished)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(id));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(process_id = %id), err)]
    async fn begin_processing(&self, id: ProcessId) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE proccess_event
            SET code_status = $2, updated_at = NOW()
            WHERE code_proccess_event = $1 AND code_status <> $2
            "#,
        )
        .bind(id.as_i64())
        .bind(ProcessStatus::Processing.as_code())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("begin_processing", e))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(process_id = %id), err)]
    async fn find(&self, id: ProcessId) -> Result<ProcessRecord, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT code_proccess_event, code_status, attemps, error, json,
                   finished, active, created_at, updated_at
            FROM proccess_event
            WHERE code_proccess_event = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find", e))?
        .ok_or(LedgerError::NotFound(id))?;

        let record = ProcessRow::from_row(&row).map_err(|e| map_sqlx_error("find", e))?;
        record.try_into()
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(db_err) => LedgerError::database(operation, db_err.message()),
        sqlx::Error::PoolClosed => LedgerError::database(operation, "connection pool closed"),
        other => LedgerError::database(operation, other),
    }
}

#[derive(Debug)]
struct ProcessRow {
    code_proccess_event: i64,
    code_status: i32,
    attemps: i32,
    error: String,
    json: serde_json::Value,
    finished: bool,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ProcessRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProcessRow {
            code_proccess_event: row.try_get("code_proccess_event")?,
            code_status: row.try_get("code_status")?,
            attemps: row.try_get("attemps")?,
            error: row.try_get("error")?,
            json: row.try_get("json")?,
            finished: row.try_get("finished")?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<ProcessRow> for ProcessRecord {
    type Error = LedgerError;

    fn try_from(row: ProcessRow) -> Result<Self, LedgerError> {
        let status = ProcessStatus::from_code(row.code_status)
            .map_err(|e| LedgerError::database("find", e))?;
        Ok(ProcessRecord {
            id: ProcessId::from_i64(row.code_proccess_event),
            status,
            attempts: row.attemps,
            error: row.error,
            payload: row.json,
            finished: row.finished,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
