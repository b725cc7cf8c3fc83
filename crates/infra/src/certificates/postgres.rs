use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use certmill_core::Certificate;

use super::{CertificateStore, CertificateStoreError};

#[derive(Debug, Clone)]
pub struct PostgresCertificateStore {
    pool: PgPool,
}

impl PostgresCertificateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), CertificateStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS certificate (
                sign TEXT PRIMARY KEY,
                registration TEXT NOT NULL UNIQUE,
                student_name TEXT NOT NULL,
                course_name TEXT NOT NULL,
                workload_hours INT NOT NULL,
                utilization_percentage DOUBLE PRECISION NOT NULL,
                pdf_object TEXT NOT NULL,
                png_object TEXT NOT NULL,
                issued_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
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
impl CertificateStore for PostgresCertificateStore {
    #[instrument(skip(self, certificate), fields(registration = %certificate.registration), err)]
    async fn save(&self, certificate: &Certificate) -> Result<(), CertificateStoreError> {
        sqlx::query(
            r#"
            INSERT INTO certificate (
                sign, registration, student_name, course_name, workload_hours,
                utilization_percentage, pdf_object, png_object, issued_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (registration)
            DO UPDATE SET
                sign = EXCLUDED.sign,
                student_name = EXCLUDED.student_name,
                course_name = EXCLUDED.course_name,
                workload_hours = EXCLUDED.workload_hours,
                utilization_percentage = EXCLUDED.utilization_percentage,
                pdf_object = EXCLUDED.pdf_object,
                png_object = EXCLUDED.png_object,
                issued_at = EXCLUDED.issued_at
            "#,
        )
        .bind(&certificate.sign)
        .bind(&certificate.registration)
        .bind(&certificate.student_name)
        .bind(&certificate.course_name)
        .bind(certificate.workload_hours as i32)
        .bind(certificate.utilization_percentage)
        .bind(&certificate.pdf_object)
        .bind(&certificate.png_object)
        .bind(certificate.issued_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("save", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn find_by_registration(
        &self,
        registration: &str,
    ) -> Result<Option<Certificate>, CertificateStoreError> {
        let row = sqlx::query(
            r#"
            SELECT sign, registration, student_name, course_name, workload_hours,
                   utilization_percentage, pdf_object, png_object, issued_at
            FROM certificate
            WHERE registration = $1
            "#,
        )
        .bind(registration)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_registration", e))?;

        match row {
            Some(row) => {
                let record = CertificateRow::from_row(&row)
                    .map_err(|e| map_sqlx_error("find_by_registration", e))?;
                Ok(Some(record.into()))
            }
            None => Ok(None),
        }
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> CertificateStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            CertificateStoreError::database(operation, db_err.message())
        }
        sqlx::Error::PoolClosed => {
            CertificateStoreError::database(operation, "connection pool closed")
        }
        other => CertificateStoreError::database(operation, other),
    }
}

#[derive(Debug)]
struct CertificateRow {
    sign: String,
    registration: String,
    student_name: String,
    course_name: String,
    workload_hours: i32,
    utilization_percentage: f64,
    pdf_object: String,
    png_object: String,
    issued_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for CertificateRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(CertificateRow {
            sign: row.try_get("sign")?,
            registration: row.try_get("registration")?,
            student_name: row.try_get("student_name")?,
            course_name: row.try_get("course_name")?,
            workload_hours: row.try_get("workload_hours")?,
            utilization_percentage: row.try_get("utilization_percentage")?,
            pdf_object: row.try_get("pdf_object")?,
            png_object: row.try_get("png_object")?,
            issued_at: row.try_get("issued_at")?,
        })
    }
}

impl From<CertificateRow> for Certificate {
    fn from(row: CertificateRow) -> Self {
        Certificate {
            sign: row.sign,
            registration: row.registration,
            student_name: row.student_name,
            course_name: row.course_name,
            workload_hours: row.workload_hours as u32,
            utilization_percentage: row.utilization_percentage,
            pdf_object: row.pdf_object,
            png_object: row.png_object,
            issued_at: row.issued_at,
        }
    }
}
