use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::{collections::BTreeMap, sync::Arc};
use tower::ServiceBuilder;

use certmill_core::{Certificate, CertificatePayload, ProcessId};
use certmill_events::{EventEnvelope, EventPublisher};
use certmill_infra::certificates::CertificateStore;
use certmill_infra::ledger::{LedgerError, ProcessLedger};
use certmill_infra::storage::{ObjectStore, StorageError};

/// Shared handles behind every route.
///
/// Everything is trait-object based so the black-box tests can run the same
/// router against in-memory implementations.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn ProcessLedger>,
    pub certificates: Arc<dyn CertificateStore>,
    pub storage: Arc<dyn ObjectStore>,
    pub publisher: Arc<dyn EventPublisher<CertificatePayload>>,
    pub bucket: String,
    pub link_ttl_secs: u64,
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/certificates", post(create_certificate))
        .route("/certificates/:registration/pdf", get(get_certificate_pdf))
        .route("/certificates/:registration/png", get(get_certificate_png))
        .route("/processes/:id", get(get_process))
        .layer(Extension(Arc::new(state)))
        .layer(ServiceBuilder::new())
}

async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct CreateCertificateRequest {
    registration: String,
    student_name: String,
    student_born_date: NaiveDate,
    document_type: String,
    document_number: String,
    course_name: String,
    course_subjects: BTreeMap<String, u32>,
    utilization_percentage: f64,
    conclusion_date: NaiveDate,
}

impl CreateCertificateRequest {
    fn into_payload(self, process_id: ProcessId) -> CertificatePayload {
        CertificatePayload {
            process_id,
            registration: self.registration,
            student_name: self.student_name,
            student_born_date: self.student_born_date,
            document_type: self.document_type,
            document_number: self.document_number,
            course_name: self.course_name,
            course_subjects: self.course_subjects,
            utilization_percentage: self.utilization_percentage,
            conclusion_date: self.conclusion_date,
        }
    }
}

/// Record the job durably, then publish the event carrying its id.
///
/// A publish failure after the insert leaves a `Pending` row behind; the
/// client sees the error and may simply resubmit.
async fn create_certificate(
    Extension(state): Extension<Arc<AppState>>,
    Json(body): Json<CreateCertificateRequest>,
) -> axum::response::Response {
    // The real id is assigned by the ledger below.
    let payload = body.into_payload(ProcessId::from_i64(0));
    if let Err(e) = payload.validate() {
        return json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string());
    }

    let stored = match serde_json::to_value(&payload) {
        Ok(v) => v,
        Err(e) => {
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "serialize_error",
                e.to_string(),
            );
        }
    };
    let id = match state.ledger.create(&stored).await {
        Ok(id) => id,
        Err(e) => return json_error(StatusCode::INTERNAL_SERVER_ERROR, "ledger_error", e.to_string()),
    };

    let payload = CertificatePayload {
        process_id: id,
        ..payload
    };
    let envelope = EventEnvelope::new(payload);
    if let Err(e) = state.publisher.publish(&envelope).await {
        tracing::error!(error = %e, process_id = %id, "event publish failed");
        return json_error(StatusCode::BAD_GATEWAY, "publish_error", e.to_string());
    }

    tracing::info!(process_id = %id, "certificate job enqueued");
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "process_id": id.as_i64() })),
    )
        .into_response()
}

async fn get_process(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ProcessId = match id.parse() {
        Ok(v) => v,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid process id"),
    };

    match state.ledger.find(id).await {
        Ok(record) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "process_id": record.id.as_i64(),
                "status": record.status.to_string(),
                "attempts": record.attempts,
                "finished": record.finished,
                "error": record.error,
            })),
        )
            .into_response(),
        Err(LedgerError::NotFound(_)) => {
            json_error(StatusCode::NOT_FOUND, "not_found", "process not found")
        }
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "ledger_error", e.to_string()),
    }
}

async fn get_certificate_pdf(
    Extension(state): Extension<Arc<AppState>>,
    Path(registration): Path<String>,
) -> axum::response::Response {
    artifact_redirect(&state, &registration, |c| &c.pdf_object).await
}

async fn get_certificate_png(
    Extension(state): Extension<Arc<AppState>>,
    Path(registration): Path<String>,
) -> axum::response::Response {
    artifact_redirect(&state, &registration, |c| &c.png_object).await
}

/// Look the certificate up by registration and redirect to a fresh
/// presigned link for the chosen artifact.
async fn artifact_redirect(
    state: &AppState,
    registration: &str,
    object_of: fn(&Certificate) -> &str,
) -> axum::response::Response {
    let certificate = match state.certificates.find_by_registration(registration).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            return json_error(StatusCode::NOT_FOUND, "not_found", "certificate not found");
        }
        Err(e) => return json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string()),
    };

    match state
        .storage
        .presigned_link(&state.bucket, object_of(&certificate), state.link_ttl_secs)
        .await
    {
        Ok(link) => Redirect::temporary(&link).into_response(),
        Err(StorageError::NotFound { .. }) => {
            json_error(StatusCode::NOT_FOUND, "not_found", "artifact not found")
        }
        Err(e) => json_error(StatusCode::BAD_GATEWAY, "storage_error", e.to_string()),
    }
}

fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        Json(serde_json::json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
