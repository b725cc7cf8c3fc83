use std::sync::Arc;

use axum::Router;
use chrono::Utc;
use reqwest::StatusCode;
use serde_json::json;

use certmill_api::app::{AppState, build_app};
use certmill_core::{Certificate, CertificatePayload, ProcessId, ProcessStatus};
use certmill_events::{BusError, EventEnvelope, EventPublisher, InMemoryEventBus};
use certmill_infra::certificates::{CertificateStore, InMemoryCertificateStore};
use certmill_infra::ledger::{InMemoryProcessLedger, ProcessLedger};
use certmill_infra::storage::{InMemoryObjectStore, ObjectStore};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(app: Router) -> Self {
        // Same router as prod, bound to an ephemeral port.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Harness {
    server: TestServer,
    ledger: Arc<InMemoryProcessLedger>,
    certificates: Arc<InMemoryCertificateStore>,
    storage: Arc<InMemoryObjectStore>,
    bus: Arc<InMemoryEventBus<CertificatePayload>>,
}

impl Harness {
    async fn spawn() -> Self {
        let ledger = Arc::new(InMemoryProcessLedger::new());
        let certificates = Arc::new(InMemoryCertificateStore::new());
        let storage = Arc::new(InMemoryObjectStore::new());
        let bus = Arc::new(InMemoryEventBus::new());

        let state = AppState {
            ledger: ledger.clone(),
            certificates: certificates.clone(),
            storage: storage.clone(),
            publisher: bus.clone(),
            bucket: "certs".to_string(),
            link_ttl_secs: 60,
        };
        let server = TestServer::spawn(build_app(state)).await;

        Self {
            server,
            ledger,
            certificates,
            storage,
            bus,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server.base_url, path)
    }
}

fn valid_body() -> serde_json::Value {
    json!({
        "registration": "4655",
        "student_name": "maria clara da silva",
        "student_born_date": "2001-03-14",
        "document_type": "CPF",
        "document_number": "123.456.789-00",
        "course_name": "data engineering",
        "course_subjects": { "Databases": 60, "Distributed Systems": 80 },
        "utilization_percentage": 87.5,
        "conclusion_date": "2024-11-30"
    })
}

#[tokio::test]
async fn health_is_public() {
    let harness = Harness::spawn().await;

    let res = reqwest::get(harness.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn enqueueing_records_the_job_before_publishing() {
    let harness = Harness::spawn().await;

    let client = reqwest::Client::new();
    let res = client
        .post(harness.url("/certificates"))
        .json(&valid_body())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: serde_json::Value = res.json().await.unwrap();
    let id = body["process_id"].as_i64().unwrap();

    let record = harness.ledger.find(ProcessId::from_i64(id)).await.unwrap();
    assert_eq!(record.status, ProcessStatus::Pending);
    assert_eq!(record.attempts, 0);
    assert_eq!(record.payload["registration"], "4655");

    let published = harness.bus.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].payload().process_id.as_i64(), id);
    assert_eq!(published[0].retry_count(), 0);
}

#[tokio::test]
async fn invalid_payloads_are_rejected_without_side_effects() {
    let harness = Harness::spawn().await;

    let mut body = valid_body();
    body["registration"] = json!("   ");

    let client = reqwest::Client::new();
    let res = client
        .post(harness.url("/certificates"))
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");

    assert!(harness.bus.published().is_empty());
    assert!(harness.ledger.find(ProcessId::from_i64(1)).await.is_err());
}

#[tokio::test]
async fn process_status_is_exposed() {
    let harness = Harness::spawn().await;

    let client = reqwest::Client::new();
    let res = client
        .post(harness.url("/certificates"))
        .json(&valid_body())
        .send()
        .await
        .unwrap();
    let created: serde_json::Value = res.json().await.unwrap();
    let id = created["process_id"].as_i64().unwrap();

    let res = client
        .get(harness.url(&format!("/processes/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let status: serde_json::Value = res.json().await.unwrap();
    assert_eq!(status["process_id"], id);
    assert_eq!(status["status"], "pending");
    assert_eq!(status["attempts"], 0);
    assert_eq!(status["finished"], false);
    assert_eq!(status["error"], "");

    let res = client
        .get(harness.url("/processes/999"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(harness.url("/processes/forty-two"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn artifact_routes_redirect_to_presigned_links() {
    let harness = Harness::spawn().await;

    let certificate = Certificate {
        sign: "a".repeat(64),
        registration: "4655".to_string(),
        student_name: "Maria Clara Da Silva".to_string(),
        course_name: "Data Engineering".to_string(),
        workload_hours: 140,
        utilization_percentage: 87.5,
        pdf_object: "pdf/abc.pdf".to_string(),
        png_object: "qr/abc.png".to_string(),
        issued_at: Utc::now(),
    };
    harness.certificates.save(&certificate).await.unwrap();
    harness
        .storage
        .upload("certs", "pdf/abc.pdf", b"%PDF".to_vec(), "application/pdf")
        .await
        .unwrap();
    harness
        .storage
        .upload("certs", "qr/abc.png", b"png".to_vec(), "image/png")
        .await
        .unwrap();

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    let res = client
        .get(harness.url("/certificates/4655/pdf"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        res.headers().get("location").unwrap(),
        "memory://certs/pdf/abc.pdf?expires=60"
    );

    let res = client
        .get(harness.url("/certificates/4655/png"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        res.headers().get("location").unwrap(),
        "memory://certs/qr/abc.png?expires=60"
    );

    let res = client
        .get(harness.url("/certificates/unknown/pdf"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

struct FailingPublisher;

#[async_trait::async_trait]
impl EventPublisher<CertificatePayload> for FailingPublisher {
    async fn publish(
        &self,
        _envelope: &EventEnvelope<CertificatePayload>,
    ) -> Result<(), BusError> {
        Err(BusError::NotConnected)
    }
}

#[tokio::test]
async fn publish_failures_do_not_lose_the_job() {
    let ledger = Arc::new(InMemoryProcessLedger::new());
    let state = AppState {
        ledger: ledger.clone(),
        certificates: Arc::new(InMemoryCertificateStore::new()),
        storage: Arc::new(InMemoryObjectStore::new()),
        publisher: Arc::new(FailingPublisher),
        bucket: "certs".to_string(),
        link_ttl_secs: 60,
    };
    let server = TestServer::spawn(build_app(state)).await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/certificates", server.base_url))
        .json(&valid_body())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    // The row survives, so the job can be resubmitted or replayed.
    let record = ledger.find(ProcessId::from_i64(1)).await.unwrap();
    assert_eq!(record.status, ProcessStatus::Pending);
}
