use std::sync::Arc;

use sqlx::PgPool;

use certmill_api::app::{AppState, build_app};
use certmill_events::RabbitEventBus;
use certmill_infra::Settings;
use certmill_infra::certificates::PostgresCertificateStore;
use certmill_infra::ledger::PostgresProcessLedger;
use certmill_infra::storage::{HttpObjectStore, ObjectStore};

#[tokio::main]
async fn main() {
    certmill_observability::init("certmill-api");

    let settings = Settings::from_env();

    let pool = PgPool::connect(&settings.database_url)
        .await
        .expect("failed to connect to Postgres");
    let ledger = Arc::new(PostgresProcessLedger::new(pool.clone()));
    ledger
        .ensure_schema()
        .await
        .expect("failed to create ledger schema");
    let certificates = Arc::new(PostgresCertificateStore::new(pool));
    certificates
        .ensure_schema()
        .await
        .expect("failed to create certificate schema");

    let bus = Arc::new(RabbitEventBus::new(
        settings.amqp_uri.clone(),
        settings.event_scope.clone(),
    ));
    if let Err(err) = bus.connect().await {
        // Publishes reconnect on demand, so a broker that is still booting
        // does not keep the API down.
        tracing::warn!(error = %err, "broker unreachable at startup");
    }

    let storage = Arc::new(HttpObjectStore::new(&settings.storage_base_url));
    storage
        .ensure_bucket(&settings.bucket)
        .await
        .expect("failed to ensure storage bucket");

    let state = AppState {
        ledger,
        certificates,
        storage,
        publisher: bus,
        bucket: settings.bucket.clone(),
        link_ttl_secs: settings.link_ttl_secs,
    };
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&settings.api_bind)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {e}", settings.api_bind));
    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
