use std::sync::Arc;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use certmill_core::CertificatePayload;
use certmill_events::RabbitEventBus;
use certmill_infra::Settings;
use certmill_infra::certificates::PostgresCertificateStore;
use certmill_infra::generation::{CertificateGenerator, GenerationConfig};
use certmill_infra::ledger::PostgresProcessLedger;
use certmill_infra::render::{HttpQrEncoder, WkhtmltopdfConverter};
use certmill_infra::storage::{HttpObjectStore, ObjectStore};
use certmill_worker::CertificateEventHandler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    certmill_observability::init("certmill-worker");

    let settings = Settings::from_env();

    let pool = PgPool::connect(&settings.database_url).await?;
    let ledger = Arc::new(PostgresProcessLedger::new(pool.clone()));
    ledger.ensure_schema().await?;
    let certificates = Arc::new(PostgresCertificateStore::new(pool));
    certificates.ensure_schema().await?;

    let storage = Arc::new(HttpObjectStore::new(&settings.storage_base_url));
    storage.ensure_bucket(&settings.bucket).await?;

    let generator = Arc::new(CertificateGenerator::new(
        storage,
        certificates,
        Arc::new(HttpQrEncoder::new(&settings.qr_base_url)),
        Arc::new(WkhtmltopdfConverter::new(&settings.wkhtmltopdf_bin)),
        GenerationConfig::from_settings(&settings),
    ));
    let handler = Arc::new(CertificateEventHandler::new(
        ledger,
        generator,
        settings.max_attempts,
    ));

    let bus = RabbitEventBus::new(&settings.amqp_uri, &settings.event_scope);
    bus.connect().await?;

    let shutdown = CancellationToken::new();
    let consumer = bus
        .subscribe::<CertificatePayload, CertificateEventHandler>(
            handler,
            shutdown.clone(),
            settings.max_attempts,
            settings.max_concurrent,
        )
        .await?;

    tracing::info!("worker running, ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested, draining consumer");
    shutdown.cancel();
    let _ = consumer.await;
    bus.close().await;

    Ok(())
}
