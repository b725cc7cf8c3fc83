//! The certificate event handler: one delivery, one guarded generation run.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use certmill_core::{CertificatePayload, ProcessId, ProcessStatus};
use certmill_events::{EventHandler, HandlerContext, HandlerError};
use certmill_infra::generation::CertificateGenerator;
use certmill_infra::ledger::ProcessLedger;

/// Processes certificate events end to end.
///
/// Every delivery re-hydrates the payload from the ledger, so what gets
/// generated is always the enqueued record, not whatever happened to travel
/// on the wire. The `begin_processing` claim makes duplicate deliveries
/// harmless: losers back off with [`HandlerError::AlreadyInProcess`] and the
/// retry path tries again later. A missing ledger row looks like a lost
/// claim and follows the same path.
pub struct CertificateEventHandler {
    ledger: Arc<dyn ProcessLedger>,
    generator: Arc<CertificateGenerator>,
    max_attempts: u32,
}

impl CertificateEventHandler {
    /// `max_attempts` is the same ceiling the dispatcher retries against;
    /// reaching it here marks the ledger row terminally `Failed`.
    pub fn new(
        ledger: Arc<dyn ProcessLedger>,
        generator: Arc<CertificateGenerator>,
        max_attempts: u32,
    ) -> Self {
        Self {
            ledger,
            generator,
            max_attempts,
        }
    }

    async fn execute(&self, id: ProcessId) -> anyhow::Result<()> {
        let stored = self.ledger.payload(id).await?;
        let mut payload: CertificatePayload = serde_json::from_value(stored)?;
        // The id that routed this delivery is authoritative; the stored copy
        // was serialized before the ledger assigned it.
        payload.process_id = id;

        let certificate = self.generator.generate(&payload).await?;
        info!(process_id = %id, sign = %certificate.sign, "certificate issued");
        Ok(())
    }

    /// Record one failed execution; close the row out once the budget is
    /// spent. The terminal update carries an empty error so the recorded
    /// failure and the attempt count stay as they were.
    async fn record_failure(&self, id: ProcessId, message: &str) -> Result<(), HandlerError> {
        self.ledger
            .update(id, ProcessStatus::Pending, message, false)
            .await
            .map_err(HandlerError::failed)?;

        if self
            .ledger
            .max_attempts_reached(id, self.max_attempts)
            .await
            .map_err(HandlerError::failed)?
        {
            warn!(process_id = %id, max_attempts = self.max_attempts, "attempt budget spent, failing the process");
            self.ledger
                .update(id, ProcessStatus::Failed, "", true)
                .await
                .map_err(HandlerError::failed)?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler<CertificatePayload> for CertificateEventHandler {
    const NAME: &'static str = "CertificateEventHandler";

    #[instrument(
        skip_all,
        fields(process_id = %event.process_id, retry = ctx.retry_count),
        err
    )]
    async fn handle(
        &self,
        ctx: &HandlerContext,
        event: CertificatePayload,
    ) -> Result<(), HandlerError> {
        let id = event.process_id;

        let claimed = self
            .ledger
            .begin_processing(id)
            .await
            .map_err(HandlerError::failed)?;
        if !claimed {
            return Err(HandlerError::AlreadyInProcess(id));
        }

        match self.execute(id).await {
            Ok(()) => {
                self.ledger
                    .update(id, ProcessStatus::Succeeded, "", true)
                    .await
                    .map_err(HandlerError::failed)?;
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                self.record_failure(id, &message).await?;
                Err(HandlerError::Failed(message))
            }
        }
    }
}
