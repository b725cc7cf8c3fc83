//! Persistence for issued certificates, keyed by registration.

mod memory;
mod postgres;

pub use memory::InMemoryCertificateStore;
pub use postgres::PostgresCertificateStore;

use async_trait::async_trait;
use thiserror::Error;

use certmill_core::Certificate;

#[derive(Debug, Error)]
pub enum CertificateStoreError {
    #[error("certificate store error in {operation}: {message}")]
    Database { operation: String, message: String },
}

impl CertificateStoreError {
    pub(crate) fn database(operation: &str, message: impl ToString) -> Self {
        Self::Database {
            operation: operation.to_string(),
            message: message.to_string(),
        }
    }
}

/// Store for issued certificates.
///
/// `save` upserts on registration: re-issuing a certificate replaces the
/// previous artifacts rather than duplicating the row.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    async fn save(&self, certificate: &Certificate) -> Result<(), CertificateStoreError>;

    async fn find_by_registration(
        &self,
        registration: &str,
    ) -> Result<Option<Certificate>, CertificateStoreError>;
}
