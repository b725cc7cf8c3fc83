use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use certmill_core::Certificate;

use super::{CertificateStore, CertificateStoreError};

/// Registration-keyed in-memory certificate store for tests.
#[derive(Debug, Default)]
pub struct InMemoryCertificateStore {
    records: RwLock<HashMap<String, Certificate>>,
}

impl InMemoryCertificateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CertificateStore for InMemoryCertificateStore {
    async fn save(&self, certificate: &Certificate) -> Result<(), CertificateStoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| CertificateStoreError::database("save", "lock poisoned"))?;
        records.insert(certificate.registration.clone(), certificate.clone());
        Ok(())
    }

    async fn find_by_registration(
        &self,
        registration: &str,
    ) -> Result<Option<Certificate>, CertificateStoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| CertificateStoreError::database("find_by_registration", "lock poisoned"))?;
        Ok(records.get(registration).cloned())
    }
}
