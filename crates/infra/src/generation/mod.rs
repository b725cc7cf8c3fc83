//! Certificate generation: QR render, template fill, PDF conversion and
//! artifact persistence.

pub mod format;

use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use certmill_core::{Certificate, CertificatePayload, DomainError, ProcessId};

use crate::certificates::{CertificateStore, CertificateStoreError};
use crate::config::Settings;
use crate::render::{PdfConverter, PdfOptions, QrEncoder, RenderError, render_template};
use crate::storage::{ObjectStore, StorageError};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Store(#[from] CertificateStoreError),
    #[error("template {0} is not valid utf-8")]
    TemplateEncoding(String),
}

/// Bucket layout and rendering knobs for the pipeline.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub bucket: String,
    pub qr_path: String,
    pub pdf_path: String,
    pub template_key: String,
    pub logo_key: String,
    pub stamp_key: String,
    pub link_ttl_secs: u64,
    pub qr_size: u32,
    pub pdf_options: PdfOptions,
}

impl GenerationConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            bucket: settings.bucket.clone(),
            qr_path: settings.qr_path.clone(),
            pdf_path: settings.pdf_path.clone(),
            template_key: settings.template_key.clone(),
            logo_key: settings.logo_key.clone(),
            stamp_key: settings.stamp_key.clone(),
            link_ttl_secs: settings.link_ttl_secs,
            qr_size: 256,
            pdf_options: PdfOptions::default(),
        }
    }
}

/// Orchestrates one certificate end to end.
///
/// Owns the renderer traits and the storage handles; every step failure
/// propagates to the caller, which decides between retry and dead-letter.
pub struct CertificateGenerator {
    storage: Arc<dyn ObjectStore>,
    certificates: Arc<dyn CertificateStore>,
    qr: Arc<dyn QrEncoder>,
    pdf: Arc<dyn PdfConverter>,
    config: GenerationConfig,
}

impl CertificateGenerator {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        certificates: Arc<dyn CertificateStore>,
        qr: Arc<dyn QrEncoder>,
        pdf: Arc<dyn PdfConverter>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            storage,
            certificates,
            qr,
            pdf,
            config,
        }
    }

    /// Produce, upload and persist the certificate for `payload`.
    #[instrument(
        skip(self, payload),
        fields(process_id = %payload.process_id, registration = %payload.registration),
        err
    )]
    pub async fn generate(
        &self,
        payload: &CertificatePayload,
    ) -> Result<Certificate, GenerationError> {
        payload.validate()?;

        let sign = sign_for(payload.process_id);
        let png_object = format!("{}/{}.png", self.config.qr_path, sign);
        let pdf_object = format!("{}/{}.pdf", self.config.pdf_path, sign);

        // The QR encodes the sign: scanning it is how a printed certificate
        // is verified against the stored artifacts.
        let qr_png = self.qr.encode(&sign, self.config.qr_size).await?;
        self.storage
            .upload(&self.config.bucket, &png_object, qr_png, "image/png")
            .await?;

        let template_bytes = self
            .storage
            .download(&self.config.bucket, &self.config.template_key)
            .await?;
        let template = String::from_utf8(template_bytes)
            .map_err(|_| GenerationError::TemplateEncoding(self.config.template_key.clone()))?;

        // The template embeds its images by URL, so the links must exist
        // before conversion.
        let logo_link = self.link(&self.config.logo_key).await?;
        let stamp_link = self.link(&self.config.stamp_key).await?;
        let qr_link = self.link(&png_object).await?;

        let values = template_values(payload, &logo_link, &stamp_link, &qr_link);
        let html = render_template(&template, &values);

        let pdf = self.pdf.convert(&html, &self.config.pdf_options).await?;
        self.storage
            .upload(&self.config.bucket, &pdf_object, pdf, "application/pdf")
            .await?;
        let pdf_link = self.link(&pdf_object).await?;
        info!(%sign, pdf_link, "certificate artifacts stored");

        let certificate = Certificate {
            sign,
            registration: payload.registration.clone(),
            student_name: payload.student_name.clone(),
            course_name: payload.course_name.clone(),
            workload_hours: payload.workload_hours(),
            utilization_percentage: payload.utilization_percentage,
            pdf_object,
            png_object,
            issued_at: Utc::now(),
        };
        self.certificates.save(&certificate).await?;
        Ok(certificate)
    }

    async fn link(&self, key: &str) -> Result<String, StorageError> {
        self.storage
            .presigned_link(&self.config.bucket, key, self.config.link_ttl_secs)
            .await
    }
}

/// The artifact identifier: SHA-256 over the process id and a fresh UUID,
/// as lowercase hex. Unique per generation run even for the same process.
fn sign_for(process_id: ProcessId) -> String {
    let salt = Uuid::now_v7();
    let digest = Sha256::digest(format!("{process_id}{salt}").as_bytes());
    format!("{digest:x}")
}

fn template_values(
    payload: &CertificatePayload,
    logo_link: &str,
    stamp_link: &str,
    qr_link: &str,
) -> Vec<(&'static str, String)> {
    vec![
        ("STUDENTNAME", format::title_case(&payload.student_name)),
        (
            "STUDENTDOCUMENT",
            format::document_line(&payload.document_type, &payload.document_number),
        ),
        (
            "STUDENTREGISTRATION",
            format::registration_mask(&payload.registration),
        ),
        ("COURSENAME", format::title_case(&payload.course_name)),
        (
            "COURSEWORKLOAD",
            format::workload_label(payload.workload_hours()),
        ),
        (
            "COURSEUTILIZATION",
            format::utilization_label(payload.utilization_percentage),
        ),
        (
            "COURSECONCLUSIONDATE",
            format::long_date(payload.conclusion_date),
        ),
        ("LOGOIMAGELINK", logo_link.to_string()),
        ("STAMPIMAGELINK", stamp_link.to_string()),
        ("QRCODEIMAGELINK", qr_link.to_string()),
        (
            "LOCATIONDATETIME",
            format::location_line(payload.conclusion_date),
        ),
    ]
}
