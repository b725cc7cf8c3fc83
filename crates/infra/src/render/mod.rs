//! Rendering collaborators: QR encoding, HTML templating and HTML-to-PDF
//! conversion.

mod qr_http;
mod template;
mod wkhtmltopdf;

pub use qr_http::HttpQrEncoder;
pub use template::render_template;
pub use wkhtmltopdf::WkhtmltopdfConverter;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("qr service request failed: {0}")]
    QrRequest(#[from] reqwest::Error),
    #[error("qr service returned status {0}")]
    QrStatus(u16),
    #[error("pdf converter io: {0}")]
    PdfIo(#[from] std::io::Error),
    #[error("pdf converter exited with {status}: {stderr}")]
    PdfExit { status: String, stderr: String },
}

/// Renders a QR code PNG for arbitrary text.
#[async_trait]
pub trait QrEncoder: Send + Sync {
    async fn encode(&self, text: &str, size: u32) -> Result<Vec<u8>, RenderError>;
}

/// Converts rendered HTML into PDF bytes.
#[async_trait]
pub trait PdfConverter: Send + Sync {
    async fn convert(&self, html: &str, options: &PdfOptions) -> Result<Vec<u8>, RenderError>;
}

/// Page setup for the PDF conversion.
#[derive(Debug, Clone)]
pub struct PdfOptions {
    pub page_size: String,
    pub orientation: String,
    pub dpi: u32,
    pub zoom: f64,
    pub margin_mm: u32,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            page_size: "A4".to_string(),
            orientation: "Landscape".to_string(),
            dpi: 300,
            zoom: 1.0,
            margin_mm: 10,
        }
    }
}

impl PdfOptions {
    /// Command-line flags for a `wkhtmltopdf`-compatible converter, reading
    /// HTML from stdin and writing the PDF to stdout.
    pub fn to_args(&self) -> Vec<String> {
        let margin = format!("{}mm", self.margin_mm);
        vec![
            "--quiet".to_string(),
            "--encoding".to_string(),
            "utf-8".to_string(),
            "--page-size".to_string(),
            self.page_size.clone(),
            "--orientation".to_string(),
            self.orientation.clone(),
            "--dpi".to_string(),
            self.dpi.to_string(),
            "--zoom".to_string(),
            self.zoom.to_string(),
            "--margin-top".to_string(),
            margin.clone(),
            "--margin-bottom".to_string(),
            margin.clone(),
            "--margin-left".to_string(),
            margin.clone(),
            "--margin-right".to_string(),
            margin,
            "-".to_string(),
            "-".to_string(),
        ]
    }
}
