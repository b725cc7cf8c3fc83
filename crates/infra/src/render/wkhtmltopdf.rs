use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{PdfConverter, PdfOptions, RenderError};

/// HTML-to-PDF conversion through the `wkhtmltopdf` binary.
///
/// The subprocess reads the HTML from stdin and writes the PDF to stdout;
/// stderr is captured for the error path.
pub struct WkhtmltopdfConverter {
    binary: String,
}

impl WkhtmltopdfConverter {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }
}

#[async_trait]
impl PdfConverter for WkhtmltopdfConverter {
    async fn convert(&self, html: &str, options: &PdfOptions) -> Result<Vec<u8>, RenderError> {
        let mut child = Command::new(&self.binary)
            .args(options.to_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Stdin must be closed before the converter produces output.
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(html.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(RenderError::PdfExit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        debug!(bytes = output.stdout.len(), "pdf rendered");
        Ok(output.stdout)
    }
}
