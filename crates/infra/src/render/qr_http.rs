use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{QrEncoder, RenderError};

/// Client for the QR rendering service (`POST /qr` with `{"text", "size"}`,
/// replying with `image/png` bytes).
pub struct HttpQrEncoder {
    client: Client,
    base_url: String,
}

impl HttpQrEncoder {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl QrEncoder for HttpQrEncoder {
    async fn encode(&self, text: &str, size: u32) -> Result<Vec<u8>, RenderError> {
        let response = self
            .client
            .post(format!("{}/qr", self.base_url))
            .json(&json!({ "text": text, "size": size }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RenderError::QrStatus(response.status().as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}
