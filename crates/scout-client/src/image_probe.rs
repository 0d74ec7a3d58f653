use std::time::Duration;

use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, RANGE};
use scout_core::error::AppError;
use scout_core::traits::ImageProbe;

use crate::fetcher::BROWSER_USER_AGENT;
use crate::net::ensure_public_url;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Confirms an image URL by reading its first bytes.
///
/// A URL passes when it answers 2xx and either starts with JPEG, PNG, GIF or
/// WebP magic bytes or declares an `image/*` content type.
#[derive(Clone)]
pub struct ReqwestImageProbe {
    client: Client,
    ssrf_protection: bool,
}

impl ReqwestImageProbe {
    pub fn new() -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(DEFAULT_PROBE_TIMEOUT)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;
        Ok(Self {
            client,
            ssrf_protection: true,
        })
    }

    /// Disable SSRF protection. Only for tests against local servers.
    pub fn allow_private_urls(mut self) -> Self {
        self.ssrf_protection = false;
        self
    }
}

pub fn has_image_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xFF, 0xD8, 0xFF])
        || bytes.starts_with(b"\x89PNG")
        || bytes.starts_with(b"GIF87a")
        || bytes.starts_with(b"GIF89a")
        || (bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP")
}

impl ImageProbe for ReqwestImageProbe {
    async fn probe(&self, url: &str) -> Result<bool, AppError> {
        if self.ssrf_protection && ensure_public_url(url).await.is_err() {
            return Ok(false);
        }

        let response = match self
            .client
            .get(url)
            .header(RANGE, "bytes=0-15")
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(url, error = %e, "Image probe failed");
                return Ok(false);
            }
        };

        if !response.status().is_success() {
            return Ok(false);
        }

        let is_image_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("image/"));

        // Servers that ignore Range send the whole file; only the head matters.
        let head = match response.bytes().await {
            Ok(b) => b,
            Err(_) => return Ok(is_image_type),
        };

        Ok(has_image_magic(&head[..head.len().min(16)]) || is_image_type)
    }
}
