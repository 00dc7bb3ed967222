// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use cellgate_engine::SegmentParams;
use reqwest::Client;
use reqwest::multipart::{Form, Part};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// HTTP client for a running segmentation gateway
#[derive(Debug, Clone)]
pub struct SegmentClient {
    client: Client,
    base_url: String,
}

impl SegmentClient {
    /// Create a client for the gateway at `base_url`, e.g. `http://127.0.0.1:8000`
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the custom models available to each family
    pub async fn models(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let resp = self
            .client
            .get(format!("{}/getModels", self.base_url))
            .send()
            .await
            .context("Failed to send model listing request")?;

        if !resp.status().is_success() {
            return Err(anyhow!("Model listing failed with status {}", resp.status()));
        }

        resp.json()
            .await
            .context("Failed to parse model listing response")
    }

    /// Upload an image for segmentation and return the outline text
    ///
    /// # Arguments
    ///
    /// * `image` - Path to the image uploaded as the `image` field
    /// * `params` - Model selection and engine options sent as query parameters
    pub async fn segment(&self, image: &Path, params: &SegmentParams) -> Result<String> {
        let bytes = tokio::fs::read(image)
            .await
            .with_context(|| format!("Failed to read image {}", image.display()))?;

        let file_name = image
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/octet-stream")
            .context("Failed to build upload")?;

        let resp = self
            .client
            .post(format!("{}/segment", self.base_url))
            .query(params)
            .multipart(Form::new().part("image", part))
            .send()
            .await
            .context("Failed to send segmentation request")?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .context("Failed to get segmentation response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "Segmentation with {}/{} failed ({}): {}",
                params.model_type,
                params.model_name,
                status,
                body
            ));
        }

        Ok(body)
    }

    /// Whether the gateway answers the model listing with a 2xx status
    pub async fn is_ready(&self) -> bool {
        self.client
            .get(format!("{}/getModels", self.base_url))
            .timeout(READY_POLL_INTERVAL * 4)
            .send()
            .await
            .is_ok_and(|resp| resp.status().is_success())
    }

    /// Poll the gateway until it is ready or the deadline passes
    ///
    /// A timeout too large to represent as an instant waits indefinitely.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now().checked_add(timeout);

        loop {
            if self.is_ready().await {
                return Ok(());
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(anyhow!(
                    "Gateway at {} was not ready after {:.1}s",
                    self.base_url,
                    timeout.as_secs_f32()
                ));
            }

            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }
}
