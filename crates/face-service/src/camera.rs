use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Supplies still frames for a source
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn fetch_frame(&self) -> Result<Vec<u8>>;

    fn describe(&self) -> String;
}

/// Fetches a still image from a camera snapshot URL
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSnapshotSource {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build snapshot HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl FrameSource for HttpSnapshotSource {
    async fn fetch_frame(&self) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch snapshot from {}", self.url))?;

        if !response.status().is_success() {
            anyhow::bail!("Snapshot request failed with status: {}", response.status());
        }

        let bytes = response.bytes().await.context("Failed to read snapshot body")?;
        Ok(bytes.to_vec())
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
