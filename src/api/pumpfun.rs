use crate::errors::{BundlerError, Result};
use crate::models::api::IpfsResponse;
use crate::models::token::TokenMetadata;
use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::path::Path;
use std::time::Duration;

#[async_trait]
pub trait MetadataUploader: Send + Sync {
    /// Publishes the metadata and returns its URI.
    async fn upload(&self, metadata: &TokenMetadata) -> Result<String>;
}

/// Uploads to pump.fun's IPFS form endpoint.
pub struct PumpIpfsUploader {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl PumpIpfsUploader {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(30),
        }
    }

    async fn build_form(metadata: &TokenMetadata) -> Result<Form> {
        let mut form = Form::new()
            .text("name", metadata.name.clone())
            .text("symbol", metadata.symbol.clone())
            .text("description", metadata.description.clone())
            .text("showName", metadata.show_name.to_string());

        if let Some(twitter) = &metadata.twitter {
            form = form.text("twitter", twitter.clone());
        }
        if let Some(telegram) = &metadata.telegram {
            form = form.text("telegram", telegram.clone());
        }
        if let Some(website) = &metadata.website {
            form = form.text("website", website.clone());
        }

        if let Some(image) = &metadata.image {
            let path = Path::new(image);
            if path.is_file() {
                let bytes = tokio::fs::read(path).await?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "image".to_string());
                form = form.part("file", Part::bytes(bytes).file_name(file_name));
            } else {
                // Not a local file, pass it through as a URL.
                form = form.text("image", image.clone());
            }
        }
        Ok(form)
    }
}

#[async_trait]
impl MetadataUploader for PumpIpfsUploader {
    async fn upload(&self, metadata: &TokenMetadata) -> Result<String> {
        let form = Self::build_form(metadata).await?;
        debug!("Uploading metadata for {} to {}", metadata.symbol, self.endpoint);

        let res = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| BundlerError::Upload(format!("IPFS upload request failed: {}", e)))?;

        let status = res.status();
        if !status.is_success() {
            let error_text = res.text().await.unwrap_or_default();
            error!("IPFS endpoint failed with status: {}, error: {}", status, error_text);
            return Err(BundlerError::Upload(format!(
                "IPFS upload failed. Status: {}, error: {}",
                status, error_text
            )));
        }

        let ipfs_response: IpfsResponse = res
            .json()
            .await
            .map_err(|e| BundlerError::Upload(format!("Failed to parse IPFS response: {}", e)))?;
        info!("Metadata uploaded. URI: {}", ipfs_response.metadata_uri);
        Ok(ipfs_response.metadata_uri)
    }
}
