//! HTTP blob upload used for screenshots.

use std::time::Duration;

use assurance_core::{ConnectionError, Environment, Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::plugins::BlobUploader;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: Option<String>,
    error: Option<String>,
}

/// Uploads to `https://blob[-env].<host>/api/FileUpload`.
pub struct HttpBlobUploader {
    host: String,
    http_client: reqwest::Client,
}

impl HttpBlobUploader {
    pub fn new(host: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| Error::internal(format!("http client: {e}")))?;

        Ok(Self {
            host: host.into(),
            http_client,
        })
    }

    pub fn upload_url(&self, session_id: &str, environment: Environment) -> Result<url::Url> {
        let base = format!(
            "https://blob{}.{}/api/FileUpload",
            environment.url_suffix(),
            self.host
        );
        let mut url = url::Url::parse(&base).map_err(|e| Error::invalid_url(format!("{base}: {e}")))?;
        url.query_pairs_mut()
            .append_pair("validationSessionId", session_id);
        Ok(url)
    }
}

#[async_trait]
impl BlobUploader for HttpBlobUploader {
    async fn upload(
        &self,
        data: Vec<u8>,
        content_type: &str,
        session_id: &str,
        environment: Environment,
    ) -> Result<String> {
        let url = self.upload_url(session_id, environment)?;
        debug!(url = %url, bytes = data.len(), "Uploading blob");

        let response = self
            .http_client
            .post(url)
            .header("Content-Type", "application/octet-stream")
            .header("File-Content-Type", content_type)
            .header("Accept", "application/json")
            .body(data)
            .send()
            .await
            .map_err(|e| {
                Error::network(ConnectionError::Generic, e.status().map(|s| s.as_u16()), e.to_string())
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(status = %status, body = %text, "Blob upload rejected");
            return Err(Error::network(ConnectionError::Generic, Some(status.as_u16()), text));
        }

        let parsed: UploadResponse = serde_json::from_str(&text)
            .map_err(|e| Error::network(ConnectionError::InvalidResponseData, Some(status.as_u16()), e.to_string()))?;
        match (parsed.id, parsed.error) {
            (Some(id), _) => Ok(id),
            (None, Some(error)) => Err(Error::network(ConnectionError::Generic, Some(status.as_u16()), error)),
            (None, None) => Err(Error::network(
                ConnectionError::InvalidResponseData,
                Some(status.as_u16()),
                "upload response has no id",
            )),
        }
    }
}
