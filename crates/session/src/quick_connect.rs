//! Quick-connect device pairing.
//!
//! Instead of typing a PIN, the device registers itself with the pairing
//! service, a user approves it in the inspector, and the device polls until
//! the service hands back a session id and token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use assurance_core::{ConnectionError, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Timeout for each pairing service request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceRequest<'a> {
    org_id: &'a str,
    client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_name: Option<&'a str>,
}

/// Response of the status endpoint. Both fields appear once a user approved
/// the device.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    #[serde(default)]
    pub session_uuid: Option<String>,
    /// Numeric in practice, accepted as a string too
    #[serde(default)]
    pub token: Option<Value>,
}

/// Credentials of an approved pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedSession {
    pub session_id: String,
    pub token: String,
}

impl DeviceStatus {
    /// The pairing, if the device has been approved.
    pub fn paired(&self) -> Option<PairedSession> {
        let session_id = self.session_uuid.as_deref().filter(|s| !s.is_empty())?;
        let token = match self.token.as_ref()? {
            Value::Number(n) => n.to_string(),
            Value::String(s) if !s.is_empty() => s.clone(),
            _ => return None,
        };
        Some(PairedSession {
            session_id: session_id.to_string(),
            token,
        })
    }
}

/// Client for the device pairing endpoints.
pub struct QuickConnectService {
    base_url: String,
    org_id: String,
    client_id: String,
    device_name: String,
    http_client: reqwest::Client,
}

impl QuickConnectService {
    pub fn new(
        host: &str,
        org_id: impl Into<String>,
        client_id: impl Into<String>,
        device_name: impl Into<String>,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::internal(format!("http client: {e}")))?;

        Ok(Self {
            base_url: format!("https://device.{host}"),
            org_id: org_id.into(),
            client_id: client_id.into(),
            device_name: device_name.into(),
            http_client,
        })
    }

    /// Points the service at another base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn endpoint(&self, action: &str) -> String {
        format!("{}/device/{}", self.base_url, action)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Registers this device so it shows up for approval.
    pub async fn register_device(&self) -> Result<()> {
        let body = DeviceRequest {
            org_id: &self.org_id,
            client_id: &self.client_id,
            device_name: Some(&self.device_name),
        };
        self.post("create", &body, ConnectionError::DeviceRegistrationFailed)
            .await?;
        info!(client_id = %self.client_id, "Device registered for quick connect");
        Ok(())
    }

    pub async fn get_device_status(&self) -> Result<DeviceStatus> {
        let body = DeviceRequest {
            org_id: &self.org_id,
            client_id: &self.client_id,
            device_name: None,
        };
        let text = self
            .post("status", &body, ConnectionError::DeviceStatusFailed)
            .await?;

        serde_json::from_str(&text).map_err(|e| {
            warn!(error = %e, "Unreadable device status response");
            Error::network(ConnectionError::InvalidResponseData, None, e.to_string())
        })
    }

    pub async fn delete_device(&self) -> Result<()> {
        let body = DeviceRequest {
            org_id: &self.org_id,
            client_id: &self.client_id,
            device_name: None,
        };
        self.post("delete", &body, ConnectionError::DeviceDeleteFailed)
            .await?;
        debug!(client_id = %self.client_id, "Device registration deleted");
        Ok(())
    }

    /// Polls the status endpoint every `interval` until the device is
    /// approved. Setting `cancelled` ends the poll with `UserCancelled`.
    pub async fn poll_device_status(
        &self,
        cancelled: &AtomicBool,
        interval: Duration,
    ) -> Result<PairedSession> {
        loop {
            if cancelled.load(Ordering::SeqCst) {
                return Err(ConnectionError::UserCancelled.into());
            }

            if let Some(paired) = self.get_device_status().await?.paired() {
                info!(session_id = %paired.session_id, "Device approved");
                return Ok(paired);
            }

            debug!(interval_ms = interval.as_millis() as u64, "Device not approved yet");
            tokio::time::sleep(interval).await;
        }
    }

    async fn post<T: Serialize>(&self, action: &str, body: &T, failure: ConnectionError) -> Result<String> {
        let url = self.endpoint(action);
        debug!(url = %url, "Calling pairing service");

        let response = self
            .http_client
            .post(&url)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, url = %url, "Pairing service request failed");
                Error::network(failure.clone(), e.status().map(|s| s.as_u16()), e.to_string())
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(status = %status, body = %text, "Pairing service returned error");
            return Err(Error::network(failure, Some(status.as_u16()), text));
        }
        Ok(text)
    }
}
