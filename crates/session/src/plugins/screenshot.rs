//! `screenshot`: captures the screen and shares it as a blob.

use std::sync::Arc;

use assurance_core::{
    commands, AssuranceEvent, Environment, EventType, LogVisibility, Result, DEFAULT_VENDOR,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tracing::{info, warn};

use crate::plugin::Plugin;
use crate::session::SessionHandle;

pub const SCREENSHOT_MIME_TYPE: &str = "image/png";

/// Captures the current screen as PNG bytes.
#[async_trait]
pub trait ScreenshotProvider: Send + Sync {
    async fn capture(&self) -> Result<Vec<u8>>;
}

/// Uploads bytes to the blob store and returns the blob id.
#[async_trait]
pub trait BlobUploader: Send + Sync {
    async fn upload(
        &self,
        data: Vec<u8>,
        content_type: &str,
        session_id: &str,
        environment: Environment,
    ) -> Result<String>;
}

pub struct ScreenshotPlugin {
    provider: Arc<dyn ScreenshotProvider>,
    uploader: Arc<dyn BlobUploader>,
    session: Mutex<Option<SessionHandle>>,
}

impl ScreenshotPlugin {
    pub fn new(provider: Arc<dyn ScreenshotProvider>, uploader: Arc<dyn BlobUploader>) -> Self {
        Self {
            provider,
            uploader,
            session: Mutex::new(None),
        }
    }

    async fn capture_and_upload(&self, session: &SessionHandle) -> Result<String> {
        let session_id = session
            .session_id()
            .ok_or_else(|| assurance_core::Error::internal("session is gone"))?;
        let environment = session.environment().unwrap_or_default();

        let png = self.provider.capture().await?;
        self.uploader
            .upload(png, SCREENSHOT_MIME_TYPE, &session_id, environment)
            .await
    }
}

#[async_trait]
impl Plugin for ScreenshotPlugin {
    fn command_type(&self) -> &str {
        commands::SCREENSHOT
    }

    fn on_registered(&self, session: SessionHandle) {
        *self.session.lock() = Some(session);
    }

    async fn handle(&self, _event: &AssuranceEvent) {
        let Some(session) = self.session.lock().clone() else {
            return;
        };

        match self.capture_and_upload(&session).await {
            Ok(blob_id) => {
                info!(blob_id = %blob_id, "Screenshot uploaded");
                let payload = json!({
                    "blobId": blob_id,
                    "mimeType": SCREENSHOT_MIME_TYPE,
                });
                session.send_event(AssuranceEvent::new(
                    session.sequence(),
                    DEFAULT_VENDOR,
                    EventType::Blob,
                    payload.as_object().cloned(),
                ));
            }
            Err(e) => {
                warn!(error = %e, "Screenshot failed");
                session.add_client_log(&format!("Screenshot failed: {e}"), LogVisibility::High);
            }
        }
    }
}
