//! `configUpdate`: temporary configuration overrides from the inspector.

use std::collections::BTreeSet;
use std::sync::Arc;

use assurance_core::{commands, AssuranceEvent, LogVisibility, Payload};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::plugin::Plugin;
use crate::session::SessionHandle;

/// Where configuration overrides are applied.
pub trait ConfigSink: Send + Sync {
    fn update(&self, values: &Payload);

    /// Drops the overrides for `keys`, restoring the app's own values.
    fn revert(&self, keys: &[String]);
}

/// Applies `detail` as configuration overrides and reverts them when the
/// session ends.
pub struct ConfigModifyPlugin {
    sink: Arc<dyn ConfigSink>,
    session: Mutex<Option<SessionHandle>>,
    modified: Mutex<BTreeSet<String>>,
}

impl ConfigModifyPlugin {
    pub fn new(sink: Arc<dyn ConfigSink>) -> Self {
        Self {
            sink,
            session: Mutex::new(None),
            modified: Mutex::new(BTreeSet::new()),
        }
    }

    /// Keys currently overridden.
    pub fn modified_keys(&self) -> Vec<String> {
        self.modified.lock().iter().cloned().collect()
    }

    fn client_log(&self, message: &str, visibility: LogVisibility) {
        if let Some(session) = self.session.lock().as_ref() {
            session.add_client_log(message, visibility);
        }
    }
}

#[async_trait]
impl Plugin for ConfigModifyPlugin {
    fn command_type(&self) -> &str {
        commands::CONFIG_UPDATE
    }

    fn on_registered(&self, session: SessionHandle) {
        *self.session.lock() = Some(session);
    }

    async fn handle(&self, event: &AssuranceEvent) {
        let Some(detail) = event.control_detail().filter(|d| !d.is_empty()) else {
            warn!(event_id = %event.id, "configUpdate without detail, ignoring");
            return;
        };

        self.sink.update(detail);
        let keys: Vec<String> = detail.keys().cloned().collect();
        self.modified.lock().extend(keys.iter().cloned());

        info!(keys = ?keys, "Applied configuration overrides");
        self.client_log(
            &format!("Configuration modified: {}", keys.join(", ")),
            LogVisibility::Normal,
        );
    }

    fn on_session_terminated(&self) {
        let keys: Vec<String> = std::mem::take(&mut *self.modified.lock())
            .into_iter()
            .collect();
        if keys.is_empty() {
            return;
        }
        info!(keys = ?keys, "Reverting configuration overrides");
        self.sink.revert(&keys);
    }
}
