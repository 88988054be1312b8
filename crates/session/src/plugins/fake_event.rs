//! `fakeEvent`: injects synthetic events into the host's event pipeline.

use std::sync::Arc;

use assurance_core::{commands, AssuranceEvent, LogVisibility, Payload};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::plugin::Plugin;
use crate::session::SessionHandle;

/// An event the inspector asked the host to process as if it were real.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyntheticEvent {
    pub event_name: String,
    pub event_type: String,
    pub event_source: String,
    #[serde(default)]
    pub event_data: Payload,
}

/// Entry point into the host's event pipeline.
pub trait EventDispatcher: Send + Sync {
    fn dispatch(&self, event: SyntheticEvent);
}

pub struct FakeEventPlugin {
    dispatcher: Arc<dyn EventDispatcher>,
    session: Mutex<Option<SessionHandle>>,
}

impl FakeEventPlugin {
    pub fn new(dispatcher: Arc<dyn EventDispatcher>) -> Self {
        Self {
            dispatcher,
            session: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Plugin for FakeEventPlugin {
    fn command_type(&self) -> &str {
        commands::FAKE_EVENT
    }

    fn on_registered(&self, session: SessionHandle) {
        *self.session.lock() = Some(session);
    }

    async fn handle(&self, event: &AssuranceEvent) {
        let Some(detail) = event.control_detail() else {
            warn!(event_id = %event.id, "fakeEvent without detail, ignoring");
            return;
        };

        match serde_json::from_value::<SyntheticEvent>(Value::Object(detail.clone())) {
            Ok(synthetic) => {
                info!(name = %synthetic.event_name, "Dispatching synthetic event");
                self.dispatcher.dispatch(synthetic);
            }
            Err(e) => {
                warn!(error = %e, "Malformed fakeEvent detail");
                if let Some(session) = self.session.lock().as_ref() {
                    session.add_client_log(
                        &format!("Unable to create synthetic event: {e}"),
                        LogVisibility::High,
                    );
                }
            }
        }
    }
}
