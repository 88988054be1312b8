//! `logForwarding`: streams the host's log lines to the inspector.

use std::sync::Arc;

use assurance_core::{commands, AssuranceEvent, CloseCode, EventType, LogVisibility, DEFAULT_VENDOR};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::plugin::Plugin;
use crate::session::SessionHandle;

/// A stream of log lines produced by the host application.
pub trait LogSource: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<String>;
}

impl LogSource for broadcast::Sender<String> {
    fn subscribe(&self) -> broadcast::Receiver<String> {
        broadcast::Sender::subscribe(self)
    }
}

/// Forwards log lines while the inspector has it enabled
/// (`detail.enable`). Forwarding stops whenever the socket goes away.
pub struct LogForwardingPlugin {
    source: Arc<dyn LogSource>,
    session: Mutex<Option<SessionHandle>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LogForwardingPlugin {
    pub fn new(source: Arc<dyn LogSource>) -> Self {
        Self {
            source,
            session: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn is_forwarding(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn start(&self) {
        let Some(session) = self.session.lock().clone() else {
            return;
        };
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("Log forwarding already running");
            return;
        }

        let mut lines = self.source.subscribe();
        *task = Some(tokio::spawn(async move {
            loop {
                match lines.recv().await {
                    Ok(line) => {
                        let payload = json!({ "logline": line });
                        session.send_event(AssuranceEvent::new(
                            session.sequence(),
                            DEFAULT_VENDOR,
                            EventType::Log,
                            payload.as_object().cloned(),
                        ));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Log forwarder fell behind, lines skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Log source closed");
        }));
        drop(task);

        info!("Log forwarding started");
        if let Some(session) = self.session.lock().as_ref() {
            session.add_client_log("Log forwarding started", LogVisibility::Normal);
        }
    }

    fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            info!("Log forwarding stopped");
        }
    }
}

#[async_trait]
impl Plugin for LogForwardingPlugin {
    fn command_type(&self) -> &str {
        commands::LOG_FORWARDING
    }

    fn on_registered(&self, session: SessionHandle) {
        *self.session.lock() = Some(session);
    }

    async fn handle(&self, event: &AssuranceEvent) {
        let enable = event
            .control_detail()
            .and_then(|detail| detail.get("enable"))
            .and_then(|v| v.as_bool());

        match enable {
            Some(true) => self.start(),
            Some(false) => self.stop(),
            None => warn!(event_id = %event.id, "logForwarding without detail.enable, ignoring"),
        }
    }

    fn on_session_disconnected(&self, _close_code: CloseCode) {
        self.stop();
    }

    fn on_session_terminated(&self) {
        self.stop();
    }
}
