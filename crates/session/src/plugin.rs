//! Inbound command handlers and their registry.

use std::sync::Arc;

use assurance_core::{AssuranceEvent, CloseCode, DEFAULT_VENDOR};
use async_trait::async_trait;
use parking_lot::RwLock;
use telemetry::metrics;
use tracing::{debug, warn};

use crate::session::SessionHandle;

/// A handler for one inbound command type.
///
/// Plugins are registered once per session and hear about every lifecycle
/// transition of that session.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Control command this plugin handles (`payload.type`).
    fn command_type(&self) -> &str;

    fn vendor(&self) -> &str {
        DEFAULT_VENDOR
    }

    /// Called once when the plugin joins a session.
    fn on_registered(&self, _session: SessionHandle) {}

    /// Handles a control event whose command type matched.
    async fn handle(&self, event: &AssuranceEvent);

    /// Sees every non-control inbound event.
    fn observe(&self, _event: &AssuranceEvent) {}

    fn on_session_connected(&self) {}

    fn on_session_disconnected(&self, _close_code: CloseCode) {}

    fn on_session_terminated(&self) {}
}

/// Registry of plugins for one session.
pub struct PluginHub {
    session: SessionHandle,
    plugins: RwLock<Vec<Arc<dyn Plugin>>>,
}

impl PluginHub {
    pub fn new(session: SessionHandle) -> Self {
        Self {
            session,
            plugins: RwLock::new(Vec::new()),
        }
    }

    pub fn register_plugin(&self, plugin: Arc<dyn Plugin>) {
        debug!(command = plugin.command_type(), "Registering plugin");
        plugin.on_registered(self.session.clone());
        self.plugins.write().push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.read().is_empty()
    }

    /// Whether any registered plugin handles `command`.
    pub fn handles(&self, command: &str) -> bool {
        self.plugins.read().iter().any(|p| p.command_type() == command)
    }

    /// Routes a control event to its handler, or shows any other event to
    /// every plugin. Unknown commands are dropped.
    pub async fn dispatch(&self, event: &AssuranceEvent) {
        // no lock held across handler awaits
        let plugins = self.snapshot();

        let Some(command) = event.control_type() else {
            for plugin in &plugins {
                plugin.observe(event);
            }
            return;
        };

        let mut handled = false;
        for plugin in plugins.iter().filter(|p| p.command_type() == command) {
            plugin.handle(event).await;
            handled = true;
        }

        if !handled {
            metrics().unknown_commands.inc();
            warn!(command = %command, event_id = %event.id, "No plugin for command, dropping");
        }
    }

    pub fn notify_connected(&self) {
        for plugin in self.snapshot() {
            plugin.on_session_connected();
        }
    }

    pub fn notify_disconnect(&self, close_code: CloseCode) {
        for plugin in self.snapshot() {
            plugin.on_session_disconnected(close_code);
        }
    }

    pub fn notify_terminated(&self) {
        for plugin in self.snapshot() {
            plugin.on_session_terminated();
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn Plugin>> {
        self.plugins.read().clone()
    }
}
