//! Hooks into the pairing and status UI.
//!
//! The UI itself lives outside this crate. Sessions and the orchestrator only
//! talk to it through [`Presentation`], which pairs one authorization flow
//! with a status presenter.

use std::sync::Arc;

use assurance_core::ConnectionError;

/// Connection status display shared by both authorization flows.
pub trait StatusPresenter: Send + Sync {
    fn on_connected(&self);

    fn on_reconnecting(&self) {}

    fn on_disconnected(&self);

    /// `error.should_retry()` tells the UI whether to offer a retry.
    fn on_error(&self, error: &ConnectionError);
}

/// PIN entry screen.
pub trait PinPrompt: Send + Sync {
    fn show_pin_prompt(&self);

    fn dismiss(&self) {}
}

/// Quick-connect screen, shown while the device waits to be paired.
pub trait QuickConnectPrompt: Send + Sync {
    fn show_quick_connect(&self);

    /// The device is registered and waiting for approval.
    fn on_waiting_for_approval(&self) {}

    fn dismiss(&self) {}
}

/// How the user authorizes a session.
#[derive(Clone)]
pub enum AuthorizationFlow {
    Pin(Arc<dyn PinPrompt>),
    QuickConnect(Arc<dyn QuickConnectPrompt>),
}

impl AuthorizationFlow {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pin(_) => "pin",
            Self::QuickConnect(_) => "quick_connect",
        }
    }
}

/// The UI surface a session reports to.
#[derive(Clone)]
pub struct Presentation {
    flow: AuthorizationFlow,
    status: Arc<dyn StatusPresenter>,
}

impl Presentation {
    pub fn new(flow: AuthorizationFlow, status: Arc<dyn StatusPresenter>) -> Self {
        Self { flow, status }
    }

    pub fn flow(&self) -> &AuthorizationFlow {
        &self.flow
    }

    /// Asks the user to authorize the pending session.
    pub fn request_authentication(&self) {
        match &self.flow {
            AuthorizationFlow::Pin(prompt) => prompt.show_pin_prompt(),
            AuthorizationFlow::QuickConnect(prompt) => prompt.show_quick_connect(),
        }
    }

    pub fn on_connected(&self) {
        self.dismiss_prompt();
        self.status.on_connected();
    }

    pub fn on_reconnecting(&self) {
        self.status.on_reconnecting();
    }

    pub fn on_disconnected(&self) {
        self.dismiss_prompt();
        self.status.on_disconnected();
    }

    /// Terminal errors close the prompt; retryable ones leave it up.
    pub fn on_error(&self, error: &ConnectionError) {
        if !error.should_retry() {
            self.dismiss_prompt();
        }
        self.status.on_error(error);
    }

    pub(crate) fn on_waiting_for_approval(&self) {
        if let AuthorizationFlow::QuickConnect(prompt) = &self.flow {
            prompt.on_waiting_for_approval();
        }
    }

    fn dismiss_prompt(&self) {
        match &self.flow {
            AuthorizationFlow::Pin(prompt) => prompt.dismiss(),
            AuthorizationFlow::QuickConnect(prompt) => prompt.dismiss(),
        }
    }
}
