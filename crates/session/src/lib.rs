//! Session lifecycle for the assurance client: queues, plugins, the session
//! state machine, and the orchestrator that owns it.

pub mod blob;
pub mod config;
pub mod orchestrator;
pub mod plugin;
pub mod plugins;
pub mod presentation;
pub mod queue;
pub mod quick_connect;
pub mod session;

pub use blob::HttpBlobUploader;
pub use config::SessionConfig;
pub use orchestrator::{PluginFactory, SessionOrchestrator};
pub use plugin::{Plugin, PluginHub};
pub use presentation::{AuthorizationFlow, PinPrompt, Presentation, QuickConnectPrompt, StatusPresenter};
pub use queue::BoundedQueue;
pub use quick_connect::{DeviceStatus, PairedSession, QuickConnectService};
pub use session::{Session, SessionDeps, SessionHandle, SessionState};
