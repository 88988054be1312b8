//! Built-in command handlers.
//!
//! Each plugin reaches the host application through a small capability
//! trait, so tests and embedders supply their own implementations.

pub mod config_modify;
pub mod fake_event;
pub mod log_forwarding;
pub mod screenshot;

pub use config_modify::{ConfigModifyPlugin, ConfigSink};
pub use fake_event::{EventDispatcher, FakeEventPlugin, SyntheticEvent};
pub use log_forwarding::{LogForwardingPlugin, LogSource};
pub use screenshot::{BlobUploader, ScreenshotPlugin, ScreenshotProvider, SCREENSHOT_MIME_TYPE};
