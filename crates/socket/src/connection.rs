//! The socket interface the session drives.
//!
//! A socket reports everything through one [`SocketListener`] channel handed
//! to it at construction; the owning session is its only subscriber.

use std::fmt;
use std::sync::Arc;

use assurance_core::{AssuranceEvent, CloseCode, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

/// Transport connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Idle,
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Notifications from a socket to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Connected,
    Disconnected {
        close_code: CloseCode,
        reason: String,
        was_clean: bool,
    },
    Error(String),
    Received(AssuranceEvent),
    StateChanged(SocketState),
}

/// Channel a socket reports on.
pub type SocketListener = mpsc::UnboundedSender<SocketEvent>;

/// A connection the session can open, close, and write to.
///
/// `connect` and `disconnect` only start the work; outcomes arrive on the
/// listener.
#[async_trait]
pub trait SocketConnection: Send + Sync {
    /// Starts connecting. A no-op while already open or connecting.
    fn connect(&self, url: &Url);

    /// Starts a normal closure. In-flight sends are best-effort.
    fn disconnect(&self);

    /// Writes one event frame.
    async fn send(&self, event: &AssuranceEvent) -> Result<()>;

    fn state(&self) -> SocketState;
}

/// Builds a socket bound to a listener, one per session.
pub trait SocketFactory: Send + Sync {
    fn create(&self, listener: SocketListener) -> Arc<dyn SocketConnection>;
}
