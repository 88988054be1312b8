//! Mock implementations for testing.
//!
//! Each mock implements the same trait as its production counterpart and
//! records what the session did with it.

use assurance_core::{AssuranceEvent, CloseCode, ConnectionError, Environment, Error, Payload, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use session::plugins::{BlobUploader, ConfigSink, EventDispatcher, ScreenshotProvider, SyntheticEvent};
use session::{PinPrompt, Plugin, QuickConnectPrompt, SessionHandle, StatusPresenter};
use socket::{SocketConnection, SocketEvent, SocketFactory, SocketListener, SocketState};
use std::sync::Arc;
use url::Url;

/// Socket driven by the test instead of a network.
///
/// `connect`, `disconnect` and `send` only record; the test decides when
/// the connection opens or drops.
pub struct MockSocket {
    listener: SocketListener,
    state: Mutex<SocketState>,
    connects: Mutex<Vec<Url>>,
    disconnects: Mutex<usize>,
    sent: Mutex<Vec<AssuranceEvent>>,
    should_fail: Mutex<bool>,
}

impl MockSocket {
    pub fn new(listener: SocketListener) -> Self {
        Self {
            listener,
            state: Mutex::new(SocketState::Idle),
            connects: Mutex::new(Vec::new()),
            disconnects: Mutex::new(0),
            sent: Mutex::new(Vec::new()),
            should_fail: Mutex::new(false),
        }
    }

    /// Completes the handshake.
    pub fn open(&self) {
        *self.state.lock() = SocketState::Open;
        self.emit(SocketEvent::StateChanged(SocketState::Open));
        self.emit(SocketEvent::Connected);
    }

    /// Closes the connection from the far side.
    pub fn drop_with(&self, close_code: CloseCode) {
        *self.state.lock() = SocketState::Closed;
        self.emit(SocketEvent::StateChanged(SocketState::Closed));
        self.emit(SocketEvent::Disconnected {
            close_code,
            reason: String::new(),
            was_clean: close_code != CloseCode::Abnormal,
        });
    }

    /// Delivers an inbound frame.
    pub fn receive(&self, event: AssuranceEvent) {
        self.emit(SocketEvent::Received(event));
    }

    pub fn connects(&self) -> Vec<Url> {
        self.connects.lock().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().len()
    }

    pub fn disconnect_count(&self) -> usize {
        *self.disconnects.lock()
    }

    pub fn sent(&self) -> Vec<AssuranceEvent> {
        self.sent.lock().clone()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    /// Set failure mode for sends.
    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }

    fn emit(&self, event: SocketEvent) {
        let _ = self.listener.send(event);
    }
}

#[async_trait]
impl SocketConnection for MockSocket {
    fn connect(&self, url: &Url) {
        let mut state = self.state.lock();
        if matches!(*state, SocketState::Open | SocketState::Connecting) {
            return;
        }
        *state = SocketState::Connecting;
        self.connects.lock().push(url.clone());
    }

    fn disconnect(&self) {
        *self.disconnects.lock() += 1;
        let was_active = {
            let mut state = self.state.lock();
            let active = matches!(*state, SocketState::Open | SocketState::Connecting);
            *state = SocketState::Closed;
            active
        };
        if was_active {
            self.emit(SocketEvent::Disconnected {
                close_code: CloseCode::Normal,
                reason: String::new(),
                was_clean: true,
            });
        }
    }

    async fn send(&self, event: &AssuranceEvent) -> Result<()> {
        if *self.should_fail.lock() {
            return Err(Error::transport("mock send failure"));
        }
        if *self.state.lock() != SocketState::Open {
            return Err(Error::transport("socket is not open"));
        }
        self.sent.lock().push(event.clone());
        Ok(())
    }

    fn state(&self) -> SocketState {
        *self.state.lock()
    }
}

/// Factory that keeps every socket it creates.
#[derive(Default)]
pub struct MockSocketFactory {
    sockets: Mutex<Vec<Arc<MockSocket>>>,
}

impl MockSocketFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently created socket.
    pub fn latest(&self) -> Option<Arc<MockSocket>> {
        self.sockets.lock().last().cloned()
    }

    pub fn created(&self) -> usize {
        self.sockets.lock().len()
    }
}

impl SocketFactory for MockSocketFactory {
    fn create(&self, listener: SocketListener) -> Arc<dyn SocketConnection> {
        let socket = Arc::new(MockSocket::new(listener));
        self.sockets.lock().push(socket.clone());
        socket
    }
}

/// What the UI was asked to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCall {
    PinPrompt,
    QuickConnectPrompt,
    WaitingForApproval,
    Dismissed,
    Connected,
    Reconnecting,
    Disconnected,
    Error(ConnectionError),
}

/// Presenter for both authorization flows that records every call.
#[derive(Default)]
pub struct RecordingPresenter {
    calls: Mutex<Vec<UiCall>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<UiCall> {
        self.calls.lock().clone()
    }

    pub fn contains(&self, call: &UiCall) -> bool {
        self.calls.lock().contains(call)
    }

    pub fn errors(&self) -> Vec<ConnectionError> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                UiCall::Error(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: UiCall) {
        self.calls.lock().push(call);
    }
}

impl StatusPresenter for RecordingPresenter {
    fn on_connected(&self) {
        self.record(UiCall::Connected);
    }

    fn on_reconnecting(&self) {
        self.record(UiCall::Reconnecting);
    }

    fn on_disconnected(&self) {
        self.record(UiCall::Disconnected);
    }

    fn on_error(&self, error: &ConnectionError) {
        self.record(UiCall::Error(error.clone()));
    }
}

impl PinPrompt for RecordingPresenter {
    fn show_pin_prompt(&self) {
        self.record(UiCall::PinPrompt);
    }

    fn dismiss(&self) {
        self.record(UiCall::Dismissed);
    }
}

impl QuickConnectPrompt for RecordingPresenter {
    fn show_quick_connect(&self) {
        self.record(UiCall::QuickConnectPrompt);
    }

    fn on_waiting_for_approval(&self) {
        self.record(UiCall::WaitingForApproval);
    }

    fn dismiss(&self) {
        self.record(UiCall::Dismissed);
    }
}

/// Lifecycle and dispatch calls seen by a [`RecordingPlugin`].
#[derive(Debug, Clone, PartialEq)]
pub enum PluginCall {
    Registered,
    Handled(AssuranceEvent),
    Observed(AssuranceEvent),
    Connected,
    Disconnected(CloseCode),
    Terminated,
}

/// Plugin for an arbitrary command that records everything.
pub struct RecordingPlugin {
    command: String,
    calls: Mutex<Vec<PluginCall>>,
}

impl RecordingPlugin {
    pub fn new(command: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            command: command.into(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<PluginCall> {
        self.calls.lock().clone()
    }

    pub fn handled(&self) -> Vec<AssuranceEvent> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                PluginCall::Handled(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn saw(&self, call: &PluginCall) -> bool {
        self.calls.lock().contains(call)
    }
}

#[async_trait]
impl Plugin for RecordingPlugin {
    fn command_type(&self) -> &str {
        &self.command
    }

    fn on_registered(&self, _session: SessionHandle) {
        self.calls.lock().push(PluginCall::Registered);
    }

    async fn handle(&self, event: &AssuranceEvent) {
        self.calls.lock().push(PluginCall::Handled(event.clone()));
    }

    fn observe(&self, event: &AssuranceEvent) {
        self.calls.lock().push(PluginCall::Observed(event.clone()));
    }

    fn on_session_connected(&self) {
        self.calls.lock().push(PluginCall::Connected);
    }

    fn on_session_disconnected(&self, close_code: CloseCode) {
        self.calls.lock().push(PluginCall::Disconnected(close_code));
    }

    fn on_session_terminated(&self) {
        self.calls.lock().push(PluginCall::Terminated);
    }
}

/// Config sink holding the current overrides in memory.
#[derive(Default)]
pub struct MockConfigSink {
    values: Mutex<Payload>,
    reverted: Mutex<Vec<String>>,
}

impl MockConfigSink {
    pub fn values(&self) -> Payload {
        self.values.lock().clone()
    }

    pub fn reverted(&self) -> Vec<String> {
        self.reverted.lock().clone()
    }
}

impl ConfigSink for MockConfigSink {
    fn update(&self, values: &Payload) {
        let mut current = self.values.lock();
        for (key, value) in values {
            current.insert(key.clone(), value.clone());
        }
    }

    fn revert(&self, keys: &[String]) {
        let mut current = self.values.lock();
        for key in keys {
            current.remove(key);
        }
        self.reverted.lock().extend(keys.iter().cloned());
    }
}

/// Screenshot provider returning fixed bytes, or failing.
pub struct MockScreenshotProvider {
    png: Vec<u8>,
    should_fail: Mutex<bool>,
}

impl MockScreenshotProvider {
    pub fn new(png: Vec<u8>) -> Self {
        Self {
            png,
            should_fail: Mutex::new(false),
        }
    }

    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }
}

#[async_trait]
impl ScreenshotProvider for MockScreenshotProvider {
    async fn capture(&self) -> Result<Vec<u8>> {
        if *self.should_fail.lock() {
            return Err(Error::internal("no display"));
        }
        Ok(self.png.clone())
    }
}

/// Upload recorded by [`MockBlobUploader`].
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub bytes: usize,
    pub content_type: String,
    pub session_id: String,
    pub environment: Environment,
}

/// Blob uploader that records uploads and returns a fixed id.
pub struct MockBlobUploader {
    blob_id: String,
    uploads: Mutex<Vec<Upload>>,
}

impl MockBlobUploader {
    pub fn new(blob_id: impl Into<String>) -> Self {
        Self {
            blob_id: blob_id.into(),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().clone()
    }
}

#[async_trait]
impl BlobUploader for MockBlobUploader {
    async fn upload(
        &self,
        data: Vec<u8>,
        content_type: &str,
        session_id: &str,
        environment: Environment,
    ) -> Result<String> {
        self.uploads.lock().push(Upload {
            bytes: data.len(),
            content_type: content_type.to_string(),
            session_id: session_id.to_string(),
            environment,
        });
        Ok(self.blob_id.clone())
    }
}

/// Dispatcher that keeps every synthetic event.
#[derive(Default)]
pub struct CapturingDispatcher {
    events: Mutex<Vec<SyntheticEvent>>,
}

impl CapturingDispatcher {
    pub fn events(&self) -> Vec<SyntheticEvent> {
        self.events.lock().clone()
    }
}

impl EventDispatcher for CapturingDispatcher {
    fn dispatch(&self, event: SyntheticEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_mock_socket_records_and_reports() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let socket = MockSocket::new(tx);
        let url = Url::parse("wss://connect.example.com/client/v1").unwrap();

        socket.connect(&url);
        socket.connect(&url);
        assert_eq!(socket.connect_count(), 1);

        socket.open();
        assert_eq!(rx.recv().await, Some(SocketEvent::StateChanged(SocketState::Open)));
        assert_eq!(rx.recv().await, Some(SocketEvent::Connected));
    }

    #[tokio::test]
    async fn test_mock_socket_failure_mode() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let socket = MockSocket::new(tx);
        socket.open();
        socket.set_should_fail(true);

        let seq = assurance_core::EventSequence::new();
        let event = AssuranceEvent::new(&seq, "v", assurance_core::EventType::Generic, None);
        assert!(socket.send(&event).await.is_err());
        assert!(socket.sent().is_empty());
    }
}
