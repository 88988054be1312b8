//! One live connection to the inspection service.
//!
//! A session owns its socket, an outbound and an inbound queue, and a plugin
//! hub. Three background tasks run per session:
//! - socket events: reacts to connect, disconnect and received frames
//! - outbound drain: chunks and sends queued events while forwarding is on
//! - inbound drain: dispatches received events to the plugins
//!
//! Reconnect timers run as their own tasks so a pending retry never stalls
//! event intake.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use assurance_core::{
    commands, AssuranceEvent, ClientInfo, CloseCode, ConnectionError, Environment, EventChunker,
    EventSequence, IdentityStore, LogVisibility, SessionDetails,
};
use parking_lot::Mutex;
use socket::{SocketConnection, SocketEvent, SocketFactory, SocketState};
use telemetry::metrics;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::plugin::{Plugin, PluginHub};
use crate::presentation::Presentation;
use crate::queue::BoundedQueue;

/// Lifecycle state of a session. `Terminated` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Reconnecting,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Collaborators shared by every session the orchestrator creates.
#[derive(Clone)]
pub struct SessionDeps {
    pub socket_factory: Arc<dyn SocketFactory>,
    pub identity: IdentityStore,
    pub presentation: Presentation,
    pub client_info: ClientInfo,
    pub config: SessionConfig,
    pub sequence: EventSequence,
}

/// Handle to a session.
///
/// Clones share the session. Must be created inside a tokio runtime, and
/// its background tasks stop when it is terminated.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    details: Mutex<SessionDetails>,
    state: Mutex<SessionState>,
    socket: Arc<dyn SocketConnection>,
    outbound: BoundedQueue<AssuranceEvent>,
    inbound: BoundedQueue<AssuranceEvent>,
    can_forward: AtomicBool,
    /// Set once the socket has opened in this session
    was_connected: AtomicBool,
    /// Client info did not go out; the close that follows is ours
    handshake_failed: AtomicBool,
    hub: PluginHub,
    chunker: EventChunker,
    identity: IdentityStore,
    presentation: Presentation,
    client_info: ClientInfo,
    config: SessionConfig,
    sequence: EventSequence,
    reconnect: Mutex<ReconnectState>,
    shutdown: watch::Sender<bool>,
}

#[derive(Default)]
struct ReconnectState {
    attempts: u32,
    timer: Option<JoinHandle<()>>,
}

impl Session {
    /// Builds a session, seeds the outbound queue with `backlog`, and starts
    /// its background tasks. Does not connect; call [`start`](Self::start).
    pub fn new(
        details: SessionDetails,
        deps: SessionDeps,
        plugins: Vec<Arc<dyn Plugin>>,
        backlog: Vec<AssuranceEvent>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);
        let socket = deps.socket_factory.create(events_tx);
        let capacity = deps.config.queue_capacity;
        let chunker = EventChunker::with_limits(
            deps.sequence.clone(),
            deps.config.max_event_size_bytes,
            deps.config.chunk_size_bytes,
        );

        let inner = Arc::new_cyclic(|weak: &Weak<SessionInner>| SessionInner {
            details: Mutex::new(details),
            state: Mutex::new(SessionState::Idle),
            socket,
            outbound: BoundedQueue::new("outbound", capacity),
            inbound: BoundedQueue::new("inbound", capacity),
            can_forward: AtomicBool::new(false),
            was_connected: AtomicBool::new(false),
            handshake_failed: AtomicBool::new(false),
            hub: PluginHub::new(SessionHandle::new(weak.clone(), deps.sequence.clone())),
            chunker,
            identity: deps.identity,
            presentation: deps.presentation,
            client_info: deps.client_info,
            config: deps.config,
            sequence: deps.sequence,
            reconnect: Mutex::new(ReconnectState::default()),
            shutdown: shutdown_tx,
        });

        for plugin in plugins {
            inner.hub.register_plugin(plugin);
        }

        let seeded = backlog.len();
        for event in backlog {
            inner.queue_outbound(event);
        }

        let weak = Arc::downgrade(&inner);
        tokio::spawn(run_socket_events(weak.clone(), events_rx));
        tokio::spawn(run_drain(
            weak.clone(),
            inner.outbound.waker(),
            inner.shutdown.subscribe(),
            Direction::Outbound,
        ));
        tokio::spawn(run_drain(
            weak,
            inner.inbound.waker(),
            inner.shutdown.subscribe(),
            Direction::Inbound,
        ));

        metrics().sessions_created.inc();
        info!(
            session_id = %inner.details.lock().session_id(),
            plugins = inner.hub.len(),
            backlog = seeded,
            "Session created"
        );

        Self { inner }
    }

    /// Connects if the session is authenticated, otherwise asks the user to
    /// authenticate. A no-op while open, connecting, or terminated.
    pub fn start(&self) {
        self.inner.start();
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Open
    }

    pub fn session_id(&self) -> String {
        self.inner.details.lock().session_id().to_string()
    }

    pub fn details(&self) -> SessionDetails {
        self.inner.details.lock().clone()
    }

    /// Stores the pairing code and org id for the next connect.
    pub fn authenticate(&self, pin: &str, org_id: &str) {
        self.inner.details.lock().authenticate(pin, org_id);
    }

    /// Queues an event for forwarding. Returns `false` if it was dropped.
    pub fn send_event(&self, event: AssuranceEvent) -> bool {
        self.inner.send_event(event)
    }

    /// Sends a log line to the inspector's client log view.
    pub fn add_client_log(&self, message: &str, visibility: LogVisibility) -> bool {
        self.inner.add_client_log(message, visibility)
    }

    /// Whether queued events are currently flowing to the socket.
    pub fn can_forward_events(&self) -> bool {
        self.inner.can_forward.load(Ordering::SeqCst)
    }

    pub fn outbound_len(&self) -> usize {
        self.inner.outbound.len()
    }

    pub fn inbound_len(&self) -> usize {
        self.inner.inbound.len()
    }

    /// Shows a connection error and, if it is terminal, ends the session.
    pub fn handle_connection_error(&self, error: ConnectionError) {
        self.inner.handle_connection_error(error);
    }

    /// Empties both queues, stops forwarding, tells plugins the session is
    /// over, and forgets the persisted socket URL.
    pub fn clear_session_data(&self) {
        self.inner.clear_session_data();
    }

    /// Disconnects and ends the session for good.
    pub fn terminate(&self) {
        if self.inner.finish() {
            self.inner.presentation.on_disconnected();
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(Arc::downgrade(&self.inner), self.inner.sequence.clone())
    }
}

impl SessionInner {
    fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn start(&self) {
        let mut state = self.state.lock();
        let current = *state;
        if matches!(
            current,
            SessionState::Open | SessionState::Connecting | SessionState::Terminated
        ) {
            debug!(state = %current, "Session start ignored");
            return;
        }

        let url = self.details.lock().derive_connection_url();
        match url {
            Ok(url) => {
                *state = SessionState::Connecting;
                drop(state);
                info!(session_id = %self.session_id(), "Connecting session");
                self.socket.connect(&url);
            }
            Err(e) => {
                drop(state);
                debug!(error = %e, "Session not authenticated, requesting authentication");
                self.presentation.request_authentication();
            }
        }
    }

    fn session_id(&self) -> String {
        self.details.lock().session_id().to_string()
    }

    fn send_event(&self, event: AssuranceEvent) -> bool {
        if self.state() == SessionState::Terminated {
            metrics().events_dropped_no_session.inc();
            debug!(event_id = %event.id, "Session terminated, dropping event");
            return false;
        }
        self.queue_outbound(event)
    }

    fn queue_outbound(&self, event: AssuranceEvent) -> bool {
        if !self.outbound.enqueue(event) {
            metrics().events_dropped_queue_full.inc();
            return false;
        }
        metrics().events_queued.inc();
        metrics().outbound_depth.set(self.outbound.len() as u64);
        true
    }

    fn add_client_log(&self, message: &str, visibility: LogVisibility) -> bool {
        self.send_event(AssuranceEvent::client_log(&self.sequence, message, visibility))
    }

    async fn handle_socket_event(self: &Arc<Self>, event: SocketEvent) {
        if self.state() == SessionState::Terminated {
            debug!(event = ?event, "Session terminated, ignoring socket event");
            return;
        }

        match event {
            SocketEvent::Connected => self.on_connected().await,
            SocketEvent::Disconnected {
                close_code,
                reason,
                was_clean,
            } => self.on_disconnected(close_code, &reason, was_clean),
            SocketEvent::Error(message) => warn!(error = %message, "Socket error"),
            SocketEvent::Received(event) => self.on_received(event),
            SocketEvent::StateChanged(state) => debug!(socket_state = %state, "Socket state changed"),
        }
    }

    async fn on_connected(&self) {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Terminated {
                return;
            }
            *state = SessionState::Open;
        }
        self.was_connected.store(true, Ordering::SeqCst);
        metrics().connected.set(1);

        match self.details.lock().derive_connection_url() {
            Ok(url) => self.identity.save_connected_url(url.as_str()),
            Err(e) => warn!(error = %e, "Connected without a derivable url"),
        }

        // the service expects client info before anything else
        let info = self.client_info.to_event(&self.sequence);
        if let Err(e) = self.socket.send(&info).await {
            metrics().send_errors.inc();
            error!(error = %e, "Failed to send client info, dropping connection");
            {
                let mut state = self.state.lock();
                if *state == SessionState::Terminated {
                    return;
                }
                *state = SessionState::Reconnecting;
            }
            self.handshake_failed.store(true, Ordering::SeqCst);
            self.socket.disconnect();
            return;
        }

        self.reconnect.lock().attempts = 0;
        self.can_forward.store(true, Ordering::SeqCst);
        self.outbound.wake();
        self.hub.notify_connected();
        self.presentation.on_connected();
        info!(session_id = %self.session_id(), "Session connected");
    }

    fn on_disconnected(self: &Arc<Self>, close_code: CloseCode, reason: &str, was_clean: bool) {
        metrics().connected.set(0);
        self.can_forward.store(false, Ordering::SeqCst);
        info!(
            session_id = %self.session_id(),
            close_code = close_code.as_u16(),
            reason = %reason,
            was_clean,
            "Session socket closed"
        );

        if self.handshake_failed.swap(false, Ordering::SeqCst) {
            *self.state.lock() = SessionState::Reconnecting;
            self.presentation.on_reconnecting();
            self.schedule_reconnect();
            return;
        }

        if close_code == CloseCode::Normal {
            if self.finish() {
                self.presentation.on_disconnected();
            }
            return;
        }

        if let Some(error) = ConnectionError::from_close_code(close_code) {
            warn!(close_code = close_code.as_u16(), error = %error, "Terminal close code");
            if self.finish() {
                self.presentation.on_error(&error);
            }
            return;
        }

        if !self.was_connected.load(Ordering::SeqCst) {
            // never got in, most likely a wrong PIN or no network
            *self.state.lock() = SessionState::Idle;
            self.presentation.on_error(&ConnectionError::Generic);
            return;
        }

        *self.state.lock() = SessionState::Reconnecting;
        self.hub.notify_disconnect(close_code);
        self.presentation.on_reconnecting();
        self.schedule_reconnect();
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let mut reconnect = self.reconnect.lock();
        let delay = if reconnect.attempts == 0 {
            Duration::ZERO
        } else {
            self.config.reconnect_delay()
        };
        reconnect.attempts += 1;
        metrics().reconnect_attempts.inc();
        info!(
            attempt = reconnect.attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );

        if let Some(timer) = reconnect.timer.take() {
            timer.abort();
        }
        let weak = Arc::downgrade(self);
        reconnect.timer = Some(tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Some(inner) = weak.upgrade() {
                if inner.state() == SessionState::Reconnecting {
                    inner.start();
                }
            }
        }));
    }

    fn on_received(&self, event: AssuranceEvent) {
        metrics().inbound_received.inc();
        if self.inbound.enqueue(event) {
            metrics().inbound_depth.set(self.inbound.len() as u64);
        }
    }

    fn handle_connection_error(&self, error: ConnectionError) {
        warn!(error = %error, retry = error.should_retry(), "Connection error");
        if error.should_retry() {
            self.presentation.on_error(&error);
            return;
        }
        if self.finish() {
            self.presentation.on_error(&error);
        }
    }

    fn clear_session_data(&self) {
        self.outbound.clear();
        self.inbound.clear();
        self.can_forward.store(false, Ordering::SeqCst);
        metrics().outbound_depth.set(0);
        metrics().inbound_depth.set(0);
        self.hub.notify_terminated();
        self.identity.clear_connected_url();
    }

    /// Moves to `Terminated`. Returns `false` if already there.
    fn finish(&self) -> bool {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Terminated {
                return false;
            }
            *state = SessionState::Terminated;
        }

        if let Some(timer) = self.reconnect.lock().timer.take() {
            timer.abort();
        }
        self.socket.disconnect();
        self.clear_session_data();
        metrics().connected.set(0);
        metrics().sessions_terminated.inc();
        // receivers may already be gone
        let _ = self.shutdown.send(true);

        info!(session_id = %self.session_id(), "Session terminated");
        true
    }

    async fn flush_outbound(&self) {
        while self.can_forward.load(Ordering::SeqCst) && self.socket.state() == SocketState::Open {
            let Some(event) = self.outbound.dequeue() else {
                break;
            };
            metrics().outbound_depth.set(self.outbound.len() as u64);

            let fragments = self.chunker.chunk(event);
            if fragments.is_empty() {
                metrics().events_dropped_unchunkable.inc();
                continue;
            }

            let chunked = fragments.len() > 1;
            for fragment in &fragments {
                if let Err(e) = self.transmit(fragment).await {
                    metrics().send_errors.inc();
                    warn!(event_id = %fragment.id, error = %e, "Send failed, dropping event");
                    break;
                }
                if chunked {
                    metrics().chunks_sent.inc();
                }
            }
        }
    }

    async fn transmit(&self, event: &AssuranceEvent) -> assurance_core::Result<()> {
        let start = Instant::now();
        self.socket.send(event).await?;
        metrics().events_sent.inc();
        metrics()
            .send_latency_ms
            .observe(start.elapsed().as_millis() as u64);
        Ok(())
    }

    async fn flush_inbound(&self) {
        while let Some(event) = self.inbound.dequeue() {
            metrics().inbound_depth.set(self.inbound.len() as u64);
            self.process_inbound(event).await;
        }
    }

    async fn process_inbound(&self, event: AssuranceEvent) {
        if event.control_type() == Some(commands::START_EVENT_FORWARDING) {
            info!("Inspector started event forwarding");
            self.can_forward.store(true, Ordering::SeqCst);
            self.outbound.wake();
            if !self.hub.handles(commands::START_EVENT_FORWARDING) {
                return;
            }
        }
        self.hub.dispatch(&event).await;
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Outbound,
    Inbound,
}

async fn run_socket_events(session: Weak<SessionInner>, mut events: mpsc::UnboundedReceiver<SocketEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = session.upgrade() else {
            break;
        };
        inner.handle_socket_event(event).await;
    }
    debug!("Socket event loop stopped");
}

async fn run_drain(
    session: Weak<SessionInner>,
    waker: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
    direction: Direction,
) {
    loop {
        {
            let Some(inner) = session.upgrade() else {
                break;
            };
            if inner.state() == SessionState::Terminated {
                break;
            }
            match direction {
                Direction::Outbound => inner.flush_outbound().await,
                Direction::Inbound => inner.flush_inbound().await,
            }
        }

        tokio::select! {
            _ = waker.notified() => {}
            // only ever flips to true, or the sender is gone
            _ = shutdown.changed() => break,
        }
    }
    debug!(direction = ?direction, "Drain loop stopped");
}

/// Weak handle given to plugins so they can talk back to their session.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Weak<SessionInner>,
    sequence: EventSequence,
}

impl SessionHandle {
    fn new(inner: Weak<SessionInner>, sequence: EventSequence) -> Self {
        Self { inner, sequence }
    }

    /// A handle bound to no session; every send is dropped.
    pub fn detached(sequence: EventSequence) -> Self {
        Self::new(Weak::new(), sequence)
    }

    /// Sequence to number new events with.
    pub fn sequence(&self) -> &EventSequence {
        &self.sequence
    }

    pub fn send_event(&self, event: AssuranceEvent) -> bool {
        match self.inner.upgrade() {
            Some(inner) => inner.send_event(event),
            None => {
                metrics().events_dropped_no_session.inc();
                false
            }
        }
    }

    pub fn add_client_log(&self, message: &str, visibility: LogVisibility) -> bool {
        match self.inner.upgrade() {
            Some(inner) => inner.add_client_log(message, visibility),
            None => false,
        }
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.upgrade().map(|inner| inner.session_id())
    }

    pub fn environment(&self) -> Option<Environment> {
        self.inner
            .upgrade()
            .map(|inner| inner.details.lock().environment())
    }

    pub fn host(&self) -> Option<String> {
        self.inner
            .upgrade()
            .map(|inner| inner.details.lock().host().to_string())
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| inner.state() == SessionState::Open)
    }
}
