//! Top-level controller owning at most one live session.
//!
//! Events produced before any session exists are buffered until a pairing
//! deep link arrives or the shutdown timer fires, whichever comes first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use assurance_core::{
    AssuranceEvent, ConnectionError, DeepLink, Environment, EventSequence, EventType, Payload,
    SessionDetails,
};
use parking_lot::Mutex;
use telemetry::metrics;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::plugin::Plugin;
use crate::quick_connect::QuickConnectService;
use crate::session::{Session, SessionDeps, SessionState};

/// Builds the plugin set for each new session.
pub type PluginFactory = Arc<dyn Fn() -> Vec<Arc<dyn Plugin>> + Send + Sync>;

pub struct SessionOrchestrator {
    deps: SessionDeps,
    plugins: PluginFactory,
    /// Runtime the session tasks run on, whichever thread calls in
    runtime: Handle,
    state: Mutex<OrchestratorState>,
    shutdown_timer: Mutex<Option<JoinHandle<()>>>,
    quick_connect: Mutex<Option<QuickConnectAttempt>>,
}

struct OrchestratorState {
    session: Option<Session>,
    /// Pre-session backlog; `None` once a session was created or the
    /// orchestrator shut down
    buffer: Option<Vec<AssuranceEvent>>,
    has_ever_terminated: bool,
}

struct QuickConnectAttempt {
    service: Arc<QuickConnectService>,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

#[derive(Debug, Validate)]
struct PinEntry {
    #[validate(length(min = 1))]
    pin: String,
    #[validate(required)]
    org_id: Option<String>,
}

impl PinEntry {
    fn new(pin: &str, org_id: Option<&str>) -> Self {
        Self {
            pin: pin.trim().to_string(),
            org_id: org_id.map(str::to_string),
        }
    }

    /// Pin and org id, or the error to show for the first missing one.
    fn checked(self) -> Result<(String, String), ConnectionError> {
        if let Err(errors) = self.validate() {
            let fields = errors.field_errors();
            return Err(if fields.contains_key("pin") {
                ConnectionError::NoPinCode
            } else {
                ConnectionError::NoOrgId
            });
        }
        match self.org_id {
            Some(org_id) => Ok((self.pin, org_id)),
            None => Err(ConnectionError::NoOrgId),
        }
    }
}

impl SessionOrchestrator {
    /// Binds the orchestrator to the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(deps: SessionDeps, plugins: PluginFactory) -> Arc<Self> {
        Arc::new(Self {
            deps,
            plugins,
            runtime: Handle::current(),
            state: Mutex::new(OrchestratorState {
                session: None,
                buffer: Some(Vec::new()),
                has_ever_terminated: false,
            }),
            shutdown_timer: Mutex::new(None),
            quick_connect: Mutex::new(None),
        })
    }

    pub fn event_sequence(&self) -> &EventSequence {
        &self.deps.sequence
    }

    /// Builds an event numbered from this orchestrator's sequence.
    pub fn new_event(
        &self,
        vendor: impl Into<String>,
        event_type: EventType,
        payload: Option<Payload>,
    ) -> AssuranceEvent {
        AssuranceEvent::new(&self.deps.sequence, vendor, event_type, payload)
    }

    /// The live session, if any.
    pub fn session(&self) -> Option<Session> {
        live(&self.state.lock().session).cloned()
    }

    /// Creates and starts a session seeded with the buffered events.
    /// Returns `false` if a live session already exists.
    pub fn create_session(&self, details: SessionDetails) -> bool {
        let _runtime = self.runtime.enter();
        let session = {
            let mut state = self.state.lock();
            if let Some(existing) = live(&state.session) {
                warn!(
                    existing = %existing.session_id(),
                    requested = %details.session_id(),
                    "Session already exists, ignoring create"
                );
                return false;
            }

            let backlog = state.buffer.take().unwrap_or_default();
            let session = Session::new(details, self.deps.clone(), (self.plugins)(), backlog);
            state.session = Some(session.clone());
            session
        };

        self.cancel_shutdown_timer();
        session.start();
        true
    }

    /// Creates a session from a pairing deep link. Malformed links are
    /// ignored.
    pub fn handle_deep_link(&self, link: &str) -> bool {
        let link = match DeepLink::parse(link) {
            Ok(link) => link,
            Err(e) => {
                debug!(error = %e, "Ignoring deep link");
                return false;
            }
        };

        self.cancel_shutdown_timer();
        let client_id = self.deps.identity.client_id();
        let details =
            SessionDetails::from_deep_link(&link, client_id).with_host(self.deps.config.host.clone());
        info!(
            session_id = %details.session_id(),
            environment = %details.environment(),
            "Pairing deep link received"
        );
        self.create_session(details)
    }

    /// Reconnects to the session this client was last connected to.
    pub fn resume_persisted_session(&self) -> bool {
        let Some(url) = self.deps.identity.connected_url() else {
            return false;
        };

        match SessionDetails::parse(&url) {
            Ok(details) => {
                info!(session_id = %details.session_id(), "Resuming persisted session");
                self.create_session(details)
            }
            Err(e) => {
                debug!(error = %e, "Discarding unusable persisted socket url");
                self.deps.identity.clear_connected_url();
                false
            }
        }
    }

    /// Routes an event to the live session, or buffers it before the first
    /// session. Returns `false` if the event was dropped.
    pub fn queue_event(&self, event: AssuranceEvent) -> bool {
        let mut state = self.state.lock();
        let session = live(&state.session).cloned();
        if let Some(session) = session {
            drop(state);
            return session.send_event(event);
        }

        let capacity = self.deps.config.queue_capacity;
        match state.buffer.as_mut() {
            Some(buffer) if buffer.len() < capacity => {
                buffer.push(event);
                metrics().events_queued.inc();
                true
            }
            Some(_) => {
                metrics().events_dropped_queue_full.inc();
                warn!(capacity, "Pre-session buffer full, dropping event");
                false
            }
            None => {
                metrics().events_dropped_no_session.inc();
                false
            }
        }
    }

    /// Number of events waiting for the first session.
    pub fn buffered_len(&self) -> usize {
        self.state.lock().buffer.as_ref().map_or(0, Vec::len)
    }

    /// Ends the live session and stops buffering.
    pub fn terminate_session(&self) {
        let _runtime = self.runtime.enter();
        self.cancel_shutdown_timer();
        self.stop_quick_connect();

        let session = {
            let mut state = self.state.lock();
            state.has_ever_terminated = true;
            state.buffer = None;
            state.session.take()
        };

        if let Some(session) = session {
            session.terminate();
        }
        info!("Session orchestrator terminated");
    }

    /// Whether queued events can still reach a session.
    pub fn can_process_events(&self) -> bool {
        let state = self.state.lock();
        live(&state.session).is_some() || (state.buffer.is_some() && !state.has_ever_terminated)
    }

    pub fn has_ever_terminated(&self) -> bool {
        self.state.lock().has_ever_terminated
    }

    /// Terminates after the configured delay unless a session is created
    /// first.
    pub fn start_shutdown_timer(self: &Arc<Self>) {
        let _runtime = self.runtime.enter();
        let delay = self.deps.config.shutdown_delay();
        let deadline = tokio::time::Instant::now() + delay;
        let weak: Weak<Self> = Arc::downgrade(self);

        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(orchestrator) = weak.upgrade() else {
                return;
            };
            if orchestrator.session().is_none() {
                info!(
                    delay_ms = delay.as_millis() as u64,
                    buffered = orchestrator.buffered_len(),
                    "No session started in time, dropping buffered events"
                );
                orchestrator.terminate_session();
            }
        });

        if let Some(previous) = self.shutdown_timer.lock().replace(timer) {
            previous.abort();
        }
    }

    pub fn cancel_shutdown_timer(&self) {
        if let Some(timer) = self.shutdown_timer.lock().take() {
            timer.abort();
            debug!("Shutdown timer cancelled");
        }
    }

    // UI-facing actions

    /// Shows the authorization prompt for the pending session.
    pub fn initialize_pin_screen_flow(&self) {
        match self.session() {
            Some(session) if !session.is_connected() => self.deps.presentation.request_authentication(),
            Some(_) => debug!("Session already connected, not showing prompt"),
            None => warn!("No pending session to authorize"),
        }
    }

    /// Authenticates the pending session with `pin` and the configured org
    /// id, then connects.
    pub fn pin_screen_connect_clicked(&self, pin: &str) -> Result<(), ConnectionError> {
        let Some(session) = self.session() else {
            warn!("PIN entered without a pending session");
            return Err(ConnectionError::Generic);
        };

        let (pin, org_id) = match PinEntry::new(pin, self.deps.config.org_id()).checked() {
            Ok(entry) => entry,
            Err(error) => {
                session.handle_connection_error(error.clone());
                return Err(error);
            }
        };

        session.authenticate(&pin, &org_id);
        session.start();
        Ok(())
    }

    pub fn pin_screen_cancel_clicked(&self) {
        info!("PIN entry cancelled");
        self.terminate_session();
    }

    pub fn disconnect_clicked(&self) {
        info!("Disconnect requested");
        self.terminate_session();
    }

    pub fn is_connected(&self) -> bool {
        self.session().is_some_and(|s| s.is_connected())
    }

    /// Registers this device and waits for it to be approved, then creates
    /// the approved session.
    pub fn quick_connect_clicked(self: &Arc<Self>) -> Result<(), ConnectionError> {
        let Some(org_id) = self.deps.config.org_id().map(str::to_string) else {
            self.deps.presentation.on_error(&ConnectionError::NoOrgId);
            return Err(ConnectionError::NoOrgId);
        };

        let mut attempt = self.quick_connect.lock();
        if attempt.as_ref().is_some_and(|a| !a.task.is_finished()) {
            debug!("Quick connect already in progress");
            return Ok(());
        }

        let client_id = self.deps.identity.client_id();
        let host = self.deps.config.host.clone();
        let service = QuickConnectService::new(
            &host,
            org_id.clone(),
            client_id.clone(),
            self.deps.client_info.device_name.clone(),
        )
        .map(Arc::new)
        .map_err(|e| {
            warn!(error = %e, "Quick connect unavailable");
            ConnectionError::Generic
        })?;

        let cancelled = Arc::new(AtomicBool::new(false));
        let interval = self.deps.config.device_poll_interval();
        let presentation = self.deps.presentation.clone();
        let weak = Arc::downgrade(self);
        let task = {
            let service = service.clone();
            let cancelled = cancelled.clone();
            self.runtime.spawn(async move {
                let paired = async {
                    service.register_device().await?;
                    presentation.on_waiting_for_approval();
                    service.poll_device_status(&cancelled, interval).await
                }
                .await;

                match paired {
                    Ok(paired) => {
                        let mut details = SessionDetails::new(paired.session_id, client_id, Environment::Prod)
                            .with_host(host);
                        details.authenticate(paired.token, org_id);
                        if let Some(orchestrator) = weak.upgrade() {
                            orchestrator.create_session(details);
                        }
                    }
                    Err(e) => {
                        let error = e.connection_error();
                        if error != ConnectionError::UserCancelled {
                            warn!(error = %e, "Quick connect failed");
                            presentation.on_error(&error);
                        }
                    }
                }
            })
        };

        *attempt = Some(QuickConnectAttempt {
            service,
            cancelled,
            task,
        });
        info!("Quick connect started");
        Ok(())
    }

    /// Stops waiting for approval and removes the device registration.
    pub fn quick_connect_cancelled(&self) {
        if let Some(service) = self.stop_quick_connect() {
            self.runtime.spawn(async move {
                if let Err(e) = service.delete_device().await {
                    debug!(error = %e, "Device registration not deleted");
                }
            });
        }
        self.terminate_session();
    }

    fn stop_quick_connect(&self) -> Option<Arc<QuickConnectService>> {
        let attempt = self.quick_connect.lock().take()?;
        attempt.cancelled.store(true, Ordering::SeqCst);
        attempt.task.abort();
        Some(attempt.service)
    }
}

fn live(session: &Option<Session>) -> Option<&Session> {
    session
        .as_ref()
        .filter(|s| s.state() != SessionState::Terminated)
}
