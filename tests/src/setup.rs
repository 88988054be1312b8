//! Common test setup functions.

use std::sync::Arc;
use std::time::Duration;

use assurance_core::{ClientInfo, EventSequence, IdentityStore, MemoryStore, SessionDetails};
use session::{
    AuthorizationFlow, Plugin, PluginFactory, Presentation, Session, SessionConfig, SessionDeps,
    SessionOrchestrator,
};

use crate::fixtures::ORG_ID;
use crate::mocks::{MockSocket, MockSocketFactory, RecordingPresenter};

/// Sessions wired to mock collaborators.
///
/// Everything a session touches is observable: the socket factory keeps
/// each socket, the presenter records UI calls, and the identity store is
/// in memory.
pub struct TestContext {
    pub factory: Arc<MockSocketFactory>,
    pub presenter: Arc<RecordingPresenter>,
    pub identity: IdentityStore,
    pub sequence: EventSequence,
    pub config: SessionConfig,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(SessionConfig {
            org_id: Some(ORG_ID.to_string()),
            ..SessionConfig::default()
        })
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            factory: Arc::new(MockSocketFactory::new()),
            presenter: Arc::new(RecordingPresenter::new()),
            identity: IdentityStore::new(Arc::new(MemoryStore::new())),
            sequence: EventSequence::new(),
            config,
        }
    }

    pub fn deps(&self) -> SessionDeps {
        SessionDeps {
            socket_factory: self.factory.clone(),
            identity: self.identity.clone(),
            presentation: Presentation::new(
                AuthorizationFlow::Pin(self.presenter.clone()),
                self.presenter.clone(),
            ),
            client_info: ClientInfo {
                device_name: "test-device".into(),
                ..ClientInfo::default()
            },
            config: self.config.clone(),
            sequence: self.sequence.clone(),
        }
    }

    /// A session with the given plugins and no backlog.
    pub fn session(&self, details: SessionDetails, plugins: Vec<Arc<dyn Plugin>>) -> Session {
        Session::new(details, self.deps(), plugins, Vec::new())
    }

    /// An orchestrator whose sessions all get `plugins`.
    pub fn orchestrator(&self, plugins: Vec<Arc<dyn Plugin>>) -> Arc<SessionOrchestrator> {
        let factory: PluginFactory = Arc::new(move || plugins.clone());
        SessionOrchestrator::new(self.deps(), factory)
    }

    /// Socket of the most recent session.
    pub fn socket(&self) -> Arc<MockSocket> {
        self.factory
            .latest()
            .expect("no session has created a socket yet")
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Lets spawned session tasks run until they are idle.
///
/// Under a paused clock this only advances time by a millisecond.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
