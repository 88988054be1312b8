//! Assurance client
//!
//! Pairs this host with a remote inspection session and streams diagnostic
//! events to it:
//! - pairing by deep link (first argument) plus PIN, or by quick connect
//! - a persisted session is resumed when no link is given
//! - stdin drives the session; any unrecognized line is forwarded as a log line

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use assurance_core::{
    AssuranceEvent, ClientInfo, ConnectionError, Error, EventType, FileStore, IdentityStore,
    Payload, DEFAULT_VENDOR,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use session::plugins::{
    ConfigModifyPlugin, ConfigSink, EventDispatcher, FakeEventPlugin, LogForwardingPlugin,
    ScreenshotPlugin, ScreenshotProvider, SyntheticEvent,
};
use session::{
    AuthorizationFlow, HttpBlobUploader, PinPrompt, Plugin, PluginFactory, Presentation,
    QuickConnectPrompt, SessionConfig, SessionDeps, SessionOrchestrator, StatusPresenter,
};
use socket::{SocketConfig, WebSocketFactory};
use telemetry::{init_tracing, metrics, LoggingConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Config {
    /// File holding the client id and last connected socket URL
    #[serde(default = "default_state_path")]
    state_path: String,

    /// Pair with quick connect instead of a PIN
    #[serde(default)]
    quick_connect: bool,

    /// Seconds between heartbeat events; 0 disables them
    #[serde(default = "default_heartbeat_secs")]
    heartbeat_secs: u64,

    #[serde(default)]
    session: SessionConfig,

    #[serde(default)]
    socket: SocketConfig,

    #[serde(default)]
    logging: LoggingConfig,

    #[serde(default)]
    client: ClientInfo,
}

fn default_state_path() -> String {
    ".assurance/state.json".to_string()
}

fn default_heartbeat_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            quick_connect: false,
            heartbeat_secs: default_heartbeat_secs(),
            session: SessionConfig::default(),
            socket: SocketConfig::default(),
            logging: LoggingConfig::default(),
            client: ClientInfo::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // rustls 0.23 needs a process-wide crypto provider before any TLS handshake
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();

    let config = load_config()?;
    init_tracing(&config.logging);

    info!("Starting assurance client v{}", env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.session.host,
        org_id = config.session.org_id().unwrap_or("none"),
        state_path = %config.state_path,
        quick_connect = config.quick_connect,
        "Loaded configuration"
    );

    let store = FileStore::open(&config.state_path).context("Failed to open state file")?;
    let identity = IdentityStore::new(Arc::new(store));
    let sequence = assurance_core::EventSequence::new();

    let socket_factory = WebSocketFactory::new(config.socket.clone(), sequence.clone())
        .context("Failed to create socket factory")?;

    let console = Arc::new(ConsolePresenter);
    let flow = if config.quick_connect {
        AuthorizationFlow::QuickConnect(console.clone())
    } else {
        AuthorizationFlow::Pin(console.clone())
    };
    let presentation = Presentation::new(flow, console);

    let (log_lines, _) = broadcast::channel::<String>(256);
    let uploader = Arc::new(
        HttpBlobUploader::new(config.session.host.clone()).context("Failed to create blob uploader")?,
    );
    let plugins: PluginFactory = {
        let log_lines = log_lines.clone();
        Arc::new(move || -> Vec<Arc<dyn Plugin>> {
            vec![
                Arc::new(ConfigModifyPlugin::new(Arc::new(LoggingConfigSink))),
                Arc::new(FakeEventPlugin::new(Arc::new(LoggingDispatcher))),
                Arc::new(LogForwardingPlugin::new(Arc::new(log_lines.clone()))),
                Arc::new(ScreenshotPlugin::new(Arc::new(NoScreen), uploader.clone())),
            ]
        })
    };

    let deps = SessionDeps {
        socket_factory: Arc::new(socket_factory),
        identity,
        presentation,
        client_info: config.client.clone(),
        config: config.session.clone(),
        sequence,
    };
    let orchestrator = SessionOrchestrator::new(deps, plugins);

    match std::env::args().nth(1) {
        Some(link) => {
            if !orchestrator.handle_deep_link(&link) {
                warn!(link = %link, "Argument is not a pairing link");
                orchestrator.start_shutdown_timer();
            }
        }
        None => {
            if !orchestrator.resume_persisted_session() {
                info!("No session to resume, waiting for `link <url>` on stdin");
                orchestrator.start_shutdown_timer();
            }
        }
    }

    let _commands = tokio::spawn(read_commands(orchestrator.clone(), log_lines));
    let _heartbeat = (config.heartbeat_secs > 0).then(|| {
        tokio::spawn(heartbeat(
            orchestrator.clone(),
            Duration::from_secs(config.heartbeat_secs),
        ))
    });

    shutdown_signal().await;

    info!("Shutting down...");
    orchestrator.terminate_session();

    match serde_json::to_string(&metrics().snapshot()) {
        Ok(snapshot) => info!(metrics = %snapshot, "Final metrics"),
        Err(e) => error!(error = %e, "Failed to encode metrics"),
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("ASSURANCE")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Single-underscore names for the settings people actually set by hand
    if let Ok(org_id) = std::env::var("ASSURANCE_ORG_ID") {
        config.session.org_id = Some(org_id);
    }
    if let Ok(host) = std::env::var("ASSURANCE_HOST") {
        config.session.host = host;
    }
    if let Ok(path) = std::env::var("ASSURANCE_STATE_PATH") {
        config.state_path = path;
    }

    Ok(config)
}

/// Reads stdin commands until it closes:
/// `link <url>`, `pin <code>`, `connect`, `cancel`, `disconnect`,
/// `event <json object>`. Anything else becomes a forwarded log line.
async fn read_commands(orchestrator: Arc<SessionOrchestrator>, log_lines: broadcast::Sender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => run_command(&orchestrator, &log_lines, line.trim()),
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        }
    }
    info!("Stdin closed, commands disabled");
}

fn run_command(orchestrator: &Arc<SessionOrchestrator>, log_lines: &broadcast::Sender<String>, line: &str) {
    let (command, argument) = line.split_once(' ').unwrap_or((line, ""));
    match command {
        "" => {}
        "link" => {
            if !orchestrator.handle_deep_link(argument.trim()) {
                warn!("Not a pairing link, or a session is already running");
            }
        }
        "pin" => {
            if let Err(e) = orchestrator.pin_screen_connect_clicked(argument) {
                warn!(error = %e, "PIN not accepted");
            }
        }
        "connect" => {
            if let Err(e) = orchestrator.quick_connect_clicked() {
                warn!(error = %e, "Quick connect not started");
            }
        }
        "cancel" => {
            if orchestrator.is_connected() {
                warn!("Already connected, use `disconnect`");
            } else {
                orchestrator.quick_connect_cancelled();
            }
        }
        "disconnect" => orchestrator.disconnect_clicked(),
        "event" => match serde_json::from_str::<Payload>(argument) {
            Ok(payload) => {
                let event = orchestrator.new_event(DEFAULT_VENDOR, EventType::Generic, Some(payload));
                if !orchestrator.queue_event(event) {
                    warn!("Event dropped");
                }
            }
            Err(e) => warn!(error = %e, "`event` expects a JSON object"),
        },
        _ => {
            // no receiver unless log forwarding is on
            let _ = log_lines.send(line.to_string());
        }
    }
}

async fn heartbeat(orchestrator: Arc<SessionOrchestrator>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    let mut beats: u64 = 0;
    loop {
        interval.tick().await;
        if !orchestrator.can_process_events() {
            continue;
        }
        beats += 1;
        let payload = serde_json::json!({ "heartbeat": beats });
        let event: AssuranceEvent =
            orchestrator.new_event(DEFAULT_VENDOR, EventType::Generic, payload.as_object().cloned());
        orchestrator.queue_event(event);
    }
}

/// Reports session status through the log.
struct ConsolePresenter;

impl StatusPresenter for ConsolePresenter {
    fn on_connected(&self) {
        info!("Connected to inspection session");
    }

    fn on_reconnecting(&self) {
        warn!("Connection lost, reconnecting");
    }

    fn on_disconnected(&self) {
        info!("Disconnected from inspection session");
    }

    fn on_error(&self, error: &ConnectionError) {
        error!(
            title = error.title(),
            retry = error.should_retry(),
            "{}",
            error.description()
        );
    }
}

impl PinPrompt for ConsolePresenter {
    fn show_pin_prompt(&self) {
        info!("Enter the PIN shown by the inspector: `pin <code>`");
    }
}

impl QuickConnectPrompt for ConsolePresenter {
    fn show_quick_connect(&self) {
        info!("Type `connect` to register this device, `cancel` to stop");
    }

    fn on_waiting_for_approval(&self) {
        info!("Waiting for the device to be approved in the inspector");
    }
}

/// Logs configuration overrides; this host has no runtime configuration.
struct LoggingConfigSink;

impl ConfigSink for LoggingConfigSink {
    fn update(&self, values: &Payload) {
        for (key, value) in values {
            info!(key = %key, value = %value, "Configuration override");
        }
    }

    fn revert(&self, keys: &[String]) {
        info!(keys = ?keys, "Configuration overrides reverted");
    }
}

struct LoggingDispatcher;

impl EventDispatcher for LoggingDispatcher {
    fn dispatch(&self, event: SyntheticEvent) {
        info!(
            name = %event.event_name,
            event_type = %event.event_type,
            source = %event.event_source,
            "Synthetic event received"
        );
    }
}

/// Headless hosts have nothing to capture.
struct NoScreen;

#[async_trait]
impl ScreenshotProvider for NoScreen {
    async fn capture(&self) -> assurance_core::Result<Vec<u8>> {
        Err(Error::internal("screen capture is not available on this host"))
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
