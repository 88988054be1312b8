//! tokio-tungstenite implementation of [`SocketConnection`].
//!
//! Each `connect` spawns one task that performs the handshake and then reads
//! frames until the connection ends. Writes go through the shared sink half.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assurance_core::{AssuranceEvent, CloseCode, Error, EventSequence, Result};
use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::SocketConfig;
use crate::connection::{SocketConnection, SocketEvent, SocketFactory, SocketListener, SocketState};
use crate::tls::create_tls_config;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Creates [`WebSocket`]s sharing one TLS configuration and event sequence.
///
/// Must be built inside a tokio runtime; sockets it creates run their I/O on
/// that runtime regardless of which thread drives them.
pub struct WebSocketFactory {
    config: SocketConfig,
    sequence: EventSequence,
    tls: Arc<rustls::ClientConfig>,
    runtime: Handle,
}

impl WebSocketFactory {
    pub fn new(config: SocketConfig, sequence: EventSequence) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::transport(format!("no tokio runtime: {e}")))?;
        Ok(Self {
            config,
            sequence,
            tls: create_tls_config()?,
            runtime,
        })
    }
}

impl SocketFactory for WebSocketFactory {
    fn create(&self, listener: SocketListener) -> Arc<dyn SocketConnection> {
        Arc::new(WebSocket::new(
            self.config.clone(),
            self.sequence.clone(),
            self.tls.clone(),
            self.runtime.clone(),
            listener,
        ))
    }
}

/// A WebSocket connection reporting to a single listener.
pub struct WebSocket {
    inner: Arc<Inner>,
}

struct Inner {
    config: SocketConfig,
    sequence: EventSequence,
    tls: Arc<rustls::ClientConfig>,
    runtime: Handle,
    listener: SocketListener,
    state: RwLock<SocketState>,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    /// Set when we initiated the close
    closing: AtomicBool,
}

impl WebSocket {
    pub fn new(
        config: SocketConfig,
        sequence: EventSequence,
        tls: Arc<rustls::ClientConfig>,
        runtime: Handle,
        listener: SocketListener,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                sequence,
                tls,
                runtime,
                listener,
                state: RwLock::new(SocketState::Idle),
                sink: tokio::sync::Mutex::new(None),
                closing: AtomicBool::new(false),
            }),
        }
    }
}

#[async_trait]
impl SocketConnection for WebSocket {
    fn connect(&self, url: &Url) {
        {
            let mut state = self.inner.state.write();
            let current = *state;
            if matches!(current, SocketState::Open | SocketState::Connecting) {
                debug!(state = %current, "Socket already connected or connecting, ignoring connect");
                return;
            }
            *state = SocketState::Connecting;
        }
        self.inner.emit(SocketEvent::StateChanged(SocketState::Connecting));
        self.inner.closing.store(false, Ordering::SeqCst);

        let inner = self.inner.clone();
        let url = url.clone();
        self.inner.runtime.spawn(async move {
            inner.run(url).await;
        });
    }

    fn disconnect(&self) {
        if matches!(*self.inner.state.read(), SocketState::Idle | SocketState::Closed) {
            return;
        }
        self.inner.closing.store(true, Ordering::SeqCst);

        let inner = self.inner.clone();
        self.inner.runtime.spawn(async move {
            inner.close().await;
        });
    }

    async fn send(&self, event: &AssuranceEvent) -> Result<()> {
        if self.state() != SocketState::Open {
            return Err(Error::transport("socket is not open"));
        }

        let text = event.encode()?;
        let mut sink = self.inner.sink.lock().await;
        let sink = sink
            .as_mut()
            .ok_or_else(|| Error::transport("socket is not open"))?;

        sink.send(Message::Text(text))
            .await
            .map_err(|e| Error::transport(format!("send failed: {e}")))
    }

    fn state(&self) -> SocketState {
        *self.inner.state.read()
    }
}

impl Inner {
    fn emit(&self, event: SocketEvent) {
        // receiver gone means the session is gone
        let _ = self.listener.send(event);
    }

    fn set_state(&self, state: SocketState) {
        *self.state.write() = state;
        self.emit(SocketEvent::StateChanged(state));
    }

    fn fail_connect(&self, reason: String) {
        warn!(reason = %reason, "Socket connection failed");
        self.emit(SocketEvent::Error(reason.clone()));
        self.set_state(SocketState::Closed);
        self.emit(SocketEvent::Disconnected {
            close_code: CloseCode::Abnormal,
            reason,
            was_clean: false,
        });
    }

    async fn run(self: Arc<Self>, url: Url) {
        debug!(host = url.host_str().unwrap_or_default(), "Connecting socket");

        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let attempt = tokio::time::timeout(
            timeout,
            connect_async_tls_with_config(
                url.as_str(),
                None,
                self.config.disable_nagle,
                Some(Connector::Rustls(self.tls.clone())),
            ),
        )
        .await;

        let ws = match attempt {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => return self.fail_connect(e.to_string()),
            Err(_) => return self.fail_connect(format!("timed out after {}ms", timeout.as_millis())),
        };

        let (sink, mut stream) = ws.split();
        *self.sink.lock().await = Some(sink);

        if self.closing.load(Ordering::SeqCst) {
            // disconnect() raced the handshake
            self.close().await;
        } else {
            self.set_state(SocketState::Open);
            self.emit(SocketEvent::Connected);
            info!("Socket connected");
        }

        let (code, reason, was_clean) = loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => match AssuranceEvent::decode(&text, &self.sequence) {
                    Ok(event) => self.emit(SocketEvent::Received(event)),
                    Err(e) => warn!(error = %e, "Dropping undecodable frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.into_owned(), true),
                        None if self.closing.load(Ordering::SeqCst) => {
                            (CloseCode::Normal.as_u16(), String::new(), true)
                        }
                        None => (u16::from(WsCloseCode::Status), String::new(), true),
                    };
                }
                // ping/pong are answered by tungstenite
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.emit(SocketEvent::Error(e.to_string()));
                    break (CloseCode::Abnormal.as_u16(), e.to_string(), false);
                }
                None if self.closing.load(Ordering::SeqCst) => {
                    break (CloseCode::Normal.as_u16(), String::new(), true);
                }
                None => break (CloseCode::Abnormal.as_u16(), String::new(), false),
            }
        };

        *self.sink.lock().await = None;
        self.set_state(SocketState::Closed);
        info!(close_code = code, reason = %reason, "Socket disconnected");
        self.emit(SocketEvent::Disconnected {
            close_code: CloseCode::from_u16(code),
            reason,
            was_clean,
        });
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        if let Some(sink) = sink.as_mut() {
            let frame = CloseFrame {
                code: WsCloseCode::Normal,
                reason: "".into(),
            };
            if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                debug!(error = %e, "Close frame not delivered");
            }
        }
    }
}
