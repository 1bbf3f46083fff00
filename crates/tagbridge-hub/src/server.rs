//! WebSocket server for browser observers.
//!
//! # Architecture
//!
//! ```text
//! Browser A ┐
//!           │
//! Browser B ├──> WsServer ──> Hub (outbound queues)
//!           │        │
//! Browser N ┘        └──> Router (decoded commands)
//! ```
//!
//! Every accepted connection runs in its own task: it registers with the
//! hub (which queues the current table), forwards the observer's queue to
//! the socket, and decodes incoming text frames into commands for the
//! router. Bad frames are logged and dropped; the connection stays open.
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use tagbridge_hub::{Hub, ServerConfig, WsServer};
//! use tagbridge_storage::{AliasStore, StoreConfig};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(AliasStore::open(StoreConfig::default())?);
//! let hub = Arc::new(Hub::new(store, 64));
//! let (command_tx, _command_rx) = mpsc::channel(100);
//!
//! let server = WsServer::bind(ServerConfig::default(), hub, command_tx).await?;
//! server.run(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{HubError, HubResult};
use crate::hub::{Hub, ObserverId};
use crate::protocol::ObserverCommand;
use crate::router::CommandEnvelope;
use futures::{SinkExt, StreamExt};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tagbridge_core::constants::{DEFAULT_LISTEN_PORT, DEFAULT_MAX_OBSERVERS};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Configuration for the observer server.
///
/// ```
/// use tagbridge_hub::ServerConfig;
///
/// let config = ServerConfig::default().max_connections(10);
/// assert_eq!(config.bind_addr.port(), 3000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,

    /// Maximum number of simultaneous observers
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_LISTEN_PORT)),
            max_connections: DEFAULT_MAX_OBSERVERS,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }
}

/// Accepts observer connections.
pub struct WsServer {
    listener: TcpListener,
    hub: Arc<Hub>,
    commands: mpsc::Sender<CommandEnvelope>,
    config: ServerConfig,
}

impl WsServer {
    /// Bind the server to the configured address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is in use or not permitted.
    pub async fn bind(
        config: ServerConfig,
        hub: Arc<Hub>,
        commands: mpsc::Sender<CommandEnvelope>,
    ) -> HubResult<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| HubError::BindFailed {
                addr: config.bind_addr,
                source,
            })?;

        info!(
            addr = %listener.local_addr()?,
            max_connections = config.max_connections,
            "Observer server listening"
        );

        Ok(Self {
            listener,
            hub,
            commands,
            config,
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> HubResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` is cancelled, then close every
    /// connection and wait for it.
    pub async fn run(self, shutdown: CancellationToken) -> HubResult<()> {
        let mut connections = JoinSet::new();

        loop {
            let (stream, addr) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
            };

            while connections.try_join_next().is_some() {}

            if connections.len() >= self.config.max_connections {
                error!(
                    addr = %addr,
                    max_connections = self.config.max_connections,
                    "Connection rejected: maximum connections reached"
                );
                drop(stream);
                continue;
            }

            if let Err(e) = stream.set_nodelay(true) {
                warn!(addr = %addr, error = %e, "Failed to set TCP_NODELAY");
            }

            connections.spawn(serve_connection(
                stream,
                addr,
                self.hub.clone(),
                self.commands.clone(),
                shutdown.child_token(),
            ));
        }

        info!(open = connections.len(), "Observer server shutting down");
        while connections.join_next().await.is_some() {}
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    hub: Arc<Hub>,
    commands: mpsc::Sender<CommandEnvelope>,
    shutdown: CancellationToken,
) {
    let socket = match tokio_tungstenite::accept_async(stream).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!(addr = %addr, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    let registration = match hub.register() {
        Ok(registration) => registration,
        Err(e) => {
            error!(addr = %addr, error = %e, "Failed to register observer");
            return;
        }
    };
    let id = registration.id;
    let mut outbound = registration.outbound;
    info!(observer = %id, addr = %addr, "Observer connected");

    let (mut sink, mut source) = socket.split();

    let writer = async {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = sink.send(Message::Text(frame.to_string().into())).await {
                debug!(observer = %id, error = %e, "Write failed");
                break;
            }
        }
    };

    let reader = async {
        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                message = source.next() => message,
            };

            match message {
                Some(Ok(Message::Text(text))) => {
                    if !forward(id, text.as_str(), &commands).await {
                        break;
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    warn!(observer = %id, "Ignoring binary frame");
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(observer = %id, error = %e, "Read failed");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = writer => {}
        _ = reader => {}
    }

    hub.unregister(id);
    if let Err(e) = sink.close().await {
        trace!(observer = %id, error = %e, "Close failed");
    }
    info!(observer = %id, addr = %addr, "Observer disconnected");
}

/// Decode one text frame and hand it to the router. Returns `false` once
/// the router is gone.
async fn forward(
    id: ObserverId,
    text: &str,
    commands: &mpsc::Sender<CommandEnvelope>,
) -> bool {
    match ObserverCommand::decode(text) {
        Ok(command) => {
            debug!(observer = %id, kind = command.kind(), "Command received");
            commands
                .send(CommandEnvelope::new(id, command))
                .await
                .is_ok()
        }
        Err(e) => {
            warn!(observer = %id, error = %e, "Dropping invalid message");
            true
        }
    }
}
