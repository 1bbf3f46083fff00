//! Observer side of the tagbridge system.
//!
//! - [`protocol`]: JSON messages exchanged with browser observers
//! - [`hub`]: registry of connected observers with non-blocking fan-out
//! - [`router`]: device events to observers, observer commands to the store
//! - [`server`]: WebSocket listener feeding the hub and the router
//!
//! # Wiring
//!
//! ```no_run
//! use std::sync::Arc;
//! use tagbridge_hub::{Hub, Router, ServerConfig, WsServer};
//! use tagbridge_storage::{AliasStore, StoreConfig};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(AliasStore::open(StoreConfig::default())?);
//! let hub = Arc::new(Hub::new(store.clone(), 64));
//! let router = Router::new(hub.clone(), store);
//!
//! let (_event_tx, event_rx) = mpsc::channel(100);
//! let (command_tx, command_rx) = mpsc::channel(100);
//! let shutdown = CancellationToken::new();
//!
//! let server = WsServer::bind(ServerConfig::default(), hub, command_tx).await?;
//! tokio::spawn(router.run(event_rx, command_rx, shutdown.clone()));
//! server.run(shutdown).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod hub;
pub mod protocol;
pub mod router;
pub mod server;

pub use error::{HubError, HubResult};
pub use hub::{Hub, ObserverId, Registration};
pub use protocol::{Frame, ObserverCommand, ProtocolError, ServerMessage};
pub use router::{CommandEnvelope, Router};
pub use server::{ServerConfig, WsServer};
