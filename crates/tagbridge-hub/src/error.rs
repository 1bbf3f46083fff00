use crate::protocol::ProtocolError;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised by the hub and the observer server.
#[derive(Debug, Error)]
pub enum HubError {
    /// Failed to bind the listening socket
    #[error("Failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Low-level I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Message encoding or decoding error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Specialized result type for hub operations
pub type HubResult<T> = Result<T, HubError>;
