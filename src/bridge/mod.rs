// WebSocket connection manager for the remote client

pub mod server;

use std::time::Duration;
use thiserror::Error;

pub use server::{BridgeServer, CLOSE_REASON_BUSY, CLOSE_REASON_SHUTDOWN};

/// Default TCP port the remote client connects to
pub const DEFAULT_PORT: u16 = 8080;

/// Default bound for the first client to connect
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("failed to bind bridge server: {0}")]
    Bind(#[source] std::io::Error),

    #[error("no remote client connected within {} s", .0.as_secs())]
    HandshakeTimeout(Duration),

    #[error("remote process unavailable: {0}")]
    RemoteProcessUnavailable(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
