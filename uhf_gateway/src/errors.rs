//thiserror-based error types
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use gs_protocol::NetworkEncodeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("socket create failed: {0}")]
    SocketCreateFailed(#[source] io::Error),
    #[error("invalid server address {addr}: {reason}")]
    AddressInvalid { addr: String, reason: String },
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("not connected")]
    NotConnected,
    #[error("connection closed by server")]
    Closed,
    #[error("receive timed out")]
    TimedOut,
    #[error("socket: {0}")]
    Io(#[from] io::Error),
    #[error("encode: {0}")]
    Encode(#[from] NetworkEncodeError),
}

#[derive(Error, Debug)]
pub enum RadioError {
    /// The radio must be re-initialised before it is used again.
    #[error("radio fault: {0}")]
    Fault(String),
    #[error("radio identity mismatch: expected part 0x{expected:04x}, found 0x{found:04x}")]
    IdentityMismatch { expected: u16, found: u16 },
    #[error("radio i/o: {0}")]
    Io(#[from] io::Error),
}

impl RadioError {
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_) | Self::IdentityMismatch { .. })
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("failed to spawn {name} worker: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("workers {names:?} did not stop within {grace:?}")]
    ShutdownTimeout {
        names: Vec<&'static str>,
        grace: Duration,
    },
}
