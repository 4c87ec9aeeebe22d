//! Error taxonomy for the server.
//!
//! Per-connection failures ([`ConnectionError`]) are handled where they occur
//! and only ever tear down the one connection. [`SimulationError`] means the
//! world itself is broken and ends the process.

use crate::config::ConfigError;
use shared::{LineError, PlayerId, ProtocolError};
use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("player {id} has non-finite state: position ({x}, {y}), velocity ({vx}, {vy})")]
    NonFinite {
        id: PlayerId,
        x: f32,
        y: f32,
        vx: f32,
        vy: f32,
    },
}

/// Why a single connection ended.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("peer closed the connection")]
    PeerClosed,
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    #[error("server is full ({0} connections)")]
    CapacityExhausted(usize),
    #[error("no input for {0:?}")]
    IdleTimeout(Duration),
    #[error("server is shutting down")]
    Shutdown,
}

impl From<LineError> for ConnectionError {
    fn from(e: LineError) -> Self {
        match e {
            LineError::Io(e) => ConnectionError::Transport(e),
            LineError::Protocol(e) => ConnectionError::Protocol(e),
        }
    }
}

impl ConnectionError {
    /// Normal disconnects, as opposed to failures worth a warning.
    pub fn is_graceful(&self) -> bool {
        matches!(self, ConnectionError::PeerClosed | ConnectionError::Shutdown)
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("simulation failed: {0}")]
    Simulation(#[from] SimulationError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Io(#[from] io::Error),
}
