//! # Arena Server Library
//!
//! Authoritative server for the arena. It owns the only real copy of the
//! world, applies client inputs as they arrive, and on a fixed period
//! advances the simulation and sends every client one snapshot of it.
//!
//! ## Architecture
//!
//! ### One Lock, Short Critical Sections
//! The world ([`game::GameState`]) and the connection registry
//! ([`client_manager::ClientManager`]) live together in
//! [`network::ServerState`] behind a single `RwLock`. Every mutation takes the
//! write lock without awaiting inside it:
//! - a connection task applies one decoded input line,
//! - a connection task registers or removes its player and client together,
//! - the broadcast loop steps the world and encodes the snapshot.
//!
//! Because the snapshot is encoded under the lock, every client receives the
//! same consistent view of one tick.
//!
//! ### Connection Tasks
//! Each accepted TCP stream gets its own task that moves through
//! Connecting, Active and Closed. Snapshots reach the socket through a bounded
//! per-connection queue drained by a writer task, so a slow client only ever
//! loses its own snapshots.
//!
//! ### TCP Text Protocol
//! Newline-terminated text lines, encoded and decoded by [`shared::protocol`]:
//! a handshake `id:<id>,<x>,<y>`, inputs `<dx>,<dy>,<fire>`, and snapshots as
//! a flat list of `<id>,<x>,<y>` triples.
//!
//! ## Module Organization
//!
//! - `physics`: vector math and the per-tick integrate, clamp, damp step
//! - `game`: players and the world keyed by id
//! - `client_manager`: id allocation, capacity, outbound queues
//! - `network`: listener, connection lifecycle, broadcast loop
//! - `config`: TOML configuration and validation
//! - `error`: error types for each layer
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use shared::Shutdown;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         port: 8888,
//!         tick_ms: 100,
//!         ..ServerConfig::default()
//!     };
//!
//!     let server = Server::bind(config).await?;
//!     let shutdown = Shutdown::new();
//!
//!     // Runs until the shutdown is triggered or the simulation fails.
//!     server.run(shutdown.signal()).await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod error;
pub mod game;
pub mod network;
pub mod physics;
