//! # Arena Client Library
//!
//! Client side of the arena. The server is authoritative: the client never
//! simulates anything itself. It sends the keys currently held and draws
//! whatever positions the server last reported.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! The sync agent. After the handshake assigns this client a player id, two
//! duties run against the one TCP connection:
//! - the send duty writes the latest intent once per send period,
//! - the receive duty decodes snapshots and reconciles the local view.
//!
//! Either duty ending marks the session terminated, and the other stops at its
//! next wake.
//!
//! ### Game Module (`game`)
//! [`game::RemoteSnapshot`], the reconciled view: the local player's
//! authoritative position plus a roster of remote players keyed by id (or, on
//! request, by their position in the snapshot list).
//!
//! ### Input and Rendering Modules (`input`, `rendering`)
//! Thin macroquad collaborators. They only exchange plain values with the sync
//! agent through watch channels.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{connect, SyncConfig};
//! use shared::InputState;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = connect("127.0.0.1:8888", SyncConfig::default()).await?;
//!
//!     session.set_intent(InputState {
//!         right: true,
//!         ..InputState::default()
//!     });
//!
//!     let reason = session.wait_terminated().await;
//!     println!("session ended: {:?}", reason);
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
