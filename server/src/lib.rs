//! # Battlefield Server Library
//!
//! This library provides a room-based multiplayer lobby and match server.
//! Clients connect over TCP, are seated in fixed-capacity rooms, toggle their
//! readiness while the room waits, and play a match once every seat is taken
//! and everyone is ready. The server relays each player's record to the rest
//! of the room on every loop iteration.
//!
//! ## Core Responsibilities
//!
//! ### Admission
//! A global cap on connected players. While the server is full the acceptor
//! stops taking connections, leaving newcomers queued by the operating system
//! until someone leaves.
//!
//! ### Matchmaking
//! New players go to the oldest waiting room with a free seat; a new room is
//! created only when none has space.
//!
//! ### Room Lifecycle
//! Rooms move from Waiting to Playing exactly once. The match ends when one
//! player is left alive or the room empties, after which the room closes.
//!
//! ## Wire Protocol
//!
//! Plain text over TCP:
//! - A player record is `id|name|alive|score`, with `alive` as `1` or `0`
//! - Several records are concatenated with the same `|` separator
//! - Server frames are `tag\n` or `tag|records\n`, where the tag is one of
//!   `waiting`, `start` or `playing`
//! - Clients send their own record, the word `ready`, or a free-form request
//!   that the installed [`hook::GameplayHook`] interprets during a match
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! Connections with timeout-bounded reads and writes, plus per-player state.
//!
//! ### Battlefield Module (`battlefield`)
//! The slot table and state machine of a single room, free of I/O.
//!
//! ### Room Module (`room`)
//! The async waiting and match loops that drive a battlefield.
//!
//! ### Matchmaker Module (`matchmaker`)
//! The ordered room list and first-fit placement.
//!
//! ### Network Module (`network`)
//! The listener, admission control and accept loop.
//!
//! ### Console Module (`console`)
//! Operator commands read from stdin by the binary.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new(ServerConfig {
//!         port: 57575,
//!         max_players: 10,
//!         room_capacity: 2,
//!         ..ServerConfig::default()
//!     })?;
//!
//!     // Accepting runs on a background task until `stop` is called
//!     let addr = server.begin_listening().await?;
//!     println!("Listening on {addr}");
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop()?;
//!     Ok(())
//! }
//! ```

pub mod battlefield;
pub mod config;
pub mod console;
pub mod error;
pub mod hook;
pub mod matchmaker;
pub mod network;
pub mod room;
pub mod session;
