//! Server configuration
//!
//! Defaults mirror the values the server has always shipped with: port
//! 57575, ten connected players and two-player rooms. The binary builds a
//! [`ServerConfig`] from command-line arguments; tests construct one directly.

use crate::error::ServerError;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 57575;
pub const DEFAULT_MAX_PLAYERS: usize = 10;
pub const DEFAULT_ROOM_CAPACITY: usize = 2;

/// Runtime settings shared by the acceptor, matchmaker and every room.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listener to
    pub host: String,
    /// Port to listen on (0 picks an ephemeral port)
    pub port: u16,
    /// Maximum number of players connected across all rooms
    pub max_players: usize,
    /// Slots per newly created room
    pub room_capacity: usize,
    /// Size of each fixed-size read from a client
    pub buffer_size: usize,
    /// Upper bound on a single receive before the slot is skipped this cycle
    pub read_timeout: Duration,
    /// Upper bound on a single send before the player is dropped
    pub send_timeout: Duration,
    /// Silence after which a player is considered gone
    pub liveness_timeout: Duration,
    /// Minimum spacing between room loop iterations
    pub tick_interval: Duration,
    /// How often the acceptor re-checks capacity while the server is full
    pub admission_poll: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_players: DEFAULT_MAX_PLAYERS,
            room_capacity: DEFAULT_ROOM_CAPACITY,
            buffer_size: shared::DEFAULT_BUFFER_SIZE,
            read_timeout: Duration::from_millis(500),
            send_timeout: Duration::from_secs(1),
            liveness_timeout: Duration::from_secs(5),
            tick_interval: Duration::from_millis(50),
            admission_poll: Duration::from_millis(200),
        }
    }
}

impl ServerConfig {
    /// Address string handed to the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Rejects settings the room and acceptor loops cannot run with.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.max_players == 0 {
            return Err(ServerError::InvalidConfig(
                "max_players must be at least 1".to_string(),
            ));
        }
        if self.room_capacity == 0 {
            return Err(ServerError::InvalidConfig(
                "room_capacity must be at least 1".to_string(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(ServerError::InvalidConfig(
                "buffer_size must be at least 1".to_string(),
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(ServerError::InvalidConfig(
                "tick_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
