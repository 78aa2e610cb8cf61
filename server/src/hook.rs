//! Extension point for match rules
//!
//! The session server only runs the substrate: slots, readiness, liveness
//! and snapshots. Anything a client sends during a match that is not a
//! player record is handed to a [`GameplayHook`], which may adjust scores or
//! eliminate players. Hooks run inside the room's worker with the room
//! locked, so they must not block.

use crate::session::PlayerSession;

pub trait GameplayHook: Send + Sync {
    /// Handles one request from `player` while the room is playing
    fn handle_request(&self, _room_id: u32, _player: &mut PlayerSession, _request: &str) {}

    /// Called once for every elimination, after the room has processed it
    fn on_player_lost(&self, _room_id: u32, _player_id: u64) {}
}

/// Rule set that ignores every request
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRules;

impl GameplayHook for NoRules {}
