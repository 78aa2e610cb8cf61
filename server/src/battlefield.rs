//! Slot bookkeeping and the Waiting/Playing state machine of one room
//!
//! A [`Battlefield`] is plain data: it never performs I/O and never spawns
//! tasks. The async room worker in `room` owns one behind a mutex and drives
//! it; keeping the rules here makes them testable without sockets.

use crate::session::{Link, PlayerSession};
use serde::Serialize;
use std::fmt;

/// Lifecycle of a room; the only transition is Waiting → Playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RoomState {
    Waiting,
    Playing,
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomState::Waiting => f.write_str("waiting"),
            RoomState::Playing => f.write_str("playing"),
        }
    }
}

#[derive(Debug)]
pub struct Battlefield {
    slots: Vec<Option<PlayerSession>>,
    state: RoomState,
    /// Encoded records of every occupant, rebuilt once per loop iteration
    broadcast: String,
}

impl Battlefield {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            state: RoomState::Waiting,
            broadcast: String::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn player_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.is_none())
    }

    pub fn has_available_slot(&self) -> bool {
        self.slots.iter().any(|slot| slot.is_none())
    }

    pub fn is_full(&self) -> bool {
        !self.has_available_slot()
    }

    /// True once every slot is taken and every occupant is ready
    pub fn everyone_ready(&self) -> bool {
        self.is_full() && self.players().all(PlayerSession::is_ready)
    }

    /// True while playing with exactly one occupant still alive
    pub fn winner_decided(&self) -> bool {
        self.state == RoomState::Playing
            && self.players().filter(|player| player.is_alive()).count() == 1
    }

    /// The surviving player once a winner is decided
    pub fn winner(&self) -> Option<&PlayerSession> {
        if !self.winner_decided() {
            return None;
        }
        self.players().find(|player| player.is_alive())
    }

    /// Puts the player in the first empty slot, handing it back if there is none
    pub fn accept(&mut self, session: PlayerSession) -> Result<usize, PlayerSession> {
        match self.slots.iter().position(Option::is_none) {
            Some(index) => {
                self.slots[index] = Some(session);
                Ok(index)
            }
            None => Err(session),
        }
    }

    /// Frees the slot held by `player_id`
    pub fn remove(&mut self, player_id: u64) -> Option<PlayerSession> {
        self.slots
            .iter_mut()
            .find(|slot| matches!(slot, Some(player) if player.id() == player_id))
            .and_then(Option::take)
    }

    /// Empties every slot, returning the sessions that were in them
    pub fn drain(&mut self) -> Vec<PlayerSession> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerSession> {
        self.slots.iter().flatten()
    }

    pub fn player(&self, player_id: u64) -> Option<&PlayerSession> {
        self.players().find(|player| player.id() == player_id)
    }

    pub fn player_mut(&mut self, player_id: u64) -> Option<&mut PlayerSession> {
        self.slots
            .iter_mut()
            .flatten()
            .find(|player| player.id() == player_id)
    }

    /// Connection handles of every occupant, in slot order
    pub fn links(&self) -> Vec<(u64, Link)> {
        self.players()
            .map(|player| (player.id(), player.link()))
            .collect()
    }

    /// Moves the room to Playing if everyone is ready
    ///
    /// Returns true only for the call that performed the transition, so the
    /// caller can start exactly one match.
    pub fn begin_match(&mut self) -> bool {
        if self.state != RoomState::Waiting || !self.everyone_ready() {
            return false;
        }
        self.state = RoomState::Playing;
        true
    }

    /// Re-encodes every occupant's record into the broadcast buffer
    pub fn rebuild_broadcast(&mut self) -> &str {
        self.broadcast = shared::join_records(self.players().map(PlayerSession::record));
        &self.broadcast
    }

    pub fn broadcast(&self) -> &str {
        &self.broadcast
    }
}
