//! Room placement for newly accepted players
//!
//! The matchmaker owns the ordered list of rooms and decides where each new
//! player sits:
//! - First fit: the oldest room that is still waiting and has a free slot
//! - Otherwise a fresh room at the configured capacity
//!
//! Placement holds the room-list lock for the whole decision, so concurrent
//! callers can never both create a room for the same overflow. Closed rooms
//! (their match is over) are pruned before every placement.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::hook::GameplayHook;
use crate::room::{Room, RoomSummary};
use crate::session::PlayerSession;
use log::{debug, info};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub struct Matchmaker {
    rooms: Mutex<Vec<Arc<Room>>>,
    next_room_id: AtomicU32,
    config: Arc<ServerConfig>,
    hook: Arc<dyn GameplayHook>,
}

impl Matchmaker {
    pub fn new(config: Arc<ServerConfig>, hook: Arc<dyn GameplayHook>) -> Self {
        Self {
            rooms: Mutex::new(Vec::new()),
            next_room_id: AtomicU32::new(0),
            config,
            hook,
        }
    }

    fn rooms(&self) -> MutexGuard<'_, Vec<Arc<Room>>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seats the player in the first waiting room with space, creating a
    /// room when none has any
    ///
    /// Must be called from within a tokio runtime, since new rooms spawn
    /// their waiting loop.
    pub fn place(&self, session: PlayerSession) -> Result<Arc<Room>, ServerError> {
        let mut rooms = self.rooms();

        let before = rooms.len();
        rooms.retain(|room| !room.is_closed());
        if rooms.len() < before {
            debug!("Pruned {} closed rooms", before - rooms.len());
        }

        let mut session = session;
        for room in rooms.iter() {
            match room.accept(session) {
                Ok(_) => return Ok(Arc::clone(room)),
                Err(returned) => session = returned,
            }
        }

        let room_id = self.next_room_id.fetch_add(1, Ordering::Relaxed);

        let room = Room::spawn(
            room_id,
            self.config.room_capacity,
            Arc::clone(&self.config),
            Arc::clone(&self.hook),
        );
        if room.accept(session).is_err() {
            return Err(ServerError::RoomUnavailable);
        }

        rooms.push(Arc::clone(&room));
        info!("{} rooms open", rooms.len());
        Ok(room)
    }

    /// Players seated across every room
    pub fn connected_players(&self) -> usize {
        self.rooms().iter().map(|room| room.player_count()).sum()
    }

    pub fn room_count(&self) -> usize {
        self.rooms().len()
    }

    /// Rooms in creation order
    pub fn room_list(&self) -> Vec<Arc<Room>> {
        self.rooms().clone()
    }

    pub fn summaries(&self) -> Vec<RoomSummary> {
        self.rooms().iter().map(|room| room.summary()).collect()
    }
}
