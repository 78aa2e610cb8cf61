//! Per-room worker loops
//!
//! Each room runs two tasks over its lifetime:
//! - **Waiting loop**: spawned at creation. Every tick it reads one message
//!   from each occupant, applies it, then sends `waiting` plus a snapshot of
//!   every record to everyone.
//! - **Match loop**: spawned exactly once, when the room is full and every
//!   occupant is ready. It announces `start`, then repeats the same
//!   read-all/broadcast-all cycle with the `playing` tag until a single
//!   player is left alive or the room empties, and finally closes the room.
//!
//! Reads are sequential per slot but bounded by `read_timeout`, so a quiet
//! client delays its room by at most that much per iteration. Clients that
//! hang up, fail a send, or stay silent past `liveness_timeout` are evicted.
//!
//! The slot table lives behind a std mutex that is never held across an
//! await; socket I/O happens on per-connection async locks. An async "turn"
//! lock keeps the two loops from interleaving their frames during the
//! hand-over.

use crate::battlefield::{Battlefield, RoomState};
use crate::config::ServerConfig;
use crate::error::SessionError;
use crate::hook::GameplayHook;
use crate::session::{PlayerEvent, PlayerSession, PlayerSummary};
use log::{debug, info, warn};
use serde::Serialize;
use shared::{ClientMessage, PLAYING_TAG, START_TAG, WAITING_TAG};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::time::{interval, MissedTickBehavior};

/// Snapshot of a room for listings
#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    pub id: u32,
    pub state: RoomState,
    pub capacity: usize,
    pub closed: bool,
    pub players: Vec<PlayerSummary>,
}

pub struct Room {
    id: u32,
    config: Arc<ServerConfig>,
    hook: Arc<dyn GameplayHook>,
    field: Mutex<Battlefield>,
    closed: AtomicBool,
    matches_started: AtomicUsize,
    io_turn: AsyncMutex<()>,
    events_tx: mpsc::UnboundedSender<PlayerEvent>,
    events_rx: Mutex<mpsc::UnboundedReceiver<PlayerEvent>>,
}

impl Room {
    /// Creates a room without starting its waiting loop
    pub fn new(
        id: u32,
        capacity: usize,
        config: Arc<ServerConfig>,
        hook: Arc<dyn GameplayHook>,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            id,
            config,
            hook,
            field: Mutex::new(Battlefield::new(capacity)),
            closed: AtomicBool::new(false),
            matches_started: AtomicUsize::new(0),
            io_turn: AsyncMutex::new(()),
            events_tx,
            events_rx: Mutex::new(events_rx),
        })
    }

    /// Creates a room and spawns its waiting loop on the current runtime
    pub fn spawn(
        id: u32,
        capacity: usize,
        config: Arc<ServerConfig>,
        hook: Arc<dyn GameplayHook>,
    ) -> Arc<Self> {
        let room = Self::new(id, capacity, config, hook);
        tokio::spawn(Arc::clone(&room).run_waiting());
        info!("Room {} created with {} slots", id, capacity);
        room
    }

    fn field(&self) -> MutexGuard<'_, Battlefield> {
        self.field.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.field().capacity()
    }

    pub fn state(&self) -> RoomState {
        self.field().state()
    }

    pub fn player_count(&self) -> usize {
        self.field().player_count()
    }

    pub fn is_empty(&self) -> bool {
        self.field().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.field().is_full()
    }

    pub fn everyone_ready(&self) -> bool {
        self.field().everyone_ready()
    }

    pub fn winner_decided(&self) -> bool {
        self.field().winner_decided()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// How many match loops this room has spawned (0 or 1)
    pub fn matches_started(&self) -> usize {
        self.matches_started.load(Ordering::SeqCst)
    }

    pub fn players(&self) -> Vec<PlayerSummary> {
        self.field().players().map(PlayerSession::summary).collect()
    }

    pub fn summary(&self) -> RoomSummary {
        let field = self.field();
        RoomSummary {
            id: self.id,
            state: field.state(),
            capacity: field.capacity(),
            closed: self.is_closed(),
            players: field.players().map(PlayerSession::summary).collect(),
        }
    }

    /// Whether a newcomer could be seated here right now
    pub fn accepts_players(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        let field = self.field();
        field.state() == RoomState::Waiting && field.has_available_slot()
    }

    /// Seats a player in the first free slot
    ///
    /// Only waiting rooms take players. When the player fills the room the
    /// start condition is evaluated immediately.
    pub fn accept(self: &Arc<Self>, mut session: PlayerSession) -> Result<usize, PlayerSession> {
        if self.is_closed() {
            return Err(session);
        }

        let player_id = session.id();
        let (slot, filled) = {
            let mut field = self.field();
            if field.state() != RoomState::Waiting || !field.has_available_slot() {
                return Err(session);
            }
            session.attach(self.events_tx.clone());
            let slot = field.accept(session)?;
            (slot, field.is_full())
        };

        info!("Player {} joined room {} in slot {}", player_id, self.id, slot);
        if filled {
            info!("Room {} is full", self.id);
            self.start_match_if_ready();
        }
        Ok(slot)
    }

    /// Flips a player's readiness; the room reacts when it drains its events
    pub fn toggle_ready(&self, player_id: u64) -> Option<bool> {
        self.field()
            .player_mut(player_id)
            .map(PlayerSession::toggle_ready)
    }

    /// Frees the player's slot; dropping the session closes its connection
    pub fn remove_player(&self, player_id: u64) -> Option<PlayerSession> {
        let removed = self.field().remove(player_id);
        if removed.is_some() {
            info!("Player {} removed from room {}", player_id, self.id);
        }
        removed
    }

    /// Starts the match if the room is full and everyone is ready
    ///
    /// Safe to call any number of times: the state check and the switch to
    /// Playing happen under one lock, so only one caller ever wins.
    pub fn start_match_if_ready(self: &Arc<Self>) -> bool {
        if !self.field().begin_match() {
            return false;
        }
        self.matches_started.fetch_add(1, Ordering::SeqCst);
        info!("Room {}: everyone is ready, starting match", self.id);
        tokio::spawn(Arc::clone(self).run_match());
        true
    }

    /// Drains readiness and elimination notifications raised by players
    pub fn process_events(self: &Arc<Self>) {
        let events: Vec<PlayerEvent> = {
            let mut events_rx = self
                .events_rx
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::iter::from_fn(|| events_rx.try_recv().ok()).collect()
        };

        for event in events {
            match event {
                PlayerEvent::ReadyToggled { player_id, ready } => {
                    debug!(
                        "Player {} in room {} is {}",
                        player_id,
                        self.id,
                        if ready { "ready" } else { "not ready" }
                    );
                    self.start_match_if_ready();
                }
                PlayerEvent::Lost { player_id } => {
                    info!("Player {} eliminated in room {}", player_id, self.id);
                    self.hook.on_player_lost(self.id, player_id);
                }
            }
        }
    }

    async fn run_waiting(self: Arc<Self>) {
        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            {
                let _turn = self.io_turn.lock().await;
                if self.is_closed() || self.state() != RoomState::Waiting {
                    break;
                }
                if !self.is_empty() {
                    self.exchange(RoomState::Waiting).await;
                }
            }
            self.process_events();
        }

        debug!("Room {} waiting loop finished", self.id);
    }

    async fn run_match(self: Arc<Self>) {
        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        {
            let _turn = self.io_turn.lock().await;
            let frame = {
                let mut field = self.field();
                shared::status_frame(START_TAG, field.rebuild_broadcast())
            };
            self.send_all(&frame).await;
        }

        loop {
            ticker.tick().await;
            {
                let _turn = self.io_turn.lock().await;
                if !self.match_continues() {
                    break;
                }
                self.exchange(RoomState::Playing).await;
            }
            self.process_events();
        }

        self.close();
    }

    fn match_continues(&self) -> bool {
        let field = self.field();
        !field.is_empty() && field.state() == RoomState::Playing && !field.winner_decided()
    }

    /// One read-all, apply, broadcast-all cycle
    async fn exchange(&self, phase: RoomState) {
        let links = self.field().links();

        let mut inbound = Vec::with_capacity(links.len());
        for (player_id, link) in links {
            let mut connection = link.lock().await;
            let peer = connection.peer();
            let result = connection.receive(self.config.read_timeout).await;
            inbound.push((player_id, peer, result));
        }

        let frame = {
            let mut field = self.field();
            for (player_id, peer, result) in inbound {
                self.apply_inbound(&mut field, player_id, peer, result, phase);
            }
            let tag = match phase {
                RoomState::Waiting => WAITING_TAG,
                RoomState::Playing => PLAYING_TAG,
            };
            shared::status_frame(tag, field.rebuild_broadcast())
        };

        self.send_all(&frame).await;
    }

    fn apply_inbound(
        &self,
        field: &mut Battlefield,
        player_id: u64,
        peer: Option<SocketAddr>,
        result: Result<Vec<u8>, SessionError>,
        phase: RoomState,
    ) {
        let Some(player) = field.player_mut(player_id) else {
            return;
        };

        match result {
            Ok(data) => {
                player.touch();
                match ClientMessage::parse(&data) {
                    ClientMessage::Empty => {}
                    ClientMessage::Ready if phase == RoomState::Waiting => {
                        player.toggle_ready();
                    }
                    ClientMessage::Ready => {
                        debug!("Ignoring ready from player {} during match", player_id);
                    }
                    ClientMessage::Record(record) if phase == RoomState::Playing => {
                        player.apply_record(record);
                    }
                    ClientMessage::Record(record) => player.apply_profile(record),
                    ClientMessage::Malformed(text) => {
                        debug!(
                            "Discarding malformed record from player {}: {:?}",
                            player_id, text
                        );
                    }
                    ClientMessage::Request(request) if phase == RoomState::Playing => {
                        self.hook.handle_request(self.id, player, &request);
                    }
                    ClientMessage::Request(request) => {
                        debug!(
                            "Ignoring request {:?} from player {} before the match",
                            request, player_id
                        );
                    }
                }
            }
            Err(e) if !e.is_fatal() => {
                if player.is_timed_out(self.config.liveness_timeout) {
                    warn!(
                        "Player {} ({}) in room {} timed out",
                        player_id,
                        peer_label(peer),
                        self.id
                    );
                    field.remove(player_id);
                }
            }
            Err(e) => {
                info!(
                    "Player {} ({}) left room {}: {}",
                    player_id,
                    peer_label(peer),
                    self.id,
                    e
                );
                field.remove(player_id);
            }
        }
    }

    async fn send_all(&self, frame: &str) {
        let links = self.field().links();

        for (player_id, link) in links {
            let mut connection = link.lock().await;
            let peer = connection.peer();
            let result = connection
                .send(frame.as_bytes(), self.config.send_timeout)
                .await;
            drop(connection);
            if let Err(e) = result {
                warn!(
                    "Send to player {} ({}) in room {} failed: {}",
                    player_id,
                    peer_label(peer),
                    self.id,
                    e
                );
                self.remove_player(player_id);
            }
        }
    }

    /// Ends the room after its match: everyone left is released
    fn close(&self) {
        let released = {
            let mut field = self.field();
            match field.winner() {
                Some(winner) => info!(
                    "Room {} won by player {} ({})",
                    self.id,
                    winner.id(),
                    winner.name()
                ),
                None => info!("Room {} ended without a winner", self.id),
            }
            field.drain()
        };

        self.closed.store(true, Ordering::SeqCst);
        info!("Room {} closed, releasing {} players", self.id, released.len());
    }
}

fn peer_label(peer: Option<SocketAddr>) -> String {
    peer.map_or_else(|| "no address".to_string(), |addr| addr.to_string())
}
